//! Class exclusion patterns.
//!
//! A pattern is a dotted class name such as `com.example.loader.*`, `a.b.C$Inner` or `int[]`,
//! or a type descriptor such as `Lcom/example/Foo;`. It is turned into a descriptor glob
//! where `*` matches any run of characters and `?` matches zero or one character.

use std::fmt;

use nom::branch::alt;
use nom::bytes::complete::{is_not, tag, take_while1};
use nom::character::complete::char;
use nom::combinator::{all_consuming, map};
use nom::multi::{many0, many1};
use nom::sequence::pair;
use nom::{IResult, Parser};

use crate::dex::error::DexError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Any,
    Optional,
}

fn parse_token(input: &str) -> IResult<&str, Token> {
    alt((
        map(char('*'), |_| Token::Any),
        map(char('?'), |_| Token::Optional),
        map(is_not("*?"), |s: &str| Token::Literal(s.to_string())),
    ))
    .parse(input)
}

fn parse_glob(input: &str) -> IResult<&str, Vec<Token>> {
    all_consuming(many1(parse_token)).parse(input)
}

/// `name` followed by any number of `[]` pairs.
fn parse_dotted(input: &str) -> IResult<&str, (&str, Vec<&str>)> {
    all_consuming(pair(take_while1(|c: char| c != '['), many0(tag("[]")))).parse(input)
}

fn primitive_descriptor(name: &str) -> Option<char> {
    match name {
        "void" => Some('V'),
        "boolean" => Some('Z'),
        "byte" => Some('B'),
        "short" => Some('S'),
        "char" => Some('C'),
        "int" => Some('I'),
        "long" => Some('J'),
        "float" => Some('F'),
        "double" => Some('D'),
        _ => None,
    }
}

/// Descriptor form of a class pattern, wildcards untouched.
fn to_descriptor(pattern: &str) -> Result<String, DexError> {
    if pattern.starts_with('L') && pattern.ends_with(';') || pattern.starts_with('[') {
        return Ok(pattern.replace('.', "/"));
    }
    let (name, dims) = match parse_dotted(pattern) {
        Ok((_, parsed)) => parsed,
        Err(_) => fail!("Bad class pattern '{}'", pattern),
    };

    let mut descriptor = "[".repeat(dims.len());
    match primitive_descriptor(name) {
        Some(c) => descriptor.push(c),
        None => {
            descriptor.push('L');
            descriptor.push_str(&name.replace('.', "/"));
            if !name.ends_with(';') {
                descriptor.push(';');
            }
        }
    }
    Ok(descriptor)
}

fn match_tokens(tokens: &[Token], text: &str) -> bool {
    match tokens.split_first() {
        None => text.is_empty(),
        Some((Token::Literal(lit), rest)) => text.strip_prefix(lit.as_str()).map_or(false, |t| match_tokens(rest, t)),
        Some((Token::Optional, rest)) => {
            match_tokens(rest, text) || text.chars().next().map_or(false, |c| match_tokens(rest, &text[c.len_utf8()..]))
        }
        Some((Token::Any, rest)) => text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .any(|i| match_tokens(rest, &text[i..])),
    }
}

/// One compiled exclusion pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassPattern {
    source: String,
    descriptor: String,
    tokens: Vec<Token>,
}

impl ClassPattern {
    pub fn parse(pattern: &str) -> Result<ClassPattern, DexError> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            fail!("Empty class pattern");
        }
        let descriptor = to_descriptor(pattern)?;
        let tokens = match parse_glob(&descriptor) {
            Ok((_, tokens)) => tokens,
            Err(_) => fail!("Bad class pattern '{}'", pattern),
        };
        Ok(ClassPattern { source: pattern.to_string(), descriptor, tokens })
    }

    /// The pattern in descriptor form, e.g. `Lcom/example/*;`.
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn matches(&self, descriptor: &str) -> bool {
        match_tokens(&self.tokens, descriptor)
    }
}

impl fmt::Display for ClassPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

/// A set of exclusion patterns; a descriptor is excluded when any pattern matches it.
#[derive(Debug, Clone, Default)]
pub struct ClassFilter {
    patterns: Vec<ClassPattern>,
}

impl ClassFilter {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<ClassFilter, DexError> {
        let patterns = patterns
            .iter()
            .map(|p| ClassPattern::parse(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ClassFilter { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// The first pattern matching `descriptor`.
    pub fn matching(&self, descriptor: &str) -> Option<&ClassPattern> {
        self.patterns.iter().find(|p| p.matches(descriptor))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(p: &str) -> String {
        ClassPattern::parse(p).unwrap().descriptor().to_string()
    }

    #[test]
    fn dotted_names_become_descriptors() {
        assert_eq!(descriptor("com.example.Foo"), "Lcom/example/Foo;");
        assert_eq!(descriptor("a.b.C$Inner"), "La/b/C$Inner;");
        assert_eq!(descriptor("com.example.loader.*"), "Lcom/example/loader/*;");
        assert_eq!(descriptor("int[]"), "[I");
        assert_eq!(descriptor("java.lang.String[][]"), "[[Ljava/lang/String;");
        assert_eq!(descriptor("void"), "V");
    }

    #[test]
    fn descriptors_are_kept() {
        assert_eq!(descriptor("Lcom/example/Foo;"), "Lcom/example/Foo;");
        assert_eq!(descriptor("Lcom.example.Foo;"), "Lcom/example/Foo;");
        assert_eq!(descriptor("[Lcom/example/Foo;"), "[Lcom/example/Foo;");
    }

    #[test]
    fn bad_patterns() {
        assert!(ClassPattern::parse("").is_err());
        assert!(ClassPattern::parse("   ").is_err());
        assert!(ClassPattern::parse("int[]x").is_err());
        assert!(ClassPattern::parse("Foo[").is_err());
    }

    #[test]
    fn wildcards() {
        let p = ClassPattern::parse("com.example.*").unwrap();
        assert!(p.matches("Lcom/example/Foo;"));
        assert!(p.matches("Lcom/example/sub/Bar;"));
        assert!(!p.matches("Lcom/other/Foo;"));

        let q = ClassPattern::parse("a.B?").unwrap();
        assert!(q.matches("La/B;"));
        assert!(q.matches("La/B1;"));
        assert!(!q.matches("La/B12;"));

        let exact = ClassPattern::parse("a.b.C$Inner").unwrap();
        assert!(exact.matches("La/b/C$Inner;"));
        assert!(!exact.matches("La/b/C;"));
    }

    #[test]
    fn filter() {
        let filter = ClassFilter::new(&["com.example.loader.*", "a.Keep"]).unwrap();
        assert!(filter.matching("Lcom/example/loader/Loader;").is_some());
        assert_eq!(filter.matching("La/Keep;").map(|p| p.to_string()), Some("a.Keep".to_string()));
        assert!(filter.matching("La/Other;").is_none());
        assert!(ClassFilter::default().is_empty());
        assert!(ClassFilter::new(&["ok.Name", ""]).is_err());
    }
}
