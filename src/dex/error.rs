use std::fmt;

use crate::dex::section::SectionKind;

macro_rules! err {
    ($kind:ident, $msg:literal) => {
        DexError::new($crate::dex::error::ErrorKind::$kind, $msg)
    };
    ($kind:ident, $fmtstr:literal, $($args:tt)*) => {
        DexError::new($crate::dex::error::ErrorKind::$kind, &format!($fmtstr, $($args)*))
    };
    ($msg:literal) => {
        DexError::malformed($msg)
    };
    ($fmtstr:literal, $($args:tt)*) => {
        DexError::malformed(&format!($fmtstr, $($args)*))
    };
}


#[macro_export]
macro_rules! fail {
    ($kind:ident, $msg:literal) => {
        return Err(DexError::new($crate::dex::error::ErrorKind::$kind, $msg))
    };
    ($kind:ident, $fmtstr:literal, $($args:tt)*) => {
        return Err(DexError::new($crate::dex::error::ErrorKind::$kind, &format!($fmtstr, $($args)*)))
    };
    ($msg:literal) => {
        return Err(DexError::malformed($msg))
    };
    ($fmtstr:literal, $($args:tt)*) => {
        return Err(DexError::malformed(&format!($fmtstr, $($args)*)))
    };
}


/// Broad classification of a failure, so callers can tell a bad input from a bad patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind
{
    /// The container itself cannot be parsed.
    Malformed,
    /// The patch file is truncated, out of bounds or meant for another base file.
    CorruptPatch,
    /// A reference resolved to an item that no longer exists.
    DeletedReference,
    /// Internal bookkeeping disagreed with itself.
    Invariant,
    /// An excluded class is still referenced from retained data.
    Exclusion,
    /// The container uses a section the engine has no rules for.
    Unsupported,
    Io,
}

impl fmt::Display for ErrorKind
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let s = match self {
            ErrorKind::Malformed => "malformed container",
            ErrorKind::CorruptPatch => "corrupt patch",
            ErrorKind::DeletedReference => "reference to deleted item",
            ErrorKind::Invariant => "invariant violation",
            ErrorKind::Exclusion => "excluded class conflict",
            ErrorKind::Unsupported => "unsupported container",
            ErrorKind::Io => "i/o failure",
        };
        f.write_str(s)
    }
}


#[derive(Debug, PartialEq, Eq)]
pub struct DexError
{
    kind: ErrorKind,
    msg: String,
    section: Option<SectionKind>,
    position: Option<u32>,
    contexts: Vec<String>,
}

impl DexError
{
    pub(crate) fn new(kind: ErrorKind, msg: &str) -> Self
    {
        DexError {
            kind,
            msg: msg.to_string(),
            section: None,
            position: None,
            contexts: Vec::new(),
        }
    }

    pub(crate) fn malformed(msg: &str) -> Self
    {
        DexError::new(ErrorKind::Malformed, msg)
    }

    pub(crate) fn with_context(base: DexError, context: String) -> Self
    {
        let mut base = base;
        base.contexts.push(context);
        base
    }

    /// Keep the message and location but file the error under another kind.
    pub(crate) fn reclassify(mut self, kind: ErrorKind) -> Self
    {
        self.kind = kind;
        self
    }

    /// Pin the error to a section and, when known, a position inside it.
    /// The first location recorded wins since it is the most precise one.
    pub(crate) fn at(mut self, section: SectionKind, position: Option<u32>) -> Self
    {
        if self.section.is_none() {
            self.section = Some(section);
            self.position = position;
        }
        self
    }

    pub fn kind(&self) -> ErrorKind
    {
        self.kind
    }

    pub fn section(&self) -> Option<SectionKind>
    {
        self.section
    }

    pub fn position(&self) -> Option<u32>
    {
        self.position
    }

    pub fn message(&self) -> &str
    {
        &self.msg
    }
}

impl fmt::Display for DexError
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}: {}", self.kind, self.msg)?;
        let mut connector = " for ";
        for context in &self.contexts
        {
            write!(f, "{}{}", connector, context)?;
            connector = " of ";
        }
        if let Some(section) = self.section {
            write!(f, " (section {}", section)?;
            if let Some(position) = self.position {
                write!(f, ", position {}", position)?;
            }
            f.write_str(")")?;
        }
        Ok(())
    }
}

impl std::error::Error for DexError {}

impl From<std::io::Error> for DexError
{
    fn from(e: std::io::Error) -> Self
    {
        DexError::new(ErrorKind::Io, &e.to_string())
    }
}
