use once_cell::sync::Lazy;
use rangemap::RangeInclusiveMap;

/// Instruction formats, named after the Dalvik format identifiers. Only the width matters
/// here; operands other than pool indexes are never interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Format10t,
    Format10x,
    Format11n,
    Format11x,
    Format12x,
    Format20t,
    Format21c,
    Format21h,
    Format21s,
    Format21t,
    Format22b,
    Format22c,
    Format22s,
    Format22t,
    Format22x,
    Format23x,
    Format30t,
    Format31c,
    Format31i,
    Format31t,
    Format32x,
    Format35c,
    Format3rc,
    Format45cc,
    Format4rcc,
    Format51l,
}

impl Format {
    /// Width in 16-bit code units.
    pub fn units(self) -> usize {
        match self {
            Format::Format10t
            | Format::Format10x
            | Format::Format11n
            | Format::Format11x
            | Format::Format12x => 1,
            Format::Format20t
            | Format::Format21c
            | Format::Format21h
            | Format::Format21s
            | Format::Format21t
            | Format::Format22b
            | Format::Format22c
            | Format::Format22s
            | Format::Format22t
            | Format::Format22x
            | Format::Format23x => 2,
            Format::Format30t
            | Format::Format31c
            | Format::Format31i
            | Format::Format31t
            | Format::Format32x
            | Format::Format35c
            | Format::Format3rc => 3,
            Format::Format45cc | Format::Format4rcc => 4,
            Format::Format51l => 5,
        }
    }

    /// True when the pool index in code unit 1 spans two units.
    pub fn has_wide_index(self) -> bool {
        matches!(self, Format::Format31c)
    }
}

/// Pool an instruction operand points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceType {
    None,
    String,
    Type,
    Field,
    Method,
    CallSite,
    MethodProto,
    MethodHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeShape {
    pub format: Format,
    pub reference: ReferenceType,
    /// Proto operand of invoke-polymorphic, stored in code unit 3.
    pub reference2: ReferenceType,
}

impl OpcodeShape {
    const fn plain(format: Format) -> Self {
        OpcodeShape { format, reference: ReferenceType::None, reference2: ReferenceType::None }
    }

    const fn referencing(format: Format, reference: ReferenceType) -> Self {
        OpcodeShape { format, reference, reference2: ReferenceType::None }
    }
}

pub const PACKED_SWITCH_PAYLOAD: u16 = 0x0100;
pub const SPARSE_SWITCH_PAYLOAD: u16 = 0x0200;
pub const FILL_ARRAY_DATA_PAYLOAD: u16 = 0x0300;

static OPCODE_SHAPES: Lazy<RangeInclusiveMap<u8, OpcodeShape>> = Lazy::new(|| {
    use Format::*;
    use ReferenceType as R;

    let mut m = RangeInclusiveMap::new();
    m.insert(0x00..=0x00, OpcodeShape::plain(Format10x)); // nop
    m.insert(0x01..=0x01, OpcodeShape::plain(Format12x)); // move
    m.insert(0x02..=0x02, OpcodeShape::plain(Format22x));
    m.insert(0x03..=0x03, OpcodeShape::plain(Format32x));
    m.insert(0x04..=0x04, OpcodeShape::plain(Format12x)); // move-wide
    m.insert(0x05..=0x05, OpcodeShape::plain(Format22x));
    m.insert(0x06..=0x06, OpcodeShape::plain(Format32x));
    m.insert(0x07..=0x07, OpcodeShape::plain(Format12x)); // move-object
    m.insert(0x08..=0x08, OpcodeShape::plain(Format22x));
    m.insert(0x09..=0x09, OpcodeShape::plain(Format32x));
    m.insert(0x0a..=0x0d, OpcodeShape::plain(Format11x)); // move-result*, move-exception
    m.insert(0x0e..=0x0e, OpcodeShape::plain(Format10x)); // return-void
    m.insert(0x0f..=0x11, OpcodeShape::plain(Format11x)); // return*
    m.insert(0x12..=0x12, OpcodeShape::plain(Format11n)); // const/4
    m.insert(0x13..=0x13, OpcodeShape::plain(Format21s));
    m.insert(0x14..=0x14, OpcodeShape::plain(Format31i));
    m.insert(0x15..=0x15, OpcodeShape::plain(Format21h));
    m.insert(0x16..=0x16, OpcodeShape::plain(Format21s));
    m.insert(0x17..=0x17, OpcodeShape::plain(Format31i));
    m.insert(0x18..=0x18, OpcodeShape::plain(Format51l));
    m.insert(0x19..=0x19, OpcodeShape::plain(Format21h));
    m.insert(0x1a..=0x1a, OpcodeShape::referencing(Format21c, R::String)); // const-string
    m.insert(0x1b..=0x1b, OpcodeShape::referencing(Format31c, R::String)); // const-string/jumbo
    m.insert(0x1c..=0x1c, OpcodeShape::referencing(Format21c, R::Type)); // const-class
    m.insert(0x1d..=0x1e, OpcodeShape::plain(Format11x)); // monitor-enter/exit
    m.insert(0x1f..=0x1f, OpcodeShape::referencing(Format21c, R::Type)); // check-cast
    m.insert(0x20..=0x20, OpcodeShape::referencing(Format22c, R::Type)); // instance-of
    m.insert(0x21..=0x21, OpcodeShape::plain(Format12x)); // array-length
    m.insert(0x22..=0x22, OpcodeShape::referencing(Format21c, R::Type)); // new-instance
    m.insert(0x23..=0x23, OpcodeShape::referencing(Format22c, R::Type)); // new-array
    m.insert(0x24..=0x24, OpcodeShape::referencing(Format35c, R::Type)); // filled-new-array
    m.insert(0x25..=0x25, OpcodeShape::referencing(Format3rc, R::Type));
    m.insert(0x26..=0x26, OpcodeShape::plain(Format31t)); // fill-array-data
    m.insert(0x27..=0x27, OpcodeShape::plain(Format11x)); // throw
    m.insert(0x28..=0x28, OpcodeShape::plain(Format10t)); // goto
    m.insert(0x29..=0x29, OpcodeShape::plain(Format20t));
    m.insert(0x2a..=0x2a, OpcodeShape::plain(Format30t));
    m.insert(0x2b..=0x2c, OpcodeShape::plain(Format31t)); // packed/sparse-switch
    m.insert(0x2d..=0x31, OpcodeShape::plain(Format23x)); // cmp*
    m.insert(0x32..=0x37, OpcodeShape::plain(Format22t)); // if-*
    m.insert(0x38..=0x3d, OpcodeShape::plain(Format21t)); // if-*z
    m.insert(0x44..=0x51, OpcodeShape::plain(Format23x)); // aget/aput
    m.insert(0x52..=0x5f, OpcodeShape::referencing(Format22c, R::Field)); // iget/iput
    m.insert(0x60..=0x6d, OpcodeShape::referencing(Format21c, R::Field)); // sget/sput
    m.insert(0x6e..=0x72, OpcodeShape::referencing(Format35c, R::Method)); // invoke-*
    m.insert(0x74..=0x78, OpcodeShape::referencing(Format3rc, R::Method)); // invoke-*/range
    m.insert(0x7b..=0x8f, OpcodeShape::plain(Format12x)); // unary ops and conversions
    m.insert(0x90..=0xaf, OpcodeShape::plain(Format23x)); // binop
    m.insert(0xb0..=0xcf, OpcodeShape::plain(Format12x)); // binop/2addr
    m.insert(0xd0..=0xd7, OpcodeShape::plain(Format22s)); // binop/lit16
    m.insert(0xd8..=0xe2, OpcodeShape::plain(Format22b)); // binop/lit8
    m.insert(
        0xfa..=0xfa,
        OpcodeShape { format: Format45cc, reference: R::Method, reference2: R::MethodProto },
    );
    m.insert(
        0xfb..=0xfb,
        OpcodeShape { format: Format4rcc, reference: R::Method, reference2: R::MethodProto },
    );
    m.insert(0xfc..=0xfc, OpcodeShape::referencing(Format35c, R::CallSite)); // invoke-custom
    m.insert(0xfd..=0xfd, OpcodeShape::referencing(Format3rc, R::CallSite));
    m.insert(0xfe..=0xfe, OpcodeShape::referencing(Format21c, R::MethodHandle));
    m.insert(0xff..=0xff, OpcodeShape::referencing(Format21c, R::MethodProto));
    m
});

/// Shape of an opcode, `None` for the unused opcode values.
pub fn opcode_shape(opcode: u8) -> Option<&'static OpcodeShape> {
    OPCODE_SHAPES.get(&opcode)
}
