//! XSD built-in simple types
//!
//! Lexical checks for the primitive and derived types of XML Schema 1.0, and
//! the whitespace rule each one applies before checking.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

/// `xs:whiteSpace` handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhiteSpace {
    /// Keep the value as is
    Preserve,
    /// Tabs, line feeds and carriage returns become spaces
    Replace,
    /// Replace, then collapse runs of spaces and trim
    Collapse,
}

impl WhiteSpace {
    /// Parse the value of an `xs:whiteSpace` facet
    pub fn from_facet(value: &str) -> Option<Self> {
        match value {
            "preserve" => Some(WhiteSpace::Preserve),
            "replace" => Some(WhiteSpace::Replace),
            "collapse" => Some(WhiteSpace::Collapse),
            _ => None,
        }
    }

    /// Normalize `value`
    pub fn apply(self, value: &str) -> String {
        match self {
            WhiteSpace::Preserve => value.to_string(),
            WhiteSpace::Replace => value.replace(['\t', '\n', '\r'], " "),
            WhiteSpace::Collapse => value.split_ascii_whitespace().collect::<Vec<_>>().join(" "),
        }
    }
}

/// A built-in simple type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    /// `xs:anySimpleType`
    AnySimpleType,
    /// `xs:string`
    String,
    /// `xs:normalizedString`
    NormalizedString,
    /// `xs:token`
    Token,
    /// `xs:language`
    Language,
    /// `xs:Name`
    Name,
    /// `xs:NCName`
    NCName,
    /// `xs:NMTOKEN`
    NmToken,
    /// `xs:NMTOKENS`
    NmTokens,
    /// `xs:ID`
    Id,
    /// `xs:IDREF`
    IdRef,
    /// `xs:IDREFS`
    IdRefs,
    /// `xs:ENTITY`
    Entity,
    /// `xs:ENTITIES`
    Entities,
    /// `xs:QName`
    QName,
    /// `xs:NOTATION`
    Notation,
    /// `xs:anyURI`
    AnyUri,
    /// `xs:boolean`
    Boolean,
    /// `xs:decimal`
    Decimal,
    /// `xs:integer`
    Integer,
    /// `xs:nonPositiveInteger`
    NonPositiveInteger,
    /// `xs:negativeInteger`
    NegativeInteger,
    /// `xs:long`
    Long,
    /// `xs:int`
    Int,
    /// `xs:short`
    Short,
    /// `xs:byte`
    Byte,
    /// `xs:nonNegativeInteger`
    NonNegativeInteger,
    /// `xs:unsignedLong`
    UnsignedLong,
    /// `xs:unsignedInt`
    UnsignedInt,
    /// `xs:unsignedShort`
    UnsignedShort,
    /// `xs:unsignedByte`
    UnsignedByte,
    /// `xs:positiveInteger`
    PositiveInteger,
    /// `xs:float`
    Float,
    /// `xs:double`
    Double,
    /// `xs:duration`
    Duration,
    /// `xs:dateTime`
    DateTime,
    /// `xs:date`
    Date,
    /// `xs:time`
    Time,
    /// `xs:gYear`
    GYear,
    /// `xs:gYearMonth`
    GYearMonth,
    /// `xs:gMonth`
    GMonth,
    /// `xs:gMonthDay`
    GMonthDay,
    /// `xs:gDay`
    GDay,
    /// `xs:hexBinary`
    HexBinary,
    /// `xs:base64Binary`
    Base64Binary,
}

static NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\p{L}_:][\p{L}\p{N}\p{M}._:\-\x{B7}]*$").expect("valid regex"));
static NCNAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\p{L}_][\p{L}\p{N}\p{M}._\-\x{B7}]*$").expect("valid regex"));
static NMTOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\p{L}\p{N}\p{M}._:\-\x{B7}]+$").expect("valid regex"));
static LANGUAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z]{1,8}(-[a-zA-Z0-9]{1,8})*$").expect("valid regex"));
static DECIMAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)$").expect("valid regex"));
static INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[+-]?\d+$").expect("valid regex"));
static FLOAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?|-?INF|NaN)$").expect("valid regex")
});
static DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^-?P(\d+Y)?(\d+M)?(\d+D)?(T(\d+H)?(\d+M)?(\d+(\.\d+)?S)?)?$").expect("valid regex")
});
static DATE_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^-?\d{4,}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:\d{2})?$").expect("valid regex")
});
static DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\d{4,}-\d{2}-\d{2}(Z|[+-]\d{2}:\d{2})?$").expect("valid regex"));
static TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:\d{2})?$").expect("valid regex"));
static G_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d{4,}(Z|[+-]\d{2}:\d{2})?$").expect("valid regex"));
static G_YEAR_MONTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\d{4,}-\d{2}(Z|[+-]\d{2}:\d{2})?$").expect("valid regex"));
static G_MONTH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^--\d{2}(Z|[+-]\d{2}:\d{2})?$").expect("valid regex"));
static G_MONTH_DAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^--\d{2}-\d{2}(Z|[+-]\d{2}:\d{2})?$").expect("valid regex"));
static G_DAY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^---\d{2}(Z|[+-]\d{2}:\d{2})?$").expect("valid regex"));
static HEX_BINARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([0-9a-fA-F]{2})*$").expect("valid regex"));
static BASE64_BINARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z0-9+/] ?)*(=( ?=)?)?$").expect("valid regex"));

impl Builtin {
    /// Look up a type by its local name in the XSD namespace
    pub fn from_name(name: &str) -> Option<Self> {
        use Builtin::*;
        Some(match name {
            "anySimpleType" => AnySimpleType,
            "string" => String,
            "normalizedString" => NormalizedString,
            "token" => Token,
            "language" => Language,
            "Name" => Name,
            "NCName" => NCName,
            "NMTOKEN" => NmToken,
            "NMTOKENS" => NmTokens,
            "ID" => Id,
            "IDREF" => IdRef,
            "IDREFS" => IdRefs,
            "ENTITY" => Entity,
            "ENTITIES" => Entities,
            "QName" => QName,
            "NOTATION" => Notation,
            "anyURI" => AnyUri,
            "boolean" => Boolean,
            "decimal" => Decimal,
            "integer" => Integer,
            "nonPositiveInteger" => NonPositiveInteger,
            "negativeInteger" => NegativeInteger,
            "long" => Long,
            "int" => Int,
            "short" => Short,
            "byte" => Byte,
            "nonNegativeInteger" => NonNegativeInteger,
            "unsignedLong" => UnsignedLong,
            "unsignedInt" => UnsignedInt,
            "unsignedShort" => UnsignedShort,
            "unsignedByte" => UnsignedByte,
            "positiveInteger" => PositiveInteger,
            "float" => Float,
            "double" => Double,
            "duration" => Duration,
            "dateTime" => DateTime,
            "date" => Date,
            "time" => Time,
            "gYear" => GYear,
            "gYearMonth" => GYearMonth,
            "gMonth" => GMonth,
            "gMonthDay" => GMonthDay,
            "gDay" => GDay,
            "hexBinary" => HexBinary,
            "base64Binary" => Base64Binary,
            _ => return None,
        })
    }

    /// Local name in the XSD namespace
    pub fn name(self) -> &'static str {
        use Builtin::*;
        match self {
            AnySimpleType => "anySimpleType",
            String => "string",
            NormalizedString => "normalizedString",
            Token => "token",
            Language => "language",
            Name => "Name",
            NCName => "NCName",
            NmToken => "NMTOKEN",
            NmTokens => "NMTOKENS",
            Id => "ID",
            IdRef => "IDREF",
            IdRefs => "IDREFS",
            Entity => "ENTITY",
            Entities => "ENTITIES",
            QName => "QName",
            Notation => "NOTATION",
            AnyUri => "anyURI",
            Boolean => "boolean",
            Decimal => "decimal",
            Integer => "integer",
            NonPositiveInteger => "nonPositiveInteger",
            NegativeInteger => "negativeInteger",
            Long => "long",
            Int => "int",
            Short => "short",
            Byte => "byte",
            NonNegativeInteger => "nonNegativeInteger",
            UnsignedLong => "unsignedLong",
            UnsignedInt => "unsignedInt",
            UnsignedShort => "unsignedShort",
            UnsignedByte => "unsignedByte",
            PositiveInteger => "positiveInteger",
            Float => "float",
            Double => "double",
            Duration => "duration",
            DateTime => "dateTime",
            Date => "date",
            Time => "time",
            GYear => "gYear",
            GYearMonth => "gYearMonth",
            GMonth => "gMonth",
            GMonthDay => "gMonthDay",
            GDay => "gDay",
            HexBinary => "hexBinary",
            Base64Binary => "base64Binary",
        }
    }

    /// Whitespace rule applied before the lexical check
    pub fn whitespace(self) -> WhiteSpace {
        match self {
            Builtin::String | Builtin::AnySimpleType => WhiteSpace::Preserve,
            Builtin::NormalizedString => WhiteSpace::Replace,
            _ => WhiteSpace::Collapse,
        }
    }

    /// Integer-derived types, compared as integers in identity constraints
    pub fn is_integer(self) -> bool {
        use Builtin::*;
        matches!(
            self,
            Integer
                | NonPositiveInteger
                | NegativeInteger
                | Long
                | Int
                | Short
                | Byte
                | NonNegativeInteger
                | UnsignedLong
                | UnsignedInt
                | UnsignedShort
                | UnsignedByte
                | PositiveInteger
        )
    }

    /// Types whose range facets compare numerically
    pub fn is_numeric(self) -> bool {
        self.is_integer() || matches!(self, Builtin::Decimal | Builtin::Float | Builtin::Double)
    }

    /// Built-in list types
    pub fn is_list(self) -> bool {
        matches!(self, Builtin::NmTokens | Builtin::IdRefs | Builtin::Entities)
    }

    /// Lexical check of an already normalized value
    pub fn accepts(self, value: &str) -> bool {
        use Builtin::*;
        match self {
            AnySimpleType | String | NormalizedString | AnyUri => true,
            Token => !value.starts_with(' ') && !value.ends_with(' ') && !value.contains("  "),
            Language => LANGUAGE.is_match(value),
            Name => NAME.is_match(value),
            NCName | Id | IdRef | Entity => NCNAME.is_match(value),
            NmToken => NMTOKEN.is_match(value),
            NmTokens => list_of(value, NmToken),
            IdRefs | Entities => list_of(value, NCName),
            QName | Notation => match value.split_once(':') {
                Some((prefix, local)) => NCNAME.is_match(prefix) && NCNAME.is_match(local),
                None => NCNAME.is_match(value),
            },
            Boolean => matches!(value, "true" | "false" | "1" | "0"),
            Decimal => DECIMAL.is_match(value),
            Float | Double => FLOAT.is_match(value),
            Integer => INTEGER.is_match(value),
            NonPositiveInteger => in_range(value, None, Some(0)),
            NegativeInteger => in_range(value, None, Some(-1)),
            Long => in_range(value, Some(i64::MIN as i128), Some(i64::MAX as i128)),
            Int => in_range(value, Some(i32::MIN as i128), Some(i32::MAX as i128)),
            Short => in_range(value, Some(i16::MIN as i128), Some(i16::MAX as i128)),
            Byte => in_range(value, Some(i8::MIN as i128), Some(i8::MAX as i128)),
            NonNegativeInteger => in_range(value, Some(0), None),
            UnsignedLong => in_range(value, Some(0), Some(u64::MAX as i128)),
            UnsignedInt => in_range(value, Some(0), Some(u32::MAX as i128)),
            UnsignedShort => in_range(value, Some(0), Some(u16::MAX as i128)),
            UnsignedByte => in_range(value, Some(0), Some(u8::MAX as i128)),
            PositiveInteger => in_range(value, Some(1), None),
            Duration => DURATION.is_match(value) && value != "P" && !value.ends_with('T'),
            DateTime => DATE_TIME.is_match(value),
            Date => DATE.is_match(value),
            Time => TIME.is_match(value),
            GYear => G_YEAR.is_match(value),
            GYearMonth => G_YEAR_MONTH.is_match(value),
            GMonth => G_MONTH.is_match(value),
            GMonthDay => G_MONTH_DAY.is_match(value),
            GDay => G_DAY.is_match(value),
            HexBinary => HEX_BINARY.is_match(value),
            Base64Binary => BASE64_BINARY.is_match(value),
        }
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "xs:{}", self.name())
    }
}

fn list_of(value: &str, item: Builtin) -> bool {
    let mut items = value.split(' ').peekable();
    items.peek().is_some_and(|first| !first.is_empty()) && items.all(|v| item.accepts(v))
}

fn in_range(value: &str, min: Option<i128>, max: Option<i128>) -> bool {
    if !INTEGER.is_match(value) {
        return false;
    }
    // Digits beyond i128 are out of range for every bounded type
    match value.parse::<i128>() {
        Ok(v) => min.map_or(true, |m| v >= m) && max.map_or(true, |m| v <= m),
        Err(_) => {
            let negative = value.starts_with('-');
            (negative && min.is_none()) || (!negative && max.is_none())
        }
    }
}
