//! Data types, match kinds, and the user-supplied value carrier.

use crate::error::{Result, ScanError};
use crate::flags::{MatchFlag, MatchFlags, width_flags_for};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    AnyInteger,
    AnyFloat,
    AnyNumber,
    String,
    ByteArray,
}

impl DataType {
    /// Parse the case-insensitive tokens and aliases listed in the CLI
    /// surface: `int8|i8, int16|i16, int32|i32, int64|i64, int` (native int
    /// width), `float|f32, double|f64, string|str, bytes|bytearray,
    /// any|anynumber, anyint|anyinteger, anyfloat`.
    pub fn from_token(token: &str) -> Option<DataType> {
        let lower = token.to_ascii_lowercase();
        Some(match lower.as_str() {
            "int8" | "i8" => DataType::I8,
            "int16" | "i16" => DataType::I16,
            "int32" | "i32" | "int" => DataType::I32,
            "int64" | "i64" => DataType::I64,
            "float" | "f32" => DataType::F32,
            "double" | "f64" => DataType::F64,
            "string" | "str" => DataType::String,
            "bytes" | "bytearray" => DataType::ByteArray,
            "any" | "anynumber" => DataType::AnyNumber,
            "anyint" | "anyinteger" => DataType::AnyInteger,
            "anyfloat" => DataType::AnyFloat,
            _ => return None,
        })
    }

    pub fn width_flags(self) -> MatchFlags {
        width_flags_for(self)
    }

    pub fn is_numeric(self) -> bool {
        !matches!(self, DataType::String | DataType::ByteArray)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MatchKind {
    Any,
    Changed,
    NotChanged,
    Increased,
    Decreased,
    EqualTo,
    NotEqualTo,
    GreaterThan,
    LessThan,
    IncreasedBy,
    DecreasedBy,
    Range,
    Regex,
}

impl MatchKind {
    /// Parse the case-insensitive tokens and aliases listed in the CLI
    /// surface: `any, =|eq, !=|neq, >|gt, <|lt, range, changed,
    /// notchanged|update, inc|increased, dec|decreased, incby, decby`, plus
    /// `regex` for strings.
    pub fn from_token(token: &str) -> Option<MatchKind> {
        let lower = token.to_ascii_lowercase();
        Some(match lower.as_str() {
            "any" => MatchKind::Any,
            "=" | "eq" => MatchKind::EqualTo,
            "!=" | "neq" => MatchKind::NotEqualTo,
            ">" | "gt" => MatchKind::GreaterThan,
            "<" | "lt" => MatchKind::LessThan,
            "range" => MatchKind::Range,
            "changed" => MatchKind::Changed,
            "notchanged" | "update" => MatchKind::NotChanged,
            "inc" | "increased" => MatchKind::Increased,
            "dec" | "decreased" => MatchKind::Decreased,
            "incby" => MatchKind::IncreasedBy,
            "decby" => MatchKind::DecreasedBy,
            "regex" => MatchKind::Regex,
            _ => return None,
        })
    }

    pub fn operand_count(self) -> usize {
        match self {
            MatchKind::Any
            | MatchKind::Changed
            | MatchKind::NotChanged
            | MatchKind::Increased
            | MatchKind::Decreased => 0,
            MatchKind::Range => 2,
            _ => 1,
        }
    }
}

/// A tagged carrier for a user-supplied scan operand. Holds at most one of
/// an integer range, a float range, a string, or a byte sequence with an
/// optional mask, plus the width flag predicates should attempt.
#[derive(Clone, Debug, Default)]
pub struct UserValue {
    pub int_low: Option<i128>,
    pub int_high: Option<i128>,
    pub float_low: Option<f64>,
    pub float_high: Option<f64>,
    pub string: Option<String>,
    pub bytes: Option<Vec<u8>>,
    pub mask: Option<Vec<u8>>,
    pub width: MatchFlags,
}

impl UserValue {
    pub fn parse_integer(literal: &str, data_type: DataType) -> Result<UserValue> {
        let value = parse_integer_literal(literal)?;
        check_integer_range(value, data_type)?;
        Ok(UserValue {
            int_low: Some(value),
            width: data_type.width_flags(),
            ..Default::default()
        })
    }

    pub fn parse_integer_range(lo: &str, hi: &str, data_type: DataType) -> Result<UserValue> {
        let lo_v = parse_integer_literal(lo)?;
        let hi_v = parse_integer_literal(hi)?;
        check_integer_range(lo_v, data_type)?;
        check_integer_range(hi_v, data_type)?;
        if lo_v > hi_v {
            return Err(ScanError::invalid_argument(
                "range low bound must not exceed high bound",
            ));
        }
        Ok(UserValue {
            int_low: Some(lo_v),
            int_high: Some(hi_v),
            width: data_type.width_flags(),
            ..Default::default()
        })
    }

    pub fn parse_float(literal: &str, data_type: DataType) -> Result<UserValue> {
        let value: f64 = literal
            .parse()
            .map_err(|_| ScanError::invalid_argument(format!("not a float: '{literal}'")))?;
        Ok(UserValue {
            float_low: Some(value),
            width: data_type.width_flags(),
            ..Default::default()
        })
    }

    pub fn parse_float_range(lo: &str, hi: &str, data_type: DataType) -> Result<UserValue> {
        let lo_v: f64 = lo
            .parse()
            .map_err(|_| ScanError::invalid_argument(format!("not a float: '{lo}'")))?;
        let hi_v: f64 = hi
            .parse()
            .map_err(|_| ScanError::invalid_argument(format!("not a float: '{hi}'")))?;
        if lo_v > hi_v {
            return Err(ScanError::invalid_argument(
                "range low bound must not exceed high bound",
            ));
        }
        Ok(UserValue {
            float_low: Some(lo_v),
            float_high: Some(hi_v),
            width: data_type.width_flags(),
            ..Default::default()
        })
    }

    pub fn from_string(s: impl Into<String>) -> UserValue {
        UserValue {
            string: Some(s.into()),
            width: MatchFlag::String.into(),
            ..Default::default()
        }
    }

    /// Parse `0x`-prefixed contiguous hex pairs with optional whitespace,
    /// and an optional equal-length mask in the same notation
    /// (`0xFF = fixed, 0x00 = wildcard`).
    pub fn parse_bytes(literal: &str, mask_literal: Option<&str>) -> Result<UserValue> {
        let bytes = parse_hex_bytes(literal)?;
        let mask = mask_literal.map(parse_hex_bytes).transpose()?;
        if let Some(mask) = &mask {
            if mask.len() != bytes.len() {
                return Err(ScanError::invalid_argument(
                    "mask length must match byte pattern length",
                ));
            }
        }
        Ok(UserValue {
            bytes: Some(bytes),
            mask,
            width: MatchFlag::ByteArray.into(),
            ..Default::default()
        })
    }
}

fn parse_integer_literal(literal: &str) -> Result<i128> {
    let (sign, rest) = match literal.strip_prefix('-') {
        Some(rest) => (-1i128, rest),
        None => (1i128, literal),
    };
    let unsigned = if let Some(hex) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
        i128::from_str_radix(hex, 16)
    } else {
        rest.parse::<i128>()
    };
    let magnitude =
        unsigned.map_err(|_| ScanError::invalid_argument(format!("not an integer: '{literal}'")))?;
    Ok(sign * magnitude)
}

fn check_integer_range(value: i128, data_type: DataType) -> Result<()> {
    let (lo, hi): (i128, i128) = match data_type {
        DataType::I8 => (i8::MIN as i128, i8::MAX as i128),
        DataType::I16 => (i16::MIN as i128, i16::MAX as i128),
        DataType::I32 => (i32::MIN as i128, i32::MAX as i128),
        // AnyInteger/AnyNumber try every width up to 64 bits (see
        // `predicate::contributors_for`), so the literal only needs to fit
        // the widest one; narrower-width comparisons truncate via `as`.
        DataType::I64 | DataType::AnyInteger | DataType::AnyNumber => {
            (i64::MIN as i128, i64::MAX as i128)
        }
        _ => return Ok(()),
    };
    if value < lo || value > hi {
        return Err(ScanError::invalid_argument(format!(
            "{value} does not fit in {data_type:?}"
        )));
    }
    Ok(())
}

/// Parse a hex string like "DEADBEEF" or "4D 5A 90 00" into bytes.
pub fn parse_hex_bytes(s: &str) -> Result<Vec<u8>> {
    let filtered: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    let filtered = filtered
        .strip_prefix("0x")
        .or_else(|| filtered.strip_prefix("0X"))
        .unwrap_or(&filtered);

    if filtered.len() % 2 != 0 {
        return Err(ScanError::invalid_argument(
            "hex pattern length must be even",
        ));
    }

    let mut bytes = Vec::with_capacity(filtered.len() / 2);
    for i in (0..filtered.len()).step_by(2) {
        let byte_str = &filtered[i..i + 2];
        let b = u8::from_str_radix(byte_str, 16)
            .map_err(|_| ScanError::invalid_argument(format!("invalid hex byte '{byte_str}'")))?;
        bytes.push(b);
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hex_simple() {
        assert_eq!(parse_hex_bytes("DEADBEEF").unwrap(), vec![0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn parse_hex_with_spaces_and_case() {
        assert_eq!(parse_hex_bytes("de AD be EF").unwrap(), vec![0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn parse_hex_odd_length_errors() {
        assert!(parse_hex_bytes("ABC").is_err());
    }

    #[test]
    fn parse_hex_invalid_char_errors() {
        assert!(parse_hex_bytes("ABGH").is_err());
    }

    #[test]
    fn integer_8_refuses_300() {
        assert!(UserValue::parse_integer("300", DataType::I8).is_err());
    }

    #[test]
    fn integer_8_accepts_127() {
        let v = UserValue::parse_integer("127", DataType::I8).unwrap();
        assert_eq!(v.int_low, Some(127));
    }

    #[test]
    fn integer_accepts_hex_prefix() {
        let v = UserValue::parse_integer("0x2A", DataType::I32).unwrap();
        assert_eq!(v.int_low, Some(42));
    }

    #[test]
    fn negative_literal_round_trips() {
        let v = UserValue::parse_integer("-5", DataType::I32).unwrap();
        assert_eq!(v.int_low, Some(-5));
    }

    #[test]
    fn any_integer_accepts_values_beyond_32_bits() {
        let v = UserValue::parse_integer("5000000000", DataType::AnyInteger).unwrap();
        assert_eq!(v.int_low, Some(5_000_000_000));
    }

    #[test]
    fn range_requires_ascending_bounds() {
        assert!(UserValue::parse_integer_range("100", "10", DataType::I32).is_err());
        let v = UserValue::parse_integer_range("10", "100", DataType::I32).unwrap();
        assert_eq!((v.int_low, v.int_high), (Some(10), Some(100)));
    }

    #[test]
    fn data_type_tokens_resolve_aliases() {
        assert_eq!(DataType::from_token("i32"), Some(DataType::I32));
        assert_eq!(DataType::from_token("INT"), Some(DataType::I32));
        assert_eq!(DataType::from_token("double"), Some(DataType::F64));
        assert_eq!(DataType::from_token("anyint"), Some(DataType::AnyInteger));
        assert_eq!(DataType::from_token("bogus"), None);
    }

    #[test]
    fn match_kind_tokens_resolve_aliases() {
        assert_eq!(MatchKind::from_token("="), Some(MatchKind::EqualTo));
        assert_eq!(MatchKind::from_token("gt"), Some(MatchKind::GreaterThan));
        assert_eq!(MatchKind::from_token("update"), Some(MatchKind::NotChanged));
    }

    #[test]
    fn byte_pattern_and_mask_must_match_length() {
        assert!(UserValue::parse_bytes("AABB", Some("FF")).is_err());
        let v = UserValue::parse_bytes("AABB", Some("FFF0")).unwrap();
        assert_eq!(v.bytes, Some(vec![0xAA, 0xBB]));
        assert_eq!(v.mask, Some(vec![0xFF, 0xF0]));
    }
}
