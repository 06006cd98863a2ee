//! The match predicate matrix: for each data type and match kind, decide
//! whether `(old, current, user)` satisfies the predicate, and how many
//! bytes matched.

use std::collections::HashMap;

use crate::error::Result;
use crate::flags::{MatchFlag, MatchFlags};
use crate::value::{DataType, MatchKind, UserValue};

/// Bound on the number of distinct patterns the session-scoped regex cache
/// holds before it is cleared and rebuilt from scratch.
const REGEX_CACHE_CAP: usize = 32;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EvalResult {
    pub matched_len: usize,
    pub flags: MatchFlags,
}

impl EvalResult {
    pub fn none() -> EvalResult {
        EvalResult::default()
    }

    pub fn is_match(&self) -> bool {
        self.matched_len > 0
    }
}

#[derive(Clone, Copy)]
pub(crate) enum Numeric {
    Int,
    Float,
}

pub(crate) fn contributors_for(data_type: DataType) -> Vec<(MatchFlag, Numeric)> {
    use DataType::*;
    match data_type {
        I8 => vec![(MatchFlag::B8, Numeric::Int)],
        I16 => vec![(MatchFlag::B16, Numeric::Int)],
        I32 => vec![(MatchFlag::B32, Numeric::Int)],
        I64 => vec![(MatchFlag::B64, Numeric::Int)],
        F32 => vec![(MatchFlag::B32, Numeric::Float)],
        F64 => vec![(MatchFlag::B64, Numeric::Float)],
        AnyInteger => vec![
            (MatchFlag::B8, Numeric::Int),
            (MatchFlag::B16, Numeric::Int),
            (MatchFlag::B32, Numeric::Int),
            (MatchFlag::B64, Numeric::Int),
        ],
        AnyFloat => vec![(MatchFlag::B32, Numeric::Float), (MatchFlag::B64, Numeric::Float)],
        AnyNumber => vec![
            (MatchFlag::B8, Numeric::Int),
            (MatchFlag::B16, Numeric::Int),
            (MatchFlag::B32, Numeric::Int),
            (MatchFlag::B64, Numeric::Int),
            (MatchFlag::B32, Numeric::Float),
            (MatchFlag::B64, Numeric::Float),
        ],
        String | ByteArray => vec![],
    }
}

/// Evaluate every applicable numeric width at this offset. `current` is the
/// readable tail starting at the offset (`availableLen` bytes); `old`, when
/// present, is the previously recorded bytes for the same span.
pub fn eval_numeric_at(
    data_type: DataType,
    kind: MatchKind,
    old: Option<&[u8]>,
    current: &[u8],
    user: &UserValue,
    reverse_endianness: bool,
) -> EvalResult {
    let mut flags = MatchFlags::empty();
    let mut max_width = 0usize;

    for (flag, numeric) in contributors_for(data_type) {
        let width = flag.width_bytes();
        if current.len() < width {
            continue;
        }
        let cur_bytes = &current[..width];
        let old_bytes = old.filter(|o| o.len() >= width).map(|o| &o[..width]);

        let succeeded = match numeric {
            Numeric::Int => eval_width_int(width, kind, old_bytes, cur_bytes, user, reverse_endianness),
            Numeric::Float => {
                eval_width_float(width, kind, old_bytes, cur_bytes, user, reverse_endianness)
            }
        };

        if succeeded {
            flags |= flag;
            max_width = max_width.max(width);
        }
    }

    EvalResult {
        matched_len: max_width,
        flags,
    }
}

trait ByteScalar: Copy + PartialOrd + PartialEq {
    fn from_le(bytes: &[u8]) -> Self;
    fn wrapping_sub(self, other: Self) -> Self;
    fn from_user_low(u: &UserValue) -> Option<Self>;
    fn from_user_high(u: &UserValue) -> Option<Self>;
}

macro_rules! impl_int_scalar {
    ($t:ty) => {
        impl ByteScalar for $t {
            fn from_le(bytes: &[u8]) -> Self {
                <$t>::from_le_bytes(bytes.try_into().unwrap())
            }
            fn wrapping_sub(self, other: Self) -> Self {
                <$t>::wrapping_sub(self, other)
            }
            fn from_user_low(u: &UserValue) -> Option<Self> {
                u.int_low.map(|v| v as $t)
            }
            fn from_user_high(u: &UserValue) -> Option<Self> {
                u.int_high.map(|v| v as $t)
            }
        }
    };
}

macro_rules! impl_float_scalar {
    ($t:ty) => {
        impl ByteScalar for $t {
            fn from_le(bytes: &[u8]) -> Self {
                <$t>::from_le_bytes(bytes.try_into().unwrap())
            }
            fn wrapping_sub(self, other: Self) -> Self {
                self - other
            }
            fn from_user_low(u: &UserValue) -> Option<Self> {
                u.float_low.map(|v| v as $t)
            }
            fn from_user_high(u: &UserValue) -> Option<Self> {
                u.float_high.map(|v| v as $t)
            }
        }
    };
}

impl_int_scalar!(i8);
impl_int_scalar!(i16);
impl_int_scalar!(i32);
impl_int_scalar!(i64);
impl_float_scalar!(f32);
impl_float_scalar!(f64);

fn read_scalar<T: ByteScalar>(bytes: &[u8], reverse: bool) -> T {
    if reverse {
        let reversed: Vec<u8> = bytes.iter().rev().copied().collect();
        T::from_le(&reversed)
    } else {
        T::from_le(bytes)
    }
}

/// The relational matrix of §4.4, monomorphic over one scalar width.
/// IEEE-754 comparisons already give the right NaN behaviour for free:
/// `==`/`>`/`<` are false against NaN, `!=` is true.
fn eval_scalar<T: ByteScalar>(kind: MatchKind, old: Option<T>, current: T, user: &UserValue) -> bool {
    let low = T::from_user_low(user);
    let high = T::from_user_high(user);
    match kind {
        MatchKind::Any => true,
        MatchKind::EqualTo => low.is_some_and(|l| current == l),
        MatchKind::NotEqualTo => low.is_some_and(|l| current != l),
        MatchKind::GreaterThan => low.is_some_and(|l| current > l),
        MatchKind::LessThan => low.is_some_and(|l| current < l),
        MatchKind::Range => match (low, high) {
            (Some(l), Some(h)) => current >= l && current <= h,
            _ => false,
        },
        MatchKind::Changed => old.is_some_and(|o| current != o),
        MatchKind::NotChanged => old.is_some_and(|o| current == o),
        MatchKind::Increased => old.is_some_and(|o| current > o),
        MatchKind::Decreased => old.is_some_and(|o| current < o),
        MatchKind::IncreasedBy => match (old, low) {
            (Some(o), Some(l)) => current.wrapping_sub(o) == l,
            _ => false,
        },
        MatchKind::DecreasedBy => match (old, low) {
            (Some(o), Some(l)) => o.wrapping_sub(current) == l,
            _ => false,
        },
        MatchKind::Regex => false,
    }
}

pub(crate) fn eval_width_int(
    width: usize,
    kind: MatchKind,
    old: Option<&[u8]>,
    current: &[u8],
    user: &UserValue,
    reverse: bool,
) -> bool {
    macro_rules! go {
        ($t:ty) => {{
            let cur: $t = read_scalar(current, reverse);
            let old_v: Option<$t> = old.map(|o| read_scalar(o, reverse));
            eval_scalar(kind, old_v, cur, user)
        }};
    }
    match width {
        1 => go!(i8),
        2 => go!(i16),
        4 => go!(i32),
        8 => go!(i64),
        _ => false,
    }
}

pub(crate) fn eval_width_float(
    width: usize,
    kind: MatchKind,
    old: Option<&[u8]>,
    current: &[u8],
    user: &UserValue,
    reverse: bool,
) -> bool {
    macro_rules! go {
        ($t:ty) => {{
            let cur: $t = read_scalar(current, reverse);
            let old_v: Option<$t> = old.map(|o| read_scalar(o, reverse));
            eval_scalar(kind, old_v, cur, user)
        }};
    }
    match width {
        4 => go!(f32),
        8 => go!(f64),
        _ => false,
    }
}

/// Byte-array predicate: `current[i] & mask[i] == needle[i] & mask[i]` for
/// every `i` (mask byte `0x00` is a wildcard). Only `Any` and `EqualTo` are
/// defined for byte arrays.
pub fn eval_bytes_at(kind: MatchKind, current: &[u8], user: &UserValue) -> EvalResult {
    match kind {
        MatchKind::Any => {
            if current.is_empty() {
                EvalResult::none()
            } else {
                EvalResult {
                    matched_len: 1,
                    flags: MatchFlag::ByteArray.into(),
                }
            }
        }
        MatchKind::EqualTo => {
            let Some(needle) = user.bytes.as_deref() else {
                return EvalResult::none();
            };
            if current.len() < needle.len() {
                return EvalResult::none();
            }
            let matched = match &user.mask {
                Some(mask) => (0..needle.len())
                    .all(|i| (current[i] & mask[i]) == (needle[i] & mask[i])),
                None => &current[..needle.len()] == needle,
            };
            if matched {
                EvalResult {
                    matched_len: needle.len(),
                    flags: MatchFlag::ByteArray.into(),
                }
            } else {
                EvalResult::none()
            }
        }
        _ => EvalResult::none(),
    }
}

/// String predicate: `EqualTo` is a byte-exact compare at the offset.
/// `Regex` is handled separately via [`RegexCache`] since it needs a
/// compiled pattern.
pub fn eval_string_equal_at(current: &[u8], user: &UserValue) -> EvalResult {
    let Some(needle) = user.string.as_ref().map(|s| s.as_bytes()) else {
        return EvalResult::none();
    };
    if current.len() < needle.len() || &current[..needle.len()] != needle {
        return EvalResult::none();
    }
    EvalResult {
        matched_len: needle.len(),
        flags: MatchFlag::String.into(),
    }
}

/// A small bounded cache of compiled patterns, scoped to one session:
/// `reset` evicts it so patterns never leak across sessions.
pub struct RegexCache {
    compiled: HashMap<String, regex::bytes::Regex>,
}

impl RegexCache {
    pub fn new() -> RegexCache {
        RegexCache {
            compiled: HashMap::new(),
        }
    }

    pub fn clear(&mut self) {
        self.compiled.clear();
    }

    fn get_or_compile(&mut self, pattern: &str) -> Result<&regex::bytes::Regex> {
        if !self.compiled.contains_key(pattern) {
            if self.compiled.len() >= REGEX_CACHE_CAP {
                self.compiled.clear();
            }
            let compiled = regex::bytes::Regex::new(pattern)?;
            self.compiled.insert(pattern.to_string(), compiled);
        }
        Ok(self.compiled.get(pattern).unwrap())
    }

    /// The leftmost match anchored at offset 0 of `current` — not anywhere
    /// later in the region — per §4.4.
    pub fn eval_regex_at(&mut self, pattern: &str, current: &[u8]) -> Result<EvalResult> {
        let compiled = self.get_or_compile(pattern)?;
        Ok(match compiled.find(current) {
            Some(m) if m.start() == 0 => EvalResult {
                matched_len: m.end(),
                flags: MatchFlag::String.into(),
            },
            _ => EvalResult::none(),
        })
    }
}

impl Default for RegexCache {
    fn default() -> Self {
        RegexCache::new()
    }
}
