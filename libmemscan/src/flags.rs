//! Bit-packed match-width flags.
//!
//! One [`MatchFlag`] bit records that a candidate byte is the start of a
//! live match at that width. The set is a lattice: AND narrows, OR unions.
//! A cleared-to-empty set means the byte is no longer a candidate.

use enumflags2::{BitFlags, bitflags};

use crate::value::DataType;

#[bitflags]
#[repr(u16)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MatchFlag {
    B8 = 1 << 0,
    B16 = 1 << 1,
    B32 = 1 << 2,
    B64 = 1 << 3,
    String = 1 << 4,
    ByteArray = 1 << 5,
}

pub type MatchFlags = BitFlags<MatchFlag>;

impl MatchFlag {
    pub fn width_bytes(self) -> usize {
        match self {
            MatchFlag::B8 => 1,
            MatchFlag::B16 => 2,
            MatchFlag::B32 => 4,
            MatchFlag::B64 => 8,
            MatchFlag::String | MatchFlag::ByteArray => 0,
        }
    }
}

/// The natural starting flag set for a data type, e.g. `I32 -> B32`,
/// `AnyNumber -> B8|B16|B32|B64`.
pub fn width_flags_for(data_type: DataType) -> MatchFlags {
    use DataType::*;
    match data_type {
        I8 => MatchFlag::B8.into(),
        I16 => MatchFlag::B16.into(),
        I32 => MatchFlag::B32.into(),
        I64 => MatchFlag::B64.into(),
        F32 => MatchFlag::B32.into(),
        F64 => MatchFlag::B64.into(),
        AnyInteger | AnyNumber => {
            MatchFlag::B8 | MatchFlag::B16 | MatchFlag::B32 | MatchFlag::B64
        }
        // Floats only ever contribute at 32 and 64 bits (`predicate::contributors_for`
        // has no B8/B16 float entry), so the starting set must match.
        AnyFloat => MatchFlag::B32 | MatchFlag::B64,
        String => MatchFlag::String.into(),
        ByteArray => MatchFlag::ByteArray.into(),
    }
}
