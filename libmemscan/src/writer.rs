//! Writing new values back into a foreign process.

use crate::error::Result;
use crate::flags::MatchFlag;
use crate::io::ProcessMemory;
use crate::store::MatchArray;
use crate::value::UserValue;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub attempted: usize,
    pub succeeded: usize,
}

/// Render `user` as little-endian bytes at its carried width. Byte-array
/// operands are written verbatim; the mask is write-irrelevant (it only
/// narrows matches, never constrains what gets written).
fn encode(user: &UserValue, reverse_endianness: bool) -> Option<Vec<u8>> {
    let mut bytes = if let Some(b) = &user.bytes {
        b.clone()
    } else if user.width.contains(MatchFlag::B8) {
        (user.int_low? as i8).to_le_bytes().to_vec()
    } else if user.width.contains(MatchFlag::B16) {
        (user.int_low? as i16).to_le_bytes().to_vec()
    } else if user.width.contains(MatchFlag::B32) {
        if let Some(f) = user.float_low.filter(|_| user.int_low.is_none()) {
            (f as f32).to_le_bytes().to_vec()
        } else {
            (user.int_low? as i32).to_le_bytes().to_vec()
        }
    } else if user.width.contains(MatchFlag::B64) {
        if let Some(f) = user.float_low.filter(|_| user.int_low.is_none()) {
            f.to_le_bytes().to_vec()
        } else {
            (user.int_low? as i64).to_le_bytes().to_vec()
        }
    } else if let Some(s) = &user.string {
        s.as_bytes().to_vec()
    } else {
        return None;
    };

    if reverse_endianness && user.bytes.is_none() {
        bytes.reverse();
    }
    Some(bytes)
}

/// Write `user` at a single known address.
pub fn write_one(
    mem: &ProcessMemory,
    addr: usize,
    user: &UserValue,
    reverse_endianness: bool,
) -> Result<usize> {
    let bytes = encode(user, reverse_endianness)
        .ok_or_else(|| crate::error::ScanError::invalid_argument("value has no writable width"))?;
    mem.write(addr, &bytes)
}

/// Write `user` to every live match in `array`, in ascending address order.
/// Each match is written once at the widest width bit still set on it,
/// then subsequent cells covered by that width are skipped so the same
/// logical match is never written twice.
pub fn write_all(
    mem: &ProcessMemory,
    array: &MatchArray,
    user: &UserValue,
    reverse_endianness: bool,
) -> (WriteStats, Option<crate::error::ScanError>) {
    let mut stats = WriteStats::default();
    let mut first_error = None;
    let mut skip_until = 0usize;

    for (addr, cell) in array.iter_matches() {
        if addr < skip_until {
            continue;
        }
        let widest = widest_width(cell.match_info);
        stats.attempted += 1;
        match write_one(mem, addr, user, reverse_endianness) {
            Ok(_) => stats.succeeded += 1,
            Err(e) => {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        skip_until = addr + widest.max(1);
    }

    (stats, first_error)
}

/// Write `user` to the `index`-th match, in the same ascending-address
/// enumeration order `list` uses.
pub fn write_indexed(
    mem: &ProcessMemory,
    array: &MatchArray,
    index: usize,
    user: &UserValue,
    reverse_endianness: bool,
) -> Result<usize> {
    let (addr, _) = array
        .iter_matches()
        .nth(index)
        .ok_or_else(|| crate::error::ScanError::invalid_argument(format!("no match at index {index}")))?;
    write_one(mem, addr, user, reverse_endianness)
}

fn widest_width(flags: crate::flags::MatchFlags) -> usize {
    [MatchFlag::B64, MatchFlag::B32, MatchFlag::B16, MatchFlag::B8]
        .into_iter()
        .find(|f| flags.contains(*f))
        .map(|f| f.width_bytes())
        .unwrap_or(0)
}
