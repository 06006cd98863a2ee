//! Turning a MatchArray into displayable records.

use crate::region::Region;
use crate::store::{MatchArray, OldValueAndMatchInfo};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchRecord {
    pub index: usize,
    pub address: usize,
    pub region_label: String,
    pub width: usize,
    pub old_hex: String,
    pub current_hex: Option<String>,
}

/// Pick the widest width bit still set on a cell, in bytes; `0` for a
/// string/byte-array-only cell where width isn't a fixed scalar size.
fn widest_width(cell: &OldValueAndMatchInfo) -> usize {
    use crate::flags::MatchFlag;
    [MatchFlag::B64, MatchFlag::B32, MatchFlag::B16, MatchFlag::B8]
        .into_iter()
        .find(|f| cell.match_info.contains(*f))
        .map(|f| f.width_bytes())
        .unwrap_or(0)
}

/// Find the label for the region containing `addr`, falling back to `"?"`
/// when no region covers it (e.g. the map has since changed underneath a
/// stale MatchArray).
fn region_label(regions: &[Region], addr: usize) -> String {
    regions
        .iter()
        .find(|r| addr >= r.start && addr < r.end())
        .map(|r| match &r.filename {
            Some(name) => name.clone(),
            None => format!("{:?}", r.class),
        })
        .unwrap_or_else(|| "?".to_string())
}

/// Produce up to `limit` records in ascending address order. `current`,
/// when supplied, is used to render the live current-value column;
/// without it only the old-byte column is shown.
pub fn list(
    array: &MatchArray,
    regions: &[Region],
    limit: usize,
    current: Option<impl Fn(usize, usize) -> Option<Vec<u8>>>,
) -> Vec<MatchRecord> {
    let mut index = 0usize;
    let mut out = Vec::new();

    'outer: for swath in &array.swaths {
        for (i, cell) in swath.data.iter().enumerate() {
            if cell.is_empty() {
                continue;
            }
            if index >= limit {
                break 'outer;
            }
            let addr = swath.first_byte_in_child + i;
            let width = widest_width(cell).max(1);
            let old_bytes: Vec<u8> = (0..width)
                .map(|k| {
                    swath
                        .data
                        .get(i + k)
                        .map(|c| c.old_byte)
                        .unwrap_or(cell.old_byte)
                })
                .collect();
            let current_hex = current
                .as_ref()
                .and_then(|f| f(addr, width))
                .map(|bytes| to_hex(&bytes));
            out.push(MatchRecord {
                index,
                address: addr,
                region_label: region_label(regions, addr),
                width,
                old_hex: to_hex(&old_bytes),
                current_hex,
            });
            index += 1;
        }
    }

    out
}

pub fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::MatchFlag;
    use crate::region::{Permissions, RegionClass};
    use crate::store::{OldValueAndMatchInfo, Swath};

    #[test]
    fn to_hex_is_uppercase_and_space_separated() {
        assert_eq!(to_hex(&[0xde, 0xad]), "DE AD");
    }

    #[test]
    fn region_label_falls_back_to_question_mark() {
        let regions = vec![];
        assert_eq!(region_label(&regions, 0x1000), "?");
    }

    #[test]
    fn region_label_uses_filename_when_present() {
        let region = Region {
            id: 0,
            start: 0x1000,
            size: 0x1000,
            perms: Permissions {
                read: true,
                write: true,
                execute: false,
                shared: false,
            },
            load_address: 0x1000,
            filename: Some("/usr/bin/cat".to_string()),
            class: RegionClass::Misc,
        };
        assert_eq!(region_label(&[region], 0x1050), "/usr/bin/cat");
    }

    #[test]
    fn list_orders_by_address_and_respects_limit() {
        let mut array = MatchArray::new();
        let mut swath = Swath::new(0x2000, 0);
        swath.data.push(OldValueAndMatchInfo {
            old_byte: 9,
            match_info: MatchFlag::B32.into(),
        });
        array.push_swath(swath);

        let none_fn: Option<fn(usize, usize) -> Option<Vec<u8>>> = None;
        let records = list(&array, &[], 10, none_fn);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].address, 0x2000);
        assert_eq!(records[0].width, 4);
    }
}
