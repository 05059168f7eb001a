//! Multi-byte codepages built in to this crate.

use std::collections::BTreeMap;

use crate::table::{Action, OutputType, StateEntry, Table, TableBuilder};

use super::trie::build_mbcs_trie_word32;

/// A GB 18030-shaped MBCS-4 table: ASCII in one byte, and the structural
/// four-byte lead/continuation pattern (`[0x81-0xFE][0x30-0x39][0x81-0xFE]
/// [0x30-0x39]`) recognized and routed to [`Action::Unassigned`] so a
/// [`crate::Converter`] opened with [`crate::Options::GB18030`] resolves it
/// through [`crate::gb18030`]'s algorithmic ranges rather than a static
/// mapping. Two-byte GBK-style sequences are recognized structurally (so
/// well-formed input isn't reported illegal) but carry no mapping of their
/// own here.
pub fn gb18030_like() -> Table {
    let mut row0 = [0u32; 256]; // byte 1
    let mut row1 = [0u32; 256]; // byte 2, after a lead byte
    let mut row2 = [0u32; 256]; // byte 3, after the 4-byte digit
    let mut row3 = [0u32; 256]; // byte 4, completes the 4-byte form

    for b in 0u32..0x80 {
        row0[b as usize] = StateEntry::Final {
            next_state: 0,
            action: Action::BmpRoundtrip,
            payload: b,
        }
        .into();
    }
    row0[0x80] = illegal();
    for b in 0x81u32..=0xFE {
        row0[b as usize] = StateEntry::Transition {
            next_state: 1,
            offset_delta: 0,
        }
        .into();
    }
    row0[0xFF] = illegal();

    for b in 0u32..=0xFF {
        row1[b as usize] = match b {
            0x30..=0x39 => StateEntry::Transition {
                next_state: 2,
                offset_delta: 0,
            }
            .into(),
            0x40..=0x7E | 0x80..=0xFE => StateEntry::Final {
                next_state: 0,
                action: Action::Unassigned,
                payload: 0,
            }
            .into(),
            _ => illegal(),
        };
    }

    for b in 0u32..=0xFF {
        row2[b as usize] = match b {
            0x81..=0xFE => StateEntry::Transition {
                next_state: 3,
                offset_delta: 0,
            }
            .into(),
            _ => illegal(),
        };
    }

    for b in 0u32..=0xFF {
        row3[b as usize] = match b {
            0x30..=0x39 => StateEntry::Final {
                next_state: 0,
                action: Action::Unassigned,
                payload: 0,
            }
            .into(),
            _ => illegal(),
        };
    }

    let entries: BTreeMap<u32, (bool, u32)> = (0u32..0x80).map(|c| (c, (true, c))).collect();
    let (stage1, stage2, stage3) = build_mbcs_trie_word32(&entries);

    TableBuilder::new(OutputType::Mbcs4)
        .state_table(vec![row0, row1, row2, row3])
        .stage1(stage1)
        .stage2_mbcs(stage2)
        .from_bytes_word32(stage3)
        .build()
}

fn illegal() -> u32 {
    StateEntry::Final {
        next_state: 0,
        action: Action::Illegal,
        payload: 0,
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::{Config, Converter, Options};
    use std::sync::Arc;

    #[test]
    fn ascii_roundtrips() {
        let table = gb18030_like();
        assert!(table.ascii_roundtrip(b'Z'));
    }

    #[test]
    fn four_byte_sequence_resolves_through_gb18030_ranges() {
        let table = Arc::new(gb18030_like());
        let mut conv = Converter::new(
            table,
            Config {
                options: Options::GB18030,
                ..Default::default()
            },
        );
        // 0x81 0x30 0x81 0x30 is the first code point of the first
        // algorithmic range in crate::gb18030::RANGES.
        let mut units = [0u16; 4];
        let (consumed, produced, status) =
            conv.to_unicode_with_offsets(&[0x81, 0x30, 0x81, 0x30], &mut units, None, true);
        assert_eq!(consumed, 4);
        assert!(status.is_ok());
        assert_eq!(produced, 1);
    }
}
