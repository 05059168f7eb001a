//! Single-byte codepages built in to this crate.
//!
//! These are small, representative mapping tables meant to exercise the
//! SBCS engine end to end, not an exhaustive standards-body code-page
//! registry — a real deployment loads its codepages from
//! [`crate::Table::from_bytes`] blobs instead.

use std::collections::BTreeMap;

use crate::table::{Action, OutputType, StateEntry, Table, TableBuilder};

use super::trie::build_sbcs_trie;

fn ascii_entries() -> BTreeMap<u32, (bool, u8)> {
    (0u32..0x80).map(|c| (c, (true, c as u8))).collect()
}

/// A Windows-1252-style Latin codepage: ASCII plus a representative subset
/// of the upper-128 mappings (currency sign, smart quotes, a handful of
/// accented letters and the Latin-1 supplement bytes that fall through
/// unchanged). Bytes with no entry below are unassigned, as several genuinely
/// are in the real code page (0x81, 0x8D, 0x8F, 0x90, 0x9D).
pub fn windows_1252_like() -> Table {
    const UPPER: &[(u8, u32)] = &[
        (0x80, 0x20AC),
        (0x82, 0x201A),
        (0x83, 0x0192),
        (0x84, 0x201E),
        (0x85, 0x2026),
        (0x86, 0x2020),
        (0x87, 0x2021),
        (0x88, 0x02C6),
        (0x89, 0x2030),
        (0x8A, 0x0160),
        (0x8C, 0x0152),
        (0x91, 0x2018),
        (0x92, 0x2019),
        (0x93, 0x201C),
        (0x94, 0x201D),
        (0x95, 0x2022),
        (0x96, 0x2013),
        (0x97, 0x2014),
        (0x9A, 0x0161),
        (0x9C, 0x0153),
        (0x9F, 0x0178),
        (0xA0, 0x00A0),
        (0xA9, 0x00A9),
        (0xAE, 0x00AE),
        (0xB0, 0x00B0),
        (0xC0, 0x00C0),
        (0xC9, 0x00C9),
        (0xD1, 0x00D1),
        (0xD6, 0x00D6),
        (0xDC, 0x00DC),
        (0xDF, 0x00DF),
        (0xE0, 0x00E0),
        (0xE9, 0x00E9),
        (0xF1, 0x00F1),
        (0xF6, 0x00F6),
        (0xFC, 0x00FC),
    ];

    let mut entries = ascii_entries();
    for &(byte, cp) in UPPER {
        entries.insert(cp, (true, byte));
    }

    let mut row0 = [0u32; 256];
    for b in 0u32..0x80 {
        row0[b as usize] = StateEntry::Final {
            next_state: 0,
            action: Action::BmpRoundtrip,
            payload: b,
        }
        .into();
    }
    for b in 0x80u32..=0xFF {
        let found = UPPER.iter().find(|&&(byte, _)| byte as u32 == b);
        row0[b as usize] = match found {
            Some(&(_, cp)) => StateEntry::Final {
                next_state: 0,
                action: Action::BmpRoundtrip,
                payload: cp,
            },
            None => StateEntry::Final {
                next_state: 0,
                action: Action::Unassigned,
                payload: 0,
            },
        }
        .into();
    }

    let (stage1, stage2, stage3) = build_sbcs_trie(&entries);

    TableBuilder::new(OutputType::Sbcs1)
        .state_table(vec![row0])
        .stage1(stage1)
        .stage2_sbcs(stage2)
        .from_bytes_sbcs(stage3)
        .build()
}

/// An EBCDIC (cp037-like) codepage: control bytes, space, digits, and the
/// upper/lower Latin letters across their three discontiguous EBCDIC runs.
/// This is the one other built-in tables pass through [`crate::swap_lfnl`]
/// unmodified: it carries NL at 0x15 and LF at 0x25, exactly the layout that
/// module expects to swap.
pub fn ebcdic_cp037_like() -> Table {
    let mut pairs: Vec<(u8, u32)> = vec![
        (0x00, 0x0000),
        (0x0D, 0x000D),
        (0x15, 0x0085), // NL
        (0x25, 0x000A), // LF
        (0x40, 0x0020), // space
    ];
    pairs.extend((0xF0u8..=0xF9).zip(b'0'..=b'9').map(|(b, ch)| (b, ch as u32)));
    pairs.extend((0xC1u8..=0xC9).zip(b'A'..=b'I').map(|(b, ch)| (b, ch as u32)));
    pairs.extend((0xD1u8..=0xD9).zip(b'J'..=b'R').map(|(b, ch)| (b, ch as u32)));
    pairs.extend((0xE2u8..=0xE9).zip(b'S'..=b'Z').map(|(b, ch)| (b, ch as u32)));
    pairs.extend((0x81u8..=0x89).zip(b'a'..=b'i').map(|(b, ch)| (b, ch as u32)));
    pairs.extend((0x91u8..=0x99).zip(b'j'..=b'r').map(|(b, ch)| (b, ch as u32)));
    pairs.extend((0xA2u8..=0xA9).zip(b's'..=b'z').map(|(b, ch)| (b, ch as u32)));

    let mut entries: BTreeMap<u32, (bool, u8)> = BTreeMap::new();
    let mut row0 = [0u32; 256];
    for b in 0u32..=0xFF {
        row0[b as usize] = StateEntry::Final {
            next_state: 0,
            action: Action::Unassigned,
            payload: 0,
        }
        .into();
    }
    for &(byte, cp) in &pairs {
        entries.insert(cp, (true, byte));
        row0[byte as usize] = StateEntry::Final {
            next_state: 0,
            action: Action::BmpRoundtrip,
            payload: cp,
        }
        .into();
    }

    let (stage1, stage2, stage3) = build_sbcs_trie(&entries);

    TableBuilder::new(OutputType::Sbcs1)
        .state_table(vec![row0])
        .stage1(stage1)
        .stage2_sbcs(stage2)
        .from_bytes_sbcs(stage3)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_1252_ascii_roundtrips() {
        let table = windows_1252_like();
        assert!(table.ascii_roundtrip(b'A'));
    }

    #[test]
    fn windows_1252_euro_sign_maps_to_0x80() {
        let table = windows_1252_like();
        assert_eq!(table.state_entry(0, 0x80), StateEntry::Final {
            next_state: 0,
            action: Action::BmpRoundtrip,
            payload: 0x20AC,
        });
    }

    #[test]
    fn ebcdic_nl_and_lf_are_plain_roundtrips_before_swap() {
        let table = ebcdic_cp037_like();
        assert_eq!(table.state_entry(0, 0x15), StateEntry::Final {
            next_state: 0,
            action: Action::BmpRoundtrip,
            payload: 0x0085,
        });
        assert_eq!(table.state_entry(0, 0x25), StateEntry::Final {
            next_state: 0,
            action: Action::BmpRoundtrip,
            payload: 0x000A,
        });
    }

    #[test]
    fn ebcdic_has_no_ascii_identity_bytes() {
        let table = ebcdic_cp037_like();
        assert_eq!(table.ascii_roundtrips, 0);
    }

    #[test]
    fn ebcdic_round_trips_hi() {
        use crate::converter::{Config, Converter};
        use std::sync::Arc;

        let table = Arc::new(ebcdic_cp037_like());
        let mut conv = Converter::new(Arc::clone(&table), Config::default());
        let input = [b'H' as u16, b'i' as u16];
        let mut bytes = [0u8; 4];
        let (_, produced, status) = conv.from_unicode_with_offsets(&input, &mut bytes, None, true);
        assert!(status.is_ok());
        assert_eq!(&bytes[..produced], &[0xC8, 0x89]);

        conv.reset();
        let mut units = [0u16; 4];
        let (_, produced, status) = conv.to_unicode_with_offsets(&bytes[..produced], &mut units, None, true);
        assert!(status.is_ok());
        assert_eq!(&units[..produced], &input);
    }

    #[test]
    fn ebcdic_lf_nl_swap_reverses_byte_assignment() {
        use crate::converter::{Config, Converter, Options};

        let table = std::sync::Arc::new(ebcdic_cp037_like());

        let mut swapped = Converter::new(std::sync::Arc::clone(&table), Config {
            options: Options::SWAP_LFNL,
            ..Config::default()
        });
        let mut out = [0u8; 1];
        let (_, produced, status) = swapped.from_unicode_with_offsets(&[0x000A], &mut out, None, true);
        assert!(status.is_ok());
        assert_eq!(&out[..produced], &[0x15]);

        swapped.reset();
        let (_, produced, status) = swapped.from_unicode_with_offsets(&[0x0085], &mut out, None, true);
        assert!(status.is_ok());
        assert_eq!(&out[..produced], &[0x25]);

        let mut plain = Converter::new(table, Config::default());
        let (_, produced, status) = plain.from_unicode_with_offsets(&[0x000A], &mut out, None, true);
        assert!(status.is_ok());
        assert_eq!(&out[..produced], &[0x25]);
    }
}
