//! Double-byte and shift-stateful codepages built in to this crate.
//!
//! Like [`crate::tables::single_byte`], these are small representative
//! tables, not production Shift-JIS/EBCDIC-DBCS data.

use std::collections::BTreeMap;

use crate::table::{Action, OutputType, StateEntry, Table, TableBuilder, UNASSIGNED_UNIT};

use super::trie::build_mbcs_trie_word16;

const N_TRAIL: u32 = 256;

fn shift_jis_lead_bytes() -> Vec<u8> {
    (0x81u8..=0x9F).chain(0xE0u8..=0xEF).collect()
}

/// A Shift-JIS-style DBCS codepage: ASCII in single-byte mode, two-byte
/// sequences under a handful of representative lead bytes. Lead/trail pairs
/// with no entry in `SAMPLES` below are structurally valid (consume two
/// bytes) but unassigned.
pub fn shift_jis_like() -> Table {
    const SAMPLES: &[((u8, u8), u32)] = &[
        ((0x88, 0x9F), 0x4E9C), // 亜
        ((0x93, 0xFA), 0x65E5), // 日
        ((0x96, 0x7B), 0x672C), // 本
    ];

    let leads = shift_jis_lead_bytes();

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
        row0[b as usize] = StateEntry::Final {
            next_state: 0,
            action: Action::Illegal,
            payload: 0,
        }
        .into();
    }
    for (lead_idx, &lead) in leads.iter().enumerate() {
        row0[lead as usize] = StateEntry::Transition {
            next_state: 1,
            offset_delta: (lead_idx as u32 * N_TRAIL) as i32,
        }
        .into();
    }

    let mut row1 = [0u32; 256];
    for b in 0u32..=0xFF {
        let valid_trail = (0x40..=0x7E).contains(&b) || (0x80..=0xFC).contains(&b);
        row1[b as usize] = if valid_trail {
            StateEntry::Final {
                next_state: 0,
                action: Action::Indexed16,
                payload: b,
            }
        } else {
            StateEntry::Final {
                next_state: 0,
                action: Action::Illegal,
                payload: 0,
            }
        }
        .into();
    }

    let mut code_units = vec![UNASSIGNED_UNIT; leads.len() * N_TRAIL as usize];
    for &((lead, trail), cp) in SAMPLES {
        let lead_idx = leads
            .iter()
            .position(|&l| l == lead)
            .expect("sample lead byte must be in the table's lead-byte set");
        code_units[lead_idx * N_TRAIL as usize + trail as usize] = cp as u16;
    }

    let mut entries: BTreeMap<u32, (bool, u16)> =
        (0u32..0x80).map(|c| (c, (true, c as u16))).collect();
    for &((lead, trail), cp) in SAMPLES {
        entries.insert(cp, (true, ((lead as u16) << 8) | trail as u16));
    }
    let (stage1, stage2, stage3) = build_mbcs_trie_word16(&entries);

    TableBuilder::new(OutputType::Dbcs2)
        .state_table(vec![row0, row1])
        .unicode_code_units(code_units)
        .stage1(stage1)
        .stage2_mbcs(stage2)
        .from_bytes_word16(stage3)
        .build()
}

fn siso_dbcs_bytes() -> Vec<u8> {
    (0x41u8..=0x49).collect()
}

/// An EBCDIC Shift-In/Shift-Out codepage: single-byte EBCDIC letters/digits,
/// 0x0E switches to two-byte mode, 0x0F switches back. A handful of
/// representative DBCS pairs are mapped; the rest are structurally valid but
/// unassigned.
pub fn ebcdic_siso_like() -> Table {
    const SAMPLES: &[((u8, u8), u32)] = &[((0x41, 0x41), 0x4E00), ((0x42, 0x43), 0x4E8C)];

    let dbcs_bytes = siso_dbcs_bytes();

    let mut row0 = [0u32; 256]; // SBCS mode
    let mut row1 = [0u32; 256]; // just shifted out, expecting a lead byte or SI
    let mut row2 = [0u32; 256]; // have a lead byte, expecting the trail byte

    for b in 0u32..=0xFF {
        row0[b as usize] = StateEntry::Final {
            next_state: 0,
            action: Action::Unassigned,
            payload: 0,
        }
        .into();
    }
    let mut sbcs_pairs: Vec<(u8, u32)> = vec![(0x40, 0x0020)];
    sbcs_pairs.extend((0xF0u8..=0xF9).zip(b'0'..=b'9').map(|(b, ch)| (b, ch as u32)));
    sbcs_pairs.extend((0xC1u8..=0xC9).zip(b'A'..=b'I').map(|(b, ch)| (b, ch as u32)));
    for &(byte, cp) in &sbcs_pairs {
        row0[byte as usize] = StateEntry::Final {
            next_state: 0,
            action: Action::BmpRoundtrip,
            payload: cp,
        }
        .into();
    }
    row0[0x0E] = StateEntry::Final {
        next_state: 1,
        action: Action::StateChangeOnly,
        payload: 0,
    }
    .into();

    for b in 0u32..=0xFF {
        row1[b as usize] = StateEntry::Final {
            next_state: 1,
            action: Action::Illegal,
            payload: 0,
        }
        .into();
    }
    row1[0x0F] = StateEntry::Final {
        next_state: 0,
        action: Action::StateChangeOnly,
        payload: 0,
    }
    .into();
    for (lead_idx, &lead) in dbcs_bytes.iter().enumerate() {
        row1[lead as usize] = StateEntry::Transition {
            next_state: 2,
            offset_delta: (lead_idx as u32 * N_TRAIL) as i32,
        }
        .into();
    }

    for b in 0u32..=0xFF {
        row2[b as usize] = if dbcs_bytes.contains(&(b as u8)) {
            StateEntry::Final {
                next_state: 1,
                action: Action::Indexed16,
                payload: b,
            }
        } else {
            StateEntry::Final {
                next_state: 1,
                action: Action::Illegal,
                payload: 0,
            }
        }
        .into();
    }

    let mut code_units = vec![UNASSIGNED_UNIT; dbcs_bytes.len() * N_TRAIL as usize];
    for &((lead, trail), cp) in SAMPLES {
        let lead_idx = dbcs_bytes
            .iter()
            .position(|&l| l == lead)
            .expect("sample lead byte must be in the table's DBCS lead-byte set");
        code_units[lead_idx * N_TRAIL as usize + trail as usize] = cp as u16;
    }

    let mut entries: BTreeMap<u32, (bool, u16)> = sbcs_pairs
        .iter()
        .map(|&(byte, cp)| (cp, (true, byte as u16)))
        .collect();
    for &((lead, trail), cp) in SAMPLES {
        entries.insert(cp, (true, ((lead as u16) << 8) | trail as u16));
    }
    let (stage1, stage2, stage3) = build_mbcs_trie_word16(&entries);

    TableBuilder::new(OutputType::Siso2)
        .state_table(vec![row0, row1, row2])
        .unicode_code_units(code_units)
        .stage1(stage1)
        .stage2_mbcs(stage2)
        .from_bytes_word16(stage3)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::StateEntry;

    #[test]
    fn shift_jis_ascii_byte_is_a_final_state() {
        let table = shift_jis_like();
        assert!(matches!(table.state_entry(0, 0x41), StateEntry::Final { .. }));
    }

    #[test]
    fn shift_jis_lead_byte_transitions() {
        let table = shift_jis_like();
        assert!(matches!(
            table.state_entry(0, 0x88),
            StateEntry::Transition { next_state: 1, .. }
        ));
    }

    #[test]
    fn siso_shift_out_is_state_change_only() {
        let table = ebcdic_siso_like();
        assert_eq!(table.state_entry(0, 0x0E), StateEntry::Final {
            next_state: 1,
            action: Action::StateChangeOnly,
            payload: 0,
        });
    }

    #[test]
    fn from_unicode_wraps_dbcs_run_in_shift_bytes() {
        use crate::converter::{Config, Converter};
        use std::sync::Arc;

        let table = Arc::new(ebcdic_siso_like());
        let mut conv = Converter::new(table, Config::default());
        // 'A' (SBCS), U+4E00 (DBCS pair 0x41 0x41), 'B' (SBCS).
        let input = [0x0041u16, 0x4E00, 0x0042];
        let mut out = [0u8; 8];
        let (_, produced, status) = conv.from_unicode_with_offsets(&input, &mut out, None, true);
        assert!(status.is_ok());
        assert_eq!(&out[..produced], &[0xC1, 0x0E, 0x41, 0x41, 0x0F, 0xC2]);
    }

    #[test]
    fn to_unicode_reads_shift_bytes_back_into_dbcs_run() {
        use crate::converter::{Config, Converter};
        use std::sync::Arc;

        let table = Arc::new(ebcdic_siso_like());
        let mut conv = Converter::new(table, Config::default());
        let input = [0xC1u8, 0x0E, 0x41, 0x41, 0x0F, 0xC2];
        let mut out = [0u16; 8];
        let (consumed, produced, status) = conv.to_unicode_with_offsets(&input, &mut out, None, true);
        assert!(status.is_ok());
        assert_eq!(consumed, input.len());
        assert_eq!(&out[..produced], &[0x0041, 0x4E00, 0x0042]);
    }

    #[test]
    fn shift_jis_partial_pair_resumes_across_calls() {
        use crate::converter::{Config, Converter};
        use std::sync::Arc;

        let table = Arc::new(shift_jis_like());
        let mut conv = Converter::new(table, Config::default());
        let mut out = [0u16; 4];
        let mut offsets = [0i32; 4];

        // Feed only the lead byte first, without flushing: the engine must
        // hold it and report nothing yet.
        let (consumed, produced, status) =
            conv.to_unicode_with_offsets(&[0x88], &mut out, Some(&mut offsets), false);
        assert!(status.is_ok());
        assert_eq!(consumed, 1);
        assert_eq!(produced, 0);

        // Now the trail byte completes the pair; since the character started
        // in the previous call's buffer, its source index is reported as -1.
        let (consumed, produced, status) =
            conv.to_unicode_with_offsets(&[0x9F], &mut out, Some(&mut offsets), true);
        assert!(status.is_ok());
        assert_eq!(consumed, 1);
        assert_eq!(&out[..produced], &[0x4E9C]);
        assert_eq!(offsets[0], -1);
    }
}
