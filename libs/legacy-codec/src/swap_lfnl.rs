//! EBCDIC LF/NL swap overlay (C6).
//!
//! Builds a patched clone of state-table row 0 and the from-Unicode stage-3
//! pool with EBCDIC bytes 0x15 (NL) and 0x25 (LF) exchanged in both
//! directions. Only applies to SBCS and SISO tables whose unswapped mapping
//! is the standard EBCDIC assignment (`0x15` -> U+0085, `0x25` -> U+000A);
//! any other table is left alone, matching the "silently ignored otherwise"
//! rule.
//!
//! The clone is memoized on [`crate::table::Table`] behind a [`std::sync::OnceLock`]
//! with a manual double-install shape rather than `OnceLock::get_or_init`:
//! the build itself (walking the trie for two code points) happens with no
//! lock held, so two threads racing to build the clone is an accepted
//! outcome and the loser's work is simply dropped, matching "build, lock,
//! install-if-absent, unlock, free-on-loss".

use crate::from_unicode::lookup_bytes;
use crate::table::{Action, FromUnicodeBytes, OutputType, StateEntry, SwapClone, Table};

const NL: u16 = 0x0085;
const LF: u16 = 0x000A;
const NL_BYTE: u8 = 0x15;
const LF_BYTE: u8 = 0x25;

pub(crate) fn build(table: &Table) -> Option<SwapClone> {
    if !matches!(table.output_type, OutputType::Sbcs1 | OutputType::Siso2) {
        return None;
    }

    let entry_nl = table.state_entry(0, NL_BYTE);
    let entry_lf = table.state_entry(0, LF_BYTE);
    let (StateEntry::Final { next_state: n_nl, action: a_nl, payload: p_nl },
         StateEntry::Final { next_state: n_lf, action: a_lf, payload: p_lf }) = (entry_nl, entry_lf)
    else {
        return None;
    };
    if a_nl != Action::BmpRoundtrip || a_lf != Action::BmpRoundtrip {
        return None;
    }
    if p_nl != NL as u32 || p_lf != LF as u32 {
        return None;
    }

    let mut state_row0 = table.state_table[0];
    state_row0[NL_BYTE as usize] = StateEntry::Final {
        next_state: n_nl,
        action: Action::BmpRoundtrip,
        payload: LF as u32,
    }
    .into();
    state_row0[LF_BYTE as usize] = StateEntry::Final {
        next_state: n_lf,
        action: Action::BmpRoundtrip,
        payload: NL as u32,
    }
    .into();

    let nl_bytes = lookup_bytes(table, NL as u32, false)?;
    let lf_bytes = lookup_bytes(table, LF as u32, false)?;
    if nl_bytes != [NL_BYTE] || lf_bytes != [LF_BYTE] {
        return None;
    }

    let mut from_unicode_bytes = table.from_unicode_bytes.clone();
    swap_leaf_byte(table, &mut from_unicode_bytes, NL as u32, LF_BYTE);
    swap_leaf_byte(table, &mut from_unicode_bytes, LF as u32, NL_BYTE);

    Some(SwapClone {
        state_row0,
        from_unicode_bytes,
    })
}

/// Overwrites the stage-3 leaf for code point `c` with `new_byte`, preserving
/// every other bit of the stored word (the SBCS "kind" nibble, or nothing
/// extra for SISO's plain 16-bit word).
fn swap_leaf_byte(table: &Table, bytes: &mut FromUnicodeBytes, c: u32, new_byte: u8) {
    let idx = table.stage2_index(c);
    let crate::table::Stage2::Sbcs(pool) = &table.stage2 else {
        // SISO tables use the MBCS-shaped stage2; same index math applies.
        let crate::table::Stage2::Mbcs(pool) = &table.stage2 else {
            unreachable!()
        };
        let entry = pool[idx];
        let stage3_index = (entry & 0xFFFF) as usize;
        let slot = (c & 0xF) as usize;
        if let FromUnicodeBytes::Word16(v) = bytes {
            v[stage3_index * 16 + slot] = new_byte as u16;
        }
        return;
    };
    let stage3_index = pool[idx] as usize;
    let slot = (c & 0xF) as usize;
    if let FromUnicodeBytes::Sbcs(v) = bytes {
        let word = v[stage3_index * 16 + slot];
        v[stage3_index * 16 + slot] = (word & 0xFF00) | new_byte as u16;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{OutputType, TableBuilder};

    fn ebcdic_like() -> Table {
        let mut stage1 = vec![0u16; 64];
        stage1[0] = 0;
        let stage2 = vec![0u16; 64];
        let mut bytes = vec![0u16; 16];
        bytes[(NL & 0xF) as usize] = 0x0F00 | NL_BYTE as u16;
        bytes[(LF & 0xF) as usize] = 0x0F00 | LF_BYTE as u16;
        let mut row0 = [0u32; 256];
        row0[NL_BYTE as usize] = StateEntry::Final {
            next_state: 0,
            action: Action::BmpRoundtrip,
            payload: NL as u32,
        }
        .into();
        row0[LF_BYTE as usize] = StateEntry::Final {
            next_state: 0,
            action: Action::BmpRoundtrip,
            payload: LF as u32,
        }
        .into();
        TableBuilder::new(OutputType::Sbcs1)
            .state_table(vec![row0])
            .stage1(stage1)
            .stage2_sbcs(stage2)
            .from_bytes_sbcs(bytes)
            .build()
    }

    #[test]
    fn swap_exchanges_both_directions() {
        let table = ebcdic_like();
        let clone = build(&table).expect("standard EBCDIC LF/NL layout");
        match StateEntry::from(clone.state_row0[NL_BYTE as usize]) {
            StateEntry::Final { payload, .. } => assert_eq!(payload, LF as u32),
            _ => panic!(),
        }
        match StateEntry::from(clone.state_row0[LF_BYTE as usize]) {
            StateEntry::Final { payload, .. } => assert_eq!(payload, NL as u32),
            _ => panic!(),
        }
    }

    #[test]
    fn non_standard_layout_is_ignored() {
        let mut table = ebcdic_like();
        // Break the standard assumption: swap would be unsafe to apply.
        table.state_table[0][NL_BYTE as usize] = StateEntry::Final {
            next_state: 0,
            action: Action::BmpRoundtrip,
            payload: 0x41,
        }
        .into();
        assert!(build(&table).is_none());
    }
}
