//! Introspection (C8): reachable-code-point sets, lead-byte sets, and a
//! coarse classification of a table's shape.

use crate::table::{Action, OutputType, StateEntry, Table};

/// Whether [`unicode_set`] should include fallback mappings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetFilter {
    RoundtripOnly,
    RoundtripAndFallback,
}

/// Narrows [`unicode_set`] to the subset of code points reachable through a
/// particular lead-byte convention, mirroring the filters real callers (ISO
/// 2022 plane selection, HZ, Shift-JIS) apply on top of a shared base table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum LeadByteFilter {
    None,
    DbcsOnly,
    Iso2022CnPlane1,
    Iso2022CnPlane2,
    ShiftJis,
    Gr94Dbcs,
    Hz,
}

fn passes_filter(filter: LeadByteFilter, bytes: &[u8]) -> bool {
    match filter {
        LeadByteFilter::None => true,
        LeadByteFilter::DbcsOnly => bytes.len() == 2,
        LeadByteFilter::Iso2022CnPlane1 => bytes.first() == Some(&0x81),
        LeadByteFilter::Iso2022CnPlane2 => bytes.first() == Some(&0x82),
        LeadByteFilter::ShiftJis => {
            bytes.len() == 2 && (0x8140..=0xEFFC).contains(&u16::from_be_bytes([bytes[0], bytes[1]]))
        }
        LeadByteFilter::Gr94Dbcs => {
            bytes.len() == 2 && (0xA1..=0xFE).contains(&bytes[0]) && (0xA1..=0xFE).contains(&bytes[1])
        }
        LeadByteFilter::Hz => (0xA1..=0xFD).contains(&bytes.first().copied().unwrap_or(0)),
    }
}

/// Enumerates the from-Unicode trie and collects every code point whose
/// result is a roundtrip (always) or a fallback (when `filter` allows it),
/// narrowed by `lead_filter`.
///
/// A GB 18030-enabled table overrides this with the full BMP-minus-surrogates
/// plus every supplementary plane, per [`crate::gb18030::is_in_gb18030_unicode_set`].
pub fn unicode_set(
    table: &Table,
    filter: SetFilter,
    lead_filter: LeadByteFilter,
    gb18030: bool,
) -> Vec<u32> {
    if gb18030 {
        return (0..=0x10FFFFu32)
            .filter(|&c| crate::gb18030::is_in_gb18030_unicode_set(c))
            .collect();
    }

    let max_c: u32 = if table.stage1.supports_supplementary() {
        0x10FFFF
    } else {
        0xFFFF
    };

    let mut set = Vec::new();
    for c in 0..=max_c {
        if (0xD800..=0xDFFF).contains(&c) {
            continue;
        }
        let Some(bytes) = crate::from_unicode::lookup_bytes(table, c, true) else {
            continue;
        };
        let is_roundtrip = table.is_roundtrip(c);
        if !is_roundtrip && filter == SetFilter::RoundtripOnly {
            continue;
        }
        if !passes_filter(lead_filter, &bytes) {
            continue;
        }
        set.push(c);
    }
    set
}

/// The lead-byte set of the initial state (or, for a DBCS-over-SISO table,
/// the state reached after the shift-out byte).
pub fn starters(table: &Table, out: &mut [bool; 256]) {
    let state = table.dbcs_only_state.unwrap_or(0);
    for byte in 0u16..256 {
        let byte = byte as u8;
        let is_starter = match table.state_entry(state, byte) {
            StateEntry::Transition { .. } => true,
            StateEntry::Final { action, .. } => !matches!(
                action,
                Action::StateChangeOnly | Action::Illegal | Action::Reserved(_)
            ),
        };
        out[byte as usize] = is_starter;
    }
}

/// Coarse classification used by callers that branch on converter shape
/// rather than inspecting `outputType` directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConverterKind {
    Sbcs,
    EbcdicStateful,
    Dbcs,
    Mbcs,
}

pub fn converter_kind(table: &Table) -> ConverterKind {
    if table.state_table.len() == 1 && table.output_type.is_sbcs() {
        ConverterKind::Sbcs
    } else if table.output_type.is_stateful() {
        ConverterKind::EbcdicStateful
    } else if table.max_bytes_per_char() == 2
        && matches!(table.output_type, OutputType::Dbcs2 | OutputType::DbcsOnly)
    {
        ConverterKind::Dbcs
    } else {
        ConverterKind::Mbcs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Action as A, OutputType, StateEntry as SE, TableBuilder};

    fn tiny_sbcs() -> Table {
        let stage1 = vec![0u16; 64];
        let stage2 = vec![0u16; 64];
        let mut bytes = vec![0u16; 16];
        bytes[1] = 0x0F41;
        let mut row0 = [0u32; 256];
        row0[0x41] = SE::Final {
            next_state: 0,
            action: A::BmpRoundtrip,
            payload: 0x41,
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
    fn single_state_sbcs_is_classified_sbcs() {
        let table = tiny_sbcs();
        assert_eq!(converter_kind(&table), ConverterKind::Sbcs);
    }

    #[test]
    fn starters_reports_the_one_mapped_byte() {
        let table = tiny_sbcs();
        let mut out = [false; 256];
        starters(&table, &mut out);
        assert!(out[0x41]);
        assert!(!out[0x42]);
    }

    #[test]
    fn unicode_set_contains_the_roundtrip_char() {
        let table = tiny_sbcs();
        let set = unicode_set(&table, SetFilter::RoundtripOnly, LeadByteFilter::None, false);
        assert!(set.contains(&0x41));
    }
}
