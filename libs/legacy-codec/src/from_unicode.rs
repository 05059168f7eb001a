//! Unicode (UTF-16 code units) to legacy bytes (C3).

use crate::extension::ExtensionOutcome;
use crate::status::Status;
use crate::table::{
    FromUnicodeBytes, OutputType, Stage2, Table, SBCS_KIND_FALLBACK, SBCS_KIND_FALLBACK_PUA,
    SBCS_KIND_ROUNDTRIP, SBCS_KIND_UNASSIGNED,
};

/// Scratch state carried between calls so a buffer-overflow or a split
/// surrogate pair resumes cleanly on the next invocation.
#[derive(Debug, Default)]
pub struct FromUnicodeState {
    /// Bytes computed for the previous code point but not yet flushed to the
    /// caller's buffer because it filled up mid-character.
    pending: Vec<u8>,
    pending_pos: usize,
    /// A high surrogate seen with no low surrogate yet.
    lead_surrogate: Option<u16>,
    /// A scalar the extension hook marked as a partial match (C7 §flush):
    /// awaiting either a following scalar to offer to `from_unicode_continue`
    /// or `flush_partial_from_unicode` at end of stream.
    pending_extension: Option<u32>,
    /// SISO (C2/C3 stateful) tables only: whether the last byte written left
    /// the output stream shifted into two-byte mode.
    dbcs_mode: bool,
}

impl FromUnicodeState {
    pub fn reset(&mut self) {
        self.pending.clear();
        self.pending_pos = 0;
        self.lead_surrogate = None;
        self.pending_extension = None;
        self.dbcs_mode = false;
    }

    pub fn has_pending(&self) -> bool {
        self.pending_pos < self.pending.len()
            || self.lead_surrogate.is_some()
            || self.pending_extension.is_some()
    }
}

/// Looks up the from-Unicode byte sequence for scalar value `c`, without
/// consulting the extension hook or GB 18030 algorithmic ranges.
///
/// `use_fallback` selects whether a fallback (non-roundtrip) mapping is
/// accepted; callers building the ASCII/fast-index caches in
/// [`crate::table::Table::compute_derived`] pass `true` to mirror the
/// behavior an actual converter call would see by default.
pub(crate) fn lookup_bytes(table: &Table, c: u32, use_fallback: bool) -> Option<Vec<u8>> {
    lookup_bytes_in(table, &table.from_unicode_bytes, c, use_fallback)
}

/// Same as [`lookup_bytes`], but reads stage 3 out of `bytes_pool` instead of
/// `table.from_unicode_bytes` — the seam the LF/NL swap overlay (C6) uses to
/// substitute its patched pool for the two code points it touches without
/// cloning stage 1/2.
pub(crate) fn lookup_bytes_in(
    table: &Table,
    bytes_pool: &FromUnicodeBytes,
    c: u32,
    use_fallback: bool,
) -> Option<Vec<u8>> {
    let (kind, raw) = raw_lookup(table, bytes_pool, c)?;
    if kind == LookupKind::Unassigned {
        return None;
    }
    if kind == LookupKind::Fallback && !use_fallback {
        return None;
    }
    Some(assemble_bytes(table.output_type, raw))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LookupKind {
    Roundtrip,
    Fallback,
    Unassigned,
}

/// Stage 1/2/3 walk shared by [`lookup_bytes`] and the main engine. Returns
/// the kind tag and the raw stage-3 payload (already masked to the relevant
/// width for the table's output type).
fn raw_lookup(table: &Table, bytes_pool: &FromUnicodeBytes, c: u32) -> Option<(LookupKind, u32)> {
    if c > 0x10FFFF {
        return None;
    }
    if !table.stage1.supports_supplementary() && c > 0xFFFF {
        return None;
    }
    let idx = table.stage2_index(c);
    match &table.stage2 {
        Stage2::Sbcs(pool) => {
            let stage3_index = *pool.get(idx)? as usize;
            let FromUnicodeBytes::Sbcs(bytes) = bytes_pool else {
                unreachable!("SBCS stage2 implies SBCS stage3 pool")
            };
            let word = *bytes.get(stage3_index * 16 + (c & 0xF) as usize)?;
            let kind_nibble = ((word >> 8) & 0xF) as u16;
            let kind = match kind_nibble {
                SBCS_KIND_ROUNDTRIP => LookupKind::Roundtrip,
                SBCS_KIND_FALLBACK | SBCS_KIND_FALLBACK_PUA => LookupKind::Fallback,
                SBCS_KIND_UNASSIGNED => return None,
                _ => LookupKind::Fallback,
            };
            Some((kind, (word & 0xFF) as u32))
        }
        Stage2::Mbcs(pool) => {
            let entry = *pool.get(idx)?;
            let stage3_index = (entry & 0xFFFF) as usize;
            let roundtrip_bits = (entry >> 16) as u16;
            let slot = (c & 0xF) as usize;
            let raw = match bytes_pool {
                FromUnicodeBytes::Word16(v) => *v.get(stage3_index * 16 + slot)? as u32,
                FromUnicodeBytes::Word24(v) => {
                    let b = v.get(stage3_index * 16 + slot)?;
                    u32::from_be_bytes([0, b[0], b[1], b[2]])
                }
                FromUnicodeBytes::Word32(v) => *v.get(stage3_index * 16 + slot)?,
                FromUnicodeBytes::Sbcs(_) => unreachable!("MBCS stage2 implies non-SBCS stage3"),
            };
            if raw == 0 && c != 0 {
                return None;
            }
            let kind = if roundtrip_bits & (1 << slot) != 0 {
                LookupKind::Roundtrip
            } else {
                LookupKind::Fallback
            };
            Some((kind, raw))
        }
    }
}

fn assemble_bytes(output_type: OutputType, raw: u32) -> Vec<u8> {
    match output_type {
        OutputType::Sbcs1 => vec![raw as u8],
        OutputType::Dbcs2 | OutputType::Siso2 | OutputType::DbcsOnly => {
            if raw <= 0xFF {
                vec![raw as u8]
            } else {
                vec![(raw >> 8) as u8, raw as u8]
            }
        }
        OutputType::Mbcs3 | OutputType::Euc3 => {
            let b = raw.to_be_bytes();
            trim_leading_zeros(&b[1..])
        }
        OutputType::Mbcs4 | OutputType::Euc4 => {
            let b = raw.to_be_bytes();
            trim_leading_zeros(&b)
        }
        OutputType::ExtOnly => Vec::new(),
    }
}

fn trim_leading_zeros(bytes: &[u8]) -> Vec<u8> {
    let first_nonzero = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len() - 1);
    bytes[first_nonzero..].to_vec()
}

/// Decodes the next scalar value from a UTF-16 code-unit slice at `pos`,
/// reporting how many code units it consumed and whether it was a lone
/// surrogate (illegal going from Unicode).
fn next_scalar(units: &[u16], pos: usize) -> (u32, usize, bool) {
    let u = units[pos];
    if (0xD800..0xDC00).contains(&u) {
        if let Some(&low) = units.get(pos + 1) {
            if (0xDC00..0xE000).contains(&low) {
                let c = 0x10000 + (((u as u32 - 0xD800) << 10) | (low as u32 - 0xDC00));
                return (c, 2, false);
            }
        }
        (u as u32, 1, true)
    } else if (0xDC00..0xE000).contains(&u) {
        (u as u32, 1, true)
    } else {
        (u as u32, 1, false)
    }
}

/// Outcome of resolving one scalar value's legacy byte sequence.
enum Resolution {
    Resolved(Vec<u8>),
    /// The extension hook recognized `c` as a valid prefix of a combined
    /// mapping; the caller must suspend and park it in
    /// [`FromUnicodeState::pending_extension`].
    Partial,
    Failed(Status),
}

/// Step 6 of the from-Unicode direction: ASCII fast path, then the trie,
/// then the extension hook, then (if enabled) GB 18030's algorithmic ranges.
fn resolve_scalar(
    table: &Table,
    bytes_pool: &FromUnicodeBytes,
    ascii_roundtrips: bool,
    extension: Option<&dyn crate::extension::ExtensionHook>,
    gb18030: bool,
    c: u32,
) -> Resolution {
    if ascii_roundtrips && c < 0x80 && table.ascii_roundtrip(c as u8) {
        return Resolution::Resolved(vec![c as u8]);
    }
    if let Some(v) = lookup_bytes_in(table, bytes_pool, c, true) {
        return Resolution::Resolved(v);
    }
    if let Some(hook) = extension {
        match hook.from_unicode_unassigned(c) {
            ExtensionOutcome::Consumed(v) => return Resolution::Resolved(v),
            ExtensionOutcome::Partial => return Resolution::Partial,
            ExtensionOutcome::NoMatch => {}
        }
    }
    match gb18030_or_invalid(gb18030, c) {
        Ok(v) => Resolution::Resolved(v),
        Err(status) => Resolution::Failed(status),
    }
}

fn gb18030_or_invalid(gb18030: bool, c: u32) -> Result<Vec<u8>, Status> {
    if gb18030 {
        crate::gb18030::from_unicode(c).ok_or(Status::InvalidCharFound)
    } else {
        Err(Status::InvalidCharFound)
    }
}

/// Outcome of converting as much of `input` as fits in `output`.
pub struct Outcome {
    pub input_consumed: usize,
    pub output_written: usize,
    pub status: Status,
}

/// Converts a prefix of `input` (UTF-16 code units) to legacy bytes,
/// honoring `state.pending` left over from a previous overflow.
///
/// `extension` and `gb18030` implement the fallback chain of step 6: an
/// unassigned code point is offered to the extension hook, then (only if the
/// table is flagged `gb18030`) to the algorithmic ranges, before finally
/// being reported as [`Status::InvalidCharFound`].
///
/// For a [`OutputType::Siso2`] table, a shift byte (0x0E/0x0F) is inserted
/// ahead of a character's bytes whenever its one/two-byte width differs from
/// `state.dbcs_mode`; `flush` additionally emits a trailing SI if the stream
/// ends shifted into two-byte mode.
pub fn convert(
    table: &Table,
    state: &mut FromUnicodeState,
    input: &[u16],
    output: &mut [u8],
    mut offsets: Option<&mut [i32]>,
    ascii_roundtrips: bool,
    extension: Option<&dyn crate::extension::ExtensionHook>,
    gb18030: bool,
    swap_bytes: Option<&FromUnicodeBytes>,
    flush: bool,
) -> Outcome {
    let bytes_pool = swap_bytes.unwrap_or(&table.from_unicode_bytes);
    let mut in_pos = 0usize;
    let mut out_pos = 0usize;

    macro_rules! flush_pending {
        () => {
            while state.pending_pos < state.pending.len() {
                if out_pos >= output.len() {
                    return Outcome {
                        input_consumed: in_pos,
                        output_written: out_pos,
                        status: Status::BufferOverflow,
                    };
                }
                output[out_pos] = state.pending[state.pending_pos];
                if let Some(offs) = offsets.as_deref_mut() {
                    offs[out_pos] = -1;
                }
                out_pos += 1;
                state.pending_pos += 1;
            }
            state.pending.clear();
            state.pending_pos = 0;
        };
    }
    flush_pending!();

    macro_rules! write_out {
        ($bytes:expr, $char_start:expr) => {{
            let bytes = $bytes;
            let to_write: Vec<u8> = if matches!(table.output_type, OutputType::Siso2) {
                let want_dbcs = bytes.len() == 2;
                let mut v = Vec::with_capacity(bytes.len() + 1);
                if want_dbcs != state.dbcs_mode {
                    v.push(if want_dbcs { 0x0E } else { 0x0F });
                    state.dbcs_mode = want_dbcs;
                }
                v.extend_from_slice(&bytes);
                v
            } else {
                bytes
            };
            for (i, &b) in to_write.iter().enumerate() {
                if out_pos >= output.len() {
                    state.pending = to_write[i..].to_vec();
                    state.pending_pos = 0;
                    return Outcome {
                        input_consumed: in_pos,
                        output_written: out_pos,
                        status: Status::BufferOverflow,
                    };
                }
                output[out_pos] = b;
                if let Some(offs) = offsets.as_deref_mut() {
                    offs[out_pos] = $char_start;
                }
                out_pos += 1;
            }
        }};
    }

    // A scalar the extension hook previously marked a partial match for
    // (C7 §flush): offer it a following scalar to combine with, or resolve
    // it alone once the stream has truly ended.
    if let Some(pending) = state.pending_extension.take() {
        if in_pos < input.len() {
            let (next, next_consumed, lone_surrogate) = next_scalar(input, in_pos);
            if lone_surrogate {
                return Outcome {
                    input_consumed: in_pos,
                    output_written: out_pos,
                    status: Status::IllegalCharFound,
                };
            }
            let combined = extension.map(|hook| hook.from_unicode_continue(pending, next));
            match combined {
                Some(ExtensionOutcome::Consumed(bytes)) => {
                    in_pos += next_consumed;
                    write_out!(bytes, -1);
                }
                _ => match gb18030_or_invalid(gb18030, pending) {
                    Ok(bytes) => write_out!(bytes, -1),
                    Err(status) => {
                        return Outcome {
                            input_consumed: in_pos,
                            output_written: out_pos,
                            status,
                        }
                    }
                },
            }
        } else if flush {
            let resolved = extension.map(|hook| hook.flush_partial_from_unicode(pending));
            match resolved {
                Some(ExtensionOutcome::Consumed(bytes)) => write_out!(bytes, -1),
                _ => match gb18030_or_invalid(gb18030, pending) {
                    Ok(bytes) => write_out!(bytes, -1),
                    Err(status) => {
                        return Outcome {
                            input_consumed: in_pos,
                            output_written: out_pos,
                            status,
                        }
                    }
                },
            }
        } else {
            state.pending_extension = Some(pending);
            return Outcome {
                input_consumed: in_pos,
                output_written: out_pos,
                status: Status::Ok,
            };
        }
    }

    while in_pos < input.len() {
        let char_start = in_pos as i32;

        // A high surrogate parked by a previous non-flush call (C3 §4.3
        // step 1): combine it with this call's first code unit if it's a
        // low surrogate, or report the orphan.
        if let Some(high) = state.lead_surrogate.take() {
            let low = input[in_pos];
            if (0xDC00..0xE000).contains(&low) {
                let c = 0x10000 + (((high as u32 - 0xD800) << 10) | (low as u32 - 0xDC00));
                in_pos += 1;
                match resolve_scalar(table, bytes_pool, ascii_roundtrips, extension, gb18030, c) {
                    Resolution::Resolved(bytes) => write_out!(bytes, -1),
                    Resolution::Partial => {
                        state.pending_extension = Some(c);
                        return Outcome {
                            input_consumed: in_pos,
                            output_written: out_pos,
                            status: Status::Ok,
                        };
                    }
                    Resolution::Failed(status) => {
                        return Outcome {
                            input_consumed: in_pos,
                            output_written: out_pos,
                            status,
                        }
                    }
                }
                continue;
            } else {
                return Outcome {
                    input_consumed: in_pos,
                    output_written: out_pos,
                    status: Status::IllegalCharFound,
                };
            }
        }

        let u = input[in_pos];
        if (0xD800..0xDC00).contains(&u) && in_pos + 1 >= input.len() {
            // A high surrogate as the last unit of a non-flush buffer: park
            // it for the next call's low surrogate instead of reporting it
            // as an orphan.
            if !flush {
                state.lead_surrogate = Some(u);
                in_pos += 1;
                break;
            }
            return Outcome {
                input_consumed: in_pos,
                output_written: out_pos,
                status: Status::IllegalCharFound,
            };
        }

        let (c, consumed, lone_surrogate) = next_scalar(input, in_pos);
        if lone_surrogate {
            return Outcome {
                input_consumed: in_pos,
                output_written: out_pos,
                status: Status::IllegalCharFound,
            };
        }

        match resolve_scalar(table, bytes_pool, ascii_roundtrips, extension, gb18030, c) {
            Resolution::Resolved(bytes) => write_out!(bytes, char_start),
            Resolution::Partial => {
                state.pending_extension = Some(c);
                in_pos += consumed;
                return Outcome {
                    input_consumed: in_pos,
                    output_written: out_pos,
                    status: Status::Ok,
                };
            }
            Resolution::Failed(status) => {
                return Outcome {
                    input_consumed: in_pos,
                    output_written: out_pos,
                    status,
                }
            }
        }

        in_pos += consumed;
    }

    if flush && matches!(table.output_type, OutputType::Siso2) && state.dbcs_mode {
        state.dbcs_mode = false;
        if out_pos >= output.len() {
            state.pending = vec![0x0F];
            state.pending_pos = 0;
            return Outcome {
                input_consumed: in_pos,
                output_written: out_pos,
                status: Status::BufferOverflow,
            };
        }
        output[out_pos] = 0x0F;
        if let Some(offs) = offsets.as_deref_mut() {
            offs[out_pos] = in_pos.saturating_sub(1) as i32;
        }
        out_pos += 1;
    }

    Outcome {
        input_consumed: in_pos,
        output_written: out_pos,
        status: Status::Ok,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{StateEntry, TableBuilder};

    fn tiny_sbcs() -> Table {
        // 'A' (0x41) maps to byte 0x41 (roundtrip), 'B' (0x42) unassigned.
        let mut stage1 = vec![0u16; 64];
        stage1[0] = 0;
        let stage2 = vec![0u16; 64];
        let mut bytes = vec![0u16; 16];
        bytes[1] = 0x0F41; // 'A' - 0x40 = slot 1, kind=F roundtrip, byte 0x41
        let state_table = vec![{
            let mut row = [0u32; 256];
            row[0x41] = StateEntry::Final {
                next_state: 0,
                action: crate::table::Action::BmpRoundtrip,
                payload: 0x41,
            }
            .into();
            row
        }];
        TableBuilder::new(OutputType::Sbcs1)
            .state_table(state_table)
            .stage1(stage1)
            .stage2_sbcs(stage2)
            .from_bytes_sbcs(bytes)
            .build()
    }

    #[test]
    fn roundtrip_ascii_like_char() {
        let table = tiny_sbcs();
        let mut state = FromUnicodeState::default();
        let input = [0x41u16];
        let mut out = [0u8; 4];
        let outcome = convert(&table, &mut state, &input, &mut out, None, true, None, false, None, true);
        assert_eq!(outcome.status, Status::Ok);
        assert_eq!(&out[..outcome.output_written], &[0x41]);
    }

    #[test]
    fn unassigned_char_reports_invalid() {
        let table = tiny_sbcs();
        let mut state = FromUnicodeState::default();
        let input = [0x42u16];
        let mut out = [0u8; 4];
        let outcome = convert(&table, &mut state, &input, &mut out, None, true, None, false, None, true);
        assert_eq!(outcome.status, Status::InvalidCharFound);
    }

    #[test]
    fn lone_surrogate_is_illegal() {
        let table = tiny_sbcs();
        let mut state = FromUnicodeState::default();
        let input = [0xD800u16];
        let mut out = [0u8; 4];
        let outcome = convert(&table, &mut state, &input, &mut out, None, true, None, false, None, true);
        assert_eq!(outcome.status, Status::IllegalCharFound);
    }

    #[test]
    fn trailing_high_surrogate_parks_instead_of_illegal() {
        let table = tiny_sbcs();
        let mut state = FromUnicodeState::default();
        let mut out = [0u8; 4];
        let outcome = convert(&table, &mut state, &[0xD800], &mut out, None, true, None, false, None, false);
        assert_eq!(outcome.status, Status::Ok);
        assert_eq!(outcome.input_consumed, 1);
        assert_eq!(outcome.output_written, 0);
        assert!(state.lead_surrogate.is_some());
    }

    #[test]
    fn resuming_surrogate_pair_combines_across_calls() {
        use crate::tables::multi_byte::gb18030_like;

        let table = gb18030_like();
        let mut state = FromUnicodeState::default();
        let mut out = [0u8; 4];

        let first = convert(&table, &mut state, &[0xD800], &mut out, None, true, None, true, None, false);
        assert_eq!(first.status, Status::Ok);
        assert_eq!(first.output_written, 0);

        let mut offsets = [0i32; 4];
        let second = convert(
            &table,
            &mut state,
            &[0xDC00],
            &mut out,
            Some(&mut offsets),
            true,
            None,
            true,
            None,
            true,
        );
        assert_eq!(second.status, Status::Ok);
        assert_eq!(second.output_written, 4);
        assert_eq!(offsets[0], -1);

        // A single, un-split call over the combined scalar must agree.
        let mut whole_state = FromUnicodeState::default();
        let mut whole_out = [0u8; 4];
        let units = [0xD800u16, 0xDC00u16];
        let whole_outcome =
            convert(&table, &mut whole_state, &units, &mut whole_out, None, true, None, true, None, true);
        assert_eq!(whole_outcome.status, Status::Ok);
        assert_eq!(&whole_out[..whole_outcome.output_written], &out[..second.output_written]);
    }

    struct ComboHook;
    impl crate::extension::ExtensionHook for ComboHook {
        fn from_unicode_unassigned(&self, c: u32) -> ExtensionOutcome<Vec<u8>> {
            if c == 0x1112 {
                ExtensionOutcome::Partial
            } else {
                ExtensionOutcome::NoMatch
            }
        }

        fn from_unicode_continue(&self, pending: u32, next: u32) -> ExtensionOutcome<Vec<u8>> {
            if pending == 0x1112 && next == 0x2222 {
                ExtensionOutcome::Consumed(vec![0xAA, 0xBB])
            } else {
                ExtensionOutcome::NoMatch
            }
        }

        fn flush_partial_from_unicode(&self, pending: u32) -> ExtensionOutcome<Vec<u8>> {
            if pending == 0x1112 {
                ExtensionOutcome::Consumed(vec![0xCC])
            } else {
                ExtensionOutcome::NoMatch
            }
        }
    }

    #[test]
    fn extension_partial_combines_with_next_call() {
        let table = tiny_sbcs();
        let hook = ComboHook;
        let mut state = FromUnicodeState::default();
        let mut out = [0u8; 4];

        let first = convert(&table, &mut state, &[0x1112], &mut out, None, true, Some(&hook), false, None, false);
        assert_eq!(first.status, Status::Ok);
        assert_eq!(first.output_written, 0);

        let second = convert(&table, &mut state, &[0x2222], &mut out, None, true, Some(&hook), false, None, true);
        assert_eq!(second.status, Status::Ok);
        assert_eq!(&out[..second.output_written], &[0xAA, 0xBB]);
    }

    #[test]
    fn extension_partial_resolves_alone_at_flush() {
        let table = tiny_sbcs();
        let hook = ComboHook;
        let mut state = FromUnicodeState::default();
        let mut out = [0u8; 4];

        let first = convert(&table, &mut state, &[0x1112], &mut out, None, true, Some(&hook), false, None, false);
        assert_eq!(first.status, Status::Ok);
        assert_eq!(first.output_written, 0);

        let second = convert(&table, &mut state, &[], &mut out, None, true, Some(&hook), false, None, true);
        assert_eq!(second.status, Status::Ok);
        assert_eq!(&out[..second.output_written], &[0xCC]);
    }
}
