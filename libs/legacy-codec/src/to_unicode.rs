//! Legacy bytes to Unicode (UTF-16 code units) (C2).

use crate::extension::ExtensionOutcome;
use crate::status::Status;
use crate::table::{Action, StateEntry, StateRow, Table, ILLEGAL_UNIT, UNASSIGNED_UNIT};

/// Scratch state carried between calls: the state-machine position, the
/// scalar-offset accumulator, the bytes seen so far for the in-progress
/// character (for error reporting and extension continuation), and any
/// code units computed but not yet flushed because the output buffer filled.
#[derive(Debug, Default)]
pub struct ToUnicodeState {
    mode: u8,
    offset_accumulator: u32,
    to_u_bytes: Vec<u8>,
    pending: Vec<u16>,
    pending_pos: usize,
    /// Bytes the extension hook has claimed as a partial match, awaiting
    /// either more input or `flush_partial` at end of stream.
    pending_extension: Option<Vec<u8>>,
}

impl ToUnicodeState {
    pub fn reset(&mut self) {
        self.mode = 0;
        self.offset_accumulator = 0;
        self.to_u_bytes.clear();
        self.pending.clear();
        self.pending_pos = 0;
        self.pending_extension = None;
    }

    /// True if a character is mid-assembly (resuming a multi-byte sequence).
    pub fn is_mid_character(&self) -> bool {
        self.mode != 0
    }

    /// The raw bytes of the character currently being assembled (or the one
    /// that just failed), for substitution/diagnostic use.
    pub fn partial_bytes(&self) -> &[u8] {
        &self.to_u_bytes
    }
}

pub struct Outcome {
    pub input_consumed: usize,
    pub output_written: usize,
    pub status: Status,
}

/// One step of the state machine's emission, after a `Final` entry resolves
/// to something other than unassigned/illegal/state-change-only.
enum Emission {
    One(u16),
    Two(u16, u16),
    TryFallback,
    Unassigned,
    Illegal,
    StateChangeOnly,
}

fn resolve_final(table: &Table, action: Action, payload: u32) -> Emission {
    match action {
        Action::BmpRoundtrip | Action::BmpFallback => Emission::One(payload as u16),
        Action::SupplementaryRoundtrip | Action::SupplementaryFallback => {
            let c = payload + 0x10000;
            let (hi, lo) = supplementary_to_pair(c);
            Emission::Two(hi, lo)
        }
        Action::Indexed16 => {
            let unit = table.code_unit(payload);
            if unit == UNASSIGNED_UNIT {
                Emission::TryFallback
            } else if unit == ILLEGAL_UNIT {
                Emission::Illegal
            } else {
                Emission::One(unit)
            }
        }
        Action::IndexedPair => {
            let first = table.code_unit(payload);
            let second_offset = payload.checked_add(1);
            match first {
                0x0000..=0xD7FF => Emission::One(first),
                0xD800..=0xDBFF => second_offset
                    .map(|o| Emission::Two(first, table.code_unit(o)))
                    .unwrap_or(Emission::Illegal),
                0xDC00..=0xDFFF => second_offset
                    .map(|o| Emission::Two(first - 0x400, table.code_unit(o)))
                    .unwrap_or(Emission::Illegal),
                0xE000 => second_offset
                    .map(|o| Emission::One(table.code_unit(o)))
                    .unwrap_or(Emission::Illegal),
                0xE001 => second_offset
                    .map(|o| Emission::One(table.code_unit(o)))
                    .unwrap_or(Emission::Illegal),
                UNASSIGNED_UNIT => Emission::Unassigned,
                _ => Emission::Illegal,
            }
        }
        Action::Unassigned => Emission::Unassigned,
        Action::Illegal => Emission::Illegal,
        Action::StateChangeOnly | Action::Reserved(_) => Emission::StateChangeOnly,
    }
}

fn supplementary_to_pair(c: u32) -> (u16, u16) {
    let v = c - 0x10000;
    let hi = 0xD800 + (v >> 10) as u16;
    let lo = 0xDC00 + (v & 0x3FF) as u16;
    (hi, lo)
}

/// Converts a prefix of `input` to UTF-16 code units, resuming from
/// `state`. `flush` marks the final call for this stream: a character left
/// mid-assembly is then reported as [`Status::TruncatedCharFound`] instead of
/// [`Status::Ok`].
pub fn convert(
    table: &Table,
    state: &mut ToUnicodeState,
    input: &[u8],
    output: &mut [u16],
    mut offsets: Option<&mut [i32]>,
    extension: Option<&dyn crate::extension::ExtensionHook>,
    gb18030: bool,
    flush: bool,
    swap_row0: Option<&StateRow>,
) -> Outcome {
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

    macro_rules! emit {
        ($units:expr, $char_start:expr) => {{
            let units = $units;
            let mut written_here = 0usize;
            for &u in units.iter() {
                if out_pos >= output.len() {
                    state.pending = units[written_here..].to_vec();
                    state.pending_pos = 0;
                    return Outcome {
                        input_consumed: in_pos,
                        output_written: out_pos,
                        status: Status::BufferOverflow,
                    };
                }
                output[out_pos] = u;
                if let Some(offs) = offsets.as_deref_mut() {
                    offs[out_pos] = $char_start as i32;
                }
                out_pos += 1;
                written_here += 1;
            }
        }};
    }

    macro_rules! emit_scalar {
        ($cp:expr, $char_start:expr) => {{
            let cp = $cp;
            if cp <= 0xFFFF {
                emit!([cp as u16], $char_start)
            } else {
                let (hi, lo) = supplementary_to_pair(cp);
                emit!([hi, lo], $char_start)
            }
        }};
    }

    // A byte sequence the extension hook previously claimed as a partial
    // match (C7 step 3): grow it with whatever new input just arrived,
    // re-offering the candidate one byte at a time, or consult
    // `flush_partial` once the stream has truly ended.
    if let Some(mut bytes) = state.pending_extension.take() {
        let Some(hook) = extension else {
            // The hook can't disappear mid-stream in practice (it's fixed
            // per `Converter`), but don't panic on a state/config mismatch.
            return Outcome {
                input_consumed: in_pos,
                output_written: out_pos,
                status: Status::InvalidCharFound,
            };
        };
        loop {
            if in_pos >= input.len() {
                if !flush {
                    state.pending_extension = Some(bytes);
                    return Outcome {
                        input_consumed: in_pos,
                        output_written: out_pos,
                        status: Status::Ok,
                    };
                }
                match hook.flush_partial(&bytes) {
                    ExtensionOutcome::Consumed(cp) => emit_scalar!(cp, -1),
                    ExtensionOutcome::Partial | ExtensionOutcome::NoMatch => {
                        return Outcome {
                            input_consumed: in_pos,
                            output_written: out_pos,
                            status: Status::TruncatedCharFound,
                        };
                    }
                }
                break;
            }
            bytes.push(input[in_pos]);
            in_pos += 1;
            match hook.to_unicode_unassigned(&bytes) {
                ExtensionOutcome::Consumed(cp) => {
                    emit_scalar!(cp, -1);
                    break;
                }
                ExtensionOutcome::Partial => continue,
                ExtensionOutcome::NoMatch => {
                    return Outcome {
                        input_consumed: in_pos,
                        output_written: out_pos,
                        status: Status::InvalidCharFound,
                    };
                }
            }
        }
    }

    while in_pos < input.len() {
        // A character that started in a previous call's buffer reports
        // source index -1, matching the resumed-character contract.
        let char_start = (in_pos as i64 - state.to_u_bytes.len() as i64).max(-1);
        let byte = input[in_pos];
        let entry = if state.mode == 0 {
            if let Some(row0) = swap_row0 {
                StateEntry::from(row0[byte as usize])
            } else if let Some(dbcs_only_state) = table.dbcs_only_state {
                // EXT-ONLY DBCS-over-SISO view: a character always starts in
                // the DBCS-only state, so SI/SO bytes fall through to
                // whatever `dbcs_only_state` maps them to (normally illegal)
                // instead of being recognized as shift codes.
                table.state_entry(dbcs_only_state, byte)
            } else {
                table.state_entry(0, byte)
            }
        } else {
            table.state_entry(state.mode, byte)
        };
        match entry {
            StateEntry::Transition {
                next_state,
                offset_delta,
            } => {
                state.to_u_bytes.push(byte);
                state.offset_accumulator =
                    (state.offset_accumulator as i64 + offset_delta as i64) as u32;
                state.mode = next_state;
                in_pos += 1;
            }
            StateEntry::Final {
                next_state,
                action,
                payload,
            } => {
                state.to_u_bytes.push(byte);
                in_pos += 1;
                let combined_offset = state.offset_accumulator + payload;
                let emission = resolve_final(table, action, combined_offset);
                let bytes_consumed = std::mem::take(&mut state.to_u_bytes);
                state.offset_accumulator = 0;
                state.mode = next_state;

                match emission {
                    Emission::One(u) => emit!([u], char_start),
                    Emission::Two(a, b) => emit!([a, b], char_start),
                    Emission::StateChangeOnly => {}
                    Emission::TryFallback => match table.to_u_fallback(combined_offset) {
                        Some(cp) => emit_scalar!(cp, char_start),
                        None => match resolve_unassigned(extension, gb18030, &bytes_consumed) {
                            Resolution::Resolved(cp) => emit_scalar!(cp, char_start),
                            Resolution::Partial => {
                                state.pending_extension = Some(bytes_consumed);
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
                        },
                    },
                    Emission::Unassigned => match resolve_unassigned(extension, gb18030, &bytes_consumed) {
                        Resolution::Resolved(cp) => emit_scalar!(cp, char_start),
                        Resolution::Partial => {
                            state.pending_extension = Some(bytes_consumed);
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
                    },
                    Emission::Illegal => {
                        return Outcome {
                            input_consumed: in_pos,
                            output_written: out_pos,
                            status: Status::IllegalCharFound,
                        }
                    }
                }
            }
        }
    }

    if flush && state.is_mid_character() {
        return Outcome {
            input_consumed: in_pos,
            output_written: out_pos,
            status: Status::TruncatedCharFound,
        };
    }

    Outcome {
        input_consumed: in_pos,
        output_written: out_pos,
        status: Status::Ok,
    }
}

/// Outcome of offering an unassigned byte sequence to the extension hook and
/// (if enabled) the GB 18030 algorithmic ranges.
enum Resolution {
    Resolved(u32),
    /// The extension hook recognized `bytes` as a valid prefix; the caller
    /// must suspend and park them in [`ToUnicodeState::pending_extension`].
    Partial,
    Failed(Status),
}

fn resolve_unassigned(
    extension: Option<&dyn crate::extension::ExtensionHook>,
    gb18030: bool,
    bytes: &[u8],
) -> Resolution {
    if let Some(hook) = extension {
        match hook.to_unicode_unassigned(bytes) {
            ExtensionOutcome::Consumed(cp) => return Resolution::Resolved(cp),
            ExtensionOutcome::Partial => return Resolution::Partial,
            ExtensionOutcome::NoMatch => {}
        }
    }
    if gb18030 {
        if let Ok(arr) = <[u8; 4]>::try_from(bytes) {
            if let Some(cp) = crate::gb18030::to_unicode(arr) {
                return Resolution::Resolved(cp);
            }
        }
    }
    Resolution::Failed(Status::InvalidCharFound)
}

/// Decodes exactly one scalar value (combining a surrogate pair into a
/// single `u32`) from the front of `input`, per the `getNextUChar` entry
/// point. Returns `(scalar, bytes_consumed, status)`.
///
/// `extension` and `gb18030` are threaded through to the same fallback chain
/// [`convert`] uses; if that chain leaves an extension match pending more
/// bytes (nothing decodable as a single scalar yet), this returns
/// [`Status::UseToU`] with the bytes it did consume parked in `state` for
/// [`crate::Converter::to_unicode_with_offsets`] to pick up.
pub fn get_next_uchar(
    table: &Table,
    state: &mut ToUnicodeState,
    input: &[u8],
    extension: Option<&dyn crate::extension::ExtensionHook>,
    gb18030: bool,
    swap_row0: Option<&StateRow>,
) -> (u32, usize, Status) {
    if input.is_empty() && !state.is_mid_character() {
        return (0, 0, Status::IndexOutOfBounds);
    }
    let mut units = [0u16; 2];
    let outcome = convert(
        table, state, input, &mut units, None, extension, gb18030, true, swap_row0,
    );
    if outcome.status == Status::Ok && state.pending_extension.is_some() {
        return (0, outcome.input_consumed, Status::UseToU);
    }
    if outcome.status != Status::Ok {
        return (0, outcome.input_consumed, outcome.status);
    }
    match outcome.output_written {
        1 => (units[0] as u32, outcome.input_consumed, Status::Ok),
        2 => {
            let c = 0x10000 + (((units[0] as u32 - 0xD800) << 10) | (units[1] as u32 - 0xDC00));
            (c, outcome.input_consumed, Status::Ok)
        }
        _ => (0, outcome.input_consumed, Status::Ok),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{OutputType, TableBuilder};

    fn tiny_sbcs() -> Table {
        let stage1 = vec![0u16; 64];
        let stage2 = vec![0u16; 64];
        let bytes = vec![0u16; 16];
        let mut row0 = [0u32; 256];
        row0[0x41] = StateEntry::Final {
            next_state: 0,
            action: Action::BmpRoundtrip,
            payload: 0x41,
        }
        .into();
        row0[0x42] = StateEntry::Final {
            next_state: 0,
            action: Action::Unassigned,
            payload: 0,
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
    fn bmp_roundtrip_emits_one_unit() {
        let table = tiny_sbcs();
        let mut state = ToUnicodeState::default();
        let mut out = [0u16; 4];
        let outcome = convert(&table, &mut state, &[0x41], &mut out, None, None, false, true, None);
        assert_eq!(outcome.status, Status::Ok);
        assert_eq!(&out[..outcome.output_written], &[0x41]);
    }

    #[test]
    fn unassigned_byte_reports_invalid() {
        let table = tiny_sbcs();
        let mut state = ToUnicodeState::default();
        let mut out = [0u16; 4];
        let outcome = convert(&table, &mut state, &[0x42], &mut out, None, None, false, true, None);
        assert_eq!(outcome.status, Status::InvalidCharFound);
    }

    #[test]
    fn get_next_uchar_on_empty_input_is_out_of_bounds() {
        let table = tiny_sbcs();
        let mut state = ToUnicodeState::default();
        let (_, consumed, status) = get_next_uchar(&table, &mut state, &[], None, false, None);
        assert_eq!(consumed, 0);
        assert_eq!(status, Status::IndexOutOfBounds);
    }

    #[test]
    fn get_next_uchar_falls_back_on_pending_extension_match() {
        use crate::extension::ExtensionHook;

        struct GrowingHook;
        impl ExtensionHook for GrowingHook {
            fn to_unicode_unassigned(&self, bytes: &[u8]) -> ExtensionOutcome<u32> {
                if bytes == [0x42] {
                    ExtensionOutcome::Partial
                } else {
                    ExtensionOutcome::NoMatch
                }
            }
        }

        let mut row0 = [0u32; 256];
        row0[0x42] = StateEntry::Final {
            next_state: 0,
            action: Action::Unassigned,
            payload: 0,
        }
        .into();
        let table = TableBuilder::new(OutputType::Sbcs1)
            .state_table(vec![row0])
            .stage1(vec![0u16; 64])
            .stage2_sbcs(vec![0u16; 64])
            .from_bytes_sbcs(vec![0u16; 16])
            .build();

        let hook = GrowingHook;
        let mut state = ToUnicodeState::default();
        let (scalar, consumed, status) = get_next_uchar(&table, &mut state, &[0x42], Some(&hook), false, None);
        assert_eq!(scalar, 0);
        assert_eq!(consumed, 1);
        assert_eq!(status, Status::UseToU);
    }

    /// An EXT-ONLY/DBCS-only view over a SISO base: state 0 must behave as
    /// `dbcs_only_state` instead of the real shift-aware state 0, so a byte
    /// that would otherwise shift in/out is illegal in this view.
    fn dbcs_only_table() -> Table {
        let stage1 = vec![0u16; 64];
        let stage2 = vec![0u16; 64];
        let bytes = vec![0u16; 16];
        let mut row0 = [0u32; 256];
        // Real state 0: 0x0E shifts to the DBCS state (state 1).
        row0[0x0E] = StateEntry::Final {
            next_state: 1,
            action: Action::StateChangeOnly,
            payload: 0,
        }
        .into();
        let mut row1 = [0u32; 256];
        // The DBCS-only substitute state: 0x0E is illegal here, and a lead
        // byte starts a two-byte sequence ending in state 2.
        row1[0x0E] = StateEntry::Final {
            next_state: 1,
            action: Action::Illegal,
            payload: 0,
        }
        .into();
        row1[0x41] = StateEntry::Transition {
            next_state: 2,
            offset_delta: 0,
        }
        .into();
        let mut row2 = [0u32; 256];
        row2[0x41] = StateEntry::Final {
            next_state: 1,
            action: Action::BmpRoundtrip,
            payload: 0x4E00,
        }
        .into();
        let mut table = TableBuilder::new(OutputType::Siso2)
            .state_table(vec![row0, row1, row2])
            .stage1(stage1)
            .stage2_sbcs(stage2)
            .from_bytes_sbcs(bytes)
            .build();
        table.dbcs_only_state = Some(1);
        table
    }

    #[test]
    fn dbcs_only_state_substitutes_for_state_zero() {
        let table = dbcs_only_table();
        let mut state = ToUnicodeState::default();
        let mut out = [0u16; 4];
        let outcome = convert(&table, &mut state, &[0x41, 0x41], &mut out, None, None, false, true, None);
        assert_eq!(outcome.status, Status::Ok);
        assert_eq!(&out[..outcome.output_written], &[0x4E00]);
    }

    #[test]
    fn dbcs_only_state_makes_shift_byte_illegal() {
        let table = dbcs_only_table();
        let mut state = ToUnicodeState::default();
        let mut out = [0u16; 4];
        let outcome = convert(&table, &mut state, &[0x0E], &mut out, None, None, false, true, None);
        assert_eq!(outcome.status, Status::IllegalCharFound);
    }
}
