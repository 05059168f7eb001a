//! UTF-8 direct bridge (C4): decodes UTF-8 and look up codepage output in a
//! single pass, skipping the UTF-16 intermediate entirely.

use crate::status::Status;
use crate::table::{OutputType, Table};

const UTF8_MIN_LEGAL: [u32; 5] = [0, 0, 0x80, 0x800, 0x10000];
const UTF8_OFFSETS: [u32; 5] = [0, 0, 0x3080, 0xE2080, 0x3C82080];

/// Scratch state for a truncated trailing UTF-8 sequence that spanned the
/// end of one call's input.
#[derive(Debug, Default, Clone, Copy)]
pub enum Utf8BridgeState {
    #[default]
    Idle,
    Collecting {
        length: u8,
        limit: u8,
        saved: [u8; 4],
    },
}

impl Utf8BridgeState {
    pub fn reset(&mut self) {
        *self = Utf8BridgeState::Idle;
    }
}

pub struct Outcome {
    pub input_consumed: usize,
    pub output_written: usize,
    pub status: Status,
}

fn sequence_length(lead: u8) -> Option<u8> {
    match lead {
        0x00..=0x7F => Some(1),
        0xC2..=0xDF => Some(2),
        0xE0..=0xEF => Some(3),
        0xF0..=0xF4 => Some(4),
        _ => None,
    }
}

/// Decodes one UTF-8 sequence starting at `bytes[0]`, returning the scalar
/// value and the number of bytes consumed, or `None` if `bytes` holds fewer
/// than the sequence's full length (caller should buffer and resume).
fn decode_one(bytes: &[u8]) -> Result<Option<(u32, u8)>, ()> {
    let lead = bytes[0];
    let len = sequence_length(lead).ok_or(())?;
    if (bytes.len() as u8) < len {
        return Ok(None);
    }
    let mut c = 0u32;
    for i in 0..len as usize {
        let b = bytes[i];
        if i > 0 && b & 0xC0 != 0x80 {
            return Err(());
        }
        c = (c << 6) + b as u32;
    }
    c -= UTF8_OFFSETS[len as usize];

    if c < UTF8_MIN_LEGAL[len as usize] {
        return Err(());
    }
    if (0xD800..=0xDFFF).contains(&c) {
        return Err(());
    }
    if len == 4 && !(0x10000..=0x10FFFF).contains(&c) {
        return Err(());
    }
    Ok(Some((c, len)))
}

/// Shared engine for `sbcs_from_utf8`/`dbcs_from_utf8`: decodes UTF-8 from
/// `input` and writes legacy bytes (looked up via `lookup`) to `output`.
/// `lookup` receives a scalar and returns the codepage bytes (already having
/// applied ASCII fast-path/extension/GB 18030 fallback as the caller wants).
fn convert_with(
    state: &mut Utf8BridgeState,
    input: &[u8],
    output: &mut [u8],
    mut lookup: impl FnMut(u32) -> Option<Vec<u8>>,
) -> Outcome {
    let mut in_pos = 0usize;
    let mut out_pos = 0usize;

    if let Utf8BridgeState::Collecting {
        length,
        limit,
        saved,
    } = *state
    {
        let have = limit;
        let need = length - have;
        let take = need.min(input.len() as u8);
        let mut buf = saved;
        buf[have as usize..have as usize + take as usize]
            .copy_from_slice(&input[..take as usize]);
        if take < need {
            *state = Utf8BridgeState::Collecting {
                length,
                limit: have + take,
                saved: buf,
            };
            return Outcome {
                input_consumed: take as usize,
                output_written: 0,
                status: Status::Ok,
            };
        }
        in_pos = take as usize;
        state.reset();
        match decode_one(&buf[..length as usize]) {
            Ok(Some((c, _))) => {
                if let Some(bytes) = lookup(c) {
                    for b in bytes {
                        if out_pos >= output.len() {
                            return Outcome {
                                input_consumed: in_pos,
                                output_written: out_pos,
                                status: Status::BufferOverflow,
                            };
                        }
                        output[out_pos] = b;
                        out_pos += 1;
                    }
                } else {
                    return Outcome {
                        input_consumed: in_pos,
                        output_written: out_pos,
                        status: Status::InvalidCharFound,
                    };
                }
            }
            _ => {
                return Outcome {
                    input_consumed: in_pos,
                    output_written: out_pos,
                    status: Status::IllegalCharFound,
                }
            }
        }
    }

    while in_pos < input.len() {
        let remaining = &input[in_pos..];
        match decode_one(remaining) {
            Err(()) => {
                return Outcome {
                    input_consumed: in_pos,
                    output_written: out_pos,
                    status: Status::IllegalCharFound,
                }
            }
            Ok(None) => {
                let lead = remaining[0];
                let length = sequence_length(lead).unwrap();
                let mut saved = [0u8; 4];
                saved[..remaining.len()].copy_from_slice(remaining);
                *state = Utf8BridgeState::Collecting {
                    length,
                    limit: remaining.len() as u8,
                    saved,
                };
                in_pos = input.len();
                return Outcome {
                    input_consumed: in_pos,
                    output_written: out_pos,
                    status: Status::Ok,
                };
            }
            Ok(Some((c, len))) => {
                if let Some(bytes) = lookup(c) {
                    for b in bytes {
                        if out_pos >= output.len() {
                            return Outcome {
                                input_consumed: in_pos,
                                output_written: out_pos,
                                status: Status::BufferOverflow,
                            };
                        }
                        output[out_pos] = b;
                        out_pos += 1;
                    }
                    in_pos += len as usize;
                } else {
                    return Outcome {
                        input_consumed: in_pos,
                        output_written: out_pos,
                        status: Status::InvalidCharFound,
                    };
                }
            }
        }
    }

    Outcome {
        input_consumed: in_pos,
        output_written: out_pos,
        status: Status::Ok,
    }
}

/// `sbcs_from_utf8`: UTF-8 straight to a single-byte-per-character table.
///
/// `swap_bytes` is the LF/NL-swapped stage-3 pool (C6), if that view is
/// active; the shared `fast_index` was built against the unswapped table, so
/// it is bypassed for the two code points the swap touches.
pub fn sbcs_from_utf8(
    table: &Table,
    state: &mut Utf8BridgeState,
    input: &[u8],
    output: &mut [u8],
    swap_bytes: Option<&crate::table::FromUnicodeBytes>,
) -> Outcome {
    debug_assert!(matches!(table.output_type, OutputType::Sbcs1));
    convert_with(state, input, output, |c| lookup(table, swap_bytes, c))
}

/// `dbcs_from_utf8`: UTF-8 straight to a two-byte-per-character table.
pub fn dbcs_from_utf8(
    table: &Table,
    state: &mut Utf8BridgeState,
    input: &[u8],
    output: &mut [u8],
    swap_bytes: Option<&crate::table::FromUnicodeBytes>,
) -> Outcome {
    debug_assert!(matches!(
        table.output_type,
        OutputType::Dbcs2 | OutputType::Siso2 | OutputType::DbcsOnly
    ));
    convert_with(state, input, output, |c| lookup(table, swap_bytes, c))
}

fn lookup(table: &Table, swap_bytes: Option<&crate::table::FromUnicodeBytes>, c: u32) -> Option<Vec<u8>> {
    const SWAPPED: [u32; 2] = [0x000A, 0x0085];
    if swap_bytes.is_some() && SWAPPED.contains(&c) {
        return crate::from_unicode::lookup_bytes_in(table, swap_bytes.unwrap(), c, true);
    }
    fast_lookup(table, c).or_else(|| crate::from_unicode::lookup_bytes(table, c, true))
}

/// Consults the table's [`crate::table::FastIndex`] (`sbcsIndex`/`mbcsIndex`)
/// before falling back to the general trie walk, the same shortcut the
/// to-Unicode engine's ASCII path uses.
fn fast_lookup(table: &Table, c: u32) -> Option<Vec<u8>> {
    let entry = table.fast_index.as_ref()?.lookup(c)?;
    if entry.len == 0 {
        return None;
    }
    Some(entry.bytes[..entry.len as usize].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Action, OutputType, StateEntry, TableBuilder};

    fn tiny_sbcs() -> Table {
        let stage1 = vec![0u16; 64];
        let stage2 = vec![0u16; 64];
        let mut bytes = vec![0u16; 16];
        bytes[1] = 0x0F41;
        let mut row0 = [0u32; 256];
        row0[0x41] = StateEntry::Final {
            next_state: 0,
            action: Action::BmpRoundtrip,
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
    fn ascii_passes_through() {
        let table = tiny_sbcs();
        let mut state = Utf8BridgeState::default();
        let mut out = [0u8; 4];
        let outcome = sbcs_from_utf8(&table, &mut state, b"A", &mut out, None);
        assert_eq!(outcome.status, Status::Ok);
        assert_eq!(&out[..outcome.output_written], b"A");
    }

    #[test]
    fn truncated_multibyte_sequence_is_buffered() {
        let table = tiny_sbcs();
        let mut state = Utf8BridgeState::default();
        let mut out = [0u8; 4];
        // 0xE2 0x82 is the first two bytes of a 3-byte sequence (e.g. U+20AC).
        let outcome = sbcs_from_utf8(&table, &mut state, &[0xE2, 0x82], &mut out, None);
        assert_eq!(outcome.status, Status::Ok);
        assert_eq!(outcome.output_written, 0);
        assert!(matches!(state, Utf8BridgeState::Collecting { .. }));
    }

    #[test]
    fn lone_continuation_byte_is_illegal() {
        let table = tiny_sbcs();
        let mut state = Utf8BridgeState::default();
        let mut out = [0u8; 4];
        let outcome = sbcs_from_utf8(&table, &mut state, &[0x80], &mut out, None);
        assert_eq!(outcome.status, Status::IllegalCharFound);
    }

    #[test]
    fn split_euro_sign_matches_single_call_result() {
        use crate::tables::single_byte::windows_1252_like;

        let table = windows_1252_like();
        let euro_utf8 = [0xE2u8, 0x82, 0xAC];

        let mut whole_state = Utf8BridgeState::default();
        let mut whole_out = [0u8; 4];
        let whole = sbcs_from_utf8(&table, &mut whole_state, &euro_utf8, &mut whole_out, None);
        assert_eq!(whole.status, Status::Ok);
        assert_eq!(&whole_out[..whole.output_written], &[0x80]);

        let mut split_state = Utf8BridgeState::default();
        let mut split_out = [0u8; 4];
        let first = sbcs_from_utf8(&table, &mut split_state, &euro_utf8[..2], &mut split_out, None);
        assert_eq!(first.status, Status::Ok);
        assert_eq!(first.output_written, 0);
        assert!(matches!(split_state, Utf8BridgeState::Collecting { .. }));

        let second = sbcs_from_utf8(&table, &mut split_state, &euro_utf8[2..], &mut split_out, None);
        assert_eq!(second.status, Status::Ok);
        assert_eq!(&split_out[..second.output_written], &[0x80]);
    }
}
