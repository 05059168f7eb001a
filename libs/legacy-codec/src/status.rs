//! Per-call conversion outcomes.

/// Result of a single `to_unicode`/`from_unicode`/UTF-8 bridge call.
///
/// Unlike [`crate::Error`], a non-[`Ok`](Status::Ok) status is not exceptional:
/// it is the hot-path signal the caller's "callback" policy (substitution,
/// skip, abort) is expected to act on, and the converter retains enough
/// scratch state to resume cleanly on the next call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Status {
    /// Everything consumed and written was valid; buffers were not
    /// necessarily exhausted (the caller decides whether to call again).
    Ok,
    /// A byte sequence (or code point) was structurally well-formed but
    /// unassigned in the mapping, and no extension match was found.
    InvalidCharFound,
    /// A byte sequence was structurally illegal, or a lone/unmatched
    /// surrogate was seen going from Unicode.
    IllegalCharFound,
    /// Input ended mid-character at flush.
    TruncatedCharFound,
    /// The target buffer could not accept the next emission; the unwritten
    /// remainder is parked in the converter's error buffer and is drained on
    /// the next call before resuming the main loop.
    BufferOverflow,
    /// `get_next_uchar` was called with no input and nothing buffered.
    IndexOutOfBounds,
    /// `get_next_uchar` hit a case it can't express as a single scalar (an
    /// extension match still pending more bytes): the caller should fall
    /// back to [`crate::Converter::to_unicode_with_offsets`], which carries
    /// the suspended state forward.
    UseToU,
}

impl Status {
    /// True if this status means no error occurred.
    pub const fn is_ok(self) -> bool {
        matches!(self, Status::Ok)
    }
}
