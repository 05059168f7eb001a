//! The public entry point: [`Converter`] binds a shared [`Table`] to
//! per-instance scratch state and options, and exposes the four primary
//! operations (to-Unicode, from-Unicode, single-character decode,
//! substitution flush).

use std::sync::Arc;

use crate::extension::ExtensionHook;
use crate::from_unicode::{self, FromUnicodeState};
use crate::status::Status;
use crate::table::Table;
use crate::to_unicode::{self, ToUnicodeState};
use crate::utf8_bridge::{self, Utf8BridgeState};

bitflags::bitflags! {
    /// Per-converter behavior flags (`options` in the converter-state model).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Options: u8 {
        /// Use the LF/NL-swapped EBCDIC view (C6) instead of the base table.
        const SWAP_LFNL = 0b01;
        /// Resolve from-Unicode misses through the GB 18030 algorithmic
        /// ranges (C5) before reporting [`Status::InvalidCharFound`].
        const GB18030   = 0b10;
    }
}

/// Construction parameters for [`Converter::new`].
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub options: Options,
    pub sub_char: Option<Vec<u8>>,
    pub sub_char1: Option<u8>,
}

/// A bound conversion session: a shared, immutable [`Table`] plus mutable
/// to-Unicode/from-Unicode/UTF-8-bridge scratch state.
///
/// Not [`Sync`] for concurrent use by multiple threads — every operation
/// mutates scratch state — but independent `Converter`s opened against the
/// same `Arc<Table>` run in parallel without contention (see the
/// crate-level concurrency notes).
pub struct Converter {
    table: Arc<Table>,
    options: Options,
    to_u: ToUnicodeState,
    from_u: FromUnicodeState,
    utf8: Utf8BridgeState,
    sub_char: Vec<u8>,
    sub_char1: u8,
    extension: Option<Box<dyn ExtensionHook>>,
}

impl Converter {
    pub fn new(table: Arc<Table>, config: Config) -> Self {
        let sub_char = config
            .sub_char
            .unwrap_or_else(|| table.default_sub_char.clone());
        let sub_char1 = config.sub_char1.unwrap_or(table.default_sub_char1);
        tracing::debug!(
            output_type = ?table.output_type,
            options = ?config.options,
            "opening converter"
        );
        Converter {
            table,
            options: config.options,
            to_u: ToUnicodeState::default(),
            from_u: FromUnicodeState::default(),
            utf8: Utf8BridgeState::default(),
            sub_char,
            sub_char1,
            extension: None,
        }
    }

    pub fn with_extension(mut self, hook: Box<dyn ExtensionHook>) -> Self {
        self.extension = Some(hook);
        self
    }

    /// Returns the LF/NL swap clone (C6) when [`Options::SWAP_LFNL`] is set
    /// and the table supports it; `None` otherwise.
    fn swap(&self) -> Option<&crate::table::SwapClone> {
        if self.options.contains(Options::SWAP_LFNL) {
            self.table.swap_clone()
        } else {
            None
        }
    }

    /// `toUnicode(src, dst) -> (consumed, produced, status)`.
    pub fn to_unicode_with_offsets(
        &mut self,
        input: &[u8],
        output: &mut [u16],
        offsets: Option<&mut [i32]>,
        flush: bool,
    ) -> (usize, usize, Status) {
        let swap_row0 = self.swap().map(|clone| &clone.state_row0);
        let outcome = to_unicode::convert(
            &self.table,
            &mut self.to_u,
            input,
            output,
            offsets,
            self.extension.as_deref(),
            self.options.contains(Options::GB18030),
            flush,
            swap_row0,
        );
        (outcome.input_consumed, outcome.output_written, outcome.status)
    }

    /// `fromUnicode(src, dst) -> (consumed, produced, status)`. `input` is
    /// UTF-16 code units. `flush` marks the final call for this stream: on a
    /// SISO table left shifted into two-byte mode, it emits a trailing SI.
    pub fn from_unicode_with_offsets(
        &mut self,
        input: &[u16],
        output: &mut [u8],
        offsets: Option<&mut [i32]>,
        flush: bool,
    ) -> (usize, usize, Status) {
        let swap_bytes = self.swap().map(|clone| &clone.from_unicode_bytes);
        let ascii_fast_path = !self.options.contains(Options::SWAP_LFNL);
        let outcome = from_unicode::convert(
            &self.table,
            &mut self.from_u,
            input,
            output,
            offsets,
            ascii_fast_path,
            self.extension.as_deref(),
            self.options.contains(Options::GB18030),
            swap_bytes,
            flush,
        );
        (outcome.input_consumed, outcome.output_written, outcome.status)
    }

    /// `getNextUChar`: decodes exactly one scalar value, advancing `to_u`
    /// scratch state by however many bytes it consumed.
    pub fn get_next_uchar(&mut self, input: &[u8]) -> (u32, usize, Status) {
        let swap_row0 = self.swap().map(|clone| &clone.state_row0);
        to_unicode::get_next_uchar(
            &self.table,
            &mut self.to_u,
            input,
            self.extension.as_deref(),
            self.options.contains(Options::GB18030),
            swap_row0,
        )
    }

    /// UTF-8 straight to codepage bytes, dispatching to the SBCS or DBCS
    /// bridge per the table's output type.
    pub fn from_utf8(&mut self, input: &[u8], output: &mut [u8]) -> (usize, usize, Status) {
        let swap_bytes = self.swap().map(|clone| &clone.from_unicode_bytes);
        let outcome = if self.table.output_type.is_sbcs() {
            utf8_bridge::sbcs_from_utf8(&self.table, &mut self.utf8, input, output, swap_bytes)
        } else {
            utf8_bridge::dbcs_from_utf8(&self.table, &mut self.utf8, input, output, swap_bytes)
        };
        (outcome.input_consumed, outcome.output_written, outcome.status)
    }

    /// `writeSub(offsetIndex)`: writes the substitution character for the
    /// direction implied by the last failing call, at `output[offset_index]`
    /// onward. Returns the number of bytes/units written.
    pub fn write_sub_bytes(&self, output: &mut [u8]) -> usize {
        let n = self.sub_char.len().min(output.len());
        output[..n].copy_from_slice(&self.sub_char[..n]);
        n
    }

    pub fn write_sub_unit(&self, output: &mut [u16]) -> usize {
        if output.is_empty() {
            return 0;
        }
        output[0] = self.sub_char1 as u16;
        1
    }

    pub fn reset(&mut self) {
        self.to_u.reset();
        self.from_u.reset();
        self.utf8.reset();
    }

    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    pub fn options(&self) -> Options {
        self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Action, OutputType, StateEntry, TableBuilder};

    fn tiny_sbcs() -> Arc<Table> {
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
        Arc::new(
            TableBuilder::new(OutputType::Sbcs1)
                .state_table(vec![row0])
                .stage1(stage1)
                .stage2_sbcs(stage2)
                .from_bytes_sbcs(bytes)
                .build(),
        )
    }

    #[test]
    fn round_trip_through_converter() {
        let table = tiny_sbcs();
        let mut conv = Converter::new(table, Config::default());
        let mut units = [0u16; 4];
        let (consumed, produced, status) =
            conv.to_unicode_with_offsets(&[0x41], &mut units, None, true);
        assert_eq!(status, Status::Ok);
        assert_eq!(&units[..produced], &[0x41]);
        assert_eq!(consumed, 1);

        conv.reset();
        let mut bytes = [0u8; 4];
        let (_, produced, status) = conv.from_unicode_with_offsets(&units[..1], &mut bytes, None, true);
        assert_eq!(status, Status::Ok);
        assert_eq!(&bytes[..produced], &[0x41]);
    }

    #[test]
    fn write_sub_uses_table_default() {
        let table = tiny_sbcs();
        let conv = Converter::new(table, Config::default());
        let mut out = [0u8; 2];
        let n = conv.write_sub_bytes(&mut out);
        assert_eq!(&out[..n], b"?");
    }

    struct GrowingHook;
    impl crate::extension::ExtensionHook for GrowingHook {
        fn to_unicode_unassigned(&self, bytes: &[u8]) -> crate::extension::ExtensionOutcome<u32> {
            if bytes == [0x42] {
                crate::extension::ExtensionOutcome::Partial
            } else {
                crate::extension::ExtensionOutcome::NoMatch
            }
        }
    }

    #[test]
    fn get_next_uchar_defers_to_to_unicode_on_pending_extension() {
        let stage1 = vec![0u16; 64];
        let stage2 = vec![0u16; 64];
        let bytes = vec![0u16; 16];
        let mut row0 = [0u32; 256];
        row0[0x42] = StateEntry::Final {
            next_state: 0,
            action: Action::Unassigned,
            payload: 0,
        }
        .into();
        let table = Arc::new(
            TableBuilder::new(OutputType::Sbcs1)
                .state_table(vec![row0])
                .stage1(stage1)
                .stage2_sbcs(stage2)
                .from_bytes_sbcs(bytes)
                .build(),
        );
        let mut conv = Converter::new(table, Config::default()).with_extension(Box::new(GrowingHook));
        let (c, consumed, status) = conv.get_next_uchar(&[0x42]);
        assert_eq!(status, Status::UseToU);
        assert_eq!(c, 0);
        assert_eq!(consumed, 1);
    }
}
