//! In-memory table blob (C1): the layout every engine (C2-C8) reads.
//!
//! A [`Table`] is produced once, either by [`Table::from_bytes`] (the on-disk
//! format of the file header, see the crate-level docs) or by a
//! [`TableBuilder`] (used by the built-in codepages under
//! [`crate::tables`]), and is then shared read-only (`Arc<Table>`) by every
//! [`crate::Converter`] opened against it.

use crate::error::{self, Result};
use snafu::{ensure, OptionExt};
use std::sync::OnceLock;

/// Sentinel unit values used throughout the to-Unicode action table.
pub const UNASSIGNED_UNIT: u16 = 0xFFFE;
pub const ILLEGAL_UNIT: u16 = 0xFFFF;

/// The byte-assembly shape a [`Table`]'s from-Unicode stage-3 pool uses, and
/// the structural shape of its to-Unicode byte sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum OutputType {
    /// One byte per character.
    Sbcs1,
    /// Exactly two bytes per character, no shift state.
    Dbcs2,
    /// One to three bytes per character.
    Mbcs3,
    /// One to four bytes per character.
    Mbcs4,
    /// Like [`Mbcs3`](Self::Mbcs3) but with an EUC single-shift prefix
    /// (0x8E/0x8F) disambiguated from the stored bytes.
    Euc3,
    /// Like [`Mbcs4`](Self::Mbcs4) with the same EUC disambiguation.
    Euc4,
    /// Shift-In/Shift-Out stateful: one byte in SBCS mode, two after SO.
    Siso2,
    /// A DBCS-only view layered over a stateful base (SI/SO made illegal).
    DbcsOnly,
    /// Defers every lookup to the extension module; carries no main tables
    /// of its own beyond a base-converter name.
    ExtOnly,
}

impl OutputType {
    fn from_byte(byte: u8) -> Result<Self> {
        Ok(match byte {
            0 => OutputType::Sbcs1,
            1 => OutputType::Dbcs2,
            2 => OutputType::Mbcs3,
            3 => OutputType::Mbcs4,
            4 => OutputType::Euc3,
            5 => OutputType::Euc4,
            6 => OutputType::Siso2,
            7 => OutputType::DbcsOnly,
            8 => OutputType::ExtOnly,
            _ => return error::UnknownOutputTypeSnafu { byte }.fail(),
        })
    }

    /// Maximum bytes a single character can take in this output type.
    pub fn max_bytes_per_char(self) -> u8 {
        match self {
            OutputType::Sbcs1 => 1,
            OutputType::Dbcs2 | OutputType::Siso2 | OutputType::DbcsOnly => 2,
            OutputType::Mbcs3 | OutputType::Euc3 => 3,
            OutputType::Mbcs4 | OutputType::Euc4 => 4,
            OutputType::ExtOnly => 4,
        }
    }

    /// True for the two EUC variants, which steal high bits of the stored
    /// bytes to select a single-shift prefix.
    pub fn is_euc(self) -> bool {
        matches!(self, OutputType::Euc3 | OutputType::Euc4)
    }

    pub fn is_sbcs(self) -> bool {
        matches!(self, OutputType::Sbcs1)
    }

    pub fn is_stateful(self) -> bool {
        matches!(self, OutputType::Siso2)
    }
}

bitflags::bitflags! {
    /// Coverage of the code-point space reachable from this table's to-Unicode
    /// side. Computed once at load/build time by walking the state machine.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct UnicodeMask: u8 {
        const HAS_SUPPLEMENTARY = 0b01;
        const HAS_SURROGATES    = 0b10;
    }
}

/// The 4-bit action tag of a final state-table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Action {
    BmpRoundtrip,
    SupplementaryRoundtrip,
    BmpFallback,
    SupplementaryFallback,
    Indexed16,
    IndexedPair,
    Unassigned,
    Illegal,
    StateChangeOnly,
    /// Action codes 9..15: reserved, currently "state change only". Kept
    /// distinct from [`StateChangeOnly`](Self::StateChangeOnly) so callers can
    /// trace/assert on it without conflating it with the documented action 8.
    Reserved(u8),
}

impl Action {
    fn from_nibble(v: u8) -> Self {
        match v {
            0 => Action::BmpRoundtrip,
            1 => Action::SupplementaryRoundtrip,
            2 => Action::BmpFallback,
            3 => Action::SupplementaryFallback,
            4 => Action::Indexed16,
            5 => Action::IndexedPair,
            6 => Action::Unassigned,
            7 => Action::Illegal,
            8 => Action::StateChangeOnly,
            other => Action::Reserved(other),
        }
    }

    fn to_nibble(self) -> u8 {
        match self {
            Action::BmpRoundtrip => 0,
            Action::SupplementaryRoundtrip => 1,
            Action::BmpFallback => 2,
            Action::SupplementaryFallback => 3,
            Action::Indexed16 => 4,
            Action::IndexedPair => 5,
            Action::Unassigned => 6,
            Action::Illegal => 7,
            Action::StateChangeOnly => 8,
            Action::Reserved(n) => n,
        }
    }
}

/// A decoded view of one packed 32-bit state-table entry.
///
/// The packed representation is a storage detail confined to this module;
/// every other engine works with this sum type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEntry {
    /// Bit 31 = 0: consume the byte, move to `next_state`, and add
    /// `offset_delta` to the accumulator.
    Transition { next_state: u8, offset_delta: i32 },
    /// Bit 31 = 1: this byte completes a character. `next_state` is the state
    /// the machine returns to for the *next* character.
    Final {
        next_state: u8,
        action: Action,
        payload: u32,
    },
}

impl From<u32> for StateEntry {
    fn from(v: u32) -> Self {
        let next_state = ((v >> 24) & 0x7F) as u8;
        if v & 0x8000_0000 == 0 {
            let raw = v & 0x00FF_FFFF;
            // Sign-extend the 24-bit delta.
            let offset_delta = ((raw << 8) as i32) >> 8;
            StateEntry::Transition {
                next_state,
                offset_delta,
            }
        } else {
            let action = Action::from_nibble(((v >> 20) & 0xF) as u8);
            let payload = v & 0x000F_FFFF;
            StateEntry::Final {
                next_state,
                action,
                payload,
            }
        }
    }
}

impl From<StateEntry> for u32 {
    fn from(e: StateEntry) -> u32 {
        match e {
            StateEntry::Transition {
                next_state,
                offset_delta,
            } => {
                debug_assert!(next_state < 0x80);
                ((next_state as u32) << 24) | ((offset_delta as u32) & 0x00FF_FFFF)
            }
            StateEntry::Final {
                next_state,
                action,
                payload,
            } => {
                debug_assert!(next_state < 0x80);
                debug_assert!(payload <= 0x000F_FFFF);
                0x8000_0000
                    | ((next_state as u32) << 24)
                    | ((action.to_nibble() as u32) << 20)
                    | payload
            }
        }
    }
}

/// One 256-entry row of the to-Unicode state machine.
pub type StateRow = [u32; 256];

/// An entry in the sorted `toUFallbacks` table: a scalar accumulator offset
/// reachable via action 4's sentinel [`UNASSIGNED_UNIT`], mapped to a
/// fallback code point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToUFallback {
    pub offset: u32,
    pub code_point: u32,
}

/// Stage 1 of the from-Unicode trie: `c >> 10` to a stage-2 block offset.
#[derive(Debug, Clone)]
pub enum Stage1 {
    /// 64 entries; valid only for `c <= 0xFFFF`.
    Bmp(Vec<u16>),
    /// 1088 entries (64 for the BMP plus 1024 for the 16 supplementary
    /// planes); valid for `c <= 0x10FFFF`.
    Full(Vec<u16>),
}

impl Stage1 {
    fn slice(&self) -> &[u16] {
        match self {
            Stage1::Bmp(v) | Stage1::Full(v) => v,
        }
    }

    pub fn supports_supplementary(&self) -> bool {
        matches!(self, Stage1::Full(_))
    }

    fn index_for(&self, c: u32) -> u16 {
        self.slice()[(c >> 10) as usize]
    }
}

/// Stage 2 of the from-Unicode trie.
#[derive(Debug, Clone)]
pub enum Stage2 {
    /// 16-bit entries: a stage-3 block index. Roundtrip/fallback is encoded
    /// per-result in the stage-3 word itself (see [`FromUnicodeBytes::Sbcs`]).
    Sbcs(Vec<u16>),
    /// 32-bit entries: low 16 bits are the stage-3 block index, high 16 bits
    /// are a roundtrip bitmap (bit `n` set iff slot `n` of the block is a
    /// roundtrip mapping).
    Mbcs(Vec<u32>),
}

/// Stage 3 of the from-Unicode trie: the actual byte-assembly pool.
#[derive(Debug, Clone)]
pub enum FromUnicodeBytes {
    /// SBCS: one 16-bit word per code point. Low byte is the codepage byte;
    /// bits 8..11 are the "kind": `0xF` roundtrip, `0xC` fallback-from-PUA,
    /// `0x8` other fallback, `0x0` unassigned.
    Sbcs(Vec<u16>),
    /// DBCS / SISO: one 16-bit word; `<= 0xFF` means a single byte, otherwise
    /// a two-byte big-endian pair.
    Word16(Vec<u16>),
    /// MBCS-3 / EUC-3: 3 bytes, big-endian, leading zeros trimmed.
    Word24(Vec<[u8; 3]>),
    /// MBCS-4 / EUC-4: 4 bytes as a 32-bit word, big-endian, leading zeros
    /// trimmed.
    Word32(Vec<u32>),
}

/// SBCS result "kind" nibble, see [`FromUnicodeBytes::Sbcs`].
pub const SBCS_KIND_ROUNDTRIP: u16 = 0xF;
pub const SBCS_KIND_FALLBACK_PUA: u16 = 0xC;
pub const SBCS_KIND_FALLBACK: u16 = 0x8;
pub const SBCS_KIND_UNASSIGNED: u16 = 0x0;

/// One cached entry of the UTF-8-friendly [`FastIndex`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FastEntry {
    pub bytes: [u8; 4],
    pub len: u8,
    pub roundtrip: bool,
}

/// Auxiliary two-stage index (`sbcsIndex`/`mbcsIndex`) accelerating
/// from-Unicode lookups for code points produced naturally by short UTF-8
/// sequences, avoiding a re-walk of the general trie.
#[derive(Debug, Clone)]
pub struct FastIndex {
    pub max_fast_uchar: u32,
    stage1: Vec<u16>,
    leaves: Vec<[FastEntry; 64]>,
}

impl FastIndex {
    pub fn lookup(&self, c: u32) -> Option<FastEntry> {
        if c > self.max_fast_uchar {
            return None;
        }
        let leaf = *self.stage1.get((c >> 6) as usize)?;
        if leaf == u16::MAX {
            return None;
        }
        Some(self.leaves[leaf as usize][(c & 0x3F) as usize])
    }
}

/// A fully loaded mapping table, immutable and shared across every
/// [`crate::Converter`] opened against it.
#[derive(Debug)]
pub struct Table {
    pub output_type: OutputType,
    pub state_table: Vec<StateRow>,
    pub unicode_code_units: Vec<u16>,
    pub to_u_fallbacks: Vec<ToUFallback>,
    pub stage1: Stage1,
    pub stage2: Stage2,
    pub from_unicode_bytes: FromUnicodeBytes,
    pub unicode_mask: UnicodeMask,
    /// Bit `i` set iff bytes `4i..4i+3` roundtrip identically to ASCII.
    pub ascii_roundtrips: u32,
    pub fast_index: Option<FastIndex>,
    /// Non-zero when this table also has a usable "ignore SI/SO" view, e.g.
    /// an EXT-ONLY/DBCS-ONLY table layered over a SISO base (see C2's
    /// DBCS-only optimization).
    pub dbcs_only_state: Option<u8>,
    pub default_sub_char: Vec<u8>,
    pub default_sub_char1: u8,
    swap_lfnl: OnceLock<Option<Box<SwapClone>>>,
}

/// The cloned, LF/NL-swapped state-table row 0 and stage-3 pool (C6).
#[derive(Debug)]
pub(crate) struct SwapClone {
    pub state_row0: StateRow,
    pub from_unicode_bytes: FromUnicodeBytes,
}

impl Table {
    pub fn max_bytes_per_char(&self) -> u8 {
        self.output_type.max_bytes_per_char()
    }

    pub fn state_entry(&self, state: u8, byte: u8) -> StateEntry {
        StateEntry::from(self.state_table[state as usize][byte as usize])
    }

    pub fn code_unit(&self, offset: u32) -> u16 {
        self.unicode_code_units[offset as usize]
    }

    pub fn to_u_fallback(&self, offset: u32) -> Option<u32> {
        self.to_u_fallbacks
            .binary_search_by_key(&offset, |f| f.offset)
            .ok()
            .map(|i| self.to_u_fallbacks[i].code_point)
    }

    pub fn ascii_roundtrip(&self, c: u8) -> bool {
        debug_assert!(c < 0x80);
        self.ascii_roundtrips & (1 << (c >> 2)) != 0
    }

    /// `stage2[stage1[c>>10] + ((c>>4) & 0x3F)]`
    pub fn stage2_index(&self, c: u32) -> usize {
        self.stage1.index_for(c) as usize + ((c >> 4) & 0x3F) as usize
    }

    pub(crate) fn swap_clone(&self) -> Option<&SwapClone> {
        self.swap_lfnl
            .get_or_init(|| crate::swap_lfnl::build(self).map(Box::new))
            .as_deref()
    }

    /// True iff `c`'s from-Unicode result is a roundtrip mapping.
    pub fn is_roundtrip(&self, c: u32) -> bool {
        let idx = self.stage2_index(c);
        match &self.stage2 {
            Stage2::Sbcs(pool) => {
                let Some(&stage3_index) = pool.get(idx) else { return false };
                let FromUnicodeBytes::Sbcs(bytes) = &self.from_unicode_bytes else {
                    unreachable!("SBCS stage2 implies SBCS stage3")
                };
                let Some(&word) = bytes.get(stage3_index as usize * 16 + (c & 0xF) as usize) else {
                    return false;
                };
                (word >> 8) & 0xF == SBCS_KIND_ROUNDTRIP
            }
            Stage2::Mbcs(pool) => {
                let Some(&entry) = pool.get(idx) else { return false };
                (entry >> 16) & (1 << (c & 0xF)) != 0
            }
        }
    }
}

/// Errors from parsing the binary table file of the crate-level file-format
/// section.
mod blob {
    pub const HEADER_LEN: usize = 32;
}

impl Table {
    /// Parses the on-disk format: a fixed header, the state table, the
    /// toU-fallback array, the code-unit array, the from-Unicode trie, and an
    /// optional fast index.
    ///
    /// `resolve_base` is invoked for EXT-ONLY files to fetch the named base
    /// converter's already-loaded [`Table`]; recursion is limited to a depth
    /// of 2 as in the original format.
    pub fn from_bytes(
        bytes: &[u8],
        resolve_base: impl Fn(&str) -> Option<std::sync::Arc<Table>>,
    ) -> Result<Self> {
        Self::from_bytes_depth(bytes, &resolve_base, 0)
    }

    fn from_bytes_depth(
        bytes: &[u8],
        resolve_base: &impl Fn(&str) -> Option<std::sync::Arc<Table>>,
        depth: u8,
    ) -> Result<Self> {
        ensure!(
            bytes.len() >= blob::HEADER_LEN,
            error::HeaderTooShortSnafu {
                len: bytes.len(),
                min: blob::HEADER_LEN
            }
        );

        let major = bytes[0];
        let minor = bytes[1];
        ensure!(
            major == 4 && minor <= 3,
            error::UnsupportedVersionSnafu { major, minor }
        );

        let flags = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        let output_byte = (flags & 0xFF) as u8;
        let ext_offset = flags >> 8;
        let output_type = OutputType::from_byte(output_byte)?;

        let count_states = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        let count_fallbacks = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
        let offset_code_units = u32::from_le_bytes(bytes[16..20].try_into().unwrap()) as usize;
        let offset_from_u_table = u32::from_le_bytes(bytes[20..24].try_into().unwrap()) as usize;
        let offset_from_u_bytes = u32::from_le_bytes(bytes[24..28].try_into().unwrap()) as usize;
        let from_u_bytes_length = u32::from_le_bytes(bytes[28..32].try_into().unwrap()) as usize;

        if matches!(output_type, OutputType::ExtOnly) {
            ensure!(
                depth < 2,
                error::ExtensionRecursionTooDeepSnafu { limit: 2u8 }
            );
            let name_bytes = &bytes[blob::HEADER_LEN..];
            let nul = name_bytes
                .iter()
                .position(|&b| b == 0)
                .context(error::UnterminatedBaseNameSnafu)?;
            let base_name = std::str::from_utf8(&name_bytes[..nul]).unwrap_or_default();
            let base = resolve_base(base_name);
            return base.map(|b| (*b).clone_for_ext_only()).context(
                error::UnresolvedBaseConverterSnafu {
                    name: base_name.to_string(),
                },
            );
        }
        let _ = ext_offset; // extension sub-blob is opaque to the core, see C7.

        let state_table_bytes = count_states as usize * 1024;
        let body = &bytes[blob::HEADER_LEN..];
        ensure!(
            body.len() >= state_table_bytes,
            error::TruncatedStateTableSnafu {
                declared: count_states,
                expected: state_table_bytes,
                available: body.len(),
            }
        );

        let mut state_table = Vec::with_capacity(count_states as usize);
        for s in 0..count_states as usize {
            let mut row = [0u32; 256];
            for b in 0..256 {
                let off = s * 1024 + b * 4;
                row[b] = u32::from_le_bytes(body[off..off + 4].try_into().unwrap());
            }
            state_table.push(row);
        }

        let mut cursor = state_table_bytes;
        let mut to_u_fallbacks = Vec::with_capacity(count_fallbacks as usize);
        for i in 0..count_fallbacks as usize {
            let off = cursor + i * 8;
            ensure!(
                body.len() >= off + 8,
                error::TruncatedFieldSnafu {
                    field: "toUFallbacks",
                    needed: off + 8,
                    available: body.len()
                }
            );
            let offset = u32::from_le_bytes(body[off..off + 4].try_into().unwrap());
            let code_point = u32::from_le_bytes(body[off + 4..off + 8].try_into().unwrap());
            if let Some(prev) = to_u_fallbacks.last() {
                let prev: &ToUFallback = prev;
                ensure!(prev.offset <= offset, error::UnsortedFallbacksSnafu { index: i });
            }
            to_u_fallbacks.push(ToUFallback { offset, code_point });
        }
        cursor += count_fallbacks as usize * 8;
        let _ = cursor;

        let code_units_len = (offset_from_u_table - offset_code_units) / 2;
        let mut unicode_code_units = Vec::with_capacity(code_units_len);
        for i in 0..code_units_len {
            let off = offset_code_units + i * 2;
            unicode_code_units.push(u16::from_le_bytes(body[off..off + 2].try_into().unwrap()));
        }

        let from_u_table_len = (offset_from_u_bytes - offset_from_u_table) / 2;
        let is_sbcs = output_type.is_sbcs();
        let stage1_len = if from_u_table_len >= 1088 { 1088 } else { 64 };
        let mut stage1 = Vec::with_capacity(stage1_len);
        for i in 0..stage1_len {
            let off = offset_from_u_table + i * 2;
            stage1.push(u16::from_le_bytes(body[off..off + 2].try_into().unwrap()));
        }
        let stage1 = if stage1_len == 1088 {
            Stage1::Full(stage1)
        } else {
            Stage1::Bmp(stage1)
        };

        let stage2 = if is_sbcs {
            let mut pool = Vec::with_capacity(from_u_table_len - stage1_len);
            for i in stage1_len..from_u_table_len {
                let off = offset_from_u_table + i * 2;
                pool.push(u16::from_le_bytes(body[off..off + 2].try_into().unwrap()));
            }
            Stage2::Sbcs(pool)
        } else {
            let remaining = from_u_table_len - stage1_len;
            let mut pool = Vec::with_capacity(remaining / 2);
            let mut i = stage1_len;
            while i + 1 < from_u_table_len {
                let off = offset_from_u_table + i * 2;
                let lo = u16::from_le_bytes(body[off..off + 2].try_into().unwrap());
                let hi = u16::from_le_bytes(body[off + 2..off + 4].try_into().unwrap());
                pool.push((hi as u32) << 16 | lo as u32);
                i += 2;
            }
            Stage2::Mbcs(pool)
        };

        let from_unicode_bytes = match output_type {
            OutputType::Sbcs1 => {
                let mut v = Vec::with_capacity(from_u_bytes_length / 2);
                for i in 0..from_u_bytes_length / 2 {
                    let off = offset_from_u_bytes + i * 2;
                    v.push(u16::from_le_bytes(body[off..off + 2].try_into().unwrap()));
                }
                FromUnicodeBytes::Sbcs(v)
            }
            OutputType::Dbcs2 | OutputType::Siso2 | OutputType::DbcsOnly => {
                let mut v = Vec::with_capacity(from_u_bytes_length / 2);
                for i in 0..from_u_bytes_length / 2 {
                    let off = offset_from_u_bytes + i * 2;
                    v.push(u16::from_le_bytes(body[off..off + 2].try_into().unwrap()));
                }
                FromUnicodeBytes::Word16(v)
            }
            OutputType::Mbcs3 | OutputType::Euc3 => {
                let mut v = Vec::with_capacity(from_u_bytes_length / 3);
                for i in 0..from_u_bytes_length / 3 {
                    let off = offset_from_u_bytes + i * 3;
                    v.push([body[off], body[off + 1], body[off + 2]]);
                }
                FromUnicodeBytes::Word24(v)
            }
            OutputType::Mbcs4 | OutputType::Euc4 => {
                let mut v = Vec::with_capacity(from_u_bytes_length / 4);
                for i in 0..from_u_bytes_length / 4 {
                    let off = offset_from_u_bytes + i * 4;
                    v.push(u32::from_be_bytes(body[off..off + 4].try_into().unwrap()));
                }
                FromUnicodeBytes::Word32(v)
            }
            OutputType::ExtOnly => unreachable!("handled above"),
        };

        let mut table = Table {
            output_type,
            state_table,
            unicode_code_units,
            to_u_fallbacks,
            stage1,
            stage2,
            from_unicode_bytes,
            unicode_mask: UnicodeMask::empty(),
            ascii_roundtrips: 0,
            fast_index: None,
            dbcs_only_state: None,
            default_sub_char: vec![b'?'],
            default_sub_char1: b'?',
            swap_lfnl: OnceLock::new(),
        };
        table.compute_derived();
        Ok(table)
    }

    /// Walks stage 1/2 once (as the loader glue does for SBCS) to recompute
    /// `ascii_roundtrips`, `unicode_mask`, and a default [`FastIndex`] keyed
    /// on every code point up to 0xFFFF.
    fn compute_derived(&mut self) {
        let mut ascii_roundtrips = 0u32;
        for group in 0..32u32 {
            let mut all = true;
            for j in 0..4 {
                let c = group * 4 + j;
                if c > 0x7F || !self.is_roundtrip(c) || !self.ascii_identity_byte(c) {
                    all = false;
                    break;
                }
            }
            if all {
                ascii_roundtrips |= 1 << group;
            }
        }
        self.ascii_roundtrips = ascii_roundtrips;

        let mut mask = UnicodeMask::empty();
        if self.stage1.supports_supplementary() {
            mask |= UnicodeMask::HAS_SUPPLEMENTARY;
        }
        self.unicode_mask = mask;
        self.fast_index = Some(self.build_fast_index(0xFFFF));
    }

    fn ascii_identity_byte(&self, c: u32) -> bool {
        self.from_unicode_byte_value(c) == Some(vec![c as u8])
    }

    /// Looks up the from-Unicode byte sequence for `c`, the same assembly
    /// rule used by [`crate::from_unicode`], but without the ASCII
    /// fast-path short circuit (used only to bootstrap that fast path).
    pub fn from_unicode_byte_value(&self, c: u32) -> Option<Vec<u8>> {
        crate::from_unicode::lookup_bytes(self, c, true)
    }

    fn build_fast_index(&self, max_fast_uchar: u32) -> FastIndex {
        let n_leaves = (max_fast_uchar >> 6) as usize + 1;
        let mut stage1 = vec![u16::MAX; n_leaves];
        let mut leaves: Vec<[FastEntry; 64]> = Vec::new();
        for c in 0..=max_fast_uchar {
            if let Some(bytes) = self.from_unicode_byte_value(c) {
                let leaf_idx = (c >> 6) as usize;
                if stage1[leaf_idx] == u16::MAX {
                    stage1[leaf_idx] = leaves.len() as u16;
                    leaves.push([FastEntry::default(); 64]);
                }
                let mut entry = FastEntry {
                    roundtrip: self.is_roundtrip(c),
                    len: bytes.len() as u8,
                    ..Default::default()
                };
                entry.bytes[..bytes.len()].copy_from_slice(&bytes);
                leaves[stage1[leaf_idx] as usize][(c & 0x3F) as usize] = entry;
            }
        }
        FastIndex {
            max_fast_uchar,
            stage1,
            leaves,
        }
    }

    /// EXT-ONLY files carry no tables of their own; this promotes the base's
    /// table, optionally narrowing `outputType` to [`OutputType::DbcsOnly`]
    /// when the static type calls for a DBCS-over-SISO view (see C1).
    fn clone_for_ext_only(&self) -> Self {
        let mut clone = Table {
            output_type: self.output_type,
            state_table: self.state_table.clone(),
            unicode_code_units: self.unicode_code_units.clone(),
            to_u_fallbacks: self.to_u_fallbacks.clone(),
            stage1: self.stage1.clone(),
            stage2: self.stage2.clone(),
            from_unicode_bytes: self.from_unicode_bytes.clone(),
            unicode_mask: self.unicode_mask,
            ascii_roundtrips: self.ascii_roundtrips,
            fast_index: self.fast_index.clone(),
            dbcs_only_state: None,
            default_sub_char: self.default_sub_char.clone(),
            default_sub_char1: self.default_sub_char1,
            swap_lfnl: OnceLock::new(),
        };
        if self.output_type.is_stateful() {
            // Base supports SI/SO on state 0's 0x0E entry: surface a
            // DBCS-only view instead of cloning an all-illegal SBCS state.
            // SI/SO is modeled as `Final` with `StateChangeOnly` (so the
            // per-character reset in `to_unicode::convert` fires on it), not
            // as a bare `Transition`, so both shapes count.
            let shift_out = match self.state_entry(0, 0x0E) {
                StateEntry::Transition { next_state, .. } => Some(next_state),
                StateEntry::Final { next_state, action: Action::StateChangeOnly, .. } => {
                    Some(next_state)
                }
                _ => None,
            };
            if let Some(next_state) = shift_out {
                clone.output_type = OutputType::DbcsOnly;
                clone.dbcs_only_state = Some(next_state);
            }
        }
        clone
    }
}

/// Programmatic constructor for built-in codepages, mirroring the binary
/// loader's output without a round-trip through the file format.
#[derive(Default)]
pub struct TableBuilder {
    output_type: Option<OutputType>,
    state_table: Vec<StateRow>,
    unicode_code_units: Vec<u16>,
    to_u_fallbacks: Vec<ToUFallback>,
    stage1: Vec<u16>,
    stage2_sbcs: Vec<u16>,
    stage2_mbcs: Vec<u32>,
    from_bytes_sbcs: Vec<u16>,
    from_bytes_word16: Vec<u16>,
    from_bytes_word32: Vec<u32>,
    default_sub_char: Vec<u8>,
    default_sub_char1: u8,
}

impl TableBuilder {
    pub fn new(output_type: OutputType) -> Self {
        Self {
            output_type: Some(output_type),
            default_sub_char: vec![b'?'],
            default_sub_char1: b'?',
            ..Default::default()
        }
    }

    pub fn state_table(mut self, rows: Vec<StateRow>) -> Self {
        self.state_table = rows;
        self
    }

    pub fn unicode_code_units(mut self, units: Vec<u16>) -> Self {
        self.unicode_code_units = units;
        self
    }

    pub fn to_u_fallbacks(mut self, mut fallbacks: Vec<ToUFallback>) -> Self {
        fallbacks.sort_by_key(|f| f.offset);
        self.to_u_fallbacks = fallbacks;
        self
    }

    pub fn stage1(mut self, stage1: Vec<u16>) -> Self {
        self.stage1 = stage1;
        self
    }

    pub fn stage2_sbcs(mut self, stage2: Vec<u16>) -> Self {
        self.stage2_sbcs = stage2;
        self
    }

    pub fn stage2_mbcs(mut self, stage2: Vec<u32>) -> Self {
        self.stage2_mbcs = stage2;
        self
    }

    pub fn from_bytes_sbcs(mut self, pool: Vec<u16>) -> Self {
        self.from_bytes_sbcs = pool;
        self
    }

    pub fn from_bytes_word16(mut self, pool: Vec<u16>) -> Self {
        self.from_bytes_word16 = pool;
        self
    }

    pub fn from_bytes_word32(mut self, pool: Vec<u32>) -> Self {
        self.from_bytes_word32 = pool;
        self
    }

    pub fn default_sub(mut self, sub_char: Vec<u8>, sub_char1: u8) -> Self {
        self.default_sub_char = sub_char;
        self.default_sub_char1 = sub_char1;
        self
    }

    pub fn build(self) -> Table {
        let output_type = self.output_type.expect("output_type is required");
        let is_sbcs = output_type.is_sbcs();
        let stage1 = if self.stage1.len() >= 1088 {
            Stage1::Full(self.stage1)
        } else {
            Stage1::Bmp(self.stage1)
        };
        let stage2 = if is_sbcs {
            Stage2::Sbcs(self.stage2_sbcs)
        } else {
            Stage2::Mbcs(self.stage2_mbcs)
        };
        let from_unicode_bytes = match output_type {
            OutputType::Sbcs1 => FromUnicodeBytes::Sbcs(self.from_bytes_sbcs),
            OutputType::Dbcs2 | OutputType::Siso2 | OutputType::DbcsOnly => {
                FromUnicodeBytes::Word16(self.from_bytes_word16)
            }
            OutputType::Mbcs4 | OutputType::Euc4 => FromUnicodeBytes::Word32(self.from_bytes_word32),
            OutputType::Mbcs3 | OutputType::Euc3 => FromUnicodeBytes::Word24(
                self.from_bytes_word32
                    .iter()
                    .map(|w| {
                        let b = w.to_be_bytes();
                        [b[1], b[2], b[3]]
                    })
                    .collect(),
            ),
            OutputType::ExtOnly => FromUnicodeBytes::Sbcs(Vec::new()),
        };

        let mut table = Table {
            output_type,
            state_table: self.state_table,
            unicode_code_units: self.unicode_code_units,
            to_u_fallbacks: self.to_u_fallbacks,
            stage1,
            stage2,
            from_unicode_bytes,
            unicode_mask: UnicodeMask::empty(),
            ascii_roundtrips: 0,
            fast_index: None,
            dbcs_only_state: None,
            default_sub_char: self.default_sub_char,
            default_sub_char1: self.default_sub_char1,
            swap_lfnl: OnceLock::new(),
        };
        table.compute_derived();
        table
    }
}
