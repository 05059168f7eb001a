//! # Purpose:
//! Bidirectional transcoder between legacy multi-byte codepages and Unicode,
//! driven by precompiled mapping tables in the style of ICU's MBCS converter
//! family.
//!
//! # Topics:
//! - [Table] - loaded mapping data, immutable and shareable across converters
//! - [Converter] - a bound conversion session over a [Table]
//! - [ExtensionHook] - a way to plug in extension-table behavior at the two
//!   unassigned-mapping seams
//!
//! ## Examples:
//! ```
//! use std::sync::Arc;
//! use legacy_codec::{Action, Config, Converter, OutputType, StateEntry, TableBuilder};
//!
//! let mut row0 = [0u32; 256];
//! row0[0x41] = StateEntry::Final {
//!     next_state: 0,
//!     action: Action::BmpRoundtrip,
//!     payload: 0x41,
//! }
//! .into();
//! let mut bytes = vec![0u16; 16];
//! bytes[1] = 0x0F41;
//! let table = Arc::new(
//!     TableBuilder::new(OutputType::Sbcs1)
//!         .state_table(vec![row0])
//!         .stage1(vec![0u16; 64])
//!         .stage2_sbcs(vec![0u16; 64])
//!         .from_bytes_sbcs(bytes)
//!         .build(),
//! );
//!
//! let mut conv = Converter::new(table, Config::default());
//! let mut units = [0u16; 4];
//! let (consumed, produced, status) = conv.to_unicode_with_offsets(&[0x41], &mut units, None, true);
//! assert!(status.is_ok());
//! assert_eq!(&units[..produced], &[0x41]);
//! assert_eq!(consumed, 1);
//! ```

mod converter;
mod error;
mod extension;
mod from_unicode;
mod gb18030;
pub mod introspect;
mod status;
pub mod table;
pub mod tables;
mod to_unicode;
mod utf8_bridge;
mod swap_lfnl;

pub use converter::{Config, Converter, Options};
pub use error::{Error, Result};
pub use extension::{ExtensionHook, ExtensionOutcome};
pub use status::Status;
pub use table::{
    Action, FastEntry, FastIndex, FromUnicodeBytes, OutputType, Stage1, Stage2, StateEntry,
    StateRow, Table, TableBuilder, ToUFallback, UnicodeMask,
};
pub use utf8_bridge::Utf8BridgeState;

pub use from_unicode::FromUnicodeState;
pub use to_unicode::ToUnicodeState;
