//! Load-time failures.
//!
//! Conversion itself never returns an [`Error`] — a running [`crate::Converter`]
//! reports hot-path problems as a [`crate::Status`] value instead, since those
//! are expected, recoverable outcomes of transcoding untrusted bytes. `Error`
//! covers only the things that can go wrong before a [`crate::Table`] exists at
//! all: a malformed blob, an unsupported file version, or an allocation that
//! would be unreasonably large.

use snafu::Snafu;

/// Failure building a [`crate::Table`] from a binary blob or from a
/// [`crate::table::TableBuilder`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("table file has {len} bytes, shorter than the {min} byte header"))]
    HeaderTooShort { len: usize, min: usize },

    #[snafu(display("unsupported table file version {major}.{minor}"))]
    UnsupportedVersion { major: u8, minor: u8 },

    #[snafu(display("unrecognized outputType byte 0x{byte:02x}"))]
    UnknownOutputType { byte: u8 },

    #[snafu(display(
        "header declares {declared} states ({expected} bytes) but the blob only has {available} bytes remaining"
    ))]
    TruncatedStateTable {
        declared: u32,
        expected: usize,
        available: usize,
    },

    #[snafu(display("toUFallbacks table is not sorted by offset at index {index}"))]
    UnsortedFallbacks { index: usize },

    #[snafu(display(
        "EXT-ONLY table recursed past the depth limit of {limit} while resolving its base converter"
    ))]
    ExtensionRecursionTooDeep { limit: u8 },

    #[snafu(display("EXT-ONLY table's base-name field is not NUL-terminated"))]
    UnterminatedBaseName,

    #[snafu(display("EXT-ONLY table's base converter {name:?} could not be resolved"))]
    UnresolvedBaseConverter { name: String },

    #[snafu(display("blob truncated while reading {field}: needed {needed} bytes, had {available}"))]
    TruncatedField {
        field: &'static str,
        needed: usize,
        available: usize,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
