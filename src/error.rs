//! Error kinds surfaced by the core (spec.md §7).
//!
//! Matches the teacher's hand-rolled enum shape (`errors.rs`) rather than
//! reaching for `thiserror`: a plain `Display` impl, `std::error::Error`,
//! and a transparent `From<std::io::Error>` for IO propagation.

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum Error {
    /// Key absent on lookup/update/remove.
    NotFound,
    /// Insert of an already-present key.
    Duplicate,
    /// `search_range` called with `left > right`, or no left bound.
    InvalidRange,
    /// Read/write/seek failure from the block store.
    Io(io::Error),
    /// Header or node data was short or otherwise unreadable.
    Corruption(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound => write!(f, "key not found"),
            Error::Duplicate => write!(f, "key already exists"),
            Error::InvalidRange => write!(f, "invalid range: left bound missing or left > right"),
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::Corruption(msg) => write!(f, "corrupt on-disk data: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Io(e)
    }
}

/// Builds an [`Error`] variant from a kind name and a `format!`-style
/// message, mirroring the `err!(Kind, "...", args)` call sites this
/// teacher's code uses throughout `storage/btree.rs` and `database.rs`.
macro_rules! err {
    (Corruption, $($arg:tt)*) => {
        $crate::error::Error::Corruption(format!($($arg)*))
    };
}

pub(crate) use err;
