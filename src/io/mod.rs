//! Text codecs for LAMMPS files and the mapping to HOOMD-blue GSD frames.
//!
//! - [`data`] – LAMMPS data files: one configuration plus topology.
//! - [`dump`] – LAMMPS dump files: a trajectory with a column schema.
//! - [`gsd`] – per-frame GSD records and their conversion to and from [`Snapshot`].
//!
//! Both text codecs read plain, gzip, or Zstandard streams; see [`Compression`].
//!
//! [`Snapshot`]: crate::Snapshot

use std::fmt;

pub mod compression;
pub mod data;
pub mod dump;
pub mod gsd;

pub use compression::Compression;
pub use data::{AtomStyle, DataContents, DataFile};
pub use dump::{DumpField, DumpFile, DumpSchema, Frames};

/// File kind, used to label errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Data,
    Dump,
    Gsd,
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Data => write!(f, "LAMMPS data"),
            Format::Dump => write!(f, "LAMMPS dump"),
            Format::Gsd => write!(f, "GSD"),
        }
    }
}

/// Strips a trailing `#` comment and surrounding whitespace.
pub(crate) fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(pos) => line[..pos].trim(),
        None => line.trim(),
    }
}

/// Formats a float so that parsing it back yields the same value.
pub(crate) fn fmt_float(value: f64) -> String {
    format!("{value:?}")
}
