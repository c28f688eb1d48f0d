//! Error type shared by the data model and every codec.
//!
//! All variants are data-integrity failures: they are reported at the point of
//! detection and never retried. A failed read never hands back a partially
//! filled [`Snapshot`](crate::Snapshot).

use crate::io::Format;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building, reading, writing, or converting snapshots.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O operation failed: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// A caller-declared schema disagrees with the one embedded in the file.
    #[error("schema mismatch: declared '{declared}' but file declares '{found}'")]
    SchemaMismatch { declared: String, found: String },

    /// No schema was available from the caller or from the file.
    #[error("no schema available: {0}")]
    SchemaMissing(&'static str),

    /// Token or row counts do not match the declared counts or active schema.
    #[error("malformed {format} file: {details} (at line ~{line})")]
    MalformedFile {
        format: Format,
        line: usize,
        details: String,
    },

    /// The target representation cannot carry a field that is populated.
    #[error("unsupported field '{field}': {details}")]
    UnsupportedField { field: String, details: String },

    /// An assigned array does not have the container's fixed shape.
    #[error("shape mismatch for '{field}': expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        field: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    /// A copy-from template does not cover the frame being read.
    #[error("template snapshot does not match frame: {details}")]
    IncompleteTemplate { details: String },

    #[error("invalid simulation box: {0}")]
    InvalidBox(String),

    #[error("failed to parse schema configuration: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    pub fn malformed(format: Format, line: usize, details: impl Into<String>) -> Self {
        Self::MalformedFile {
            format,
            line,
            details: details.into(),
        }
    }

    pub fn unsupported(field: impl Into<String>, details: impl Into<String>) -> Self {
        Self::UnsupportedField {
            field: field.into(),
            details: details.into(),
        }
    }

    pub fn shape(field: impl Into<String>, expected: &[usize], found: &[usize]) -> Self {
        Self::ShapeMismatch {
            field: field.into(),
            expected: expected.to_vec(),
            found: found.to_vec(),
        }
    }

    pub fn template(details: impl Into<String>) -> Self {
        Self::IncompleteTemplate {
            details: details.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_message_names_format_and_line() {
        let err = Error::malformed(Format::Data, 12, "expected 5 columns");
        assert_eq!(
            err.to_string(),
            "malformed LAMMPS data file: expected 5 columns (at line ~12)"
        );
    }

    #[test]
    fn shape_message_lists_both_shapes() {
        let err = Error::shape("position", &[3, 3], &[2, 3]);
        assert_eq!(
            err.to_string(),
            "shape mismatch for 'position': expected [3, 3], found [2, 3]"
        );
    }

    #[test]
    fn io_errors_convert_with_question_mark() {
        fn fails() -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))?;
            Ok(())
        }
        assert!(matches!(fails(), Err(Error::Io { .. })));
    }
}
