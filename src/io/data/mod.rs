//! LAMMPS data files.
//!
//! A data file stores one configuration: a header of counts and box bounds,
//! followed by keyword-delimited body sections. The `Atoms` section layout is
//! selected by an [`AtomStyle`].

mod reader;
mod style;
mod writer;

pub use reader::read;
pub use style::{AtomColumn, AtomStyle, IMAGE_COLUMNS, ParseAtomStyleError};
pub use writer::write;

use super::compression;
use crate::error::Result;
use crate::model::snapshot::Snapshot;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Header keywords that are decoded.
pub const KNOWN_HEADERS: &[&str] = &[
    "atoms",
    "atom types",
    "bonds",
    "bond types",
    "angles",
    "angle types",
    "dihedrals",
    "dihedral types",
    "impropers",
    "improper types",
    "xlo xhi",
    "ylo yhi",
    "zlo zhi",
    "xy xz yz",
];

/// Header keywords that are recognized but ignored.
pub const UNKNOWN_HEADERS: &[&str] = &[
    "extra bond per atom",
    "extra angle per atom",
    "extra dihedral per atom",
    "extra improper per atom",
    "extra special per atom",
    "ellipsoids",
    "lines",
    "triangles",
    "bodies",
    "crossterms",
];

/// Body sections that are decoded.
pub const KNOWN_SECTIONS: &[&str] = &[
    "Atoms",
    "Velocities",
    "Masses",
    "Bonds",
    "Angles",
    "Dihedrals",
    "Impropers",
    "Atom Type Labels",
    "Bond Type Labels",
    "Angle Type Labels",
    "Dihedral Type Labels",
    "Improper Type Labels",
];

/// Body sections that are recognized and skipped.
pub const UNKNOWN_SECTIONS: &[&str] = &[
    "Ellipsoids",
    "Lines",
    "Triangles",
    "Bodies",
    "CMAP",
    "Pair Coeffs",
    "PairIJ Coeffs",
    "Bond Coeffs",
    "Angle Coeffs",
    "Dihedral Coeffs",
    "Improper Coeffs",
    "BondBond Coeffs",
    "BondAngle Coeffs",
    "MiddleBondTorsion Coeffs",
    "EndBondTorsion Coeffs",
    "AngleTorsion Coeffs",
    "AngleAngleTorsion Coeffs",
    "BondBond13 Coeffs",
    "AngleAngle Coeffs",
];

/// Everything a data file yields: the snapshot plus the headers and sections
/// that were present but not decoded.
#[derive(Debug, Clone)]
pub struct DataContents {
    pub snapshot: Snapshot,
    pub unknown_headers: Vec<String>,
    pub unknown_sections: Vec<String>,
}

/// A data file on disk, configured for reading.
///
/// ```no_run
/// use lammps_io::{AtomStyle, DataFile};
///
/// let snapshot = DataFile::open("melt.data")
///     .atom_style(AtomStyle::Full)
///     .read()?;
/// println!("{} particles", snapshot.len());
/// # Ok::<(), lammps_io::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct DataFile {
    path: PathBuf,
    atom_style: Option<AtomStyle>,
}

impl DataFile {
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            atom_style: None,
        }
    }

    /// Style to assume when the `Atoms` line carries no `# style` comment.
    pub fn atom_style(mut self, style: AtomStyle) -> Self {
        self.atom_style = Some(style);
        self
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn style(&self) -> Option<AtomStyle> {
        self.atom_style
    }

    pub fn read(&self) -> Result<Snapshot> {
        self.read_contents().map(|c| c.snapshot)
    }

    pub fn read_contents(&self) -> Result<DataContents> {
        let reader = compression::open(&self.path, None)?;
        read(reader, self.atom_style)
    }

    /// Writes `snapshot` to `path`, inferring the style when `style` is `None`.
    pub fn create(
        path: impl AsRef<Path>,
        snapshot: &Snapshot,
        style: Option<AtomStyle>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let mut out = BufWriter::new(File::create(path)?);
        let style = write(&mut out, snapshot, style)?;
        out.flush()?;
        Ok(Self {
            path: path.to_path_buf(),
            atom_style: Some(style),
        })
    }
}
