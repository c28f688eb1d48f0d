//! Reading, writing and converting LAMMPS particle configurations.
//!
//! The crate reads and writes LAMMPS data files (one configuration plus
//! bonds, angles, dihedrals and impropers) and LAMMPS dump files (trajectories
//! of per-particle columns), and converts configurations to and from the
//! per-frame records of HOOMD-blue GSD files. Everything passes through one
//! in-memory type, [`Snapshot`], whose per-particle arrays are allocated only
//! when they are used.
//!
//! # Quick Start
//!
//! ```
//! use lammps_io::{AtomStyle, DumpField, DumpSchema, SimulationBox, Snapshot};
//! use ndarray::array;
//!
//! let simbox = SimulationBox::new([0.0; 3], [10.0; 3])?;
//! let mut snapshot = Snapshot::new(2, simbox, Some(100));
//! snapshot.set_typeid(array![1, 2])?;
//! snapshot.set_position(array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]])?;
//! assert!(!snapshot.has_velocity());
//!
//! // Data file in memory
//! let mut data = Vec::new();
//! let style = lammps_io::io::data::write(&mut data, &snapshot, None)?;
//! assert_eq!(style, AtomStyle::Atomic);
//! let back = lammps_io::io::data::read(data.as_slice(), None)?.snapshot;
//! assert_eq!(back.len(), 2);
//! assert!(back.has_mass());
//!
//! // Dump frame in memory
//! let schema = DumpSchema::new()
//!     .with_scalar(DumpField::TypeId, 0)?
//!     .with_vector(DumpField::Position, [1, 2, 3])?;
//! let mut dump = Vec::new();
//! lammps_io::io::dump::write(&mut dump, &schema, [&snapshot])?;
//! let frames = lammps_io::Frames::new(dump.as_slice(), Default::default());
//! assert_eq!(frames.count(), 1);
//!
//! // GSD frame
//! let frame = lammps_io::gsd::to_frame(&snapshot)?;
//! assert_eq!(frame.configuration.simbox[..3], [10.0, 10.0, 10.0]);
//! # Ok::<(), lammps_io::Error>(())
//! ```
//!
//! # Module Organization
//!
//! - [`io`] – Data and dump codecs, compression, and GSD conversion
//! - [`Error`] – The single error type every fallible operation returns
//!
//! # Data Types
//!
//! - [`Snapshot`] – One configuration of `N` particles
//! - [`SimulationBox`] – Restricted-triclinic box in the LAMMPS convention
//! - [`CenteredBox`] – Origin-centered box with dimensionless tilts
//! - [`LabelMap`] – Type id to type label mapping
//! - [`Topology`] – Fixed-size set of bonds, angles, dihedrals or impropers
//! - [`AtomStyle`] – Layout of the `Atoms` section of a data file
//! - [`DumpSchema`] – Column layout of a dump file

mod error;
mod model;

pub mod io;

pub use error::{Error, Result};

pub use model::label::LabelMap;
pub use model::simbox::{CenteredBox, SimulationBox};
pub use model::snapshot::{ExtraArray, ExtraValue, ExtraView, ExtraViewMut, Snapshot};
pub use model::topology::{
    Angle, Angles, Bond, Bonds, ConnectionKind, Dihedral, Dihedrals, Improper, Impropers,
    Topology,
};

pub use io::data::{AtomStyle, DataContents, DataFile, ParseAtomStyleError};
pub use io::dump::{Columns, DumpField, DumpFile, DumpSchema, Frames, ReadOptions};
pub use io::gsd;
pub use io::{Compression, Format};
