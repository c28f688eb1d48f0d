//! In-memory representation of particle configurations.
//!
//! - [`simbox`] – The restricted-triclinic simulation box and its centered form.
//! - [`label`] – Ordered type-id to label maps.
//! - [`topology`] – Bonds, angles, dihedrals and impropers.
//! - [`snapshot`] – One configuration with lazily allocated per-particle fields.
//!
//! Every array on a [`Snapshot`] or [`Topology`] is allocated on first use, so
//! the codecs can tell which fields a caller actually populated.
//!
//! [`Snapshot`]: snapshot::Snapshot
//! [`Topology`]: topology::Topology

mod lazy;

pub mod label;
pub mod simbox;
pub mod snapshot;
pub mod topology;
