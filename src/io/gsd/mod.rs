//! In-memory model of one HOOMD-blue GSD frame.
//!
//! The records mirror the GSD chunk layout (`configuration/*`, `particles/*`,
//! `bonds/*`, ...) with the element types HOOMD stores: `f32` for particle
//! data, `u32` for type indices and group members, `i32` for images and
//! bodies. Reading or writing the binary container itself is left to a GSD
//! library; [`to_frame`] and [`from_frame`] convert between these records and
//! a [`Snapshot`](crate::Snapshot).

mod convert;

pub use convert::{from_frame, to_frame};

use crate::error::{Error, Result};
use ndarray::{Array1, Array2};

/// `configuration/*` chunks.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    pub step: u64,
    pub dimensions: u8,
    /// `[Lx, Ly, Lz, xy, xz, yz]` with dimensionless tilt factors.
    pub simbox: [f64; 6],
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            step: 0,
            dimensions: 3,
            simbox: [1.0, 1.0, 1.0, 0.0, 0.0, 0.0],
        }
    }
}

/// `particles/*` chunks. `None` means the chunk is absent from the frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Particles {
    pub n: usize,
    pub types: Option<Vec<String>>,
    /// 0-based indices into `types`.
    pub typeid: Option<Array1<u32>>,
    pub position: Option<Array2<f32>>,
    pub velocity: Option<Array2<f32>>,
    pub image: Option<Array2<i32>>,
    pub mass: Option<Array1<f32>>,
    pub charge: Option<Array1<f32>>,
    /// Rigid-body index; `-1` for free particles.
    pub body: Option<Array1<i32>>,
    pub orientation: Option<Array2<f32>>,
    pub diameter: Option<Array1<f32>>,
    pub moment_inertia: Option<Array2<f32>>,
    pub angmom: Option<Array2<f32>>,
}

/// One connection group (`bonds/*`, `angles/*`, `dihedrals/*`, `impropers/*`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Group {
    pub n: usize,
    pub types: Option<Vec<String>>,
    pub typeid: Option<Array1<u32>>,
    /// 0-based particle indices, one row per connection.
    pub group: Option<Array2<u32>>,
}

impl Group {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub configuration: Configuration,
    pub particles: Particles,
    pub bonds: Group,
    pub angles: Group,
    pub dihedrals: Group,
    pub impropers: Group,
}

impl Frame {
    /// Checks that every present chunk has the length implied by its `n`.
    pub fn validate(&self) -> Result<()> {
        let p = &self.particles;
        let n = p.n;
        check_len("particles/typeid", n, p.typeid.as_ref().map(|a| a.len()))?;
        check_rows("particles/position", n, 3, p.position.as_ref())?;
        check_rows("particles/velocity", n, 3, p.velocity.as_ref())?;
        check_rows("particles/image", n, 3, p.image.as_ref())?;
        check_len("particles/mass", n, p.mass.as_ref().map(|a| a.len()))?;
        check_len("particles/charge", n, p.charge.as_ref().map(|a| a.len()))?;
        check_len("particles/body", n, p.body.as_ref().map(|a| a.len()))?;
        check_rows("particles/orientation", n, 4, p.orientation.as_ref())?;
        check_len("particles/diameter", n, p.diameter.as_ref().map(|a| a.len()))?;
        check_rows("particles/moment_inertia", n, 3, p.moment_inertia.as_ref())?;
        check_rows("particles/angmom", n, 4, p.angmom.as_ref())?;
        if let (Some(typeid), Some(types)) = (&p.typeid, &p.types) {
            check_indices("particles/typeid", typeid, types.len())?;
        }

        for (name, group, arity) in [
            ("bonds", &self.bonds, 2),
            ("angles", &self.angles, 3),
            ("dihedrals", &self.dihedrals, 4),
            ("impropers", &self.impropers, 4),
        ] {
            check_len(
                &format!("{name}/typeid"),
                group.n,
                group.typeid.as_ref().map(|a| a.len()),
            )?;
            check_rows(&format!("{name}/group"), group.n, arity, group.group.as_ref())?;
            if let Some(members) = &group.group {
                if let Some(&bad) = members.iter().find(|&&i| i as usize >= n) {
                    return Err(Error::unsupported(
                        format!("{name}/group"),
                        format!("particle index {bad} is out of range for {n} particles"),
                    ));
                }
            }
            if let (Some(typeid), Some(types)) = (&group.typeid, &group.types) {
                check_indices(&format!("{name}/typeid"), typeid, types.len())?;
            }
        }
        Ok(())
    }
}

fn check_len(field: &str, n: usize, found: Option<usize>) -> Result<()> {
    match found {
        Some(len) if len != n => Err(Error::shape(field, &[n], &[len])),
        _ => Ok(()),
    }
}

fn check_rows<A>(field: &str, n: usize, width: usize, array: Option<&Array2<A>>) -> Result<()> {
    match array {
        Some(a) if a.dim() != (n, width) => Err(Error::shape(field, &[n, width], a.shape())),
        _ => Ok(()),
    }
}

fn check_indices(field: &str, typeid: &Array1<u32>, num_types: usize) -> Result<()> {
    match typeid.iter().find(|&&t| t as usize >= num_types) {
        Some(bad) => Err(Error::unsupported(
            field,
            format!("type index {bad} exceeds the {num_types} listed types"),
        )),
        None => Ok(()),
    }
}
