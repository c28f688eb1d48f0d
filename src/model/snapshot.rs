use super::label::LabelMap;
use super::lazy::{LazyArray, lazy_accessors};
use super::simbox::SimulationBox;
use super::topology::{Angles, Bonds, Dihedrals, Impropers, infer_num_types, validate_order};
use crate::error::{Error, Result};
use ndarray::{Array, Array2, ArrayView2, ArrayViewMut2, Axis, Ix1, Ix2};
use std::collections::BTreeMap;

const BUILTIN_FIELDS: [&str; 8] = [
    "id", "position", "image", "velocity", "molecule", "typeid", "mass", "charge",
];

/// One particle configuration: a box, a fixed number of particles, and their
/// per-particle attributes.
///
/// Per-particle arrays start out unset and are allocated with their default
/// the first time they are read or written. The `has_*` queries never
/// allocate, so a codec can ask which fields were populated without changing
/// the answer.
#[derive(Debug, Clone)]
pub struct Snapshot {
    n: usize,
    pub simbox: SimulationBox,
    pub step: Option<u64>,
    num_types: Option<usize>,
    pub type_label: Option<LabelMap>,
    pub bonds: Option<Bonds>,
    pub angles: Option<Angles>,
    pub dihedrals: Option<Dihedrals>,
    pub impropers: Option<Impropers>,
    id: LazyArray<i64, Ix1>,
    position: LazyArray<f64, Ix2>,
    image: LazyArray<i64, Ix2>,
    velocity: LazyArray<f64, Ix2>,
    molecule: LazyArray<i64, Ix1>,
    typeid: LazyArray<i64, Ix1>,
    mass: LazyArray<f64, Ix1>,
    charge: LazyArray<f64, Ix1>,
    extras: BTreeMap<String, Extra>,
}

impl Snapshot {
    pub fn new(n: usize, simbox: SimulationBox, step: Option<u64>) -> Self {
        Self {
            n,
            simbox,
            step,
            num_types: None,
            type_label: None,
            bonds: None,
            angles: None,
            dihedrals: None,
            impropers: None,
            id: LazyArray::new("id", Ix1(n), |d| Array::from_iter(1..=d[0] as i64)),
            position: LazyArray::new("position", Ix2(n, 3), |d| Array::zeros(d)),
            image: LazyArray::new("image", Ix2(n, 3), |d| Array::zeros(d)),
            velocity: LazyArray::new("velocity", Ix2(n, 3), |d| Array::zeros(d)),
            molecule: LazyArray::new("molecule", Ix1(n), |d| Array::zeros(d)),
            typeid: LazyArray::new("typeid", Ix1(n), |d| Array::ones(d)),
            mass: LazyArray::new("mass", Ix1(n), |d| Array::ones(d)),
            charge: LazyArray::new("charge", Ix1(n), |d| Array::zeros(d)),
            extras: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.n
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Declared number of particle types; when undeclared, the largest typeid
    /// if typeids are set, otherwise 1.
    pub fn num_types(&self) -> usize {
        self.num_types
            .unwrap_or_else(|| infer_num_types(self.typeid.peek().map(|t| t.iter().copied().max())))
    }

    #[inline]
    pub fn declared_num_types(&self) -> Option<usize> {
        self.num_types
    }

    pub fn set_num_types(&mut self, num_types: Option<usize>) {
        self.num_types = num_types;
    }

    lazy_accessors! {
        /// Particle ids, defaulting to `1..=N`.
        id: i64, Ix1;
        has_id, id_mut, set_id, clear_id, id_if_set, id_or_default
    }

    lazy_accessors! {
        /// Cartesian positions, `(N, 3)`.
        position: f64, Ix2;
        has_position, position_mut, set_position, clear_position, position_if_set, position_or_default
    }

    lazy_accessors! {
        /// Periodic image counts, `(N, 3)`.
        image: i64, Ix2;
        has_image, image_mut, set_image, clear_image, image_if_set, image_or_default
    }

    lazy_accessors! {
        velocity: f64, Ix2;
        has_velocity, velocity_mut, set_velocity, clear_velocity, velocity_if_set, velocity_or_default
    }

    lazy_accessors! {
        /// Molecule ids; 0 means "not in a molecule".
        molecule: i64, Ix1;
        has_molecule, molecule_mut, set_molecule, clear_molecule, molecule_if_set, molecule_or_default
    }

    lazy_accessors! {
        /// 1-indexed particle type ids.
        typeid: i64, Ix1;
        has_typeid, typeid_mut, set_typeid, clear_typeid, typeid_if_set, typeid_or_default
    }

    lazy_accessors! {
        mass: f64, Ix1;
        has_mass, mass_mut, set_mass, clear_mass, mass_if_set, mass_or_default
    }

    lazy_accessors! {
        charge: f64, Ix1;
        has_charge, charge_mut, set_charge, clear_charge, charge_if_set, charge_or_default
    }

    pub fn has_bonds(&self) -> bool {
        self.bonds.as_ref().is_some_and(|t| !t.is_empty())
    }

    pub fn has_angles(&self) -> bool {
        self.angles.as_ref().is_some_and(|t| !t.is_empty())
    }

    pub fn has_dihedrals(&self) -> bool {
        self.dihedrals.as_ref().is_some_and(|t| !t.is_empty())
    }

    pub fn has_impropers(&self) -> bool {
        self.impropers.as_ref().is_some_and(|t| !t.is_empty())
    }

    /// Type labels of every particle, looked up through [`type_label`](Self::type_label).
    pub fn types(&self) -> Result<Vec<&str>> {
        let labels = self
            .type_label
            .as_ref()
            .ok_or_else(|| Error::unsupported("types", "no type labels are assigned"))?;
        self.typeid_or_default()
            .iter()
            .map(|&t| {
                labels
                    .get(t)
                    .ok_or_else(|| Error::unsupported("types", format!("typeid {t} has no label")))
            })
            .collect()
    }

    /// Sets `typeid` from per-particle labels using [`type_label`](Self::type_label).
    pub fn set_types<S: AsRef<str>>(&mut self, labels: &[S]) -> Result<()> {
        if labels.len() != self.n {
            return Err(Error::shape("types", &[self.n], &[labels.len()]));
        }
        let map = self
            .type_label
            .as_ref()
            .ok_or_else(|| Error::unsupported("types", "no type labels are assigned"))?;
        let ids = labels
            .iter()
            .map(|l| {
                let l = l.as_ref();
                map.id_of(l)
                    .ok_or_else(|| Error::unsupported("types", format!("unknown label '{l}'")))
            })
            .collect::<Result<Vec<_>>>()?;
        self.set_typeid(Array::from_vec(ids))
    }

    /// Permutes every allocated per-particle array (extras included) so that
    /// particle `i` becomes old particle `order[i]`.
    ///
    /// With `check_order`, `order` must be a permutation of `0..N`. Topology is
    /// left untouched because it refers to particles by id.
    pub fn reorder(&mut self, order: &[usize], check_order: bool) -> Result<()> {
        validate_order(order, self.n, check_order)?;
        self.id.reorder(order);
        self.position.reorder(order);
        self.image.reorder(order);
        self.velocity.reorder(order);
        self.molecule.reorder(order);
        self.typeid.reorder(order);
        self.mass.reorder(order);
        self.charge.reorder(order);
        for extra in self.extras.values_mut() {
            if let Some(data) = extra.data.as_mut() {
                data.reorder(order);
            }
        }
        Ok(())
    }

    /// Registers a caller-defined per-particle field of shape `(N, width)`.
    pub fn define_extra(
        &mut self,
        name: &str,
        width: usize,
        default: impl Into<ExtraValue>,
    ) -> Result<()> {
        if BUILTIN_FIELDS.contains(&name) {
            return Err(Error::unsupported(name, "name is reserved for a built-in field"));
        }
        if self.extras.contains_key(name) {
            return Err(Error::unsupported(name, "extra field is already defined"));
        }
        self.extras.insert(
            name.to_string(),
            Extra {
                width,
                default: default.into(),
                data: None,
            },
        );
        Ok(())
    }

    pub fn has_extra(&self, name: &str) -> bool {
        self.extras.get(name).is_some_and(|e| e.data.is_some())
    }

    pub fn is_extra_defined(&self, name: &str) -> bool {
        self.extras.contains_key(name)
    }

    /// Names of all defined extras, set or not.
    pub fn extra_names(&self) -> impl Iterator<Item = &str> {
        self.extras.keys().map(String::as_str)
    }

    pub fn extra(&mut self, name: &str) -> Result<ExtraView<'_>> {
        let n = self.n;
        Ok(self.extra_slot(name)?.ensure(n).view())
    }

    pub fn extra_mut(&mut self, name: &str) -> Result<ExtraViewMut<'_>> {
        let n = self.n;
        Ok(self.extra_slot(name)?.ensure(n).view_mut())
    }

    pub fn extra_if_set(&self, name: &str) -> Option<ExtraView<'_>> {
        self.extras.get(name)?.data.as_ref().map(ExtraArray::view)
    }

    /// Replaces an extra; the element type must match the declared default.
    pub fn set_extra(&mut self, name: &str, value: impl Into<ExtraArray>) -> Result<()> {
        let n = self.n;
        let slot = self.extra_slot(name)?;
        let value = value.into();
        let expected = [n, slot.width];
        if value.shape() != &expected[..] {
            return Err(Error::shape(name, &expected, value.shape()));
        }
        let same_kind = matches!(
            (&value, slot.default),
            (ExtraArray::Float(_), ExtraValue::Float(_)) | (ExtraArray::Int(_), ExtraValue::Int(_))
        );
        if !same_kind {
            return Err(Error::unsupported(name, "element type differs from the declared default"));
        }
        slot.data = Some(value);
        Ok(())
    }

    pub fn clear_extra(&mut self, name: &str) -> Result<()> {
        self.extra_slot(name)?.data = None;
        Ok(())
    }

    fn extra_slot(&mut self, name: &str) -> Result<&mut Extra> {
        self.extras
            .get_mut(name)
            .ok_or_else(|| Error::unsupported(name, "extra field is not defined"))
    }
}

/// Default element of an extra per-particle field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExtraValue {
    Float(f64),
    Int(i64),
}

impl From<f64> for ExtraValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for ExtraValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

/// Owned values of an extra field.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtraArray {
    Float(Array2<f64>),
    Int(Array2<i64>),
}

impl ExtraArray {
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Float(a) => a.shape(),
            Self::Int(a) => a.shape(),
        }
    }

    pub fn view(&self) -> ExtraView<'_> {
        match self {
            Self::Float(a) => ExtraView::Float(a.view()),
            Self::Int(a) => ExtraView::Int(a.view()),
        }
    }

    fn view_mut(&mut self) -> ExtraViewMut<'_> {
        match self {
            Self::Float(a) => ExtraViewMut::Float(a.view_mut()),
            Self::Int(a) => ExtraViewMut::Int(a.view_mut()),
        }
    }

    fn reorder(&mut self, order: &[usize]) {
        match self {
            Self::Float(a) => *a = a.select(Axis(0), order),
            Self::Int(a) => *a = a.select(Axis(0), order),
        }
    }
}

impl From<Array2<f64>> for ExtraArray {
    fn from(a: Array2<f64>) -> Self {
        Self::Float(a)
    }
}

impl From<Array2<i64>> for ExtraArray {
    fn from(a: Array2<i64>) -> Self {
        Self::Int(a)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ExtraView<'a> {
    Float(ArrayView2<'a, f64>),
    Int(ArrayView2<'a, i64>),
}

impl<'a> ExtraView<'a> {
    pub fn as_float(&self) -> Option<ArrayView2<'a, f64>> {
        match self {
            Self::Float(a) => Some(*a),
            Self::Int(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<ArrayView2<'a, i64>> {
        match self {
            Self::Int(a) => Some(*a),
            Self::Float(_) => None,
        }
    }
}

#[derive(Debug)]
pub enum ExtraViewMut<'a> {
    Float(ArrayViewMut2<'a, f64>),
    Int(ArrayViewMut2<'a, i64>),
}

#[derive(Debug, Clone)]
struct Extra {
    width: usize,
    default: ExtraValue,
    data: Option<ExtraArray>,
}

impl Extra {
    fn ensure(&mut self, n: usize) -> &mut ExtraArray {
        let (width, default) = (self.width, self.default);
        self.data.get_or_insert_with(|| match default {
            ExtraValue::Float(v) => ExtraArray::Float(Array2::from_elem((n, width), v)),
            ExtraValue::Int(v) => ExtraArray::Int(Array2::from_elem((n, width), v)),
        })
    }
}
