use super::label::LabelMap;
use super::lazy::{LazyArray, lazy_accessors};
use crate::error::{Error, Result};
use ndarray::{Array, Ix1, Ix2};
use std::fmt::Debug;
use std::marker::PhantomData;

/// Describes one kind of connection between particles.
///
/// The associated constants carry the arity and the names the kind goes by in
/// LAMMPS data files and GSD frames.
pub trait ConnectionKind: Debug + Clone + Copy + PartialEq + Default + 'static {
    /// Number of particles per connection.
    const ARITY: usize;
    /// Header keyword for the connection count, also the GSD group name.
    const COUNT_HEADER: &'static str;
    /// Header keyword for the number of connection types.
    const TYPES_HEADER: &'static str;
    /// Data-file section holding the connections.
    const SECTION: &'static str;
    /// Data-file section holding the type labels.
    const LABEL_SECTION: &'static str;
}

macro_rules! connection_kind {
    ($name:ident, $arity:expr, $count:literal, $types:literal, $section:literal, $labels:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name;

        impl ConnectionKind for $name {
            const ARITY: usize = $arity;
            const COUNT_HEADER: &'static str = $count;
            const TYPES_HEADER: &'static str = $types;
            const SECTION: &'static str = $section;
            const LABEL_SECTION: &'static str = $labels;
        }
    };
}

connection_kind!(Bond, 2, "bonds", "bond types", "Bonds", "Bond Type Labels");
connection_kind!(Angle, 3, "angles", "angle types", "Angles", "Angle Type Labels");
connection_kind!(Dihedral, 4, "dihedrals", "dihedral types", "Dihedrals", "Dihedral Type Labels");
connection_kind!(Improper, 4, "impropers", "improper types", "Impropers", "Improper Type Labels");

pub type Bonds = Topology<Bond>;
pub type Angles = Topology<Angle>;
pub type Dihedrals = Topology<Dihedral>;
pub type Impropers = Topology<Improper>;

/// Fixed-size set of connections of one kind.
///
/// Every array is allocated lazily, exactly like the per-particle fields of a
/// [`Snapshot`](super::snapshot::Snapshot). `members` holds 1-indexed particle ids.
#[derive(Debug, Clone)]
pub struct Topology<K: ConnectionKind> {
    n: usize,
    num_types: Option<usize>,
    pub type_label: Option<LabelMap>,
    members: LazyArray<i64, Ix2>,
    id: LazyArray<i64, Ix1>,
    typeid: LazyArray<i64, Ix1>,
    kind: PhantomData<K>,
}

impl<K: ConnectionKind> Topology<K> {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            num_types: None,
            type_label: None,
            members: LazyArray::new("members", Ix2(n, K::ARITY), |d| Array::ones(d)),
            id: LazyArray::new("id", Ix1(n), |d| Array::from_iter(1..=d[0] as i64)),
            typeid: LazyArray::new("typeid", Ix1(n), |d| Array::ones(d)),
            kind: PhantomData,
        }
    }

    pub fn with_num_types(n: usize, num_types: usize) -> Self {
        let mut topology = Self::new(n);
        topology.num_types = Some(num_types);
        topology
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.n
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    #[inline]
    pub fn arity(&self) -> usize {
        K::ARITY
    }

    /// Declared number of types, or the largest typeid when undeclared.
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
        /// Connected particle ids, one row of `arity` ids per connection.
        members: i64, Ix2;
        has_members, members_mut, set_members, clear_members, members_if_set, members_or_default
    }

    lazy_accessors! {
        /// Connection ids, defaulting to `1..=N`.
        id: i64, Ix1;
        has_id, id_mut, set_id, clear_id, id_if_set, id_or_default
    }

    lazy_accessors! {
        /// Connection type ids, defaulting to 1.
        typeid: i64, Ix1;
        has_typeid, typeid_mut, set_typeid, clear_typeid, typeid_if_set, typeid_or_default
    }

    /// Permutes every allocated array so that row `i` becomes old row `order[i]`.
    pub fn reorder(&mut self, order: &[usize], check_order: bool) -> Result<()> {
        validate_order(order, self.n, check_order)?;
        self.members.reorder(order);
        self.id.reorder(order);
        self.typeid.reorder(order);
        Ok(())
    }
}

pub(crate) fn infer_num_types(max_typeid: Option<Option<i64>>) -> usize {
    match max_typeid {
        Some(Some(max)) if max > 0 => max as usize,
        _ => 1,
    }
}

/// Checks that `order` indexes `0..n`; with `check_order` it must also be a
/// permutation.
pub(crate) fn validate_order(order: &[usize], n: usize, check_order: bool) -> Result<()> {
    if order.len() != n {
        return Err(Error::shape("order", &[n], &[order.len()]));
    }
    if let Some(&bad) = order.iter().find(|&&i| i >= n) {
        return Err(Error::shape("order", &[n], &[bad + 1]));
    }
    if check_order {
        let mut seen = vec![false; n];
        for &i in order {
            if std::mem::replace(&mut seen[i], true) {
                return Err(Error::ShapeMismatch {
                    field: "order".into(),
                    expected: vec![n],
                    found: vec![i],
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn arity_follows_kind() {
        assert_eq!(Bonds::new(1).arity(), 2);
        assert_eq!(Angles::new(1).arity(), 3);
        assert_eq!(Dihedrals::new(1).arity(), 4);
        assert_eq!(Impropers::new(1).arity(), 4);
    }

    #[test]
    fn defaults_are_lazy() {
        let mut bonds = Bonds::new(3);
        assert!(!bonds.has_members());
        assert!(!bonds.has_members());
        assert_eq!(bonds.id_or_default().to_vec(), vec![1, 2, 3]);
        assert!(!bonds.has_id());
        assert_eq!(bonds.members().shape(), &[3, 2]);
        assert!(bonds.has_members());
    }

    #[test]
    fn num_types_inferred_from_typeid() {
        let mut angles = Angles::new(2);
        assert_eq!(angles.num_types(), 1);
        angles.set_typeid(array![2, 5]).unwrap();
        assert_eq!(angles.num_types(), 5);
        angles.set_num_types(Some(7));
        assert_eq!(angles.num_types(), 7);
    }

    #[test]
    fn members_shape_is_checked() {
        let mut bonds = Bonds::new(2);
        let err = bonds.set_members(array![[1, 2, 3], [4, 5, 6]]).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn reorder_moves_rows_together() {
        let mut bonds = Bonds::new(3);
        bonds.set_members(array![[1, 2], [2, 3], [3, 4]]).unwrap();
        bonds.set_typeid(array![1, 2, 3]).unwrap();
        bonds.reorder(&[2, 1, 0], true).unwrap();
        assert_eq!(bonds.typeid_if_set().unwrap().to_vec(), vec![3, 2, 1]);
        assert_eq!(bonds.members_if_set().unwrap().row(0).to_vec(), vec![3, 4]);
        assert!(!bonds.has_id());
    }

    #[test]
    fn reorder_rejects_non_permutation_when_checked() {
        let mut bonds = Bonds::new(3);
        assert!(bonds.reorder(&[0, 0, 1], true).is_err());
        assert!(bonds.reorder(&[0, 0, 1], false).is_ok());
        assert!(bonds.reorder(&[0, 1], false).is_err());
    }
}
