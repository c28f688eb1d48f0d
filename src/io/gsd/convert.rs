use super::{Configuration, Frame, Group, Particles};
use crate::error::{Error, Result};
use crate::model::label::LabelMap;
use crate::model::simbox::{CenteredBox, SimulationBox};
use crate::model::snapshot::Snapshot;
use crate::model::topology::{Angle, Bond, ConnectionKind, Dihedral, Improper, Topology};
use log::{debug, warn};
use ndarray::{Array, Array1, ArrayView, ArrayView1, Axis, Dimension, RemoveAxis, aview1};
use std::collections::{BTreeSet, HashMap};

/// Converts a snapshot into a GSD frame.
///
/// Only populated fields are emitted. Particles are written in ascending id
/// order, the box is re-centered on the origin, and positions are shifted with
/// it. Type ids become indices into `particles/types`, built from
/// [`type_label`](Snapshot::type_label) when present and from the sorted
/// distinct type ids otherwise.
pub fn to_frame(snapshot: &Snapshot) -> Result<Frame> {
    if let Some(name) = snapshot.extra_names().find(|name| snapshot.has_extra(name)) {
        return Err(Error::unsupported(name, "GSD frames have no chunk for extra fields"));
    }

    let n = snapshot.len();
    let order = id_order(snapshot);
    let order = order.as_deref();
    let (centered, translation) = snapshot.simbox.to_centered();

    let mut particles = Particles {
        n,
        ..Particles::default()
    };
    if let Some(position) = snapshot.position_if_set() {
        let mut shifted = select(position, order);
        shifted += &aview1(&translation);
        particles.position = Some(shifted.mapv(|v| v as f32));
    }
    if let Some(velocity) = snapshot.velocity_if_set() {
        particles.velocity = Some(select(velocity, order).mapv(|v| v as f32));
    }
    if let Some(image) = snapshot.image_if_set() {
        particles.image = Some(narrow("particles/image", select(image, order))?);
    }
    if let Some(mass) = snapshot.mass_if_set() {
        particles.mass = Some(select(mass, order).mapv(|v| v as f32));
    }
    if let Some(charge) = snapshot.charge_if_set() {
        particles.charge = Some(select(charge, order).mapv(|v| v as f32));
    }
    if let Some(molecule) = snapshot.molecule_if_set() {
        particles.body = Some(narrow("particles/body", select(molecule, order) - 1)?);
    }
    let typeid = snapshot.typeid_if_set().map(|t| select(t, order));
    if typeid.is_some() || snapshot.type_label.is_some() {
        let (types, index) = encode_types(
            "particles/typeid",
            typeid.as_ref().map(|t| t.view()),
            snapshot.type_label.as_ref(),
        )?;
        particles.types = Some(types);
        particles.typeid = index;
    }

    let ids = select(snapshot.id_or_default().view(), order);
    let index_of: HashMap<i64, u32> = ids
        .iter()
        .enumerate()
        .map(|(i, &id)| (id, i as u32))
        .collect();

    let frame = Frame {
        configuration: Configuration {
            step: snapshot.step.unwrap_or(0),
            dimensions: 3,
            simbox: centered.to_array(),
        },
        particles,
        bonds: encode_group(snapshot.bonds.as_ref(), &index_of)?,
        angles: encode_group(snapshot.angles.as_ref(), &index_of)?,
        dihedrals: encode_group(snapshot.dihedrals.as_ref(), &index_of)?,
        impropers: encode_group(snapshot.impropers.as_ref(), &index_of)?,
    };
    debug!("converted snapshot of {} particles to a GSD frame", n);
    Ok(frame)
}

/// Converts a GSD frame into a snapshot.
///
/// The box keeps its centered placement. Type names that parse as positive
/// integers become those type ids; any other name is given the smallest
/// unused id, and the names are then kept in
/// [`type_label`](Snapshot::type_label).
pub fn from_frame(frame: &Frame) -> Result<Snapshot> {
    frame.validate()?;
    let config = &frame.configuration;
    let mut centered = CenteredBox::from_array(config.simbox);
    match config.dimensions {
        3 => {}
        // LAMMPS needs a finite thickness even for 2D systems.
        2 if centered.lengths[2] == 0.0 => centered.lengths[2] = 1.0,
        2 => {}
        d => {
            return Err(Error::unsupported(
                "configuration/dimensions",
                format!("{d}-dimensional frames cannot be represented"),
            ));
        }
    }
    let simbox = SimulationBox::from_centered(&centered, [0.0; 3])?;

    let p = &frame.particles;
    for (chunk, present) in [
        ("particles/orientation", p.orientation.is_some()),
        ("particles/diameter", p.diameter.is_some()),
        ("particles/moment_inertia", p.moment_inertia.is_some()),
        ("particles/angmom", p.angmom.is_some()),
    ] {
        if present {
            return Err(Error::unsupported(chunk, "no snapshot field carries this chunk"));
        }
    }

    let mut snapshot = Snapshot::new(p.n, simbox, Some(config.step));
    if let Some(position) = &p.position {
        snapshot.set_position(position.mapv(f64::from))?;
    }
    if let Some(velocity) = &p.velocity {
        snapshot.set_velocity(velocity.mapv(f64::from))?;
    }
    if let Some(image) = &p.image {
        snapshot.set_image(image.mapv(i64::from))?;
    }
    if let Some(mass) = &p.mass {
        snapshot.set_mass(mass.mapv(f64::from))?;
    }
    if let Some(charge) = &p.charge {
        snapshot.set_charge(charge.mapv(f64::from))?;
    }
    if let Some(body) = &p.body {
        let molecule = body.mapv(|b| i64::from(b) + 1);
        if molecule.iter().any(|&m| m < 0) {
            warn!("some molecule ids are negative after mapping from particles/body");
        }
        snapshot.set_molecule(molecule)?;
    }
    let types = decode_types(p.types.as_deref(), p.typeid.as_ref());
    if let Some(typeid) = types.typeid {
        snapshot.set_typeid(typeid)?;
    }
    snapshot.set_num_types(types.num_types);
    snapshot.type_label = types.labels;

    snapshot.bonds = decode_group::<Bond>(&frame.bonds)?;
    snapshot.angles = decode_group::<Angle>(&frame.angles)?;
    snapshot.dihedrals = decode_group::<Dihedral>(&frame.dihedrals)?;
    snapshot.impropers = decode_group::<Improper>(&frame.impropers)?;
    debug!("converted GSD frame at step {} with {} particles", config.step, p.n);
    Ok(snapshot)
}

/// Permutation that sorts particles by id, if they are not sorted already.
fn id_order(snapshot: &Snapshot) -> Option<Vec<usize>> {
    let id = snapshot.id_if_set()?;
    if id.windows(2).into_iter().all(|w| w[0] < w[1]) {
        return None;
    }
    let mut order: Vec<usize> = (0..id.len()).collect();
    order.sort_by_key(|&i| id[i]);
    Some(order)
}

fn select<A: Clone, D: RemoveAxis>(view: ArrayView<'_, A, D>, order: Option<&[usize]>) -> Array<A, D> {
    match order {
        Some(order) => view.select(Axis(0), order),
        None => view.to_owned(),
    }
}

fn narrow<D: Dimension>(field: &str, values: Array<i64, D>) -> Result<Array<i32, D>> {
    if let Some(bad) = values.iter().find(|&&v| i32::try_from(v).is_err()) {
        return Err(Error::unsupported(field, format!("{bad} does not fit in 32 bits")));
    }
    Ok(values.mapv(|v| v as i32))
}

/// Type names and per-element indices into them.
fn encode_types(
    field: &str,
    typeid: Option<ArrayView1<'_, i64>>,
    labels: Option<&LabelMap>,
) -> Result<(Vec<String>, Option<Array1<u32>>)> {
    let table: Vec<(i64, String)> = match labels {
        Some(map) => {
            let mut entries: Vec<(i64, String)> =
                map.iter().map(|(id, label)| (id, label.to_string())).collect();
            entries.sort_by_key(|(id, _)| *id);
            entries
        }
        None => typeid
            .iter()
            .flat_map(|t| t.iter().copied())
            .collect::<BTreeSet<i64>>()
            .into_iter()
            .map(|id| (id, id.to_string()))
            .collect(),
    };

    let index = match typeid {
        Some(typeid) => {
            let lookup: HashMap<i64, u32> = table
                .iter()
                .enumerate()
                .map(|(i, (id, _))| (*id, i as u32))
                .collect();
            if let Some(id) = typeid.iter().find(|&id| !lookup.contains_key(id)) {
                return Err(Error::unsupported(field, format!("typeid {id} has no type label")));
            }
            Some(typeid.mapv(|id| lookup[&id]))
        }
        None => None,
    };
    Ok((table.into_iter().map(|(_, label)| label).collect(), index))
}

struct DecodedTypes {
    typeid: Option<Array1<i64>>,
    num_types: Option<usize>,
    labels: Option<LabelMap>,
}

fn decode_types(types: Option<&[String]>, index: Option<&Array1<u32>>) -> DecodedTypes {
    let Some(types) = types else {
        return DecodedTypes {
            typeid: index.map(|i| i.mapv(|t| i64::from(t) + 1)),
            num_types: None,
            labels: None,
        };
    };

    let numeric: Vec<Option<i64>> = types
        .iter()
        .map(|t| t.trim().parse::<i64>().ok().filter(|&id| id > 0))
        .collect();
    let mut used: BTreeSet<i64> = numeric.iter().flatten().copied().collect();
    let mut next = 1;
    let ids: Vec<i64> = numeric
        .iter()
        .map(|parsed| match *parsed {
            Some(id) => id,
            None => {
                while used.contains(&next) {
                    next += 1;
                }
                used.insert(next);
                next
            }
        })
        .collect();

    let labels = numeric
        .iter()
        .any(Option::is_none)
        .then(|| ids.iter().copied().zip(types.iter().cloned()).collect());
    DecodedTypes {
        typeid: index.map(|i| i.mapv(|t| ids[t as usize])),
        num_types: ids.iter().copied().max().map(|max| max as usize),
        labels,
    }
}

fn encode_group<K: ConnectionKind>(
    topology: Option<&Topology<K>>,
    index_of: &HashMap<i64, u32>,
) -> Result<Group> {
    let Some(topology) = topology else {
        return Ok(Group::default());
    };
    let mut group = Group::new(topology.len());
    if let Some(members) = topology.members_if_set() {
        if let Some(id) = members.iter().find(|&id| !index_of.contains_key(id)) {
            return Err(Error::unsupported(
                format!("{}/group", K::COUNT_HEADER),
                format!("member id {id} is not a particle id"),
            ));
        }
        group.group = Some(members.mapv(|id| index_of[&id]));
    }
    let typeid = topology.typeid_if_set();
    if typeid.is_some() || topology.type_label.is_some() {
        let (types, index) = encode_types(
            &format!("{}/typeid", K::COUNT_HEADER),
            typeid,
            topology.type_label.as_ref(),
        )?;
        group.types = Some(types);
        group.typeid = index;
    }
    Ok(group)
}

fn decode_group<K: ConnectionKind>(group: &Group) -> Result<Option<Topology<K>>> {
    if group.n == 0 {
        return Ok(None);
    }
    let mut topology = Topology::<K>::new(group.n);
    if let Some(members) = &group.group {
        topology.set_members(members.mapv(|i| i64::from(i) + 1))?;
    }
    let types = decode_types(group.types.as_deref(), group.typeid.as_ref());
    if let Some(typeid) = types.typeid {
        topology.set_typeid(typeid)?;
    }
    topology.set_num_types(types.num_types);
    topology.type_label = types.labels;
    Ok(Some(topology))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::topology::Bonds;
    use ndarray::{Array2, array};

    fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() <= eps
    }

    fn cube(n: usize) -> Snapshot {
        let simbox = SimulationBox::new([0.0; 3], [10.0; 3]).unwrap();
        Snapshot::new(n, simbox, Some(5))
    }

    #[test]
    fn box_is_centered_and_positions_follow() {
        let mut snap = cube(1);
        snap.set_position(array![[1.0, 2.0, 3.0]]).unwrap();
        let frame = to_frame(&snap).unwrap();

        assert_eq!(frame.configuration.step, 5);
        assert_eq!(frame.configuration.dimensions, 3);
        assert_eq!(frame.configuration.simbox, [10.0, 10.0, 10.0, 0.0, 0.0, 0.0]);
        assert_eq!(frame.particles.position, Some(array![[-4.0f32, -3.0, -2.0]]));
        assert!(frame.particles.velocity.is_none());
        assert!(frame.particles.types.is_none());
    }

    #[test]
    fn particles_are_emitted_in_id_order_with_synthesized_types() {
        let mut snap = cube(2);
        snap.set_id(array![2, 1]).unwrap();
        snap.set_typeid(array![3, 1]).unwrap();
        snap.set_molecule(array![0, 4]).unwrap();
        let frame = to_frame(&snap).unwrap();

        let p = &frame.particles;
        assert_eq!(p.types, Some(vec!["1".to_string(), "3".to_string()]));
        assert_eq!(p.typeid, Some(array![0, 1]));
        assert_eq!(p.body, Some(array![3, -1]));
        // the source snapshot keeps its own order
        assert_eq!(snap.id_if_set().unwrap().to_vec(), vec![2, 1]);
    }

    #[test]
    fn labels_become_type_names() {
        let mut snap = cube(2);
        snap.set_typeid(array![2, 1]).unwrap();
        snap.type_label = Some(LabelMap::from_iter([(2, "B"), (1, "A")]));
        let frame = to_frame(&snap).unwrap();
        assert_eq!(frame.particles.types, Some(vec!["A".to_string(), "B".to_string()]));
        assert_eq!(frame.particles.typeid, Some(array![1, 0]));
    }

    #[test]
    fn unlabelled_typeid_is_rejected() {
        let mut snap = cube(1);
        snap.set_typeid(array![2]).unwrap();
        snap.type_label = Some(LabelMap::from_iter([(1, "A")]));
        let err = to_frame(&snap).unwrap_err();
        assert!(matches!(err, Error::UnsupportedField { .. }));
    }

    #[test]
    fn populated_extras_are_rejected() {
        let mut snap = cube(1);
        snap.define_extra("dipole", 3, 0.0).unwrap();
        assert!(to_frame(&snap).is_ok());
        snap.set_extra("dipole", Array2::<f64>::zeros((1, 3))).unwrap();
        assert!(to_frame(&snap).is_err());
    }

    #[test]
    fn bonds_map_ids_to_indices_and_back() {
        let mut snap = cube(2);
        snap.set_id(array![20, 10]).unwrap();
        let mut bonds = Bonds::new(1);
        bonds.set_members(array![[10, 20]]).unwrap();
        bonds.set_typeid(array![1]).unwrap();
        snap.bonds = Some(bonds);

        let frame = to_frame(&snap).unwrap();
        assert_eq!(frame.bonds.n, 1);
        assert_eq!(frame.bonds.group, Some(array![[0u32, 1]]));
        assert_eq!(frame.bonds.types, Some(vec!["1".to_string()]));
        assert_eq!(frame.angles, Group::default());

        let back = from_frame(&frame).unwrap();
        let bonds = back.bonds.as_ref().unwrap();
        assert_eq!(bonds.members_if_set().unwrap(), array![[1i64, 2]]);
        assert_eq!(bonds.typeid_if_set().unwrap().to_vec(), vec![1]);
        assert!(back.angles.is_none());
    }

    #[test]
    fn unknown_bond_member_is_rejected() {
        let mut snap = cube(2);
        let mut bonds = Bonds::new(1);
        bonds.set_members(array![[1, 7]]).unwrap();
        snap.bonds = Some(bonds);
        assert!(matches!(
            to_frame(&snap).unwrap_err(),
            Error::UnsupportedField { .. }
        ));
    }

    #[test]
    fn mixed_type_names_get_fresh_ids() {
        let mut frame = Frame::default();
        frame.particles.n = 3;
        frame.particles.types = Some(vec!["A".into(), "3".into(), "B".into()]);
        frame.particles.typeid = Some(array![0, 1, 2]);
        let snap = from_frame(&frame).unwrap();

        assert_eq!(snap.typeid_if_set().unwrap().to_vec(), vec![1, 3, 2]);
        let labels = snap.type_label.as_ref().unwrap();
        assert_eq!(labels.get(1), Some("A"));
        assert_eq!(labels.get(2), Some("B"));
        assert_eq!(labels.get(3), Some("3"));
        assert_eq!(snap.num_types(), 3);
        assert_eq!(snap.types().unwrap(), vec!["A", "3", "B"]);
    }

    #[test]
    fn numeric_type_names_leave_labels_unset() {
        let mut frame = Frame::default();
        frame.particles.n = 2;
        frame.particles.types = Some(vec!["2".into(), "5".into()]);
        frame.particles.typeid = Some(array![1, 0]);
        let snap = from_frame(&frame).unwrap();
        assert_eq!(snap.typeid_if_set().unwrap().to_vec(), vec![5, 2]);
        assert!(snap.type_label.is_none());
    }

    #[test]
    fn flat_2d_box_gets_unit_thickness() {
        let mut frame = Frame::default();
        frame.configuration.dimensions = 2;
        frame.configuration.simbox = [4.0, 6.0, 0.0, 0.5, 0.0, 0.0];
        let snap = from_frame(&frame).unwrap();
        assert_eq!(snap.simbox.lengths(), [4.0, 6.0, 1.0]);
        assert_eq!(snap.simbox.tilt(), Some([3.0, 0.0, 0.0]));
    }

    #[test]
    fn unsupported_dimensions_and_chunks_are_rejected() {
        let mut frame = Frame::default();
        frame.configuration.dimensions = 4;
        assert!(from_frame(&frame).is_err());

        let mut frame = Frame::default();
        frame.particles.n = 1;
        frame.particles.diameter = Some(array![1.0]);
        let err = from_frame(&frame).unwrap_err();
        assert!(matches!(err, Error::UnsupportedField { ref field, .. } if field == "particles/diameter"));
    }

    #[test]
    fn triclinic_box_survives_a_round_trip() {
        let simbox = SimulationBox::triclinic([-1.0, 0.0, 2.0], [3.0, 5.0, 8.0], [0.5, -1.0, 0.25]).unwrap();
        let mut snap = Snapshot::new(1, simbox, None);
        snap.set_position(array![[0.0, 1.0, 3.0]]).unwrap();
        snap.set_velocity(array![[0.5, -0.5, 0.25]]).unwrap();

        let frame = to_frame(&snap).unwrap();
        assert_eq!(frame.configuration.step, 0);
        let back = from_frame(&frame).unwrap();

        let tilt = back.simbox.tilt().unwrap();
        for k in 0..3 {
            assert!(approx_eq(back.simbox.lengths()[k], simbox.lengths()[k], 1e-12));
            assert!(approx_eq(tilt[k], simbox.tilt().unwrap()[k], 1e-12));
        }
        // the translation is not stored, so compare positions relative to the box corner
        let p = back.position_if_set().unwrap();
        for k in 0..3 {
            let original = snap.position_if_set().unwrap()[[0, k]] - simbox.low()[k];
            assert!(approx_eq(p[[0, k]] - back.simbox.low()[k], original, 1e-5));
        }
        assert_eq!(back.velocity_if_set().unwrap(), snap.velocity_if_set().unwrap());
    }
}
