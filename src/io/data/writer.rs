use super::style::{AtomColumn, AtomStyle};
use crate::error::{Error, Result};
use crate::io::fmt_float;
use crate::model::label::LabelMap;
use crate::model::snapshot::Snapshot;
use crate::model::topology::{ConnectionKind, Topology};
use log::debug;
use std::io::Write;

/// Writes `snapshot` as a data file and returns the style used for `Atoms`.
///
/// With `style` unset, the smallest style holding every populated field is
/// chosen. A given style that cannot hold a populated charge or molecule
/// field is an error rather than a silent drop.
pub fn write<W: Write>(
    mut writer: W,
    snapshot: &Snapshot,
    style: Option<AtomStyle>,
) -> Result<AtomStyle> {
    let style = resolve_style(snapshot, style)?;
    let num_types = checked_num_types(snapshot)?;
    let masses = masses_by_type(snapshot, num_types)?;
    if let Some(t) = &snapshot.bonds {
        check_topology_types(t)?;
    }
    if let Some(t) = &snapshot.angles {
        check_topology_types(t)?;
    }
    if let Some(t) = &snapshot.dihedrals {
        check_topology_types(t)?;
    }
    if let Some(t) = &snapshot.impropers {
        check_topology_types(t)?;
    }
    debug!(
        "writing data file with {} atoms in style '{}'",
        snapshot.len(),
        style
    );

    match snapshot.step {
        Some(step) => writeln!(
            writer,
            "LAMMPS data file written by lammps-io, timestep = {step}"
        )?,
        None => writeln!(writer, "LAMMPS data file written by lammps-io")?,
    }
    writeln!(writer)?;

    writeln!(writer, "{} atoms", snapshot.len())?;
    writeln!(writer, "{} atom types", num_types)?;
    if let Some(t) = &snapshot.bonds {
        write_counts(&mut writer, t)?;
    }
    if let Some(t) = &snapshot.angles {
        write_counts(&mut writer, t)?;
    }
    if let Some(t) = &snapshot.dihedrals {
        write_counts(&mut writer, t)?;
    }
    if let Some(t) = &snapshot.impropers {
        write_counts(&mut writer, t)?;
    }

    let simbox = &snapshot.simbox;
    let (low, high) = (simbox.low(), simbox.high());
    for (axis, name) in ["x", "y", "z"].iter().enumerate() {
        writeln!(
            writer,
            "{} {} {name}lo {name}hi",
            fmt_float(low[axis]),
            fmt_float(high[axis])
        )?;
    }
    if let Some([xy, xz, yz]) = simbox.tilt() {
        writeln!(
            writer,
            "{} {} {} xy xz yz",
            fmt_float(xy),
            fmt_float(xz),
            fmt_float(yz)
        )?;
    }

    if let Some(labels) = &snapshot.type_label {
        write_labels(&mut writer, "Atom Type Labels", labels)?;
    }

    writeln!(writer, "\nMasses\n")?;
    for (t, m) in masses.iter().enumerate() {
        writeln!(writer, "{} {}", t + 1, fmt_float(*m))?;
    }

    write_atoms(&mut writer, snapshot, style)?;

    if let Some(velocity) = snapshot.velocity_if_set() {
        let ids = snapshot.id_or_default();
        writeln!(writer, "\nVelocities\n")?;
        for (id, v) in ids.iter().zip(velocity.rows()) {
            writeln!(
                writer,
                "{} {} {} {}",
                id,
                fmt_float(v[0]),
                fmt_float(v[1]),
                fmt_float(v[2])
            )?;
        }
    }

    if let Some(t) = &snapshot.bonds {
        write_topology(&mut writer, t)?;
    }
    if let Some(t) = &snapshot.angles {
        write_topology(&mut writer, t)?;
    }
    if let Some(t) = &snapshot.dihedrals {
        write_topology(&mut writer, t)?;
    }
    if let Some(t) = &snapshot.impropers {
        write_topology(&mut writer, t)?;
    }

    Ok(style)
}

fn resolve_style(snapshot: &Snapshot, requested: Option<AtomStyle>) -> Result<AtomStyle> {
    let (has_charge, has_molecule) = (snapshot.has_charge(), snapshot.has_molecule());
    let Some(style) = requested else {
        return Ok(AtomStyle::minimal(has_charge, has_molecule));
    };
    if has_charge && !style.carries_charge() {
        return Err(Error::unsupported(
            "charge",
            format!("atom style '{style}' has no charge column"),
        ));
    }
    if has_molecule && !style.carries_molecule() {
        return Err(Error::unsupported(
            "molecule",
            format!("atom style '{style}' has no molecule column"),
        ));
    }
    Ok(style)
}

fn checked_num_types(snapshot: &Snapshot) -> Result<usize> {
    let num_types = snapshot.num_types();
    let typeid = snapshot.typeid_or_default();
    if let Some(&bad) = typeid.iter().find(|&&t| t < 1 || t > num_types as i64) {
        return Err(Error::unsupported(
            "typeid",
            format!("typeid {bad} is outside 1..={num_types}"),
        ));
    }
    Ok(num_types)
}

/// One mass per type. Every particle of a type must share a positive mass;
/// types with no particles (or an unset `mass` field) get 1.
fn masses_by_type(snapshot: &Snapshot, num_types: usize) -> Result<Vec<f64>> {
    let mut masses: Vec<Option<f64>> = vec![None; num_types];
    if let Some(mass) = snapshot.mass_if_set() {
        let typeid = snapshot.typeid_or_default();
        for (&t, &m) in typeid.iter().zip(mass.iter()) {
            let slot = &mut masses[(t - 1) as usize];
            match *slot {
                Some(prev) if prev != m => {
                    return Err(Error::unsupported(
                        "mass",
                        format!("type {t} has differing masses {prev} and {m}"),
                    ));
                }
                Some(_) => {}
                None if m <= 0.0 => {
                    return Err(Error::unsupported(
                        "mass",
                        format!("type {t} has non-positive mass {m}"),
                    ));
                }
                None => *slot = Some(m),
            }
        }
    }
    Ok(masses.into_iter().map(|m| m.unwrap_or(1.0)).collect())
}

fn write_atoms<W: Write>(writer: &mut W, snapshot: &Snapshot, style: AtomStyle) -> Result<()> {
    let id = snapshot.id_or_default();
    let typeid = snapshot.typeid_or_default();
    let molecule = snapshot.molecule_or_default();
    let charge = snapshot.charge_or_default();
    let position = snapshot.position_or_default();
    let image = snapshot.image_if_set();

    writeln!(writer, "\nAtoms # {style}\n")?;
    let mut row = Vec::with_capacity(10);
    for i in 0..snapshot.len() {
        row.clear();
        for column in style.columns() {
            row.push(match column {
                AtomColumn::Id => id[i].to_string(),
                AtomColumn::Molecule => molecule[i].to_string(),
                AtomColumn::Type => typeid[i].to_string(),
                AtomColumn::Charge => fmt_float(charge[i]),
                AtomColumn::X => fmt_float(position[[i, 0]]),
                AtomColumn::Y => fmt_float(position[[i, 1]]),
                AtomColumn::Z => fmt_float(position[[i, 2]]),
            });
        }
        if let Some(image) = &image {
            row.extend(image.row(i).iter().map(|v| v.to_string()));
        }
        writeln!(writer, "{}", row.join(" "))?;
    }
    Ok(())
}

fn write_labels<W: Write>(writer: &mut W, section: &str, labels: &LabelMap) -> Result<()> {
    writeln!(writer, "\n{section}\n")?;
    for (id, label) in labels.iter() {
        writeln!(writer, "{id} {label}")?;
    }
    Ok(())
}

fn write_counts<W: Write, K: ConnectionKind>(writer: &mut W, topology: &Topology<K>) -> Result<()> {
    writeln!(writer, "{} {}", topology.len(), K::COUNT_HEADER)?;
    writeln!(writer, "{} {}", topology.num_types(), K::TYPES_HEADER)?;
    Ok(())
}

/// Every connection typeid must fall in `1..=num_types`.
fn check_topology_types<K: ConnectionKind>(topology: &Topology<K>) -> Result<()> {
    let typeid = topology.typeid_or_default();
    let num_types = topology.num_types() as i64;
    if let Some(&bad) = typeid.iter().find(|&&t| t < 1 || t > num_types) {
        return Err(Error::unsupported(
            K::COUNT_HEADER,
            format!("typeid {bad} is outside 1..={num_types}"),
        ));
    }
    Ok(())
}

fn write_topology<W: Write, K: ConnectionKind>(writer: &mut W, topology: &Topology<K>) -> Result<()> {
    if let Some(labels) = &topology.type_label {
        write_labels(writer, K::LABEL_SECTION, labels)?;
    }
    if topology.is_empty() {
        return Ok(());
    }

    let id = topology.id_or_default();
    let typeid = topology.typeid_or_default();
    let members = topology.members_or_default();
    writeln!(writer, "\n{}\n", K::SECTION)?;
    for i in 0..topology.len() {
        let ids: Vec<String> = members.row(i).iter().map(|m| m.to_string()).collect();
        writeln!(writer, "{} {} {}", id[i], typeid[i], ids.join(" "))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::data::read;
    use crate::model::simbox::SimulationBox;
    use crate::model::topology::Bonds;
    use ndarray::array;
    use std::io::Cursor;

    fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() <= eps
    }

    fn snapshot(n: usize) -> Snapshot {
        let simbox = SimulationBox::new([-2.0, -3.0, -4.0], [2.0, 3.0, 4.0]).unwrap();
        Snapshot::new(n, simbox, Some(10))
    }

    fn to_text(snap: &Snapshot, style: Option<AtomStyle>) -> Result<(String, AtomStyle)> {
        let mut buf = Vec::new();
        let style = write(&mut buf, snap, style)?;
        Ok((String::from_utf8(buf).expect("utf8"), style))
    }

    #[test]
    fn infers_minimal_style() {
        let mut snap = snapshot(2);
        assert_eq!(to_text(&snap, None).unwrap().1, AtomStyle::Atomic);
        snap.set_charge(array![0.5, -0.5]).unwrap();
        assert_eq!(to_text(&snap, None).unwrap().1, AtomStyle::Charge);
        snap.set_molecule(array![1, 1]).unwrap();
        assert_eq!(to_text(&snap, None).unwrap().1, AtomStyle::Full);
        snap.clear_charge();
        assert_eq!(to_text(&snap, None).unwrap().1, AtomStyle::Molecular);
    }

    #[test]
    fn style_that_drops_a_field_is_rejected() {
        let mut snap = snapshot(1);
        snap.set_charge(array![1.0]).unwrap();
        let err = to_text(&snap, Some(AtomStyle::Molecular)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedField { ref field, .. } if field == "charge"));
    }

    #[test]
    fn writer_does_not_allocate_fields() {
        let snap = snapshot(3);
        to_text(&snap, Some(AtomStyle::Full)).unwrap();
        assert!(!snap.has_position() && !snap.has_charge() && !snap.has_mass());
    }

    #[test]
    fn header_and_sections() {
        let mut snap = snapshot(2);
        snap.set_typeid(array![1, 2]).unwrap();
        snap.set_mass(array![3.0, 4.5]).unwrap();
        let (text, _) = to_text(&snap, None).unwrap();
        assert!(text.starts_with("LAMMPS data file written by lammps-io, timestep = 10\n"));
        assert!(text.contains("2 atoms\n2 atom types\n"));
        assert!(text.contains("-2.0 2.0 xlo xhi\n"));
        assert!(!text.contains("xy xz yz"));
        assert!(text.contains("\nMasses\n\n1 3.0\n2 4.5\n"));
        assert!(text.contains("\nAtoms # atomic\n\n1 1 0.0 0.0 0.0\n"));
        assert!(!text.contains("Velocities"));
    }

    #[test]
    fn inconsistent_masses_are_rejected() {
        let mut snap = snapshot(2);
        snap.set_mass(array![1.0, 2.0]).unwrap();
        assert!(matches!(
            to_text(&snap, None),
            Err(Error::UnsupportedField { .. })
        ));
        snap.set_mass(array![-1.0, -1.0]).unwrap();
        assert!(to_text(&snap, None).is_err());
    }

    #[test]
    fn declared_types_below_max_typeid_are_rejected() {
        let mut snap = snapshot(2);
        snap.set_typeid(array![1, 3]).unwrap();
        snap.set_num_types(Some(2));
        assert!(to_text(&snap, None).is_err());
    }

    #[test]
    fn bad_bond_type_writes_nothing() {
        let mut snap = snapshot(3);
        let mut bonds = Bonds::new(2);
        bonds.set_members(array![[1, 2], [2, 3]]).unwrap();
        bonds.set_typeid(array![1, 2]).unwrap();
        bonds.set_num_types(Some(1));
        snap.bonds = Some(bonds);

        let mut buf = Vec::new();
        let err = write(&mut buf, &snap, None).unwrap_err();
        assert!(matches!(err, Error::UnsupportedField { ref field, .. } if field == "bonds"));
        assert!(buf.is_empty());
    }

    #[test]
    fn roundtrip_preserves_populated_fields() {
        let mut snap = snapshot(3);
        snap.set_id(array![4, 2, 9]).unwrap();
        snap.set_position(array![[0.5, 1.0, -1.5], [1.0 / 3.0, 0.0, 0.0], [-1.9, 2.9, 3.9]])
            .unwrap();
        snap.set_image(array![[0, 1, 0], [0, 0, 0], [-2, 0, 1]]).unwrap();
        snap.set_velocity(array![[1.0, 0.0, 0.0], [0.0, 2.0, 0.0], [0.0, 0.0, 3.0]])
            .unwrap();
        snap.set_charge(array![0.1, 0.2, -0.3]).unwrap();
        snap.set_typeid(array![2, 1, 2]).unwrap();
        snap.type_label = Some([(1, "A"), (2, "B")].into_iter().collect());
        let mut bonds = Bonds::new(1);
        bonds.set_members(array![[4, 9]]).unwrap();
        snap.bonds = Some(bonds);

        let (text, style) = to_text(&snap, None).unwrap();
        assert_eq!(style, AtomStyle::Charge);
        let mut back = read(Cursor::new(text), None).unwrap().snapshot;

        assert_eq!(back.id().to_vec(), vec![4, 2, 9]);
        assert_eq!(back.image(), snap.image());
        assert!(approx_eq(back.position()[[1, 0]], 1.0 / 3.0, 0.0));
        assert!(approx_eq(back.velocity()[[2, 2]], 3.0, 1e-12));
        assert!(approx_eq(back.charge()[2], -0.3, 1e-12));
        assert_eq!(back.types().unwrap(), vec!["B", "A", "B"]);
        assert!(back.has_mass());
        assert!(!back.has_molecule());
        assert_eq!(back.bonds.as_mut().unwrap().members().row(0).to_vec(), vec![4, 9]);
        assert_eq!(back.step, Some(10));
    }

    #[test]
    fn triclinic_box_writes_tilt_line() {
        let mut snap = snapshot(1);
        snap.simbox = SimulationBox::triclinic([0.0; 3], [1.0; 3], [0.1, 0.0, -0.2]).unwrap();
        let (text, _) = to_text(&snap, None).unwrap();
        assert!(text.contains("0.1 0.0 -0.2 xy xz yz\n"));
        let back = read(Cursor::new(text), None).unwrap().snapshot;
        assert_eq!(back.simbox, snap.simbox);
    }
}
