use super::schema::{DumpField, DumpSchema};
use crate::error::{Error, Result};
use crate::io::fmt_float;
use crate::model::snapshot::Snapshot;
use log::debug;
use std::io::Write;

/// Writes each snapshot as one frame laid out by `schema`.
///
/// Schema columns must be exactly `0..k`. Every mapped field except `id` must
/// be set on every snapshot; `id` falls back to `1..=N`.
pub fn write<'a, W, I>(mut writer: W, schema: &DumpSchema, snapshots: I) -> Result<usize>
where
    W: Write,
    I: IntoIterator<Item = &'a Snapshot>,
{
    let names = schema.header_names()?;
    let sources = column_sources(schema);
    let header = format!("ITEM: ATOMS {}", names.join(" "));

    let mut frames = 0;
    for snapshot in snapshots {
        check_fields(schema, snapshot)?;
        write_frame(&mut writer, &header, &sources, snapshot)?;
        frames += 1;
    }
    debug!("wrote {} dump frames", frames);
    Ok(frames)
}

/// Fractional coordinates of every particle, computed only when a column
/// asks for them.
fn scaled_positions(sources: &[(DumpField, usize)], snapshot: &Snapshot) -> Option<Vec<[f64; 3]>> {
    if !sources.iter().any(|&(field, _)| field == DumpField::ScaledPosition) {
        return None;
    }
    let position = snapshot.position_or_default();
    Some(
        position
            .rows()
            .into_iter()
            .map(|p| snapshot.simbox.scale([p[0], p[1], p[2]]))
            .collect(),
    )
}

/// `(field, component)` for each column, in column order.
fn column_sources(schema: &DumpSchema) -> Vec<(DumpField, usize)> {
    let mut sources: Vec<(usize, DumpField, usize)> = schema
        .fields()
        .flat_map(|(field, cols)| {
            cols.as_slice()
                .iter()
                .enumerate()
                .map(|(k, &c)| (c, field, k))
                .collect::<Vec<_>>()
        })
        .collect();
    sources.sort_by_key(|(c, _, _)| *c);
    sources.into_iter().map(|(_, f, k)| (f, k)).collect()
}

fn check_fields(schema: &DumpSchema, snapshot: &Snapshot) -> Result<()> {
    for (field, _) in schema.fields() {
        let set = match field {
            DumpField::Id => true,
            DumpField::TypeId => snapshot.has_typeid(),
            DumpField::Molecule => snapshot.has_molecule(),
            DumpField::Charge => snapshot.has_charge(),
            DumpField::Mass => snapshot.has_mass(),
            DumpField::Position | DumpField::ScaledPosition => snapshot.has_position(),
            DumpField::Velocity => snapshot.has_velocity(),
            DumpField::Image => snapshot.has_image(),
        };
        if !set {
            return Err(Error::unsupported(
                field.to_string(),
                "schema maps a field that is not set on the snapshot",
            ));
        }
    }
    Ok(())
}

fn write_frame<W: Write>(
    writer: &mut W,
    header: &str,
    sources: &[(DumpField, usize)],
    snapshot: &Snapshot,
) -> Result<()> {
    writeln!(writer, "ITEM: TIMESTEP\n{}", snapshot.step.unwrap_or(0))?;
    writeln!(writer, "ITEM: NUMBER OF ATOMS\n{}", snapshot.len())?;

    let simbox = &snapshot.simbox;
    let (low, high) = (simbox.low(), simbox.high());
    match simbox.tilt() {
        None => {
            writeln!(writer, "ITEM: BOX BOUNDS pp pp pp")?;
            for k in 0..3 {
                writeln!(writer, "{} {}", fmt_float(low[k]), fmt_float(high[k]))?;
            }
        }
        Some(tilt) => {
            // LAMMPS stores the bounding box of the tilted cell.
            let [xy, xz, yz] = tilt;
            let x_shift = [0.0, xy, xz, xy + xz];
            let lo = [
                low[0] + x_shift.iter().copied().fold(0.0, f64::min),
                low[1] + yz.min(0.0),
                low[2],
            ];
            let hi = [
                high[0] + x_shift.iter().copied().fold(0.0, f64::max),
                high[1] + yz.max(0.0),
                high[2],
            ];
            writeln!(writer, "ITEM: BOX BOUNDS xy xz yz pp pp pp")?;
            for k in 0..3 {
                writeln!(
                    writer,
                    "{} {} {}",
                    fmt_float(lo[k]),
                    fmt_float(hi[k]),
                    fmt_float(tilt[k])
                )?;
            }
        }
    }

    writeln!(writer, "{header}")?;
    let id = snapshot.id_or_default();
    let typeid = snapshot.typeid_or_default();
    let molecule = snapshot.molecule_or_default();
    let charge = snapshot.charge_or_default();
    let mass = snapshot.mass_or_default();
    let position = snapshot.position_or_default();
    let velocity = snapshot.velocity_or_default();
    let image = snapshot.image_or_default();
    let scaled = scaled_positions(sources, snapshot).unwrap_or_default();

    let mut row = Vec::with_capacity(sources.len());
    for i in 0..snapshot.len() {
        row.clear();
        for &(field, k) in sources {
            row.push(match field {
                DumpField::Id => id[i].to_string(),
                DumpField::TypeId => typeid[i].to_string(),
                DumpField::Molecule => molecule[i].to_string(),
                DumpField::Charge => fmt_float(charge[i]),
                DumpField::Mass => fmt_float(mass[i]),
                DumpField::Position => fmt_float(position[[i, k]]),
                DumpField::ScaledPosition => fmt_float(scaled[i][k]),
                DumpField::Velocity => fmt_float(velocity[[i, k]]),
                DumpField::Image => image[[i, k]].to_string(),
            });
        }
        writeln!(writer, "{}", row.join(" "))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::dump::{Frames, ReadOptions};
    use crate::model::simbox::SimulationBox;
    use ndarray::array;
    use std::io::Cursor;

    fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() <= eps
    }

    fn schema() -> DumpSchema {
        DumpSchema::new()
            .with_scalar(DumpField::Id, 0)
            .unwrap()
            .with_scalar(DumpField::TypeId, 1)
            .unwrap()
            .with_vector(DumpField::Position, [2, 3, 4])
            .unwrap()
    }

    fn snapshot(step: Option<u64>) -> Snapshot {
        let simbox = SimulationBox::new([0.0; 3], [4.0; 3]).unwrap();
        let mut snap = Snapshot::new(2, simbox, step);
        snap.set_typeid(array![2, 1]).unwrap();
        snap.set_position(array![[1.0, 2.0, 3.0], [0.5, 0.25, 0.125]]).unwrap();
        snap
    }

    #[test]
    fn writes_header_and_rows() {
        let mut buf = Vec::new();
        let snap = snapshot(None);
        assert_eq!(write(&mut buf, &schema(), [&snap]).unwrap(), 1);
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text,
            "ITEM: TIMESTEP\n0\nITEM: NUMBER OF ATOMS\n2\nITEM: BOX BOUNDS pp pp pp\n\
             0.0 4.0\n0.0 4.0\n0.0 4.0\nITEM: ATOMS id type x y z\n\
             1 2 1.0 2.0 3.0\n2 1 0.5 0.25 0.125\n"
        );
    }

    #[test]
    fn unset_field_is_rejected() {
        let schema = schema().with_vector(DumpField::Velocity, [5, 6, 7]).unwrap();
        let err = write(Vec::new(), &schema, [&snapshot(Some(1))]).unwrap_err();
        assert!(matches!(err, Error::UnsupportedField { ref field, .. } if field == "velocity"));
    }

    #[test]
    fn gaps_in_columns_are_rejected() {
        let schema = DumpSchema::new().with_scalar(DumpField::Id, 1).unwrap();
        assert!(write(Vec::new(), &schema, [&snapshot(None)]).is_err());
    }

    #[test]
    fn triclinic_roundtrip() {
        let mut snap = snapshot(Some(7));
        snap.simbox = SimulationBox::triclinic([0.0; 3], [4.0; 3], [1.0, -0.5, 0.25]).unwrap();
        let schema = schema();
        let mut buf = Vec::new();
        write(&mut buf, &schema, [&snap, &snap]).unwrap();

        let frames: Vec<Snapshot> = Frames::new(Cursor::new(buf), ReadOptions::default())
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(frames.len(), 2);
        let back = &frames[1];
        assert_eq!(back.step, Some(7));
        assert_eq!(back.simbox.tilt(), snap.simbox.tilt());
        for k in 0..3 {
            assert!(approx_eq(back.simbox.low()[k], 0.0, 1e-12));
            assert!(approx_eq(back.simbox.high()[k], 4.0, 1e-12));
        }
        assert!(!back.has_id());
        assert_eq!(back.typeid_if_set().unwrap().to_vec(), vec![2, 1]);
    }

    #[test]
    fn scaled_positions_roundtrip() {
        let snap = snapshot(None);
        let schema = DumpSchema::new()
            .with_vector(DumpField::ScaledPosition, [0, 1, 2])
            .unwrap();
        let mut buf = Vec::new();
        write(&mut buf, &schema, [&snap]).unwrap();
        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.contains("ITEM: ATOMS xs ys zs\n0.25 0.5 0.75\n"));

        let back = Frames::new(Cursor::new(buf), ReadOptions::default())
            .next()
            .unwrap()
            .unwrap();
        let p = back.position_if_set().unwrap();
        assert!(approx_eq(p[[1, 1]], 0.25, 1e-12));
    }

    #[test]
    fn fractional_coordinates_only_for_scaled_columns() {
        let snap = snapshot(None);
        assert!(scaled_positions(&column_sources(&schema()), &snap).is_none());

        let schema = schema()
            .with_vector(DumpField::ScaledPosition, [5, 6, 7])
            .unwrap();
        let scaled = scaled_positions(&column_sources(&schema), &snap).unwrap();
        assert_eq!(scaled.len(), 2);
        assert!(approx_eq(scaled[0][2], 0.75, 1e-12));
        assert!(approx_eq(scaled[1][0], 0.125, 1e-12));
    }
}
