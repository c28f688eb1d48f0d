use super::schema::{Columns, DumpField, DumpSchema};
use crate::error::{Error, Result};
use crate::io::Format;
use crate::model::simbox::SimulationBox;
use crate::model::snapshot::Snapshot;
use log::debug;
use ndarray::{Array1, Array2, Axis};
use std::collections::HashMap;
use std::io::BufRead;
use std::str::FromStr;
use std::sync::Arc;

const TIMESTEP: &str = "ITEM: TIMESTEP";
const NUMBER_OF_ATOMS: &str = "ITEM: NUMBER OF ATOMS";
const BOX_BOUNDS: &str = "ITEM: BOX BOUNDS";
const ATOMS: &str = "ITEM: ATOMS";
const FRAME_ITEMS: [&str; 4] = [TIMESTEP, NUMBER_OF_ATOMS, BOX_BOUNDS, ATOMS];

/// Options that shape how frames are decoded.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Explicit schema; takes precedence over the `ITEM: ATOMS` header.
    pub schema: Option<DumpSchema>,
    /// Sort particles by ascending id when the frame carries ids.
    pub sort_ids: bool,
    /// Template that fills in fields the frame does not carry.
    pub copy_from: Option<Arc<Snapshot>>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            schema: None,
            sort_ids: true,
            copy_from: None,
        }
    }
}

/// Forward-only cursor over the frames of a dump stream.
///
/// Each call to `next` decodes one frame. After the first error the cursor is
/// exhausted.
pub struct Frames<R> {
    reader: R,
    options: ReadOptions,
    line_no: usize,
    buf: String,
    done: bool,
}

impl<R: BufRead> Frames<R> {
    pub fn new(reader: R, options: ReadOptions) -> Self {
        Self {
            reader,
            options,
            line_no: 0,
            buf: String::new(),
            done: false,
        }
    }

    fn next_line(&mut self) -> Result<Option<&str>> {
        self.buf.clear();
        if self.reader.read_line(&mut self.buf)? == 0 {
            return Ok(None);
        }
        self.line_no += 1;
        Ok(Some(self.buf.trim_end_matches(['\n', '\r'])))
    }

    fn require_line(&mut self, what: &str) -> Result<String> {
        let line_no = self.line_no + 1;
        match self.next_line()? {
            Some(line) => Ok(line.to_string()),
            None => Err(Error::malformed(
                Format::Dump,
                line_no,
                format!("frame ended while reading {what}"),
            )),
        }
    }

    /// Skips ahead to the `item` line, ignoring unrelated items such as
    /// `ITEM: UNITS`. Returns the full item line.
    fn seek_item(&mut self, item: &str, allow_eof: bool) -> Result<Option<String>> {
        loop {
            let line_no = self.line_no + 1;
            let Some(line) = self.next_line()? else {
                if allow_eof {
                    return Ok(None);
                }
                return Err(Error::malformed(
                    Format::Dump,
                    line_no,
                    format!("frame ended before '{item}'"),
                ));
            };
            let trimmed = line.trim();
            if trimmed.starts_with(item) {
                return Ok(Some(trimmed.to_string()));
            }
            if let Some(other) = FRAME_ITEMS.iter().find(|i| trimmed.starts_with(**i)) {
                return Err(Error::malformed(
                    Format::Dump,
                    self.line_no,
                    format!("expected '{item}', found '{other}'"),
                ));
            }
        }
    }

    fn next_frame(&mut self) -> Result<Option<Snapshot>> {
        if self.seek_item(TIMESTEP, true)?.is_none() {
            return Ok(None);
        }
        let step: u64 = parse_value(&self.require_line("timestep")?, self.line_no, "timestep")?;

        self.seek_item(NUMBER_OF_ATOMS, false)?;
        let n: usize = parse_value(&self.require_line("atom count")?, self.line_no, "atom count")?;

        let header = self
            .seek_item(BOX_BOUNDS, false)?
            .unwrap_or_default();
        let simbox = self.read_box(&header)?;

        let atoms_header = self.seek_item(ATOMS, false)?.unwrap_or_default();
        let schema = match &self.options.schema {
            Some(schema) => schema.clone(),
            None => DumpSchema::from_header(&atoms_header, self.line_no)?,
        };
        if schema.is_empty() {
            return Err(Error::SchemaMissing(
                "no schema given and the ATOMS header names no known columns",
            ));
        }

        let mut snapshot = Snapshot::new(n, simbox, Some(step));
        self.read_atoms(&schema, &mut snapshot)?;

        let order = match snapshot.id_if_set() {
            Some(id) if self.options.sort_ids => {
                let mut order: Vec<usize> = (0..n).collect();
                order.sort_by_key(|&i| id[i]);
                Some(order)
            }
            _ => None,
        };
        if let Some(order) = order {
            snapshot.reorder(&order, true)?;
        }
        if let Some(template) = &self.options.copy_from {
            copy_from_template(&mut snapshot, template)?;
        }

        debug!("decoded dump frame at step {} with {} atoms", step, n);
        Ok(Some(snapshot))
    }

    fn read_box(&mut self, header: &str) -> Result<SimulationBox> {
        let header_line = self.line_no;
        let triclinic = match header.split_whitespace().count() {
            6 => false,
            9 => true,
            _ => {
                return Err(Error::malformed(
                    Format::Dump,
                    header_line,
                    "BOX BOUNDS header must have 3 or 6 flags",
                ));
            }
        };
        let width = if triclinic { 3 } else { 2 };

        let mut rows = [[0.0; 3]; 3];
        for row in rows.iter_mut() {
            let line = self.require_line("box bounds")?;
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < width {
                return Err(Error::malformed(
                    Format::Dump,
                    self.line_no,
                    format!("expected {width} values per box line"),
                ));
            }
            for k in 0..width {
                row[k] = parse_value(tokens[k], self.line_no, "box bound")?;
            }
        }

        let mut low = [rows[0][0], rows[1][0], rows[2][0]];
        let mut high = [rows[0][1], rows[1][1], rows[2][1]];
        if !triclinic {
            return SimulationBox::new(low, high);
        }

        // Triclinic bounds are the bounding box of the tilted cell.
        let tilt = [rows[0][2], rows[1][2], rows[2][2]];
        let [xy, xz, yz] = tilt;
        let x_shift = [0.0, xy, xz, xy + xz];
        low[0] -= x_shift.iter().copied().fold(0.0, f64::min);
        high[0] -= x_shift.iter().copied().fold(0.0, f64::max);
        low[1] -= yz.min(0.0);
        high[1] -= yz.max(0.0);
        SimulationBox::triclinic(low, high, tilt)
    }

    fn read_atoms(&mut self, schema: &DumpSchema, snapshot: &mut Snapshot) -> Result<()> {
        let n = snapshot.len();
        let min_len = schema.min_row_len();
        let mut columns = RowColumns::new(schema);

        for _ in 0..n {
            let line = self.require_line("atom rows")?;
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < min_len {
                return Err(Error::malformed(
                    Format::Dump,
                    self.line_no,
                    format!("expected at least {min_len} columns, found {}", tokens.len()),
                ));
            }
            columns.parse_row(&tokens, self.line_no)?;
        }

        let (ints, floats) = columns.into_arrays()?;
        FrameColumns { ints, floats }.apply(snapshot)
    }
}

impl<R: BufRead> Iterator for Frames<R> {
    type Item = Result<Snapshot>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_frame() {
            Ok(Some(snapshot)) => Some(Ok(snapshot)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl<R: BufRead> std::iter::FusedIterator for Frames<R> {}

fn parse_value<T: FromStr>(token: &str, line: usize, what: &str) -> Result<T> {
    token
        .trim()
        .parse()
        .map_err(|_| Error::malformed(Format::Dump, line, format!("invalid {what} '{}'", token.trim())))
}

/// Per-field buffers for the rows of one frame, filled row by row so that
/// memory follows the rows actually present rather than the declared count.
struct RowColumns {
    schema: Vec<(DumpField, Columns)>,
    rows: usize,
    ints: HashMap<DumpField, (usize, Vec<i64>)>,
    floats: HashMap<DumpField, (usize, Vec<f64>)>,
}

impl RowColumns {
    fn new(schema: &DumpSchema) -> Self {
        let mut ints = HashMap::new();
        let mut floats = HashMap::new();
        for (field, cols) in schema.fields() {
            let width = cols.as_slice().len();
            match field {
                DumpField::Id | DumpField::TypeId | DumpField::Molecule | DumpField::Image => {
                    ints.insert(field, (width, Vec::new()));
                }
                _ => {
                    floats.insert(field, (width, Vec::new()));
                }
            }
        }
        Self {
            schema: schema.fields().collect(),
            rows: 0,
            ints,
            floats,
        }
    }

    fn parse_row(&mut self, tokens: &[&str], line: usize) -> Result<()> {
        for (field, cols) in &self.schema {
            if let Some((_, target)) = self.ints.get_mut(field) {
                for &c in cols.as_slice() {
                    target.push(parse_value(tokens[c], line, "integer column")?);
                }
            } else if let Some((_, target)) = self.floats.get_mut(field) {
                for &c in cols.as_slice() {
                    target.push(parse_value(tokens[c], line, "float column")?);
                }
            }
        }
        self.rows += 1;
        Ok(())
    }

    /// Moves the buffered rows into `(rows, width)` arrays.
    fn into_arrays(
        self,
    ) -> Result<(HashMap<DumpField, Array2<i64>>, HashMap<DumpField, Array2<f64>>)> {
        Ok((shape_rows(self.ints, self.rows)?, shape_rows(self.floats, self.rows)?))
    }
}

fn shape_rows<A>(
    buffers: HashMap<DumpField, (usize, Vec<A>)>,
    rows: usize,
) -> Result<HashMap<DumpField, Array2<A>>> {
    buffers
        .into_iter()
        .map(|(field, (width, values))| {
            let found = values.len();
            Array2::from_shape_vec((rows, width), values)
                .map(|array| (field, array))
                .map_err(|_| Error::shape(format!("{field:?}"), &[rows, width], &[found]))
        })
        .collect()
}

struct FrameColumns {
    ints: HashMap<DumpField, Array2<i64>>,
    floats: HashMap<DumpField, Array2<f64>>,
}

impl FrameColumns {
    fn apply(mut self, snapshot: &mut Snapshot) -> Result<()> {
        if let Some(id) = take_scalar(&mut self.ints, DumpField::Id) {
            let sequential = id.iter().enumerate().all(|(i, &v)| v == i as i64 + 1);
            if !sequential {
                snapshot.set_id(id)?;
            }
        }
        if let Some(typeid) = take_scalar(&mut self.ints, DumpField::TypeId) {
            snapshot.set_typeid(typeid)?;
        }
        if let Some(molecule) = take_scalar(&mut self.ints, DumpField::Molecule) {
            snapshot.set_molecule(molecule)?;
        }
        if let Some(image) = self.ints.remove(&DumpField::Image) {
            snapshot.set_image(image)?;
        }
        if let Some(charge) = take_scalar(&mut self.floats, DumpField::Charge) {
            snapshot.set_charge(charge)?;
        }
        if let Some(mass) = take_scalar(&mut self.floats, DumpField::Mass) {
            snapshot.set_mass(mass)?;
        }

        let scaled = self.floats.remove(&DumpField::ScaledPosition);
        if let Some(position) = self.floats.remove(&DumpField::Position) {
            snapshot.set_position(position)?;
        } else if let Some(mut position) = scaled {
            let simbox = snapshot.simbox;
            for mut row in position.rows_mut() {
                let p = simbox.unscale([row[0], row[1], row[2]]);
                for k in 0..3 {
                    row[k] = p[k];
                }
            }
            snapshot.set_position(position)?;
        }
        if let Some(velocity) = self.floats.remove(&DumpField::Velocity) {
            snapshot.set_velocity(velocity)?;
        }
        Ok(())
    }
}

fn take_scalar<A>(map: &mut HashMap<DumpField, Array2<A>>, field: DumpField) -> Option<Array1<A>> {
    map.remove(&field).map(|a| a.index_axis_move(Axis(1), 0))
}

/// Fills fields the frame did not carry from `template`, matching particles
/// by id.
fn copy_from_template(snapshot: &mut Snapshot, template: &Snapshot) -> Result<()> {
    let n = snapshot.len();
    if template.len() != n {
        return Err(Error::template(format!(
            "template has {} particles, frame has {}",
            template.len(),
            n
        )));
    }

    let template_index: HashMap<i64, usize> = template
        .id_or_default()
        .iter()
        .enumerate()
        .map(|(i, &id)| (id, i))
        .collect();
    let order = snapshot
        .id_or_default()
        .iter()
        .map(|id| {
            template_index
                .get(id)
                .copied()
                .ok_or_else(|| Error::template(format!("particle id {id} is not in the template")))
        })
        .collect::<Result<Vec<usize>>>()?;

    macro_rules! copy_missing {
        ($has:ident, $if_set:ident, $set:ident) => {
            if !snapshot.$has() {
                if let Some(values) = template.$if_set() {
                    snapshot.$set(values.select(Axis(0), &order))?;
                }
            }
        };
    }
    copy_missing!(has_typeid, typeid_if_set, set_typeid);
    copy_missing!(has_molecule, molecule_if_set, set_molecule);
    copy_missing!(has_charge, charge_if_set, set_charge);
    copy_missing!(has_mass, mass_if_set, set_mass);
    copy_missing!(has_position, position_if_set, set_position);
    copy_missing!(has_velocity, velocity_if_set, set_velocity);
    copy_missing!(has_image, image_if_set, set_image);

    if snapshot.declared_num_types().is_none() {
        snapshot.set_num_types(template.declared_num_types());
    }
    if snapshot.type_label.is_none() {
        snapshot.type_label = template.type_label.clone();
    }
    if template.has_bonds() {
        snapshot.bonds = template.bonds.clone();
    }
    if template.has_angles() {
        snapshot.angles = template.angles.clone();
    }
    if template.has_dihedrals() {
        snapshot.dihedrals = template.dihedrals.clone();
    }
    if template.has_impropers() {
        snapshot.impropers = template.impropers.clone();
    }
    Ok(())
}
