use super::style::{AtomColumn, AtomStyle, IMAGE_COLUMNS};
use super::{DataContents, KNOWN_HEADERS, KNOWN_SECTIONS, UNKNOWN_HEADERS, UNKNOWN_SECTIONS};
use crate::error::{Error, Result};
use crate::io::{Format, strip_comment};
use crate::model::label::LabelMap;
use crate::model::simbox::SimulationBox;
use crate::model::snapshot::Snapshot;
use crate::model::topology::{Angle, Bond, ConnectionKind, Dihedral, Improper, Topology};
use log::{debug, warn};
use ndarray::{Array1, Array2};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::io::BufRead;
use std::str::FromStr;

/// Reads a data file from any buffered reader.
///
/// `atom_style` is used when the `Atoms` section does not name its style; if
/// both are present they must agree.
pub fn read<R: BufRead>(reader: R, atom_style: Option<AtomStyle>) -> Result<DataContents> {
    let lines = collect_lines(reader)?;
    let step = lines.first().and_then(|(_, title)| parse_timestep(title));

    let (header, body_start) = parse_header(&lines)?;
    let sections = split_sections(&lines[body_start..])?;
    let body_line = lines.get(body_start).map(|(ln, _)| *ln).unwrap_or(lines.len());

    let mut unknown_sections = Vec::new();
    let mut known: HashMap<&'static str, Section<'_>> = HashMap::new();
    for section in sections {
        if UNKNOWN_SECTIONS.contains(&section.name) {
            warn!("skipping '{}' section at line {}", section.name, section.line);
            unknown_sections.push(section.name.to_string());
            continue;
        }
        let line = section.line;
        if known.insert(section.name, section).is_some() {
            return Err(Error::malformed(Format::Data, line, "duplicate section"));
        }
    }

    let n = header
        .atoms
        .ok_or_else(|| Error::malformed(Format::Data, body_line, "missing 'atoms' header"))?;
    let num_types = header
        .atom_types
        .ok_or_else(|| Error::malformed(Format::Data, body_line, "missing 'atom types' header"))?;
    let simbox = header.simbox(body_line)?;

    let mut snapshot = Snapshot::new(n, simbox, step);
    snapshot.set_num_types(Some(num_types));

    if let Some(section) = known.get("Atom Type Labels") {
        snapshot.type_label = Some(read_labels(section)?);
    }

    let id_map = match known.get("Atoms") {
        Some(section) => read_atoms(section, atom_style, num_types, &mut snapshot)?,
        None if n == 0 => HashMap::new(),
        None => {
            return Err(Error::malformed(Format::Data, body_line, "missing 'Atoms' section"));
        }
    };

    if let Some(section) = known.get("Velocities") {
        read_velocities(section, &id_map, &mut snapshot)?;
    }
    if let Some(section) = known.get("Masses") {
        read_masses(section, &mut snapshot)?;
    }

    snapshot.bonds = read_topology::<Bond>(&header, &known, &id_map)?;
    snapshot.angles = read_topology::<Angle>(&header, &known, &id_map)?;
    snapshot.dihedrals = read_topology::<Dihedral>(&header, &known, &id_map)?;
    snapshot.impropers = read_topology::<Improper>(&header, &known, &id_map)?;

    debug!(
        "read data file with {} atoms, {} atom types, step {:?}",
        n, num_types, step
    );

    Ok(DataContents {
        snapshot,
        unknown_headers: header.unknown,
        unknown_sections,
    })
}

fn collect_lines<R: BufRead>(reader: R) -> Result<Vec<(usize, String)>> {
    reader
        .lines()
        .enumerate()
        .map(|(i, line)| line.map(|v| (i + 1, v)).map_err(Error::from))
        .collect()
}

/// Extracts `N` from a title containing `timestep = N`.
fn parse_timestep(title: &str) -> Option<u64> {
    let rest = &title[title.find("timestep")? + "timestep".len()..];
    let rest = rest.trim_start().strip_prefix('=')?.trim_start();
    let digits = rest
        .find(|c: char| !c.is_ascii_digit())
        .map_or(rest, |end| &rest[..end]);
    digits.parse().ok()
}

#[derive(Debug, Default)]
struct Header {
    atoms: Option<usize>,
    atom_types: Option<usize>,
    counts: HashMap<&'static str, usize>,
    bounds: [Option<(f64, f64)>; 3],
    tilt: Option<[f64; 3]>,
    unknown: Vec<String>,
}

impl Header {
    fn simbox(&self, line: usize) -> Result<SimulationBox> {
        let mut low = [0.0; 3];
        let mut high = [0.0; 3];
        for (axis, bound) in self.bounds.iter().enumerate() {
            let (lo, hi) = bound.ok_or_else(|| {
                Error::malformed(Format::Data, line, "missing box bounds in header")
            })?;
            low[axis] = lo;
            high[axis] = hi;
        }
        match self.tilt {
            Some(tilt) => SimulationBox::triclinic(low, high, tilt),
            None => SimulationBox::new(low, high),
        }
    }
}

/// Parses header lines until the first section keyword. Returns the header
/// and the index of the first body line.
fn parse_header(lines: &[(usize, String)]) -> Result<(Header, usize)> {
    let mut header = Header::default();

    for (idx, (ln, raw)) in lines.iter().enumerate().skip(1) {
        let text = strip_comment(raw);
        if text.is_empty() {
            continue;
        }
        if section_name(text).is_some() {
            return Ok((header, idx));
        }

        let tokens: Vec<&str> = text.split_whitespace().collect();
        let split = tokens
            .iter()
            .position(|t| t.parse::<f64>().is_err())
            .unwrap_or(tokens.len());
        let (values, words) = tokens.split_at(split);
        let keyword = words.join(" ");
        if keyword.is_empty() {
            return Err(Error::malformed(
                Format::Data,
                *ln,
                format!("header line '{text}' has no keyword"),
            ));
        }

        if let Some(&known) = KNOWN_HEADERS.iter().find(|&&h| h == keyword) {
            apply_header(&mut header, known, values, *ln)?;
        } else if UNKNOWN_HEADERS.contains(&keyword.as_str()) || !values.is_empty() {
            warn!("ignoring header '{}' at line {}", keyword, ln);
            header.unknown.push(keyword);
        } else {
            return Err(Error::malformed(
                Format::Data,
                *ln,
                format!("unrecognized line '{text}'"),
            ));
        }
    }

    Ok((header, lines.len()))
}

fn apply_header(header: &mut Header, keyword: &'static str, values: &[&str], ln: usize) -> Result<()> {
    let needed = match keyword {
        "xy xz yz" => 3,
        "xlo xhi" | "ylo yhi" | "zlo zhi" => 2,
        _ => 1,
    };
    if values.len() < needed {
        return Err(Error::malformed(
            Format::Data,
            ln,
            format!("'{keyword}' needs {needed} values"),
        ));
    }

    match keyword {
        "atoms" => header.atoms = Some(parse_token(values[0], ln, "atom count")?),
        "atom types" => header.atom_types = Some(parse_token(values[0], ln, "atom type count")?),
        "xlo xhi" | "ylo yhi" | "zlo zhi" => {
            let axis = match keyword {
                "xlo xhi" => 0,
                "ylo yhi" => 1,
                _ => 2,
            };
            let lo = parse_token(values[0], ln, "box bound")?;
            let hi = parse_token(values[1], ln, "box bound")?;
            header.bounds[axis] = Some((lo, hi));
        }
        "xy xz yz" => {
            header.tilt = Some([
                parse_token(values[0], ln, "tilt factor")?,
                parse_token(values[1], ln, "tilt factor")?,
                parse_token(values[2], ln, "tilt factor")?,
            ]);
        }
        _ => {
            let count = parse_token(values[0], ln, keyword)?;
            header.counts.insert(keyword, count);
        }
    }
    Ok(())
}

fn section_name(text: &str) -> Option<&'static str> {
    KNOWN_SECTIONS
        .iter()
        .chain(UNKNOWN_SECTIONS.iter())
        .find(|&&name| name == text)
        .copied()
}

#[derive(Debug)]
struct Section<'a> {
    name: &'static str,
    line: usize,
    comment: Option<&'a str>,
    rows: Vec<(usize, &'a str)>,
}

fn split_sections(lines: &[(usize, String)]) -> Result<Vec<Section<'_>>> {
    let mut sections: Vec<Section<'_>> = Vec::new();

    for (ln, raw) in lines {
        let text = strip_comment(raw);
        if let Some(name) = section_name(text) {
            let comment = raw
                .find('#')
                .map(|pos| raw[pos + 1..].trim())
                .filter(|c| !c.is_empty());
            sections.push(Section {
                name,
                line: *ln,
                comment,
                rows: Vec::new(),
            });
            continue;
        }
        if text.is_empty() {
            continue;
        }
        match sections.last_mut() {
            Some(section) => section.rows.push((*ln, text)),
            None => {
                return Err(Error::malformed(
                    Format::Data,
                    *ln,
                    "data line outside of any section",
                ));
            }
        }
    }

    Ok(sections)
}

fn parse_token<T: FromStr>(token: &str, ln: usize, what: &str) -> Result<T> {
    token
        .parse()
        .map_err(|_| Error::malformed(Format::Data, ln, format!("invalid {what} '{token}'")))
}

/// Resolves a type column that holds either an integer id or a label.
fn parse_type(token: &str, labels: Option<&LabelMap>, ln: usize) -> Result<i64> {
    token
        .parse::<i64>()
        .ok()
        .or_else(|| labels.and_then(|l| l.id_of(token)))
        .ok_or_else(|| Error::malformed(Format::Data, ln, format!("unknown type '{token}'")))
}

fn expect_rows(section: &Section<'_>, expected: usize) -> Result<()> {
    if section.rows.len() != expected {
        return Err(Error::malformed(
            Format::Data,
            section.line,
            format!(
                "'{}' has {} rows but the header declares {}",
                section.name,
                section.rows.len(),
                expected
            ),
        ));
    }
    Ok(())
}

/// Builds the id -> index map and reports whether ids run `1..=N` in order.
fn index_ids(ids: &[i64], rows: &[(usize, &str)]) -> Result<(HashMap<i64, usize>, bool)> {
    let mut map = HashMap::with_capacity(ids.len());
    let mut sequential = true;
    for (idx, (&id, (ln, _))) in ids.iter().zip(rows).enumerate() {
        sequential &= id == idx as i64 + 1;
        match map.entry(id) {
            Entry::Occupied(_) => {
                return Err(Error::malformed(Format::Data, *ln, format!("duplicate id {id}")));
            }
            Entry::Vacant(slot) => {
                slot.insert(idx);
            }
        }
    }
    Ok((map, sequential))
}

fn resolve_style(section: &Section<'_>, caller: Option<AtomStyle>) -> Result<AtomStyle> {
    let declared = section
        .comment
        .map(|c| {
            c.parse::<AtomStyle>()
                .map_err(|e| Error::malformed(Format::Data, section.line, e.to_string()))
        })
        .transpose()?;

    match (declared, caller) {
        (Some(found), Some(wanted)) if found != wanted => Err(Error::SchemaMismatch {
            declared: wanted.to_string(),
            found: found.to_string(),
        }),
        (Some(style), _) | (None, Some(style)) => Ok(style),
        (None, None) => Err(Error::SchemaMissing(
            "atom style is neither given nor recorded on the Atoms line",
        )),
    }
}

fn read_labels(section: &Section<'_>) -> Result<LabelMap> {
    let mut labels = LabelMap::new();
    for (ln, text) in &section.rows {
        let mut tokens = text.split_whitespace();
        let (Some(id), Some(label)) = (tokens.next(), tokens.next()) else {
            return Err(Error::malformed(Format::Data, *ln, "expected 'typeid label'"));
        };
        labels.insert(parse_token(id, *ln, "type id")?, label);
    }
    Ok(labels)
}

fn read_atoms(
    section: &Section<'_>,
    caller: Option<AtomStyle>,
    num_types: usize,
    snapshot: &mut Snapshot,
) -> Result<HashMap<i64, usize>> {
    let style = resolve_style(section, caller)?;
    let n = snapshot.len();
    expect_rows(section, n)?;
    debug!("decoding Atoms section with style '{}'", style);

    let columns = style.columns();
    let width = columns.len();
    let mut ids = Vec::with_capacity(n);
    let mut typeid = Vec::with_capacity(n);
    let mut molecule = Vec::with_capacity(n);
    let mut charge = Vec::with_capacity(n);
    let mut position = Array2::<f64>::zeros((n, 3));
    let mut image = Array2::<i64>::zeros((n, 3));
    let mut any_image = false;

    let labels = snapshot.type_label.as_ref();
    for (i, (ln, text)) in section.rows.iter().enumerate() {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.len() != width && tokens.len() != width + IMAGE_COLUMNS {
            return Err(Error::malformed(
                Format::Data,
                *ln,
                format!(
                    "expected {} or {} columns for style '{}', found {}",
                    width,
                    width + IMAGE_COLUMNS,
                    style,
                    tokens.len()
                ),
            ));
        }

        for (column, token) in columns.iter().zip(&tokens) {
            match column {
                AtomColumn::Id => ids.push(parse_token(token, *ln, "atom id")?),
                AtomColumn::Molecule => molecule.push(parse_token(token, *ln, "molecule id")?),
                AtomColumn::Type => {
                    let t = parse_type(token, labels, *ln)?;
                    if t < 1 || t > num_types as i64 {
                        return Err(Error::malformed(
                            Format::Data,
                            *ln,
                            format!("type {t} is outside 1..={num_types}"),
                        ));
                    }
                    typeid.push(t);
                }
                AtomColumn::Charge => charge.push(parse_token(token, *ln, "charge")?),
                AtomColumn::X => position[[i, 0]] = parse_token(token, *ln, "coordinate")?,
                AtomColumn::Y => position[[i, 1]] = parse_token(token, *ln, "coordinate")?,
                AtomColumn::Z => position[[i, 2]] = parse_token(token, *ln, "coordinate")?,
            }
        }

        if tokens.len() > width {
            any_image = true;
            for (k, token) in tokens[width..].iter().enumerate() {
                image[[i, k]] = parse_token(token, *ln, "image flag")?;
            }
        }
    }

    let (id_map, sequential) = index_ids(&ids, &section.rows)?;

    snapshot.set_typeid(Array1::from(typeid))?;
    snapshot.set_position(position)?;
    if style.carries_molecule() {
        snapshot.set_molecule(Array1::from(molecule))?;
    }
    if style.carries_charge() {
        snapshot.set_charge(Array1::from(charge))?;
    }
    if any_image {
        snapshot.set_image(image)?;
    }
    if !sequential {
        snapshot.set_id(Array1::from(ids))?;
    }

    Ok(id_map)
}

fn read_velocities(
    section: &Section<'_>,
    id_map: &HashMap<i64, usize>,
    snapshot: &mut Snapshot,
) -> Result<()> {
    let n = snapshot.len();
    expect_rows(section, n)?;

    let mut velocity = Array2::<f64>::zeros((n, 3));
    for (ln, text) in &section.rows {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.len() < 4 {
            return Err(Error::malformed(Format::Data, *ln, "expected 'id vx vy vz'"));
        }
        let id: i64 = parse_token(tokens[0], *ln, "atom id")?;
        let idx = *id_map.get(&id).ok_or_else(|| {
            Error::malformed(Format::Data, *ln, format!("velocity for unknown atom id {id}"))
        })?;
        for k in 0..3 {
            velocity[[idx, k]] = parse_token(tokens[k + 1], *ln, "velocity")?;
        }
    }

    snapshot.set_velocity(velocity)
}

fn read_masses(section: &Section<'_>, snapshot: &mut Snapshot) -> Result<()> {
    let mut by_type = HashMap::new();
    let labels = snapshot.type_label.as_ref();
    for (ln, text) in &section.rows {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.len() < 2 {
            return Err(Error::malformed(Format::Data, *ln, "expected 'type mass'"));
        }
        let t = parse_type(tokens[0], labels, *ln)?;
        let m: f64 = parse_token(tokens[1], *ln, "mass")?;
        by_type.insert(t, m);
    }

    let mass = snapshot
        .typeid_or_default()
        .mapv(|t| by_type.get(&t).copied().unwrap_or(1.0));
    snapshot.set_mass(mass)
}

fn read_topology<K: ConnectionKind>(
    header: &Header,
    sections: &HashMap<&'static str, Section<'_>>,
    id_map: &HashMap<i64, usize>,
) -> Result<Option<Topology<K>>> {
    let section = sections.get(K::SECTION);
    let Some(&count) = header.counts.get(K::COUNT_HEADER) else {
        if let Some(section) = section {
            return Err(Error::malformed(
                Format::Data,
                section.line,
                format!("'{}' section without a '{}' header", K::SECTION, K::COUNT_HEADER),
            ));
        }
        return Ok(None);
    };

    let mut topology = Topology::<K>::new(count);
    topology.set_num_types(header.counts.get(K::TYPES_HEADER).copied());
    if let Some(labels) = sections.get(K::LABEL_SECTION) {
        topology.type_label = Some(read_labels(labels)?);
    }

    let Some(section) = section else {
        return Ok(Some(topology));
    };
    expect_rows(section, count)?;

    let mut ids = Vec::with_capacity(count);
    let mut typeid = Vec::with_capacity(count);
    let mut members = Array2::<i64>::zeros((count, K::ARITY));
    let labels = topology.type_label.as_ref();
    for (i, (ln, text)) in section.rows.iter().enumerate() {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.len() < 2 + K::ARITY {
            return Err(Error::malformed(
                Format::Data,
                *ln,
                format!("expected {} columns in '{}'", 2 + K::ARITY, K::SECTION),
            ));
        }
        ids.push(parse_token(tokens[0], *ln, "connection id")?);
        typeid.push(parse_type(tokens[1], labels, *ln)?);
        for k in 0..K::ARITY {
            let member: i64 = parse_token(tokens[2 + k], *ln, "atom id")?;
            if !id_map.contains_key(&member) {
                return Err(Error::malformed(
                    Format::Data,
                    *ln,
                    format!("'{}' references unknown atom id {member}", K::SECTION),
                ));
            }
            members[[i, k]] = member;
        }
    }

    let (_, sequential) = index_ids(&ids, &section.rows)?;
    topology.set_typeid(Array1::from(typeid))?;
    topology.set_members(members)?;
    if !sequential {
        topology.set_id(Array1::from(ids))?;
    }

    Ok(Some(topology))
}
