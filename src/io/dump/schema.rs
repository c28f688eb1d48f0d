use crate::error::{Error, Result};
use crate::io::Format;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;

/// Snapshot field that a dump column can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DumpField {
    Id,
    TypeId,
    Molecule,
    Charge,
    Mass,
    Position,
    ScaledPosition,
    Velocity,
    Image,
}

impl DumpField {
    pub fn is_vector(self) -> bool {
        matches!(
            self,
            DumpField::Position | DumpField::ScaledPosition | DumpField::Velocity | DumpField::Image
        )
    }

    /// LAMMPS column names written for this field, one per component.
    pub fn column_names(self) -> &'static [&'static str] {
        match self {
            DumpField::Id => &["id"],
            DumpField::TypeId => &["type"],
            DumpField::Molecule => &["mol"],
            DumpField::Charge => &["q"],
            DumpField::Mass => &["mass"],
            DumpField::Position => &["x", "y", "z"],
            DumpField::ScaledPosition => &["xs", "ys", "zs"],
            DumpField::Velocity => &["vx", "vy", "vz"],
            DumpField::Image => &["ix", "iy", "iz"],
        }
    }

    /// Field and component a LAMMPS column name maps to, if any.
    pub fn from_column_name(name: &str) -> Option<(Self, usize)> {
        let mapped = match name {
            "id" => (DumpField::Id, 0),
            "type" => (DumpField::TypeId, 0),
            "mol" => (DumpField::Molecule, 0),
            "q" => (DumpField::Charge, 0),
            "mass" => (DumpField::Mass, 0),
            "x" | "xu" => (DumpField::Position, 0),
            "y" | "yu" => (DumpField::Position, 1),
            "z" | "zu" => (DumpField::Position, 2),
            "xs" => (DumpField::ScaledPosition, 0),
            "ys" => (DumpField::ScaledPosition, 1),
            "zs" => (DumpField::ScaledPosition, 2),
            "vx" => (DumpField::Velocity, 0),
            "vy" => (DumpField::Velocity, 1),
            "vz" => (DumpField::Velocity, 2),
            "ix" => (DumpField::Image, 0),
            "iy" => (DumpField::Image, 1),
            "iz" => (DumpField::Image, 2),
            _ => return None,
        };
        Some(mapped)
    }
}

impl fmt::Display for DumpField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DumpField::Id => write!(f, "id"),
            DumpField::TypeId => write!(f, "typeid"),
            DumpField::Molecule => write!(f, "molecule"),
            DumpField::Charge => write!(f, "charge"),
            DumpField::Mass => write!(f, "mass"),
            DumpField::Position => write!(f, "position"),
            DumpField::ScaledPosition => write!(f, "scaled_position"),
            DumpField::Velocity => write!(f, "velocity"),
            DumpField::Image => write!(f, "image"),
        }
    }
}

/// Column indices occupied by one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Columns {
    Scalar(usize),
    Vector([usize; 3]),
}

impl Columns {
    pub fn as_slice(&self) -> &[usize] {
        match self {
            Columns::Scalar(c) => std::slice::from_ref(c),
            Columns::Vector(cs) => cs,
        }
    }
}

/// Mapping from snapshot fields to the columns of an `ITEM: ATOMS` row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DumpSchema {
    fields: BTreeMap<DumpField, Columns>,
}

impl DumpSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `field` to `columns`. Vector fields need [`Columns::Vector`] and
    /// scalar fields need [`Columns::Scalar`].
    pub fn insert(&mut self, field: DumpField, columns: Columns) -> Result<()> {
        let expected = if field.is_vector() { 3 } else { 1 };
        let found = columns.as_slice().len();
        if found != expected {
            return Err(Error::shape(field.to_string(), &[expected], &[found]));
        }
        self.fields.insert(field, columns);
        Ok(())
    }

    pub fn with_scalar(mut self, field: DumpField, column: usize) -> Result<Self> {
        self.insert(field, Columns::Scalar(column))?;
        Ok(self)
    }

    pub fn with_vector(mut self, field: DumpField, columns: [usize; 3]) -> Result<Self> {
        self.insert(field, Columns::Vector(columns))?;
        Ok(self)
    }

    #[inline]
    pub fn get(&self, field: DumpField) -> Option<Columns> {
        self.fields.get(&field).copied()
    }

    #[inline]
    pub fn contains(&self, field: DumpField) -> bool {
        self.fields.contains_key(&field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (DumpField, Columns)> + '_ {
        self.fields.iter().map(|(f, c)| (*f, *c))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of tokens a row must have to reach every mapped column.
    pub fn min_row_len(&self) -> usize {
        self.fields
            .values()
            .flat_map(|c| c.as_slice().iter().copied())
            .max()
            .map_or(0, |c| c + 1)
    }

    /// Infers a schema from an `ITEM: ATOMS ...` line.
    ///
    /// Unrecognized columns are ignored. A vector field with only some of its
    /// components present is an error.
    pub fn from_header(line: &str, line_no: usize) -> Result<Self> {
        let names = line
            .trim()
            .strip_prefix("ITEM: ATOMS")
            .ok_or_else(|| Error::malformed(Format::Dump, line_no, "expected 'ITEM: ATOMS'"))?;

        let mut scalars = BTreeMap::new();
        let mut vectors: BTreeMap<DumpField, [Option<usize>; 3]> = BTreeMap::new();
        for (col, name) in names.split_whitespace().enumerate() {
            match DumpField::from_column_name(name) {
                Some((field, k)) if field.is_vector() => {
                    vectors.entry(field).or_default()[k] = Some(col);
                }
                Some((field, _)) => {
                    scalars.insert(field, col);
                }
                None => {}
            }
        }

        let mut schema = Self::new();
        for (field, col) in scalars {
            schema.insert(field, Columns::Scalar(col))?;
        }
        for (field, parts) in vectors {
            let [Some(a), Some(b), Some(c)] = parts else {
                return Err(Error::malformed(
                    Format::Dump,
                    line_no,
                    format!("'{field}' needs all three components"),
                ));
            };
            schema.insert(field, Columns::Vector([a, b, c]))?;
        }
        Ok(schema)
    }

    /// Loads an explicit schema from TOML, e.g.
    ///
    /// ```toml
    /// id = 0
    /// typeid = 1
    /// position = [2, 3, 4]
    /// ```
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: SchemaConfig = toml::from_str(text)?;
        config.into_schema()
    }

    /// Column names in column order. Columns must cover exactly `0..k`.
    pub fn header_names(&self) -> Result<Vec<&'static str>> {
        let mut named: Vec<(usize, &'static str)> = self
            .fields
            .iter()
            .flat_map(|(field, cols)| {
                cols.as_slice()
                    .iter()
                    .zip(field.column_names())
                    .map(|(c, n)| (*c, *n))
                    .collect::<Vec<_>>()
            })
            .collect();
        named.sort_by_key(|(c, _)| *c);
        if let Some((i, (col, _))) = named.iter().enumerate().find(|(i, (c, _))| c != i) {
            return Err(Error::malformed(
                Format::Dump,
                0,
                format!("schema columns must be 0..{}, found column {col} at position {i}", named.len()),
            ));
        }
        Ok(named.into_iter().map(|(_, n)| n).collect())
    }
}

impl fmt::Display for DumpSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|(field, cols)| match cols {
                Columns::Scalar(c) => format!("{field}={c}"),
                Columns::Vector([a, b, c]) => format!("{field}=[{a},{b},{c}]"),
            })
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SchemaConfig {
    id: Option<usize>,
    typeid: Option<usize>,
    molecule: Option<usize>,
    charge: Option<usize>,
    mass: Option<usize>,
    position: Option<[usize; 3]>,
    scaled_position: Option<[usize; 3]>,
    velocity: Option<[usize; 3]>,
    image: Option<[usize; 3]>,
}

impl SchemaConfig {
    fn into_schema(self) -> Result<DumpSchema> {
        let mut schema = DumpSchema::new();
        let scalars = [
            (DumpField::Id, self.id),
            (DumpField::TypeId, self.typeid),
            (DumpField::Molecule, self.molecule),
            (DumpField::Charge, self.charge),
            (DumpField::Mass, self.mass),
        ];
        for (field, col) in scalars {
            if let Some(col) = col {
                schema.insert(field, Columns::Scalar(col))?;
            }
        }
        let vectors = [
            (DumpField::Position, self.position),
            (DumpField::ScaledPosition, self.scaled_position),
            (DumpField::Velocity, self.velocity),
            (DumpField::Image, self.image),
        ];
        for (field, cols) in vectors {
            if let Some(cols) = cols {
                schema.insert(field, Columns::Vector(cols))?;
            }
        }
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_from_header() {
        let schema = DumpSchema::from_header("ITEM: ATOMS id type xu yu zu vx vy vz c_pe", 9).unwrap();
        assert_eq!(schema.get(DumpField::Id), Some(Columns::Scalar(0)));
        assert_eq!(schema.get(DumpField::TypeId), Some(Columns::Scalar(1)));
        assert_eq!(schema.get(DumpField::Position), Some(Columns::Vector([2, 3, 4])));
        assert_eq!(schema.get(DumpField::Velocity), Some(Columns::Vector([5, 6, 7])));
        assert_eq!(schema.len(), 4);
        assert_eq!(schema.min_row_len(), 8);
    }

    #[test]
    fn partial_vector_is_malformed() {
        let err = DumpSchema::from_header("ITEM: ATOMS id x y", 4).unwrap_err();
        assert!(matches!(err, Error::MalformedFile { line: 4, .. }));
    }

    #[test]
    fn scaled_columns_map_separately() {
        let schema = DumpSchema::from_header("ITEM: ATOMS id xs ys zs", 1).unwrap();
        assert!(schema.contains(DumpField::ScaledPosition));
        assert!(!schema.contains(DumpField::Position));
    }

    #[test]
    fn insert_checks_arity() {
        let mut schema = DumpSchema::new();
        assert!(schema.insert(DumpField::Position, Columns::Scalar(0)).is_err());
        assert!(schema.insert(DumpField::Mass, Columns::Vector([0, 1, 2])).is_err());
    }

    #[test]
    fn loads_from_toml() {
        let schema = DumpSchema::from_toml("id = 0\nposition = [1, 2, 3]\nq = 4\n");
        assert!(matches!(schema, Err(Error::Toml(_))));

        let schema = DumpSchema::from_toml("id = 0\nposition = [1, 2, 3]\ncharge = 4\n").unwrap();
        assert_eq!(schema.get(DumpField::Charge), Some(Columns::Scalar(4)));
        assert_eq!(schema.header_names().unwrap(), vec!["id", "x", "y", "z", "q"]);
    }

    #[test]
    fn header_names_require_contiguous_columns() {
        let schema = DumpSchema::new()
            .with_scalar(DumpField::Id, 0)
            .unwrap()
            .with_scalar(DumpField::TypeId, 2)
            .unwrap();
        assert!(matches!(schema.header_names(), Err(Error::MalformedFile { .. })));
    }

    #[test]
    fn display_lists_fields() {
        let schema = DumpSchema::new()
            .with_scalar(DumpField::Id, 0)
            .unwrap()
            .with_vector(DumpField::Image, [1, 2, 3])
            .unwrap();
        assert_eq!(schema.to_string(), "{id=0, image=[1,2,3]}");
    }
}
