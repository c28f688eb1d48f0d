use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid atom style string: '{0}'")]
pub struct ParseAtomStyleError(String);

/// Layout of a row in the `Atoms` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomStyle {
    Atomic,
    Charge,
    Molecular,
    Full,
}

/// Meaning of one column of an `Atoms` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomColumn {
    Id,
    Molecule,
    Type,
    Charge,
    X,
    Y,
    Z,
}

/// Number of trailing image-flag columns any style may carry.
pub const IMAGE_COLUMNS: usize = 3;

impl AtomStyle {
    /// Columns in file order, excluding the optional `ix iy iz`.
    pub fn columns(self) -> &'static [AtomColumn] {
        use AtomColumn::*;
        match self {
            AtomStyle::Atomic => &[Id, Type, X, Y, Z],
            AtomStyle::Charge => &[Id, Type, Charge, X, Y, Z],
            AtomStyle::Molecular => &[Id, Molecule, Type, X, Y, Z],
            AtomStyle::Full => &[Id, Molecule, Type, Charge, X, Y, Z],
        }
    }

    #[inline]
    pub fn carries_charge(self) -> bool {
        matches!(self, AtomStyle::Charge | AtomStyle::Full)
    }

    #[inline]
    pub fn carries_molecule(self) -> bool {
        matches!(self, AtomStyle::Molecular | AtomStyle::Full)
    }

    /// Smallest style that can hold the given optional fields.
    pub fn minimal(has_charge: bool, has_molecule: bool) -> Self {
        match (has_charge, has_molecule) {
            (true, true) => AtomStyle::Full,
            (true, false) => AtomStyle::Charge,
            (false, true) => AtomStyle::Molecular,
            (false, false) => AtomStyle::Atomic,
        }
    }
}

impl fmt::Display for AtomStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AtomStyle::Atomic => write!(f, "atomic"),
            AtomStyle::Charge => write!(f, "charge"),
            AtomStyle::Molecular => write!(f, "molecular"),
            AtomStyle::Full => write!(f, "full"),
        }
    }
}

impl FromStr for AtomStyle {
    type Err = ParseAtomStyleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "atomic" => Ok(AtomStyle::Atomic),
            "charge" => Ok(AtomStyle::Charge),
            "molecular" => Ok(AtomStyle::Molecular),
            "full" => Ok(AtomStyle::Full),
            _ => Err(ParseAtomStyleError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_parse_agree() {
        for style in [
            AtomStyle::Atomic,
            AtomStyle::Charge,
            AtomStyle::Molecular,
            AtomStyle::Full,
        ] {
            assert_eq!(style.to_string().parse::<AtomStyle>().unwrap(), style);
        }
        assert!("sphere".parse::<AtomStyle>().is_err());
    }

    #[test]
    fn column_orders() {
        use AtomColumn::*;
        assert_eq!(AtomStyle::Charge.columns(), &[Id, Type, Charge, X, Y, Z]);
        assert_eq!(AtomStyle::Full.columns().len(), 7);
        assert_eq!(AtomStyle::Atomic.columns().len() + IMAGE_COLUMNS, 8);
    }

    #[test]
    fn minimal_style_inference() {
        assert_eq!(AtomStyle::minimal(true, true), AtomStyle::Full);
        assert_eq!(AtomStyle::minimal(true, false), AtomStyle::Charge);
        assert_eq!(AtomStyle::minimal(false, true), AtomStyle::Molecular);
        assert_eq!(AtomStyle::minimal(false, false), AtomStyle::Atomic);
    }
}
