//! 24-well plate layout
//!
//! Wells are numbered column-major: index 0..3 is column 1 (rows A..D),
//! index 4..7 is column 2, and so on. Hardware module ids run row-major
//! from 1.

use crate::error::{MyoError, MyoResult};
use core::fmt;
use serde::{Deserialize, Serialize};

pub const PLATE_ROWS: usize = 4;
pub const PLATE_COLUMNS: usize = 6;
pub const WELL_COUNT: usize = PLATE_ROWS * PLATE_COLUMNS;

const ROW_LETTERS: [char; PLATE_ROWS] = ['A', 'B', 'C', 'D'];

/// Zero-based well index on a 24-well plate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct WellIndex(usize);

impl WellIndex {
    pub fn new(index: usize) -> MyoResult<Self> {
        if index >= WELL_COUNT {
            return Err(MyoError::InvalidConfiguration {
                message: format!("well index {} out of range 0..{}", index, WELL_COUNT),
            });
        }
        Ok(WellIndex(index))
    }

    /// All wells in index order
    pub fn all() -> impl Iterator<Item = WellIndex> {
        (0..WELL_COUNT).map(WellIndex)
    }

    pub fn from_row_col(row: usize, col: usize) -> MyoResult<Self> {
        if row >= PLATE_ROWS || col >= PLATE_COLUMNS {
            return Err(MyoError::InvalidConfiguration {
                message: format!("row {} / column {} outside the plate", row, col),
            });
        }
        Ok(WellIndex(col * PLATE_ROWS + row))
    }

    pub fn index(self) -> usize {
        self.0
    }

    pub fn row(self) -> usize {
        self.0 % PLATE_ROWS
    }

    pub fn col(self) -> usize {
        self.0 / PLATE_ROWS
    }

    /// Plate name such as `A1` or `D6`
    pub fn name(self) -> String {
        format!("{}{}", ROW_LETTERS[self.row()], self.col() + 1)
    }

    pub fn from_name(name: &str) -> MyoResult<Self> {
        let mut chars = name.trim().chars();
        let letter = chars.next().map(|c| c.to_ascii_uppercase());
        let row = letter
            .and_then(|c| ROW_LETTERS.iter().position(|&r| r == c))
            .ok_or_else(|| MyoError::InvalidConfiguration {
                message: format!("invalid well name '{}'", name),
            })?;
        let col: usize = chars
            .as_str()
            .parse()
            .map_err(|_| MyoError::InvalidConfiguration {
                message: format!("invalid well name '{}'", name),
            })?;
        if col == 0 {
            return Err(MyoError::InvalidConfiguration {
                message: format!("invalid well name '{}'", name),
            });
        }
        Self::from_row_col(row, col - 1)
    }

    /// Hardware module id (1-based, row-major)
    pub fn module_id(self) -> usize {
        self.row() * PLATE_COLUMNS + self.col() + 1
    }

    pub fn from_module_id(module_id: usize) -> MyoResult<Self> {
        if module_id == 0 || module_id > WELL_COUNT {
            return Err(MyoError::InvalidConfiguration {
                message: format!("module id {} out of range 1..={}", module_id, WELL_COUNT),
            });
        }
        let zero_based = module_id - 1;
        Self::from_row_col(zero_based / PLATE_COLUMNS, zero_based % PLATE_COLUMNS)
    }
}

impl TryFrom<usize> for WellIndex {
    type Error = MyoError;

    fn try_from(index: usize) -> MyoResult<Self> {
        WellIndex::new(index)
    }
}

impl From<WellIndex> for usize {
    fn from(well: WellIndex) -> usize {
        well.0
    }
}

impl fmt::Display for WellIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_names() {
        assert_eq!(WellIndex::new(0).unwrap().name(), "A1");
        assert_eq!(WellIndex::new(3).unwrap().name(), "D1");
        assert_eq!(WellIndex::new(4).unwrap().name(), "A2");
        assert_eq!(WellIndex::new(23).unwrap().name(), "D6");
        assert!(WellIndex::new(24).is_err());
    }

    #[test]
    fn test_name_round_trip() {
        for well in WellIndex::all() {
            assert_eq!(WellIndex::from_name(&well.name()).unwrap(), well);
        }
        assert!(WellIndex::from_name("E1").is_err());
        assert!(WellIndex::from_name("A0").is_err());
        assert!(WellIndex::from_name("A7").is_err());
    }

    #[test]
    fn test_module_id_mapping() {
        assert_eq!(WellIndex::new(0).unwrap().module_id(), 1);
        assert_eq!(WellIndex::new(4).unwrap().module_id(), 2);
        assert_eq!(WellIndex::new(1).unwrap().module_id(), 7);
        assert_eq!(WellIndex::new(23).unwrap().module_id(), 24);
        for well in WellIndex::all() {
            assert_eq!(WellIndex::from_module_id(well.module_id()).unwrap(), well);
        }
    }
}
