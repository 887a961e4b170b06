//! The pluggable origin of cell contents.
//!
//! A live spreadsheet reader and the replay source used when loading a saved
//! graph both implement [`DataSource`]; the engine never cares which one it is
//! talking to.

use sheetgraph_common::{Address, CellAddress, LiteralValue, RangeAddress};

pub type SourceError = Box<dyn std::error::Error + Send + Sync>;

/// Contents fetched for one address.
///
/// Shapes mirror the request: a cell address yields [`RangeData::Cell`], a range
/// address yields [`RangeData::Range`] with row-major matrices matching the
/// resolved extent. An empty formula string means "no formula"; a `None` value
/// means "no stored value".
#[derive(Debug, Clone, PartialEq)]
pub enum RangeData {
    Cell {
        address: CellAddress,
        formula: String,
        value: Option<LiteralValue>,
    },
    Range {
        /// Resolved extent. Differs from the request when the request was
        /// unbounded or clipped to the used area.
        address: RangeAddress,
        formulas: Vec<Vec<String>>,
        values: Vec<Vec<Option<LiteralValue>>>,
    },
}

impl RangeData {
    pub fn address(&self) -> Address {
        match self {
            RangeData::Cell { address, .. } => Address::Cell(address.clone()),
            RangeData::Range { address, .. } => Address::Range(address.clone()),
        }
    }

    /// A blank cell at `address`.
    pub fn empty_cell(address: CellAddress) -> Self {
        RangeData::Cell {
            address,
            formula: String::new(),
            value: None,
        }
    }
}

pub trait DataSource {
    /// Fetch formulas and stored values for `address`. Unbounded ranges are
    /// resolved to the source's used extent.
    fn get_range(&mut self, address: &Address) -> Result<RangeData, SourceError>;

    /// Sheet used to qualify addresses written without one.
    fn active_sheet_name(&self) -> Result<String, SourceError>;

    /// Every cell carrying a formula, for whole-workbook validation.
    fn formula_cells(&self) -> Vec<CellAddress> {
        Vec::new()
    }
}

impl<T: DataSource + ?Sized> DataSource for Box<T> {
    fn get_range(&mut self, address: &Address) -> Result<RangeData, SourceError> {
        (**self).get_range(address)
    }

    fn active_sheet_name(&self) -> Result<String, SourceError> {
        (**self).active_sheet_name()
    }

    fn formula_cells(&self) -> Vec<CellAddress> {
        (**self).formula_cells()
    }
}
