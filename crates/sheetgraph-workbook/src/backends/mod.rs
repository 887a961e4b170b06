//! Workbook readers that feed the engine.

#[cfg(feature = "calamine")]
pub mod calamine;
pub mod json;

#[cfg(feature = "calamine")]
pub use calamine::CalamineAdapter;
pub use json::JsonAdapter;

use std::collections::BTreeMap;

use sheetgraph_common::{Address, CellAddress, LiteralValue, RangeAddress};
use sheetgraph_eval::{RangeData, SourceError};

/// Contents of one stored cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellData {
    pub value: Option<LiteralValue>,
    /// Formula text including the leading `=`.
    pub formula: Option<String>,
}

impl CellData {
    pub fn from_value<V: Into<LiteralValue>>(value: V) -> Self {
        Self {
            value: Some(value.into()),
            formula: None,
        }
    }

    pub fn from_formula<S: Into<String>>(formula: S) -> Self {
        Self {
            value: None,
            formula: Some(formula.into()),
        }
    }

    /// A formula together with the value last computed for it.
    pub fn with_value<V: Into<LiteralValue>>(mut self, value: V) -> Self {
        self.value = Some(value.into());
        self
    }

    fn contents(&self) -> (String, Option<LiteralValue>) {
        (self.formula.clone().unwrap_or_default(), self.value.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct SheetCells {
    pub(crate) cells: BTreeMap<(u32, u32), CellData>,
    /// Declared `(rows, cols)` of the used area, if the file records one.
    pub(crate) dimensions: Option<(u32, u32)>,
}

impl SheetCells {
    fn extent(&self) -> (u32, u32) {
        if let Some(dims) = self.dimensions {
            return dims;
        }
        self.cells
            .keys()
            .fold((1, 1), |(r, c), &(row, col)| (r.max(row), c.max(col)))
    }

    fn contents(&self, row: u32, col: u32) -> (String, Option<LiteralValue>) {
        self.cells
            .get(&(row, col))
            .map(CellData::contents)
            .unwrap_or_default()
    }
}

/// Sheets of cells held in memory, answering [`DataSource`] requests.
///
/// [`DataSource`]: sheetgraph_eval::DataSource
#[derive(Debug, Clone, Default)]
pub(crate) struct CellStore {
    pub(crate) sheets: BTreeMap<String, SheetCells>,
    /// Sheet names in workbook order.
    pub(crate) order: Vec<String>,
    pub(crate) active: Option<String>,
    /// Answer requests on unknown sheets with blank cells instead of an error.
    pub(crate) blank_unknown_sheets: bool,
}

impl CellStore {
    pub(crate) fn sheet_mut(&mut self, name: &str) -> &mut SheetCells {
        if !self.sheets.contains_key(name) {
            self.order.push(name.to_string());
        }
        self.sheets.entry(name.to_string()).or_default()
    }

    pub(crate) fn insert(&mut self, sheet: &str, row: u32, col: u32, data: CellData) {
        self.sheet_mut(sheet).cells.insert((row, col), data);
    }

    pub(crate) fn sheet_names(&self) -> &[String] {
        &self.order
    }

    fn sheet(&self, name: &str) -> Result<Option<&SheetCells>, SourceError> {
        match self.sheets.get(name) {
            Some(sheet) => Ok(Some(sheet)),
            None if self.blank_unknown_sheets => Ok(None),
            None => Err(format!("no sheet named '{name}'").into()),
        }
    }

    pub(crate) fn read(&self, address: &Address) -> Result<RangeData, SourceError> {
        match address {
            Address::Cell(cell) => {
                let (formula, value) = self
                    .sheet(&cell.sheet)?
                    .map(|s| s.contents(cell.row, cell.col))
                    .unwrap_or_default();
                Ok(RangeData::Cell {
                    address: cell.clone(),
                    formula,
                    value,
                })
            }
            Address::Range(range) => self.read_range(range),
        }
    }

    /// Row-major contents of `range`; unbounded sides are clipped to the
    /// sheet's used area.
    pub(crate) fn read_range(&self, range: &RangeAddress) -> Result<RangeData, SourceError> {
        let sheet = self.sheet(&range.sheet)?;
        let resolved = if range.is_bounded() {
            range.clone()
        } else {
            let (rows, cols) = sheet.map_or((1, 1), SheetCells::extent);
            range.bounded_to(rows, cols)
        };
        let members = resolved.resolve_range()?;
        let mut formulas = Vec::with_capacity(members.len());
        let mut values = Vec::with_capacity(members.len());
        for row in &members {
            let (f, v): (Vec<String>, Vec<Option<LiteralValue>>) = row
                .iter()
                .map(|c| sheet.map(|s| s.contents(c.row, c.col)).unwrap_or_default())
                .unzip();
            formulas.push(f);
            values.push(v);
        }
        Ok(RangeData::Range {
            address: resolved,
            formulas,
            values,
        })
    }

    pub(crate) fn active_sheet(&self) -> Result<String, SourceError> {
        self.active
            .clone()
            .or_else(|| self.order.first().cloned())
            .ok_or_else(|| "workbook has no sheets".into())
    }

    pub(crate) fn formula_cells(&self) -> Vec<CellAddress> {
        self.order
            .iter()
            .flat_map(|name| {
                self.sheets[name]
                    .cells
                    .iter()
                    .filter(|(_, c)| c.formula.as_deref().is_some_and(|f| !f.is_empty()))
                    .map(move |(&(row, col), _)| CellAddress::new(name.clone(), row, col))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_dimensions_bound_whole_columns() {
        let mut store = CellStore::default();
        store.insert("S", 2, 1, CellData::from_value(1));
        store.sheet_mut("S").dimensions = Some((5, 2));
        let data = store.read(&Address::parse("S!A:A").unwrap()).unwrap();
        assert_eq!(data.address().to_string(), "S!A1:A5");
    }

    #[test]
    fn unknown_sheets_are_blank_when_lenient() {
        let mut store = CellStore::default();
        assert!(store.read(&Address::parse("X!B2").unwrap()).is_err());
        store.blank_unknown_sheets = true;
        let data = store.read(&Address::parse("X!B2").unwrap()).unwrap();
        assert_eq!(
            data,
            RangeData::empty_cell(CellAddress::new("X", 2, 2))
        );
    }
}
