//! crates/sheetgraph-eval/src/test_workbook.rs
//! -------------------------------------------
//! Lightweight in-memory workbook for unit/prop tests.
use std::collections::BTreeMap;

use sheetgraph_common::{Address, CellAddress, LiteralValue, RangeAddress};

use crate::engine::{DataSource, RangeData, SourceError};

type V = LiteralValue;
type CellKey = (u32, u32); // 1-based (row, col)

#[derive(Debug, Default, Clone)]
struct Entry {
    formula: String,
    value: Option<V>,
}

#[derive(Debug, Default, Clone)]
struct Sheet {
    cells: BTreeMap<CellKey, Entry>,
}

impl Sheet {
    /// Bottom-right corner of the used area.
    fn extent(&self) -> (u32, u32) {
        self.cells
            .keys()
            .fold((1, 1), |(r, c), &(row, col)| (r.max(row), c.max(col)))
    }

    fn entry(&self, row: u32, col: u32) -> (String, Option<V>) {
        match self.cells.get(&(row, col)) {
            Some(e) => (e.formula.clone(), e.value.clone()),
            None => (String::new(), None),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct TestWorkbook {
    sheets: BTreeMap<String, Sheet>,
    order: Vec<String>,
    active: Option<String>,
}

impl TestWorkbook {
    /* ─────────────── constructors ─────────────── */
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an empty sheet. The first sheet added is active unless
    /// [`TestWorkbook::with_active_sheet`] says otherwise.
    pub fn with_sheet<S: Into<String>>(mut self, name: S) -> Self {
        self.sheet_mut(name.into());
        self
    }

    pub fn with_active_sheet<S: Into<String>>(mut self, name: S) -> Self {
        let name = name.into();
        self.sheet_mut(name.clone());
        self.active = Some(name);
        self
    }

    /* ─────────────── cell helpers ─────────────── */
    pub fn with_cell<S: Into<String>>(
        mut self,
        sheet: S,
        row: u32,
        col: u32,
        v: impl Into<V>,
    ) -> Self {
        let entry = self.sheet_mut(sheet.into()).cells.entry((row, col)).or_default();
        entry.value = Some(v.into());
        self
    }

    pub fn with_cell_a1<S: Into<String>, A: AsRef<str>>(self, sheet: S, a1: A, v: impl Into<V>) -> Self {
        let (row, col) = parse_a1(a1.as_ref()).expect("bad A1 ref in with_cell_a1");
        self.with_cell(sheet, row, col, v)
    }

    pub fn with_formula<S: Into<String>, F: Into<String>>(
        mut self,
        sheet: S,
        row: u32,
        col: u32,
        formula: F,
    ) -> Self {
        let entry = self.sheet_mut(sheet.into()).cells.entry((row, col)).or_default();
        entry.formula = formula.into();
        self
    }

    pub fn with_formula_a1<S: Into<String>, A: AsRef<str>, F: Into<String>>(
        self,
        sheet: S,
        a1: A,
        formula: F,
    ) -> Self {
        let (row, col) = parse_a1(a1.as_ref()).expect("bad A1 ref in with_formula_a1");
        self.with_formula(sheet, row, col, formula)
    }

    /// A formula together with the value a spreadsheet application last
    /// computed for it.
    pub fn with_computed_a1<S: Into<String>, A: AsRef<str>, F: Into<String>>(
        self,
        sheet: S,
        a1: A,
        formula: F,
        v: impl Into<V>,
    ) -> Self {
        let sheet = sheet.into();
        let (row, col) = parse_a1(a1.as_ref()).expect("bad A1 ref in with_computed_a1");
        self.with_formula(sheet.clone(), row, col, formula)
            .with_cell(sheet, row, col, v)
    }

    pub fn with_range<S: Into<String>>(
        mut self,
        sheet: S,
        row: u32,
        col: u32,
        data: Vec<Vec<V>>,
    ) -> Self {
        let sh = self.sheet_mut(sheet.into());
        for (r_off, r) in data.into_iter().enumerate() {
            for (c_off, v) in r.into_iter().enumerate() {
                let entry = sh
                    .cells
                    .entry((row + r_off as u32, col + c_off as u32))
                    .or_default();
                entry.value = Some(v);
            }
        }
        self
    }

    fn sheet_mut(&mut self, name: String) -> &mut Sheet {
        if !self.sheets.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.sheets.entry(name).or_default()
    }

    fn sheet(&self, name: &str) -> Result<&Sheet, SourceError> {
        self.sheets
            .get(name)
            .ok_or_else(|| format!("no sheet named '{name}'").into())
    }

    fn read_range(&self, range: &RangeAddress) -> Result<RangeData, SourceError> {
        let sheet = self.sheet(&range.sheet)?;
        let (max_row, max_col) = sheet.extent();
        let resolved = range.bounded_to(max_row, max_col);
        let cells = resolved.resolve_range()?;
        let mut formulas = Vec::with_capacity(cells.len());
        let mut values = Vec::with_capacity(cells.len());
        for row in &cells {
            let (f, v): (Vec<String>, Vec<Option<V>>) =
                row.iter().map(|c| sheet.entry(c.row, c.col)).unzip();
            formulas.push(f);
            values.push(v);
        }
        Ok(RangeData::Range {
            address: resolved,
            formulas,
            values,
        })
    }
}

impl DataSource for TestWorkbook {
    fn get_range(&mut self, address: &Address) -> Result<RangeData, SourceError> {
        match address {
            Address::Cell(cell) => {
                let (formula, value) = self.sheet(&cell.sheet)?.entry(cell.row, cell.col);
                Ok(RangeData::Cell {
                    address: cell.clone(),
                    formula,
                    value,
                })
            }
            Address::Range(range) => self.read_range(range),
        }
    }

    fn active_sheet_name(&self) -> Result<String, SourceError> {
        self.active
            .clone()
            .or_else(|| self.order.first().cloned())
            .ok_or_else(|| "workbook has no sheets".into())
    }

    fn formula_cells(&self) -> Vec<CellAddress> {
        self.order
            .iter()
            .flat_map(|name| {
                self.sheets[name]
                    .cells
                    .iter()
                    .filter(|(_, e)| !e.formula.is_empty())
                    .map(move |(&(row, col), _)| CellAddress::new(name.clone(), row, col))
            })
            .collect()
    }
}

/// `"B3"` → `(3, 2)`
fn parse_a1(a1: &str) -> Option<(u32, u32)> {
    match Address::parse(a1).ok()? {
        Address::Cell(c) => Some((c.row, c.col)),
        Address::Range(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_columns_resolve_to_used_extent() {
        let mut wb = TestWorkbook::new()
            .with_cell_a1("Sheet1", "A1", 1)
            .with_cell_a1("Sheet1", "C4", 2);
        let data = wb.get_range(&Address::parse("Sheet1!A:B").unwrap()).unwrap();
        let RangeData::Range {
            address, values, ..
        } = data
        else {
            panic!("expected a range");
        };
        assert_eq!(address.to_string(), "Sheet1!A1:B4");
        assert_eq!(values.len(), 4);
        assert_eq!(values[0][0], Some(LiteralValue::Int(1)));
        assert_eq!(values[3][1], None);
    }

    #[test]
    fn first_sheet_is_active_by_default() {
        let wb = TestWorkbook::new().with_sheet("Data").with_sheet("Calc");
        assert_eq!(wb.active_sheet_name().unwrap(), "Data");
        let wb = wb.with_active_sheet("Calc");
        assert_eq!(wb.active_sheet_name().unwrap(), "Calc");
    }

    #[test]
    fn unknown_sheet_is_an_error() {
        let mut wb = TestWorkbook::new().with_sheet("Sheet1");
        assert!(wb.get_range(&Address::parse("Nope!A1").unwrap()).is_err());
    }
}
