//! `.xlsx` workbooks read through calamine.
//!
//! The whole workbook is read up front; calamine hands out full sheets, so
//! there is nothing to gain from fetching lazily.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use calamine::{open_workbook, CellErrorType, Data, Range, Reader, Xlsx};
use sheetgraph_common::{Address, CellAddress, ExcelError, ExcelErrorKind, LiteralValue};
use sheetgraph_eval::{DataSource, RangeData, SourceError};
use tracing::debug;

use super::{CellData, CellStore};
use crate::IoError;

#[derive(Debug, Clone)]
pub struct CalamineAdapter {
    store: CellStore,
    path: PathBuf,
}

impl CalamineAdapter {
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self, IoError> {
        let path = path.as_ref();
        let mut workbook: Xlsx<BufReader<File>> =
            open_workbook(path).map_err(|e| IoError::backend("calamine", e))?;
        let mut store = CellStore::default();
        let names = workbook.sheet_names().to_vec();
        for name in &names {
            let values = workbook
                .worksheet_range(name)
                .map_err(|e| IoError::backend("calamine", e))?;
            let formulas = workbook
                .worksheet_formula(name)
                .map_err(|e| IoError::backend("calamine", e))?;
            let sheet = store.sheet_mut(name);
            read_values(&values, |row, col, value| {
                sheet.cells.entry((row, col)).or_default().value = Some(value);
            });
            read_formulas(&formulas, |row, col, formula| {
                sheet.cells.entry((row, col)).or_default().formula = Some(formula);
            });
            debug!(sheet = %name, cells = sheet.cells.len(), "sheet loaded");
        }
        Ok(CalamineAdapter {
            store,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sheet_names(&self) -> &[String] {
        self.store.sheet_names()
    }

    pub fn cell(&self, sheet: &str, row: u32, col: u32) -> Option<CellData> {
        match self.store.read(&Address::Cell(CellAddress::new(sheet, row, col))) {
            Ok(RangeData::Cell { formula, value, .. }) => Some(CellData {
                value,
                formula: (!formula.is_empty()).then_some(formula),
            }),
            _ => None,
        }
    }
}

impl DataSource for CalamineAdapter {
    fn get_range(&mut self, address: &Address) -> Result<RangeData, SourceError> {
        self.store.read(address)
    }

    fn active_sheet_name(&self) -> Result<String, SourceError> {
        self.store.active_sheet()
    }

    fn formula_cells(&self) -> Vec<CellAddress> {
        self.store.formula_cells()
    }
}

/// Visit non-empty values with 1-based coordinates.
fn read_values(range: &Range<Data>, mut f: impl FnMut(u32, u32, LiteralValue)) {
    let (start_row, start_col) = range.start().unwrap_or_default();
    for (row, col, data) in range.used_cells() {
        let value = match data {
            Data::Empty => continue,
            Data::String(s) if s.is_empty() => continue,
            other => convert_value(other),
        };
        f(start_row + row as u32 + 1, start_col + col as u32 + 1, value);
    }
}

/// Visit formulas with 1-based coordinates, adding the leading `=`.
fn read_formulas(range: &Range<String>, mut f: impl FnMut(u32, u32, String)) {
    let (start_row, start_col) = range.start().unwrap_or_default();
    for (row, col, formula) in range.used_cells() {
        if formula.is_empty() {
            continue;
        }
        let formula = if formula.starts_with('=') {
            formula.clone()
        } else {
            format!("={formula}")
        };
        f(start_row + row as u32 + 1, start_col + col as u32 + 1, formula);
    }
}

fn convert_value(data: &Data) -> LiteralValue {
    match data {
        Data::Empty => LiteralValue::Empty,
        Data::String(s) => LiteralValue::Text(s.clone()),
        Data::Float(f) => LiteralValue::Number(*f),
        Data::Int(i) => LiteralValue::Int(*i),
        Data::Bool(b) => LiteralValue::Boolean(*b),
        Data::Error(e) => {
            let kind = match e {
                CellErrorType::Div0 => ExcelErrorKind::Div,
                CellErrorType::NA => ExcelErrorKind::Na,
                CellErrorType::Name => ExcelErrorKind::Name,
                CellErrorType::Null => ExcelErrorKind::Null,
                CellErrorType::Num => ExcelErrorKind::Num,
                CellErrorType::Ref => ExcelErrorKind::Ref,
                CellErrorType::Value => ExcelErrorKind::Value,
                _ => ExcelErrorKind::Value,
            };
            LiteralValue::Error(ExcelError::new(kind))
        }
        // Serial number; date formatting is not modelled.
        Data::DateTime(dt) => LiteralValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => LiteralValue::Text(s.clone()),
    }
}
