use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sheetgraph_common::{Address, CellAddress, ExcelError, ExcelErrorKind, LiteralValue};
use sheetgraph_eval::{DataSource, RangeData, SourceError};

use super::{CellData, CellStore};
use crate::IoError;

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
struct JsonWorkbook {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    active_sheet: Option<String>,
    #[serde(default)]
    sheets: BTreeMap<String, JsonSheet>,
}

fn default_version() -> u32 {
    1
}

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
struct JsonSheet {
    #[serde(default)]
    cells: Vec<JsonCell>,
    #[serde(default)]
    dimensions: Option<(u32, u32)>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct JsonCell {
    row: u32,
    col: u32,
    #[serde(default)]
    value: Option<JsonValue>,
    #[serde(default)]
    formula: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", content = "value")]
enum JsonValue {
    Int(i64),
    Number(f64),
    Text(String),
    Boolean(bool),
    Empty,
    Array(Vec<Vec<JsonValue>>),
    Error(String),
}

/// A workbook stored as JSON:
///
/// ```json
/// { "version": 1, "sheets": { "Sheet1": { "cells": [
///     { "row": 1, "col": 1, "value": { "type": "Int", "value": 2 } },
///     { "row": 1, "col": 2, "formula": "=A1*3" } ] } } }
/// ```
///
/// Sheets are kept in name order; the active sheet is `active_sheet` when
/// given, otherwise the first one.
#[derive(Debug, Default, Clone)]
pub struct JsonAdapter {
    data: JsonWorkbook,
    store: CellStore,
    path: Option<PathBuf>,
}

impl JsonAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self, IoError> {
        let file = File::open(path.as_ref())?;
        let data: JsonWorkbook = serde_json::from_reader(BufReader::new(file))?;
        let mut adapter = Self::from_data(data);
        adapter.path = Some(path.as_ref().to_path_buf());
        Ok(adapter)
    }

    pub fn open_reader<R: Read>(reader: R) -> Result<Self, IoError> {
        Ok(Self::from_data(serde_json::from_reader(reader)?))
    }

    pub fn open_bytes(bytes: &[u8]) -> Result<Self, IoError> {
        Ok(Self::from_data(serde_json::from_slice(bytes)?))
    }

    fn from_data(data: JsonWorkbook) -> Self {
        let mut store = CellStore {
            active: data.active_sheet.clone(),
            ..CellStore::default()
        };
        for (name, sheet) in &data.sheets {
            let cells = store.sheet_mut(name);
            cells.dimensions = sheet.dimensions;
            for c in &sheet.cells {
                cells.cells.insert(
                    (c.row, c.col),
                    CellData {
                        value: c.value.as_ref().map(json_to_literal),
                        formula: c.formula.clone(),
                    },
                );
            }
        }
        JsonAdapter {
            data,
            store,
            path: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn sheet_names(&self) -> &[String] {
        self.store.sheet_names()
    }

    pub fn create_sheet(&mut self, name: &str) {
        self.data.sheets.entry(name.to_string()).or_default();
        self.store.sheet_mut(name);
    }

    pub fn set_active_sheet(&mut self, name: &str) {
        self.create_sheet(name);
        self.data.active_sheet = Some(name.to_string());
        self.store.active = Some(name.to_string());
    }

    pub fn set_dimensions(&mut self, sheet: &str, dims: Option<(u32, u32)>) {
        self.data.sheets.entry(sheet.to_string()).or_default().dimensions = dims;
        self.store.sheet_mut(sheet).dimensions = dims;
    }

    /// Write or overwrite one cell.
    pub fn write_cell(&mut self, sheet: &str, row: u32, col: u32, data: CellData) {
        let entry = self.data.sheets.entry(sheet.to_string()).or_default();
        let json = JsonCell {
            row,
            col,
            value: data.value.as_ref().map(literal_to_json),
            formula: data.formula.clone(),
        };
        match entry.cells.iter_mut().find(|c| c.row == row && c.col == col) {
            Some(cell) => *cell = json,
            None => entry.cells.push(json),
        }
        self.store.insert(sheet, row, col, data);
    }

    pub fn to_json_string(&self) -> Result<String, IoError> {
        Ok(serde_json::to_string_pretty(&self.data)?)
    }

    pub fn save_to_path<P: AsRef<Path>>(&mut self, path: P) -> Result<(), IoError> {
        std::fs::write(path.as_ref(), self.to_json_string()?)?;
        self.path = Some(path.as_ref().to_path_buf());
        Ok(())
    }
}

impl DataSource for JsonAdapter {
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

fn literal_to_json(v: &LiteralValue) -> JsonValue {
    match v {
        LiteralValue::Int(i) => JsonValue::Int(*i),
        LiteralValue::Number(n) => JsonValue::Number(*n),
        LiteralValue::Text(s) => JsonValue::Text(s.clone()),
        LiteralValue::Boolean(b) => JsonValue::Boolean(*b),
        LiteralValue::Empty => JsonValue::Empty,
        LiteralValue::Array(arr) => JsonValue::Array(
            arr.iter()
                .map(|row| row.iter().map(literal_to_json).collect())
                .collect(),
        ),
        LiteralValue::Error(e) => JsonValue::Error(e.kind.to_string()),
        LiteralValue::Reference(addr) => JsonValue::Text(addr.to_string()),
    }
}

fn json_to_literal(v: &JsonValue) -> LiteralValue {
    match v {
        JsonValue::Int(i) => LiteralValue::Int(*i),
        JsonValue::Number(n) => LiteralValue::Number(*n),
        JsonValue::Text(s) => LiteralValue::Text(s.clone()),
        JsonValue::Boolean(b) => LiteralValue::Boolean(*b),
        JsonValue::Empty => LiteralValue::Empty,
        JsonValue::Array(arr) => LiteralValue::Array(
            arr.iter()
                .map(|row| row.iter().map(json_to_literal).collect())
                .collect(),
        ),
        JsonValue::Error(code) => LiteralValue::Error(
            ExcelError::from_error_string(code)
                .unwrap_or_else(|| ExcelError::new(ExcelErrorKind::Value).with_message(code.clone())),
        ),
    }
}
