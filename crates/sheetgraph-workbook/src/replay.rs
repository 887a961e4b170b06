//! Replaying a saved cell map through the graph builder.

use rustc_hash::FxHashMap;
use sheetgraph_common::{Address, CellAddress, RangeAddress};
use sheetgraph_eval::{DataSource, RangeData, SourceError};
use sheetgraph_parse::CompiledExpression;

use crate::IoError;
use crate::backends::{CellData, CellStore};
use crate::record::CellMap;

/// A [`DataSource`] over a saved cell map.
///
/// Addresses absent from the map read as blank cells. Range-keyed entries are
/// the indirection cells the builder made for unbounded or clipped requests;
/// asking for such a range yields the range its `_REF_` formula points at, so
/// the rebuilt graph matches the one that was saved.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    store: CellStore,
    redirects: FxHashMap<String, RangeAddress>,
    /// Keys in saved order, cells before ranges.
    seeds: Vec<String>,
}

impl ReplaySource {
    pub fn new(cell_map: &CellMap) -> Result<Self, IoError> {
        let mut store = CellStore {
            blank_unknown_sheets: true,
            ..CellStore::default()
        };
        let mut redirects = FxHashMap::default();
        let mut cells = Vec::new();
        let mut ranges = Vec::new();

        for (key, stored) in &cell_map.0 {
            let address = Address::parse(key).map_err(|e| IoError::backend("replay", e))?;
            if !address.has_sheet() {
                return Err(IoError::backend(
                    "replay",
                    format!("address '{key}' has no sheet"),
                ));
            }
            let (formula, value) = stored.contents();
            match address {
                Address::Cell(cell) => {
                    if store.active.is_none() {
                        store.active = Some(cell.sheet.clone());
                    }
                    store.insert(&cell.sheet, cell.row, cell.col, CellData { value, formula });
                    cells.push(key.clone());
                }
                Address::Range(range) => {
                    let target = formula
                        .as_deref()
                        .and_then(|f| redirect_target(f, &range.sheet))
                        .ok_or_else(|| {
                            IoError::backend(
                                "replay",
                                format!("range '{key}' is not stored as a reference"),
                            )
                        })?;
                    redirects.insert(key.clone(), target);
                    ranges.push(key.clone());
                }
            }
        }

        cells.extend(ranges);
        Ok(ReplaySource {
            store,
            redirects,
            seeds: cells,
        })
    }

    /// Addresses to seed the builder with.
    pub fn seeds(&self) -> &[String] {
        &self.seeds
    }
}

fn redirect_target(formula: &str, sheet: &str) -> Option<RangeAddress> {
    let compiled = CompiledExpression::compile(formula, sheet).ok()?;
    match compiled.reference_target()? {
        Address::Range(range) if range.is_bounded() => Some(range.clone()),
        _ => None,
    }
}

impl DataSource for ReplaySource {
    fn get_range(&mut self, address: &Address) -> Result<RangeData, SourceError> {
        if let Address::Range(range) = address {
            if let Some(target) = self.redirects.get(&range.to_string()) {
                return self.store.read_range(target);
            }
        }
        self.store.read(address)
    }

    fn active_sheet_name(&self) -> Result<String, SourceError> {
        self.store.active_sheet()
    }

    fn formula_cells(&self) -> Vec<CellAddress> {
        self.store.formula_cells()
    }
}
