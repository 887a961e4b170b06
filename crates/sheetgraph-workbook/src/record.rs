//! The text form of a compiled graph.
//!
//! ```yaml
//! author: someone          # auxiliary keys, passed through untouched
//! filename: model.json     # only when known
//! excel_hash: sha256:...
//! cell_map:
//!   Sheet1!A1: 2
//!   Sheet1!B1: =A1*3
//!   Sheet1!C1: =B1+1
//! ```
//!
//! Formula cells store their formula text, everything else its literal value.
//! Error values are written as their `#CODE!` text. Entries are ordered by the
//! address sort key, so saving the same graph always yields the same text.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sheetgraph_common::{Address, ExcelError, LiteralValue};
use sheetgraph_eval::{DependencyGraph, Node};

pub(crate) const FILENAME: &str = "filename";
pub(crate) const EXCEL_HASH: &str = "excel_hash";
pub(crate) const CELL_MAP: &str = "cell_map";

/// What the text form holds for one address.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredCell {
    /// Formula text including the leading `=`.
    Formula(String),
    Value(Option<LiteralValue>),
}

impl StoredCell {
    pub(crate) fn from_node(node: &Node) -> Option<Self> {
        let cell = node.as_cell()?;
        Some(match cell.formula_text() {
            Some(f) => StoredCell::Formula(f.to_string()),
            None => StoredCell::Value(cell.value.get().cloned().filter(|v| !v.is_empty())),
        })
    }

    /// `(formula, value)` as a data source reports them.
    pub(crate) fn contents(&self) -> (Option<String>, Option<LiteralValue>) {
        match self {
            StoredCell::Formula(f) => (Some(f.clone()), None),
            StoredCell::Value(v) => (None, v.clone()),
        }
    }
}

impl Serialize for StoredCell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            StoredCell::Formula(f) => serializer.serialize_str(f),
            StoredCell::Value(None) => serializer.serialize_none(),
            StoredCell::Value(Some(v)) => match v {
                LiteralValue::Int(i) => serializer.serialize_i64(*i),
                LiteralValue::Number(n) => serializer.serialize_f64(*n),
                LiteralValue::Boolean(b) => serializer.serialize_bool(*b),
                LiteralValue::Text(s) => serializer.serialize_str(s),
                LiteralValue::Empty => serializer.serialize_none(),
                LiteralValue::Error(e) => serializer.serialize_str(e.kind.as_code()),
                other => serializer.collect_str(other),
            },
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCell {
    Boolean(bool),
    Int(i64),
    Number(f64),
    Text(String),
}

impl<'de> Deserialize<'de> for StoredCell {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<RawCell>::deserialize(deserializer)?;
        Ok(match raw {
            None => StoredCell::Value(None),
            Some(RawCell::Boolean(b)) => StoredCell::Value(Some(LiteralValue::Boolean(b))),
            Some(RawCell::Int(i)) => StoredCell::Value(Some(LiteralValue::Int(i))),
            Some(RawCell::Number(n)) => StoredCell::Value(Some(LiteralValue::Number(n))),
            Some(RawCell::Text(s)) if s.starts_with('=') => StoredCell::Formula(s),
            Some(RawCell::Text(s)) => match ExcelError::from_error_string(&s) {
                Some(e) => StoredCell::Value(Some(LiteralValue::Error(e))),
                None => StoredCell::Value(Some(LiteralValue::Text(s))),
            },
        })
    }
}

/// Address key → stored cell, in the order it is written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellMap(pub Vec<(String, StoredCell)>);

impl CellMap {
    /// Every cell of `graph`, ordered by address sort key. Ranges are left
    /// out; loading rebuilds them from their members.
    pub(crate) fn from_graph(graph: &DependencyGraph) -> Self {
        let mut entries: Vec<(Address, StoredCell)> = graph
            .iter()
            .filter(|(_, node)| node.is_serializable())
            .filter_map(|(_, node)| Some((node.address(), StoredCell::from_node(node)?)))
            .collect();
        entries.sort_by(|(a, _), (b, _)| a.sort_key().cmp(&b.sort_key()));
        CellMap(
            entries
                .into_iter()
                .map(|(address, cell)| (address.to_string(), cell))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&StoredCell> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, c)| c)
    }
}

impl Serialize for CellMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, cell) in &self.0 {
            map.serialize_entry(key, cell)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for CellMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CellMapVisitor;

        impl<'de> Visitor<'de> for CellMapVisitor {
            type Value = CellMap;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of address to formula or value")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<CellMap, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, cell)) = access.next_entry::<String, StoredCell>()? {
                    entries.push((key, cell));
                }
                Ok(CellMap(entries))
            }

            fn visit_unit<E: de::Error>(self) -> Result<CellMap, E> {
                Ok(CellMap::default())
            }
        }

        deserializer.deserialize_map(CellMapVisitor)
    }
}

/// The whole text document: auxiliary keys, then the source workbook and its
/// fingerprint, then the cell map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextRecord {
    pub extra_data: BTreeMap<String, serde_json::Value>,
    pub filename: Option<String>,
    pub excel_hash: Option<String>,
    pub cell_map: CellMap,
}

impl Serialize for TextRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let extra = self
            .extra_data
            .iter()
            .filter(|(k, _)| ![FILENAME, EXCEL_HASH, CELL_MAP].contains(&k.as_str()));
        let mut map = serializer.serialize_map(None)?;
        for (key, value) in extra {
            map.serialize_entry(key, value)?;
        }
        if let Some(filename) = &self.filename {
            map.serialize_entry(FILENAME, filename)?;
        }
        map.serialize_entry(EXCEL_HASH, &self.excel_hash)?;
        map.serialize_entry(CELL_MAP, &self.cell_map)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for TextRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RecordVisitor;

        impl<'de> Visitor<'de> for RecordVisitor {
            type Value = TextRecord;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a compiled workbook record")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<TextRecord, A::Error> {
                let mut record = TextRecord::default();
                let mut seen_cells = false;
                while let Some(key) = access.next_key::<String>()? {
                    match key.as_str() {
                        FILENAME => record.filename = access.next_value()?,
                        EXCEL_HASH => record.excel_hash = access.next_value()?,
                        CELL_MAP => {
                            record.cell_map = access.next_value()?;
                            seen_cells = true;
                        }
                        _ => {
                            let value = access.next_value()?;
                            record.extra_data.insert(key, value);
                        }
                    }
                }
                if !seen_cells {
                    return Err(de::Error::missing_field(CELL_MAP));
                }
                Ok(record)
            }
        }

        deserializer.deserialize_map(RecordVisitor)
    }
}
