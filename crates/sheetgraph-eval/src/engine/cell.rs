//! Graph nodes: single cells and rectangular ranges.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sheetgraph_common::{Address, CellAddress, LiteralValue, RangeAddress};
use sheetgraph_parse::CompiledExpression;

use super::error::EngineError;

/// Slot of a node in the graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn new(index: u32) -> Self {
        NodeId(index)
    }

    pub fn as_index(self) -> usize {
        self.0 as usize
    }
}

/// What a node currently holds.
///
/// `Literal` values are inputs and survive recalculation; `Computed` values are
/// memoized formula or range results and are discarded by invalidation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum CachedValue {
    #[default]
    Empty,
    Literal(LiteralValue),
    Computed(LiteralValue),
}

impl CachedValue {
    pub fn is_set(&self) -> bool {
        !matches!(self, CachedValue::Empty)
    }

    pub fn get(&self) -> Option<&LiteralValue> {
        match self {
            CachedValue::Empty => None,
            CachedValue::Literal(v) | CachedValue::Computed(v) => Some(v),
        }
    }

    pub fn into_value(self) -> Option<LiteralValue> {
        match self {
            CachedValue::Empty => None,
            CachedValue::Literal(v) | CachedValue::Computed(v) => Some(v),
        }
    }
}

/// One spreadsheet cell. Indirection cells created for unbounded or clipped
/// range requests carry a range address and an `=_REF_(...)` formula.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    pub address: Address,
    pub id: u64,
    pub value: CachedValue,
    pub formula: Option<Arc<CompiledExpression>>,
}

impl Cell {
    pub fn new(address: Address, formula: Option<CompiledExpression>, value: CachedValue) -> Self {
        Cell {
            address,
            id: 0,
            value,
            formula: formula.map(Arc::new),
        }
    }

    /// Formula text with its leading `=`, if any.
    pub fn formula_text(&self) -> Option<&str> {
        self.formula.as_deref().map(CompiledExpression::formula)
    }
}

/// A bounded rectangle of cells whose value is the matrix of its members.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellRange {
    pub address: RangeAddress,
    /// Row-major member addresses.
    pub addresses: Vec<Vec<CellAddress>>,
    /// `(rows, cols)`
    pub size: (u32, u32),
    pub value: CachedValue,
    pub id: u64,
}

impl CellRange {
    /// A range node must be sheet-qualified and bounded.
    pub fn new(address: RangeAddress) -> Result<Self, EngineError> {
        if !address.has_sheet() {
            return Err(EngineError::MalformedRange {
                address: address.to_string(),
                reason: "missing sheet name".into(),
            });
        }
        let addresses = address
            .resolve_range()
            .map_err(|e| EngineError::MalformedRange {
                address: address.to_string(),
                reason: e.to_string(),
            })?;
        Ok(CellRange {
            size: address.size(),
            address,
            addresses,
            value: CachedValue::Empty,
            id: 0,
        })
    }

    pub fn members(&self) -> impl Iterator<Item = &CellAddress> {
        self.addresses.iter().flatten()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Node {
    Cell(Cell),
    Range(CellRange),
}

impl Node {
    pub fn address(&self) -> Address {
        match self {
            Node::Cell(c) => c.address.clone(),
            Node::Range(r) => Address::Range(r.address.clone()),
        }
    }

    /// Canonical map key.
    pub fn key(&self) -> String {
        match self {
            Node::Cell(c) => c.address.to_string(),
            Node::Range(r) => r.address.to_string(),
        }
    }

    pub fn id(&self) -> u64 {
        match self {
            Node::Cell(c) => c.id,
            Node::Range(r) => r.id,
        }
    }

    pub(crate) fn set_id(&mut self, id: u64) {
        match self {
            Node::Cell(c) => c.id = id,
            Node::Range(r) => r.id = id,
        }
    }

    /// Addresses whose values this node reads: formula precedents for a cell,
    /// member cells for a range.
    pub fn needed_addresses(&self) -> Vec<Address> {
        match self {
            Node::Cell(c) => c
                .formula
                .as_ref()
                .map(|f| f.needed_addresses().to_vec())
                .unwrap_or_default(),
            Node::Range(r) => r.members().cloned().map(Address::Cell).collect(),
        }
    }

    /// Ranges are rebuilt from their members on load, so only cells are saved.
    pub fn is_serializable(&self) -> bool {
        matches!(self, Node::Cell(_))
    }

    pub fn value(&self) -> &CachedValue {
        match self {
            Node::Cell(c) => &c.value,
            Node::Range(r) => &r.value,
        }
    }

    pub(crate) fn value_mut(&mut self) -> &mut CachedValue {
        match self {
            Node::Cell(c) => &mut c.value,
            Node::Range(r) => &mut r.value,
        }
    }

    pub fn formula(&self) -> Option<&Arc<CompiledExpression>> {
        match self {
            Node::Cell(c) => c.formula.as_ref(),
            Node::Range(_) => None,
        }
    }

    /// Nodes whose value is derived from other nodes.
    pub fn is_derived(&self) -> bool {
        match self {
            Node::Cell(c) => c.formula.is_some(),
            Node::Range(_) => true,
        }
    }

    pub fn as_cell(&self) -> Option<&Cell> {
        match self {
            Node::Cell(c) => Some(c),
            Node::Range(_) => None,
        }
    }

    pub fn as_range(&self) -> Option<&CellRange> {
        match self {
            Node::Range(r) => Some(r),
            Node::Cell(_) => None,
        }
    }
}
