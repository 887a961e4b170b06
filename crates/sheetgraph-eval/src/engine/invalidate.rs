//! Writing inputs and resetting everything downstream of them.

use sheetgraph_common::{Address, LiteralValue};
use tracing::{debug, info};

use super::cell::{CachedValue, Node, NodeId};
use super::error::EngineError;
use super::Engine;

impl Engine {
    /// Write `value` to `address`.
    ///
    /// A matrix value written to a range address is distributed over the
    /// range's cells row by row. Writing a value equal to the current one is a
    /// no-op; otherwise every transitive dependent with a cached value is reset.
    pub fn set_value(
        &mut self,
        address: &str,
        value: impl Into<LiteralValue>,
    ) -> Result<(), EngineError> {
        let value = value.into();
        let is_range = self
            .lookup(address)
            .and_then(|id| self.graph.node(id))
            .map(|n| matches!(n, Node::Range(_)))
            .unwrap_or_else(|| Address::parse(address).is_ok_and(|a| a.is_range()));

        match value {
            LiteralValue::Array(rows) if is_range => {
                let targets = self.range_cells(address)?;
                let values: Vec<LiteralValue> = rows.into_iter().flatten().collect();
                self.write_all(&targets, values)
            }
            LiteralValue::Array(rows) => {
                let (r, c) = (rows.len(), rows.first().map_or(0, Vec::len));
                if r == 1 && c == 1 {
                    self.set_one(address, LiteralValue::Array(rows).into_scalar())
                } else {
                    Err(EngineError::ArrayOverflow {
                        address: address.to_string(),
                        rows: r,
                        cols: c,
                    })
                }
            }
            scalar => self.set_one(address, scalar),
        }
    }

    /// Write one value per address, pairwise.
    pub fn set_values<S: AsRef<str>>(
        &mut self,
        addresses: &[S],
        values: Vec<LiteralValue>,
    ) -> Result<(), EngineError> {
        let targets: Vec<String> = addresses.iter().map(|a| a.as_ref().to_string()).collect();
        self.write_all(&targets, values)
    }

    fn write_all(&mut self, targets: &[String], values: Vec<LiteralValue>) -> Result<(), EngineError> {
        if targets.len() != values.len() {
            return Err(EngineError::ShapeMismatch {
                addresses: targets.len(),
                values: values.len(),
            });
        }
        for (target, value) in targets.iter().zip(values) {
            self.set_one(target, value)?;
        }
        Ok(())
    }

    /// Member cell keys of the range at `address`, row-major.
    fn range_cells(&self, address: &str) -> Result<Vec<String>, EngineError> {
        let parsed = match self.lookup(address).and_then(|id| self.graph.node(id)) {
            Some(node) => node.address(),
            None => self.qualify(address)?,
        };
        let Address::Range(range) = parsed else {
            return Ok(vec![parsed.to_string()]);
        };
        let rows = range
            .resolve_range()
            .map_err(|e| EngineError::invalid_address(address, e))?;
        Ok(rows.into_iter().flatten().map(|c| c.to_string()).collect())
    }

    fn set_one(&mut self, address: &str, value: LiteralValue) -> Result<(), EngineError> {
        let id = self
            .lookup(address)
            .ok_or_else(|| EngineError::UnknownAddress(address.to_string()))?;
        let Some(node) = self.graph.node(id) else {
            return Err(EngineError::UnknownAddress(address.to_string()));
        };
        if let Node::Range(range) = node {
            let (rows, cols) = range.size;
            return Err(EngineError::ShapeMismatch {
                addresses: (rows * cols) as usize,
                values: 1,
            });
        }
        if node.value().get() == Some(&value) {
            return Ok(());
        }
        self.reset(id);
        if let Some(node) = self.graph.node_mut(id) {
            *node.value_mut() = CachedValue::Literal(value);
        }
        Ok(())
    }

    /// Clear `root` and every transitive dependent that holds a value.
    /// Dependents that are already unset are not walked through: nothing
    /// below them can have been computed from the old value.
    fn reset(&mut self, root: NodeId) {
        info!(address = %self.node_key(root), "resetting");
        if let Some(node) = self.graph.node_mut(root) {
            *node.value_mut() = CachedValue::Empty;
        }
        let mut stack: Vec<NodeId> = self.graph.dependents(root).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let Some(node) = self.graph.node_mut(id) else {
                continue;
            };
            if !node.value().is_set() {
                continue;
            }
            *node.value_mut() = CachedValue::Empty;
            self.stats.resets += 1;
            debug!(address = %self.node_key(id), "reset");
            stack.extend(self.graph.dependents(id).iter().rev().copied());
        }
    }
}
