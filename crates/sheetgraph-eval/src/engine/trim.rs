//! Reduce the graph to what connects a set of inputs to a set of outputs.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use sheetgraph_common::{Address, LiteralValue};
use tracing::{debug, info, info_span, warn};

use super::cell::{CachedValue, Node, NodeId};
use super::error::EngineError;
use super::Engine;

/// What a trim pass did. All entries are canonical address keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrimReport {
    /// Nodes deleted from the graph.
    pub removed: Vec<String>,
    /// Formula cells turned into constants holding their last value.
    pub frozen: Vec<String>,
    /// Inputs that carry a formula and so are not leaves.
    pub non_leaf_inputs: Vec<String>,
    /// Inputs that were not in the graph.
    pub missing_inputs: Vec<String>,
}

impl Engine {
    /// Keep only the outputs, the inputs' dependents they need, and the
    /// precedents along the way. Precedents that do not depend on any input
    /// are frozen at their current value.
    pub fn trim<I, O>(&mut self, inputs: &[I], outputs: &[O]) -> Result<TrimReport, EngineError>
    where
        I: AsRef<str>,
        O: AsRef<str>,
    {
        let _span = info_span!("trim", inputs = inputs.len(), outputs = outputs.len()).entered();
        let outputs = outputs
            .iter()
            .map(|o| self.qualify(o.as_ref()))
            .collect::<Result<Vec<Address>, _>>()?;
        let output_keys: FxHashSet<String> = outputs.iter().map(ToString::to_string).collect();
        let input_keys = inputs
            .iter()
            .map(|i| self.qualify(i.as_ref()).map(|a| a.to_string()))
            .collect::<Result<Vec<String>, _>>()?;

        self.build_all(&outputs)?;

        let mut report = TrimReport::default();
        let mut needed: FxHashSet<NodeId> = FxHashSet::default();

        // Everything reachable downstream of an input.
        for key in &input_keys {
            let Some(id) = self.graph.get(key) else {
                if output_keys.contains(key) {
                    return Err(EngineError::MissingInput(key.clone()));
                }
                warn!(address = %key, "trim input is not in the graph");
                report.missing_inputs.push(key.clone());
                continue;
            };
            let mut stack = vec![id];
            while let Some(n) = stack.pop() {
                if needed.insert(n) {
                    stack.extend_from_slice(self.graph.dependents(n));
                }
            }
        }

        let mut walk: Vec<NodeId> = Vec::new();
        for key in &output_keys {
            let id = self
                .graph
                .get(key)
                .ok_or_else(|| EngineError::UnknownAddress(key.clone()))?;
            needed.insert(id);
            walk.push(id);
        }

        // Walk back from the outputs. Needed nodes and ranges are walked
        // through; anything else is a leaf of the trimmed graph.
        let mut processed: FxHashSet<NodeId> = FxHashSet::default();
        let mut to_freeze: Vec<NodeId> = Vec::new();
        while let Some(id) = walk.pop() {
            let Some(node) = self.graph.node(id) else {
                continue;
            };
            for address in node.needed_addresses() {
                let key = address.to_string();
                let child = self
                    .graph
                    .get(&key)
                    .ok_or_else(|| EngineError::UnknownAddress(key.clone()))?;
                if !processed.insert(child) {
                    continue;
                }
                let is_range = address.is_range();
                if needed.contains(&child) || is_range {
                    needed.insert(child);
                    walk.push(child);
                } else {
                    needed.insert(child);
                    to_freeze.push(child);
                }
            }
        }

        // Values first, then edits: nothing is mutated until every frozen
        // value is known.
        let mut frozen: Vec<(NodeId, LiteralValue)> = Vec::new();
        for id in to_freeze {
            if self.graph.node(id).is_some_and(|n| n.formula().is_some()) {
                frozen.push((id, self.settle(id)));
            }
        }
        for (id, value) in frozen {
            let key = self.node_key(id);
            debug!(address = %key, value = %value, "frozen");
            self.freeze(id, value);
            report.frozen.push(key);
        }

        for key in &input_keys {
            if let Some(node) = self.graph.node_by_key(key) {
                if node.formula().is_some() {
                    info!(address = %key, "input is not a leaf");
                    report.non_leaf_inputs.push(key.clone());
                }
            }
        }

        for id in self.graph.ids() {
            if !needed.contains(&id) {
                if let Some(node) = self.graph.remove(id) {
                    report.removed.push(node.key());
                }
            }
        }
        report.removed.sort();
        report.frozen.sort();
        info!(
            removed = report.removed.len(),
            frozen = report.frozen.len(),
            nodes = self.graph.len(),
            "trim done"
        );
        Ok(report)
    }

    /// Current value of a formula cell that is about to lose its formula.
    /// A failure keeps the cached value, or becomes the cell's error value.
    fn settle(&mut self, id: NodeId) -> LiteralValue {
        match self.value_of(id) {
            Ok(value) => value,
            Err(e) => {
                let cached = self.graph.node(id).and_then(|n| n.value().get().cloned());
                warn!(address = %self.node_key(id), error = %e, "freezing a cell that failed");
                cached.unwrap_or_else(|| LiteralValue::Error(e.to_excel_error()))
            }
        }
    }

    /// Replace a formula cell's formula with `value`.
    fn freeze(&mut self, id: NodeId, value: LiteralValue) {
        self.graph.clear_dependencies(id);
        if let Some(Node::Cell(cell)) = self.graph.node_mut(id) {
            cell.formula = None;
            cell.value = CachedValue::Literal(value);
        }
    }
}
