//! Graph construction: fetch from the source, compile, wire precedents.

use sheetgraph_common::{Address, CellAddress, LiteralValue, RangeAddress};
use sheetgraph_parse::{CompiledExpression, reference_formula};
use tracing::{debug, info, info_span};

use super::cell::{CachedValue, Cell, CellRange, Node, NodeId};
use super::error::EngineError;
use super::source::RangeData;
use super::Engine;

impl Engine {
    /// Ensure `seed` and everything it transitively reads is in the graph.
    pub fn build(&mut self, seed: &str) -> Result<(), EngineError> {
        let address = self.qualify(seed)?;
        self.build_address(&address)
    }

    pub fn build_address(&mut self, seed: &Address) -> Result<(), EngineError> {
        self.build_all(std::slice::from_ref(seed))
    }

    /// Seed several addresses, then drain the queue once.
    pub fn build_many<I, S>(&mut self, seeds: I) -> Result<(), EngineError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let addresses = seeds
            .into_iter()
            .map(|s| self.qualify(s.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        self.build_all(&addresses)
    }

    pub(crate) fn build_all(&mut self, seeds: &[Address]) -> Result<(), EngineError> {
        let _span = info_span!("build_graph", seeds = seeds.len()).entered();
        let checkpoint = self.graph.checkpoint();
        let edges_before = self.graph.edge_count();

        let structural = seeds
            .iter()
            .try_for_each(|seed| self.seed(seed))
            .and_then(|()| self.wire_pending());
        if let Err(e) = structural {
            self.pending_edges.clear();
            self.pending_ranges.clear();
            self.graph.rollback(checkpoint);
            return Err(e);
        }

        let created = self.graph.checkpoint() - checkpoint;
        if created > 0 {
            info!(
                new_nodes = created,
                new_edges = self.graph.edge_count() - edges_before,
                nodes = self.graph.len(),
                edges = self.graph.edge_count(),
                "graph construction done"
            );
        }

        // Ranges discovered late usually contain the ones found first, so
        // evaluating in reverse keeps the walks short.
        let ranges = std::mem::take(&mut self.pending_ranges);
        for id in ranges.into_iter().rev() {
            if self.graph.node(id).is_some() {
                self.compute(id)?;
            }
        }
        Ok(())
    }

    /// Create nodes for `address` if it is not in the map yet. Precedents are
    /// not wired here.
    fn seed(&mut self, address: &Address) -> Result<(), EngineError> {
        let address = self.qualify_address(address.clone())?;
        if self.graph.contains(&address.to_string()) {
            return Ok(());
        }
        self.make_cells(&address)
    }

    fn make_cells(&mut self, address: &Address) -> Result<(), EngineError> {
        let key = address.to_string();
        let source = self
            .source
            .as_mut()
            .ok_or_else(|| EngineError::NoSource(key.clone()))?;
        let data = source
            .get_range(address)
            .map_err(|source| EngineError::Source {
                address: key.clone(),
                source,
            })?;

        let mut created = Vec::new();
        match (address, data) {
            (Address::Cell(_), RangeData::Cell { address: resolved, formula, value }) => {
                created.push(self.add_cell(Address::Cell(resolved), &formula, value)?);
            }
            (Address::Range(_), RangeData::Range { address: resolved, formulas, values }) => {
                let resolved_addr = Address::Range(resolved.clone());
                if resolved_addr != *address {
                    // Requested extent differs from what the source holds: the
                    // requested key becomes a cell pointing at the real range.
                    let formula = reference_formula(&resolved_addr);
                    created.push(self.add_cell(address.clone(), &formula, None)?);
                }
                if !self.graph.contains(&resolved_addr.to_string()) {
                    self.add_range(resolved, formulas, values, &mut created)?;
                }
            }
            (_, data) => {
                return Err(EngineError::Source {
                    address: key,
                    source: format!("shape mismatch: got data for {}", data.address()).into(),
                });
            }
        }

        for id in created {
            if self.graph.node(id).is_some_and(Node::is_derived) {
                self.pending_edges.push(id);
            }
        }
        Ok(())
    }

    fn add_cell(
        &mut self,
        address: Address,
        formula: &str,
        value: Option<LiteralValue>,
    ) -> Result<NodeId, EngineError> {
        let cell = compile_cell(address, formula, value)?;
        self.graph.insert(Node::Cell(cell))
    }

    /// Insert the range node and its non-empty members that are not in the map
    /// yet. Blank members are created later, when the range's edges are wired.
    fn add_range(
        &mut self,
        address: RangeAddress,
        formulas: Vec<Vec<String>>,
        values: Vec<Vec<Option<LiteralValue>>>,
        created: &mut Vec<NodeId>,
    ) -> Result<(), EngineError> {
        let range = CellRange::new(address)?;
        let (rows, cols) = (range.size.0 as usize, range.size.1 as usize);
        let fits = |widths: Vec<usize>| widths.len() == rows && widths.iter().all(|&w| w == cols);
        if !fits(formulas.iter().map(Vec::len).collect())
            || !fits(values.iter().map(Vec::len).collect())
        {
            return Err(EngineError::MalformedRange {
                address: range.address.to_string(),
                reason: format!("source data is not {rows}x{cols}"),
            });
        }

        // Compile everything before touching the graph.
        let mut cells = Vec::new();
        let members = range.addresses.iter().flatten();
        let contents = formulas.into_iter().flatten().zip(values.into_iter().flatten());
        for (member, (formula, value)) in members.zip(contents) {
            if formula.is_empty() && is_blank(&value) {
                continue;
            }
            if self.graph.contains(&member.to_string()) {
                continue;
            }
            cells.push(compile_cell(Address::Cell(member.clone()), &formula, value)?);
        }

        debug!(range = %range.address, members = cells.len(), "adding range");
        let range_id = self.graph.insert(Node::Range(range))?;
        created.push(range_id);
        self.pending_ranges.push(range_id);
        for cell in cells {
            created.push(self.graph.insert(Node::Cell(cell))?);
        }
        Ok(())
    }

    /// Wire precedent edges for queued nodes, building missing precedents as
    /// they are discovered.
    fn wire_pending(&mut self) -> Result<(), EngineError> {
        while let Some(dependent) = self.pending_edges.pop() {
            let Some(node) = self.graph.node(dependent) else {
                continue;
            };
            for precedent in node.needed_addresses() {
                let key = precedent.to_string();
                let id = match self.graph.get(&key) {
                    Some(id) => id,
                    None => {
                        self.seed(&precedent)?;
                        self.graph
                            .get(&key)
                            .ok_or(EngineError::UnknownAddress(key))?
                    }
                };
                self.graph.add_edge(id, dependent);
            }
        }
        Ok(())
    }

    /// Build a blank cell without consulting the source.
    pub(crate) fn ensure_blank(&mut self, address: &CellAddress) -> Result<NodeId, EngineError> {
        let key = address.to_string();
        match self.graph.get(&key) {
            Some(id) => Ok(id),
            None => self.add_cell(Address::Cell(address.clone()), "", None),
        }
    }
}

fn is_blank(value: &Option<LiteralValue>) -> bool {
    matches!(value, None | Some(LiteralValue::Empty))
}

/// A stored value on a formula cell is the last result the workbook computed;
/// on a plain cell it is an input.
fn compile_cell(
    address: Address,
    formula: &str,
    value: Option<LiteralValue>,
) -> Result<Cell, EngineError> {
    let value = value.filter(|v| !v.is_empty());
    let compiled = if formula.trim().is_empty() {
        None
    } else {
        let compiled = CompiledExpression::compile(formula, address.sheet()).map_err(|e| {
            EngineError::UnsupportedFormula {
                address: address.to_string(),
                formula: formula.to_string(),
                message: e.to_string(),
            }
        })?;
        Some(compiled)
    };
    let cached = match (value, compiled.is_some()) {
        (None, _) => CachedValue::Empty,
        (Some(v), true) => CachedValue::Computed(v),
        (Some(v), false) => CachedValue::Literal(v),
    };
    Ok(Cell::new(address, compiled, cached))
}
