//! Lazy, memoized evaluation over an explicit work stack.

use rustc_hash::FxHashSet;
use sheetgraph_common::{Address, CellAddress, LiteralValue, RangeAddress};
use sheetgraph_parse::EvaluationContext;
use tracing::{debug, info_span};

use super::cell::{CachedValue, Node, NodeId};
use super::error::EngineError;
use super::Engine;

/// Formula-side view of the engine: every read goes back through
/// [`Engine::read_for`], so precedents are built and memoized on demand and
/// the formula being evaluated is linked to whatever it actually read.
struct EngineContext<'e> {
    engine: &'e mut Engine,
    reader: NodeId,
}

impl EvaluationContext for EngineContext<'_> {
    type Error = EngineError;

    fn resolve_cell(&mut self, address: &CellAddress) -> Result<LiteralValue, EngineError> {
        self.engine
            .read_for(self.reader, &Address::Cell(address.clone()))
    }

    fn resolve_range(
        &mut self,
        address: &RangeAddress,
    ) -> Result<Vec<Vec<LiteralValue>>, EngineError> {
        match self
            .engine
            .read_for(self.reader, &Address::Range(address.clone()))?
        {
            LiteralValue::Array(rows) => Ok(rows),
            scalar => Ok(vec![vec![scalar]]),
        }
    }
}

impl Engine {
    /// Value of `address`, building it first if it is not in the graph.
    /// Reference results are followed to the value they point at.
    pub fn evaluate(&mut self, address: &str) -> Result<LiteralValue, EngineError> {
        let id = match self.lookup(address) {
            Some(id) => id,
            None => {
                let qualified = self.qualify(address)?;
                self.ensure_node(&qualified)?
            }
        };
        self.value_of(id)
    }

    pub fn evaluate_address(&mut self, address: &Address) -> Result<LiteralValue, EngineError> {
        let address = self.qualify_address(address.clone())?;
        let id = self.ensure_node(&address)?;
        self.value_of(id)
    }

    /// Evaluate each address in order, collecting into any container.
    pub fn evaluate_each<I, S, C>(&mut self, addresses: I) -> Result<C, EngineError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        C: FromIterator<LiteralValue>,
    {
        addresses
            .into_iter()
            .map(|a| self.evaluate(a.as_ref()))
            .collect()
    }

    /// Row-major matrix of a range. A single cell comes back as `[[v]]`.
    pub fn evaluate_range(&mut self, address: &str) -> Result<Vec<Vec<LiteralValue>>, EngineError> {
        match self.evaluate(address)? {
            LiteralValue::Array(rows) => Ok(rows),
            scalar => Ok(vec![vec![scalar]]),
        }
    }

    /// Discard every computed value and evaluate all nodes again in creation
    /// order. Inputs are untouched.
    pub fn recalculate(&mut self) -> Result<(), EngineError> {
        let _span = info_span!("recalculate", nodes = self.graph.len()).entered();
        let ids = self.graph.ids();
        for &id in &ids {
            if let Some(node) = self.graph.node_mut(id) {
                if node.is_derived() {
                    *node.value_mut() = CachedValue::Empty;
                }
            }
        }
        for id in ids {
            self.compute(id)?;
        }
        Ok(())
    }

    pub(crate) fn ensure_node(&mut self, address: &Address) -> Result<NodeId, EngineError> {
        let key = address.to_string();
        if let Some(id) = self.graph.get(&key) {
            return Ok(id);
        }
        match (address, self.source.is_some()) {
            (Address::Cell(cell), false) => self.ensure_blank(cell),
            _ => {
                self.build_address(address)?;
                self.graph
                    .get(&key)
                    .ok_or(EngineError::UnknownAddress(key))
            }
        }
    }

    /// Read `address` on behalf of the formula in `reader`. Every node on
    /// the way to the value becomes a precedent of `reader`, so reads through
    /// `INDIRECT` or `OFFSET` are reset by later writes like static ones.
    fn read_for(&mut self, reader: NodeId, address: &Address) -> Result<LiteralValue, EngineError> {
        let address = self.qualify_address(address.clone())?;
        let id = self.ensure_node(&address)?;
        self.follow(id, Some(reader))
    }

    /// Compute `id` and follow reference results.
    pub(crate) fn value_of(&mut self, id: NodeId) -> Result<LiteralValue, EngineError> {
        self.follow(id, None)
    }

    /// A chain that comes back to a node it already passed through is a
    /// cycle; one that is merely long stops at `max_reference_hops`.
    fn follow(&mut self, id: NodeId, reader: Option<NodeId>) -> Result<LiteralValue, EngineError> {
        let mut current = id;
        let mut chain: Vec<NodeId> = Vec::new();
        loop {
            if let Some(reader) = reader.filter(|r| *r != current) {
                self.graph.add_edge(current, reader);
            }
            self.compute(current)?;
            let value = self
                .graph
                .node(current)
                .and_then(|n| n.value().get().cloned())
                .unwrap_or(LiteralValue::Empty);
            let LiteralValue::Reference(target) = value else {
                return Ok(value);
            };
            chain.push(current);
            if chain.len() > self.config.max_reference_hops {
                return Err(EngineError::DepthExceeded {
                    address: self.node_key(id),
                    limit: self.config.max_reference_hops,
                });
            }
            current = self.ensure_node(&target)?;
            if let Some(pos) = chain.iter().position(|n| *n == current) {
                let mut path: Vec<String> = chain[pos..].iter().map(|n| self.node_key(*n)).collect();
                path.push(self.node_key(current));
                return Err(EngineError::CircularReference(path));
            }
        }
    }

    fn is_settled(&self, id: NodeId) -> bool {
        match self.graph.node(id) {
            Some(node) => node.value().is_set() || !node.is_derived(),
            None => true,
        }
    }

    /// Evaluate `root` after all of its unevaluated precedents, deepest first.
    ///
    /// Failures in precedents are held back: a precedent that is never read
    /// (an untaken `IF` branch) must not fail its dependent. When the dependent
    /// does read it, the read re-evaluates it and the error surfaces there.
    pub(crate) fn compute(&mut self, root: NodeId) -> Result<(), EngineError> {
        if self.is_settled(root) {
            return Ok(());
        }
        let mut stack: Vec<(NodeId, bool)> = vec![(root, false)];
        let mut on_path: FxHashSet<NodeId> = FxHashSet::default();
        let mut failed: FxHashSet<NodeId> = FxHashSet::default();

        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                on_path.remove(&id);
                if self.is_settled(id) {
                    continue;
                }
                match self.compute_one(id) {
                    Err(e) if id != root && e.is_formula_failure() => {
                        debug!(address = %self.node_key(id), error = %e, "deferring failure");
                        failed.insert(id);
                    }
                    other => other?,
                }
                continue;
            }
            if self.is_settled(id) || failed.contains(&id) {
                continue;
            }
            if on_path.contains(&id) {
                let mut path: Vec<String> = stack
                    .iter()
                    .filter(|(_, expanded)| *expanded)
                    .map(|(n, _)| self.node_key(*n))
                    .skip_while(|k| *k != self.node_key(id))
                    .collect();
                path.push(self.node_key(id));
                return Err(EngineError::CircularReference(path));
            }
            if on_path.len() >= self.config.max_eval_depth {
                return Err(EngineError::DepthExceeded {
                    address: self.node_key(root),
                    limit: self.config.max_eval_depth,
                });
            }

            on_path.insert(id);
            stack.push((id, true));
            let precedents = self.precedents(id)?;
            for p in precedents.into_iter().rev() {
                if !self.is_settled(p) && !failed.contains(&p) {
                    stack.push((p, false));
                }
            }
        }
        Ok(())
    }

    /// Node ids this node reads, creating missing ones.
    fn precedents(&mut self, id: NodeId) -> Result<Vec<NodeId>, EngineError> {
        let needed = match self.graph.node(id) {
            Some(node) => node.needed_addresses(),
            None => return Ok(Vec::new()),
        };
        let mut out = Vec::with_capacity(needed.len());
        for address in &needed {
            let pid = self.ensure_node(address)?;
            self.graph.add_edge(pid, id);
            out.push(pid);
        }
        Ok(out)
    }

    /// Evaluate a single node whose precedents are already settled.
    fn compute_one(&mut self, id: NodeId) -> Result<(), EngineError> {
        let Some(node) = self.graph.node(id) else {
            return Ok(());
        };
        let value = match node {
            Node::Range(range) => {
                let members: Vec<Vec<CellAddress>> = range.addresses.clone();
                let mut rows = Vec::with_capacity(members.len());
                for row in &members {
                    let mut values = Vec::with_capacity(row.len());
                    for member in row {
                        let mid = self.ensure_node(&Address::Cell(member.clone()))?;
                        values.push(self.value_of(mid)?);
                    }
                    rows.push(values);
                }
                self.stats.ranges_evaluated += 1;
                LiteralValue::Array(rows)
            }
            Node::Cell(cell) => {
                let Some(formula) = cell.formula.clone() else {
                    return Ok(());
                };
                let key = cell.address.to_string();
                if let Some(pos) = self.evaluating.iter().position(|n| *n == id) {
                    let mut path: Vec<String> =
                        self.evaluating[pos..].iter().map(|n| self.node_key(*n)).collect();
                    path.push(key);
                    return Err(EngineError::CircularReference(path));
                }
                // Only dynamic references (INDIRECT, OFFSET) nest evaluations.
                if self.evaluating.len() >= self.config.max_reference_hops {
                    return Err(EngineError::DepthExceeded {
                        address: key,
                        limit: self.config.max_reference_hops,
                    });
                }
                self.evaluating.push(id);
                let result = formula.evaluate(&mut EngineContext { engine: self, reader: id });
                self.evaluating.pop();
                let result = result.map_err(|e| e.at(&key, formula.formula()))?;
                self.stats.formulas_evaluated += 1;
                // A multi-cell array where a scalar belongs becomes #VALUE!.
                let value = result.into_scalar();
                debug!(address = %key, formula = formula.formula(), value = %value, "evaluated");
                value
            }
        };
        if let Some(node) = self.graph.node_mut(id) {
            *node.value_mut() = CachedValue::Computed(value);
        }
        Ok(())
    }

    /// Indented dump of `address` and its precedents with their cached
    /// values.
    pub fn value_tree(&self, address: &str) -> Result<String, EngineError> {
        let root = self
            .lookup(address)
            .ok_or_else(|| EngineError::UnknownAddress(address.to_string()))?;
        let mut out = String::new();
        let mut seen: FxHashSet<NodeId> = FxHashSet::default();
        let mut stack = vec![(root, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            let Some(node) = self.graph.node(id) else {
                continue;
            };
            let shown = match node.value().get() {
                Some(v) => v.to_string(),
                None => "<unset>".to_string(),
            };
            out.push_str(&format!("{}{} = {}\n", " ".repeat(depth * 2), node.key(), shown));
            if !seen.insert(id) {
                continue;
            }
            let mut precedents: Vec<NodeId> = self.graph.dependencies(id).to_vec();
            precedents.sort_by_key(|p| self.graph.node(*p).map(Node::address));
            for p in precedents.into_iter().rev() {
                stack.push((p, depth + 1));
            }
        }
        Ok(out)
    }
}
