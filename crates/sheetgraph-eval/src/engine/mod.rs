//! Sheetgraph dependency engine.
//!
//! Builds the graph on demand from a [`DataSource`], evaluates lazily with
//! memoization, and resets downstream values when an input changes.

mod build;
pub mod cell;
mod error;
mod eval;
pub mod graph;
mod invalidate;
pub mod source;
mod trim;
mod validate;

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use sheetgraph_common::Address;

pub use cell::{CachedValue, Cell, CellRange, Node, NodeId};
pub use error::EngineError;
pub use graph::DependencyGraph;
pub use source::{DataSource, RangeData, SourceError};
pub use trim::TrimReport;
pub use validate::{Failure, Mismatch, ValidationReport};

/// Evaluation limits and defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Deepest chain of unevaluated precedents a single evaluation may walk.
    pub max_eval_depth: usize,
    /// How many reference results (`INDIRECT`, indirection cells) may be
    /// followed in a row, and how deeply dynamic references may nest one
    /// evaluation inside another.
    pub max_reference_hops: usize,
    /// Sheet used for unqualified addresses instead of asking the source.
    pub default_sheet: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_eval_depth: 4096,
            max_reference_hops: 64,
            default_sheet: None,
        }
    }
}

impl EngineConfig {
    pub fn with_max_eval_depth(mut self, depth: usize) -> Self {
        self.max_eval_depth = depth;
        self
    }

    pub fn with_max_reference_hops(mut self, hops: usize) -> Self {
        self.max_reference_hops = hops;
        self
    }

    pub fn with_default_sheet(mut self, sheet: impl Into<String>) -> Self {
        self.default_sheet = Some(sheet.into());
        self
    }
}

/// Counters since construction or the last [`Engine::reset_stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub formulas_evaluated: u64,
    pub ranges_evaluated: u64,
    pub resets: u64,
}

#[derive(Serialize, Deserialize)]
pub struct Engine {
    config: EngineConfig,
    graph: DependencyGraph,
    #[serde(skip)]
    source: Option<Box<dyn DataSource>>,
    /// Newly created nodes whose precedent edges are not wired yet.
    #[serde(skip)]
    pending_edges: Vec<NodeId>,
    /// Range nodes created during the current build pass, in discovery order.
    #[serde(skip)]
    pending_ranges: Vec<NodeId>,
    /// Formula cells currently running, outermost first.
    #[serde(skip)]
    evaluating: Vec<NodeId>,
    #[serde(skip)]
    stats: EngineStats,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("nodes", &self.graph.len())
            .field("edges", &self.graph.edge_count())
            .field("has_source", &self.source.is_some())
            .field("stats", &self.stats)
            .finish()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new(EngineConfig::default())
    }
}

impl Engine {
    /// An engine with no data source; nodes can only come from deserialization
    /// or a source attached later.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            graph: DependencyGraph::new(),
            source: None,
            pending_edges: Vec::new(),
            pending_ranges: Vec::new(),
            evaluating: Vec::new(),
            stats: EngineStats::default(),
        }
    }

    pub fn with_source<S: DataSource + 'static>(source: S, config: EngineConfig) -> Self {
        let mut engine = Self::new(config);
        engine.attach_source(Box::new(source));
        engine
    }

    /// Replace the data source. Returns the previous one.
    pub fn attach_source(&mut self, source: Box<dyn DataSource>) -> Option<Box<dyn DataSource>> {
        self.source.replace(source)
    }

    pub fn detach_source(&mut self) -> Option<Box<dyn DataSource>> {
        self.source.take()
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: EngineConfig) {
        self.config = config;
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = EngineStats::default();
    }

    /// Canonical keys of every node, in no particular order.
    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.graph.keys()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.lookup(address).is_some()
    }

    pub fn node(&self, address: &str) -> Option<&Node> {
        self.lookup(address).and_then(|id| self.graph.node(id))
    }

    /// Sheet used to qualify unqualified addresses.
    pub fn active_sheet(&self) -> Result<String, EngineError> {
        if let Some(sheet) = &self.config.default_sheet {
            return Ok(sheet.clone());
        }
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| EngineError::NoSource("active sheet".into()))?;
        source
            .active_sheet_name()
            .map_err(|source| EngineError::Source {
                address: "active sheet".into(),
                source,
            })
    }

    /// Parse `text`, qualifying it with the active sheet when it has none.
    pub fn qualify(&self, text: &str) -> Result<Address, EngineError> {
        let address = Address::parse(text).map_err(|e| EngineError::invalid_address(text, e))?;
        self.qualify_address(address)
    }

    pub(crate) fn qualify_address(&self, address: Address) -> Result<Address, EngineError> {
        if address.has_sheet() {
            Ok(address)
        } else {
            Ok(address.with_sheet(self.active_sheet()?))
        }
    }

    /// Find an existing node by literal key, then by canonical form. Never
    /// builds.
    pub(crate) fn lookup(&self, text: &str) -> Option<NodeId> {
        if let Some(id) = self.graph.get(text) {
            return Some(id);
        }
        let address = Address::parse(text).ok()?;
        let address = if address.has_sheet() {
            address
        } else {
            address.with_sheet(self.config.default_sheet.clone().or_else(|| {
                self.source
                    .as_ref()
                    .and_then(|s| s.active_sheet_name().ok())
            })?)
        };
        self.graph.get(&address.to_string())
    }

    pub(crate) fn node_key(&self, id: NodeId) -> String {
        self.graph
            .node(id)
            .map(Node::key)
            .unwrap_or_else(|| format!("#{}", id.as_index()))
    }
}
