//! Recompute formula cells and compare against the values the source stored.

use std::collections::BTreeMap;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use sheetgraph_common::{Address, LiteralValue};
use tracing::{debug, info_span, warn};

use super::cell::CachedValue;
use super::error::EngineError;
use super::Engine;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mismatch {
    pub original: LiteralValue,
    pub calced: LiteralValue,
    pub formula: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub address: String,
    pub formula: Option<String>,
    pub message: String,
}

/// Outcome of [`Engine::validate`], grouped by kind of problem.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Keyed by cell address.
    pub mismatch: BTreeMap<String, Mismatch>,
    /// Keyed by function name.
    pub not_implemented: BTreeMap<String, Vec<Failure>>,
    /// Keyed by cause.
    pub exceptions: BTreeMap<String, Vec<Failure>>,
    /// Number of formula cells recomputed and compared.
    pub verified: usize,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.mismatch.is_empty() && self.not_implemented.is_empty() && self.exceptions.is_empty()
    }
}

impl Engine {
    /// Recompute `outputs` (every formula cell the source knows of when
    /// `None`) and all of their precedents, comparing each result with the
    /// value stored alongside the formula. Cells without a stored value are
    /// skipped. Failures are collected, never returned.
    pub fn validate<S: AsRef<str>>(&mut self, outputs: Option<&[S]>) -> ValidationReport {
        let _span = info_span!("validate").entered();
        let mut report = ValidationReport::default();

        let mut to_verify: Vec<Address> = Vec::new();
        match outputs {
            Some(list) => {
                for text in list {
                    match self.qualify(text.as_ref()) {
                        Ok(a) => to_verify.push(a),
                        Err(e) => record(&mut report, text.as_ref(), None, &e),
                    }
                }
            }
            None => {
                if let Some(source) = &self.source {
                    to_verify.extend(source.formula_cells().into_iter().map(Address::Cell));
                }
            }
        }
        // Verify in the given order.
        to_verify.reverse();

        let mut verified: FxHashSet<String> = FxHashSet::default();
        while let Some(address) = to_verify.pop() {
            let key = address.to_string();
            if verified.contains(&key) {
                continue;
            }
            match self.verify_one(&address, &mut report) {
                Ok(Some(needed)) => {
                    verified.insert(key);
                    for n in needed.into_iter().rev() {
                        if !verified.contains(&n.to_string()) {
                            to_verify.push(n);
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    let formula = self
                        .node(&key)
                        .and_then(|n| n.formula())
                        .map(|f| f.formula().to_string());
                    record(&mut report, &key, formula, &e);
                }
            }
        }
        report
    }

    /// Returns the node's precedents, or `None` when it had no stored value
    /// to compare against.
    fn verify_one(
        &mut self,
        address: &Address,
        report: &mut ValidationReport,
    ) -> Result<Option<Vec<Address>>, EngineError> {
        let key = address.to_string();
        let id = self.ensure_node(address)?;
        let Some(node) = self.graph.node(id) else {
            return Err(EngineError::UnknownAddress(key));
        };
        let needed = node.needed_addresses();
        let Some(formula) = node.formula().map(|f| f.formula().to_string()) else {
            return Ok(Some(needed));
        };
        let Some(original) = node.value().get().cloned() else {
            debug!(address = %key, "no stored value to compare");
            return Ok(None);
        };

        if let Some(node) = self.graph.node_mut(id) {
            *node.value_mut() = CachedValue::Empty;
        }
        let calced = self.value_of(id)?;
        report.verified += 1;
        if !original.approx_eq(&calced) {
            warn!(address = %key, %original, %calced, "value mismatch");
            report.mismatch.insert(
                key,
                Mismatch {
                    original,
                    calced,
                    formula,
                },
            );
        }
        Ok(Some(needed))
    }
}

fn record(report: &mut ValidationReport, address: &str, formula: Option<String>, e: &EngineError) {
    let (address, formula) = match e {
        EngineError::Formula {
            address: Some(at),
            formula: f,
            ..
        } => (at.clone(), f.clone().or(formula)),
        _ => (address.to_string(), formula),
    };
    let failure = Failure {
        address,
        formula,
        message: e.to_string(),
    };
    match e.not_implemented() {
        Some(name) => report
            .not_implemented
            .entry(name.to_string())
            .or_default()
            .push(failure),
        None => report.exceptions.entry(e.cause()).or_default().push(failure),
    }
}
