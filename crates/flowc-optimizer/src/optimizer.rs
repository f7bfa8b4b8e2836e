//! One optimizer run over a jobflow graph.

use std::collections::BTreeMap;

use flowc_core::config::EstimatorOptions;
use flowc_core::diagnostic::{Diagnostic, EntityRef};
use flowc_core::error::Result;
use flowc_core::id::OperatorId;
use flowc_graph::OperatorGraph;
use tracing::debug;

use crate::characterizer::CharacterizerAdapter;
use crate::estimate::EstimateMap;
use crate::estimator::{EstimatorChain, OperatorEstimator};
use crate::join_strategy::{JoinStrategy, JoinStrategyCharacterizer};
use crate::rewriter::{OperatorRewriter, RewriterChain};

/// Results of [`Optimizer::analyze`].
#[derive(Debug, Clone, Default)]
pub struct OptimizerReport {
    pub estimates: EstimateMap,
    /// Only operators where a strategy applies.
    pub join_strategies: BTreeMap<OperatorId, JoinStrategy>,
    pub diagnostics: Vec<Diagnostic>,
}

impl OptimizerReport {
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.level == flowc_core::Level::Error)
    }
}

#[derive(Debug)]
pub struct Optimizer {
    options: EstimatorOptions,
    estimator: EstimatorChain,
    rewriters: RewriterChain,
}

impl Optimizer {
    /// Standard estimators and rewriters.
    pub fn new(options: EstimatorOptions) -> Self {
        Self {
            options,
            estimator: EstimatorChain::standard(),
            rewriters: RewriterChain::standard(),
        }
    }

    /// No estimators, no rewriters.
    pub fn empty(options: EstimatorOptions) -> Self {
        Self {
            options,
            estimator: EstimatorChain::new(),
            rewriters: RewriterChain::new(),
        }
    }

    /// Appends an estimator; it overrides earlier ones per key.
    pub fn with_estimator(mut self, estimator: impl OperatorEstimator + 'static) -> Self {
        self.estimator.push(Box::new(estimator));
        self
    }

    pub fn with_rewriter(mut self, rewriter: impl OperatorRewriter + 'static) -> Self {
        self.rewriters = self.rewriters.with(rewriter);
        self
    }

    pub fn options(&self) -> &EstimatorOptions {
        &self.options
    }

    pub fn estimator(&self) -> &dyn OperatorEstimator {
        &self.estimator
    }

    pub fn rewrite(&self, graph: &mut OperatorGraph) -> Result<usize> {
        self.rewriters.rewrite(graph)
    }

    /// Estimates every operator, then characterizes join strategies.
    pub fn analyze(&self, graph: &OperatorGraph, entity: Option<EntityRef>) -> OptimizerReport {
        let mut adapter = CharacterizerAdapter::new(graph, &self.options, &self.estimator);
        if let Some(entity) = entity {
            adapter = adapter.with_entity(entity);
        }
        let operators = graph.operators();
        let strategies = adapter.characterize_all(&JoinStrategyCharacterizer::chain(), &operators);
        let (estimates, diagnostics) = adapter.into_parts();
        let join_strategies: BTreeMap<_, _> = strategies
            .into_iter()
            .filter(|(_, s)| *s != JoinStrategy::NotApplicable)
            .collect();
        debug!(
            operators = operators.len(),
            joins = join_strategies.len(),
            diagnostics = diagnostics.len(),
            "optimizer analysis"
        );
        OptimizerReport {
            estimates,
            join_strategies,
            diagnostics,
        }
    }
}
