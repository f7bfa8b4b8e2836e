//! Operator estimators and their chain.

use std::collections::BTreeMap;

use flowc_analyzer::MasterJoinKind;
use flowc_core::config::EstimatorOptions;
use flowc_core::id::OperatorId;
use flowc_graph::{ExternalInput, Operator, OperatorGraph, OperatorKind, PropertyKind};
use tracing::{debug, trace};

use crate::estimate::{Estimate, EstimateKey, EstimateMap, EstimateValue, SizeClass, SIZE_CLASS};

/// Read-only view handed to estimators.
#[derive(Debug, Clone, Copy)]
pub struct EstimatorContext<'a> {
    pub graph: &'a OperatorGraph,
    pub options: &'a EstimatorOptions,
}

impl<'a> EstimatorContext<'a> {
    pub fn new(graph: &'a OperatorGraph, options: &'a EstimatorOptions) -> Self {
        Self { graph, options }
    }
}

/// Computes estimates for a set of operators.
///
/// The result is total: its keys are exactly the requested operators. An
/// operator the estimator knows nothing about gets an empty estimate, and
/// unknown values are absent keys, never errors. Estimators must not mutate
/// the graph.
pub trait OperatorEstimator {
    /// Stable name used in logs.
    fn name(&self) -> &str;

    fn estimate(&self, ctx: &EstimatorContext<'_>, operators: &[OperatorId]) -> EstimateMap;
}

/// Runs estimators in order over the same request.
///
/// Later estimators override earlier ones per key. The result has an entry
/// (possibly empty) for every requested operator.
#[derive(Default)]
pub struct EstimatorChain {
    elements: Vec<Box<dyn OperatorEstimator>>,
}

impl EstimatorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Input hints first, propagation on top.
    pub fn standard() -> Self {
        Self::new()
            .with(ExternalInputEstimator)
            .with(PropagatingSizeEstimator)
    }

    pub fn with(mut self, estimator: impl OperatorEstimator + 'static) -> Self {
        self.push(Box::new(estimator));
        self
    }

    pub fn push(&mut self, estimator: Box<dyn OperatorEstimator>) {
        self.elements.push(estimator);
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl std::fmt::Debug for EstimatorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.elements.iter().map(|e| e.name()).collect();
        f.debug_struct("EstimatorChain").field("elements", &names).finish()
    }
}

impl OperatorEstimator for EstimatorChain {
    fn name(&self) -> &str {
        "chain"
    }

    fn estimate(&self, ctx: &EstimatorContext<'_>, operators: &[OperatorId]) -> EstimateMap {
        let mut results: EstimateMap = operators
            .iter()
            .map(|id| (*id, Estimate::default()))
            .collect();
        for element in &self.elements {
            let partial = element.estimate(ctx, operators);
            debug!(estimator = element.name(), operators = partial.len(), "estimated");
            for (id, estimate) in partial {
                if let Some(slot) = results.get_mut(&id) {
                    slot.merge(estimate);
                }
            }
        }
        results
    }
}

/// Byte estimate for an external input's declared data size.
fn hinted_estimate(op: &Operator, options: &EstimatorOptions) -> Option<Estimate> {
    let info = op.as_external_input()?.info.as_ref()?;
    let class = SizeClass::of_hint(info.data_size);
    let bytes = class.upper_bound(options)?;
    Some(
        Estimate::new()
            .with(
                EstimateKey::OutputSize(ExternalInput::PORT_NAME.to_string()),
                EstimateValue::Size(bytes),
            )
            .with(
                EstimateKey::Attribute(SIZE_CLASS.to_string()),
                EstimateValue::Class(class),
            ),
    )
}

/// Turns external-input data-size hints into output sizes.
///
/// `tiny` and `small` map to the configured limits, `large` to `+inf`.
/// Inputs without a hint stay unknown.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExternalInputEstimator;

impl OperatorEstimator for ExternalInputEstimator {
    fn name(&self) -> &str {
        "external-input"
    }

    fn estimate(&self, ctx: &EstimatorContext<'_>, operators: &[OperatorId]) -> EstimateMap {
        operators
            .iter()
            .map(|id| {
                let estimate = ctx
                    .graph
                    .get(*id)
                    .and_then(|op| hinted_estimate(op, ctx.options))
                    .unwrap_or_default();
                (*id, estimate)
            })
            .collect()
    }
}

/// Propagates sizes along data-flow edges.
///
/// An input receives the sum of its upstream output sizes; an operator's
/// outputs carry the sum of its inputs, except for the master-join family
/// whose outputs follow the transaction (second) input. Flow operators and
/// anything downstream of an unknown size stay unknown.
#[derive(Debug, Clone, Copy, Default)]
pub struct PropagatingSizeEstimator;

impl PropagatingSizeEstimator {
    fn propagate(ctx: &EstimatorContext<'_>) -> EstimateMap {
        let Ok(order) = ctx.graph.topological_order() else {
            debug!("data-flow cycle; sizes are not propagated");
            return EstimateMap::new();
        };

        let mut outputs: BTreeMap<(OperatorId, usize), f64> = BTreeMap::new();
        let mut results = EstimateMap::new();
        for id in order {
            let Some(op) = ctx.graph.get(id) else { continue };
            let mut estimate = Estimate::new();

            if op.kind() == OperatorKind::Input {
                if let Some(hinted) = hinted_estimate(op, ctx.options) {
                    if let (Some(bytes), Some(index)) = (
                        hinted.output_size(ExternalInput::PORT_NAME),
                        op.index_of(PropertyKind::Output, ExternalInput::PORT_NAME),
                    ) {
                        outputs.insert((id, index), bytes);
                    }
                    estimate.merge(hinted);
                }
                results.insert(id, estimate);
                continue;
            }

            let mut input_sizes = Vec::new();
            for index in op.indices_of(PropertyKind::Input) {
                let Some(port) = op.property(index) else { continue };
                let size = port
                    .opposites()
                    .iter()
                    .map(|up| outputs.get(&(up.operator, up.index)).copied())
                    .sum::<Option<f64>>();
                if let Some(bytes) = size {
                    estimate.insert(
                        EstimateKey::InputSize(port.name().to_string()),
                        EstimateValue::Size(bytes),
                    );
                }
                input_sizes.push(size);
            }

            let output_size = if op.kind() == OperatorKind::Flow || input_sizes.is_empty() {
                None
            } else if MasterJoinKind::of(op).is_some() {
                input_sizes.get(1).copied().flatten()
            } else {
                input_sizes.iter().copied().sum::<Option<f64>>()
            };

            if let Some(bytes) = output_size {
                for index in op.indices_of(PropertyKind::Output) {
                    let Some(port) = op.property(index) else { continue };
                    outputs.insert((id, index), bytes);
                    estimate.insert(
                        EstimateKey::OutputSize(port.name().to_string()),
                        EstimateValue::Size(bytes),
                    );
                }
            }
            trace!(operator = %op, output = ?output_size, "propagated size");
            results.insert(id, estimate);
        }
        results
    }
}

impl OperatorEstimator for PropagatingSizeEstimator {
    fn name(&self) -> &str {
        "propagating-size"
    }

    fn estimate(&self, ctx: &EstimatorContext<'_>, operators: &[OperatorId]) -> EstimateMap {
        let mut all = Self::propagate(ctx);
        operators
            .iter()
            .map(|id| (*id, all.remove(id).unwrap_or_default()))
            .collect()
    }
}
