//! Characterizers: pure decisions derived from estimates.

use std::collections::BTreeMap;

use flowc_core::config::EstimatorOptions;
use flowc_core::diagnostic::{Diagnostic, EntityRef};
use flowc_core::id::OperatorId;
use flowc_graph::{Operator, OperatorGraph};
use tracing::trace;

use crate::estimate::{Estimate, EstimateMap};
use crate::estimator::{EstimatorContext, OperatorEstimator};

/// What a characterizer may look at and report to.
pub trait CharacterizerContext {
    fn graph(&self) -> &OperatorGraph;

    fn options(&self) -> &EstimatorOptions;

    /// Estimates for every requested operator.
    fn estimate_all(&mut self, operators: &[OperatorId]) -> EstimateMap;

    /// Estimate of one operator; every estimation result covers its request.
    fn estimate(&mut self, operator: OperatorId) -> Estimate {
        let mut map = self.estimate_all(&[operator]);
        let estimate = map.remove(&operator);
        debug_assert!(estimate.is_some(), "estimate is missing for {operator}");
        estimate.unwrap_or_default()
    }

    /// Reports a diagnostic about `operator`.
    fn report(&mut self, operator: OperatorId, diagnostic: Diagnostic);
}

/// Maps an operator to a characteristic of type `T`.
pub trait OperatorCharacterizer<T> {
    /// Whether this characterizer applies to the operator.
    fn supports(&self, _operator: &Operator) -> bool {
        true
    }

    fn characterize(&self, ctx: &mut dyn CharacterizerContext, operator: OperatorId) -> T;
}

/// Always yields the same value.
#[derive(Debug, Clone)]
pub struct ConstantCharacterizer<T>(pub T);

impl<T: Clone> OperatorCharacterizer<T> for ConstantCharacterizer<T> {
    fn characterize(&self, _: &mut dyn CharacterizerContext, _: OperatorId) -> T {
        self.0.clone()
    }
}

/// Dispatches to the first characterizer that supports the operator, or to
/// the default.
pub struct CharacterizerChain<T> {
    elements: Vec<Box<dyn OperatorCharacterizer<T>>>,
    default: Box<dyn OperatorCharacterizer<T>>,
}

impl<T> CharacterizerChain<T> {
    pub fn new(default: impl OperatorCharacterizer<T> + 'static) -> Self {
        Self {
            elements: Vec::new(),
            default: Box::new(default),
        }
    }

    pub fn with(mut self, element: impl OperatorCharacterizer<T> + 'static) -> Self {
        self.elements.push(Box::new(element));
        self
    }
}

impl<T> OperatorCharacterizer<T> for CharacterizerChain<T> {
    fn characterize(&self, ctx: &mut dyn CharacterizerContext, operator: OperatorId) -> T {
        let pick = ctx
            .graph()
            .get(operator)
            .and_then(|op| self.elements.iter().position(|c| c.supports(op)));
        match pick.and_then(|i| self.elements.get(i)) {
            Some(element) => element.characterize(ctx, operator),
            None => self.default.characterize(ctx, operator),
        }
    }
}

/// Runs characterizers over an estimator, caching estimates.
pub struct CharacterizerAdapter<'a> {
    graph: &'a OperatorGraph,
    options: &'a EstimatorOptions,
    estimator: &'a dyn OperatorEstimator,
    cache: EstimateMap,
    entity: Option<EntityRef>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> CharacterizerAdapter<'a> {
    pub fn new(
        graph: &'a OperatorGraph,
        options: &'a EstimatorOptions,
        estimator: &'a dyn OperatorEstimator,
    ) -> Self {
        Self {
            graph,
            options,
            estimator,
            cache: EstimateMap::new(),
            entity: None,
            diagnostics: Vec::new(),
        }
    }

    /// Attributes reported diagnostics to operators of this entity.
    pub fn with_entity(mut self, entity: EntityRef) -> Self {
        self.entity = Some(entity);
        self
    }

    /// Estimates the whole request first, then characterizes in id order.
    pub fn characterize_all<T>(
        &mut self,
        characterizer: &dyn OperatorCharacterizer<T>,
        operators: &[OperatorId],
    ) -> BTreeMap<OperatorId, T> {
        self.estimate_all(operators);
        let mut ordered = operators.to_vec();
        ordered.sort();
        ordered.dedup();
        ordered
            .into_iter()
            .map(|id| (id, characterizer.characterize(self, id)))
            .collect()
    }

    /// Everything estimated so far.
    pub fn estimates(&self) -> &EstimateMap {
        &self.cache
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_parts(self) -> (EstimateMap, Vec<Diagnostic>) {
        (self.cache, self.diagnostics)
    }
}

impl CharacterizerContext for CharacterizerAdapter<'_> {
    fn graph(&self) -> &OperatorGraph {
        self.graph
    }

    fn options(&self) -> &EstimatorOptions {
        self.options
    }

    fn estimate_all(&mut self, operators: &[OperatorId]) -> EstimateMap {
        let missing: Vec<OperatorId> = operators
            .iter()
            .filter(|id| !self.cache.contains_key(id))
            .copied()
            .collect();
        if !missing.is_empty() {
            let ctx = EstimatorContext::new(self.graph, self.options);
            let mut fresh = self.estimator.estimate(&ctx, &missing);
            trace!(requested = missing.len(), "estimation batch");
            for id in missing {
                // estimators are total over their request
                let Some(estimate) = fresh.remove(&id) else {
                    panic!(
                        "estimator '{}' returned no estimate for {id}",
                        self.estimator.name()
                    );
                };
                self.cache.insert(id, estimate);
            }
        }
        operators
            .iter()
            .filter_map(|id| self.cache.get(id).map(|e| (*id, e.clone())))
            .collect()
    }

    fn report(&mut self, operator: OperatorId, mut diagnostic: Diagnostic) {
        if diagnostic.entity.is_none() {
            if let (Some(entity), Some(op)) = (&self.entity, self.graph.get(operator)) {
                diagnostic.entity = Some(entity.operator(op.to_string()));
            }
        }
        self.diagnostics.push(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::estimate::{EstimateKey, EstimateValue};
    use flowc_core::description::TypeDescription;
    use flowc_graph::{CoreOperatorKind, OperatorKind};

    struct Counting<'c>(&'c Cell<usize>);

    impl OperatorEstimator for Counting<'_> {
        fn name(&self) -> &str {
            "counting"
        }

        fn estimate(&self, _: &EstimatorContext<'_>, operators: &[OperatorId]) -> EstimateMap {
            self.0.set(self.0.get() + 1);
            operators
                .iter()
                .map(|id| {
                    (
                        *id,
                        Estimate::new()
                            .with(EstimateKey::Attribute("id".into()), EstimateValue::Count(id.get())),
                    )
                })
                .collect()
        }
    }

    struct Partial;

    impl OperatorEstimator for Partial {
        fn name(&self) -> &str {
            "partial"
        }

        fn estimate(&self, _: &EstimatorContext<'_>, operators: &[OperatorId]) -> EstimateMap {
            operators
                .iter()
                .take(1)
                .map(|id| (*id, Estimate::new()))
                .collect()
        }
    }

    struct KindName;

    impl OperatorCharacterizer<String> for KindName {
        fn supports(&self, operator: &Operator) -> bool {
            operator.kind() == OperatorKind::Core
        }

        fn characterize(&self, ctx: &mut dyn CharacterizerContext, operator: OperatorId) -> String {
            let estimate = ctx.estimate(operator);
            format!("core:{}", estimate.len())
        }
    }

    fn graph() -> (OperatorGraph, OperatorId, OperatorId) {
        let mut g = OperatorGraph::new();
        let i = g.add(Operator::external_input(
            "in",
            TypeDescription::class("x.M"),
            None,
        ));
        let c = g.add(Operator::core(CoreOperatorKind::Checkpoint).build().unwrap());
        (g, i, c)
    }

    #[test]
    fn test_full_barrier_then_cached() {
        let (g, i, c) = graph();
        let calls = Cell::new(0);
        let estimator = Counting(&calls);
        let options = EstimatorOptions::default();
        let mut adapter = CharacterizerAdapter::new(&g, &options, &estimator);
        let chain = CharacterizerChain::new(ConstantCharacterizer("other".to_string())).with(KindName);

        let result = adapter.characterize_all(&chain, &[c, i]);
        assert_eq!(calls.get(), 1);
        assert_eq!(result[&c], "core:1");
        assert_eq!(result[&i], "other");
        assert_eq!(adapter.estimates().len(), 2);
    }

    #[test]
    fn test_characterization_is_deterministic() {
        let (g, i, c) = graph();
        let calls = Cell::new(0);
        let estimator = Counting(&calls);
        let options = EstimatorOptions::default();
        let chain = CharacterizerChain::new(ConstantCharacterizer("other".to_string())).with(KindName);

        let first = CharacterizerAdapter::new(&g, &options, &estimator).characterize_all(&chain, &[i, c]);
        let second = CharacterizerAdapter::new(&g, &options, &estimator).characterize_all(&chain, &[c, i]);
        assert_eq!(first, second);
    }

    #[test]
    #[should_panic(expected = "estimator 'partial' returned no estimate")]
    fn test_partial_estimator_is_rejected() {
        let (g, i, c) = graph();
        let options = EstimatorOptions::default();
        let mut adapter = CharacterizerAdapter::new(&g, &options, &Partial);
        adapter.estimate_all(&[i, c]);
    }

    #[test]
    fn test_report_attaches_entity() {
        let (g, _, c) = graph();
        let calls = Cell::new(0);
        let estimator = Counting(&calls);
        let options = EstimatorOptions::default();
        let mut adapter = CharacterizerAdapter::new(&g, &options, &estimator)
            .with_entity(EntityRef::jobflow("b", "f"));
        adapter.report(c, Diagnostic::error("boom"));
        assert_eq!(
            adapter.diagnostics()[0].to_string(),
            "[ERROR] boom (batch=b, jobflow=f, operator=Core(checkpoint))"
        );
    }
}
