//! Graph rewriters run before estimation.

use std::collections::BTreeSet;

use flowc_core::error::Result;
use flowc_core::id::{OperatorId, PortRef};
use flowc_graph::{CoreOperatorKind, OperatorConstraint, OperatorGraph, OperatorKind, PropertyKind};
use tracing::debug;

/// Rewrites a graph in place; returns the number of changes made.
pub trait OperatorRewriter {
    fn name(&self) -> &str;

    fn rewrite(&self, graph: &mut OperatorGraph) -> Result<usize>;
}

/// Applies rewriters in registration order.
#[derive(Default)]
pub struct RewriterChain {
    elements: Vec<Box<dyn OperatorRewriter>>,
}

impl RewriterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn standard() -> Self {
        Self::new()
            .with(CheckpointFolding)
            .with(DeadOperatorElimination)
    }

    pub fn with(mut self, rewriter: impl OperatorRewriter + 'static) -> Self {
        self.elements.push(Box::new(rewriter));
        self
    }

    pub fn rewrite(&self, graph: &mut OperatorGraph) -> Result<usize> {
        let mut total = 0;
        for element in &self.elements {
            let changes = element.rewrite(graph)?;
            debug!(rewriter = element.name(), changes, "rewrite pass");
            total += changes;
        }
        Ok(total)
    }
}

impl std::fmt::Debug for RewriterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.elements.iter().map(|e| e.name()).collect();
        f.debug_struct("RewriterChain").field("elements", &names).finish()
    }
}

/// Collapses a checkpoint feeding exclusively into another checkpoint.
///
/// The pair is replaced by a fresh checkpoint that takes the first one's
/// upstreams, the second one's downstreams, and the constraints of both.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckpointFolding;

/// `(input, output)` indices of a single-in/single-out checkpoint.
fn checkpoint_ports(graph: &OperatorGraph, id: OperatorId) -> Option<(usize, usize)> {
    let op = graph.get(id)?;
    if op.core_kind() != Some(CoreOperatorKind::Checkpoint) {
        return None;
    }
    match (
        op.indices_of(PropertyKind::Input).as_slice(),
        op.indices_of(PropertyKind::Output).as_slice(),
    ) {
        ([input], [output]) => Some((*input, *output)),
        _ => None,
    }
}

impl CheckpointFolding {
    fn find_pair(graph: &OperatorGraph) -> Option<(OperatorId, OperatorId)> {
        for first in graph.operators() {
            let Some((_, first_out)) = checkpoint_ports(graph, first) else {
                continue;
            };
            let targets = graph.opposites(PortRef::new(first, first_out));
            let [target] = targets else { continue };
            if target.operator == first {
                continue;
            }
            let Some((second_in, _)) = checkpoint_ports(graph, target.operator) else {
                continue;
            };
            if target.index != second_in {
                continue;
            }
            let back = graph.opposites(*target);
            if back.len() == 1 && back[0] == PortRef::new(first, first_out) {
                return Some((first, target.operator));
            }
        }
        None
    }
}

impl OperatorRewriter for CheckpointFolding {
    fn name(&self) -> &str {
        "checkpoint-folding"
    }

    fn rewrite(&self, graph: &mut OperatorGraph) -> Result<usize> {
        let mut changes = 0;
        while let Some((first, second)) = Self::find_pair(graph) {
            let (first_in, _) = checkpoint_ports(graph, first).unwrap_or_default();
            let (second_in, second_out) = checkpoint_ports(graph, second).unwrap_or_default();
            let upstreams = graph.opposites(PortRef::new(first, first_in)).to_vec();
            let downstreams = graph.opposites(PortRef::new(second, second_out)).to_vec();

            let inherited = graph
                .get(first)
                .map(|op| op.constraints().clone())
                .unwrap_or_default();
            let Some(template) = graph
                .get(second)
                .map(|op| op.copy_with_constraints(inherited))
            else {
                break;
            };
            let folded = graph.add(template);
            for up in upstreams {
                graph.connect(up, PortRef::new(folded, second_in))?;
            }
            for down in downstreams {
                graph.connect(PortRef::new(folded, second_out), down)?;
            }
            graph.remove(first);
            graph.remove(second);
            changes += 1;
        }
        Ok(changes)
    }
}

/// Removes operators that cannot reach any external output.
///
/// External inputs and operators constrained `AtLeastOnce` (together with
/// their upstreams) are always kept.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeadOperatorElimination;

impl OperatorRewriter for DeadOperatorElimination {
    fn name(&self) -> &str {
        "dead-operator-elimination"
    }

    fn rewrite(&self, graph: &mut OperatorGraph) -> Result<usize> {
        let mut live = BTreeSet::new();
        let mut work: Vec<OperatorId> = graph
            .iter()
            .filter(|(_, op)| {
                op.kind() == OperatorKind::Output
                    || op.has_constraint(OperatorConstraint::AtLeastOnce)
            })
            .map(|(id, _)| id)
            .collect();
        while let Some(id) = work.pop() {
            if live.insert(id) {
                work.extend(graph.upstreams(id));
            }
        }

        let dead: Vec<OperatorId> = graph
            .iter()
            .filter(|(id, op)| !live.contains(id) && op.kind() != OperatorKind::Input)
            .map(|(id, _)| id)
            .collect();
        for id in &dead {
            graph.remove(*id);
        }
        Ok(dead.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowc_core::description::TypeDescription;
    use flowc_graph::Operator;

    fn model() -> TypeDescription {
        TypeDescription::class("com.example.Stock")
    }

    fn core(kind: CoreOperatorKind) -> Operator {
        Operator::core(kind)
            .input("in", model())
            .output("out", model())
            .build()
            .unwrap()
    }

    #[test]
    fn test_fold_checkpoint_chain() {
        let mut g = OperatorGraph::new();
        let src = g.add(Operator::external_input("in", model(), None));
        let a = g.add(core(CoreOperatorKind::Checkpoint));
        let b = g.add(core(CoreOperatorKind::Checkpoint));
        let c = g.add(core(CoreOperatorKind::Checkpoint));
        let dst = g.add(Operator::external_output("out", model(), None));
        g.connect_by_name(src, "port", a, "in").unwrap();
        g.connect_by_name(a, "out", b, "in").unwrap();
        g.connect_by_name(b, "out", c, "in").unwrap();
        g.connect_by_name(c, "out", dst, "port").unwrap();

        let changes = CheckpointFolding.rewrite(&mut g).unwrap();
        assert_eq!(changes, 2);
        assert_eq!(g.len(), 3);
        let middle: Vec<_> = g.downstreams(src).into_iter().collect();
        assert_eq!(middle.len(), 1);
        assert!(!g.contains(a) && !g.contains(b) && !g.contains(c));
        assert_eq!(g.downstreams(middle[0]), BTreeSet::from([dst]));
        assert!(g.validate().is_ok());
    }

    #[test]
    fn test_fold_keeps_constraints_of_both() {
        let mut g = OperatorGraph::new();
        let a = g.add(
            Operator::core(CoreOperatorKind::Checkpoint)
                .input("in", model())
                .output("out", model())
                .constraint(OperatorConstraint::AtLeastOnce)
                .build()
                .unwrap(),
        );
        let b = g.add(
            Operator::core(CoreOperatorKind::Checkpoint)
                .input("in", model())
                .output("out", model())
                .constraint(OperatorConstraint::Volatile)
                .build()
                .unwrap(),
        );
        g.connect_by_name(a, "out", b, "in").unwrap();

        assert_eq!(CheckpointFolding.rewrite(&mut g).unwrap(), 1);
        let folded = g.operators();
        assert_eq!(folded.len(), 1);
        let op = g.get(folded[0]).unwrap();
        assert!(op.has_constraint(OperatorConstraint::AtLeastOnce));
        assert!(op.has_constraint(OperatorConstraint::Volatile));
    }

    #[test]
    fn test_fan_out_checkpoint_not_folded() {
        let mut g = OperatorGraph::new();
        let a = g.add(core(CoreOperatorKind::Checkpoint));
        let b = g.add(core(CoreOperatorKind::Checkpoint));
        let p = g.add(core(CoreOperatorKind::Project));
        g.connect_by_name(a, "out", b, "in").unwrap();
        g.connect_by_name(a, "out", p, "in").unwrap();
        assert_eq!(CheckpointFolding.rewrite(&mut g).unwrap(), 0);
    }

    #[test]
    fn test_dead_operators_removed() {
        let mut g = OperatorGraph::new();
        let src = g.add(Operator::external_input("in", model(), None));
        let used = g.add(core(CoreOperatorKind::Project));
        let unused = g.add(core(CoreOperatorKind::Extend));
        let effect = g.add(
            Operator::core(CoreOperatorKind::Restructure)
                .input("in", model())
                .constraint(OperatorConstraint::AtLeastOnce)
                .build()
                .unwrap(),
        );
        let dst = g.add(Operator::external_output("out", model(), None));
        g.connect_by_name(src, "port", used, "in").unwrap();
        g.connect_by_name(used, "out", dst, "port").unwrap();
        g.connect_by_name(src, "port", unused, "in").unwrap();
        g.connect_by_name(src, "port", effect, "in").unwrap();

        assert_eq!(DeadOperatorElimination.rewrite(&mut g).unwrap(), 1);
        assert!(!g.contains(unused));
        assert!(g.contains(effect) && g.contains(used) && g.contains(src));
    }
}
