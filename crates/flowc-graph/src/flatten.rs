//! Inlining of nested flow operators.
//!
//! Each flow operator is replaced by the contents of its nested graph. Edges
//! that entered the flow through input `N` are rewired to whatever the nested
//! `ExternalInput` placeholder `N` fed; edges leaving through output `M` are
//! rewired from whatever fed the nested `ExternalOutput` placeholder `M`.
//! Placeholders and the flow operator itself disappear.

use std::collections::BTreeMap;

use flowc_core::description::ClassDescription;
use flowc_core::error::{Error, Result};
use flowc_core::id::{OperatorId, PortRef};

use crate::graph::OperatorGraph;
use crate::operator::{FlowOperator, Operator, OperatorBody, OperatorKind};
use crate::port::PropertyKind;

impl OperatorGraph {
    /// Inlines every flow operator, innermost first.
    ///
    /// Nesting is checked in full before anything is touched: a flow part
    /// that (transitively) contains itself, or whose ports and placeholders
    /// do not match one to one, leaves the graph unchanged and yields a
    /// structural error.
    /// Flattening an already flat graph is a no-op.
    pub fn flatten(&mut self) -> Result<()> {
        check_nesting(self, &mut Vec::new())?;
        self.inline_flows()
    }

    fn inline_flows(&mut self) -> Result<()> {
        for id in self.operators_of(OperatorKind::Flow) {
            self.inline_flow(id)?;
        }
        Ok(())
    }

    fn inline_flow(&mut self, flow_id: OperatorId) -> Result<()> {
        let flow_op = self
            .get(flow_id)
            .ok_or_else(|| Error::Structural(format!("unknown flow operator {flow_id}")))?;

        // outer edges, keyed by the flow's port names
        let mut outer_upstreams: BTreeMap<String, Vec<PortRef>> = BTreeMap::new();
        let mut outer_downstreams: BTreeMap<String, Vec<PortRef>> = BTreeMap::new();
        for p in flow_op.properties() {
            match p.kind() {
                PropertyKind::Input => {
                    outer_upstreams.insert(p.name().to_string(), p.opposites().to_vec());
                }
                PropertyKind::Output => {
                    outer_downstreams.insert(p.name().to_string(), p.opposites().to_vec());
                }
                PropertyKind::Argument => {}
            }
        }

        let Some(OperatorBody::Flow(FlowOperator { mut graph, .. })) =
            self.remove(flow_id).map(Operator::into_body)
        else {
            return Err(Error::Structural(format!("{flow_id} is not a flow operator")));
        };
        graph.inline_flows()?;

        let mut entry: BTreeMap<OperatorId, String> = BTreeMap::new();
        let mut exit: BTreeMap<OperatorId, String> = BTreeMap::new();
        let mut edges = Vec::new();
        for (id, op) in graph.iter() {
            if let Some(input) = op.as_external_input() {
                entry.insert(id, input.name.clone());
            }
            if let Some(output) = op.as_external_output() {
                exit.insert(id, output.name.clone());
            }
            for (index, p) in op.properties().iter().enumerate() {
                if p.kind() == PropertyKind::Output {
                    for target in p.opposites() {
                        edges.push((PortRef::new(id, index), *target));
                    }
                }
            }
        }

        let mut mapping = BTreeMap::new();
        for (id, op) in graph.take_operators() {
            if entry.contains_key(&id) || exit.contains_key(&id) {
                continue;
            }
            mapping.insert(id, self.add(op));
        }

        let mapped = |port: PortRef| -> Result<PortRef> {
            mapping
                .get(&port.operator)
                .map(|new| PortRef::new(*new, port.index))
                .ok_or_else(|| Error::Structural(format!("nested port {port} was not inlined")))
        };

        for (from, to) in edges {
            let sources = match entry.get(&from.operator) {
                Some(name) => outer_upstreams.get(name).cloned().unwrap_or_default(),
                None => vec![mapped(from)?],
            };
            let targets = match exit.get(&to.operator) {
                Some(name) => outer_downstreams.get(name).cloned().unwrap_or_default(),
                None => vec![mapped(to)?],
            };
            for source in &sources {
                for target in &targets {
                    self.connect(*source, *target)?;
                }
            }
        }
        Ok(())
    }
}

fn check_nesting(graph: &OperatorGraph, stack: &mut Vec<ClassDescription>) -> Result<()> {
    for (_, op) in graph.iter() {
        let Some(flow) = op.as_flow() else { continue };
        if stack.contains(&flow.description_class) {
            let path: Vec<&str> = stack
                .iter()
                .map(ClassDescription::name)
                .chain(std::iter::once(flow.description_class.name()))
                .collect();
            return Err(Error::Structural(format!(
                "cyclic flow nesting: {}",
                path.join(" -> ")
            )));
        }
        check_placeholders(op, flow)?;
        stack.push(flow.description_class.clone());
        check_nesting(&flow.graph, stack)?;
        stack.pop();
    }
    Ok(())
}

fn check_placeholders(op: &Operator, flow: &FlowOperator) -> Result<()> {
    for input in op.inputs() {
        let count = flow
            .graph
            .iter()
            .filter(|(_, n)| n.as_external_input().is_some_and(|i| i.name == input.name()))
            .count();
        placeholder_count(flow, "input", input.name(), count)?;
    }
    for output in op.outputs() {
        let count = flow
            .graph
            .iter()
            .filter(|(_, n)| n.as_external_output().is_some_and(|o| o.name == output.name()))
            .count();
        placeholder_count(flow, "output", output.name(), count)?;
    }
    for (_, nested) in flow.graph.iter() {
        let stray = if let Some(input) = nested.as_external_input() {
            let known = op.index_of(PropertyKind::Input, &input.name).is_some();
            (!known).then_some(("input", &input.name))
        } else if let Some(output) = nested.as_external_output() {
            let known = op.index_of(PropertyKind::Output, &output.name).is_some();
            (!known).then_some(("output", &output.name))
        } else {
            None
        };
        if let Some((what, name)) = stray {
            return Err(Error::Structural(format!(
                "flow part {} has {what} placeholder '{name}' with no matching port",
                flow.description_class
            )));
        }
    }
    Ok(())
}

fn placeholder_count(flow: &FlowOperator, what: &str, name: &str, count: usize) -> Result<()> {
    match count {
        1 => Ok(()),
        0 => Err(Error::Structural(format!(
            "flow part {} has no {what} placeholder '{name}'",
            flow.description_class
        ))),
        _ => Err(Error::Structural(format!(
            "flow part {} declares {what} placeholder '{name}' {count} times",
            flow.description_class
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::operator::CoreOperatorKind;
    use flowc_core::description::TypeDescription;

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

    /// `in -> project -> out` wrapped as a flow part.
    fn part() -> OperatorGraph {
        let mut g = OperatorGraph::new();
        let i = g.add(Operator::external_input("in", model(), None));
        let p = g.add(core(CoreOperatorKind::Project));
        let o = g.add(Operator::external_output("out", model(), None));
        g.connect_by_name(i, "port", p, "in").unwrap();
        g.connect_by_name(p, "out", o, "port").unwrap();
        g
    }

    fn flow(class: &str, graph: OperatorGraph) -> Operator {
        Operator::flow(ClassDescription::new(class), graph)
            .input("in", model())
            .output("out", model())
            .build()
            .unwrap()
    }

    fn outer(flow_op: Operator) -> (OperatorGraph, OperatorId, OperatorId) {
        let mut g = OperatorGraph::new();
        let src = g.add(Operator::external_input("source", model(), None));
        let f = g.add(flow_op);
        let dst = g.add(Operator::external_output("sink", model(), None));
        g.connect_by_name(src, "port", f, "in").unwrap();
        g.connect_by_name(f, "out", dst, "port").unwrap();
        (g, src, dst)
    }

    #[test]
    fn test_flatten_rewires_through_placeholders() {
        let (mut g, src, dst) = outer(flow("x.Part", part()));
        g.flatten().unwrap();

        assert!(g.operators_of(OperatorKind::Flow).is_empty());
        assert_eq!(g.len(), 3);
        let project: Vec<_> = g.downstreams(src).into_iter().collect();
        assert_eq!(project.len(), 1);
        assert_eq!(
            g.get(project[0]).unwrap().core_kind(),
            Some(CoreOperatorKind::Project)
        );
        assert_eq!(g.downstreams(project[0]), BTreeSet::from([dst]));
        assert!(g.validate().is_ok());
    }

    #[test]
    fn test_flatten_nested_bottom_up() {
        let inner = flow("x.Inner", part());
        let mut middle = OperatorGraph::new();
        let i = middle.add(Operator::external_input("in", model(), None));
        let f = middle.add(inner);
        let o = middle.add(Operator::external_output("out", model(), None));
        middle.connect_by_name(i, "port", f, "in").unwrap();
        middle.connect_by_name(f, "out", o, "port").unwrap();

        let (mut g, src, dst) = outer(flow("x.Middle", middle));
        g.flatten().unwrap();
        assert_eq!(g.len(), 3);
        let order = g.topological_order().unwrap();
        assert_eq!(order.first(), Some(&src));
        assert_eq!(order.last(), Some(&dst));
    }

    #[test]
    fn test_flatten_is_idempotent() {
        let (mut g, _, _) = outer(flow("x.Part", part()));
        g.flatten().unwrap();
        let before = g.operators();
        g.flatten().unwrap();
        assert_eq!(g.operators(), before);
    }

    #[test]
    fn test_pass_through_part() {
        let mut inner = OperatorGraph::new();
        let i = inner.add(Operator::external_input("in", model(), None));
        let o = inner.add(Operator::external_output("out", model(), None));
        inner.connect_by_name(i, "port", o, "port").unwrap();

        let (mut g, src, dst) = outer(flow("x.Pass", inner));
        g.flatten().unwrap();
        assert_eq!(g.downstreams(src), BTreeSet::from([dst]));
    }

    #[test]
    fn test_cyclic_nesting_rejected_without_mutation() {
        let inner = flow("x.Loop", part());
        let mut body = OperatorGraph::new();
        let i = body.add(Operator::external_input("in", model(), None));
        let f = body.add(inner);
        let o = body.add(Operator::external_output("out", model(), None));
        body.connect_by_name(i, "port", f, "in").unwrap();
        body.connect_by_name(f, "out", o, "port").unwrap();

        let (mut g, _, _) = outer(flow("x.Loop", body));
        let before = g.operators();
        let err = g.flatten().unwrap_err();
        assert!(err.is_structural());
        assert!(err.to_string().contains("x.Loop -> x.Loop"));
        assert_eq!(g.operators(), before);
        assert_eq!(g.operators_of(OperatorKind::Flow).len(), 1);
    }

    #[test]
    fn test_missing_placeholder_rejected() {
        let mut inner = OperatorGraph::new();
        inner.add(Operator::external_input("in", model(), None));
        let (mut g, _, _) = outer(flow("x.Broken", inner));
        let err = g.flatten().unwrap_err();
        assert!(err.to_string().contains("no output placeholder 'out'"));
    }

    #[test]
    fn test_stray_placeholder_rejected() {
        let mut inner = part();
        let p = inner.operators_of(OperatorKind::Core)[0];
        let extra = inner.add(Operator::external_input("extra", model(), None));
        let merge = inner.add(
            Operator::core(CoreOperatorKind::Extend)
                .input("in", model())
                .input("in2", model())
                .output("out", model())
                .build()
                .unwrap(),
        );
        inner.connect_by_name(p, "out", merge, "in").unwrap();
        inner.connect_by_name(extra, "port", merge, "in2").unwrap();

        let (mut g, _, _) = outer(flow("x.Stray", inner));
        let before = g.operators();
        let err = g.flatten().unwrap_err();
        assert!(err.is_structural());
        assert!(err
            .to_string()
            .contains("input placeholder 'extra' with no matching port"));
        assert_eq!(g.operators(), before);
    }
}
