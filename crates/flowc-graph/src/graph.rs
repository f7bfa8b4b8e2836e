//! The operator graph arena.
//!
//! Edges are stored twice, once on each port. Every mutation goes through
//! this type so both halves stay in sync; `validate` checks that they did.

use std::collections::{BTreeMap, BTreeSet};

use flowc_core::error::{Error, Result};
use flowc_core::id::{OperatorId, PortRef};

use crate::operator::{Operator, OperatorKind};
use crate::port::{OperatorProperty, PropertyKind};

#[derive(Debug, Default)]
pub struct OperatorGraph {
    operators: BTreeMap<OperatorId, Operator>,
    next_id: u64,
}

impl OperatorGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a detached operator and returns its handle.
    pub fn add(&mut self, mut operator: Operator) -> OperatorId {
        // operators outside a graph carry no edges; enforce it on entry
        operator.clear_edges();
        let id = OperatorId::new(self.next_id);
        self.next_id += 1;
        self.operators.insert(id, operator);
        id
    }

    /// Disconnects and removes an operator, returning it detached.
    pub fn remove(&mut self, id: OperatorId) -> Option<Operator> {
        if !self.operators.contains_key(&id) {
            return None;
        }
        self.disconnect_all(id);
        self.operators.remove(&id)
    }

    pub fn contains(&self, id: OperatorId) -> bool {
        self.operators.contains_key(&id)
    }

    pub fn get(&self, id: OperatorId) -> Option<&Operator> {
        self.operators.get(&id)
    }

    /// Snapshot of the operator handles in insertion order.
    pub fn operators(&self) -> Vec<OperatorId> {
        self.operators.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (OperatorId, &Operator)> {
        self.operators.iter().map(|(id, op)| (*id, op))
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// Operators of the given kind, in insertion order.
    pub fn operators_of(&self, kind: OperatorKind) -> Vec<OperatorId> {
        self.iter()
            .filter(|(_, op)| op.kind() == kind)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn find_external_input(&self, name: &str) -> Option<OperatorId> {
        self.iter()
            .find(|(_, op)| op.as_external_input().is_some_and(|i| i.name == name))
            .map(|(id, _)| id)
    }

    pub fn find_external_output(&self, name: &str) -> Option<OperatorId> {
        self.iter()
            .find(|(_, op)| op.as_external_output().is_some_and(|o| o.name == name))
            .map(|(id, _)| id)
    }

    pub fn input_port(&self, id: OperatorId, name: &str) -> Option<PortRef> {
        self.get(id)?
            .index_of(PropertyKind::Input, name)
            .map(|index| PortRef::new(id, index))
    }

    pub fn output_port(&self, id: OperatorId, name: &str) -> Option<PortRef> {
        self.get(id)?
            .index_of(PropertyKind::Output, name)
            .map(|index| PortRef::new(id, index))
    }

    /// The ports on the other side of `port`'s edges; empty if unknown.
    pub fn opposites(&self, port: PortRef) -> &[PortRef] {
        self.get(port.operator)
            .and_then(|op| op.property(port.index))
            .map(OperatorProperty::opposites)
            .unwrap_or(&[])
    }

    pub fn upstreams(&self, id: OperatorId) -> BTreeSet<OperatorId> {
        self.neighbours(id, PropertyKind::Input)
    }

    pub fn downstreams(&self, id: OperatorId) -> BTreeSet<OperatorId> {
        self.neighbours(id, PropertyKind::Output)
    }

    fn neighbours(&self, id: OperatorId, kind: PropertyKind) -> BTreeSet<OperatorId> {
        let Some(op) = self.get(id) else {
            return BTreeSet::new();
        };
        op.properties()
            .iter()
            .filter(|p| p.kind() == kind)
            .flat_map(|p| p.opposites().iter().map(|r| r.operator))
            .collect()
    }

    fn port_kind(&self, port: PortRef) -> Result<PropertyKind> {
        let op = self
            .get(port.operator)
            .ok_or_else(|| Error::Structural(format!("unknown operator {}", port.operator)))?;
        op.property(port.index)
            .map(OperatorProperty::kind)
            .ok_or_else(|| Error::Structural(format!("unknown port {port} on {op}")))
    }

    /// Connects an output port to an input port. Connecting twice is a no-op.
    pub fn connect(&mut self, upstream: PortRef, downstream: PortRef) -> Result<()> {
        if self.port_kind(upstream)? != PropertyKind::Output {
            return Err(Error::Structural(format!(
                "edge source {upstream} is not an output port"
            )));
        }
        if self.port_kind(downstream)? != PropertyKind::Input {
            return Err(Error::Structural(format!(
                "edge target {downstream} is not an input port"
            )));
        }
        if self.opposites(upstream).contains(&downstream) {
            return Ok(());
        }
        self.edges_mut(upstream)?.push(downstream);
        self.edges_mut(downstream)?.push(upstream);
        Ok(())
    }

    /// Connects ports by name: `upstream.output -> downstream.input`.
    pub fn connect_by_name(
        &mut self,
        upstream: OperatorId,
        output: &str,
        downstream: OperatorId,
        input: &str,
    ) -> Result<()> {
        let from = self.output_port(upstream, output).ok_or_else(|| {
            Error::Structural(format!("missing output port '{output}' on {upstream}"))
        })?;
        let to = self.input_port(downstream, input).ok_or_else(|| {
            Error::Structural(format!("missing input port '{input}' on {downstream}"))
        })?;
        self.connect(from, to)
    }

    /// Removes the edge between two ports; returns whether it existed.
    pub fn disconnect(&mut self, upstream: PortRef, downstream: PortRef) -> bool {
        let mut removed = false;
        if let Ok(edges) = self.edges_mut(upstream) {
            let before = edges.len();
            edges.retain(|r| *r != downstream);
            removed |= edges.len() != before;
        }
        if let Ok(edges) = self.edges_mut(downstream) {
            let before = edges.len();
            edges.retain(|r| *r != upstream);
            removed |= edges.len() != before;
        }
        removed
    }

    /// Removes every edge touching the operator's ports. Ports remain.
    pub fn disconnect_all(&mut self, id: OperatorId) {
        let Some(op) = self.get(id) else {
            return;
        };
        let edges: Vec<(PortRef, PortRef)> = op
            .properties()
            .iter()
            .enumerate()
            .flat_map(|(index, p)| {
                p.opposites()
                    .iter()
                    .map(move |other| (PortRef::new(id, index), *other))
            })
            .collect();
        for (own, other) in edges {
            if let Ok(list) = self.edges_mut(other) {
                list.retain(|r| *r != own);
            }
        }
        if let Some(op) = self.operators.get_mut(&id) {
            op.clear_edges();
        }
    }

    fn edges_mut(&mut self, port: PortRef) -> Result<&mut Vec<PortRef>> {
        self.operators
            .get_mut(&port.operator)
            .and_then(|op| op.property_mut(port.index))
            .and_then(OperatorProperty::opposites_mut)
            .ok_or_else(|| Error::Structural(format!("port {port} cannot hold edges")))
    }

    /// Deep copy preserving handles and internal edges.
    pub fn copy(&self) -> OperatorGraph {
        OperatorGraph {
            operators: self
                .operators
                .iter()
                .map(|(id, op)| (*id, op.copy_attached()))
                .collect(),
            next_id: self.next_id,
        }
    }

    /// Copies a subset of operators into a fresh graph.
    ///
    /// Edges among the subset are kept; edges to operators outside it are
    /// dropped. Returns the new graph and the old-to-new handle mapping.
    pub fn copy_operators(
        &self,
        ids: &[OperatorId],
    ) -> Result<(OperatorGraph, BTreeMap<OperatorId, OperatorId>)> {
        let mut copy = OperatorGraph::new();
        let mut mapping = BTreeMap::new();
        for id in ids {
            if mapping.contains_key(id) {
                continue;
            }
            if let Some(op) = self.get(*id) {
                mapping.insert(*id, copy.add(op.copy()));
            }
        }
        for (old, new) in &mapping {
            let Some(op) = self.get(*old) else { continue };
            for (index, p) in op.properties().iter().enumerate() {
                if p.kind() != PropertyKind::Output {
                    continue;
                }
                for target in p.opposites() {
                    if let Some(mapped) = mapping.get(&target.operator) {
                        copy.connect(
                            PortRef::new(*new, index),
                            PortRef::new(*mapped, target.index),
                        )?;
                    }
                }
            }
        }
        Ok((copy, mapping))
    }

    /// Checks edge integrity and property-name uniqueness, recursing into
    /// nested flow graphs.
    pub fn validate(&self) -> Result<()> {
        for (id, op) in self.iter() {
            op.check_property_names()?;
            for (index, p) in op.properties().iter().enumerate() {
                let own = PortRef::new(id, index);
                for other in p.opposites() {
                    let target = self.get(other.operator).ok_or_else(|| {
                        Error::Structural(format!(
                            "dangling edge {own} -> {other}: operator not in graph"
                        ))
                    })?;
                    let target_port = target.property(other.index).ok_or_else(|| {
                        Error::Structural(format!("dangling edge {own} -> {other}: no such port"))
                    })?;
                    let expected = match p.kind() {
                        PropertyKind::Input => PropertyKind::Output,
                        PropertyKind::Output => PropertyKind::Input,
                        PropertyKind::Argument => {
                            return Err(Error::Structural(format!("argument {own} has edges")))
                        }
                    };
                    if target_port.kind() != expected {
                        return Err(Error::Structural(format!(
                            "edge {own} -> {other} joins {:?} to {:?}",
                            p.kind(),
                            target_port.kind()
                        )));
                    }
                    if !target_port.opposites().contains(&own) {
                        return Err(Error::Structural(format!(
                            "asymmetric edge {own} -> {other}"
                        )));
                    }
                }
            }
            if let Some(flow) = op.as_flow() {
                flow.graph.validate()?;
            }
        }
        Ok(())
    }

    /// Kahn order over data-flow edges, ties broken by handle.
    pub fn topological_order(&self) -> Result<Vec<OperatorId>> {
        let mut pending: BTreeMap<OperatorId, usize> = self
            .operators
            .keys()
            .map(|id| (*id, self.upstreams(*id).len()))
            .collect();
        let mut ready: BTreeSet<OperatorId> = pending
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(self.operators.len());

        while let Some(id) = ready.pop_first() {
            pending.remove(&id);
            order.push(id);
            for next in self.downstreams(id) {
                if let Some(n) = pending.get_mut(&next) {
                    *n = n.saturating_sub(1);
                    if *n == 0 {
                        ready.insert(next);
                    }
                }
            }
        }

        if !pending.is_empty() {
            let names: Vec<String> = pending
                .keys()
                .filter_map(|id| self.get(*id).map(|op| op.to_string()))
                .collect();
            return Err(Error::Structural(format!(
                "data-flow cycle among operators: {}",
                names.join(", ")
            )));
        }
        Ok(order)
    }

    /// Moves all operators out, leaving the graph empty.
    pub(crate) fn take_operators(&mut self) -> BTreeMap<OperatorId, Operator> {
        std::mem::take(&mut self.operators)
    }
}
