//! Operators: the nodes of the data-flow graph.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use flowc_core::description::{
    AnnotationDescription, ClassDescription, MethodDescription, TypeDescription, ValueDescription,
};
use flowc_core::error::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::external::{ExternalInputInfo, ExternalOutputInfo};
use crate::graph::OperatorGraph;
use crate::group::Group;
use crate::port::{OperatorArgument, OperatorInput, OperatorOutput, OperatorProperty, PropertyKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorKind {
    Core,
    User,
    Flow,
    Input,
    Output,
}

/// Execution constraints declared on an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorConstraint {
    /// Must be executed at least once, even if its outputs are unused.
    AtLeastOnce,
    /// Must not be executed more than once per record.
    AtMostOnce,
    /// Produces records without consuming any.
    Generator,
    /// Results may differ between runs; never deduplicated.
    Volatile,
    /// Cannot be partitioned across workers.
    Unpartitionable,
    /// Results must be reproducible for identical inputs.
    Deterministic,
}

/// Built-in operators provided by the compiler itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoreOperatorKind {
    Checkpoint,
    Project,
    Extend,
    Restructure,
}

impl CoreOperatorKind {
    pub fn symbol(self) -> &'static str {
        match self {
            CoreOperatorKind::Checkpoint => "checkpoint",
            CoreOperatorKind::Project => "project",
            CoreOperatorKind::Extend => "extend",
            CoreOperatorKind::Restructure => "restructure",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoreOperator {
    pub kind: CoreOperatorKind,
}

/// An operator backed by a routine declared in the user program.
#[derive(Debug, Clone, PartialEq)]
pub struct UserOperator {
    /// The operator annotation; its type is the operator's family identifier.
    pub annotation: AnnotationDescription,
    pub method: MethodDescription,
    pub implementation_class: ClassDescription,
}

/// An operator whose body is a nested graph (a flow part).
#[derive(Debug)]
pub struct FlowOperator {
    pub description_class: ClassDescription,
    pub graph: OperatorGraph,
}

/// Boundary placeholder: data entering the (nested) graph.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalInput {
    pub name: String,
    pub info: Option<ExternalInputInfo>,
}

impl ExternalInput {
    /// Name of the single output port.
    pub const PORT_NAME: &'static str = "port";
}

/// Boundary placeholder: data leaving the (nested) graph.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalOutput {
    pub name: String,
    pub info: Option<ExternalOutputInfo>,
}

impl ExternalOutput {
    /// Name of the single input port.
    pub const PORT_NAME: &'static str = "port";
}

#[derive(Debug)]
pub enum OperatorBody {
    Core(CoreOperator),
    User(UserOperator),
    Flow(FlowOperator),
    Input(ExternalInput),
    Output(ExternalOutput),
}

impl OperatorBody {
    fn copy(&self) -> OperatorBody {
        match self {
            OperatorBody::Core(c) => OperatorBody::Core(c.clone()),
            OperatorBody::User(u) => OperatorBody::User(u.clone()),
            OperatorBody::Flow(f) => OperatorBody::Flow(FlowOperator {
                description_class: f.description_class.clone(),
                graph: f.graph.copy(),
            }),
            OperatorBody::Input(i) => OperatorBody::Input(i.clone()),
            OperatorBody::Output(o) => OperatorBody::Output(o.clone()),
        }
    }
}

/// A node in the data-flow graph.
///
/// Operators are not `Clone`: an operator inside a graph holds edges that only
/// make sense in that graph. Use [`Operator::copy`] for a detached deep copy.
#[derive(Debug)]
pub struct Operator {
    body: OperatorBody,
    properties: Vec<OperatorProperty>,
    constraints: BTreeSet<OperatorConstraint>,
}

impl Operator {
    pub fn core(kind: CoreOperatorKind) -> OperatorBuilder {
        OperatorBuilder::new(OperatorBody::Core(CoreOperator { kind }))
    }

    pub fn user(
        annotation: AnnotationDescription,
        method: MethodDescription,
        implementation_class: ClassDescription,
    ) -> OperatorBuilder {
        OperatorBuilder::new(OperatorBody::User(UserOperator {
            annotation,
            method,
            implementation_class,
        }))
    }

    pub fn flow(description_class: ClassDescription, graph: OperatorGraph) -> OperatorBuilder {
        OperatorBuilder::new(OperatorBody::Flow(FlowOperator {
            description_class,
            graph,
        }))
    }

    /// An external input with its single output port.
    pub fn external_input(
        name: impl Into<String>,
        data_type: TypeDescription,
        info: Option<ExternalInputInfo>,
    ) -> Operator {
        let mut op = Operator::bare(OperatorBody::Input(ExternalInput {
            name: name.into(),
            info,
        }));
        op.properties.push(OperatorProperty::Output(OperatorOutput::new(
            ExternalInput::PORT_NAME,
            data_type,
        )));
        op
    }

    /// An external output with its single input port.
    pub fn external_output(
        name: impl Into<String>,
        data_type: TypeDescription,
        info: Option<ExternalOutputInfo>,
    ) -> Operator {
        let mut op = Operator::bare(OperatorBody::Output(ExternalOutput {
            name: name.into(),
            info,
        }));
        op.properties.push(OperatorProperty::Input(OperatorInput::new(
            ExternalOutput::PORT_NAME,
            data_type,
            None,
        )));
        op
    }

    fn bare(body: OperatorBody) -> Operator {
        Operator {
            body,
            properties: Vec::new(),
            constraints: BTreeSet::new(),
        }
    }

    pub fn kind(&self) -> OperatorKind {
        match &self.body {
            OperatorBody::Core(_) => OperatorKind::Core,
            OperatorBody::User(_) => OperatorKind::User,
            OperatorBody::Flow(_) => OperatorKind::Flow,
            OperatorBody::Input(_) => OperatorKind::Input,
            OperatorBody::Output(_) => OperatorKind::Output,
        }
    }

    pub fn body(&self) -> &OperatorBody {
        &self.body
    }

    pub fn into_body(self) -> OperatorBody {
        self.body
    }

    pub fn as_user(&self) -> Option<&UserOperator> {
        match &self.body {
            OperatorBody::User(u) => Some(u),
            _ => None,
        }
    }

    pub fn as_flow(&self) -> Option<&FlowOperator> {
        match &self.body {
            OperatorBody::Flow(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_external_input(&self) -> Option<&ExternalInput> {
        match &self.body {
            OperatorBody::Input(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_external_output(&self) -> Option<&ExternalOutput> {
        match &self.body {
            OperatorBody::Output(o) => Some(o),
            _ => None,
        }
    }

    pub fn core_kind(&self) -> Option<CoreOperatorKind> {
        match &self.body {
            OperatorBody::Core(c) => Some(c.kind),
            _ => None,
        }
    }

    /// All properties in declaration order.
    pub fn properties(&self) -> &[OperatorProperty] {
        &self.properties
    }

    pub fn property(&self, index: usize) -> Option<&OperatorProperty> {
        self.properties.get(index)
    }

    pub(crate) fn property_mut(&mut self, index: usize) -> Option<&mut OperatorProperty> {
        self.properties.get_mut(index)
    }

    pub fn inputs(&self) -> Vec<&OperatorInput> {
        self.properties
            .iter()
            .filter_map(|p| match p {
                OperatorProperty::Input(i) => Some(i),
                _ => None,
            })
            .collect()
    }

    pub fn outputs(&self) -> Vec<&OperatorOutput> {
        self.properties
            .iter()
            .filter_map(|p| match p {
                OperatorProperty::Output(o) => Some(o),
                _ => None,
            })
            .collect()
    }

    pub fn arguments(&self) -> Vec<&OperatorArgument> {
        self.properties
            .iter()
            .filter_map(|p| match p {
                OperatorProperty::Argument(a) => Some(a),
                _ => None,
            })
            .collect()
    }

    /// Property indices of the given kind, in declaration order.
    pub fn indices_of(&self, kind: PropertyKind) -> Vec<usize> {
        self.properties
            .iter()
            .enumerate()
            .filter(|(_, p)| p.kind() == kind)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn index_of(&self, kind: PropertyKind, name: &str) -> Option<usize> {
        self.properties
            .iter()
            .position(|p| p.kind() == kind && p.name() == name)
    }

    pub fn find_input(&self, name: &str) -> Option<&OperatorInput> {
        self.index_of(PropertyKind::Input, name)
            .and_then(|i| match &self.properties[i] {
                OperatorProperty::Input(p) => Some(p),
                _ => None,
            })
    }

    pub fn find_output(&self, name: &str) -> Option<&OperatorOutput> {
        self.index_of(PropertyKind::Output, name)
            .and_then(|i| match &self.properties[i] {
                OperatorProperty::Output(p) => Some(p),
                _ => None,
            })
    }

    pub fn find_argument(&self, name: &str) -> Option<&OperatorArgument> {
        self.index_of(PropertyKind::Argument, name)
            .and_then(|i| match &self.properties[i] {
                OperatorProperty::Argument(p) => Some(p),
                _ => None,
            })
    }

    pub fn constraints(&self) -> &BTreeSet<OperatorConstraint> {
        &self.constraints
    }

    pub fn has_constraint(&self, constraint: OperatorConstraint) -> bool {
        self.constraints.contains(&constraint)
    }

    /// True if any port of this operator has an edge.
    pub fn is_connected(&self) -> bool {
        self.properties.iter().any(|p| !p.opposites().is_empty())
    }

    /// A detached deep copy: same properties and constraints, no edges.
    /// Nested graphs of flow operators are copied recursively.
    pub fn copy(&self) -> Operator {
        Operator {
            body: self.body.copy(),
            properties: self.properties.iter().map(OperatorProperty::detached).collect(),
            constraints: self.constraints.clone(),
        }
    }

    /// Detached copy that additionally carries `constraints`.
    pub fn copy_with_constraints(
        &self,
        constraints: impl IntoIterator<Item = OperatorConstraint>,
    ) -> Operator {
        let mut copy = self.copy();
        copy.constraints.extend(constraints);
        copy
    }

    /// Copy that keeps the edge lists; only valid for the owning graph.
    pub(crate) fn copy_attached(&self) -> Operator {
        Operator {
            body: self.body.copy(),
            properties: self.properties.clone(),
            constraints: self.constraints.clone(),
        }
    }

    pub(crate) fn clear_edges(&mut self) {
        for p in &mut self.properties {
            if let Some(opposites) = p.opposites_mut() {
                opposites.clear();
            }
        }
    }

    /// Checks that property names are unique per property kind.
    pub fn check_property_names(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for p in &self.properties {
            if !seen.insert((p.kind(), p.name())) {
                return Err(Error::Structural(format!(
                    "duplicate {:?} property '{}' in {}",
                    p.kind(),
                    p.name(),
                    self
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.body {
            OperatorBody::Core(c) => write!(f, "Core({})", c.kind.symbol()),
            OperatorBody::User(u) => write!(
                f,
                "User({} {}#{})",
                u.annotation,
                u.method.declaring_class.simple_name(),
                u.method.name
            ),
            OperatorBody::Flow(fl) => write!(f, "Flow({})", fl.description_class.simple_name()),
            OperatorBody::Input(i) => write!(f, "Input({})", i.name),
            OperatorBody::Output(o) => write!(f, "Output({})", o.name),
        }
    }
}

/// Declares ports, arguments, and constraints of a new operator.
///
/// Connections are made later through [`OperatorGraph::connect`].
#[derive(Debug)]
pub struct OperatorBuilder {
    operator: Operator,
}

impl OperatorBuilder {
    fn new(body: OperatorBody) -> Self {
        Self {
            operator: Operator::bare(body),
        }
    }

    pub fn input(self, name: impl Into<String>, data_type: TypeDescription) -> Self {
        self.grouped_input(name, data_type, None)
    }

    pub fn grouped_input(
        mut self,
        name: impl Into<String>,
        data_type: TypeDescription,
        group: Option<Group>,
    ) -> Self {
        self.operator
            .properties
            .push(OperatorProperty::Input(OperatorInput::new(name, data_type, group)));
        self
    }

    pub fn output(mut self, name: impl Into<String>, data_type: TypeDescription) -> Self {
        self.operator
            .properties
            .push(OperatorProperty::Output(OperatorOutput::new(name, data_type)));
        self
    }

    pub fn argument(mut self, name: impl Into<String>, value: ValueDescription) -> Self {
        self.operator
            .properties
            .push(OperatorProperty::Argument(OperatorArgument::new(name, value)));
        self
    }

    pub fn constraint(mut self, constraint: OperatorConstraint) -> Self {
        self.operator.constraints.insert(constraint);
        self
    }

    pub fn constraints(mut self, constraints: impl IntoIterator<Item = OperatorConstraint>) -> Self {
        self.operator.constraints.extend(constraints);
        self
    }

    /// Finishes the operator; fails on duplicate property names.
    pub fn build(self) -> Result<Operator> {
        self.operator.check_property_names()?;
        Ok(self.operator)
    }
}
