//! Operator properties: input/output ports and constant arguments.
//!
//! Ports are owned by exactly one operator. The edge lists (`opposites`) are
//! maintained by `OperatorGraph` only; a port outside a graph has none.

use flowc_core::description::{TypeDescription, ValueDescription};
use flowc_core::id::PortRef;

use crate::group::Group;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PropertyKind {
    Input,
    Output,
    Argument,
}

#[derive(Debug, Clone)]
pub struct OperatorInput {
    name: String,
    data_type: TypeDescription,
    group: Option<Group>,
    /// Upstream outputs (fan-in is a merge).
    pub(crate) opposites: Vec<PortRef>,
}

impl OperatorInput {
    pub fn new(name: impl Into<String>, data_type: TypeDescription, group: Option<Group>) -> Self {
        Self {
            name: name.into(),
            data_type,
            group,
            opposites: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> &TypeDescription {
        &self.data_type
    }

    pub fn group(&self) -> Option<&Group> {
        self.group.as_ref()
    }

    pub fn opposites(&self) -> &[PortRef] {
        &self.opposites
    }

    pub fn is_connected(&self) -> bool {
        !self.opposites.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct OperatorOutput {
    name: String,
    data_type: TypeDescription,
    /// Downstream inputs.
    pub(crate) opposites: Vec<PortRef>,
}

impl OperatorOutput {
    pub fn new(name: impl Into<String>, data_type: TypeDescription) -> Self {
        Self {
            name: name.into(),
            data_type,
            opposites: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> &TypeDescription {
        &self.data_type
    }

    pub fn opposites(&self) -> &[PortRef] {
        &self.opposites
    }

    pub fn is_connected(&self) -> bool {
        !self.opposites.is_empty()
    }
}

/// A named constant bound to an operator; not part of the data flow.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorArgument {
    name: String,
    value: ValueDescription,
}

impl OperatorArgument {
    pub fn new(name: impl Into<String>, value: ValueDescription) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &ValueDescription {
        &self.value
    }
}

#[derive(Debug, Clone)]
pub enum OperatorProperty {
    Input(OperatorInput),
    Output(OperatorOutput),
    Argument(OperatorArgument),
}

impl OperatorProperty {
    pub fn name(&self) -> &str {
        match self {
            OperatorProperty::Input(p) => p.name(),
            OperatorProperty::Output(p) => p.name(),
            OperatorProperty::Argument(p) => p.name(),
        }
    }

    pub fn kind(&self) -> PropertyKind {
        match self {
            OperatorProperty::Input(_) => PropertyKind::Input,
            OperatorProperty::Output(_) => PropertyKind::Output,
            OperatorProperty::Argument(_) => PropertyKind::Argument,
        }
    }

    /// Edges held by this property; arguments have none.
    pub fn opposites(&self) -> &[PortRef] {
        match self {
            OperatorProperty::Input(p) => &p.opposites,
            OperatorProperty::Output(p) => &p.opposites,
            OperatorProperty::Argument(_) => &[],
        }
    }

    pub(crate) fn opposites_mut(&mut self) -> Option<&mut Vec<PortRef>> {
        match self {
            OperatorProperty::Input(p) => Some(&mut p.opposites),
            OperatorProperty::Output(p) => Some(&mut p.opposites),
            OperatorProperty::Argument(_) => None,
        }
    }

    /// A copy of this property without edges.
    pub(crate) fn detached(&self) -> OperatorProperty {
        let mut copy = self.clone();
        if let Some(opposites) = copy.opposites_mut() {
            opposites.clear();
        }
        copy
    }
}
