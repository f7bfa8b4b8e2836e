#![forbid(unsafe_code)]
//! flowc-graph: the operator graph intermediate representation.
//!
//! Design:
//! - `Operator` is a tagged union over {Core, User, Flow, ExternalInput,
//!   ExternalOutput}; consumers match exhaustively.
//! - Operators live in an `OperatorGraph` arena and are addressed by
//!   `OperatorId`. An edge is a pair of back-references (`PortRef`) held by
//!   the two ports it joins; it has no identity of its own.
//! - An operator outside a graph is always detached (no edges), so moving
//!   operators between graphs never aliases state.
//! - `flatten` inlines nested flow operators bottom-up and rejects cyclic
//!   nesting up front.

pub mod external;
pub mod flatten;
pub mod graph;
pub mod group;
pub mod operator;
pub mod port;

pub use external::{DataSize, ExternalInputInfo, ExternalOutputInfo};
pub use graph::OperatorGraph;
pub use group::{Direction, Group, Ordering};
pub use operator::{
    CoreOperator, CoreOperatorKind, ExternalInput, ExternalOutput, FlowOperator, Operator,
    OperatorBody, OperatorBuilder, OperatorConstraint, OperatorKind, UserOperator,
};
pub use port::{OperatorArgument, OperatorInput, OperatorOutput, OperatorProperty, PropertyKind};
