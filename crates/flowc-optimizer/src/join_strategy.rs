//! Join strategy selection for the master-join family.

use std::fmt;

use flowc_analyzer::{is_supported, MasterJoinKind};
use flowc_core::diagnostic::Diagnostic;
use flowc_core::id::OperatorId;
use flowc_graph::{Operator, OperatorConstraint};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::characterizer::{
    CharacterizerChain, CharacterizerContext, ConstantCharacterizer, OperatorCharacterizer,
};
use crate::estimate::SizeClass;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinStrategy {
    /// Ship the master side to every worker.
    Broadcast,
    /// Shuffle both sides by key.
    Partitioned,
    NotApplicable,
}

impl fmt::Display for JoinStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JoinStrategy::Broadcast => "broadcast",
            JoinStrategy::Partitioned => "partitioned",
            JoinStrategy::NotApplicable => "n/a",
        })
    }
}

/// Broadcasts the master input when it is estimated tiny, partitions
/// otherwise. The master input is the operator's first input.
#[derive(Debug, Clone, Copy, Default)]
pub struct JoinStrategyCharacterizer;

impl JoinStrategyCharacterizer {
    /// This characterizer in front of a `NotApplicable` default.
    pub fn chain() -> CharacterizerChain<JoinStrategy> {
        CharacterizerChain::new(ConstantCharacterizer(JoinStrategy::NotApplicable))
            .with(JoinStrategyCharacterizer)
    }
}

impl OperatorCharacterizer<JoinStrategy> for JoinStrategyCharacterizer {
    fn supports(&self, operator: &Operator) -> bool {
        is_supported(operator)
    }

    fn characterize(&self, ctx: &mut dyn CharacterizerContext, operator: OperatorId) -> JoinStrategy {
        let Some((kind, master, unpartitionable, label)) = ctx.graph().get(operator).and_then(|op| {
            let kind = MasterJoinKind::of(op)?;
            let master = op.inputs().first()?.name().to_string();
            Some((
                kind,
                master,
                op.has_constraint(OperatorConstraint::Unpartitionable),
                op.to_string(),
            ))
        }) else {
            return JoinStrategy::NotApplicable;
        };

        let size = ctx.estimate(operator).input_size(&master);
        let class = size
            .map(|bytes| SizeClass::of_bytes(bytes, ctx.options()))
            .unwrap_or(SizeClass::Unknown);

        let strategy = if class == SizeClass::Tiny {
            JoinStrategy::Broadcast
        } else if unpartitionable {
            ctx.report(
                operator,
                Diagnostic::error(format!(
                    "{label} cannot be partitioned but its master input '{master}' is not known to be tiny ({class})"
                )),
            );
            JoinStrategy::Broadcast
        } else {
            JoinStrategy::Partitioned
        };
        trace!(operator = %label, %kind, master_size = %class, %strategy, "join strategy");
        strategy
    }
}
