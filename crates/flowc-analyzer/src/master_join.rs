//! Capability protocol of the master-join operator family.
//!
//! A master-join operator pairs each transaction record with a master record
//! of the same key. When several masters match, an optional selection routine
//! (named by the operator annotation's `selection` element) picks one.

use std::fmt;

use flowc_core::description::ClassDescription;
use flowc_core::description::MethodDescription;
use flowc_core::error::{Error, Result};
use flowc_graph::Operator;
use tracing::trace;

use crate::context::LoadContext;

/// Package holding the operator annotation types.
pub const VOCABULARY_PACKAGE: &str = "flowc.vocabulary.operator";

/// Marker carried by selection routines.
pub const MASTER_SELECTION: &str = "flowc.vocabulary.operator.MasterSelection";

/// Annotation element naming the selection routine.
pub const SELECTION_ELEMENT: &str = "selection";

/// Selection value meaning "no selection routine".
pub const NO_SELECTION: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MasterJoinKind {
    MasterJoin,
    MasterCheck,
    MasterBranch,
    MasterJoinUpdate,
}

impl MasterJoinKind {
    pub const ALL: [MasterJoinKind; 4] = [
        MasterJoinKind::MasterJoin,
        MasterJoinKind::MasterCheck,
        MasterJoinKind::MasterBranch,
        MasterJoinKind::MasterJoinUpdate,
    ];

    pub fn simple_name(self) -> &'static str {
        match self {
            MasterJoinKind::MasterJoin => "MasterJoin",
            MasterJoinKind::MasterCheck => "MasterCheck",
            MasterJoinKind::MasterBranch => "MasterBranch",
            MasterJoinKind::MasterJoinUpdate => "MasterJoinUpdate",
        }
    }

    /// The annotation type identifying this family member.
    pub fn annotation_class(self) -> ClassDescription {
        ClassDescription::new(format!("{VOCABULARY_PACKAGE}.{}", self.simple_name()))
    }

    pub fn from_annotation(class: &ClassDescription) -> Option<Self> {
        if class.package_name() != Some(VOCABULARY_PACKAGE) {
            return None;
        }
        Self::ALL
            .into_iter()
            .find(|k| k.simple_name() == class.simple_name())
    }

    /// The family member of a user operator, if any.
    pub fn of(operator: &Operator) -> Option<Self> {
        let user = operator.as_user()?;
        Self::from_annotation(user.annotation.declaring_class())
    }
}

impl fmt::Display for MasterJoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.simple_name())
    }
}

/// Whether the operator is a user operator of the master-join family.
pub fn is_supported(operator: &Operator) -> bool {
    MasterJoinKind::of(operator).is_some()
}

/// Resolves the master selection routine of a master-join family operator.
///
/// Returns `Ok(None)` for the explicit no-selection value. A missing
/// `selection` element is an inconsistent operator, not "no selection".
pub fn resolve_selection(
    context: &dyn LoadContext,
    operator: &Operator,
) -> Result<Option<MethodDescription>> {
    let user = match (operator.as_user(), is_supported(operator)) {
        (Some(user), true) => user,
        _ => {
            return Err(Error::InvalidArgument(format!(
                "{operator} is not a master-join family operator"
            )))
        }
    };

    let raw = user.annotation.element(SELECTION_ELEMENT).ok_or_else(|| {
        Error::InconsistentState(format!(
            "missing master selection method name: {}",
            user.method
        ))
    })?;
    let resolved = context.resolve_value(raw)?;
    let Some(selection) = resolved.as_str() else {
        return Err(Error::InconsistentState(format!(
            "inconsistent master selection method name: {} ({})",
            resolved, user.method
        )));
    };
    if selection == NO_SELECTION {
        trace!(method = %user.method, "no master selection");
        return Ok(None);
    }

    let declaring = &user.method.declaring_class;
    let marker = ClassDescription::new(MASTER_SELECTION);
    let found = context
        .routines(declaring)?
        .into_iter()
        .find(|r| r.name == selection && r.has_marker(&marker));
    match found {
        Some(routine) => {
            let method = routine.to_method(declaring);
            trace!(method = %user.method, selection = %method, "resolved master selection");
            Ok(Some(method))
        }
        None => Err(Error::NotFound(format!(
            "missing master selection target method: {}#{} -> {}",
            declaring, user.method.name, selection
        ))),
    }
}
