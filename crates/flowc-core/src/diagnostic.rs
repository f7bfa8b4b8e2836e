//! Leveled diagnostics and the error that carries them.
//!
//! Every fatal diagnostic names enough identity (batch, jobflow, operator,
//! routine) to locate the offending declaration. How diagnostics are shown
//! is up to the sink.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Error,
    Warn,
    Info,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
        })
    }
}

/// The source entity a diagnostic is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "entity")]
pub enum EntityRef {
    Batch {
        batch_id: String,
    },
    Jobflow {
        batch_id: String,
        flow_id: String,
    },
    Operator {
        batch_id: String,
        flow_id: String,
        operator: String,
    },
}

impl EntityRef {
    pub fn batch(batch_id: impl Into<String>) -> Self {
        EntityRef::Batch {
            batch_id: batch_id.into(),
        }
    }

    pub fn jobflow(batch_id: impl Into<String>, flow_id: impl Into<String>) -> Self {
        EntityRef::Jobflow {
            batch_id: batch_id.into(),
            flow_id: flow_id.into(),
        }
    }

    /// Narrows a jobflow (or batch) reference down to one operator.
    pub fn operator(&self, operator: impl Into<String>) -> Self {
        let (batch_id, flow_id) = match self {
            EntityRef::Batch { batch_id } => (batch_id.clone(), String::new()),
            EntityRef::Jobflow { batch_id, flow_id }
            | EntityRef::Operator {
                batch_id, flow_id, ..
            } => (batch_id.clone(), flow_id.clone()),
        };
        EntityRef::Operator {
            batch_id,
            flow_id,
            operator: operator.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Batch { batch_id } => write!(f, "batch={batch_id}"),
            EntityRef::Jobflow { batch_id, flow_id } => {
                write!(f, "batch={batch_id}, jobflow={flow_id}")
            }
            EntityRef::Operator {
                batch_id,
                flow_id,
                operator,
            } => write!(f, "batch={batch_id}, jobflow={flow_id}, operator={operator}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub level: Level,
    pub message: String,
    #[serde(default)]
    pub entity: Option<EntityRef>,
}

impl Diagnostic {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            entity: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Level::Error, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(Level::Warn, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Level::Info, message)
    }

    pub fn with_entity(mut self, entity: EntityRef) -> Self {
        self.entity = Some(entity);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.entity {
            Some(entity) => write!(f, "[{}] {} ({})", self.level, self.message, entity),
            None => write!(f, "[{}] {}", self.level, self.message),
        }
    }
}

/// A failure described by one or more diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticError {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticError {
    pub fn new(diagnostics: Vec<Diagnostic>) -> Self {
        Self { diagnostics }
    }

    pub fn single(diagnostic: Diagnostic) -> Self {
        Self::new(vec![diagnostic])
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

impl fmt::Display for DiagnosticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.diagnostics.as_slice() {
            [] => f.write_str("compilation failed"),
            [only] => write!(f, "{only}"),
            [first, rest @ ..] => write!(f, "{first} (and {} more)", rest.len()),
        }
    }
}

impl std::error::Error for DiagnosticError {}

/// Receives diagnostics as they are produced.
pub trait DiagnosticSink {
    fn report(&mut self, diagnostic: Diagnostic);
}

impl DiagnosticSink for Vec<Diagnostic> {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.push(diagnostic);
    }
}
