//! Batch and jobflow structures, plus the references compilation produces.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use flowc_core::description::ClassDescription;
use flowc_core::diagnostic::Diagnostic;
use flowc_core::error::{Error, Result};
use flowc_core::hash::Hash256;
use flowc_core::location::Location;
use flowc_graph::{ExternalInputInfo, ExternalOutputInfo, OperatorGraph};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchParameter {
    pub key: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub mandatory: bool,
    /// Accepted value pattern, passed through to runtimes.
    #[serde(default)]
    pub pattern: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchInfo {
    pub batch_id: String,
    pub description_class: ClassDescription,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub parameters: Vec<BatchParameter>,
}

impl BatchInfo {
    pub fn new(batch_id: impl Into<String>, description_class: ClassDescription) -> Self {
        Self {
            batch_id: batch_id.into(),
            description_class,
            comment: None,
            parameters: Vec::new(),
        }
    }

    pub fn parameter(&self, key: &str) -> Option<&BatchParameter> {
        self.parameters.iter().find(|p| p.key == key)
    }
}

/// A unit of compilation: one operator graph.
#[derive(Debug)]
pub struct Jobflow {
    pub flow_id: String,
    pub description_class: ClassDescription,
    pub graph: OperatorGraph,
}

impl Jobflow {
    pub fn new(
        flow_id: impl Into<String>,
        description_class: ClassDescription,
        graph: OperatorGraph,
    ) -> Self {
        Self {
            flow_id: flow_id.into(),
            description_class,
            graph,
        }
    }
}

/// A jobflow inside a batch, with the jobflows that must finish before it.
#[derive(Debug)]
pub struct BatchElement {
    pub jobflow: Jobflow,
    pub blockers: Vec<String>,
}

#[derive(Debug)]
pub struct Batch {
    pub info: BatchInfo,
    pub elements: Vec<BatchElement>,
}

impl Batch {
    pub fn new(info: BatchInfo) -> Self {
        Self {
            info,
            elements: Vec::new(),
        }
    }

    pub fn add(&mut self, jobflow: Jobflow, blockers: Vec<String>) {
        self.elements.push(BatchElement { jobflow, blockers });
    }

    pub fn find(&self, flow_id: &str) -> Option<&BatchElement> {
        self.elements.iter().find(|e| e.jobflow.flow_id == flow_id)
    }

    /// Element indices in blocker order; declaration order breaks ties.
    pub fn jobflow_order(&self) -> Result<Vec<usize>> {
        let mut index = BTreeMap::new();
        for (i, e) in self.elements.iter().enumerate() {
            if index.insert(e.jobflow.flow_id.as_str(), i).is_some() {
                return Err(Error::Structural(format!(
                    "duplicate jobflow '{}' in batch {}",
                    e.jobflow.flow_id, self.info.batch_id
                )));
            }
        }

        let mut pending: Vec<BTreeSet<usize>> = Vec::with_capacity(self.elements.len());
        for e in &self.elements {
            let mut deps = BTreeSet::new();
            for blocker in &e.blockers {
                let Some(&i) = index.get(blocker.as_str()) else {
                    return Err(Error::Structural(format!(
                        "jobflow '{}' is blocked by unknown jobflow '{blocker}'",
                        e.jobflow.flow_id
                    )));
                };
                deps.insert(i);
            }
            pending.push(deps);
        }

        let mut done = vec![false; self.elements.len()];
        let mut order = Vec::with_capacity(self.elements.len());
        while order.len() < self.elements.len() {
            let next = (0..self.elements.len())
                .find(|i| !done[*i] && pending[*i].iter().all(|d| done[*d]));
            let Some(i) = next else {
                let cyclic: Vec<&str> = (0..self.elements.len())
                    .filter(|i| !done[*i])
                    .map(|i| self.elements[i].jobflow.flow_id.as_str())
                    .collect();
                return Err(Error::Structural(format!(
                    "cyclic jobflow blockers: {}",
                    cyclic.join(", ")
                )));
            };
            done[i] = true;
            order.push(i);
        }
        Ok(order)
    }
}

/// Execution phases of a compiled jobflow, in run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Initialize,
    Import,
    Prologue,
    Main,
    Epilogue,
    Export,
    Finalize,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Initialize => "initialize",
            Phase::Import => "import",
            Phase::Prologue => "prologue",
            Phase::Main => "main",
            Phase::Epilogue => "epilogue",
            Phase::Export => "export",
            Phase::Finalize => "finalize",
        })
    }
}

/// A task emitted by a backend: which module runs which resource, when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskReference {
    pub phase: Phase,
    pub module: String,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalInputReference {
    pub name: String,
    pub info: Option<ExternalInputInfo>,
    /// Where the runtime finds the imported data.
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalOutputReference {
    pub name: String,
    pub info: Option<ExternalOutputInfo>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobflowReference {
    pub flow_id: String,
    pub tasks: Vec<TaskReference>,
    #[serde(default)]
    pub plan_hash: Option<Hash256>,
}

impl JobflowReference {
    /// Tasks of one phase, in registration order.
    pub fn tasks_of(&self, phase: Phase) -> impl Iterator<Item = &TaskReference> {
        self.tasks.iter().filter(move |t| t.phase == phase)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReference {
    pub batch_id: String,
    /// In compilation (blocker) order.
    pub jobflows: Vec<JobflowReference>,
    pub resources: Vec<Location>,
    pub diagnostics: Vec<Diagnostic>,
}

impl BatchReference {
    pub fn jobflow(&self, flow_id: &str) -> Option<&JobflowReference> {
        self.jobflows.iter().find(|j| j.flow_id == flow_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(specs: &[(&str, &[&str])]) -> Batch {
        let mut b = Batch::new(BatchInfo::new("b", ClassDescription::new("x.Batch")));
        for (id, blockers) in specs {
            b.add(
                Jobflow::new(*id, ClassDescription::new("x.Flow"), OperatorGraph::new()),
                blockers.iter().map(|s| s.to_string()).collect(),
            );
        }
        b
    }

    #[test]
    fn test_blocker_order() {
        let b = batch(&[("c", &["a", "b"]), ("a", &[]), ("b", &["a"])]);
        assert_eq!(b.jobflow_order().unwrap(), vec![1, 2, 0]);
    }

    #[test]
    fn test_unknown_blocker() {
        let b = batch(&[("a", &["ghost"])]);
        assert!(b.jobflow_order().unwrap_err().is_structural());
    }

    #[test]
    fn test_cyclic_blockers() {
        let b = batch(&[("a", &["b"]), ("b", &["a"])]);
        let err = b.jobflow_order().unwrap_err();
        assert!(err.to_string().contains("cyclic jobflow blockers: a, b"));
    }
}
