//! Compiler participants: hooks around batch and jobflow compilation.

use std::collections::BTreeSet;

use flowc_core::description::ValueDescription;
use flowc_core::diagnostic::{Diagnostic, EntityRef};
use flowc_core::error::Result;
use flowc_graph::OperatorGraph;
use tracing::debug;

use crate::context::CompilerContext;
use crate::model::{Batch, BatchInfo, BatchReference, Jobflow, JobflowReference};

/// Observes compilation. Every hook defaults to a no-op; a returned error
/// fails the enclosing unit.
pub trait CompilerParticipant {
    fn before_batch(&self, _ctx: &mut CompilerContext, _batch: &Batch) -> Result<()> {
        Ok(())
    }

    fn after_batch(
        &self,
        _ctx: &mut CompilerContext,
        _batch: &Batch,
        _reference: &BatchReference,
    ) -> Result<()> {
        Ok(())
    }

    fn before_jobflow(
        &self,
        _ctx: &mut CompilerContext,
        _batch: &BatchInfo,
        _jobflow: &Jobflow,
    ) -> Result<()> {
        Ok(())
    }

    fn after_jobflow(
        &self,
        _ctx: &mut CompilerContext,
        _batch: &BatchInfo,
        _jobflow: &Jobflow,
        _reference: &JobflowReference,
    ) -> Result<()> {
        Ok(())
    }
}

/// Runs participants in registration order; after-hooks run in reverse.
#[derive(Default)]
pub struct CompositeParticipant {
    elements: Vec<Box<dyn CompilerParticipant>>,
}

impl CompositeParticipant {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, participant: impl CompilerParticipant + 'static) -> Self {
        self.elements.push(Box::new(participant));
        self
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl CompilerParticipant for CompositeParticipant {
    fn before_batch(&self, ctx: &mut CompilerContext, batch: &Batch) -> Result<()> {
        for p in &self.elements {
            p.before_batch(ctx, batch)?;
        }
        Ok(())
    }

    fn after_batch(
        &self,
        ctx: &mut CompilerContext,
        batch: &Batch,
        reference: &BatchReference,
    ) -> Result<()> {
        for p in self.elements.iter().rev() {
            p.after_batch(ctx, batch, reference)?;
        }
        Ok(())
    }

    fn before_jobflow(
        &self,
        ctx: &mut CompilerContext,
        batch: &BatchInfo,
        jobflow: &Jobflow,
    ) -> Result<()> {
        for p in &self.elements {
            p.before_jobflow(ctx, batch, jobflow)?;
        }
        Ok(())
    }

    fn after_jobflow(
        &self,
        ctx: &mut CompilerContext,
        batch: &BatchInfo,
        jobflow: &Jobflow,
        reference: &JobflowReference,
    ) -> Result<()> {
        for p in self.elements.iter().rev() {
            p.after_jobflow(ctx, batch, jobflow, reference)?;
        }
        Ok(())
    }
}

/// Batch parameters referenced as `${name}` somewhere in the batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImplicitParameterList {
    names: BTreeSet<String>,
}

impl ImplicitParameterList {
    pub fn of(batch: &Batch) -> Self {
        let mut names = BTreeSet::new();
        for element in &batch.elements {
            collect_graph(&element.jobflow.graph, &mut names);
        }
        Self { names }
    }

    pub fn names(&self) -> &BTreeSet<String> {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}

fn collect_graph(graph: &OperatorGraph, names: &mut BTreeSet<String>) {
    for (_, op) in graph.iter() {
        for arg in op.arguments() {
            collect_value(arg.value(), names);
        }
        if let Some(info) = op.as_external_input().and_then(|i| i.info.as_ref()) {
            if let Some(contents) = &info.contents {
                collect_value(contents, names);
            }
        }
        if let Some(info) = op.as_external_output().and_then(|o| o.info.as_ref()) {
            if let Some(contents) = &info.contents {
                collect_value(contents, names);
            }
        }
        if let Some(flow) = op.as_flow() {
            collect_graph(&flow.graph, names);
        }
    }
}

fn collect_value(value: &ValueDescription, names: &mut BTreeSet<String>) {
    for s in value.strings() {
        names.extend(placeholders(s));
    }
}

/// Names of `${name}` placeholders in `text`, in order of appearance.
pub fn placeholders(text: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else { break };
        let name = after[..end].trim();
        if !name.is_empty() {
            found.push(name.to_string());
        }
        rest = &after[end + 1..];
    }
    found
}

/// Registers the [`ImplicitParameterList`] extension before the batch
/// compiles, warning about parameters the batch does not declare.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImplicitParameterListParticipant;

impl CompilerParticipant for ImplicitParameterListParticipant {
    fn before_batch(&self, ctx: &mut CompilerContext, batch: &Batch) -> Result<()> {
        let list = ImplicitParameterList::of(batch);
        for name in list.names() {
            if batch.info.parameter(name).is_none() {
                ctx.report(
                    Diagnostic::warn(format!(
                        "batch parameter '{name}' is referenced but not declared"
                    ))
                    .with_entity(EntityRef::batch(&batch.info.batch_id)),
                );
            }
        }
        debug!(parameters = list.names().len(), "implicit parameters collected");
        ctx.register_extension(list);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use flowc_analyzer::DeclarationTable;
    use flowc_core::config::CompilerConfig;
    use flowc_core::description::{ClassDescription, TypeDescription};
    use flowc_core::Level;
    use flowc_graph::{CoreOperatorKind, Operator};

    use crate::model::BatchParameter;

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders("a/${date}/${ region }/x"), vec!["date", "region"]);
        assert!(placeholders("${}").is_empty());
        assert!(placeholders("${open").is_empty());
    }

    struct Recorder(&'static str, Rc<RefCell<Vec<String>>>);

    impl CompilerParticipant for Recorder {
        fn before_batch(&self, _: &mut CompilerContext, _: &Batch) -> Result<()> {
            self.1.borrow_mut().push(format!("before:{}", self.0));
            Ok(())
        }

        fn after_batch(&self, _: &mut CompilerContext, _: &Batch, _: &BatchReference) -> Result<()> {
            self.1.borrow_mut().push(format!("after:{}", self.0));
            Ok(())
        }
    }

    fn batch() -> Batch {
        let mut info = BatchInfo::new("b", ClassDescription::new("x.Batch"));
        info.parameters.push(BatchParameter {
            key: "date".into(),
            comment: None,
            mandatory: true,
            pattern: None,
        });
        let mut graph = OperatorGraph::new();
        graph.add(
            Operator::core(CoreOperatorKind::Extend)
                .output("out", TypeDescription::class("x.M"))
                .argument("path", ValueDescription::string("in/${date}/${region}"))
                .build()
                .unwrap(),
        );
        let mut b = Batch::new(info);
        b.add(Jobflow::new("f", ClassDescription::new("x.F"), graph), vec![]);
        b
    }

    #[test]
    fn test_composite_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let composite = CompositeParticipant::new()
            .with(Recorder("a", log.clone()))
            .with(Recorder("b", log.clone()));
        let mut ctx = CompilerContext::new(CompilerConfig::default(), DeclarationTable::new());
        let b = batch();
        let reference = BatchReference {
            batch_id: "b".into(),
            jobflows: vec![],
            resources: vec![],
            diagnostics: vec![],
        };
        composite.before_batch(&mut ctx, &b).unwrap();
        composite.after_batch(&mut ctx, &b, &reference).unwrap();
        assert_eq!(
            *log.borrow(),
            vec!["before:a", "before:b", "after:b", "after:a"]
        );
    }

    #[test]
    fn test_implicit_parameters() {
        let mut ctx = CompilerContext::new(CompilerConfig::default(), DeclarationTable::new());
        ImplicitParameterListParticipant
            .before_batch(&mut ctx, &batch())
            .unwrap();
        let list = ctx.extension::<ImplicitParameterList>().unwrap();
        assert!(list.contains("date") && list.contains("region"));
        let warnings: Vec<_> = ctx
            .diagnostics()
            .iter()
            .filter(|d| d.level == Level::Warn)
            .collect();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("'region'"));
    }
}
