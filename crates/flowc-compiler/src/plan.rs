//! Reference backend: records a deterministic JSON plan per jobflow.
//!
//! Resources:
//! - `jobflows/<flow_id>/plan.json`: operators in topological order with
//!   upstream links, estimates, join strategies, and selection routines
//! - `jobflows/<flow_id>/ports.json`: registered external inputs/outputs
//! - `batch.json`: jobflow order, plan hashes, and tasks

use std::collections::BTreeMap;
use std::io;

use flowc_analyzer::{is_supported, resolve_selection};
use flowc_core::diagnostic::Diagnostic;
use flowc_core::error::Error;
use flowc_core::hash::{hash_serde, Hash256};
use flowc_core::id::OperatorId;
use flowc_core::location::Location;
use flowc_graph::{OperatorGraph, OperatorKind};
use flowc_optimizer::JoinStrategy;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::{
    jobflow_location, BatchProcessorContext, ExternalPortProcessorContext, JobflowProcessorContext,
};
use crate::model::{BatchReference, ExternalInputReference, ExternalOutputReference, Jobflow, Phase};
use crate::processor::{BatchProcessor, ExternalPortProcessor, JobflowProcessor};

/// Module name of plan tasks.
pub const PLAN_MODULE: &str = "plan";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedOperator {
    /// Position in the plan; upstream links refer to it.
    pub index: usize,
    pub label: String,
    pub kind: OperatorKind,
    pub upstreams: Vec<usize>,
    #[serde(default)]
    pub estimates: BTreeMap<String, String>,
    #[serde(default)]
    pub join_strategy: Option<JoinStrategy>,
    #[serde(default)]
    pub master_selection: Option<String>,
}

/// The hashed part of a plan: independent of the build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanBody {
    pub flow_id: String,
    pub operators: Vec<PlannedOperator>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobflowPlan {
    pub build_id: String,
    pub compiler_version: String,
    pub plan_hash: Hash256,
    #[serde(flatten)]
    pub body: PlanBody,
}

fn to_io(error: Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, error.to_string())
}

fn to_json<T: Serialize>(value: &T) -> io::Result<Vec<u8>> {
    serde_json::to_vec_pretty(value).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PlanBackend;

impl PlanBackend {
    /// Builds the plan body for an already rewritten graph, reporting
    /// optimizer and selection diagnostics through `ctx`.
    fn plan(ctx: &mut JobflowProcessorContext<'_>, graph: &OperatorGraph) -> io::Result<PlanBody> {
        let order = graph.topological_order().map_err(to_io)?;
        let position: BTreeMap<OperatorId, usize> =
            order.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        let report = ctx.optimizer().analyze(graph, Some(ctx.entity()));
        let mut selections = BTreeMap::new();
        let mut problems = report.diagnostics.clone();
        for (id, op) in graph.iter().filter(|(_, op)| is_supported(op)) {
            match resolve_selection(ctx.load_context(), op) {
                Ok(Some(method)) => {
                    selections.insert(id, method.to_string());
                }
                Ok(None) => {}
                Err(e) => problems.push(
                    Diagnostic::error(e.to_string()).with_entity(ctx.entity().operator(op.to_string())),
                ),
            }
        }
        for d in problems {
            ctx.report(d);
        }

        let mut operators = Vec::with_capacity(order.len());
        for (index, id) in order.iter().enumerate() {
            let Some(op) = graph.get(*id) else { continue };
            let estimates = report
                .estimates
                .get(id)
                .map(|e| e.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
                .unwrap_or_default();
            operators.push(PlannedOperator {
                index,
                label: op.to_string(),
                kind: op.kind(),
                upstreams: graph
                    .upstreams(*id)
                    .iter()
                    .filter_map(|up| position.get(up).copied())
                    .collect(),
                estimates,
                join_strategy: report.join_strategies.get(id).copied(),
                master_selection: selections.remove(id),
            });
        }
        Ok(PlanBody {
            flow_id: ctx.flow_id().to_string(),
            operators,
        })
    }
}

impl JobflowProcessor for PlanBackend {
    fn process(&self, ctx: &mut JobflowProcessorContext<'_>, jobflow: &Jobflow) -> io::Result<()> {
        let mut graph = jobflow.graph.copy();
        if ctx.options().rewrite {
            let changes = ctx.optimizer().rewrite(&mut graph).map_err(to_io)?;
            debug!(changes, "graph rewritten");
        }

        let body = Self::plan(ctx, &graph)?;
        let plan_hash = hash_serde(&body).map_err(to_io)?;
        let plan = JobflowPlan {
            build_id: ctx.options().build_id.clone(),
            compiler_version: flowc_core::VERSION.to_string(),
            plan_hash,
            body,
        };

        let location = jobflow_location(ctx.flow_id()).append("plan.json");
        ctx.add_resource(location.clone(), to_json(&plan)?)?;
        ctx.add_task(Phase::Main, PLAN_MODULE, location);
        ctx.set_plan_hash(plan_hash);

        for (_, op) in graph.iter() {
            if let Some(input) = op.as_external_input() {
                ctx.add_external_input(input.name.clone(), input.info.clone())?;
            } else if let Some(output) = op.as_external_output() {
                ctx.add_external_output(output.name.clone(), output.info.clone())?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct PortsDocument<'a> {
    flow_id: &'a str,
    inputs: &'a [ExternalInputReference],
    outputs: &'a [ExternalOutputReference],
}

impl ExternalPortProcessor for PlanBackend {
    fn process(
        &self,
        ctx: &mut ExternalPortProcessorContext<'_>,
        inputs: &[ExternalInputReference],
        outputs: &[ExternalOutputReference],
    ) -> io::Result<()> {
        let flow_id = ctx.flow_id().to_string();
        let location = jobflow_location(&flow_id).append("ports.json");
        let doc = PortsDocument {
            flow_id: &flow_id,
            inputs,
            outputs,
        };
        ctx.add_resource(location.clone(), to_json(&doc)?)?;

        // one task per module and direction
        let mut imports: Vec<&str> = inputs
            .iter()
            .map(|i| i.info.as_ref().map_or("internal", |info| info.module_name.as_str()))
            .collect();
        imports.sort_unstable();
        imports.dedup();
        let mut exports: Vec<&str> = outputs
            .iter()
            .map(|o| o.info.as_ref().map_or("internal", |info| info.module_name.as_str()))
            .collect();
        exports.sort_unstable();
        exports.dedup();

        for module in imports {
            ctx.add_task(Phase::Import, module, location.clone());
        }
        for module in exports {
            ctx.add_task(Phase::Export, module, location.clone());
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct BatchDocument<'a> {
    batch_id: &'a str,
    build_id: &'a str,
    compiler_version: &'a str,
    jobflows: &'a [crate::model::JobflowReference],
}

impl BatchProcessor for PlanBackend {
    fn process(&self, ctx: &mut BatchProcessorContext<'_>, batch: &BatchReference) -> io::Result<()> {
        let build_id = ctx.options().build_id.clone();
        let doc = BatchDocument {
            batch_id: &batch.batch_id,
            build_id: &build_id,
            compiler_version: flowc_core::VERSION,
            jobflows: &batch.jobflows,
        };
        ctx.add_resource(Location::root("batch.json"), to_json(&doc)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowc_analyzer::master_join::{MASTER_SELECTION, SELECTION_ELEMENT};
    use flowc_analyzer::{DeclarationTable, MasterJoinKind, RoutineInfo};
    use flowc_core::config::CompilerConfig;
    use flowc_core::description::{
        AnnotationDescription, ClassDescription, MethodDescription, TypeDescription, ValueDescription,
    };
    use flowc_core::Level;
    use flowc_graph::{ExternalInput, ExternalOutput, Operator};

    use crate::batch::BatchCompiler;
    use crate::context::CompilerContext;
    use crate::model::{Batch, BatchInfo};
    use crate::processor::CompilerTools;

    const OPS: &str = "com.example.StockOps";

    fn join_flow(selection: &str) -> Jobflow {
        let mut graph = OperatorGraph::new();
        let items = graph.add(Operator::external_input(
            "items",
            TypeDescription::class("com.example.Item"),
            None,
        ));
        let orders = graph.add(Operator::external_input(
            "orders",
            TypeDescription::class("com.example.Order"),
            None,
        ));
        let join = graph.add(
            Operator::user(
                AnnotationDescription::marker(MasterJoinKind::MasterJoin.annotation_class())
                    .with_element(SELECTION_ELEMENT, ValueDescription::string(selection)),
                MethodDescription::new(ClassDescription::new(OPS), "joinStock"),
                ClassDescription::new("com.example.StockOpsImpl"),
            )
            .input("master", TypeDescription::class("com.example.Item"))
            .input("tx", TypeDescription::class("com.example.Order"))
            .output("joined", TypeDescription::class("com.example.Joined"))
            .build()
            .unwrap(),
        );
        let out = graph.add(Operator::external_output(
            "joined",
            TypeDescription::class("com.example.Joined"),
            None,
        ));
        graph
            .connect_by_name(items, ExternalInput::PORT_NAME, join, "master")
            .unwrap();
        graph
            .connect_by_name(orders, ExternalInput::PORT_NAME, join, "tx")
            .unwrap();
        graph
            .connect_by_name(join, "joined", out, ExternalOutput::PORT_NAME)
            .unwrap();
        Jobflow::new("stock", ClassDescription::new("com.example.StockJob"), graph)
    }

    fn declarations() -> DeclarationTable {
        DeclarationTable::new().with_class(
            ClassDescription::new(OPS),
            vec![
                RoutineInfo::new("joinStock"),
                RoutineInfo::new("pick").with_marker(ClassDescription::new(MASTER_SELECTION)),
            ],
        )
    }

    fn compile(build_id: &str, selection: &str) -> (CompilerContext, flowc_core::error::Result<BatchReference>) {
        let config = CompilerConfig {
            build_id: build_id.into(),
            ..CompilerConfig::default()
        };
        let mut ctx = CompilerContext::new(config, declarations());
        let mut batch = Batch::new(BatchInfo::new("daily", ClassDescription::new("com.example.Daily")));
        batch.add(join_flow(selection), vec![]);
        let result = BatchCompiler::new(CompilerTools::plan_backend()).compile(&mut ctx, &mut batch);
        (ctx, result)
    }

    fn plan_of(ctx: &CompilerContext) -> JobflowPlan {
        let location = jobflow_location("stock").append("plan.json");
        serde_json::from_slice(ctx.resource(&location).unwrap()).unwrap()
    }

    #[test]
    fn test_plan_records_operators_in_order() {
        let (ctx, result) = compile("b-1", "pick");
        let reference = result.unwrap();
        let plan = plan_of(&ctx);
        assert_eq!(plan.body.operators.len(), 4);
        for op in &plan.body.operators {
            assert!(op.upstreams.iter().all(|up| *up < op.index));
        }
        let join = plan
            .body
            .operators
            .iter()
            .find(|op| op.kind == OperatorKind::User)
            .unwrap();
        assert_eq!(join.upstreams.len(), 2);
        assert_eq!(join.master_selection.as_deref(), Some("com.example.StockOps#pick()"));
        assert!(join.join_strategy.is_some());

        let flow = reference.jobflow("stock").unwrap();
        assert_eq!(flow.plan_hash, Some(plan.plan_hash));
        assert_eq!(flow.tasks_of(Phase::Main).count(), 1);
        assert_eq!(flow.tasks_of(Phase::Import).count(), 1);
        assert_eq!(flow.tasks_of(Phase::Export).count(), 1);
        assert!(ctx.resource(&Location::root("batch.json")).is_some());
        assert!(ctx
            .resource(&jobflow_location("stock").append("ports.json"))
            .is_some());
    }

    #[test]
    fn test_plan_hash_ignores_build_id() {
        let (first, _) = compile("b-1", "pick");
        let (second, _) = compile("b-2", "pick");
        let (a, b) = (plan_of(&first), plan_of(&second));
        assert_ne!(a.build_id, b.build_id);
        assert_eq!(a.plan_hash, b.plan_hash);
    }

    #[test]
    fn test_unresolved_selection_fails_jobflow() {
        let (ctx, result) = compile("b-1", "joinStock");
        let err = result.unwrap_err();
        assert!(err.to_string().contains("missing master selection target method"));
        let errors: Vec<_> = ctx
            .diagnostics()
            .iter()
            .filter(|d| d.level == Level::Error)
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(ctx.resource(&Location::root("batch.json")).is_none());
    }
}
