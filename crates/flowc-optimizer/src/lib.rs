#![forbid(unsafe_code)]
//! flowc-optimizer: estimation, characterization, and rewriting of operator
//! graphs.
//!
//! Design:
//! - Estimators compute per-operator [`Estimate`]s; an [`EstimatorChain`]
//!   merges them with later estimators overriding earlier ones per key.
//! - Characterizers turn estimates into decisions (e.g. a join strategy).
//!   They never mutate the graph; estimation is a full barrier before any
//!   characterization starts.
//! - Rewriters replace operators with fresh ones; an operator's kind and
//!   identity never change in place.

pub mod characterizer;
pub mod estimate;
pub mod estimator;
pub mod join_strategy;
pub mod optimizer;
pub mod rewriter;

pub use characterizer::{
    CharacterizerAdapter, CharacterizerChain, CharacterizerContext, ConstantCharacterizer,
    OperatorCharacterizer,
};
pub use estimate::{Estimate, EstimateKey, EstimateMap, EstimateValue, SizeClass};
pub use estimator::{
    EstimatorChain, EstimatorContext, ExternalInputEstimator, OperatorEstimator,
    PropagatingSizeEstimator,
};
pub use join_strategy::{JoinStrategy, JoinStrategyCharacterizer};
pub use optimizer::{Optimizer, OptimizerReport};
pub use rewriter::{CheckpointFolding, DeadOperatorElimination, OperatorRewriter, RewriterChain};
