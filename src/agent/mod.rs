//! Decision orchestration.
//!
//! [`DecisionMaker`] runs a single decision through validation, rate
//! limiting, caching, context analysis, the model and the scoring engines.
//! [`ComplexDecisionMaker`] runs named multi-step workflows.

mod decision;
mod workflow;

pub use decision::{BatchItem, DecisionMaker, DecisionOutcome};
pub use workflow::{
    ComplexDecisionMaker, DecisionStep, StepFuture, StepHandler, StepOutcome, StepRecord,
    WorkflowRun,
};
