use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::WorkflowError;
use crate::reasoning::ContextMap;

const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(30);

/// Boxed future returned by a step handler.
pub type StepFuture = Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send>>;

/// Async function from the workflow context to a step result.
pub type StepHandler = Arc<dyn Fn(ContextMap) -> StepFuture + Send + Sync>;

/// A named unit of work in a decision workflow.
#[derive(Clone)]
pub struct DecisionStep {
    pub name: String,
    pub handler: StepHandler,
    /// Context keys that must be present before the step runs.
    pub required_context: Vec<String>,
    pub optional_context: Vec<String>,
    pub timeout: Duration,
}

impl DecisionStep {
    /// Create a step with no context requirements and a 30 s timeout.
    pub fn new<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(ContextMap) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            handler: Arc::new(move |context| Box::pin(handler(context)) as StepFuture),
            required_context: Vec::new(),
            optional_context: Vec::new(),
            timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    pub fn requires<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_context = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn optional<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.optional_context = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Debug for DecisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecisionStep")
            .field("name", &self.name)
            .field("required_context", &self.required_context)
            .field("optional_context", &self.optional_context)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepOutcome {
    Completed { result: Value },
    Failed { error: String },
}

/// What happened to one step of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: String,
    #[serde(flatten)]
    pub outcome: StepOutcome,
    pub timestamp: DateTime<Utc>,
}

impl StepRecord {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, StepOutcome::Completed { .. })
    }
}

/// Result of [`ComplexDecisionMaker::execute_workflow`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub workflow: String,
    pub results: Vec<StepRecord>,
    pub final_context: ContextMap,
}

/// Registry of decision steps and the named workflows built from them.
#[derive(Debug, Default)]
pub struct ComplexDecisionMaker {
    steps: HashMap<String, DecisionStep>,
    workflows: HashMap<String, Vec<String>>,
}

impl ComplexDecisionMaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a step, replacing any step with the same name.
    pub fn register_step(&mut self, step: DecisionStep) {
        self.steps.insert(step.name.clone(), step);
    }

    /// Define a workflow as an ordered list of registered steps.
    pub fn create_workflow<S: AsRef<str>>(
        &mut self,
        name: impl Into<String>,
        step_names: &[S],
    ) -> Result<(), WorkflowError> {
        let missing: Vec<String> = step_names
            .iter()
            .map(|s| s.as_ref())
            .filter(|s| !self.steps.contains_key(*s))
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(WorkflowError::UnknownSteps { steps: missing });
        }

        self.workflows.insert(
            name.into(),
            step_names.iter().map(|s| s.as_ref().to_string()).collect(),
        );
        Ok(())
    }

    pub fn workflow_steps(&self, name: &str) -> Option<&[String]> {
        self.workflows.get(name).map(Vec::as_slice)
    }

    /// Run a workflow's steps in order, threading the context through them.
    ///
    /// Object results are merged into the context. A failed or timed-out
    /// step is recorded and ends the run. A step whose required context is
    /// missing aborts with an error.
    pub async fn execute_workflow(
        &self,
        name: &str,
        initial_context: ContextMap,
    ) -> Result<WorkflowRun, WorkflowError> {
        let step_names = self
            .workflows
            .get(name)
            .ok_or_else(|| WorkflowError::UnknownWorkflow {
                name: name.to_string(),
            })?;

        let start = Instant::now();
        let mut context = initial_context;
        let mut results = Vec::with_capacity(step_names.len());

        info!(workflow = %name, steps = step_names.len(), "Starting workflow");

        for step_name in step_names {
            let step = self
                .steps
                .get(step_name)
                .ok_or_else(|| WorkflowError::UnknownSteps {
                    steps: vec![step_name.clone()],
                })?;

            let missing: Vec<String> = step
                .required_context
                .iter()
                .filter(|k| !context.contains_key(k.as_str()))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(WorkflowError::MissingContext {
                    step: step_name.clone(),
                    keys: missing,
                });
            }

            let outcome =
                match tokio::time::timeout(step.timeout, (step.handler)(context.clone())).await {
                    Ok(Ok(result)) => {
                        if let Value::Object(update) = &result {
                            context.extend(update.clone());
                        }
                        StepOutcome::Completed { result }
                    }
                    Ok(Err(e)) => {
                        warn!(step = %step_name, error = %e, "Workflow step failed");
                        StepOutcome::Failed {
                            error: e.to_string(),
                        }
                    }
                    Err(_) => {
                        warn!(step = %step_name, timeout_ms = step.timeout.as_millis() as u64, "Workflow step timed out");
                        StepOutcome::Failed {
                            error: "Timeout".to_string(),
                        }
                    }
                };

            let failed = matches!(outcome, StepOutcome::Failed { .. });
            results.push(StepRecord {
                step: step_name.clone(),
                outcome,
                timestamp: Utc::now(),
            });
            if failed {
                break;
            }
        }

        info!(
            workflow = %name,
            completed = results.iter().filter(|r| r.is_success()).count(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Workflow finished"
        );

        Ok(WorkflowRun {
            workflow: name.to_string(),
            results,
            final_context: context,
        })
    }
}
