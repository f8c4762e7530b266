// SPDX-License-Identifier: MIT

//! Flow runtime - executes named flows and checkpoints them through a store
//!
//! Every completed step is recorded in the flow's `FlowState` and saved, so a
//! resumed flow replays finished steps from the snapshot instead of running
//! them again.

mod joke;

pub use joke::JokeFlow;

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

use crate::adk::error::{FlowkitError, StoreError};
use crate::flowkit::state::{ExpectedVersion, FlowFailure, FlowState, FlowStateStore, FlowStatus};

/// A named, checkpointed operation
#[async_trait]
pub trait Flow: Send + Sync {
    /// Declared flow name, recorded in every snapshot
    fn name(&self) -> &str;

    async fn run(&self, ctx: &mut FlowContext, input: Value) -> Result<Value, FlowkitError>;
}

/// Per-invocation handle a flow uses to run steps
pub struct FlowContext {
    state: FlowState,
    /// Version of the last snapshot this context wrote
    version: Option<u64>,
    store: Arc<dyn FlowStateStore>,
}

impl FlowContext {
    pub fn flow_id(&self) -> &str {
        &self.state.id
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    /// Run a named step once.
    ///
    /// A step already present in the snapshot returns its recorded value and
    /// `f` is not called.
    pub async fn run_step<T, F, Fut>(&mut self, name: &str, f: F) -> Result<T, FlowkitError>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, FlowkitError>> + Send,
    {
        if let Some(cached) = self.state.steps.get(name) {
            log::debug!("Flow {} replaying step {}", self.state.id, name);
            return Ok(serde_json::from_value(cached.clone())?);
        }

        log::info!("Flow {} running step {}", self.state.id, name);
        let value = f().await?;
        self.state
            .steps
            .insert(name.to_string(), serde_json::to_value(&value)?);
        self.checkpoint().await?;
        Ok(value)
    }

    /// Return the externally supplied value for `step`, or interrupt the flow
    /// until one is provided through `FlowRunner::resume`.
    pub fn wait_for<T: DeserializeOwned>(&self, step: &str) -> Result<T, FlowkitError> {
        match self.state.steps.get(step) {
            Some(value) => Ok(serde_json::from_value(value.clone())?),
            None => Err(FlowkitError::Interrupted(step.to_string())),
        }
    }

    /// Save the current snapshot, refusing to overwrite anyone else's write
    async fn checkpoint(&mut self) -> Result<(), StoreError> {
        self.state.updated_at = Some(Utc::now());
        let expected = match self.version {
            Some(v) => ExpectedVersion::Exactly(v),
            None => ExpectedVersion::Absent,
        };
        let version = self
            .store
            .save_if(&self.state.id, &self.state, expected)
            .await?;
        self.version = Some(version);
        Ok(())
    }
}

/// Runs flows against an injected store
#[derive(Clone)]
pub struct FlowRunner {
    store: Arc<dyn FlowStateStore>,
}

impl FlowRunner {
    pub fn new(store: Arc<dyn FlowStateStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn FlowStateStore> {
        &self.store
    }

    /// Start a new execution of `flow` and drive it to completion or interruption
    pub async fn run_flow(&self, flow: &dyn Flow, input: Value) -> Result<FlowState, FlowkitError> {
        let id = uuid::Uuid::new_v4().to_string();
        let mut state = FlowState::new(id, flow.name()).with_input(input);
        state.started_at = Some(Utc::now());

        let mut ctx = FlowContext {
            state,
            version: None,
            store: self.store.clone(),
        };
        ctx.checkpoint().await?;
        log::info!("Started flow {} ({})", flow.name(), ctx.flow_id());
        self.drive(flow, ctx).await
    }

    /// Continue a stored execution.
    ///
    /// `step_input`, if given, is recorded as the result of the step an
    /// interrupted flow is blocked on. Succeeded flows are returned as stored.
    pub async fn resume(
        &self,
        flow: &dyn Flow,
        id: &str,
        step_input: Option<Value>,
    ) -> Result<FlowState, FlowkitError> {
        let stored = self
            .store
            .load_versioned(id)
            .await?
            .ok_or_else(|| FlowkitError::FlowNotFound(id.to_string()))?;

        if stored.value.name != flow.name() {
            return Err(FlowkitError::flow(
                flow.name(),
                format!("state '{}' belongs to flow '{}'", id, stored.value.name),
            ));
        }
        if stored.value.status == FlowStatus::Succeeded {
            return Ok(stored.value);
        }

        let mut state = stored.value;
        if let (Some(step), Some(value)) = (state.blocked_on_step.take(), step_input) {
            state.steps.insert(step, value);
        }
        state.status = FlowStatus::Running;
        state.error = None;
        state.output = None;
        state.blocked_on_step = None;

        let mut ctx = FlowContext {
            state,
            version: Some(stored.version),
            store: self.store.clone(),
        };
        ctx.checkpoint().await?;
        log::info!("Resumed flow {} ({})", flow.name(), id);
        self.drive(flow, ctx).await
    }

    async fn drive(
        &self,
        flow: &dyn Flow,
        mut ctx: FlowContext,
    ) -> Result<FlowState, FlowkitError> {
        let input = ctx.state.input.clone().unwrap_or(Value::Null);

        match flow.run(&mut ctx, input).await {
            Ok(output) => {
                ctx.state.status = FlowStatus::Succeeded;
                ctx.state.output = Some(output);
                log::info!("Flow {} ({}) succeeded", flow.name(), ctx.flow_id());
            }
            Err(FlowkitError::Interrupted(step)) => {
                ctx.state.status = FlowStatus::Interrupted;
                log::info!("Flow {} ({}) waiting on {}", flow.name(), ctx.flow_id(), step);
                ctx.state.blocked_on_step = Some(step);
            }
            // Store errors end the invocation without another write.
            Err(FlowkitError::Store(e)) => return Err(e.into()),
            Err(e) => {
                log::warn!("Flow {} ({}) failed: {}", flow.name(), ctx.flow_id(), e);
                ctx.state.status = FlowStatus::Failed;
                ctx.state.error = Some(FlowFailure::new(e.to_string()));
            }
        }

        ctx.checkpoint().await?;
        Ok(ctx.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flowkit::state::InMemoryFlowStateStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Two-step flow counting how often each step body actually runs
    struct CountingFlow {
        calls: Arc<AtomicUsize>,
        fail_second: bool,
    }

    #[async_trait]
    impl Flow for CountingFlow {
        fn name(&self) -> &str {
            "countingFlow"
        }

        async fn run(&self, ctx: &mut FlowContext, input: Value) -> Result<Value, FlowkitError> {
            let calls = self.calls.clone();
            let first: String = ctx
                .run_step("first", || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, FlowkitError>(format!("{}-1", input.as_str().unwrap_or_default()))
                })
                .await?;

            if self.fail_second {
                return Err(FlowkitError::flow("countingFlow", "second step exploded"));
            }

            let calls = self.calls.clone();
            let second: String = ctx
                .run_step("second", || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, FlowkitError>(format!("{}-2", first))
                })
                .await?;
            Ok(json!(second))
        }
    }

    /// Flow that blocks on human approval
    struct ApprovalFlow;

    #[async_trait]
    impl Flow for ApprovalFlow {
        fn name(&self) -> &str {
            "approvalFlow"
        }

        async fn run(&self, ctx: &mut FlowContext, _input: Value) -> Result<Value, FlowkitError> {
            let approved: bool = ctx.wait_for("approve")?;
            Ok(json!({ "approved": approved }))
        }
    }

    fn runner() -> FlowRunner {
        FlowRunner::new(Arc::new(InMemoryFlowStateStore::new()))
    }

    #[tokio::test]
    async fn test_run_flow_succeeds_and_persists() {
        let runner = runner();
        let calls = Arc::new(AtomicUsize::new(0));
        let flow = CountingFlow {
            calls: calls.clone(),
            fail_second: false,
        };

        let state = runner.run_flow(&flow, json!("x")).await.unwrap();

        assert_eq!(state.status, FlowStatus::Succeeded);
        assert_eq!(state.output, Some(json!("x-1-2")));
        assert_eq!(state.steps["first"], json!("x-1"));
        assert!(state.started_at.is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let stored = runner.store().load(&state.id).await.unwrap().unwrap();
        assert_eq!(stored, state);
    }

    #[tokio::test]
    async fn test_failed_flow_records_error() {
        let runner = runner();
        let flow = CountingFlow {
            calls: Arc::new(AtomicUsize::new(0)),
            fail_second: true,
        };

        let state = runner.run_flow(&flow, json!("x")).await.unwrap();

        assert_eq!(state.status, FlowStatus::Failed);
        assert!(state.error.unwrap().message.contains("second step exploded"));
        assert!(state.steps.contains_key("first"));
    }

    #[tokio::test]
    async fn test_resume_replays_finished_steps() {
        let runner = runner();
        let calls = Arc::new(AtomicUsize::new(0));
        let failing = CountingFlow {
            calls: calls.clone(),
            fail_second: true,
        };
        let failed = runner.run_flow(&failing, json!("x")).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let fixed = CountingFlow {
            calls: calls.clone(),
            fail_second: false,
        };
        let resumed = runner.resume(&fixed, &failed.id, None).await.unwrap();

        assert_eq!(resumed.status, FlowStatus::Succeeded);
        assert!(resumed.error.is_none());
        assert_eq!(resumed.output, Some(json!("x-1-2")));
        // Only the second step ran on resume.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_interrupt_and_resume_with_input() {
        let runner = runner();

        let waiting = runner.run_flow(&ApprovalFlow, Value::Null).await.unwrap();
        assert_eq!(waiting.status, FlowStatus::Interrupted);
        assert_eq!(waiting.blocked_on_step.as_deref(), Some("approve"));

        let done = runner
            .resume(&ApprovalFlow, &waiting.id, Some(json!(true)))
            .await
            .unwrap();
        assert_eq!(done.status, FlowStatus::Succeeded);
        assert_eq!(done.output, Some(json!({ "approved": true })));
        assert!(done.blocked_on_step.is_none());
    }

    #[tokio::test]
    async fn test_resume_unknown_id() {
        let err = runner()
            .resume(&ApprovalFlow, "nope", None)
            .await
            .unwrap_err();
        assert!(matches!(err, FlowkitError::FlowNotFound(_)));
    }

    #[tokio::test]
    async fn test_resume_rejects_other_flow() {
        let runner = runner();
        let waiting = runner.run_flow(&ApprovalFlow, Value::Null).await.unwrap();
        let flow = CountingFlow {
            calls: Arc::new(AtomicUsize::new(0)),
            fail_second: false,
        };

        let err = runner.resume(&flow, &waiting.id, None).await.unwrap_err();
        assert!(matches!(err, FlowkitError::Flow { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_writer_is_detected() {
        let runner = runner();
        let waiting = runner.run_flow(&ApprovalFlow, Value::Null).await.unwrap();

        // Someone else rewrites the snapshot behind the runner's back.
        let stored = runner.store().load_versioned(&waiting.id).await.unwrap().unwrap();
        let mut ctx = FlowContext {
            state: stored.value.clone(),
            version: Some(stored.version - 1),
            store: runner.store().clone(),
        };

        let err = ctx.checkpoint().await.unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { .. }));
    }
}
