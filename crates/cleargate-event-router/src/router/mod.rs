//! The event router: turns claimed events into workflow dispatches.
//!
//! One cycle reclaims stale claims, claims a batch of pending events, and
//! for every event walks its active subscriptions: filter, load workflow,
//! project inputs, resolve credential, dispatch. Failures are contained at
//! the narrowest scope (subscription, then event); only the reclaim and
//! claim calls can fail a cycle.

pub mod inputs;
pub mod runner;

pub use inputs::{InputProjection, project_inputs};
pub use runner::{RouterTask, TaskStats};

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};
use tracing::Instrument;

use crate::config::RouterConfig;
use crate::credentials::CredentialBroker;
use crate::errors::{
    EventProcessingError, ExecutionError, RouterError, SubscriptionDispatchError,
};
use crate::event_store::EventStore;
use crate::registry::{TriggerDefinition, TriggerRegistry};
use crate::subscriptions::SubscriptionRegistry;
use crate::traits::{ExecutionEngine, FilterEvaluator, TemplateEngine, WorkflowSource};
use crate::types::{
    Event, EventSnapshot, ExecutionContext, ExecutionCredential, ExecutionOutcome, InputSource,
    Subscription, TriggeredBy, WorkflowExecutionModel, WorkflowRecord,
};

/// Counters for one router cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Stale claims reset to pending.
    pub reclaimed: usize,
    /// Events this cycle won.
    pub claimed: usize,
    /// Events marked completed.
    pub completed: usize,
    /// Successful dispatches.
    pub dispatched: usize,
    /// Subscriptions whose filter did not match.
    pub filtered_out: usize,
    /// Subscriptions whose workflow was unavailable.
    pub skipped: usize,
    /// Subscription and event failures.
    pub failed: usize,
}

enum SubscriptionOutcome {
    Dispatched,
    FilteredOut,
    WorkflowUnavailable,
}

/// Routes claimed events to subscribed workflows.
#[derive(Clone)]
pub struct EventRouter {
    pub(crate) events: EventStore,
    pub(crate) subscriptions: SubscriptionRegistry,
    pub(crate) triggers: TriggerRegistry,
    pub(crate) workflows: Arc<dyn WorkflowSource>,
    pub(crate) credentials: CredentialBroker,
    pub(crate) engine: Arc<dyn ExecutionEngine>,
    pub(crate) templates: Arc<dyn TemplateEngine>,
    pub(crate) filters: Arc<dyn FilterEvaluator>,
    pub(crate) config: RouterConfig,
}

impl EventRouter {
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Run one reclaim-claim-dispatch cycle.
    ///
    /// Safe to call from several processes at once: claims are resolved by
    /// optimistic concurrency in the event store.
    pub async fn run_cycle(&self) -> Result<CycleReport, RouterError> {
        self.cycle()
            .instrument(tracing::info_span!("event_router.cycle"))
            .await
    }

    async fn cycle(&self) -> Result<CycleReport, RouterError> {
        let mut report = CycleReport::default();

        let reclaimed = self
            .events
            .reclaim_stale(
                self.config.stale_threshold_minutes,
                self.config.reclaim_batch_size,
            )
            .await
            .map_err(RouterError::Reclaim)?;
        report.reclaimed = reclaimed.len();
        if !reclaimed.is_empty() {
            tracing::warn!(count = reclaimed.len(), "reclaimed stale events");
        }

        let claimed = match self.events.claim_pending(self.config.claim_batch_size).await {
            Ok(events) => events,
            Err(aborted) => {
                // Events already won are ours: process them before failing.
                report.claimed = aborted.partial.len();
                for event in &aborted.partial {
                    self.process_event(event, &mut report).await;
                }
                tracing::error!(error = %aborted, ?report, "claim failed, cycle aborted");
                return Err(RouterError::Claim(aborted));
            }
        };
        report.claimed = claimed.len();

        for event in &claimed {
            self.process_event(event, &mut report).await;
        }

        if report.claimed > 0 || report.reclaimed > 0 {
            tracing::info!(
                reclaimed = report.reclaimed,
                claimed = report.claimed,
                completed = report.completed,
                dispatched = report.dispatched,
                filtered_out = report.filtered_out,
                skipped = report.skipped,
                failed = report.failed,
                "router cycle finished"
            );
        }
        Ok(report)
    }

    async fn process_event(&self, event: &Event, report: &mut CycleReport) {
        let span = tracing::debug_span!(
            "event",
            event_id = %event.id,
            trigger_type = %event.trigger_type,
            space_id = %event.space_id,
        );
        match self.route_event(event, report).instrument(span).await {
            Ok(()) => report.completed += 1,
            Err(e) => {
                report.failed += 1;
                tracing::error!(
                    event_id = %event.id,
                    trigger_type = %event.trigger_type,
                    error = %e,
                    "event processing failed, left for reclamation"
                );
            }
        }
    }

    async fn route_event(
        &self,
        event: &Event,
        report: &mut CycleReport,
    ) -> Result<(), EventProcessingError> {
        let subscriptions = self
            .subscriptions
            .find_active_for_trigger(&event.trigger_type, &event.space_id)
            .await?;

        if subscriptions.is_empty() {
            tracing::debug!("no active subscriptions");
            self.events.mark_completed(&event.id).await?;
            return Ok(());
        }

        let trigger = self.triggers.get(&event.trigger_type);
        for subscription in &subscriptions {
            let span = tracing::debug_span!(
                "subscription",
                subscription_id = %subscription.id,
                workflow_id = %subscription.workflow_id,
            );
            let outcome = self
                .handle_subscription(event, subscription, trigger)
                .instrument(span)
                .await;
            match outcome {
                Ok(SubscriptionOutcome::Dispatched) => report.dispatched += 1,
                Ok(SubscriptionOutcome::FilteredOut) => report.filtered_out += 1,
                Ok(SubscriptionOutcome::WorkflowUnavailable) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        event_id = %event.id,
                        subscription_id = %subscription.id,
                        workflow_id = %subscription.workflow_id,
                        error = %e,
                        "subscription skipped"
                    );
                }
            }
        }

        // Completed even if some dispatches failed: there is no redelivery.
        self.events.mark_completed(&event.id).await?;
        Ok(())
    }

    async fn handle_subscription(
        &self,
        event: &Event,
        subscription: &Subscription,
        trigger: Option<&TriggerDefinition>,
    ) -> Result<SubscriptionOutcome, SubscriptionDispatchError> {
        if let Some(where_clause) = &subscription.where_clause {
            let context = json!({ "event": event.payload });
            if !self.filter_matches(where_clause, &context)? {
                tracing::debug!("filter did not match");
                return Ok(SubscriptionOutcome::FilteredOut);
            }
        }

        let workflow = self
            .workflows
            .get(&subscription.workflow_id, &subscription.space_id)
            .await?
            .and_then(WorkflowRecord::into_execution_model);
        let Some(workflow) = workflow else {
            tracing::warn!(
                workflow_id = %subscription.workflow_id,
                space_id = %subscription.space_id,
                "workflow unavailable, skipping"
            );
            return Ok(SubscriptionOutcome::WorkflowUnavailable);
        };

        let source = trigger
            .map(|t| t.input_source.clone())
            .unwrap_or(InputSource::Payload);
        let projection = project_inputs(&event.payload, &source, &workflow.definition.inputs);
        if let Some(problem) = &projection.error {
            tracing::warn!(
                workflow_id = %workflow.id,
                problem = %problem,
                "input validation failed, dispatching so the run fails visibly"
            );
        }

        let credential = self.resolve_credential(event).await;
        let context = ExecutionContext {
            space_id: subscription.space_id.clone(),
            triggered_by: TriggeredBy {
                trigger_type: event.trigger_type.clone(),
                event_id: event.id.clone(),
                subscription_id: subscription.id.clone(),
                principal_id: event.credential_ref.principal_id.clone(),
            },
            inputs: projection.inputs,
            event: EventSnapshot::from(event),
            credential,
            input_validation_failed: projection.error.is_some(),
            input_validation_error: projection.error,
        };

        let outcome = self.dispatch(&workflow, context).await?;
        tracing::info!(
            event_id = %event.id,
            workflow_id = %workflow.id,
            execution_id = %outcome.execution_id,
            "workflow dispatched"
        );
        Ok(SubscriptionOutcome::Dispatched)
    }

    /// Render the filter, then evaluate it. A boolean is used as-is, a
    /// string is a query, nothing means no match, anything else is an error.
    fn filter_matches(
        &self,
        where_clause: &str,
        context: &Value,
    ) -> Result<bool, SubscriptionDispatchError> {
        match self.templates.render(where_clause, context)? {
            None => Ok(false),
            Some(Value::Bool(b)) => Ok(b),
            Some(Value::String(query)) => Ok(self.filters.evaluate(&query, context)?),
            Some(other) => Err(SubscriptionDispatchError::FilterType {
                found: json_type_name(&other),
            }),
        }
    }

    async fn resolve_credential(&self, event: &Event) -> Option<ExecutionCredential> {
        match self.credentials.resolve(&event.id, &event.credential_ref).await {
            Ok(Some(credential)) => Some(credential),
            Ok(None) => {
                tracing::warn!(
                    event_id = %event.id,
                    principal_id = %event.credential_ref.principal_id,
                    "no execution credential, dispatching without"
                );
                None
            }
            Err(e) => {
                tracing::warn!(
                    event_id = %event.id,
                    error = %e,
                    "credential resolution failed, dispatching without"
                );
                None
            }
        }
    }

    async fn dispatch(
        &self,
        workflow: &WorkflowExecutionModel,
        context: ExecutionContext,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let Some(timeout) = self.config.dispatch_timeout() else {
            return self.engine.execute(workflow, context).await;
        };
        tokio::time::timeout(timeout, self.engine.execute(workflow, context))
            .await
            .map_err(|_| ExecutionError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            })?
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
