use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::rfp::RfpId;
use crate::domain::workflow::WorkflowRunId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditCategory {
    Workflow,
    Agent,
    Model,
    Persistence,
    System,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditOutcome {
    Success,
    Rejected,
    Failed,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub rfp_id: Option<RfpId>,
    pub workflow_run_id: Option<WorkflowRunId>,
    pub correlation_id: String,
    pub actor: String,
}

impl AuditContext {
    pub fn new(
        rfp_id: Option<RfpId>,
        workflow_run_id: Option<WorkflowRunId>,
        correlation_id: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self { rfp_id, workflow_run_id, correlation_id: correlation_id.into(), actor: actor.into() }
    }

    pub fn event(
        &self,
        event_type: impl Into<String>,
        category: AuditCategory,
        outcome: AuditOutcome,
    ) -> AuditEvent {
        AuditEvent::new(
            self.rfp_id.clone(),
            self.workflow_run_id.clone(),
            self.correlation_id.clone(),
            event_type,
            category,
            self.actor.clone(),
            outcome,
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub rfp_id: Option<RfpId>,
    pub workflow_run_id: Option<WorkflowRunId>,
    pub correlation_id: String,
    pub event_type: String,
    pub category: AuditCategory,
    pub actor: String,
    pub outcome: AuditOutcome,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        rfp_id: Option<RfpId>,
        workflow_run_id: Option<WorkflowRunId>,
        correlation_id: impl Into<String>,
        event_type: impl Into<String>,
        category: AuditCategory,
        actor: impl Into<String>,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            rfp_id,
            workflow_run_id,
            correlation_id: correlation_id.into(),
            event_type: event_type.into(),
            category,
            actor: actor.into(),
            outcome,
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Writes audit events to the structured log.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let metadata = serde_json::to_string(&event.metadata).unwrap_or_default();
        let rfp_id = event.rfp_id.as_ref().map_or("unknown", |id| id.0.as_str());
        let workflow_run_id = event.workflow_run_id.as_ref().map_or("unknown", |id| id.0.as_str());

        match event.outcome {
            AuditOutcome::Success => tracing::info!(
                event_name = %event.event_type,
                correlation_id = %event.correlation_id,
                rfp_id,
                workflow_run_id,
                category = ?event.category,
                actor = %event.actor,
                metadata = %metadata,
                "audit event"
            ),
            AuditOutcome::Rejected | AuditOutcome::Failed => tracing::warn!(
                event_name = %event.event_type,
                correlation_id = %event.correlation_id,
                rfp_id,
                workflow_run_id,
                category = ?event.category,
                actor = %event.actor,
                outcome = ?event.outcome,
                metadata = %metadata,
                "audit event"
            ),
        }
    }
}

/// Stable short fingerprint for audit metadata; raw prompts never enter the audit trail.
pub fn fingerprint(text: &str) -> String {
    let hash = blake3::hash(text.as_bytes()).to_hex();
    hash.as_str()[..16].to_string()
}

#[cfg(test)]
mod tests {
    use crate::{
        audit::{
            fingerprint, AuditCategory, AuditContext, AuditOutcome, AuditSink, InMemoryAuditSink,
        },
        domain::{rfp::RfpId, workflow::WorkflowRunId},
    };

    #[test]
    fn in_memory_sink_records_events_with_correlation_fields() {
        let sink = InMemoryAuditSink::default();
        let context = AuditContext::new(
            Some(RfpId("RFP-2026-0042".to_owned())),
            Some(WorkflowRunId("run-7".to_owned())),
            "run-7",
            "model-gateway",
        );
        sink.emit(
            context
                .event("model.call_succeeded", AuditCategory::Model, AuditOutcome::Success)
                .with_metadata("provider", "ollama")
                .with_metadata("model", "llama3.1"),
        );

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].correlation_id, "run-7");
        assert_eq!(events[0].rfp_id.as_ref().map(|id| id.0.as_str()), Some("RFP-2026-0042"));
        assert_eq!(events[0].metadata.get("model").map(String::as_str), Some("llama3.1"));
    }

    #[test]
    fn fingerprint_is_stable_and_short() {
        let first = fingerprint("Analyse this RFP");
        assert_eq!(first, fingerprint("Analyse this RFP"));
        assert_ne!(first, fingerprint("Analyse that RFP"));
        assert_eq!(first.len(), 16);
    }
}
