//! Append-only audit trail
//!
//! Every security-relevant event is recorded with before/after values where
//! applicable. Events are never mutated or deleted after being written.

use crate::error::{AuthzError, Result};
use crate::types::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// A single immutable audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    /// Event class, e.g. "access_decision", "role_mutation",
    /// "authentication_failure"
    pub event_type: String,
    /// Kind of entity acted on, e.g. "role", "route", "principal"
    pub entity_type: String,
    pub entity_id: String,
    /// Principal the event concerns, when applicable
    pub user_id: Option<String>,
    /// What happened, e.g. "created", "denied", "invalidated"
    pub action: String,
    pub old_values: Option<Value>,
    pub new_values: Option<Value>,
    pub severity: Severity,
    pub is_security_event: bool,
    pub correlation_id: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Builder-style input for a new audit event
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub user_id: Option<String>,
    pub action: String,
    pub old_values: Option<Value>,
    pub new_values: Option<Value>,
    pub severity: Severity,
    pub is_security_event: bool,
    pub correlation_id: Option<String>,
}

impl AuditRecord {
    pub fn new(event_type: &str, entity_type: &str, entity_id: &str, action: &str) -> Self {
        Self {
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            user_id: None,
            action: action.to_string(),
            old_values: None,
            new_values: None,
            severity: Severity::Low,
            is_security_event: false,
            correlation_id: None,
        }
    }

    pub fn user(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }

    pub fn old_values(mut self, values: Value) -> Self {
        self.old_values = Some(values);
        self
    }

    pub fn new_values(mut self, values: Value) -> Self {
        self.new_values = Some(values);
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn security_event(mut self) -> Self {
        self.is_security_event = true;
        self
    }

    pub fn correlation(mut self, correlation_id: Option<String>) -> Self {
        self.correlation_id = correlation_id;
        self
    }
}

/// Filters for querying the trail
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub user_id: Option<String>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub event_type: Option<String>,
    pub min_severity: Option<Severity>,
    pub security_only: bool,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Counters over the whole trail
#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditStats {
    pub total_events: usize,
    pub security_events: usize,
    pub high_severity_events: usize,
}

/// In-memory append-only audit recorder. Events can be appended and read,
/// never changed.
pub struct AuditRecorder {
    events: RwLock<Vec<AuditEvent>>,
}

impl AuditRecorder {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(Vec::new()),
        }
    }

    /// Append an event to the trail.
    pub async fn record(&self, record: AuditRecord) -> Result<AuditEvent> {
        if record.event_type.is_empty() || record.entity_id.is_empty() {
            return Err(AuthzError::AuditWriteFailure(
                "audit event requires an event type and entity id".to_string(),
            ));
        }

        let event = AuditEvent {
            id: Uuid::new_v4(),
            event_type: record.event_type,
            entity_type: record.entity_type,
            entity_id: record.entity_id,
            user_id: record.user_id,
            action: record.action,
            old_values: record.old_values,
            new_values: record.new_values,
            severity: record.severity,
            is_security_event: record.is_security_event,
            correlation_id: record.correlation_id,
            recorded_at: Utc::now(),
        };
        debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            action = %event.action,
            "audit event recorded"
        );
        self.events.write().await.push(event.clone());
        Ok(event)
    }

    /// Query the trail, most recent first.
    pub async fn query(&self, query: &AuditQuery) -> Vec<AuditEvent> {
        let events = self.events.read().await;
        let mut matched: Vec<AuditEvent> = events
            .iter()
            .filter(|e| {
                query
                    .user_id
                    .as_ref()
                    .map_or(true, |u| e.user_id.as_deref() == Some(u.as_str()))
                    && query
                        .entity_type
                        .as_ref()
                        .map_or(true, |t| &e.entity_type == t)
                    && query.entity_id.as_ref().map_or(true, |i| &e.entity_id == i)
                    && query.event_type.as_ref().map_or(true, |t| &e.event_type == t)
                    && query.min_severity.map_or(true, |s| e.severity >= s)
                    && (!query.security_only || e.is_security_event)
                    && query.since.map_or(true, |t| e.recorded_at >= t)
                    && query.until.map_or(true, |t| e.recorded_at <= t)
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }
        matched
    }

    pub async fn stats(&self) -> AuditStats {
        let events = self.events.read().await;
        AuditStats {
            total_events: events.len(),
            security_events: events.iter().filter(|e| e.is_security_event).count(),
            high_severity_events: events
                .iter()
                .filter(|e| e.severity >= Severity::High)
                .count(),
        }
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

impl Default for AuditRecorder {
    fn default() -> Self {
        Self::new()
    }
}
