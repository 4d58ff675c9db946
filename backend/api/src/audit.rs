//! Admin audit trail.
//!
//! Handlers wrap their mutation in [`audited`]: the operation runs first, and
//! only a successful outcome emits an entry. Writing the entry can never turn
//! a success into a failure; a failed write is logged and dropped.

use std::collections::BTreeMap;
use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::warn;

use crate::db;
use crate::db::admins::AdminRecord;
use crate::errors::Result;

/// What an audited action touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditTarget {
    User {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        email: Option<String>,
    },
    Campaign {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    Admin {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        email: Option<String>,
    },
    Platform {
        setting: String,
    },
    Withdrawal {
        id: String,
        campaign_id: String,
    },
    Report {
        id: String,
    },
    Comment {
        id: String,
    },
    /// Anything without a fixed shape.
    Other {
        fields: BTreeMap<String, String>,
    },
}

/// Snapshot of the acting admin at the time of the action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditActor {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
}

impl From<&AdminRecord> for AuditActor {
    fn from(admin: &AdminRecord) -> Self {
        Self {
            id: admin.id.clone(),
            name: admin.name.clone(),
            email: admin.email.clone(),
            role: admin.role.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub action: &'static str,
    pub actor: AuditActor,
    pub target: AuditTarget,
    pub details: BTreeMap<String, String>,
    pub ip: Option<String>,
}

impl AuditEvent {
    pub fn new(action: &'static str, admin: &AdminRecord, target: AuditTarget) -> Self {
        Self {
            action,
            actor: admin.into(),
            target,
            details: BTreeMap::new(),
            ip: None,
        }
    }

    pub fn detail(mut self, key: &str, value: impl Into<String>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn ip(mut self, ip: Option<String>) -> Self {
        self.ip = ip;
        self
    }
}

/// Stored audit entry as returned by the query endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: i64,
    pub action: String,
    pub actor: AuditActor,
    pub target: AuditTarget,
    pub details: BTreeMap<String, String>,
    pub ip: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Run `op`, then record `event` if it succeeded.
pub async fn audited<T, F>(pool: &SqlitePool, event: AuditEvent, op: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let outcome = op.await;
    if outcome.is_ok() {
        emit(pool, &event).await;
    }
    outcome
}

/// Write an entry unconditionally, swallowing failures.
pub async fn emit(pool: &SqlitePool, event: &AuditEvent) {
    if let Err(e) = db::audit::insert(pool, event, Utc::now()).await {
        warn!(action = event.action, "Failed to write audit entry: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_is_tagged() {
        let t = AuditTarget::Campaign {
            id: "c-1".into(),
            title: None,
        };
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "campaign", "id": "c-1" }));
        let back: AuditTarget = serde_json::from_value(json).unwrap();
        assert_eq!(back, t);
    }
}
