use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::member::MemberId;

/// Append-only record of a ledger action. `member_name` is a deliberate
/// snapshot taken at write time so renames never rewrite history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditLogEntry {
    pub id: String,
    pub created_at: NaiveDateTime,
    pub member_id: MemberId,
    pub member_name: String,
    pub points_changed: i64,
    pub reason: String,
    pub actor_id: String,
}

impl AuditLogEntry {
    pub fn record(
        member_id: MemberId,
        member_name: impl Into<String>,
        points_changed: i64,
        reason: impl Into<String>,
        actor_id: impl Into<String>,
        created_at: NaiveDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at,
            member_id,
            member_name: member_name.into(),
            points_changed,
            reason: reason.into(),
            actor_id: actor_id.into(),
        }
    }
}
