use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;

use crate::db::models::audit::AuditLogEntry;
use crate::db::models::member::{CardKind, Member, MemberId, ResetScope};
use crate::db::models::speaker::{DailySelection, SpeakerHistoryEntry};

pub type StoreResult<T> = core::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("member '{0}' does not exist")]
    NotFound(MemberId),

    #[error("invalid operation: {reason}")]
    InvalidOperation { reason: String },

    /// Another caller committed a selection for this date first. Handled
    /// internally by the scheduler's re-read loop, never caller-visible.
    #[error("selection already committed for {date}")]
    Conflict { date: NaiveDate },

    /// A bulk mutation could not be verified complete. The transaction was
    /// rolled back, so no partial state was applied; the caller may retry.
    #[error("bulk operation failed verification and was rolled back: {reason}")]
    PartialFailure { reason: String },

    #[error("backing store unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
}

/// Storage port shared by the rotation scheduler and the ledger.
///
/// Implementations own the two serialization points the design relies on:
/// the uniqueness gate on `daily_selection.selected_date`, and per-member
/// transactional atomicity of a point/card mutation with its audit entry.
#[async_trait]
pub trait Store: Send + Sync {
    // -- member directory --

    async fn upsert_member(&self, member: &Member) -> StoreResult<Member>;

    /// Full roster, points descending then name.
    async fn list_members(&self) -> StoreResult<Vec<Member>>;

    /// Resolves ids in input order; unknown ids are skipped.
    async fn members_by_id(&self, ids: &[MemberId]) -> StoreResult<Vec<Member>>;

    // -- rotation state --

    async fn speaker_history(&self) -> StoreResult<Vec<SpeakerHistoryEntry>>;

    /// Upsert: sets `last_selected_date` and bumps `selection_count`
    /// (created with count 1 on first selection).
    async fn mark_selected(&self, member_id: &MemberId, date: NaiveDate) -> StoreResult<()>;

    async fn selection_for(&self, date: NaiveDate) -> StoreResult<Option<DailySelection>>;

    /// Commits a daily selection. Fails with [`StoreError::Conflict`] when a
    /// selection for the same date is already committed.
    async fn insert_selection(&self, selection: &DailySelection) -> StoreResult<()>;

    async fn delete_selection(&self, date: NaiveDate) -> StoreResult<()>;

    // -- ledger --

    /// Applies a signed point delta and appends the audit entry in one
    /// transaction. Rejects (without mutating) any delta that would drive
    /// the total negative.
    async fn adjust_points(
        &self,
        member_id: &MemberId,
        delta: i64,
        reason: &str,
        actor_id: &str,
    ) -> StoreResult<i64>;

    /// Registers a card. Red cards deduct `min(point_penalty, points)` --
    /// capped rather than rejected -- and every card event appends an audit
    /// entry in the same transaction.
    async fn give_card(
        &self,
        member_id: &MemberId,
        kind: CardKind,
        point_penalty: i64,
        reason: &str,
        actor_id: &str,
    ) -> StoreResult<Member>;

    /// Zeroes the scoped counters for every member, all-or-nothing.
    /// Returns the number of member rows updated.
    async fn reset_members(&self, scope: ResetScope) -> StoreResult<u64>;

    /// Audit entries with `from <= created_at < to`, newest first.
    async fn audit_log_between(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> StoreResult<Vec<AuditLogEntry>>;
}
