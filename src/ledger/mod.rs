use chrono::NaiveDate;
use tracing::instrument;

use crate::clock::civil_day_window;
use crate::constants::DEFAULT_RED_CARD_PENALTY;
use crate::db::models::audit::AuditLogEntry;
use crate::db::models::member::{CardKind, Member, MemberId, ResetScope};
use crate::db::store::{Store, StoreError, StoreResult};


/// Point/card ledger over the store's per-member transactions.
///
/// Every accepted point mutation commits together with exactly one audit
/// entry; the store's row locking serializes concurrent mutations against
/// the same member.
#[derive(Clone, Debug)]
pub struct Ledger<S> {
    store: S,
}

impl<S> Ledger<S>
where
    S: Store,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Applies a signed delta to a member's points and returns the new
    /// total. A delta that would drive the total negative is rejected --
    /// never silently clamped -- so the caller can report the deficit.
    #[instrument(skip(self, reason))]
    pub async fn adjust_points(
        &self,
        member_id: &MemberId,
        delta: i64,
        reason: &str,
        actor_id: &str,
    ) -> StoreResult<i64> {
        let new_total = self
            .store
            .adjust_points(member_id, delta, reason, actor_id)
            .await?;

        tracing::info!(member = %member_id, delta, new_total, "points adjusted");
        Ok(new_total)
    }

    /// Registers a yellow or red card. Red cards deduct
    /// `point_penalty.unwrap_or(5)` points, capped at the member's balance
    /// -- unlike `adjust_points`, the mutation is never rejected for an
    /// uncovered penalty, because the card itself must register.
    #[instrument(skip(self))]
    pub async fn give_card(
        &self,
        member_id: &MemberId,
        kind: CardKind,
        point_penalty: Option<i64>,
        actor_id: &str,
    ) -> StoreResult<Member> {
        let penalty = match kind {
            CardKind::Yellow => 0,
            CardKind::Red => point_penalty.unwrap_or(DEFAULT_RED_CARD_PENALTY),
        };
        if penalty < 0 {
            return Err(StoreError::InvalidOperation {
                reason: format!("card penalty must be non-negative, got {penalty}"),
            });
        }

        let reason = match kind {
            CardKind::Yellow => "Yellow card".to_string(),
            CardKind::Red => "Red card".to_string(),
        };

        let member = self
            .store
            .give_card(member_id, kind, penalty, &reason, actor_id)
            .await?;

        tracing::info!(member = %member_id, %kind, points = member.points, "card given");
        Ok(member)
    }

    /// Zeroes the scoped counters for every member, all-or-nothing. A
    /// verification failure surfaces as [`StoreError::PartialFailure`] with
    /// nothing applied.
    #[instrument(skip(self))]
    pub async fn reset(&self, scope: ResetScope) -> StoreResult<u64> {
        let updated = self.store.reset_members(scope).await?;
        tracing::info!(?scope, updated, "bulk reset complete");
        Ok(updated)
    }

    /// Full roster ordered for the dashboard: points descending, then name.
    pub async fn roster(&self) -> StoreResult<Vec<Member>> {
        self.store.list_members().await
    }

    /// Directory glue: registers a member (or renames an existing one).
    /// The core otherwise treats the directory as externally managed.
    #[instrument(skip(self, name))]
    pub async fn register_member(
        &self,
        id: Option<MemberId>,
        name: &str,
    ) -> StoreResult<Member> {
        let member = match id {
            Some(id) => Member::with_id(id, name),
            None => Member::new(name),
        };

        self.store.upsert_member(&member).await
    }

    /// Audit entries for one civil day, newest first.
    pub async fn audit_log_for(&self, date: NaiveDate) -> StoreResult<Vec<AuditLogEntry>> {
        let (from, to) = civil_day_window(date);
        self.store.audit_log_between(from, to).await
    }
}
