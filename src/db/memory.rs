use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use tracing::instrument;

use crate::db::models::audit::AuditLogEntry;
use crate::db::models::member::{CardKind, Member, MemberId, ResetScope};
use crate::db::models::speaker::{DailySelection, SpeakerHistoryEntry};
use crate::db::store::{Store, StoreError, StoreResult};

/// In-memory twin of [`PgStore`](crate::db::postgres::PgStore).
///
/// One mutex guards all four tables, so every trait method is a single
/// linearizable step: the map-occupancy check in `insert_selection` plays
/// the role of the `selected_date` uniqueness constraint, and the critical
/// section in the ledger methods plays the role of a row-locking
/// transaction. Used by the test suite and as the `STORE_BACKEND=memory`
/// development mode.
#[derive(Clone, Debug, Default)]
pub struct MemStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    members: BTreeMap<String, Member>,
    history: BTreeMap<String, SpeakerHistoryEntry>,
    selections: BTreeMap<NaiveDate, Vec<MemberId>>,
    logs: Vec<AuditLogEntry>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Store for MemStore {
    #[instrument(skip(self, member), fields(member = %member.id))]
    async fn upsert_member(&self, member: &Member) -> StoreResult<Member> {
        let mut inner = self.guard();

        let stored = inner
            .members
            .entry(member.id.0.clone())
            .and_modify(|existing| {
                existing.name = member.name.clone();
                existing.updated_at = Utc::now().naive_utc();
            })
            .or_insert_with(|| member.clone());

        Ok(stored.clone())
    }

    #[instrument(skip(self))]
    async fn list_members(&self) -> StoreResult<Vec<Member>> {
        let inner = self.guard();

        let mut members: Vec<Member> = inner.members.values().cloned().collect();
        members.sort_by(|a, b| b.points.cmp(&a.points).then_with(|| a.name.cmp(&b.name)));

        Ok(members)
    }

    #[instrument(skip(self, ids))]
    async fn members_by_id(&self, ids: &[MemberId]) -> StoreResult<Vec<Member>> {
        let inner = self.guard();

        Ok(ids
            .iter()
            .filter_map(|id| inner.members.get(&id.0).cloned())
            .collect())
    }

    #[instrument(skip(self))]
    async fn speaker_history(&self) -> StoreResult<Vec<SpeakerHistoryEntry>> {
        Ok(self.guard().history.values().cloned().collect())
    }

    #[instrument(skip(self))]
    async fn mark_selected(&self, member_id: &MemberId, date: NaiveDate) -> StoreResult<()> {
        let mut inner = self.guard();

        if !inner.members.contains_key(&member_id.0) {
            return Err(StoreError::NotFound(member_id.clone()));
        }

        inner
            .history
            .entry(member_id.0.clone())
            .and_modify(|entry| {
                entry.last_selected_date = Some(date);
                entry.selection_count += 1;
            })
            .or_insert_with(|| SpeakerHistoryEntry {
                member_id: member_id.clone(),
                last_selected_date: Some(date),
                selection_count: 1,
            });

        Ok(())
    }

    #[instrument(skip(self))]
    async fn selection_for(&self, date: NaiveDate) -> StoreResult<Option<DailySelection>> {
        Ok(self
            .guard()
            .selections
            .get(&date)
            .map(|ids| DailySelection::new(date, ids.clone())))
    }

    #[instrument(skip(self, selection), fields(date = %selection.selected_date))]
    async fn insert_selection(&self, selection: &DailySelection) -> StoreResult<()> {
        let mut inner = self.guard();

        if inner.selections.contains_key(&selection.selected_date) {
            return Err(StoreError::Conflict {
                date: selection.selected_date,
            });
        }

        inner
            .selections
            .insert(selection.selected_date, selection.member_ids.clone());

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_selection(&self, date: NaiveDate) -> StoreResult<()> {
        self.guard().selections.remove(&date);
        Ok(())
    }

    #[instrument(skip(self, reason, actor_id))]
    async fn adjust_points(
        &self,
        member_id: &MemberId,
        delta: i64,
        reason: &str,
        actor_id: &str,
    ) -> StoreResult<i64> {
        let mut inner = self.guard();

        let member = inner
            .members
            .get_mut(&member_id.0)
            .ok_or_else(|| StoreError::NotFound(member_id.clone()))?;

        let candidate = member.points.checked_add(delta).ok_or_else(|| {
            StoreError::InvalidOperation {
                reason: "point total out of range".into(),
            }
        })?;
        if candidate < 0 {
            return Err(StoreError::InvalidOperation {
                reason: format!(
                    "cannot change points by {delta}: member '{}' holds {}",
                    member.name, member.points
                ),
            });
        }

        member.points = candidate;
        member.updated_at = Utc::now().naive_utc();

        let entry = AuditLogEntry::record(
            member_id.clone(),
            member.name.clone(),
            delta,
            reason,
            actor_id,
            Utc::now().naive_utc(),
        );
        inner.logs.push(entry);

        Ok(candidate)
    }

    #[instrument(skip(self, reason, actor_id))]
    async fn give_card(
        &self,
        member_id: &MemberId,
        kind: CardKind,
        point_penalty: i64,
        reason: &str,
        actor_id: &str,
    ) -> StoreResult<Member> {
        let mut inner = self.guard();

        let member = inner
            .members
            .get_mut(&member_id.0)
            .ok_or_else(|| StoreError::NotFound(member_id.clone()))?;

        // Red cards cap the deduction at the current balance rather than
        // rejecting; the card must register even when the debt cannot be
        // fully paid.
        let deducted = match kind {
            CardKind::Yellow => {
                member.yellow_cards += 1;
                0
            }
            CardKind::Red => {
                let deducted = point_penalty.min(member.points);
                member.red_cards += 1;
                member.points -= deducted;
                deducted
            }
        };
        member.updated_at = Utc::now().naive_utc();

        let updated = member.clone();
        let entry = AuditLogEntry::record(
            member_id.clone(),
            updated.name.clone(),
            -deducted,
            reason,
            actor_id,
            Utc::now().naive_utc(),
        );
        inner.logs.push(entry);

        Ok(updated)
    }

    #[instrument(skip(self))]
    async fn reset_members(&self, scope: ResetScope) -> StoreResult<u64> {
        let mut inner = self.guard();
        let now = Utc::now().naive_utc();

        let mut updated = 0u64;
        for member in inner.members.values_mut() {
            match scope {
                ResetScope::Points => member.points = 0,
                ResetScope::Cards => {
                    member.yellow_cards = 0;
                    member.red_cards = 0;
                }
                ResetScope::All => {
                    member.points = 0;
                    member.yellow_cards = 0;
                    member.red_cards = 0;
                }
            }
            member.updated_at = now;
            updated += 1;
        }

        Ok(updated)
    }

    #[instrument(skip(self))]
    async fn audit_log_between(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> StoreResult<Vec<AuditLogEntry>> {
        let inner = self.guard();

        Ok(inner
            .logs
            .iter()
            .rev()
            .filter(|entry| entry.created_at >= from && entry.created_at < to)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod test {
    use chrono::NaiveDate;

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn insert_selection_enforces_date_uniqueness() {
        let store = MemStore::new();
        let member = store.upsert_member(&Member::new("asha")).await.unwrap();

        let selection = DailySelection::new(date(2024, 3, 1), vec![member.id.clone()]);
        store.insert_selection(&selection).await.unwrap();

        let err = store.insert_selection(&selection).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn mark_selected_creates_then_increments() {
        let store = MemStore::new();
        let member = store.upsert_member(&Member::new("devi")).await.unwrap();

        store
            .mark_selected(&member.id, date(2024, 3, 1))
            .await
            .unwrap();
        store
            .mark_selected(&member.id, date(2024, 3, 2))
            .await
            .unwrap();

        let history = store.speaker_history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].selection_count, 2);
        assert_eq!(history[0].last_selected_date, Some(date(2024, 3, 2)));
    }

    #[tokio::test]
    async fn upsert_preserves_ledger_counters() {
        let store = MemStore::new();
        let member = store.upsert_member(&Member::new("kiran")).await.unwrap();
        store
            .adjust_points(&member.id, 7, "setup", "admin")
            .await
            .unwrap();

        let mut renamed = member.clone();
        renamed.name = "kiran r".to_string();
        let stored = store.upsert_member(&renamed).await.unwrap();

        assert_eq!(stored.name, "kiran r");
        assert_eq!(stored.points, 7);
    }
}
