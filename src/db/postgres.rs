use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::instrument;

use crate::db::models::audit::AuditLogEntry;
use crate::db::models::member::{CardKind, Member, MemberId, ResetScope};
use crate::db::models::speaker::{DailySelection, SpeakerHistoryEntry};
use crate::db::store::{Store, StoreError, StoreResult};

const MEMBER_FIELDS: &str = "id, name, points, yellow_cards, red_cards, created_at, updated_at";

const AUDIT_FIELDS: &str =
    "id, created_at, member_id, member_name, points_changed, reason, actor_id";

/// Idempotent schema, issued at startup.
///
/// The `daily_selection.selected_date` primary key is the concurrency gate
/// the rotation scheduler relies on; it must stay a storage-level constraint.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS members (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        points BIGINT NOT NULL DEFAULT 0 CHECK (points >= 0),
        yellow_cards BIGINT NOT NULL DEFAULT 0,
        red_cards BIGINT NOT NULL DEFAULT 0,
        created_at TIMESTAMP NOT NULL,
        updated_at TIMESTAMP NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS speaker_history (
        member_id TEXT PRIMARY KEY REFERENCES members (id),
        last_selected_date DATE,
        selection_count BIGINT NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS daily_selection (
        selected_date DATE PRIMARY KEY,
        member_ids TEXT[] NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS admin_logs (
        id TEXT PRIMARY KEY,
        created_at TIMESTAMP NOT NULL,
        member_id TEXT NOT NULL,
        member_name TEXT NOT NULL,
        points_changed BIGINT NOT NULL DEFAULT 0,
        reason TEXT NOT NULL DEFAULT '',
        actor_id TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS admin_logs_created_at_idx ON admin_logs (created_at)",
];

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    #[instrument(skip(self))]
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        Ok(())
    }
}

async fn append_audit(
    tx: &mut Transaction<'_, Postgres>,
    entry: &AuditLogEntry,
) -> StoreResult<()> {
    sqlx::query(&format!(
        "INSERT INTO admin_logs ({AUDIT_FIELDS}) VALUES ($1, $2, $3, $4, $5, $6, $7)"
    ))
    .bind(&entry.id)
    .bind(entry.created_at)
    .bind(&entry.member_id)
    .bind(&entry.member_name)
    .bind(entry.points_changed)
    .bind(&entry.reason)
    .bind(&entry.actor_id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

const fn reset_set_clause(scope: ResetScope) -> &'static str {
    match scope {
        ResetScope::Points => "points = 0",
        ResetScope::Cards => "yellow_cards = 0, red_cards = 0",
        ResetScope::All => "points = 0, yellow_cards = 0, red_cards = 0",
    }
}

const fn reset_dirty_clause(scope: ResetScope) -> &'static str {
    match scope {
        ResetScope::Points => "points <> 0",
        ResetScope::Cards => "yellow_cards <> 0 OR red_cards <> 0",
        ResetScope::All => "points <> 0 OR yellow_cards <> 0 OR red_cards <> 0",
    }
}

#[async_trait]
impl Store for PgStore {
    #[instrument(skip(self, member), fields(member = %member.id))]
    async fn upsert_member(&self, member: &Member) -> StoreResult<Member> {
        let stored = sqlx::query_as::<_, Member>(&format!(
            r#"
            INSERT INTO members ({MEMBER_FIELDS})
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id)
            DO UPDATE SET
                name = EXCLUDED.name,
                updated_at = EXCLUDED.updated_at
            RETURNING {MEMBER_FIELDS}
            "#
        ))
        .bind(&member.id)
        .bind(&member.name)
        .bind(member.points)
        .bind(member.yellow_cards)
        .bind(member.red_cards)
        .bind(member.created_at)
        .bind(member.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(stored)
    }

    #[instrument(skip(self))]
    async fn list_members(&self) -> StoreResult<Vec<Member>> {
        Ok(sqlx::query_as::<_, Member>(&format!(
            "SELECT {MEMBER_FIELDS} FROM members ORDER BY points DESC, name ASC"
        ))
        .fetch_all(&self.pool)
        .await?)
    }

    #[instrument(skip(self, ids))]
    async fn members_by_id(&self, ids: &[MemberId]) -> StoreResult<Vec<Member>> {
        let raw_ids: Vec<String> = ids.iter().map(|id| id.0.clone()).collect();

        let rows = sqlx::query_as::<_, Member>(&format!(
            "SELECT {MEMBER_FIELDS} FROM members WHERE id = ANY($1)"
        ))
        .bind(&raw_ids)
        .fetch_all(&self.pool)
        .await?;

        // Resolve in the order the caller asked for (selection order).
        Ok(ids
            .iter()
            .filter_map(|id| rows.iter().find(|m| &m.id == id).cloned())
            .collect())
    }

    #[instrument(skip(self))]
    async fn speaker_history(&self) -> StoreResult<Vec<SpeakerHistoryEntry>> {
        Ok(sqlx::query_as::<_, SpeakerHistoryEntry>(
            "SELECT member_id, last_selected_date, selection_count FROM speaker_history",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    #[instrument(skip(self))]
    async fn mark_selected(&self, member_id: &MemberId, date: NaiveDate) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO speaker_history (member_id, last_selected_date, selection_count)
            VALUES ($1, $2, 1)
            ON CONFLICT (member_id)
            DO UPDATE SET
                last_selected_date = EXCLUDED.last_selected_date,
                selection_count = speaker_history.selection_count + 1
            "#,
        )
        .bind(member_id)
        .bind(date)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn selection_for(&self, date: NaiveDate) -> StoreResult<Option<DailySelection>> {
        let row = sqlx::query_as::<_, (NaiveDate, Vec<String>)>(
            "SELECT selected_date, member_ids FROM daily_selection WHERE selected_date = $1",
        )
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(selected_date, ids)| {
            DailySelection::new(selected_date, ids.into_iter().map(MemberId).collect())
        }))
    }

    #[instrument(skip(self, selection), fields(date = %selection.selected_date))]
    async fn insert_selection(&self, selection: &DailySelection) -> StoreResult<()> {
        let raw_ids: Vec<String> = selection.member_ids.iter().map(|id| id.0.clone()).collect();

        sqlx::query("INSERT INTO daily_selection (selected_date, member_ids) VALUES ($1, $2)")
            .bind(selection.selected_date)
            .bind(&raw_ids)
            .execute(&self.pool)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict {
                    date: selection.selected_date,
                },
                _ => StoreError::from(e),
            })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_selection(&self, date: NaiveDate) -> StoreResult<()> {
        sqlx::query("DELETE FROM daily_selection WHERE selected_date = $1")
            .bind(date)
            .execute(&self.pool)
            .await?;

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
        let mut tx = self.pool.begin().await?;

        // Row lock serializes concurrent adjustments against the same
        // member; the audit append commits with the balance or not at all.
        let row = sqlx::query_as::<_, (String, i64)>(
            "SELECT name, points FROM members WHERE id = $1 FOR UPDATE",
        )
        .bind(member_id)
        .fetch_optional(&mut *tx)
        .await?;

        let (name, points) = row.ok_or_else(|| StoreError::NotFound(member_id.clone()))?;

        let candidate = points
            .checked_add(delta)
            .ok_or_else(|| StoreError::InvalidOperation {
                reason: "point total out of range".into(),
            })?;
        if candidate < 0 {
            return Err(StoreError::InvalidOperation {
                reason: format!("cannot change points by {delta}: member '{name}' holds {points}"),
            });
        }

        sqlx::query("UPDATE members SET points = $1, updated_at = $2 WHERE id = $3")
            .bind(candidate)
            .bind(Utc::now().naive_utc())
            .bind(member_id)
            .execute(&mut *tx)
            .await?;

        let entry = AuditLogEntry::record(
            member_id.clone(),
            name,
            delta,
            reason,
            actor_id,
            Utc::now().naive_utc(),
        );
        append_audit(&mut tx, &entry).await?;

        tx.commit().await?;
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
        let mut tx = self.pool.begin().await?;

        let member = sqlx::query_as::<_, Member>(&format!(
            "SELECT {MEMBER_FIELDS} FROM members WHERE id = $1 FOR UPDATE"
        ))
        .bind(member_id)
        .fetch_optional(&mut *tx)
        .await?;

        let mut member = member.ok_or_else(|| StoreError::NotFound(member_id.clone()))?;

        // Capped, not rejected: the card registers even when the balance
        // cannot cover the full penalty.
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

        sqlx::query(
            r#"
            UPDATE members
            SET points = $1, yellow_cards = $2, red_cards = $3, updated_at = $4
            WHERE id = $5
            "#,
        )
        .bind(member.points)
        .bind(member.yellow_cards)
        .bind(member.red_cards)
        .bind(member.updated_at)
        .bind(member_id)
        .execute(&mut *tx)
        .await?;

        let entry = AuditLogEntry::record(
            member_id.clone(),
            member.name.clone(),
            -deducted,
            reason,
            actor_id,
            Utc::now().naive_utc(),
        );
        append_audit(&mut tx, &entry).await?;

        tx.commit().await?;
        Ok(member)
    }

    #[instrument(skip(self))]
    async fn reset_members(&self, scope: ResetScope) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(&format!(
            "UPDATE members SET {}, updated_at = $1",
            reset_set_clause(scope)
        ))
        .bind(Utc::now().naive_utc())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        // Post-condition check inside the transaction: either every row
        // verifies clean and the whole reset commits, or nothing does.
        let dirty = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM members WHERE {}",
            reset_dirty_clause(scope)
        ))
        .fetch_one(&mut *tx)
        .await?;

        if dirty > 0 {
            tx.rollback().await?;
            return Err(StoreError::PartialFailure {
                reason: format!("{dirty} member rows failed reset verification"),
            });
        }

        tx.commit().await?;
        Ok(updated)
    }

    #[instrument(skip(self))]
    async fn audit_log_between(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> StoreResult<Vec<AuditLogEntry>> {
        Ok(sqlx::query_as::<_, AuditLogEntry>(&format!(
            r#"
            SELECT {AUDIT_FIELDS} FROM admin_logs
            WHERE created_at >= $1 AND created_at < $2
            ORDER BY created_at DESC
            "#
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?)
    }
}
