use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::api::server::{AppState, JsonResult};
use crate::db::models::audit::AuditLogEntry;
use crate::db::models::member::{CardKind, Member, MemberId, ResetScope};
use crate::db::store::Store;

#[derive(Debug, Deserialize)]
pub struct RegisterMemberBody {
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct AdjustPointsBody {
    pub delta: i64,
    #[serde(default)]
    pub reason: String,
    pub actor_id: String,
}

#[derive(Debug, Deserialize)]
pub struct GiveCardBody {
    pub kind: CardKind,
    pub point_penalty: Option<i64>,
    pub actor_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetBody {
    pub scope: ResetScope,
}

#[derive(Debug, Serialize)]
pub struct PointsResponse {
    pub member_id: MemberId,
    pub points: i64,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub members_updated: u64,
}

#[instrument(skip(state))]
pub async fn roster<S>(State(state): State<Arc<AppState<S>>>) -> JsonResult<Vec<Member>>
where
    S: Store + Clone + Send + Sync + 'static,
{
    Ok(Json(state.ledger.roster().await?))
}

#[instrument(skip(state, body))]
pub async fn register_member<S>(
    State(state): State<Arc<AppState<S>>>,
    Json(body): Json<RegisterMemberBody>,
) -> JsonResult<Member>
where
    S: Store + Clone + Send + Sync + 'static,
{
    let member = state
        .ledger
        .register_member(body.id.map(MemberId::from), &body.name)
        .await?;

    Ok(Json(member))
}

#[instrument(skip(state, body))]
pub async fn adjust_points<S>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(body): Json<AdjustPointsBody>,
) -> JsonResult<PointsResponse>
where
    S: Store + Clone + Send + Sync + 'static,
{
    let member_id = MemberId::from(id);
    let points = state
        .ledger
        .adjust_points(&member_id, body.delta, &body.reason, &body.actor_id)
        .await?;

    Ok(Json(PointsResponse { member_id, points }))
}

#[instrument(skip(state, body))]
pub async fn give_card<S>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(body): Json<GiveCardBody>,
) -> JsonResult<Member>
where
    S: Store + Clone + Send + Sync + 'static,
{
    let member = state
        .ledger
        .give_card(
            &MemberId::from(id),
            body.kind,
            body.point_penalty,
            &body.actor_id,
        )
        .await?;

    Ok(Json(member))
}

#[instrument(skip(state))]
pub async fn speakers_today<S>(State(state): State<Arc<AppState<S>>>) -> JsonResult<Vec<Member>>
where
    S: Store + Clone + Send + Sync + 'static,
{
    Ok(Json(state.scheduler.speakers_today().await?))
}

#[instrument(skip(state))]
pub async fn reshuffle_today<S>(State(state): State<Arc<AppState<S>>>) -> JsonResult<Vec<Member>>
where
    S: Store + Clone + Send + Sync + 'static,
{
    let today = state.scheduler.today();
    Ok(Json(state.scheduler.reshuffle(today).await?))
}

#[instrument(skip(state, body))]
pub async fn reset_members<S>(
    State(state): State<Arc<AppState<S>>>,
    Json(body): Json<ResetBody>,
) -> JsonResult<ResetResponse>
where
    S: Store + Clone + Send + Sync + 'static,
{
    let members_updated = state.ledger.reset(body.scope).await?;
    Ok(Json(ResetResponse { members_updated }))
}

#[instrument(skip(state))]
pub async fn logs_today<S>(State(state): State<Arc<AppState<S>>>) -> JsonResult<Vec<AuditLogEntry>>
where
    S: Store + Clone + Send + Sync + 'static,
{
    let today = state.scheduler.today();
    Ok(Json(state.ledger.audit_log_for(today).await?))
}
