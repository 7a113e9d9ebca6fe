use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::api::{parse_pence, AppState};
use crate::domain::{BidderId, MediaId, TimeMs, TipEvent, TipId};
use crate::error::AppError;
use crate::service::ledger::TipDetails;
use crate::service::AllocationOutcome;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TipRequest {
    pub tip_id: String,
    pub media_id: String,
    pub bidder_id: String,
    pub amount: i64,
    /// Confirmation time in ms; defaults to now.
    pub timestamp: Option<i64>,
}

/// Allocate a confirmed tip. `201` on first delivery, `200` for a duplicate.
pub async fn post_tip(
    State(state): State<AppState>,
    Json(body): Json<TipRequest>,
) -> Result<(StatusCode, Json<AllocationOutcome>), AppError> {
    let amount = parse_pence("amount", body.amount)?;
    let tip = TipEvent::new(
        TipId::new(body.tip_id),
        MediaId::new(body.media_id),
        BidderId::new(body.bidder_id),
        amount,
        body.timestamp.map(TimeMs::new).unwrap_or_else(TimeMs::now),
    );

    let outcome = state.ledger.allocate(tip).await?;
    let status = if outcome.duplicate {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(outcome)))
}

pub async fn get_tip(
    Path(tip_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<TipDetails>, AppError> {
    let tip_id = TipId::new(tip_id);
    state
        .ledger
        .tip(&tip_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("tip {} not found", tip_id)))
}
