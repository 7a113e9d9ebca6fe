use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::{parse_pence, AppState};
use crate::domain::{ArtistId, PayoutMethod, PayoutRequest, RequestId};
use crate::engine::Eligibility;
use crate::error::AppError;
use crate::service::RequestPayout;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityQuery {
    pub amount: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutBody {
    pub request_id: Option<String>,
    /// Omit to request the full balance.
    pub amount: Option<i64>,
    pub method: PayoutMethod,
    #[serde(default)]
    pub method_details: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutListResponse {
    pub artist_id: ArtistId,
    pub payouts: Vec<PayoutRequest>,
}

pub async fn get_eligibility(
    Path(artist_id): Path<String>,
    Query(params): Query<EligibilityQuery>,
    State(state): State<AppState>,
) -> Result<Json<Eligibility>, AppError> {
    let amount = params
        .amount
        .map(|a| parse_pence("amount", a))
        .transpose()?;
    let eligibility = state
        .payouts
        .check_eligibility(&ArtistId::new(artist_id), amount)
        .await?;
    Ok(Json(eligibility))
}

pub async fn post_payout(
    Path(artist_id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<PayoutBody>,
) -> Result<(StatusCode, Json<PayoutRequest>), AppError> {
    let amount = body
        .amount
        .map(|a| parse_pence("amount", a))
        .transpose()?;
    let request = state
        .payouts
        .request_payout(RequestPayout {
            request_id: body.request_id.map(RequestId::new),
            artist_id: ArtistId::new(artist_id),
            amount,
            method: body.method,
            method_details: body
                .method_details
                .unwrap_or_else(|| serde_json::json!({})),
        })
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn list_payouts(
    Path(artist_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<PayoutListResponse>, AppError> {
    let artist_id = ArtistId::new(artist_id);
    let payouts = state.payouts.list_payouts(&artist_id).await?;
    Ok(Json(PayoutListResponse { artist_id, payouts }))
}

/// Operator reports the transfer succeeded; debits the ledger.
pub async fn confirm_payout(
    Path(request_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<PayoutRequest>, AppError> {
    let request = state
        .payouts
        .confirm_payout(&RequestId::new(request_id))
        .await?;
    Ok(Json(request))
}

pub async fn cancel_payout(
    Path(request_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<PayoutRequest>, AppError> {
    let request = state
        .payouts
        .cancel_payout(&RequestId::new(request_id))
        .await?;
    Ok(Json(request))
}
