use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::api::AppState;
use crate::domain::ArtistId;
use crate::error::AppError;
use crate::service::{AuditReport, EscrowInfo};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowQuery {
    pub limit: Option<i64>,
    /// Name to look up unclaimed candidates with, instead of the recorded one.
    pub name: Option<String>,
}

pub async fn get_escrow(
    Path(artist_id): Path<String>,
    Query(params): Query<EscrowQuery>,
    State(state): State<AppState>,
) -> Result<Json<EscrowInfo>, AppError> {
    if let Some(limit) = params.limit {
        if limit <= 0 {
            return Err(AppError::BadRequest("limit must be positive".into()));
        }
    }

    let info = state
        .ledger
        .escrow_info(
            &ArtistId::new(artist_id),
            params.limit,
            params.name.as_deref(),
        )
        .await?;
    Ok(Json(info))
}

pub async fn get_audit(
    Path(artist_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<AuditReport>, AppError> {
    Ok(Json(state.ledger.audit(&ArtistId::new(artist_id)).await?))
}
