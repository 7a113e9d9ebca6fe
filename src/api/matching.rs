use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use crate::api::AppState;
use crate::domain::ArtistId;
use crate::error::AppError;
use crate::service::MatchOutcome;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRequest {
    #[serde(default)]
    pub artist_name: String,
    pub channel_id: Option<String>,
}

/// Claim unclaimed allocations for a verified artist. Zero matches is a `200`.
pub async fn post_match(
    Path(artist_id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<MatchRequest>,
) -> Result<Json<MatchOutcome>, AppError> {
    let outcome = state
        .matching
        .match_unclaimed(
            &ArtistId::new(artist_id),
            &body.artist_name,
            body.channel_id.as_deref(),
        )
        .await?;
    Ok(Json(outcome))
}
