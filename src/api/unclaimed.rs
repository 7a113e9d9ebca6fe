use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::api::AppState;
use crate::error::AppError;
use crate::service::ledger::UnclaimedView;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnclaimedQuery {
    pub name: Option<String>,
    pub channel_id: Option<String>,
}

pub async fn get_unclaimed(
    Query(params): Query<UnclaimedQuery>,
    State(state): State<AppState>,
) -> Result<Json<UnclaimedView>, AppError> {
    let view = state
        .ledger
        .unclaimed(params.name.as_deref(), params.channel_id.as_deref())
        .await?;
    Ok(Json(view))
}
