pub mod escrow;
pub mod health;
pub mod matching;
pub mod payouts;
pub mod tips;
pub mod unclaimed;

use crate::config::Config;
use crate::db::Repository;
use crate::domain::Money;
use crate::engine::OwnershipResolver;
use crate::error::AppError;
use crate::service::{ArtistLocks, EscrowLedger, MatchingService, PayoutService};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Config,
    pub ledger: Arc<EscrowLedger>,
    pub matching: Arc<MatchingService>,
    pub payouts: Arc<PayoutService>,
}

impl AppState {
    /// Wire the services over one repository. The rights registry is read from
    /// the same database, and all services share one per-artist lock table.
    pub fn new(repo: Arc<Repository>, config: Config) -> Self {
        let locks = ArtistLocks::new();
        let resolver = OwnershipResolver::new(repo.clone());
        let ledger = Arc::new(EscrowLedger::new(
            repo.clone(),
            resolver,
            locks.clone(),
            &config,
        ));
        let matching = Arc::new(MatchingService::new(repo.clone(), locks.clone(), &config));
        let payouts = Arc::new(PayoutService::new(repo.clone(), locks, &config));
        Self {
            repo,
            config,
            ledger,
            matching,
            payouts,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/tips", post(tips::post_tip))
        .route("/v1/tips/:tip_id", get(tips::get_tip))
        .route("/v1/artists/:artist_id/escrow", get(escrow::get_escrow))
        .route("/v1/artists/:artist_id/audit", get(escrow::get_audit))
        .route("/v1/artists/:artist_id/match", post(matching::post_match))
        .route(
            "/v1/artists/:artist_id/eligibility",
            get(payouts::get_eligibility),
        )
        .route(
            "/v1/artists/:artist_id/payouts",
            post(payouts::post_payout).get(payouts::list_payouts),
        )
        .route(
            "/v1/payouts/:request_id/confirm",
            post(payouts::confirm_payout),
        )
        .route("/v1/payouts/:request_id/cancel", post(payouts::cancel_payout))
        .route("/v1/unclaimed", get(unclaimed::get_unclaimed))
        .layer(cors)
        .with_state(state)
}

/// Integer pence from a request field, rejecting negatives.
pub(crate) fn parse_pence(field: &str, value: i64) -> Result<Money, AppError> {
    Money::try_new(value).map_err(|_| {
        AppError::BadRequest(format!(
            "{} must be a non-negative integer of pence",
            field
        ))
    })
}
