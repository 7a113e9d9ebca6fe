use axum::http::StatusCode;
use std::sync::Arc;
use tempfile::TempDir;
use tipescrow::api;
use tipescrow::config::Config;
use tipescrow::db::init_db;
use tipescrow::domain::{ArtistId, MediaId, MediaOwnership, Money, OwnershipEntry, Share};
use tipescrow::Repository;
use tower::util::ServiceExt;

struct TestApp {
    app: axum::Router,
    _temp: TempDir,
}

/// Whole tips go to the artist so balances equal tip totals.
async fn setup_test_app() -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));

    let media = MediaOwnership::new(MediaId::new("m1"), "Solo").with_entry(
        OwnershipEntry::verified(ArtistId::new("a"), Share::from_str_canonical("1").unwrap()),
    );
    repo.register_media(&media).await.unwrap();

    let config = Config {
        port: 0,
        database_path: db_path,
        artist_share_percent: 100,
        first_payout_threshold: Money::from_pence(3300),
        payout_increment: Money::from_pence(1000),
        min_payout: Money::from_pence(100),
        history_limit: 50,
        contention_retry_ms: 2000,
    };

    TestApp {
        app: api::create_router(api::AppState::new(repo, config)),
        _temp: temp_dir,
    }
}

async fn send(
    app: axum::Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = axum::http::Request::builder().method(method).uri(uri);
    let req = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(axum::body::Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(axum::body::Body::empty()).unwrap(),
    };

    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn tip(t: &TestApp, tip_id: &str, amount: i64) {
    let (status, _) = send(
        t.app.clone(),
        "POST",
        "/v1/tips",
        Some(serde_json::json!({
            "tipId": tip_id,
            "mediaId": "m1",
            "bidderId": "fan",
            "amount": amount,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

async fn request_full(t: &TestApp) -> (StatusCode, serde_json::Value) {
    send(
        t.app.clone(),
        "POST",
        "/v1/artists/a/payouts",
        Some(serde_json::json!({
            "method": "paypal",
            "methodDetails": {"email": "a@example.com"},
        })),
    )
    .await
}

#[tokio::test]
async fn test_first_payout_threshold_boundary() {
    let t = setup_test_app().await;
    tip(&t, "t1", 3299).await;

    let (status, json) = send(t.app.clone(), "GET", "/v1/artists/a/eligibility", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["eligible"], false);
    assert_eq!(json["reason"], "below_first_payout_threshold");
    assert_eq!(json["remainingToEligible"], 1);
    assert_eq!(json["isFirstPayout"], true);

    let (status, rejected) = request_full(&t).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(rejected["reason"], "below_first_payout_threshold");
    assert_eq!(rejected["remainingToEligible"], 1);

    tip(&t, "t2", 1).await;
    let (_, json) = send(t.app.clone(), "GET", "/v1/artists/a/eligibility", None).await;
    assert_eq!(json["eligible"], true);
    assert_eq!(json["reason"], "eligible");
    assert_eq!(json["remainingToEligible"], 0);
}

#[tokio::test]
async fn test_full_payout_then_increment_gate() {
    let t = setup_test_app().await;
    tip(&t, "t1", 3300).await;

    let (status, request) = request_full(&t).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(request["status"], "submitted");
    assert_eq!(request["amountApproved"], 3300);
    assert_eq!(request["totalEarnedAtRequest"], 3300);
    let request_id = request["requestId"].as_str().unwrap().to_string();

    // Nothing is debited until the operator confirms.
    let (_, escrow) = send(t.app.clone(), "GET", "/v1/artists/a/escrow", None).await;
    assert_eq!(escrow["balance"], 3300);

    let confirm_uri = format!("/v1/payouts/{}/confirm", request_id);
    let (status, processed) = send(t.app.clone(), "POST", &confirm_uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(processed["status"], "processed");

    let (status, again) = send(t.app.clone(), "POST", &confirm_uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again, processed);

    let (_, escrow) = send(t.app.clone(), "GET", "/v1/artists/a/escrow", None).await;
    assert_eq!(escrow["balance"], 0);
    assert_eq!(escrow["totalEscrowEarned"], 3300);
    assert_eq!(escrow["lastPayoutTotalEarned"], 3300);
    assert_eq!(escrow["payoutCount"], 1);

    tip(&t, "t2", 999).await;
    let (_, json) = send(t.app.clone(), "GET", "/v1/artists/a/eligibility", None).await;
    assert_eq!(json["eligible"], false);
    assert_eq!(json["reason"], "below_payout_increment");
    assert_eq!(json["remainingToEligible"], 1);
    assert_eq!(json["isFirstPayout"], false);

    tip(&t, "t3", 1).await;
    let (_, json) = send(t.app.clone(), "GET", "/v1/artists/a/eligibility", None).await;
    assert_eq!(json["eligible"], true);

    let (_, audit) = send(t.app.clone(), "GET", "/v1/artists/a/audit", None).await;
    assert_eq!(audit["consistent"], true);
    assert_eq!(audit["balance"], 1000);
}

#[tokio::test]
async fn test_partial_request_reserves_whole_records() {
    let t = setup_test_app().await;
    tip(&t, "t1", 1100).await;
    tip(&t, "t2", 1100).await;
    tip(&t, "t3", 1100).await;

    let (status, request) = send(
        t.app.clone(),
        "POST",
        "/v1/artists/a/payouts",
        Some(serde_json::json!({"amount": 2500, "method": "bank_transfer"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(request["amountRequested"], 2500);
    assert_eq!(request["amountApproved"], 2200);

    let uri = format!(
        "/v1/payouts/{}/confirm",
        request["requestId"].as_str().unwrap()
    );
    let (status, _) = send(t.app.clone(), "POST", &uri, None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, escrow) = send(t.app.clone(), "GET", "/v1/artists/a/escrow", None).await;
    assert_eq!(escrow["balance"], 1100);
}

#[tokio::test]
async fn test_request_above_balance_is_422() {
    let t = setup_test_app().await;
    tip(&t, "t1", 3300).await;

    let (status, json) = send(
        t.app.clone(),
        "POST",
        "/v1/artists/a/payouts",
        Some(serde_json::json!({"amount": 5000, "method": "paypal"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["reason"], "insufficient_balance");
    assert_eq!(json["balance"], 3300);
}

#[tokio::test]
async fn test_one_outstanding_request_and_cancel() {
    let t = setup_test_app().await;
    tip(&t, "t1", 4000).await;

    let (status, first) = request_full(&t).await;
    assert_eq!(status, StatusCode::CREATED);
    let request_id = first["requestId"].as_str().unwrap().to_string();

    let (status, conflict) = request_full(&t).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(conflict["requestId"], request_id.as_str());

    let (_, eligibility) = send(t.app.clone(), "GET", "/v1/artists/a/eligibility", None).await;
    assert_eq!(eligibility["eligible"], false);
    assert_eq!(eligibility["reason"], "payout_pending");
    assert_eq!(eligibility["amount"], 0);

    let cancel_uri = format!("/v1/payouts/{}/cancel", request_id);
    let (status, cancelled) = send(t.app.clone(), "POST", &cancel_uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");

    let (status, _) = send(t.app.clone(), "POST", &cancel_uri, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let confirm_uri = format!("/v1/payouts/{}/confirm", request_id);
    let (status, _) = send(t.app.clone(), "POST", &confirm_uri, None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Reservations were released, so a new request can take the balance.
    let (status, second) = request_full(&t).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(second["amountApproved"], 4000);

    let (status, list) = send(t.app.clone(), "GET", "/v1/artists/a/payouts", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["artistId"], "a");
    assert_eq!(list["payouts"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_client_request_id_is_idempotent() {
    let t = setup_test_app().await;
    tip(&t, "t1", 3300).await;

    let body = serde_json::json!({"requestId": "req-1", "method": "paypal"});
    let (status, first) = send(
        t.app.clone(),
        "POST",
        "/v1/artists/a/payouts",
        Some(body.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["requestId"], "req-1");

    let (status, second) = send(t.app.clone(), "POST", "/v1/artists/a/payouts", Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(second, first);
}

#[tokio::test]
async fn test_unknown_payout_is_404() {
    let t = setup_test_app().await;
    let (status, json) = send(
        t.app.clone(),
        "POST",
        "/v1/payouts/does-not-exist/confirm",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("does-not-exist"));
}

#[tokio::test]
async fn test_negative_eligibility_amount_is_400() {
    let t = setup_test_app().await;
    let (status, _) = send(
        t.app.clone(),
        "GET",
        "/v1/artists/a/eligibility?amount=-1",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
