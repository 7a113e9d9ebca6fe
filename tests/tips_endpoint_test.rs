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
    repo: Arc<Repository>,
    _temp: TempDir,
}

async fn setup_test_app() -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));

    let config = Config {
        port: 0,
        database_path: db_path,
        artist_share_percent: 70,
        first_payout_threshold: Money::from_pence(3300),
        payout_increment: Money::from_pence(1000),
        min_payout: Money::from_pence(100),
        history_limit: 50,
        contention_retry_ms: 2000,
    };

    let app = api::create_router(api::AppState::new(repo.clone(), config));
    TestApp {
        app,
        repo,
        _temp: temp_dir,
    }
}

fn share(s: &str) -> Share {
    Share::from_str_canonical(s).unwrap()
}

async fn register_sixty_forty(repo: &Repository) {
    let media = MediaOwnership::new(MediaId::new("m1"), "Duo")
        .with_title("First Single")
        .with_entry(OwnershipEntry::verified(ArtistId::new("a"), share("0.6")))
        .with_entry(OwnershipEntry::verified(ArtistId::new("b"), share("0.4")));
    repo.register_media(&media).await.unwrap();
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
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn tip_body(tip_id: &str, media_id: &str, amount: i64) -> serde_json::Value {
    serde_json::json!({
        "tipId": tip_id,
        "mediaId": media_id,
        "bidderId": "fan-1",
        "amount": amount,
        "timestamp": 1_700_000_000_000i64,
    })
}

fn amounts_by_artist(records: &serde_json::Value) -> Vec<(String, i64)> {
    let mut out: Vec<(String, i64)> = records
        .as_array()
        .unwrap()
        .iter()
        .map(|r| {
            (
                r["owner"]["artistId"].as_str().unwrap().to_string(),
                r["amount"].as_i64().unwrap(),
            )
        })
        .collect();
    out.sort();
    out
}

#[tokio::test]
async fn test_post_tip_splits_pool_by_share() {
    let t = setup_test_app().await;
    register_sixty_forty(&t.repo).await;

    let (status, json) = send(
        t.app.clone(),
        "POST",
        "/v1/tips",
        Some(tip_body("t1", "m1", 1000)),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["artistPool"], 700);
    assert_eq!(json["platformFee"], 300);
    assert_eq!(json["duplicate"], false);
    assert_eq!(
        amounts_by_artist(&json["records"]),
        vec![("a".to_string(), 420), ("b".to_string(), 280)]
    );

    let (status, escrow) = send(t.app.clone(), "GET", "/v1/artists/a/escrow", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(escrow["balance"], 420);
    assert_eq!(escrow["totalEscrowEarned"], 420);
}

#[tokio::test]
async fn test_redelivered_tip_is_not_allocated_twice() {
    let t = setup_test_app().await;
    register_sixty_forty(&t.repo).await;

    let (first_status, first) = send(
        t.app.clone(),
        "POST",
        "/v1/tips",
        Some(tip_body("t1", "m1", 1000)),
    )
    .await;
    let (second_status, second) = send(
        t.app.clone(),
        "POST",
        "/v1/tips",
        Some(tip_body("t1", "m1", 1000)),
    )
    .await;

    assert_eq!(first_status, StatusCode::CREATED);
    assert_eq!(second_status, StatusCode::OK);
    assert_eq!(second["duplicate"], true);
    assert_eq!(first["records"], second["records"]);

    let (_, escrow) = send(t.app.clone(), "GET", "/v1/artists/b/escrow", None).await;
    assert_eq!(escrow["balance"], 280);
    assert_eq!(escrow["history"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_tip_for_unknown_media_is_404_and_writes_nothing() {
    let t = setup_test_app().await;

    let (status, json) = send(
        t.app.clone(),
        "POST",
        "/v1/tips",
        Some(tip_body("t1", "missing", 500)),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("missing"));

    let (status, _) = send(t.app.clone(), "GET", "/v1/tips/t1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_zero_and_negative_amounts_are_rejected() {
    let t = setup_test_app().await;
    register_sixty_forty(&t.repo).await;

    let (status, _) = send(
        t.app.clone(),
        "POST",
        "/v1/tips",
        Some(tip_body("t0", "m1", 0)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        t.app.clone(),
        "POST",
        "/v1/tips",
        Some(tip_body("tneg", "m1", -5)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_tip_returns_split_and_records() {
    let t = setup_test_app().await;
    register_sixty_forty(&t.repo).await;
    send(
        t.app.clone(),
        "POST",
        "/v1/tips",
        Some(tip_body("t1", "m1", 1000)),
    )
    .await;

    let (status, json) = send(t.app.clone(), "GET", "/v1/tips/t1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["tipId"], "t1");
    assert_eq!(json["mediaId"], "m1");
    assert_eq!(json["amount"], 1000);
    assert_eq!(json["artistPool"], 700);
    assert_eq!(json["records"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_unverified_owner_goes_to_unclaimed_pool() {
    let t = setup_test_app().await;
    let media = MediaOwnership::new(MediaId::new("m2"), "Jane Doe")
        .with_channel("UC-jane")
        .with_entry(OwnershipEntry::unverified("Jane Doe", share("1")));
    t.repo.register_media(&media).await.unwrap();

    let (status, json) = send(
        t.app.clone(),
        "POST",
        "/v1/tips",
        Some(tip_body("t9", "m2", 1000)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["records"][0]["owner"]["type"], "unverified");
    assert_eq!(json["records"][0]["owner"]["fingerprint"], "jane doe");

    let (status, unclaimed) = send(
        t.app.clone(),
        "GET",
        "/v1/unclaimed?name=JANE%20%20doe",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(unclaimed["total"], 700);

    let (status, by_channel) = send(
        t.app.clone(),
        "GET",
        "/v1/unclaimed?channelId=UC-jane",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_channel["total"], 700);

    let (status, _) = send(t.app.clone(), "GET", "/v1/unclaimed", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_invalid_share_sum_is_422() {
    let t = setup_test_app().await;
    let media = MediaOwnership::new(MediaId::new("m3"), "Broken")
        .with_entry(OwnershipEntry::verified(ArtistId::new("a"), share("0.5")))
        .with_entry(OwnershipEntry::verified(ArtistId::new("b"), share("0.3")));
    t.repo.register_media(&media).await.unwrap();

    let (status, json) = send(
        t.app.clone(),
        "POST",
        "/v1/tips",
        Some(tip_body("t3", "m3", 1000)),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["reason"], "invalid_ownership");
    assert_eq!(json["mediaId"], "m3");
}
