use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use recs_core::persist::{save_artifact, ArtifactPaths, ArtifactTables, MetaFile, ARTIFACT_VERSION};
use recs_core::LatentFactorModel;
use serde_json::Value;
use server::{build_app_with_config, AppConfig};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tempfile::tempdir;
use tower::ServiceExt;

const TOKEN: &str = "s3cret";

// users 1, 2 in the model, 3 only named; items 1..=5 with item 5 scoring highest for user 1
fn tables(item_scores: [f32; 5], top_items: Vec<u64>) -> ArtifactTables {
    let model = LatentFactorModel::new(1, vec![1.0, -1.0], item_scores.to_vec(), vec![0.0, 0.0], vec![0.0; 5]).unwrap();
    let mut interactions: HashMap<u64, HashSet<u64>> = HashMap::new();
    interactions.insert(1, HashSet::from([3]));
    ArtifactTables {
        model,
        user_id_map: HashMap::from([(1, 0), (2, 1)]),
        item_id_map: (1..=5u64).map(|i| (i, (i - 1) as u32)).collect(),
        user_names: HashMap::from([(1, "Ada".to_string()), (2, "Brook".to_string()), (3, "Casey".to_string())]),
        item_names: (1..=4u64).map(|i| (i, format!("item {i}"))).collect(),
        interactions,
        top_items,
        meta: MetaFile { num_users: 2, num_items: 5, dim: 1, created_at: "2024-01-01T00:00:00Z".into(), version: ARTIFACT_VERSION },
    }
}

fn write_artifact(dir: &Path, tables: &ArtifactTables) {
    save_artifact(&ArtifactPaths::new(dir), tables).unwrap();
}

fn app(dir: &Path) -> Router {
    build_app_with_config(AppConfig { artifact_dir: dir.to_path_buf(), admin_token: Some(TOKEN.into()), cors_allow_origin: None }).unwrap()
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

fn ids(json: &Value) -> Vec<u64> {
    json["recommendations"].as_array().unwrap().iter().map(|v| v.as_u64().unwrap()).collect()
}

#[tokio::test]
async fn known_user_gets_ranked_unseen_items() {
    let dir = tempdir().unwrap();
    write_artifact(dir.path(), &tables([0.8, 0.6, 0.1, 0.4, 0.9], vec![4, 2, 5]));

    let (status, json) = get(app(dir.path()), "/recommend/1?k=3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["user_id"], 1);
    assert_eq!(json["user_name"], "Ada");
    assert_eq!(ids(&json), vec![5, 1, 2]);
    let ext = json["recommendations_ext"].as_array().unwrap();
    assert_eq!(ext[0]["item_id"], 5);
    assert_eq!(ext[0]["item_name"], "Unknown Item");
    assert_eq!(ext[1]["item_name"], "item 1");
}

#[tokio::test]
async fn default_k_is_five() {
    let dir = tempdir().unwrap();
    write_artifact(dir.path(), &tables([0.8, 0.6, 0.1, 0.4, 0.9], vec![4, 2, 5]));
    let (status, json) = get(app(dir.path()), "/recommend/2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&json), vec![3, 4, 2, 1, 5]);
    let (_, json) = get(app(dir.path()), "/recommend/1?num_recommendations=1").await;
    assert_eq!(ids(&json), vec![5]);
}

#[tokio::test]
async fn unknown_user_gets_popular_items() {
    let dir = tempdir().unwrap();
    write_artifact(dir.path(), &tables([0.8, 0.6, 0.1, 0.4, 0.9], vec![4, 2, 5]));
    let (status, json) = get(app(dir.path()), "/recommend/3?k=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["user_name"], "Casey");
    assert_eq!(ids(&json), vec![4, 2]);

    let (status, json) = get(app(dir.path()), "/recommend/999999?k=100").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["user_name"], "Unknown User");
    assert_eq!(ids(&json), vec![4, 2, 5]);
}

#[tokio::test]
async fn invalid_inputs_are_client_errors() {
    let dir = tempdir().unwrap();
    write_artifact(dir.path(), &tables([0.8, 0.6, 0.1, 0.4, 0.9], vec![4, 2, 5]));

    let (status, json) = get(app(dir.path()), "/recommend/abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Invalid user_id. It should be an integer.");

    let (status, json) = get(app(dir.path()), "/recommend/99999999999999999999").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Input validation failed");
    assert_eq!(json["details"][0]["field"], "user_id");
    assert_eq!(json["details"][0]["value"], "99999999999999999999");

    let (_, json) = get(app(dir.path()), "/recommend/-99999999999999999999").await;
    assert_eq!(json["details"][0]["field"], "user_id");

    for uri in ["/recommend/1?k=0", "/recommend/1?k=101", "/recommend/0", "/recommend/-5", "/recommend/1000000", "/recommend/1?k=ten"] {
        let (status, json) = get(app(dir.path()), uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(json["error"], "Input validation failed", "{uri}");
        assert!(json["details"].as_array().is_some_and(|d| !d.is_empty()), "{uri}");
    }

    let (status, _) = get(app(dir.path()), "/recommend/1?k=100").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn scoring_failure_is_server_error() {
    let dir = tempdir().unwrap();
    write_artifact(dir.path(), &tables([0.8, f32::NAN, 0.1, 0.4, 0.9], vec![4, 2, 5]));
    let app = app(dir.path());

    let (status, json) = get(app.clone(), "/recommend/1").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "An error occurred while processing the recommendation.");
    assert!(json.get("details").is_none());

    // the process keeps serving
    let (status, json) = get(app, "/recommend/3?k=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&json), vec![4]);
}

#[tokio::test]
async fn user_sample_is_bounded() {
    let dir = tempdir().unwrap();
    write_artifact(dir.path(), &tables([0.8, 0.6, 0.1, 0.4, 0.9], vec![4, 2, 5]));
    let (status, json) = get(app(dir.path()), "/user_sample").await;
    assert_eq!(status, StatusCode::OK);
    let sample = json.as_array().unwrap();
    assert_eq!(sample.len(), 3);
    for pair in sample {
        let id = pair[0].as_u64().unwrap();
        assert!((1..=3).contains(&id));
        assert!(pair[1].is_string());
    }
}

#[tokio::test]
async fn missing_artifact_refuses_to_start() {
    let dir = tempdir().unwrap();
    let result = build_app_with_config(AppConfig { artifact_dir: dir.path().to_path_buf(), admin_token: None, cors_allow_origin: None });
    assert!(result.is_err());
}

fn reload_request(token: Option<&str>) -> Request<Body> {
    let mut builder = Request::post("/admin/reload");
    if let Some(t) = token {
        builder = builder.header("X-ADMIN-TOKEN", t);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn reload_swaps_snapshot() {
    let dir = tempdir().unwrap();
    write_artifact(dir.path(), &tables([0.8, 0.6, 0.1, 0.4, 0.9], vec![4, 2, 5]));
    let app = app(dir.path());

    let (status, _) = send(app.clone(), reload_request(Some("wrong"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(app.clone(), reload_request(None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    write_artifact(dir.path(), &tables([0.8, 0.6, 0.1, 0.4, 0.9], vec![1, 5]));
    let (status, json) = send(app.clone(), reload_request(Some(TOKEN))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "reloaded");
    assert_eq!(json["items"], 5);

    let (_, json) = get(app, "/recommend/3?k=5").await;
    assert_eq!(ids(&json), vec![1, 5]);
}

#[tokio::test]
async fn failed_reload_keeps_serving() {
    let dir = tempdir().unwrap();
    write_artifact(dir.path(), &tables([0.8, 0.6, 0.1, 0.4, 0.9], vec![4, 2, 5]));
    let app = app(dir.path());

    std::fs::remove_file(dir.path().join("model.bin")).unwrap();
    let (status, _) = send(app.clone(), reload_request(Some(TOKEN))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let (status, json) = get(app, "/recommend/1?k=3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&json), vec![5, 1, 2]);
}

#[tokio::test]
async fn health_is_ok() {
    let dir = tempdir().unwrap();
    write_artifact(dir.path(), &tables([0.8, 0.6, 0.1, 0.4, 0.9], vec![4, 2, 5]));
    let resp = app(dir.path()).oneshot(Request::get("/health").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
