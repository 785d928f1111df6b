use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use fitsearch_core::{Engine, EngineConfig, RawContent};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use server::queue::IngestQueue;
use server::{build_app, AppState};
use std::sync::Arc;
use tempfile::tempdir;
use tower::ServiceExt;

const TOKEN: &str = "s3cret";

fn seeded_engine(dir: &std::path::Path) -> Arc<Engine> {
    let engine = Engine::open(dir, &EngineConfig::default()).unwrap();
    engine
        .ingest(RawContent::plain_text("https://fit.example/a1", Some("Squats".into()), "squats build leg strength").with_id("a1").with_tags(["legs"]))
        .unwrap();
    engine
        .ingest(RawContent::plain_text("https://fit.example/a2", Some("Push ups".into()), "push ups build arm strength").with_id("a2").with_tags(["arms"]))
        .unwrap();
    Arc::new(engine)
}

fn app(engine: Arc<Engine>) -> Router {
    let (queue, _worker) = IngestQueue::spawn(engine.clone(), 16);
    build_app(AppState { engine, queue, admin_token: Some(TOKEN.to_string()) })
}

async fn call(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn admin(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri).header("X-ADMIN-TOKEN", TOKEN);
    match body {
        Some(v) => builder.header("content-type", "application/json").body(Body::from(v.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

#[tokio::test]
async fn search_returns_ranked_results() {
    let dir = tempdir().unwrap();
    let app = app(seeded_engine(dir.path()));

    let (status, json) = call(app, get("/search?q=strength&k=2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_hits"], 2);
    let arr = json["results"].as_array().unwrap();
    assert_eq!(arr.len(), 2);
    let mut ids: Vec<_> = arr.iter().map(|h| h["id"].as_str().unwrap().to_string()).collect();
    ids.sort();
    assert_eq!(ids, vec!["a1", "a2"]);
    assert!(arr[0]["score"].as_f64().unwrap() >= arr[1]["score"].as_f64().unwrap());
    assert!(arr[0]["snippet"].as_str().unwrap().contains("<em>strength</em>"));
}

#[tokio::test]
async fn search_applies_tag_filter() {
    let dir = tempdir().unwrap();
    let (status, json) = call(app(seeded_engine(dir.path())), get("/search?q=strength&tags=legs")).await;
    assert_eq!(status, StatusCode::OK);
    let arr = json["results"].as_array().unwrap();
    assert_eq!(arr.len(), 1);
    assert_eq!(arr[0]["id"], "a1");
}

#[tokio::test]
async fn empty_query_is_bad_request() {
    let dir = tempdir().unwrap();
    let (status, json) = call(app(seeded_engine(dir.path())), get("/search?q=&k=5")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("invalid query"));
}

#[tokio::test]
async fn unknown_doc_is_not_found() {
    let dir = tempdir().unwrap();
    let engine = seeded_engine(dir.path());
    let (status, _) = call(app(engine.clone()), get("/doc/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, json) = call(app(engine), get("/doc/a1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["title"], "Squats");
}

#[tokio::test]
async fn admin_routes_require_token() {
    let dir = tempdir().unwrap();
    let req = Request::post("/index/commit").body(Body::empty()).unwrap();
    let (status, _) = call(app(seeded_engine(dir.path())), req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn batch_ingest_remove_and_commit() {
    let dir = tempdir().unwrap();
    let engine = seeded_engine(dir.path());

    let batch = json!([
        { "kind": "html", "source_uri": "https://fit.example/plank", "id": "p1",
          "html": "<html><head><title>Plank</title></head><body><p>Plank holds for core strength</p></body></html>" },
        { "kind": "plain_text", "source_uri": "not a uri", "text": "bad source" }
    ]);
    let (status, json) = call(app(engine.clone()), admin("POST", "/index/batch", Some(batch))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["indexed"], 1);
    assert_eq!(json["failed"], 1);
    assert_eq!(json["items"][0]["id"], "p1");
    assert!(json["items"][1]["error"].as_str().unwrap().contains("normalization"));

    let (_, json) = call(app(engine.clone()), get("/search?q=strength")).await;
    assert_eq!(json["total_hits"], 3);

    let (status, _) = call(app(engine.clone()), admin("DELETE", "/index/a1", None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(app(engine.clone()), admin("DELETE", "/index/a1", None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, json) = call(app(engine.clone()), admin("POST", "/index/commit", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["num_docs"], 2);
    assert!(dir.path().join("meta.json").is_file());

    let reopened = Engine::open(dir.path(), &EngineConfig::default()).unwrap();
    assert!(reopened.get("a1").is_err());
    assert_eq!(reopened.get("p1").unwrap().title, "Plank");
}

#[tokio::test]
async fn health_and_cache_clear() {
    let dir = tempdir().unwrap();
    let engine = seeded_engine(dir.path());
    let resp = app(engine.clone()).oneshot(get("/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let (status, json) = call(app(engine), admin("POST", "/cache/clear", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "cache cleared");
}
