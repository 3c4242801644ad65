//! HttpRemote against an in-process server speaking the same protocol as
//! the document database views.

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracesync_common::{encode, Error, Point};
use tracesync_digest::{Digest, FullContent, Ibf, Summary};
use tracesync_remote::{HttpRemote, Password, RemoteConfig, RemoteStore, RemoteSummarizer};

const MAX_LEVEL: u32 = 9;

#[derive(Default)]
struct FakeDb {
    points: Mutex<BTreeMap<i64, Point>>,
    token: Mutex<Option<String>>,
    logins: AtomicUsize,
}

impl FakeDb {
    fn authorized(&self, headers: &HeaderMap) -> bool {
        let expected = self.token.lock().unwrap().clone();
        let sent = headers
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        expected.is_some() && expected == sent
    }

    fn encoded(&self) -> Vec<Vec<u8>> {
        self.points
            .lock()
            .unwrap()
            .values()
            .map(|p| encode(p).to_vec())
            .collect()
    }
}

#[derive(Deserialize)]
struct Login {
    name: String,
    password: String,
}

async fn session(State(db): State<Arc<FakeDb>>, Json(login): Json<Login>) -> Response {
    if login.name != "mathieu" || login.password != "testing" {
        return (StatusCode::UNAUTHORIZED, "bad credentials").into_response();
    }
    let n = db.logins.fetch_add(1, Ordering::SeqCst);
    let token = format!("AuthSession=token-{}", n);
    *db.token.lock().unwrap() = Some(token.clone());
    (
        StatusCode::OK,
        [(header::SET_COOKIE, format!("{}; Version=1; Path=/; HttpOnly", token))],
        Json(serde_json::json!({"ok": true})),
    )
        .into_response()
}

async fn write_point(
    State(db): State<Arc<FakeDb>>,
    headers: HeaderMap,
    Json(point): Json<Point>,
) -> Response {
    if !db.authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "session expired").into_response();
    }
    db.points.lock().unwrap().insert(point.timestamp, point);
    (StatusCode::CREATED, Json(serde_json::json!({"ok": true}))).into_response()
}

async fn summary(
    State(db): State<Arc<FakeDb>>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    let level: u32 = query.get("key").and_then(|k| k.parse().ok()).unwrap_or(0);
    let items = db.encoded();
    if items.is_empty() || level > MAX_LEVEL {
        return Json(serde_json::json!({ "rows": [] }));
    }
    let ibf = Ibf::from_items(level, items.iter().map(|i| i.as_slice()));
    Json(serde_json::json!({ "rows": [{ "key": level, "value": ibf }] }))
}

async fn full_content(State(db): State<Arc<FakeDb>>) -> Json<FullContent> {
    Json(FullContent::from_items(db.encoded()))
}

async fn spawn_server() -> (String, Arc<FakeDb>) {
    let db = Arc::new(FakeDb::default());
    let app = Router::new()
        .route("/_session", post(session))
        .route("/trace", post(write_point))
        .route("/trace/_design/sync/_view/summary", get(summary))
        .route(
            "/trace/_design/sync/_list/fullcontent/fullcontent",
            get(full_content),
        )
        .with_state(db.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), db)
}

fn remote_for(base_url: String, password: &str) -> HttpRemote {
    HttpRemote::new(RemoteConfig {
        base_url,
        username: "mathieu".to_string(),
        password: Password::new(password),
        ..RemoteConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_push_requires_session() {
    let (base_url, db) = spawn_server().await;
    let remote = remote_for(base_url, "testing");
    let point = Point::new(100, 1.0, 2.0);

    assert!(matches!(remote.push(&point).await, Err(Error::AuthExpired)));

    remote.login().await.unwrap();
    remote.push(&point).await.unwrap();
    assert_eq!(db.points.lock().unwrap().get(&100), Some(&point));
}

#[tokio::test]
async fn test_login_refused() {
    let (base_url, _db) = spawn_server().await;
    let remote = remote_for(base_url, "wrong");

    assert!(matches!(
        remote.login().await,
        Err(Error::Authentication(_))
    ));
    assert!(remote.session().cookie().await.is_none());
}

#[tokio::test]
async fn test_empty_database_falls_back_to_full_content() {
    let (base_url, _db) = spawn_server().await;
    let remote = remote_for(base_url, "testing");

    match remote.summarize(0).await.unwrap() {
        Summary::FullContent(content) => assert!(content.is_empty()),
        Summary::Digest(_) => panic!("expected full content"),
    }
}

#[tokio::test]
async fn test_digest_round_trip() {
    let (base_url, db) = spawn_server().await;
    let point = Point::new(100, 1.0, 2.0);
    db.points.lock().unwrap().insert(point.timestamp, point);

    let remote = remote_for(base_url, "testing");
    let Summary::Digest(ibf) = remote.summarize(0).await.unwrap() else {
        panic!("expected digest");
    };

    assert_eq!(ibf.level(), 0);
    let diff = ibf.peel().unwrap();
    assert_eq!(diff.added, vec![encode(&point).to_vec()]);
}

#[tokio::test]
async fn test_level_above_view_uses_listing() {
    let (base_url, db) = spawn_server().await;
    let point = Point::new(7, 3.0, 4.0);
    db.points.lock().unwrap().insert(point.timestamp, point);

    let remote = remote_for(base_url, "testing");
    match remote.summarize(MAX_LEVEL + 1).await.unwrap() {
        Summary::FullContent(content) => {
            assert_eq!(content.items(), &[encode(&point).to_vec()]);
        }
        Summary::Digest(_) => panic!("expected full content"),
    }
}
