//! In-process mock servers for fetch tests

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::net::TcpListener;

pub const KEY_HEADER: &str = "x-api-key";

/// Bind `app` on an ephemeral port and return its base URL.
pub async fn spawn_server(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Upstream-shaped JSON body.
pub fn upstream_body(code: i64, title: &str) -> String {
    serde_json::json!({
        "code": code,
        "message": "0",
        "data": { "title": title }
    })
    .to_string()
}

/// What the scripted relay answers.
#[derive(Debug, Clone)]
pub enum Reply {
    Forbidden,
    Status(u16),
    /// 200 with `{"content": <inner>}`
    Envelope(String),
    /// 200 with an arbitrary body
    Raw(String),
}

/// Scripted relay. Replies come from the queue first, then the per-key map,
/// then the default.
pub struct RelayScript {
    by_key: HashMap<String, Reply>,
    queue: Mutex<VecDeque<Reply>>,
    default: Reply,
    hits: Mutex<Vec<(String, String)>>,
}

impl RelayScript {
    pub fn new(default: Reply) -> Self {
        Self {
            by_key: HashMap::new(),
            queue: Mutex::new(VecDeque::new()),
            default,
            hits: Mutex::new(Vec::new()),
        }
    }

    pub fn with_key(mut self, key: &str, reply: Reply) -> Self {
        self.by_key.insert(key.to_string(), reply);
        self
    }

    pub fn with_queue(self, replies: Vec<Reply>) -> Self {
        *self.queue.lock().unwrap() = replies.into();
        self
    }

    /// `(key, target url)` for every request the relay received.
    pub fn hits(&self) -> Vec<(String, String)> {
        self.hits.lock().unwrap().clone()
    }

    pub fn keys_used(&self) -> Vec<String> {
        self.hits().into_iter().map(|(k, _)| k).collect()
    }
}

async fn relay_handler(
    State(script): State<Arc<RelayScript>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let key = headers
        .get(KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let target = params.get("url").cloned().unwrap_or_default();
    script.hits.lock().unwrap().push((key.clone(), target));

    let queued = script.queue.lock().unwrap().pop_front();
    let reply = queued
        .or_else(|| script.by_key.get(&key).cloned())
        .unwrap_or_else(|| script.default.clone());

    match reply {
        Reply::Forbidden => (StatusCode::FORBIDDEN, "quota exceeded").into_response(),
        Reply::Status(code) => {
            (StatusCode::from_u16(code).unwrap(), "relay error").into_response()
        }
        Reply::Envelope(inner) => (
            StatusCode::OK,
            serde_json::json!({ "content": inner }).to_string(),
        )
            .into_response(),
        Reply::Raw(body) => (StatusCode::OK, body).into_response(),
    }
}

/// Start a scripted relay and return `(base_url, script)`.
pub async fn spawn_relay(script: RelayScript) -> (String, Arc<RelayScript>) {
    let script = Arc::new(script);
    let app = Router::new()
        .route("/relay", axum::routing::get(relay_handler))
        .with_state(script.clone());
    let base = spawn_server(app).await;
    (format!("{base}/relay"), script)
}
