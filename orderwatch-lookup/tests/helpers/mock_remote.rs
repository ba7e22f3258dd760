//! Local HTTP server standing in for the monitoring service

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

/// What the mock answers to `POST /query/monitoring`
#[derive(Debug, Clone)]
pub enum QueryBehavior {
    /// One row per requested id
    Echo,
    /// `{"data": {}}`
    NoResults,
    Status(StatusCode, String),
    /// 200 with a non-JSON body
    Garbage,
}

#[derive(Default)]
pub struct Recorded {
    pub authorization: Vec<Option<String>>,
    pub query_bodies: Vec<Value>,
    pub remark_bodies: Vec<Value>,
}

#[derive(Clone)]
struct MockState {
    behavior: QueryBehavior,
    recorded: Arc<Mutex<Recorded>>,
}

pub struct MockRemote {
    pub addr: SocketAddr,
    pub recorded: Arc<Mutex<Recorded>>,
}

impl MockRemote {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

/// Start the mock on an ephemeral port
pub async fn start_mock_remote(behavior: QueryBehavior) -> MockRemote {
    let recorded = Arc::new(Mutex::new(Recorded::default()));
    let state = MockState {
        behavior,
        recorded: Arc::clone(&recorded),
    };

    let app = Router::new()
        .route("/query/monitoring", post(query))
        .route("/monitoring/remark", post(remark))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockRemote { addr, recorded }
}

fn authorization(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn query(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    {
        let mut recorded = state.recorded.lock().unwrap();
        recorded.authorization.push(authorization(&headers));
        recorded.query_bodies.push(body.clone());
    }

    match state.behavior {
        QueryBehavior::Echo => {
            let rows: Vec<Value> = body["system_ref_ids"]
                .as_array()
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|id| json!({ "SystemRefId": id, "Status_Interfaced": "No" }))
                .collect();
            Json(json!({ "data": { "results": rows } })).into_response()
        }
        QueryBehavior::NoResults => Json(json!({ "data": {} })).into_response(),
        QueryBehavior::Status(status, body) => (status, body).into_response(),
        QueryBehavior::Garbage => (StatusCode::OK, "<html>oops</html>").into_response(),
    }
}

async fn remark(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    let mut recorded = state.recorded.lock().unwrap();
    recorded.authorization.push(authorization(&headers));
    recorded.remark_bodies.push(body);
    StatusCode::OK
}
