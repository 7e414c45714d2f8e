#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use mcp_biprws::BiClient;
use serde_json::{json, Value};
use tokio::net::TcpListener;

pub use axum::http::Method;

pub const TOKEN: &str = "\"COMMANDCOM:6400@{3&2=5017,U3&2v=COMMANDCOM:6400}\"";

/// A request as seen by the mock server.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Response replayed for a matching method and path.
#[derive(Debug, Clone)]
pub struct CannedResponse {
    status: u16,
    content_type: Option<String>,
    headers: Vec<(String, String)>,
    body: String,
}

impl CannedResponse {
    pub fn json(status: u16, body: Value) -> Self {
        Self::text(status, "application/json", &body.to_string())
    }

    pub fn text(status: u16, content_type: &str, body: &str) -> Self {
        Self {
            status,
            content_type: Some(content_type.to_string()),
            headers: vec![],
            body: body.to_string(),
        }
    }

    pub fn empty(status: u16) -> Self {
        Self {
            status,
            content_type: None,
            headers: vec![],
            body: String::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).expect("valid status");
        let mut response = (status, self.body).into_response();
        let headers = response.headers_mut();
        headers.remove(header::CONTENT_TYPE);
        if let Some(content_type) = self.content_type {
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_str(&content_type).expect("valid content type"),
            );
        }
        for (name, value) in self.headers {
            headers.append(
                HeaderName::from_bytes(name.as_bytes()).expect("valid header name"),
                HeaderValue::from_str(&value).expect("valid header value"),
            );
        }
        response
    }
}

struct MockState {
    routes: Vec<(Method, String, CannedResponse)>,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// In-process stand-in for the BI platform REST services.
///
/// Records every request and answers from a fixed route table; unknown routes
/// get a 404 JSON error.
pub struct MockBiServer {
    pub base_url: String,
    state: Arc<MockState>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl MockBiServer {
    pub async fn start(routes: Vec<(Method, &str, CannedResponse)>) -> Self {
        let state = Arc::new(MockState {
            routes: routes
                .into_iter()
                .map(|(method, path, response)| (method, path.to_string(), response))
                .collect(),
            requests: Mutex::new(Vec::new()),
        });

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock server");
        let addr = listener.local_addr().expect("mock server address");
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let router = Router::new().fallback(handle).with_state(state.clone());
        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn client(&self) -> BiClient {
        BiClient::new(self.base_url.clone())
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }
}

impl Drop for MockBiServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn handle(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.requests.lock().unwrap().push(RecordedRequest {
        method: method.clone(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    });

    let canned = state
        .routes
        .iter()
        .find(|(m, path, _)| *m == method && path == uri.path())
        .map(|(_, _, response)| response.clone())
        .unwrap_or_else(|| {
            CannedResponse::json(
                404,
                json!({"error_code": "RWS 00001", "message": format!("No route for {}", uri.path())}),
            )
        });
    canned.into_response()
}

/// Routes for a successful log-on handshake followed by log-off.
pub fn session_routes() -> Vec<(Method, &'static str, CannedResponse)> {
    vec![
        (
            Method::GET,
            "/biprws/logon/long",
            CannedResponse::text(200, "application/xml", "<attrs/>")
                .with_header("set-cookie", "JSESSIONID=abc123; Path=/biprws; HttpOnly"),
        ),
        (
            Method::POST,
            "/biprws/logon/long",
            CannedResponse::json(200, json!({"logonToken": TOKEN}))
                .with_header("x-sap-logontoken", TOKEN),
        ),
        (Method::POST, "/biprws/logoff", CannedResponse::empty(200)),
    ]
}

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("mcp_biprws=debug")
        .with_test_writer()
        .try_init();
}
