//! In-process stand-in for the document service, used by the HTTP tests.

use axum::{
    body::Body,
    extract::{FromRequest, Multipart, Query, Request, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Debug, Clone, Default)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: HashMap<String, String>,
    pub bearer: Option<String>,
    pub body: Value,
    pub files: Vec<String>,
    pub fields: HashMap<String, String>,
}

#[derive(Clone)]
enum Canned {
    Json(StatusCode, Value),
    Bytes(Vec<u8>, Vec<(String, String)>),
}

#[derive(Default)]
struct Inner {
    /// Queued replies per route; the flag marks a reply already served.
    routes: Mutex<HashMap<String, VecDeque<(Canned, bool)>>>,
    requests: Mutex<Vec<RecordedRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    latency_ms: AtomicU64,
}

pub struct MockServer {
    addr: SocketAddr,
    inner: Arc<Inner>,
}

impl MockServer {
    pub async fn start() -> Self {
        std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock server");
        let addr = listener.local_addr().expect("mock server address");
        let inner = Arc::new(Inner::default());
        let app = Router::new().fallback(handle).with_state(inner.clone());
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self { addr, inner }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Queue a JSON reply for `"METHOD /path"`. Replies are served in order;
    /// the last one queued keeps being served until another is queued.
    pub fn respond(&self, route: &str, status: StatusCode, body: Value) {
        self.push(route, Canned::Json(status, body));
    }

    pub fn respond_bytes(&self, route: &str, bytes: Vec<u8>, headers: Vec<(&str, &str)>) {
        let headers = headers
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.push(route, Canned::Bytes(bytes, headers));
    }

    fn push(&self, route: &str, canned: Canned) {
        let mut routes = self.inner.routes.lock().unwrap();
        let queue = routes.entry(route.to_string()).or_default();
        if queue.len() == 1 && queue[0].1 {
            queue.clear();
        }
        queue.push_back((canned, false));
    }

    pub fn set_latency(&self, latency: Duration) {
        self.inner
            .latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.inner.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests().into_iter().filter(|r| r.path == path).collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }
}

async fn handle(State(inner): State<Arc<Inner>>, req: Request) -> Response {
    let now = inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    inner.max_in_flight.fetch_max(now, Ordering::SeqCst);

    let mut recorded = RecordedRequest {
        method: req.method().to_string(),
        path: req.uri().path().to_string(),
        query: Query::<HashMap<String, String>>::try_from_uri(req.uri())
            .map(|q| q.0)
            .unwrap_or_default(),
        bearer: req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_string),
        body: Value::Null,
        ..Default::default()
    };
    let is_multipart = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("multipart/form-data"))
        .unwrap_or(false);

    if is_multipart {
        if let Ok(mut multipart) = Multipart::from_request(req, &()).await {
            while let Ok(Some(field)) = multipart.next_field().await {
                let name = field.name().unwrap_or_default().to_string();
                match field.file_name().map(str::to_string) {
                    Some(file_name) => {
                        let _ = field.bytes().await;
                        recorded.files.push(file_name);
                    }
                    None => {
                        let text = field.text().await.unwrap_or_default();
                        recorded.fields.insert(name, text);
                    }
                }
            }
        }
    } else {
        let bytes = axum::body::to_bytes(req.into_body(), usize::MAX)
            .await
            .unwrap_or_default();
        recorded.body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    }

    let latency = inner.latency_ms.load(Ordering::SeqCst);
    if latency > 0 {
        tokio::time::sleep(Duration::from_millis(latency)).await;
    }

    let route = format!("{} {}", recorded.method, recorded.path);
    inner.requests.lock().unwrap().push(recorded);
    let canned = {
        let mut routes = inner.routes.lock().unwrap();
        match routes.get_mut(&route) {
            Some(queue) if queue.len() > 1 => queue.pop_front().map(|(c, _)| c),
            Some(queue) => queue.front_mut().map(|entry| {
                entry.1 = true;
                entry.0.clone()
            }),
            None => None,
        }
    };
    inner.in_flight.fetch_sub(1, Ordering::SeqCst);

    match canned {
        Some(Canned::Json(status, body)) => (status, Json(body)).into_response(),
        Some(Canned::Bytes(bytes, headers)) => {
            let mut resp = Response::new(Body::from(bytes));
            for (name, value) in headers {
                if let (Ok(name), Ok(value)) = (
                    HeaderName::from_bytes(name.as_bytes()),
                    HeaderValue::from_str(&value),
                ) {
                    resp.headers_mut().insert(name, value);
                }
            }
            resp
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no canned reply for {}", route) })),
        )
            .into_response(),
    }
}

/// Write a small file that looks like a PDF.
pub fn write_pdf(dir: &Path, name: &str, size: usize) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let mut data = b"%PDF-1.4\n".to_vec();
    data.resize(size.max(data.len()), b'0');
    std::fs::write(&path, data).unwrap();
    path
}
