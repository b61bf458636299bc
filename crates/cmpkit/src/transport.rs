//! HTTP transport abstraction.
//!
//! The [`Transport`] trait is the only place the client touches the
//! network. [`UreqTransport`] is the real implementation; [`MockTransport`]
//! replays canned responses and records every request for tests.
//!
//! ```
//! use cmpkit::transport::{HttpRequest, Method, MockTransport, Transport};
//! use serde_json::json;
//!
//! let mock = MockTransport::new();
//! mock.on(Method::Get, "/v1.0/nas/users/U1", 200, json!({"user": {"id": "U1"}}));
//!
//! let req = HttpRequest::new(Method::Get, "http://cmp", "/v1.0/nas/users/U1");
//! let resp = mock.send(&req).unwrap();
//! assert_eq!(resp.status, 200);
//! assert_eq!(mock.count(Method::Get, "/v1.0/nas/users/U1"), 1);
//! ```

use crate::error::ApiError;
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// Upper-case method name as sent on the wire.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Whether the method changes remote state.
    #[must_use]
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Self::Get)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request body.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Form(Vec<(String, String)>),
}

/// A fully resolved HTTP request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    /// Base URL of the subsystem, without trailing slash.
    pub base: String,
    /// Absolute path (prefix included), used for signing and routing.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
    pub timeout: Duration,
}

impl HttpRequest {
    /// Create a request with no query, headers or body.
    pub fn new(method: Method, base: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method,
            base: base.into(),
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: RequestBody::Empty,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Full URL without query string.
    #[must_use]
    pub fn url(&self) -> String {
        format!("{}{}", self.base, self.path)
    }

    /// Value of a header (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Raw HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    /// Create a response from a status and a JSON body.
    pub fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }

    /// Whether the status is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends HTTP requests.
///
/// Implementations return `Ok` for every response that arrived, whatever
/// its status; `Err` is reserved for exchanges that produced no response.
pub trait Transport: Send + Sync {
    /// Send a request and return the raw response.
    fn send(&self, req: &HttpRequest) -> Result<HttpResponse, ApiError>;
}

/// Blocking transport backed by a `ureq` agent.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    /// Create a transport with an optional proxy and a default timeout.
    pub fn new(proxy: Option<&str>, timeout: Duration) -> Result<Self, ApiError> {
        let mut builder = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout));

        if let Some(proxy) = proxy.filter(|p| !p.is_empty()) {
            let proxy = ureq::Proxy::new(proxy)
                .map_err(|e| ApiError::network(format!("invalid proxy {proxy}: {e}")))?;
            builder = builder.proxy(Some(proxy));
        }

        let agent: ureq::Agent = builder.build().into();
        Ok(Self { agent })
    }
}

impl Transport for UreqTransport {
    fn send(&self, req: &HttpRequest) -> Result<HttpResponse, ApiError> {
        let url = req.url();
        let result = match req.method {
            Method::Get => prepare(self.agent.get(&url), req).call(),
            Method::Delete => {
                let rb = prepare(self.agent.delete(&url), req);
                match &req.body {
                    RequestBody::Empty => rb.call(),
                    body => send_with_body(rb.force_send_body(), body),
                }
            }
            Method::Post => send_with_body(prepare(self.agent.post(&url), req), &req.body),
            Method::Put => send_with_body(prepare(self.agent.put(&url), req), &req.body),
            Method::Patch => send_with_body(prepare(self.agent.patch(&url), req), &req.body),
        };

        match result {
            Ok(mut response) => {
                let status = response.status().as_u16();
                let body = response
                    .body_mut()
                    .read_to_string()
                    .map_err(|e| ApiError::decode(format!("cannot read response body: {e}")))?;
                Ok(HttpResponse { status, body })
            }
            Err(ureq::Error::StatusCode(status)) => Ok(HttpResponse {
                status,
                body: String::new(),
            }),
            Err(e) => Err(ApiError::network(format!("{} {}: {e}", req.method, url))),
        }
    }
}

fn prepare<B>(mut rb: ureq::RequestBuilder<B>, req: &HttpRequest) -> ureq::RequestBuilder<B> {
    for (name, value) in &req.headers {
        rb = rb.header(name.as_str(), value.as_str());
    }
    for (name, value) in &req.query {
        rb = rb.query(name.as_str(), value.as_str());
    }
    rb.config().timeout_global(Some(req.timeout)).build()
}

fn send_with_body(
    rb: ureq::RequestBuilder<ureq::typestate::WithBody>,
    body: &RequestBody,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    match body {
        RequestBody::Empty => rb.send_empty(),
        RequestBody::Json(value) => rb.send_json(value),
        RequestBody::Form(pairs) => {
            rb.send_form(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        }
    }
}

// =============================================================================
// Mock transport
// =============================================================================

#[derive(Debug, Clone)]
enum Reply {
    Response(HttpResponse),
    Error(ApiError),
}

#[derive(Debug)]
struct Route {
    method: Method,
    path: String,
    replies: VecDeque<Reply>,
}

#[derive(Debug, Default)]
struct MockState {
    routes: Vec<Route>,
    requests: Vec<HttpRequest>,
}

/// In-memory transport for tests.
///
/// Replies are queued per method+path and consumed in order; the last
/// queued reply repeats once the queue is down to one. Unrouted requests
/// get a 404. Clones share state, so a test can keep a handle while the
/// client owns another.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Create an empty mock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, method: Method, path: &str, reply: Reply) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(route) = state
            .routes
            .iter_mut()
            .find(|r| r.method == method && r.path == path)
        {
            route.replies.push_back(reply);
        } else {
            state.routes.push(Route {
                method,
                path: path.to_string(),
                replies: VecDeque::from([reply]),
            });
        }
    }

    /// Queue a JSON response for `method path`.
    pub fn on(&self, method: Method, path: &str, status: u16, body: Value) -> &Self {
        self.push(method, path, Reply::Response(HttpResponse::json(status, &body)));
        self
    }

    /// Queue a raw-text response for `method path`.
    pub fn on_text(&self, method: Method, path: &str, status: u16, body: &str) -> &Self {
        self.push(
            method,
            path,
            Reply::Response(HttpResponse {
                status,
                body: body.to_string(),
            }),
        );
        self
    }

    /// Queue a transport failure for `method path`.
    pub fn fail(&self, method: Method, path: &str, error: ApiError) -> &Self {
        self.push(method, path, Reply::Error(error));
        self
    }

    /// All requests received so far, in order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .requests
            .clone()
    }

    /// Number of requests received for `method path`.
    pub fn count(&self, method: Method, path: &str) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .requests
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }
}

impl Transport for MockTransport {
    fn send(&self, req: &HttpRequest) -> Result<HttpResponse, ApiError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.requests.push(req.clone());

        let reply = state
            .routes
            .iter_mut()
            .find(|r| r.method == req.method && r.path == req.path)
            .and_then(|route| {
                if route.replies.len() > 1 {
                    route.replies.pop_front()
                } else {
                    route.replies.front().cloned()
                }
            });

        match reply {
            Some(Reply::Response(resp)) => Ok(resp),
            Some(Reply::Error(err)) => Err(err),
            None => Ok(HttpResponse::json(
                404,
                &serde_json::json!({"message": format!("no mock route for {} {}", req.method, req.path)}),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mock_replays_in_order_then_repeats_last() {
        let mock = MockTransport::new();
        mock.on(Method::Get, "/a", 401, json!({}))
            .on(Method::Get, "/a", 200, json!({"ok": true}));

        let req = HttpRequest::new(Method::Get, "http://x", "/a");
        assert_eq!(mock.send(&req).unwrap().status, 401);
        assert_eq!(mock.send(&req).unwrap().status, 200);
        assert_eq!(mock.send(&req).unwrap().status, 200);
        assert_eq!(mock.count(Method::Get, "/a"), 3);
    }

    #[test]
    fn test_mock_unrouted_is_404() {
        let mock = MockTransport::new();
        let req = HttpRequest::new(Method::Post, "http://x", "/missing");
        let resp = mock.send(&req).unwrap();
        assert_eq!(resp.status, 404);
        assert!(resp.body.contains("no mock route"));
    }

    #[test]
    fn test_mock_routes_by_method() {
        let mock = MockTransport::new();
        mock.on(Method::Get, "/a", 200, json!({}));
        mock.fail(Method::Delete, "/a", ApiError::network("down"));

        let get = HttpRequest::new(Method::Get, "http://x", "/a");
        let del = HttpRequest::new(Method::Delete, "http://x", "/a");
        assert!(mock.send(&get).is_ok());
        assert!(mock.send(&del).is_err());
        assert_eq!(mock.requests().len(), 2);
    }

    #[test]
    fn test_request_helpers() {
        let mut req = HttpRequest::new(Method::Get, "https://cmp", "/v1.0/nas/users");
        req.headers.push(("X-Auth-Token".into(), "t".into()));
        assert_eq!(req.url(), "https://cmp/v1.0/nas/users");
        assert_eq!(req.header("x-auth-token"), Some("t"));
        assert!(req.header("missing").is_none());
        assert!(!Method::Get.is_mutating());
        assert!(Method::Patch.is_mutating());
    }
}
