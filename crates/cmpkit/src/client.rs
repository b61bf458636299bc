//! Authenticated CMP API client.
//!
//! Every call follows the same lifecycle: make sure a session exists
//! (issuing one when the cache is empty), authorize and send, and when the
//! CMP answers 401 drop the session, issue a new one and retry exactly
//! once. The session is written back to the [`TokenCache`] after every
//! call, successful or not.

use crate::auth::{self, Credentials};
use crate::config::{EndpointMap, EnvironmentConfig};
use crate::error::{ApiError, Error, Result};
use crate::signing::{HEADER_SIGNATURE, HEADER_TOKEN, Signer};
use crate::token::{Session, TokenCache};
use crate::transport::{
    DEFAULT_TIMEOUT, HttpRequest, HttpResponse, Method, RequestBody, Transport, UreqTransport,
};
use serde_json::Value;
use std::borrow::Cow;
use std::time::Duration;

/// Log target of the cURL trace.
pub const CURL_LOG_TARGET: &str = "beehive::curl";

const REDACTED: &str = "***";
const SECRET_KEYS: [&str; 6] = [
    "password",
    "pwd",
    "secret",
    "seckey",
    "access_token",
    "assertion",
];

/// Percent-encode one path segment (ids, natural keys).
///
/// Everything outside the unreserved set is escaped, `/` included, so a
/// name can never address a different resource.
pub fn path_segment(segment: &str) -> Cow<'_, str> {
    urlencoding::encode(segment)
}

/// One API call, before endpoint resolution and authorization.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub subsystem: String,
    pub method: Method,
    /// Path relative to the subsystem base URL.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
    pub timeout: Option<Duration>,
}

impl ApiRequest {
    pub fn new(method: Method, subsystem: &str, path: impl Into<String>) -> Self {
        Self {
            subsystem: subsystem.to_string(),
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: RequestBody::Empty,
            timeout: None,
        }
    }

    pub fn get(subsystem: &str, path: impl Into<String>) -> Self {
        Self::new(Method::Get, subsystem, path)
    }

    #[must_use]
    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    #[must_use]
    pub fn with_json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// The operations command handlers and the customizer need from the CMP.
///
/// [`ApiClient`] is the real implementation; tests substitute an in-memory
/// CMP.
pub trait CmpApi {
    /// Perform one call and return the decoded response body.
    fn call(&mut self, request: &ApiRequest) -> Result<Value>;

    fn get(&mut self, subsystem: &str, path: &str) -> Result<Value> {
        self.call(&ApiRequest::get(subsystem, path))
    }

    fn post(&mut self, subsystem: &str, path: &str, body: Value) -> Result<Value> {
        self.call(&ApiRequest::new(Method::Post, subsystem, path).with_json(body))
    }

    fn put(&mut self, subsystem: &str, path: &str, body: Value) -> Result<Value> {
        self.call(&ApiRequest::new(Method::Put, subsystem, path).with_json(body))
    }

    fn patch(&mut self, subsystem: &str, path: &str, body: Value) -> Result<Value> {
        self.call(&ApiRequest::new(Method::Patch, subsystem, path).with_json(body))
    }

    fn delete(&mut self, subsystem: &str, path: &str) -> Result<Value> {
        self.call(&ApiRequest::new(Method::Delete, subsystem, path))
    }
}

/// Result of one authorized exchange.
enum Outcome {
    Done(Value),
    /// The CMP rejected the session; the caller may reissue and retry.
    NeedsReauth(ApiError),
}

/// Client options.
#[derive(Debug, Clone, Copy)]
pub struct ClientOptions {
    /// Log a cURL line for every call.
    pub verbose: bool,
    /// Default per-call timeout.
    pub timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            verbose: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// API client bound to one environment.
pub struct ApiClient {
    env: String,
    endpoints: EndpointMap,
    prefix_path: Option<String>,
    credentials: Credentials,
    cache: TokenCache,
    transport: Box<dyn Transport>,
    session: Session,
    signer: Signer,
    options: ClientOptions,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("env", &self.env)
            .field("endpoints", &self.endpoints)
            .field("credentials", &self.credentials)
            .field("has_session", &!self.session.is_empty())
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a client over an explicit transport.
    ///
    /// The cached session, if any, is loaded immediately.
    pub fn new(
        config: &EnvironmentConfig,
        cache: TokenCache,
        transport: Box<dyn Transport>,
        mut options: ClientOptions,
    ) -> Result<Self> {
        if let Some(secs) = config.cmp.timeout {
            options.timeout = Duration::from_secs(secs);
        }
        let credentials = Credentials::from_config(&config.cmp)?;
        let session = cache.read(&config.name)?;
        Ok(Self {
            env: config.name.clone(),
            endpoints: config.cmp.endpoint_map(),
            prefix_path: config
                .cmp
                .prefix_path
                .as_deref()
                .map(|p| p.trim_end_matches('/').to_string())
                .filter(|p| !p.is_empty()),
            credentials,
            cache,
            transport,
            session,
            signer: Signer::new(),
            options,
        })
    }

    /// Create a client speaking HTTP(S) through `ureq`.
    pub fn connect(
        config: &EnvironmentConfig,
        cache: TokenCache,
        options: ClientOptions,
    ) -> Result<Self> {
        let timeout = config
            .cmp
            .timeout
            .map_or(options.timeout, Duration::from_secs);
        let transport = UreqTransport::new(config.cmp.http_proxy.as_deref(), timeout)?;
        Self::new(config, cache, Box::new(transport), options)
    }

    /// Environment name.
    pub fn env(&self) -> &str {
        &self.env
    }

    /// Current in-memory session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Whether cURL tracing is enabled.
    pub fn verbose(&self) -> bool {
        self.options.verbose
    }

    /// Perform one call with the full session lifecycle.
    pub fn invoke(&mut self, request: &ApiRequest) -> Result<Value> {
        let result = self.invoke_with_retry(request);
        if let Err(e) = self.flush() {
            log::warn!("Cannot persist session for {}: {}", self.env, e);
        }
        result
    }

    fn invoke_with_retry(&mut self, request: &ApiRequest) -> Result<Value> {
        self.ensure_session()?;
        match self.attempt(request)? {
            Outcome::Done(value) => Ok(value),
            Outcome::NeedsReauth(first) => {
                log::info!("Session for {} rejected ({}), issuing a new one", self.env, first);
                self.session = Session::empty();
                self.issue_session()?;
                match self.attempt(request)? {
                    Outcome::Done(value) => Ok(value),
                    Outcome::NeedsReauth(second) => Err(second.into()),
                }
            }
        }
    }

    /// Issue a session if none is cached.
    pub fn ensure_session(&mut self) -> Result<()> {
        if self.session.is_empty() {
            self.issue_session()?;
        }
        Ok(())
    }

    /// Force a new session, discarding the current one.
    pub fn login(&mut self) -> Result<&Session> {
        self.session = Session::empty();
        let result = self.issue_session();
        self.flush()?;
        result?;
        Ok(&self.session)
    }

    /// Drop the session and remove it from the cache.
    pub fn logout(&mut self) -> Result<()> {
        self.session = Session::empty();
        self.cache.clear(&self.env)
    }

    /// Write the current session to the token cache.
    pub fn flush(&self) -> Result<()> {
        self.cache.write_session(&self.env, &self.session)
    }

    fn issue_session(&mut self) -> Result<()> {
        let base = self.base_url(auth::AUTH_SUBSYSTEM)?;
        let path = self.full_path(self.credentials.token_path());
        let mut req = auth::issue_request(&self.credentials, &base, path)?;
        req.timeout = self.options.timeout;
        self.trace(&req);

        let resp = self.transport.send(&req)?;
        match resp.status {
            200..=299 => {
                self.session = self.credentials.parse_issue(&resp)?;
                log::debug!("Issued new {} session for {}", self.credentials.authtype(), self.env);
            }
            400 | 503 => {
                log::warn!(
                    "Session issue for {} returned HTTP {}; continuing without a session",
                    self.env,
                    resp.status
                );
                self.session = Session::empty();
            }
            status => return Err(ApiError::from_status(status, &resp.body).into()),
        }
        Ok(())
    }

    fn attempt(&mut self, request: &ApiRequest) -> Result<Outcome> {
        let mut req = HttpRequest::new(
            request.method,
            self.base_url(&request.subsystem)?,
            self.full_path(&request.path),
        );
        req.query = request.query.clone();
        req.headers = request.headers.clone();
        req.body = request.body.clone();
        req.timeout = request.timeout.unwrap_or(self.options.timeout);
        self.credentials
            .authorize(&self.session, &mut self.signer, &mut req);
        self.trace(&req);

        let resp = self.transport.send(&req)?;
        if resp.status == 401 {
            return Ok(Outcome::NeedsReauth(ApiError::from_status(401, &resp.body)));
        }
        decode(&resp).map(Outcome::Done)
    }

    fn base_url(&self, subsystem: &str) -> Result<String> {
        self.endpoints
            .resolve(subsystem)
            .map(str::to_string)
            .map_err(|reason| Error::ConfigInvalid {
                env: self.env.clone(),
                reason,
            })
    }

    fn full_path(&self, path: &str) -> String {
        match &self.prefix_path {
            Some(prefix) if self.endpoints.is_per_subsystem() => format!("{prefix}{path}"),
            _ => path.to_string(),
        }
    }

    fn trace(&self, req: &HttpRequest) {
        if self.options.verbose {
            log::info!(target: CURL_LOG_TARGET, "{}", curl_line(req));
        }
    }
}

impl CmpApi for ApiClient {
    fn call(&mut self, request: &ApiRequest) -> Result<Value> {
        self.invoke(request)
    }
}

fn decode(resp: &HttpResponse) -> Result<Value> {
    if !resp.is_success() {
        return Err(ApiError::from_status(resp.status, &resp.body).into());
    }
    if resp.body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&resp.body)
        .map_err(|e| ApiError::decode(format!("invalid JSON response: {e}")).into())
}

/// Render a request as an equivalent cURL command with secrets masked.
pub fn curl_line(req: &HttpRequest) -> String {
    let mut url = req.url();
    if !req.query.is_empty() {
        let qs: Vec<String> = req.query.iter().map(|(k, v)| format!("{k}={v}")).collect();
        url = format!("{url}?{}", qs.join("&"));
    }

    let mut line = format!("curl -X {} '{}'", req.method, url);
    for (name, value) in &req.headers {
        let shown = if is_secret_header(name) {
            REDACTED
        } else {
            value.as_str()
        };
        line.push_str(&format!(" -H '{name}: {shown}'"));
    }

    match &req.body {
        RequestBody::Empty => {}
        RequestBody::Json(value) => {
            let mut value = value.clone();
            redact(&mut value);
            line.push_str(&format!(" -H 'Content-Type: application/json' -d '{value}'"));
        }
        RequestBody::Form(pairs) => {
            for (k, v) in pairs {
                let shown = if SECRET_KEYS.contains(&k.as_str()) {
                    REDACTED
                } else {
                    v.as_str()
                };
                line.push_str(&format!(" --data-urlencode '{k}={shown}'"));
            }
        }
    }
    line
}

fn is_secret_header(name: &str) -> bool {
    [HEADER_TOKEN, HEADER_SIGNATURE, "Authorization"]
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}

fn redact(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (k, v) in map.iter_mut() {
                if SECRET_KEYS.contains(&k.as_str()) {
                    *v = Value::String(REDACTED.to_string());
                } else {
                    redact(v);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthType, CmpConfig};
    use crate::transport::MockTransport;
    use serde_json::json;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    const USERS: &str = "/v1.0/nas/users/U1";

    fn env_config(endpoints: BTreeMap<String, String>, prefix: Option<&str>) -> EnvironmentConfig {
        EnvironmentConfig {
            name: "dev".into(),
            cmp: CmpConfig {
                endpoint: endpoints.is_empty().then(|| "http://cmp".to_string()),
                endpoints,
                authtype: AuthType::Keyauth,
                user: "admin".into(),
                pwd: Some("pw".into()),
                secret: None,
                client_id: None,
                catalog: None,
                prefix_path: prefix.map(str::to_string),
                http_proxy: None,
                timeout: None,
            },
            orchestrators: BTreeMap::new(),
            ldap: BTreeMap::new(),
            consoles: BTreeMap::new(),
        }
    }

    fn client(dir: &TempDir, mock: &MockTransport) -> ApiClient {
        ApiClient::new(
            &env_config(BTreeMap::new(), None),
            TokenCache::new(dir.path()),
            Box::new(mock.clone()),
            ClientOptions::default(),
        )
        .unwrap()
    }

    fn new_session_route(mock: &MockTransport) {
        mock.on(
            Method::Post,
            auth::KEYAUTH_TOKEN_PATH,
            200,
            json!({"access_token": "new", "seckey": "newsec"}),
        );
    }

    #[test]
    fn test_retry_once_on_expired_session() {
        let dir = TempDir::new().unwrap();
        let cache = TokenCache::new(dir.path());
        cache.write("dev", Some("old"), Some("oldsec")).unwrap();

        let mock = MockTransport::new();
        new_session_route(&mock);
        mock.on(Method::Get, USERS, 401, json!({"message": "token expired"}))
            .on(Method::Get, USERS, 200, json!({"user": {"id": "U1"}}));

        let mut client = client(&dir, &mock);
        let value = client.get("auth", USERS).unwrap();

        assert_eq!(value["user"]["id"], "U1");
        assert_eq!(mock.count(Method::Get, USERS), 2);
        assert_eq!(mock.count(Method::Post, auth::KEYAUTH_TOKEN_PATH), 1);
        assert_eq!(
            cache.read("dev").unwrap(),
            Session::new("new", Some("newsec".into()))
        );

        let requests = mock.requests();
        assert_eq!(requests[0].header(HEADER_TOKEN), Some("old"));
        assert_eq!(requests[2].header(HEADER_TOKEN), Some("new"));
    }

    #[test]
    fn test_second_rejection_propagates() {
        let dir = TempDir::new().unwrap();
        let mock = MockTransport::new();
        new_session_route(&mock);
        mock.on(Method::Get, USERS, 401, json!({"message": "nope"}));

        let err = client(&dir, &mock).get("auth", USERS).unwrap_err();
        assert_eq!(err.as_api().and_then(ApiError::status), Some(401));
        assert_eq!(mock.count(Method::Get, USERS), 2);
        assert_eq!(mock.count(Method::Post, auth::KEYAUTH_TOKEN_PATH), 2);
    }

    #[test]
    fn test_issues_session_when_cache_empty() {
        let dir = TempDir::new().unwrap();
        let mock = MockTransport::new();
        new_session_route(&mock);
        mock.on(Method::Get, USERS, 200, json!({"user": {}}));

        let mut client = client(&dir, &mock);
        client.get("auth", USERS).unwrap();

        let requests = mock.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].path, auth::KEYAUTH_TOKEN_PATH);
        assert!(requests[1].header("X-Auth-Signature").is_some());
        assert_eq!(
            TokenCache::new(dir.path()).read("dev").unwrap().token.as_deref(),
            Some("new")
        );
    }

    #[test]
    fn test_issue_400_and_503_continue_without_session() {
        for status in [400, 503] {
            let dir = TempDir::new().unwrap();
            let mock = MockTransport::new();
            mock.on(Method::Post, auth::KEYAUTH_TOKEN_PATH, status, json!({}));
            mock.on(Method::Get, "/v1.0/nas/ping", 200, json!({"pong": true}));

            let value = client(&dir, &mock).get("auth", "/v1.0/nas/ping").unwrap();
            assert_eq!(value["pong"], true);
            let call = mock.requests().pop().unwrap();
            assert!(call.header(HEADER_TOKEN).is_none());
        }
    }

    #[test]
    fn test_issue_other_status_propagates() {
        let dir = TempDir::new().unwrap();
        let mock = MockTransport::new();
        mock.on(Method::Post, auth::KEYAUTH_TOKEN_PATH, 500, json!({"message": "boom"}));

        let err = client(&dir, &mock).get("auth", USERS).unwrap_err();
        assert_eq!(err.to_string(), "[500] boom");
        assert_eq!(mock.count(Method::Get, USERS), 0);
    }

    #[test]
    fn test_error_mapping() {
        let dir = TempDir::new().unwrap();
        TokenCache::new(dir.path())
            .write("dev", Some("t"), Some("s"))
            .unwrap();
        let mock = MockTransport::new();
        mock.on(Method::Get, "/a", 404, json!({"message": "not found"}));
        mock.on_text(Method::Get, "/b", 200, "<html>");
        mock.fail(Method::Get, "/c", ApiError::network("connection refused"));
        mock.on_text(Method::Delete, "/d", 204, "");

        let mut client = client(&dir, &mock);
        assert!(client.get("auth", "/a").unwrap_err().is_not_found());
        let decode = client.get("auth", "/b").unwrap_err();
        assert_eq!(decode.as_api().unwrap().code, crate::error::ApiCode::Decode);
        let network = client.get("auth", "/c").unwrap_err();
        assert_eq!(network.as_api().unwrap().code, crate::error::ApiCode::Network);
        assert_eq!(client.delete("auth", "/d").unwrap(), Value::Null);
    }

    #[test]
    fn test_session_persisted_after_failure() {
        let dir = TempDir::new().unwrap();
        let mock = MockTransport::new();
        new_session_route(&mock);
        mock.on(Method::Get, USERS, 500, json!({}));

        assert!(client(&dir, &mock).get("auth", USERS).is_err());
        let cached = TokenCache::new(dir.path()).read("dev").unwrap();
        assert_eq!(cached.token.as_deref(), Some("new"));
    }

    #[test]
    fn test_per_subsystem_endpoints_and_prefix() {
        let dir = TempDir::new().unwrap();
        let mut endpoints = BTreeMap::new();
        endpoints.insert("auth".to_string(), "http://auth".to_string());
        endpoints.insert("resource".to_string(), "http://res/".to_string());
        let config = env_config(endpoints, Some("/api/"));

        let mock = MockTransport::new();
        mock.on(
            Method::Post,
            "/api/v1.0/nas/keyauth/token",
            200,
            json!({"access_token": "t", "seckey": "s"}),
        );
        mock.on(Method::Get, "/api/v1.0/nrs/entities", 200, json!({"resources": []}));

        let mut client = ApiClient::new(
            &config,
            TokenCache::new(dir.path()),
            Box::new(mock.clone()),
            ClientOptions::default(),
        )
        .unwrap();
        client.get("resource", "/v1.0/nrs/entities").unwrap();

        let requests = mock.requests();
        assert_eq!(requests[0].base, "http://auth");
        assert_eq!(requests[1].base, "http://res");
        assert_eq!(requests[1].url(), "http://res/api/v1.0/nrs/entities");

        let err = client.get("service", "/v1.0/nws/x").unwrap_err();
        assert!(matches!(err, Error::ConfigInvalid { .. }));
    }

    #[test]
    fn test_logout_and_login() {
        let dir = TempDir::new().unwrap();
        let cache = TokenCache::new(dir.path());
        cache.write("dev", Some("old"), Some("s")).unwrap();
        let mock = MockTransport::new();
        new_session_route(&mock);

        let mut client = client(&dir, &mock);
        client.logout().unwrap();
        assert!(cache.read("dev").unwrap().is_empty());

        let session = client.login().unwrap();
        assert_eq!(session.token.as_deref(), Some("new"));
        assert_eq!(cache.read("dev").unwrap().token.as_deref(), Some("new"));
    }

    #[test]
    fn test_curl_line_masks_secrets() {
        let mut req = HttpRequest::new(Method::Post, "http://cmp", auth::KEYAUTH_TOKEN_PATH);
        req.headers.push((HEADER_TOKEN.into(), "tok-123".into()));
        req.headers.push(("Accept".into(), "application/json".into()));
        req.query.push(("size".into(), "10".into()));
        req.body = RequestBody::Json(json!({"user": "admin", "password": "hunter2"}));

        let line = curl_line(&req);
        assert!(line.starts_with("curl -X POST 'http://cmp/v1.0/nas/keyauth/token?size=10'"));
        assert!(line.contains("Accept: application/json"));
        assert!(!line.contains("tok-123"));
        assert!(!line.contains("hunter2"));
        assert!(line.contains("admin"));
    }
}
