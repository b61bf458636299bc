//! Session issuing and request authorization.
//!
//! `keyauth` exchanges user/password for a token plus a per-session seckey
//! and signs every request (see [`crate::signing`]). `oauth2` signs a short
//! lived JWT assertion with an RSA key and exchanges it for a bearer token.

use crate::config::{AuthType, CmpConfig};
use crate::error::{ApiError, Error, Result};
use crate::signing::Signer;
use crate::token::Session;
use crate::transport::{HttpRequest, HttpResponse, Method, RequestBody};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::path::Path;
use zeroize::Zeroizing;

/// Subsystem serving the token endpoints.
pub const AUTH_SUBSYSTEM: &str = "auth";

pub const KEYAUTH_TOKEN_PATH: &str = "/v1.0/nas/keyauth/token";
pub const OAUTH2_TOKEN_PATH: &str = "/v1.0/oauth2/token";

/// Audience expected by the CMP in JWT assertions.
pub const JWT_AUDIENCE: &str = "nivola";
/// Lifetime of a JWT assertion, in seconds.
pub const JWT_TTL_SECS: i64 = 60;

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Claims of the oauth2 JWT assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
}

impl AssertionClaims {
    /// Claims issued at `now` for `issuer`.
    pub fn new(issuer: &str, subject: Option<&str>, now: i64) -> Self {
        Self {
            iss: issuer.to_string(),
            aud: JWT_AUDIENCE.to_string(),
            iat: now,
            nbf: now,
            exp: now + JWT_TTL_SECS,
            sub: subject.map(str::to_string),
        }
    }
}

/// Credentials for one environment.
#[derive(Clone)]
pub enum Credentials {
    Keyauth {
        user: String,
        password: Zeroizing<String>,
    },
    Oauth2 {
        issuer: String,
        subject: Option<String>,
        private_key: Zeroizing<String>,
    },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keyauth { user, .. } => f
                .debug_struct("Keyauth")
                .field("user", user)
                .field("password", &"***")
                .finish(),
            Self::Oauth2 {
                issuer, subject, ..
            } => f
                .debug_struct("Oauth2")
                .field("issuer", issuer)
                .field("subject", subject)
                .field("private_key", &"***")
                .finish(),
        }
    }
}

impl Credentials {
    /// Extract credentials from the `cmp` section.
    ///
    /// For oauth2 the `secret` is either PEM text or a path to a PEM file.
    pub fn from_config(cmp: &CmpConfig) -> Result<Self> {
        match cmp.authtype {
            AuthType::Keyauth => {
                let password = cmp
                    .pwd
                    .clone()
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| Error::Auth("no password configured for keyauth".into()))?;
                Ok(Self::Keyauth {
                    user: cmp.user.clone(),
                    password: Zeroizing::new(password),
                })
            }
            AuthType::Oauth2 => {
                let secret = cmp
                    .secret
                    .as_deref()
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| Error::Auth("no private key configured for oauth2".into()))?;
                let private_key = if secret.trim_start().starts_with("-----BEGIN") {
                    secret.to_string()
                } else {
                    let path = Path::new(secret);
                    std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?
                };
                let (issuer, subject) = match &cmp.client_id {
                    Some(client_id) => (client_id.clone(), Some(cmp.user.clone())),
                    None => (cmp.user.clone(), None),
                };
                Ok(Self::Oauth2 {
                    issuer,
                    subject,
                    private_key: Zeroizing::new(private_key),
                })
            }
        }
    }

    /// Authentication scheme of these credentials.
    pub fn authtype(&self) -> AuthType {
        match self {
            Self::Keyauth { .. } => AuthType::Keyauth,
            Self::Oauth2 { .. } => AuthType::Oauth2,
        }
    }

    /// Path of the token endpoint, relative to the auth subsystem.
    pub fn token_path(&self) -> &'static str {
        match self {
            Self::Keyauth { .. } => KEYAUTH_TOKEN_PATH,
            Self::Oauth2 { .. } => OAUTH2_TOKEN_PATH,
        }
    }

    /// Body of the session-issue request.
    pub fn issue_body(&self, now: i64) -> Result<RequestBody> {
        match self {
            Self::Keyauth { user, password } => Ok(RequestBody::Json(json!({
                "user": user,
                "password": password.as_str(),
            }))),
            Self::Oauth2 {
                issuer,
                subject,
                private_key,
            } => {
                let claims = AssertionClaims::new(issuer, subject.as_deref(), now);
                let assertion = sign_assertion(&claims, private_key)?;
                Ok(RequestBody::Form(vec![
                    ("grant_type".to_string(), JWT_BEARER_GRANT.to_string()),
                    ("assertion".to_string(), assertion),
                ]))
            }
        }
    }

    /// Decode a successful session-issue response.
    pub fn parse_issue(&self, response: &HttpResponse) -> Result<Session> {
        let payload: Value = serde_json::from_str(&response.body)
            .map_err(|e| ApiError::decode(format!("invalid token response: {e}")))?;
        let token = payload
            .get("access_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Auth("token response carries no access_token".into()))?;

        let seckey = match self {
            Self::Keyauth { .. } => payload
                .get("seckey")
                .and_then(Value::as_str)
                .map(str::to_string),
            Self::Oauth2 { .. } => None,
        };
        Ok(Session::new(token, seckey))
    }

    /// Add the authentication headers for `session` to a request.
    ///
    /// `path` is the absolute request path the signature covers.
    pub fn authorize(&self, session: &Session, signer: &mut Signer, req: &mut HttpRequest) {
        let Some(token) = session.token.as_deref() else {
            return;
        };
        match self {
            Self::Keyauth { .. } => {
                let seckey = session.seckey.as_deref().unwrap_or("");
                let headers = signer.headers(token, seckey, req.method.as_str(), &req.path);
                req.headers.extend(headers);
            }
            Self::Oauth2 { .. } => {
                req.headers
                    .push(("Authorization".to_string(), format!("Bearer {token}")));
            }
        }
    }
}

/// Build the session-issue request against the auth base URL.
pub fn issue_request(credentials: &Credentials, base: &str, path: String) -> Result<HttpRequest> {
    let mut req = HttpRequest::new(Method::Post, base, path);
    req.body = credentials.issue_body(chrono::Utc::now().timestamp())?;
    Ok(req)
}

/// Sign an assertion with an RSA private key (RS256).
pub fn sign_assertion(claims: &AssertionClaims, private_key_pem: &str) -> Result<String> {
    let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
        .map_err(|e| Error::Auth(format!("invalid RSA private key: {e}")))?;
    jsonwebtoken::encode(&Header::new(Algorithm::RS256), claims, &key)
        .map_err(|e| Error::Auth(format!("cannot sign JWT assertion: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{DecodingKey, Validation};
    use std::collections::BTreeMap;

    const PRIVATE_KEY: &str = include_str!("../testdata/rsa_private.pem");
    const PUBLIC_KEY: &str = include_str!("../testdata/rsa_public.pem");

    fn cmp(authtype: AuthType) -> CmpConfig {
        CmpConfig {
            endpoint: Some("http://cmp".into()),
            endpoints: BTreeMap::new(),
            authtype,
            user: "admin@local".into(),
            pwd: Some("pw".into()),
            secret: Some(PRIVATE_KEY.into()),
            client_id: None,
            catalog: None,
            prefix_path: None,
            http_proxy: None,
            timeout: None,
        }
    }

    #[test]
    fn test_keyauth_issue_body() {
        let creds = Credentials::from_config(&cmp(AuthType::Keyauth)).unwrap();
        assert_eq!(creds.token_path(), KEYAUTH_TOKEN_PATH);
        let body = creds.issue_body(0).unwrap();
        assert_eq!(
            body,
            RequestBody::Json(json!({"user": "admin@local", "password": "pw"}))
        );
    }

    #[test]
    fn test_keyauth_requires_password() {
        let mut config = cmp(AuthType::Keyauth);
        config.pwd = None;
        assert!(matches!(
            Credentials::from_config(&config),
            Err(Error::Auth(_))
        ));
    }

    #[test]
    fn test_parse_keyauth_response() {
        let creds = Credentials::from_config(&cmp(AuthType::Keyauth)).unwrap();
        let resp = HttpResponse::json(200, &json!({"access_token": "t1", "seckey": "s1"}));
        let session = creds.parse_issue(&resp).unwrap();
        assert_eq!(session, Session::new("t1", Some("s1".into())));

        let resp = HttpResponse::json(200, &json!({"seckey": "s1"}));
        assert!(creds.parse_issue(&resp).is_err());
    }

    #[test]
    fn test_oauth2_assertion_claims() {
        let mut config = cmp(AuthType::Oauth2);
        config.client_id = Some("client-1".into());
        let creds = Credentials::from_config(&config).unwrap();

        let now = chrono::Utc::now().timestamp();
        let RequestBody::Form(form) = creds.issue_body(now).unwrap() else {
            panic!("expected form body");
        };
        assert_eq!(form[0].1, JWT_BEARER_GRANT);

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[JWT_AUDIENCE]);
        let decoded = jsonwebtoken::decode::<AssertionClaims>(
            &form[1].1,
            &DecodingKey::from_rsa_pem(PUBLIC_KEY.as_bytes()).unwrap(),
            &validation,
        )
        .unwrap();

        assert_eq!(decoded.claims.iss, "client-1");
        assert_eq!(decoded.claims.sub.as_deref(), Some("admin@local"));
        assert_eq!(decoded.claims.exp - decoded.claims.iat, JWT_TTL_SECS);
        assert_eq!(decoded.claims.nbf, decoded.claims.iat);
    }

    #[test]
    fn test_oauth2_secret_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let key_path = dir.path().join("key.pem");
        std::fs::write(&key_path, PRIVATE_KEY).unwrap();

        let mut config = cmp(AuthType::Oauth2);
        config.secret = Some(key_path.display().to_string());
        let creds = Credentials::from_config(&config).unwrap();
        assert_eq!(creds.authtype(), AuthType::Oauth2);
        assert!(creds.issue_body(0).is_ok());
    }

    #[test]
    fn test_authorize_headers() {
        let mut signer = Signer::new();
        let session = Session::new("tok", Some("sec".into()));

        let keyauth = Credentials::from_config(&cmp(AuthType::Keyauth)).unwrap();
        let mut req = HttpRequest::new(Method::Get, "http://cmp", "/v1.0/nas/users");
        keyauth.authorize(&session, &mut signer, &mut req);
        assert_eq!(req.header("X-Auth-Token"), Some("tok"));
        assert!(req.header("X-Auth-Signature").is_some());

        let oauth = Credentials::from_config(&cmp(AuthType::Oauth2)).unwrap();
        let mut req = HttpRequest::new(Method::Get, "http://cmp", "/v1.0/nas/users");
        oauth.authorize(&session, &mut signer, &mut req);
        assert_eq!(req.header("Authorization"), Some("Bearer tok"));

        let mut req = HttpRequest::new(Method::Get, "http://cmp", "/x");
        oauth.authorize(&Session::empty(), &mut signer, &mut req);
        assert!(req.headers.is_empty());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let creds = Credentials::from_config(&cmp(AuthType::Keyauth)).unwrap();
        let shown = format!("{creds:?}");
        assert!(!shown.contains("pw\""));
        assert!(shown.contains("***"));
    }
}
