//! Bearer token handling shared by every remote client.
//!
//! [`TokenHolder`] is passed explicitly to the clients that need it. The lock
//! is held across the refresh so concurrent callers that all see an expired
//! token trigger a single reissue; the ones queued behind it find a fresh
//! token and reuse it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{DecodingKey, Validation, decode};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::client::read_json;
use super::error::RemoteError;

/// Seconds before `exp` at which a token is already treated as expired.
const EXPIRY_LEEWAY_SECS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Obtains new tokens from the auth service.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn reissue(&self, current: &Tokens) -> Result<Tokens, RemoteError>;
    async fn login(&self) -> Result<Tokens, RemoteError>;
}

pub struct TokenHolder {
    tokens: Mutex<Tokens>,
    issuer: Option<Arc<dyn TokenIssuer>>,
}

impl TokenHolder {
    pub fn new(tokens: Tokens, issuer: Option<Arc<dyn TokenIssuer>>) -> Self {
        Self {
            tokens: Mutex::new(tokens),
            issuer,
        }
    }

    /// A holder that never refreshes. Non-JWT tokens such as API keys never expire.
    pub fn fixed(access_token: impl Into<String>) -> Self {
        Self::new(
            Tokens {
                access_token: access_token.into(),
                refresh_token: None,
            },
            None,
        )
    }

    /// Returns a valid access token, reissuing it first when it has expired.
    ///
    /// Reissue uses the refresh token; if that fails the issuer logs in again.
    pub async fn refresh_if_expired(&self) -> Result<String, RemoteError> {
        let mut tokens = self.tokens.lock().await;
        if !is_expired(&tokens.access_token, Utc::now().timestamp()) {
            return Ok(tokens.access_token.clone());
        }

        let issuer = self
            .issuer
            .as_ref()
            .ok_or_else(|| RemoteError::Auth("access token expired and no issuer is configured".into()))?;

        let fresh = match issuer.reissue(&tokens).await {
            Ok(fresh) => fresh,
            Err(e) => {
                tracing::warn!(error = %e, "token reissue failed, logging in again");
                issuer.login().await?
            }
        };
        tracing::info!("access token reissued");
        *tokens = fresh;
        Ok(tokens.access_token.clone())
    }
}

#[derive(Debug, Deserialize)]
struct ExpiryClaim {
    #[serde(default)]
    exp: Option<i64>,
}

/// `exp` claim of a JWT, read without verifying the signature. `None` when the
/// token is not a JWT or carries no expiry.
fn token_expiry(token: &str) -> Option<i64> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<ExpiryClaim>(token, &DecodingKey::from_secret(&[]), &validation)
        .ok()
        .and_then(|data| data.claims.exp)
}

fn is_expired(token: &str, now: i64) -> bool {
    match token_expiry(token) {
        Some(exp) => now + EXPIRY_LEEWAY_SECS >= exp,
        None => false,
    }
}

/// HTTP implementation of [`TokenIssuer`] against the auth service.
pub struct AuthClient {
    client: Client,
    base_url: String,
    credentials: Option<(String, String)>,
}

impl AuthClient {
    pub fn new(client: Client, base_url: impl Into<String>, credentials: Option<(String, String)>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            credentials,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl TokenIssuer for AuthClient {
    async fn reissue(&self, current: &Tokens) -> Result<Tokens, RemoteError> {
        let refresh_token = current
            .refresh_token
            .as_deref()
            .ok_or_else(|| RemoteError::Auth("no refresh token available".into()))?;
        let response = self
            .client
            .post(self.url("/auth/token/reissue"))
            .json(&serde_json::json!({
                "access_token": current.access_token,
                "refresh_token": refresh_token,
            }))
            .send()
            .await?;
        read_json(response).await
    }

    async fn login(&self) -> Result<Tokens, RemoteError> {
        let (email, password) = self
            .credentials
            .as_ref()
            .ok_or_else(|| RemoteError::Auth("no credentials configured for login".into()))?;
        let response = self
            .client
            .post(self.url("/auth/login"))
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;
        read_json(response).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use jsonwebtoken::{EncodingKey, Header, encode};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn jwt(exp: i64) -> String {
        #[derive(Serialize)]
        struct Claims {
            sub: String,
            exp: i64,
        }
        encode(
            &Header::default(),
            &Claims {
                sub: "user-1".into(),
                exp,
            },
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap()
    }

    struct CountingIssuer {
        reissues: AtomicU32,
        fail_reissue: bool,
        logins: AtomicU32,
    }

    impl CountingIssuer {
        fn new(fail_reissue: bool) -> Self {
            Self {
                reissues: AtomicU32::new(0),
                fail_reissue,
                logins: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl TokenIssuer for CountingIssuer {
        async fn reissue(&self, _current: &Tokens) -> Result<Tokens, RemoteError> {
            self.reissues.fetch_add(1, Ordering::SeqCst);
            if self.fail_reissue {
                return Err(RemoteError::Auth("refresh token expired".into()));
            }
            Ok(Tokens {
                access_token: jwt(Utc::now().timestamp() + 3600),
                refresh_token: Some("r2".into()),
            })
        }

        async fn login(&self) -> Result<Tokens, RemoteError> {
            self.logins.fetch_add(1, Ordering::SeqCst);
            Ok(Tokens {
                access_token: "from-login".into(),
                refresh_token: None,
            })
        }
    }

    #[test]
    fn expiry_is_read_from_jwt() {
        let now = Utc::now().timestamp();
        assert_eq!(token_expiry(&jwt(now + 100)), Some(now + 100));
        assert!(!is_expired(&jwt(now + 3600), now));
        assert!(is_expired(&jwt(now - 1), now));
        // Within the leeway counts as expired.
        assert!(is_expired(&jwt(now + 10), now));
    }

    #[test]
    fn opaque_tokens_never_expire() {
        assert_eq!(token_expiry("api-key-123"), None);
        assert!(!is_expired("api-key-123", Utc::now().timestamp()));
    }

    #[tokio::test]
    async fn valid_token_is_reused_without_issuer_call() {
        let issuer = Arc::new(CountingIssuer::new(false));
        let token = jwt(Utc::now().timestamp() + 3600);
        let holder = TokenHolder::new(
            Tokens {
                access_token: token.clone(),
                refresh_token: Some("r1".into()),
            },
            Some(issuer.clone()),
        );

        assert_eq!(holder.refresh_if_expired().await.unwrap(), token);
        assert_eq!(holder.refresh_if_expired().await.unwrap(), token);
        assert_eq!(issuer.reissues.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn expired_token_is_reissued_once() {
        let issuer = Arc::new(CountingIssuer::new(false));
        let holder = TokenHolder::new(
            Tokens {
                access_token: jwt(Utc::now().timestamp() - 60),
                refresh_token: Some("r1".into()),
            },
            Some(issuer.clone()),
        );

        let first = holder.refresh_if_expired().await.unwrap();
        let second = holder.refresh_if_expired().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(issuer.reissues.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_reissue_falls_back_to_login() {
        let issuer = Arc::new(CountingIssuer::new(true));
        let holder = TokenHolder::new(
            Tokens {
                access_token: jwt(Utc::now().timestamp() - 60),
                refresh_token: Some("r1".into()),
            },
            Some(issuer.clone()),
        );

        assert_eq!(holder.refresh_if_expired().await.unwrap(), "from-login");
        assert_eq!(issuer.logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_token_without_issuer_is_an_auth_error() {
        let holder = TokenHolder::fixed(jwt(Utc::now().timestamp() - 60));
        let err = holder.refresh_if_expired().await.unwrap_err();
        assert!(matches!(err, RemoteError::Auth(_)));
    }

    #[tokio::test]
    async fn auth_client_reissues_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/token/reissue"))
            .and(body_partial_json(serde_json::json!({ "refresh_token": "r1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "access_token": "a2", "refresh_token": "r2" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = AuthClient::new(Client::new(), server.uri(), None);
        let tokens = client
            .reissue(&Tokens {
                access_token: "a1".into(),
                refresh_token: Some("r1".into()),
            })
            .await
            .unwrap();
        assert_eq!(tokens.access_token, "a2");
        assert_eq!(tokens.refresh_token.as_deref(), Some("r2"));
    }

    #[tokio::test]
    async fn auth_client_login_requires_credentials() {
        let client = AuthClient::new(Client::new(), "http://127.0.0.1:9", None);
        assert!(matches!(client.login().await, Err(RemoteError::Auth(_))));
    }
}
