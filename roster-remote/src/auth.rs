//! OAuth access tokens for the spreadsheet API.
//!
//! [`TokenCache`] is the one cross-cycle cache in the process: it holds the
//! current access token and replaces it when it is missing, expired, or
//! about to expire. OAuth user credentials are refreshed with their refresh
//! token; service accounts sign a fresh JWT-bearer assertion each time.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use roster_core::{GoogleCredentials, OAuthToken, ServiceAccountKey};
use roster_sync::SinkError;

/// Refresh this long before the reported expiry.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Lifetime requested for service account assertions (the maximum allowed).
const ASSERTION_LIFETIME_SECS: i64 = 3600;

pub const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

struct CachedToken {
    token: SecretString,
    /// `None` when the expiry is unknown (token supplied from outside).
    expires_at: Option<DateTime<Utc>>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            None => true,
            Some(at) => at - now > Duration::seconds(EXPIRY_SKEW_SECS),
        }
    }
}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// How a new access token is obtained.
enum Grant {
    RefreshToken(OAuthToken),
    ServiceAccount(ServiceAccountKey),
}

/// Claims of a service account assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

/// Source of bearer tokens for sheet requests.
pub struct TokenCache {
    grant: Option<Grant>,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(credentials: GoogleCredentials) -> Self {
        match credentials {
            GoogleCredentials::AccessToken(token) => Self {
                grant: None,
                cached: Mutex::new(Some(CachedToken {
                    token,
                    expires_at: None,
                })),
            },
            GoogleCredentials::OAuth(mut oauth) => {
                let seeded = oauth.access_token.take().map(|token| CachedToken {
                    token,
                    expires_at: None,
                });
                Self {
                    grant: Some(Grant::RefreshToken(oauth)),
                    cached: Mutex::new(seeded),
                }
            }
            GoogleCredentials::ServiceAccount(key) => Self {
                grant: Some(Grant::ServiceAccount(key)),
                cached: Mutex::new(None),
            },
        }
    }

    /// Whether a rejected token can be replaced.
    pub fn can_refresh(&self) -> bool {
        self.grant.is_some()
    }

    /// Current bearer token, refreshing it first if needed.
    pub async fn bearer(&self, http: &reqwest::Client) -> Result<String, SinkError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(token.token.expose_secret().to_string());
        }
        let fresh = match &self.grant {
            Some(Grant::RefreshToken(oauth)) => {
                tracing::debug!(token_uri = %oauth.token_uri, "refreshing access token");
                request_token(http, &oauth.token_uri, &refresh_form(oauth)).await?
            }
            Some(Grant::ServiceAccount(key)) => {
                tracing::debug!(account = %key.client_email, "requesting service account token");
                let assertion = sign_assertion(key, Utc::now())?;
                request_token(http, &key.token_uri, &jwt_bearer_form(&assertion)).await?
            }
            None => {
                return Err(SinkError::Auth(
                    "access token expired and no refresh token is configured".to_string(),
                ))
            }
        };
        let bearer = fresh.token.expose_secret().to_string();
        *cached = Some(fresh);
        Ok(bearer)
    }

    /// Forget the cached token after the API rejected it.
    pub async fn invalidate(&self) {
        if self.can_refresh() {
            *self.cached.lock().await = None;
        }
    }
}

/// Form fields for the refresh-token grant.
pub fn refresh_form(oauth: &OAuthToken) -> [(&'static str, &str); 4] {
    [
        ("grant_type", "refresh_token"),
        ("refresh_token", oauth.refresh_token.expose_secret()),
        ("client_id", oauth.client_id.as_str()),
        ("client_secret", oauth.client_secret.expose_secret()),
    ]
}

/// Form fields exchanging a signed assertion for an access token.
pub fn jwt_bearer_form(assertion: &str) -> [(&'static str, &str); 2] {
    [("grant_type", JWT_BEARER_GRANT), ("assertion", assertion)]
}

/// Claims for an assertion issued at `now`.
pub fn assertion_claims(key: &ServiceAccountKey, now: DateTime<Utc>) -> AssertionClaims {
    AssertionClaims {
        iss: key.client_email.clone(),
        scope: SPREADSHEETS_SCOPE.to_string(),
        aud: key.token_uri.clone(),
        iat: now.timestamp(),
        exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
    }
}

/// RS256-signed assertion for `key`.
pub fn sign_assertion(key: &ServiceAccountKey, now: DateTime<Utc>) -> Result<String, SinkError> {
    let signing_key = EncodingKey::from_rsa_pem(key.private_key.expose_secret().as_bytes())
        .map_err(|e| SinkError::Auth(format!("service account private key: {e}")))?;
    jsonwebtoken::encode(
        &Header::new(Algorithm::RS256),
        &assertion_claims(key, now),
        &signing_key,
    )
    .map_err(|e| SinkError::Auth(format!("signing service account assertion: {e}")))
}

async fn request_token(
    http: &reqwest::Client,
    token_uri: &str,
    form: &[(&str, &str)],
) -> Result<CachedToken, SinkError> {
    let response = http
        .post(token_uri)
        .form(form)
        .send()
        .await
        .map_err(|e| SinkError::Transport(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SinkError::Auth(format!("token request returned {status}: {body}")));
    }
    let parsed: RefreshResponse = response
        .json()
        .await
        .map_err(|e| SinkError::Decode(format!("token response: {e}")))?;
    Ok(CachedToken {
        token: SecretString::from(parsed.access_token),
        expires_at: parsed
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oauth() -> OAuthToken {
        OAuthToken {
            access_token: None,
            refresh_token: SecretString::from("1//refresh+token".to_string()),
            token_uri: "https://oauth2.example/token".to_string(),
            client_id: "client.apps".to_string(),
            client_secret: SecretString::from("s3cr&t".to_string()),
        }
    }

    fn service_account() -> ServiceAccountKey {
        ServiceAccountKey {
            client_email: "sync@roster-test.iam.gserviceaccount.com".to_string(),
            private_key: SecretString::from(
                include_str!("../tests/fixtures/test_signing_key.pem").to_string(),
            ),
            token_uri: "https://oauth2.example/token".to_string(),
        }
    }

    #[test]
    fn refresh_form_carries_the_refresh_grant() {
        let oauth = oauth();
        let form = refresh_form(&oauth);
        assert_eq!(
            form,
            [
                ("grant_type", "refresh_token"),
                ("refresh_token", "1//refresh+token"),
                ("client_id", "client.apps"),
                ("client_secret", "s3cr&t"),
            ]
        );
    }

    #[test]
    fn assertion_claims_target_the_token_endpoint() {
        let now = Utc::now();
        let claims = assertion_claims(&service_account(), now);
        assert_eq!(claims.iss, "sync@roster-test.iam.gserviceaccount.com");
        assert_eq!(claims.aud, "https://oauth2.example/token");
        assert_eq!(claims.scope, SPREADSHEETS_SCOPE);
        assert_eq!(claims.exp - claims.iat, 3600);
        assert_eq!(
            jwt_bearer_form("a.b.c"),
            [
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", "a.b.c"),
            ]
        );
    }

    #[test]
    fn assertion_is_rs256_signed_by_the_account_key() {
        use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};

        let key = service_account();
        let now = Utc::now();
        let jwt = sign_assertion(&key, now).expect("sign");
        assert_eq!(decode_header(&jwt).expect("header").alg, Algorithm::RS256);

        let public =
            DecodingKey::from_rsa_pem(include_bytes!("../tests/fixtures/test_signing_key.pub.pem"))
                .expect("public key");
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&["https://oauth2.example/token"]);
        let decoded = decode::<AssertionClaims>(&jwt, &public, &validation).expect("verify");
        assert_eq!(decoded.claims, assertion_claims(&key, now));
    }

    #[test]
    fn malformed_private_key_is_an_auth_error() {
        let mut key = service_account();
        key.private_key = SecretString::from("not a pem".to_string());
        assert!(matches!(sign_assertion(&key, Utc::now()), Err(SinkError::Auth(_))));
    }

    #[test]
    fn tokens_near_expiry_are_stale() {
        let now = Utc::now();
        let soon = CachedToken {
            token: SecretString::from("t".to_string()),
            expires_at: Some(now + Duration::seconds(30)),
        };
        let later = CachedToken {
            token: SecretString::from("t".to_string()),
            expires_at: Some(now + Duration::seconds(600)),
        };
        assert!(!soon.is_fresh(now));
        assert!(later.is_fresh(now));
    }

    #[tokio::test]
    async fn static_token_is_served_without_refresh() {
        let cache = TokenCache::new(GoogleCredentials::AccessToken(SecretString::from(
            "static-token".to_string(),
        )));
        assert!(!cache.can_refresh());
        let http = reqwest::Client::new();
        assert_eq!(cache.bearer(&http).await.unwrap(), "static-token");
        cache.invalidate().await;
        assert_eq!(cache.bearer(&http).await.unwrap(), "static-token");
    }

    #[tokio::test]
    async fn seeded_oauth_token_is_used_first() {
        let mut creds = oauth();
        creds.access_token = Some(SecretString::from("seeded".to_string()));
        let cache = TokenCache::new(GoogleCredentials::OAuth(creds));
        let http = reqwest::Client::new();
        assert_eq!(cache.bearer(&http).await.unwrap(), "seeded");
    }

    #[tokio::test]
    async fn service_account_starts_without_a_token() {
        let cache = TokenCache::new(GoogleCredentials::ServiceAccount(service_account()));
        assert!(cache.can_refresh());
        assert!(cache.cached.lock().await.is_none());
    }
}
