//! Letao login handshake.

use crate::config::LetaoSettings;
use crate::error::AuthError;
use crate::letao::session::SessionToken;
use crate::letao::{session_client, AJAX_ACCEPT};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use reqwest::cookie::Jar;
use reqwest::header::{ACCEPT, ORIGIN, REFERER};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Code Letao returns for a successful login.
const LOGIN_OK: &str = "200";

/// Letao timestamps without an offset are Taiwan local time.
const LETAO_UTC_OFFSET_SECS: i32 = 8 * 3600;

/// Produces a fresh session - enables mocking for tests.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self) -> Result<SessionToken, AuthError>;
}

#[derive(Debug, Deserialize)]
struct LoginReply {
    #[serde(default)]
    code: Value,
    #[serde(default)]
    details: Option<LoginDetails>,
}

#[derive(Debug, Deserialize)]
struct LoginDetails {
    #[serde(default)]
    data: Option<LoginData>,
}

#[derive(Debug, Deserialize)]
struct LoginData {
    #[serde(default)]
    guid: Option<String>,
    #[serde(default, rename = "guidExpired")]
    guid_expired: Option<Value>,
}

/// Email/password login against letao.com.tw.
///
/// Each login starts from an empty cookie jar that the returned token then owns.
pub struct LetaoAuthenticator {
    base_url: Url,
    origin: String,
    email: String,
    password: String,
    login_delay: Duration,
}

impl LetaoAuthenticator {
    pub fn new(settings: &LetaoSettings) -> Result<Self, AuthError> {
        let origin = settings.base_url.trim_end_matches('/').to_string();
        let base_url = Url::parse(&origin)
            .map_err(|e| AuthError::Transport(format!("invalid base url {}: {}", origin, e)))?;

        Ok(Self {
            base_url,
            origin,
            email: settings.email.clone(),
            password: settings.password.clone(),
            login_delay: Duration::from_millis(settings.login_delay_ms),
        })
    }

    /// Visits the login page so the jar picks up the baseline cookies, redirects included.
    async fn open_login_page(&self, client: &Client) -> Result<(), AuthError> {
        let url = format!("{}/login.php", self.origin);
        debug!("GET {}", url);

        let response =
            client.get(&url).send().await.map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Transport(format!("login page returned HTTP {}", status)));
        }

        Ok(())
    }

    async fn post_credentials(&self, client: &Client) -> Result<String, AuthError> {
        let url = format!("{}/config/login_api.php", self.origin);
        let data = json!({
            "email": self.email,
            "password": self.password,
            "persistent": 1,
        })
        .to_string();

        client
            .post(&url)
            .header(ACCEPT, AJAX_ACCEPT)
            .header("X-Requested-With", "XMLHttpRequest")
            .header(ORIGIN, &self.origin)
            .header(REFERER, format!("{}/login.php", self.origin))
            .form(&[("action", "loginByEmail"), ("data", data.as_str())])
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?
            .text()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))
    }
}

#[async_trait]
impl Authenticator for LetaoAuthenticator {
    async fn authenticate(&self) -> Result<SessionToken, AuthError> {
        info!("Logging in to Letao as {}", self.email);

        let jar = Arc::new(Jar::default());
        let client =
            session_client(jar.clone()).map_err(|e| AuthError::Transport(e.to_string()))?;

        self.open_login_page(&client).await?;

        if !self.login_delay.is_zero() {
            tokio::time::sleep(self.login_delay).await;
        }

        let body = self.post_credentials(&client).await?;

        let reply: LoginReply = serde_json::from_str(body.trim()).map_err(|_| {
            error!("Unreadable login response: {}", body);
            AuthError::Rejected { code: "invalid".to_string(), body: body.clone() }
        })?;

        let code = code_text(&reply.code);
        if code != LOGIN_OK {
            error!("Login rejected with code {}: {}", code, body);
            return Err(AuthError::Rejected { code, body });
        }

        let data = reply.details.and_then(|d| d.data).ok_or(AuthError::MissingSession)?;
        let guid = data.guid.filter(|g| !g.trim().is_empty()).ok_or(AuthError::MissingSession)?;
        let expiry = data
            .guid_expired
            .map(|v| code_text(&v))
            .filter(|e| !e.trim().is_empty())
            .ok_or(AuthError::MissingSession)?;
        let expires_at = parse_expiry(&expiry)?;

        jar.add_cookie_str(&guid_cookie(&guid, expires_at), &self.base_url);
        info!("Logged in to Letao, session valid until {}", expires_at);

        Ok(SessionToken::new(guid, expires_at, jar))
    }
}

/// Parses the login expiry: RFC 3339, a Taiwan-local "YYYY-MM-DD HH:MM:SS", or unix seconds.
pub fn parse_expiry(text: &str) -> Result<DateTime<Utc>, AuthError> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(secs) = text.parse::<i64>() {
        return DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| AuthError::InvalidExpiry(text.to_string()));
    }

    let offset = FixedOffset::east_opt(LETAO_UTC_OFFSET_SECS)
        .ok_or_else(|| AuthError::InvalidExpiry(text.to_string()))?;
    ["%Y-%m-%d %H:%M:%S", "%Y/%m/%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .and_then(|naive| offset.from_local_datetime(&naive).single())
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| AuthError::InvalidExpiry(text.to_string()))
}

fn code_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Host-only `guid` cookie expiring with the session.
fn guid_cookie(guid: &str, expires_at: DateTime<Utc>) -> String {
    format!("guid={}; Path=/; Expires={}", guid, expires_at.format("%a, %d %b %Y %H:%M:%S GMT"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_settings(server: &MockServer) -> LetaoSettings {
        LetaoSettings {
            email: "me@example.com".to_string(),
            password: "secret".to_string(),
            base_url: server.uri(),
            login_delay_ms: 0,
            ..Default::default()
        }
    }

    async fn mount_login_page(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/login.php"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Set-Cookie", "PHPSESSID=baseline; Path=/")
                    .set_body_string("<html>login</html>"),
            )
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_login_success() {
        let server = MockServer::start().await;
        mount_login_page(&server).await;

        Mock::given(method("POST"))
            .and(path("/config/login_api.php"))
            .and(header("X-Requested-With", "XMLHttpRequest"))
            .and(header("cookie", "PHPSESSID=baseline"))
            .and(body_string_contains("action=loginByEmail"))
            .and(body_string_contains("me%40example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"code":"200","message":"ok","details":{"data":{"guid":"G-123","guidExpired":"2030-01-02 08:00:00"}}}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let auth = LetaoAuthenticator::new(&make_settings(&server)).unwrap();
        let token = auth.authenticate().await.unwrap();

        assert_eq!(token.value, "G-123");
        assert_eq!(token.expires_at, Utc.with_ymd_and_hms(2030, 1, 2, 0, 0, 0).unwrap());

        let cart_url = Url::parse(&format!("{}/jpshopping/cart.php", server.uri())).unwrap();
        let cookies = token.cookie_header(&cart_url).unwrap();
        assert!(cookies.contains("PHPSESSID=baseline"), "{}", cookies);
        assert!(cookies.contains("guid=G-123"), "{}", cookies);
    }

    #[tokio::test]
    async fn test_login_numeric_code() {
        let server = MockServer::start().await;
        mount_login_page(&server).await;

        Mock::given(method("POST"))
            .and(path("/config/login_api.php"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"code":200,"details":{"data":{"guid":"G","guidExpired":"2030-01-01T00:00:00Z"}}}"#,
            ))
            .mount(&server)
            .await;

        let auth = LetaoAuthenticator::new(&make_settings(&server)).unwrap();
        assert!(auth.authenticate().await.is_ok());
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let server = MockServer::start().await;
        mount_login_page(&server).await;

        Mock::given(method("POST"))
            .and(path("/config/login_api.php"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"code":"401","message":"密碼錯誤"}"#),
            )
            .mount(&server)
            .await;

        let auth = LetaoAuthenticator::new(&make_settings(&server)).unwrap();
        let err = auth.authenticate().await.unwrap_err();
        assert!(matches!(err, AuthError::Rejected { ref code, .. } if code == "401"));
    }

    #[tokio::test]
    async fn test_login_missing_guid() {
        let server = MockServer::start().await;
        mount_login_page(&server).await;

        Mock::given(method("POST"))
            .and(path("/config/login_api.php"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"code":"200","details":{"data":{"guid":""}}}"#),
            )
            .mount(&server)
            .await;

        let auth = LetaoAuthenticator::new(&make_settings(&server)).unwrap();
        assert!(matches!(auth.authenticate().await, Err(AuthError::MissingSession)));
    }

    #[tokio::test]
    async fn test_login_page_unavailable() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/login.php"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let auth = LetaoAuthenticator::new(&make_settings(&server)).unwrap();
        let err = auth.authenticate().await.unwrap_err();
        assert!(matches!(err, AuthError::Transport(ref m) if m.contains("503")));
    }

    #[test]
    fn test_parse_expiry_formats() {
        let expected = Utc.with_ymd_and_hms(2030, 1, 1, 16, 0, 0).unwrap();
        assert_eq!(parse_expiry("2030-01-02 00:00:00").unwrap(), expected);
        assert_eq!(parse_expiry("2030/01/02 00:00:00").unwrap(), expected);
        assert_eq!(parse_expiry("2030-01-01T16:00:00Z").unwrap(), expected);
        assert_eq!(parse_expiry(&expected.timestamp().to_string()).unwrap(), expected);
        assert!(matches!(parse_expiry("next tuesday"), Err(AuthError::InvalidExpiry(_))));
    }

    #[tokio::test]
    async fn test_login_keeps_cookies_from_redirected_login_page() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/login.php"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Set-Cookie", "PHPSESSID=baseline; Path=/")
                    .insert_header("Location", "/member/login.php"),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/member/login.php"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/config/login_api.php"))
            .and(header("cookie", "PHPSESSID=baseline"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"code":"200","details":{"data":{"guid":"G","guidExpired":"2030-01-01 00:00:00"}}}"#,
            ))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/config/login_api.php"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"code":"403","message":"no session"}"#),
            )
            .mount(&server)
            .await;

        let auth = LetaoAuthenticator::new(&make_settings(&server)).unwrap();
        let token = auth.authenticate().await.unwrap();
        assert_eq!(token.value, "G");
    }

    #[tokio::test]
    async fn test_each_login_gets_its_own_jar() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/login.php"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/config/login_api.php"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"code":"200","details":{"data":{"guid":"G","guidExpired":"2030-01-01 00:00:00"}}}"#,
            ))
            .mount(&server)
            .await;

        let auth = LetaoAuthenticator::new(&make_settings(&server)).unwrap();
        let first = auth.authenticate().await.unwrap();
        let second = auth.authenticate().await.unwrap();

        assert_eq!(first.value, second.value);
        assert_ne!(first, second);
    }

    #[test]
    fn test_guid_cookie_format() {
        let expires = Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            guid_cookie("G-1", expires),
            "guid=G-1; Path=/; Expires=Wed, 02 Jan 2030 03:04:05 GMT"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let settings = LetaoSettings { base_url: "not a url".to_string(), ..Default::default() };
        assert!(matches!(LetaoAuthenticator::new(&settings), Err(AuthError::Transport(_))));
    }
}
