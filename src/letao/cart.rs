//! Letao cart client with session-aware retries.

use crate::config::LetaoSettings;
use crate::error::CartError;
use crate::letao::models::{
    AddToCartRequest, BatchCartOutcome, CartEnvelope, CartItemResult, CartOutcome,
    RawCartResponse,
};
use crate::letao::probes::{SessionProbeChain, SessionState};
use crate::letao::session::{SessionCache, SessionToken};
use crate::letao::{session_client, AJAX_ACCEPT};
use async_trait::async_trait;
use regex_lite::Regex;
use reqwest::cookie::Jar;
use reqwest::header::{ACCEPT, ORIGIN, REFERER};
use reqwest::{Client, Url};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Letao's marker for cart-level rejections (full cart, duplicate item).
const CART_KEYWORD: &str = "購物車";

/// Status reported for cart-level rejections.
const CART_REJECTED_STATUS: i64 = 422;

static UNICODE_ESCAPES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\\u[0-9a-fA-F]{4})+").unwrap());

/// Raw cart endpoint - enables mocking for tests.
#[async_trait]
pub trait CartApi: Send + Sync {
    async fn add(
        &self,
        token: &SessionToken,
        item: &AddToCartRequest,
    ) -> Result<RawCartResponse, CartError>;
}

/// HTTP implementation of the cart endpoint.
///
/// Requests go through the token's cookie jar; the client is rebuilt whenever a new
/// session (and so a new jar) shows up.
pub struct LetaoCartApi {
    base_url: String,
    client: Mutex<Option<(Arc<Jar>, Client)>>,
}

impl LetaoCartApi {
    pub fn new(settings: &LetaoSettings) -> Result<Self, CartError> {
        let base_url = settings.base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url)
            .map_err(|e| CartError::Invalid(format!("base url {}: {}", base_url, e)))?;

        Ok(Self { base_url, client: Mutex::new(None) })
    }

    fn client_for(&self, token: &SessionToken) -> Result<Client, CartError> {
        let jar = token.jar();
        let mut slot = self.client.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some((current, client)) = slot.as_ref() {
            if Arc::ptr_eq(current, &jar) {
                return Ok(client.clone());
            }
        }

        debug!("New session, rebuilding cart client");
        let client = session_client(jar.clone()).map_err(|e| CartError::Transport(e.to_string()))?;
        *slot = Some((jar, client.clone()));
        Ok(client)
    }
}

#[async_trait]
impl CartApi for LetaoCartApi {
    async fn add(
        &self,
        token: &SessionToken,
        item: &AddToCartRequest,
    ) -> Result<RawCartResponse, CartError> {
        let url = format!("{}/jpshopping/cart.php", self.base_url);
        debug!("POST {} ({})", url, item.title);

        let response = self
            .client_for(token)?
            .post(&url)
            .header(ACCEPT, AJAX_ACCEPT)
            .header("X-Requested-With", "XMLHttpRequest")
            .header(ORIGIN, &self.base_url)
            .header(REFERER, format!("{}/jpshopping/ext_shop_left.php", self.base_url))
            .form(&item.to_form())
            .send()
            .await
            .map_err(|e| CartError::Transport(e.to_string()))?;

        let http_status = response.status().as_u16();
        let body = response.text().await.map_err(|e| CartError::Transport(e.to_string()))?;
        let body = decode_unicode_escapes(&body);
        debug!("Cart response ({}): {}", http_status, body);

        Ok(RawCartResponse { http_status, body })
    }
}

/// Adds items to the Letao cart, re-authenticating when the session has lapsed.
pub struct CartClient {
    api: Arc<dyn CartApi>,
    sessions: Arc<SessionCache>,
    probes: SessionProbeChain,
    max_attempts: u32,
    retry_delay: Duration,
}

impl CartClient {
    pub fn new(
        api: Arc<dyn CartApi>,
        sessions: Arc<SessionCache>,
        settings: &LetaoSettings,
    ) -> Self {
        Self {
            api,
            sessions,
            probes: SessionProbeChain::standard(),
            max_attempts: settings.max_retries.max(1),
            retry_delay: Duration::from_millis(settings.retry_delay_ms),
        }
    }

    /// Replaces the expiry heuristics.
    pub fn with_probes(mut self, probes: SessionProbeChain) -> Self {
        self.probes = probes;
        self
    }

    /// Adds one item.
    ///
    /// An expired session clears the cache and is retried. When the attempts run out on
    /// an expired session the outcome is unsuccessful; when they run out on a transport
    /// or login failure the error is returned.
    pub async fn add_to_cart(&self, item: &AddToCartRequest) -> Result<CartOutcome, CartError> {
        item.validate()?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let last = attempt >= self.max_attempts;
            info!("Adding '{}' to cart (attempt {}/{})", item.title, attempt, self.max_attempts);

            match self.try_add(item).await {
                Ok(raw) => {
                    if self.probes.evaluate(&raw) != SessionState::Expired {
                        let outcome = interpret(raw);
                        if outcome.success {
                            info!("Added '{}' to cart", item.title);
                        } else {
                            warn!("Cart rejected '{}': {}", item.title, outcome.message);
                        }
                        return Ok(outcome);
                    }

                    warn!("Session expired on attempt {}/{}", attempt, self.max_attempts);
                    self.sessions.clear();
                    if last {
                        let mut outcome = interpret(raw);
                        outcome.success = false;
                        outcome.message = format!(
                            "session expired after {} attempt(s): {}",
                            attempt, outcome.message
                        );
                        return Ok(outcome);
                    }
                }
                Err(e) => {
                    warn!("Attempt {}/{} failed: {}", attempt, self.max_attempts, e);
                    self.sessions.clear();
                    if last {
                        return Err(e);
                    }
                }
            }

            if !self.retry_delay.is_zero() {
                tokio::time::sleep(self.retry_delay).await;
            }
        }
    }

    /// Adds items one after another. Failures are reported per item.
    pub async fn add_batch(&self, items: &[AddToCartRequest]) -> BatchCartOutcome {
        let mut batch = BatchCartOutcome::default();

        for (i, item) in items.iter().enumerate() {
            info!("[{}/{}] {}", i + 1, items.len(), item.title);

            let result = match self.add_to_cart(item).await {
                Ok(outcome) => CartItemResult {
                    title: item.title.clone(),
                    url: item.url.clone(),
                    success: outcome.success,
                    message: outcome.message,
                    status_code: outcome.status_code,
                },
                Err(e) => CartItemResult {
                    title: item.title.clone(),
                    url: item.url.clone(),
                    success: false,
                    message: e.to_string(),
                    status_code: error_status(&e),
                },
            };
            batch.push(result);
        }

        info!("Batch finished: {}/{} added", batch.succeeded, batch.total);
        batch
    }

    /// Forces the next request to log in again.
    pub fn clear_session(&self) {
        self.sessions.clear();
    }

    async fn try_add(&self, item: &AddToCartRequest) -> Result<RawCartResponse, CartError> {
        let token = self.sessions.get_valid_token().await?;
        self.api.add(&token, item).await
    }
}

/// Reads the outcome out of a response whose session is not known to be expired.
fn interpret(raw: RawCartResponse) -> CartOutcome {
    match CartEnvelope::parse(&raw.body) {
        Some(envelope) => {
            let code = envelope.code().unwrap_or(i64::from(raw.http_status));
            let success = code == 200;
            if let Some(count) = &envelope.cart_num {
                debug!("Cart now holds {} item(s)", count);
            }
            let status_code = if !success && envelope.message.contains(CART_KEYWORD) {
                CART_REJECTED_STATUS
            } else {
                code
            };
            CartOutcome { success, message: envelope.message, status_code, raw_response: raw.body }
        }
        None => {
            let success = (200..300).contains(&raw.http_status);
            let message = if success {
                "added to cart".to_string()
            } else {
                format!("cart request failed with HTTP {}", raw.http_status)
            };
            CartOutcome {
                success,
                message,
                status_code: i64::from(raw.http_status),
                raw_response: raw.body,
            }
        }
    }
}

fn error_status(error: &CartError) -> i64 {
    match error {
        CartError::Invalid(_) => 400,
        CartError::Auth(_) => 401,
        CartError::Transport(_) => 500,
    }
}

/// Decodes `\uXXXX` escapes, surrogate pairs included.
///
/// Escapes that would break a JSON string (quotes, backslashes, control characters)
/// are left as they are.
pub fn decode_unicode_escapes(body: &str) -> String {
    UNICODE_ESCAPES
        .replace_all(body, |caps: &regex_lite::Captures| {
            let run = &caps[0];
            let units: Vec<u16> = run
                .split("\\u")
                .filter(|s| !s.is_empty())
                .filter_map(|hex| u16::from_str_radix(hex, 16).ok())
                .collect();

            let decoded: String = char::decode_utf16(units.iter().copied())
                .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect();

            if decoded.chars().any(|c| c == '"' || c == '\\' || c.is_control()) {
                run.to_string()
            } else {
                decoded
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthError;
    use crate::letao::auth::Authenticator;
    use chrono::Utc;
    use crate::letao::probes::StatusProbe;
    use std::sync::atomic::{AtomicU32, Ordering};
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    /// Mock authenticator handing out numbered sessions.
    struct MockAuthenticator {
        calls: Arc<AtomicU32>,
        fail: bool,
    }

    #[async_trait]
    impl Authenticator for MockAuthenticator {
        async fn authenticate(&self) -> Result<SessionToken, AuthError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail {
                return Err(AuthError::MissingSession);
            }
            let expires_at = Utc::now() + chrono::Duration::days(1);
            Ok(SessionToken::new(format!("guid-{}", n), expires_at, Arc::default()))
        }
    }

    /// Mock cart endpoint replaying scripted responses.
    struct ScriptedCartApi {
        responses: Mutex<Vec<Result<RawCartResponse, CartError>>>,
        calls: Arc<AtomicU32>,
        seen_tokens: Mutex<Vec<String>>,
    }

    impl ScriptedCartApi {
        fn new(mut responses: Vec<Result<RawCartResponse, CartError>>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                calls: Arc::new(AtomicU32::new(0)),
                seen_tokens: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CartApi for ScriptedCartApi {
        async fn add(
            &self,
            token: &SessionToken,
            _item: &AddToCartRequest,
        ) -> Result<RawCartResponse, CartError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_tokens.lock().unwrap().push(token.value.clone());
            self.responses.lock().unwrap().pop().unwrap_or_else(|| Ok(ok_response()))
        }
    }

    fn ok_response() -> RawCartResponse {
        RawCartResponse {
            http_status: 200,
            body: r#"{"code":200,"message":"加入成功","cartNum":"1"}"#.to_string(),
        }
    }

    fn expired_response() -> RawCartResponse {
        RawCartResponse {
            http_status: 200,
            body: r#"{"code":401,"message":"請先登入"}"#.to_string(),
        }
    }

    fn make_item(title: &str) -> AddToCartRequest {
        AddToCartRequest {
            url: format!("https://www.suruga-ya.jp/product/detail/{}", title),
            product_id: "128000123".to_string(),
            title: title.to_string(),
            unit_price: "1,980".to_string(),
            ..Default::default()
        }
    }

    fn make_settings(max_retries: u32) -> LetaoSettings {
        LetaoSettings { max_retries, retry_delay_ms: 0, ..Default::default() }
    }

    struct Harness {
        client: CartClient,
        sessions: Arc<SessionCache>,
        auth_calls: Arc<AtomicU32>,
        api_calls: Arc<AtomicU32>,
        api: Arc<ScriptedCartApi>,
    }

    fn harness(responses: Vec<Result<RawCartResponse, CartError>>, max_retries: u32) -> Harness {
        let auth_calls = Arc::new(AtomicU32::new(0));
        let auth = MockAuthenticator { calls: auth_calls.clone(), fail: false };
        let sessions = Arc::new(SessionCache::new(Arc::new(auth), Duration::from_secs(3600)));
        let api = Arc::new(ScriptedCartApi::new(responses));
        let api_calls = api.calls.clone();
        let client = CartClient::new(api.clone(), sessions.clone(), &make_settings(max_retries));
        Harness { client, sessions, auth_calls, api_calls, api }
    }

    #[tokio::test]
    async fn test_add_success_first_attempt() {
        let h = harness(vec![Ok(ok_response())], 2);

        let outcome = h.client.add_to_cart(&make_item("a")).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.status_code, 200);
        assert_eq!(outcome.message, "加入成功");
        assert_eq!(h.api_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.auth_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_session_retries_with_fresh_login() {
        let h = harness(vec![Ok(expired_response()), Ok(ok_response())], 2);

        let outcome = h.client.add_to_cart(&make_item("a")).await.unwrap();
        assert!(outcome.success);
        assert_eq!(h.api_calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.auth_calls.load(Ordering::SeqCst), 2);
        assert_eq!(*h.api.seen_tokens.lock().unwrap(), vec!["guid-1", "guid-2"]);
    }

    #[tokio::test]
    async fn test_expired_session_exhausts_retries() {
        let h = harness(vec![Ok(expired_response()), Ok(expired_response())], 2);

        let outcome = h.client.add_to_cart(&make_item("a")).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.status_code, 401);
        assert!(outcome.message.contains("session expired"));
        assert!(outcome.raw_response.contains("請先登入"));
        assert_eq!(h.api_calls.load(Ordering::SeqCst), 2);
        assert!(!h.sessions.is_cached());
    }

    #[tokio::test]
    async fn test_single_attempt_when_retries_zero() {
        let h = harness(vec![Ok(expired_response()), Ok(ok_response())], 1);

        let outcome = h.client.add_to_cart(&make_item("a")).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(h.api_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cart_rejection_maps_to_422_without_retry() {
        let rejected = RawCartResponse {
            http_status: 200,
            body: r#"{"code":0,"message":"購物車商品已達上限"}"#.to_string(),
        };
        let h = harness(vec![Ok(rejected)], 2);

        let outcome = h.client.add_to_cart(&make_item("a")).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.status_code, 422);
        assert_eq!(h.api_calls.load(Ordering::SeqCst), 1);
        assert!(h.sessions.is_cached());
    }

    #[tokio::test]
    async fn test_transport_error_retried_then_returned() {
        let h = harness(
            vec![
                Err(CartError::Transport("reset".to_string())),
                Err(CartError::Transport("reset again".to_string())),
            ],
            2,
        );

        let err = h.client.add_to_cart(&make_item("a")).await.unwrap_err();
        assert!(matches!(err, CartError::Transport(ref m) if m == "reset again"));
        assert_eq!(h.api_calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.auth_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_transport_error_recovers() {
        let h = harness(vec![Err(CartError::Transport("reset".to_string())), Ok(ok_response())], 3);

        let outcome = h.client.add_to_cart(&make_item("a")).await.unwrap();
        assert!(outcome.success);
        assert_eq!(h.api_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_login_failure_surfaces_as_auth_error() {
        let auth = MockAuthenticator { calls: Arc::new(AtomicU32::new(0)), fail: true };
        let sessions = Arc::new(SessionCache::new(Arc::new(auth), Duration::from_secs(3600)));
        let api = Arc::new(ScriptedCartApi::new(vec![]));
        let client = CartClient::new(api.clone(), sessions, &make_settings(2));

        let err = client.add_to_cart(&make_item("a")).await.unwrap_err();
        assert!(matches!(err, CartError::Auth(AuthError::MissingSession)));
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_item_not_sent() {
        let h = harness(vec![], 2);
        let item = AddToCartRequest { title: "no url".to_string(), ..Default::default() };

        let err = h.client.add_to_cart(&item).await.unwrap_err();
        assert!(matches!(err, CartError::Invalid(_)));
        assert_eq!(h.api_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.auth_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_add_batch_reports_each_item() {
        let rejected = RawCartResponse {
            http_status: 200,
            body: r#"{"code":0,"message":"購物車已有此商品"}"#.to_string(),
        };
        let h = harness(vec![Ok(ok_response()), Ok(rejected), Ok(ok_response())], 2);
        let invalid = AddToCartRequest::default();
        let items = vec![make_item("a"), make_item("b"), invalid, make_item("c")];

        let batch = h.client.add_batch(&items).await;
        assert_eq!(batch.total, 4);
        assert_eq!(batch.succeeded, 2);
        assert_eq!(batch.failed, 2);
        assert!(!batch.all_success());
        assert_eq!(batch.results[1].status_code, 422);
        assert_eq!(batch.results[2].status_code, 400);
        assert_eq!(batch.results[3].title, "c");
    }

    #[tokio::test]
    async fn test_clear_session_forces_login() {
        let h = harness(vec![], 2);
        h.client.add_to_cart(&make_item("a")).await.unwrap();
        h.client.clear_session();
        h.client.add_to_cart(&make_item("b")).await.unwrap();
        assert_eq!(h.auth_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_interpret_non_json_falls_back_to_http_status() {
        let ok = interpret(RawCartResponse { http_status: 200, body: "OK".to_string() });
        assert!(ok.success);
        assert_eq!(ok.status_code, 200);

        let bad = interpret(RawCartResponse { http_status: 502, body: "Bad Gateway".to_string() });
        assert!(!bad.success);
        assert_eq!(bad.status_code, 502);
    }

    #[test]
    fn test_interpret_keeps_cart_message_on_success() {
        let outcome = interpret(RawCartResponse {
            http_status: 200,
            body: r#"{"code":200,"message":"已加入購物車"}"#.to_string(),
        });
        assert!(outcome.success);
        assert_eq!(outcome.status_code, 200);
    }

    #[test]
    fn test_decode_unicode_escapes() {
        assert_eq!(
            decode_unicode_escapes(r#"{"message":"\u8acb\u5148\u767b\u5165"}"#),
            r#"{"message":"請先登入"}"#
        );
        // surrogate pair
        assert_eq!(decode_unicode_escapes(r"\ud83d\ude00"), "😀");
        // escaped quote stays escaped
        assert_eq!(decode_unicode_escapes(r"\u0022"), r"\u0022");
        assert_eq!(decode_unicode_escapes("plain"), "plain");
    }

    #[tokio::test]
    async fn test_custom_expiry_checks_replace_defaults() {
        let auth_calls = Arc::new(AtomicU32::new(0));
        let auth = MockAuthenticator { calls: auth_calls.clone(), fail: false };
        let sessions = Arc::new(SessionCache::new(Arc::new(auth), Duration::from_secs(3600)));
        let api = Arc::new(ScriptedCartApi::new(vec![Ok(expired_response())]));
        let client = CartClient::new(api.clone(), sessions.clone(), &make_settings(3))
            .with_probes(SessionProbeChain::new().with_probe(StatusProbe));

        // Only HTTP 401 counts as expiry now, so the envelope is read as a plain failure
        let outcome = client.add_to_cart(&make_item("a")).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.status_code, 401);
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
        assert_eq!(auth_calls.load(Ordering::SeqCst), 1);
        assert!(sessions.is_cached());
    }

    fn session_for(server: &MockServer, cookies: &[&str]) -> (SessionToken, Url) {
        let url = Url::parse(&format!("{}/jpshopping/cart.php", server.uri())).unwrap();
        let jar = Arc::new(Jar::default());
        for cookie in cookies {
            jar.add_cookie_str(cookie, &url);
        }
        (SessionToken::new("G", Utc::now(), jar), url)
    }

    #[tokio::test]
    async fn test_http_cart_api_sends_form_and_cookies() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/jpshopping/cart.php"))
            .and(|req: &Request| {
                req.headers.get("cookie").and_then(|v| v.to_str().ok()).is_some_and(|c| {
                    c.contains("PHPSESSID=s1") && c.contains("guid=G")
                })
            })
            .and(header("X-Requested-With", "XMLHttpRequest"))
            .and(body_string_contains("save=add"))
            .and(body_string_contains("unit_price=1980"))
            .and(body_string_contains("quantity=1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"code":200,"message":"\u52a0\u5165\u6210\u529f"}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let settings = LetaoSettings { base_url: server.uri(), ..Default::default() };
        let api = LetaoCartApi::new(&settings).unwrap();
        let (token, _) = session_for(&server, &["PHPSESSID=s1; Path=/", "guid=G; Path=/"]);

        let raw = api.add(&token, &make_item("a")).await.unwrap();
        assert_eq!(raw.http_status, 200);
        assert_eq!(raw.body, r#"{"code":200,"message":"加入成功"}"#);
    }

    #[tokio::test]
    async fn test_http_cart_api_keeps_rotated_cookies() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/jpshopping/cart.php"))
            .and(header("cookie", "PHPSESSID=s1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Set-Cookie", "PHPSESSID=s2; Path=/")
                    .set_body_string(r#"{"code":200,"message":"ok"}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/jpshopping/cart.php"))
            .and(header("cookie", "PHPSESSID=s2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"code":200,"message":"ok"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let settings = LetaoSettings { base_url: server.uri(), ..Default::default() };
        let api = LetaoCartApi::new(&settings).unwrap();
        let (token, url) = session_for(&server, &["PHPSESSID=s1; Path=/"]);

        api.add(&token, &make_item("a")).await.unwrap();
        assert_eq!(token.cookie_header(&url).as_deref(), Some("PHPSESSID=s2"));

        api.add(&token, &make_item("b")).await.unwrap();
    }
}
