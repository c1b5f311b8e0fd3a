//! Session-expiry detection for cart responses.
//!
//! Letao never says "your session expired" in a consistent way. Depending on the
//! endpoint and the failure it answers 401, a JSON envelope with an error code, a
//! message asking the user to log in, or the login page itself. Each of those
//! shapes gets its own probe; the chain stops at the first probe that calls it.

use crate::letao::models::{CartEnvelope, RawCartResponse};
use tracing::debug;

/// What a probe concluded about the session behind a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Valid,
    Expired,
    /// The probe has no opinion
    Unknown,
}

/// A single expiry heuristic.
pub trait SessionProbe: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    fn inspect(&self, response: &RawCartResponse) -> SessionState;
}

/// HTTP 401.
pub struct StatusProbe;

impl SessionProbe for StatusProbe {
    fn name(&self) -> &'static str {
        "status"
    }

    fn inspect(&self, response: &RawCartResponse) -> SessionState {
        match response.http_status {
            401 => SessionState::Expired,
            200..=299 => SessionState::Valid,
            _ => SessionState::Unknown,
        }
    }
}

/// Phrases asking the user to log in.
pub struct KeywordProbe {
    phrases: Vec<String>,
}

impl KeywordProbe {
    pub const DEFAULT_PHRASES: [&'static str; 8] = [
        "請先登入",
        "請登入",
        "尚未登入",
        "未登入",
        "登入逾時",
        "please log in",
        "not logged in",
        "login required",
    ];

    pub fn new(phrases: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { phrases: phrases.into_iter().map(|p| p.into().to_lowercase()).collect() }
    }
}

impl Default for KeywordProbe {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PHRASES)
    }
}

impl SessionProbe for KeywordProbe {
    fn name(&self) -> &'static str {
        "keyword"
    }

    fn inspect(&self, response: &RawCartResponse) -> SessionState {
        let body = response.body.to_lowercase();
        if self.phrases.iter().any(|p| body.contains(p.as_str())) {
            SessionState::Expired
        } else {
            SessionState::Unknown
        }
    }
}

/// JSON envelope whose code is neither 200 nor 0.
pub struct EnvelopeProbe;

impl SessionProbe for EnvelopeProbe {
    fn name(&self) -> &'static str {
        "envelope"
    }

    fn inspect(&self, response: &RawCartResponse) -> SessionState {
        match CartEnvelope::parse(&response.body).map(|e| e.code()) {
            Some(Some(200 | 0)) => SessionState::Valid,
            Some(_) => SessionState::Expired,
            None => SessionState::Unknown,
        }
    }
}

/// An HTML login form served where JSON was expected.
pub struct LoginPageProbe;

impl LoginPageProbe {
    const MARKERS: [&'static str; 4] =
        ["login.php", "login_api.php", "loginbyemail", "type=\"password\""];
}

impl SessionProbe for LoginPageProbe {
    fn name(&self) -> &'static str {
        "login-page"
    }

    fn inspect(&self, response: &RawCartResponse) -> SessionState {
        let body = response.body.trim_start();
        if !body.starts_with('<') {
            return SessionState::Unknown;
        }

        let lower = body.to_lowercase();
        if Self::MARKERS.iter().any(|m| lower.contains(m)) {
            SessionState::Expired
        } else {
            SessionState::Unknown
        }
    }
}

/// Ordered probes; the first `Expired` wins.
pub struct SessionProbeChain {
    probes: Vec<Box<dyn SessionProbe>>,
}

impl SessionProbeChain {
    /// Creates an empty chain that never reports expiry.
    pub fn new() -> Self {
        Self { probes: Vec::new() }
    }

    pub fn with_probe(mut self, probe: impl SessionProbe + 'static) -> Self {
        self.probes.push(Box::new(probe));
        self
    }

    /// Status, keyword, envelope, then login page.
    pub fn standard() -> Self {
        Self::new()
            .with_probe(StatusProbe)
            .with_probe(KeywordProbe::default())
            .with_probe(EnvelopeProbe)
            .with_probe(LoginPageProbe)
    }

    /// Returns `Expired` if any probe says so, `Valid` if at least one vouched for
    /// the session, otherwise `Unknown`.
    pub fn evaluate(&self, response: &RawCartResponse) -> SessionState {
        let mut verdict = SessionState::Unknown;
        for probe in &self.probes {
            match probe.inspect(response) {
                SessionState::Expired => {
                    debug!("Probe '{}' reports an expired session", probe.name());
                    return SessionState::Expired;
                }
                SessionState::Valid => verdict = SessionState::Valid,
                SessionState::Unknown => {}
            }
        }
        verdict
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }
}

impl Default for SessionProbeChain {
    fn default() -> Self {
        Self::standard()
    }
}
