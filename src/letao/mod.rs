//! Letao proxy-shopping client: login, session cache and cart.

pub mod auth;
pub mod cart;
pub mod models;
pub mod probes;
pub mod session;

pub use auth::{Authenticator, LetaoAuthenticator};
pub use cart::{CartApi, CartClient, LetaoCartApi};
pub use models::{AddToCartRequest, BatchCartOutcome, CartItemResult, CartOutcome, RawCartResponse};
pub use probes::{SessionProbe, SessionProbeChain, SessionState};
pub use session::{SessionCache, SessionToken};

use reqwest::cookie::Jar;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// Browser identity sent to Letao.
pub(crate) const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Accept header of Letao's own XHR calls.
pub(crate) const AJAX_ACCEPT: &str = "application/json, text/javascript, */*; q=0.01";

/// Builds a client whose requests read and update the session's cookie jar.
pub(crate) fn session_client(jar: Arc<Jar>) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .cookie_provider(jar)
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .build()
}
