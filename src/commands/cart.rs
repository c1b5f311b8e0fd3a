//! Letao cart commands.

use crate::config::Config;
use crate::format::Formatter;
use crate::letao::{
    AddToCartRequest, CartClient, LetaoAuthenticator, LetaoCartApi, SessionCache,
};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// What to put in the cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartAction {
    Add(AddToCartRequest),
    Batch(Vec<AddToCartRequest>),
}

/// Batch files hold either a bare array or `{"items": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum BatchFile {
    Items(Vec<AddToCartRequest>),
    Wrapped { items: Vec<AddToCartRequest> },
}

/// Executes cart actions against Letao.
pub struct CartCommand {
    config: Config,
}

impl CartCommand {
    /// Creates a new cart command.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Reads a batch of cart items from a JSON file.
    pub async fn load_batch(path: impl AsRef<Path>) -> Result<Vec<AddToCartRequest>> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read batch file: {}", path.display()))?;

        let batch: BatchFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse batch file: {}", path.display()))?;

        Ok(match batch {
            BatchFile::Items(items) | BatchFile::Wrapped { items } => items,
        })
    }

    /// Logs in as the configured account and executes the action.
    pub async fn execute(&self, action: &CartAction) -> Result<String> {
        let settings = &self.config.letao;
        if !settings.has_credentials() {
            bail!("Letao credentials missing: set LETAO_EMAIL and LETAO_PASSWORD or [letao] in config");
        }

        let authenticator =
            LetaoAuthenticator::new(settings).context("Failed to create login client")?;
        let sessions = Arc::new(SessionCache::new(Arc::new(authenticator), settings.cache_ttl()));
        let api = LetaoCartApi::new(settings).context("Failed to create cart client")?;
        let client = CartClient::new(Arc::new(api), sessions, settings);

        self.execute_with_client(&client, action).await
    }

    /// Executes the action with a provided client (for testing).
    pub async fn execute_with_client(
        &self,
        client: &CartClient,
        action: &CartAction,
    ) -> Result<String> {
        let formatter = Formatter::new(self.config.format);

        match action {
            CartAction::Add(item) => {
                let outcome = client
                    .add_to_cart(item)
                    .await
                    .with_context(|| format!("Failed to add '{}' to cart", item.title))?;
                Ok(formatter.format_cart_outcome(&outcome))
            }
            CartAction::Batch(items) => {
                info!("Adding {} items to cart", items.len());
                let batch = client.add_batch(items).await;
                Ok(formatter.format_batch(&batch))
            }
        }
    }
}
