use crate::core::error::{BookError, BookResult};
use crate::core::io::KeyValueStore;
use crate::services::image::ProviderKeys;
use log::info;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialKind {
    OpenAI,
    Replicate,
    Fal,
}

impl CredentialKind {
    pub fn storage_key(self) -> &'static str {
        match self {
            CredentialKind::OpenAI => "openai_api_key",
            CredentialKind::Replicate => "replicate_api_key",
            CredentialKind::Fal => "fal_api_key",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CredentialKind::OpenAI => "OpenAI API key",
            CredentialKind::Replicate => "Replicate API token",
            CredentialKind::Fal => "fal.ai API key",
        }
    }

    pub fn placeholder(self) -> &'static str {
        match self {
            CredentialKind::OpenAI => "sk-...",
            CredentialKind::Replicate => "r8_...",
            CredentialKind::Fal => "key-id:key-secret",
        }
    }

    /// Format check only; never touches the network.
    pub fn validate(self, value: &str) -> BookResult<()> {
        let value = value.trim();
        let ok = match self {
            CredentialKind::OpenAI => value.starts_with("sk-"),
            CredentialKind::Replicate => value.starts_with("r8_"),
            CredentialKind::Fal => value.contains(':'),
        };
        if ok {
            return Ok(());
        }
        let hint = match self {
            CredentialKind::OpenAI => "Invalid API key format. It should start with \"sk-\"",
            CredentialKind::Replicate => "Invalid Replicate token format. It should start with \"r8_\"",
            CredentialKind::Fal => "Invalid fal.ai key format. It should look like \"key-id:key-secret\"",
        };
        Err(BookError::Credential(hint.to_string()))
    }
}

/// Credentials needed by each image provider. The outline always needs OpenAI.
pub fn required_for(provider: &str) -> Vec<CredentialKind> {
    match provider {
        "replicate" => vec![CredentialKind::OpenAI, CredentialKind::Replicate],
        "fal" => vec![CredentialKind::OpenAI, CredentialKind::Fal],
        _ => vec![CredentialKind::OpenAI],
    }
}

pub struct CredentialGate {
    store: Arc<dyn KeyValueStore>,
}

impl CredentialGate {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Loads persisted entries. Call once on startup.
    pub async fn init(&self) -> BookResult<()> {
        self.store.init().await
    }

    pub async fn get(&self, kind: CredentialKind) -> BookResult<Option<String>> {
        self.store.get(kind.storage_key()).await
    }

    pub async fn save(&self, kind: CredentialKind, value: &str) -> BookResult<()> {
        kind.validate(value)?;
        self.store.set(kind.storage_key(), value.trim()).await?;
        info!("Saved {}", kind.label());
        Ok(())
    }

    pub async fn clear(&self, kind: CredentialKind) -> BookResult<()> {
        self.store.clear(kind.storage_key()).await
    }

    /// Every stored key that still passes validation.
    pub async fn provider_keys(&self) -> BookResult<ProviderKeys> {
        let valid = |kind: CredentialKind, v: Option<String>| v.filter(|v| kind.validate(v).is_ok());
        Ok(ProviderKeys {
            openai: valid(CredentialKind::OpenAI, self.get(CredentialKind::OpenAI).await?),
            replicate: valid(CredentialKind::Replicate, self.get(CredentialKind::Replicate).await?),
            fal: valid(CredentialKind::Fal, self.get(CredentialKind::Fal).await?),
        })
    }

    /// Kinds from `required` that are missing or no longer pass validation.
    pub async fn missing(&self, required: &[CredentialKind]) -> BookResult<Vec<CredentialKind>> {
        let mut missing = Vec::new();
        for kind in required {
            match self.get(*kind).await? {
                Some(v) if kind.validate(&v).is_ok() => {}
                _ => missing.push(*kind),
            }
        }
        Ok(missing)
    }
}
