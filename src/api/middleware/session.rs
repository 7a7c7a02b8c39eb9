use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tower_sessions::{Expiry, MemoryStore, Session, SessionManagerLayer};

use crate::config::Config;
use crate::services::card_export::CardExporter;
use crate::services::portal_api::PortalApi;

/// Session keys used in the application
pub const SESSION_KEY_STUDENT: &str = "student";
pub const SESSION_KEY_CSRF_TOKEN: &str = "csrf_token";
pub const SESSION_KEY_PKCE_VERIFIER: &str = "pkce_verifier";
pub const SESSION_KEY_ADMIN_TOKEN: &str = "admin_token";
pub const SESSION_KEY_FLASH: &str = "flash";
pub const SESSION_KEY_LAST_SUBMISSION: &str = "last_submission";

/// Creates an in-memory session layer for Axum
pub fn create_session_layer(secure: bool) -> SessionManagerLayer<MemoryStore> {
    SessionManagerLayer::new(MemoryStore::default())
        .with_secure(secure)
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::hours(24)))
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub api: PortalApi,
    pub exporter: Arc<CardExporter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashKind {
    Success,
    Error,
}

/// One-shot notice shown on the next rendered page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub kind: FlashKind,
    pub message: String,
}

impl Flash {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Error,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == FlashKind::Error
    }

    pub fn css_class(&self) -> &'static str {
        match self.kind {
            FlashKind::Success => "flash-success",
            FlashKind::Error => "flash-error",
        }
    }

    /// Stores the notice for the next page. Failures are logged only.
    pub async fn push(self, session: &Session) {
        if let Err(e) = session.insert(SESSION_KEY_FLASH, self).await {
            tracing::warn!(error = %e, "Failed to store flash message");
        }
    }

    /// Takes the pending notice, if any
    pub async fn take(session: &Session) -> Option<Flash> {
        session
            .remove::<Flash>(SESSION_KEY_FLASH)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to read flash message");
                None
            })
    }
}
