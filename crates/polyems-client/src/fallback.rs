//! Primary-then-backup request controller

use std::sync::Arc;

use polyems_core::protocol::ChatRequest;
use tracing::{info, warn};

use crate::transport::ChatTransport;

/// Shown to the user when both routes fail
pub const DOUBLE_FAILURE_MESSAGE: &str =
    "An error occurred, Both Primary & Backup Models failed, Please try again later...";

/// Result of one user turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Primary(String),
    Backup(String),
    Failed,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed)
    }

    /// Text to put in front of the user
    pub fn text(&self) -> &str {
        match self {
            Self::Primary(text) | Self::Backup(text) => text,
            Self::Failed => DOUBLE_FAILURE_MESSAGE,
        }
    }
}

/// Sends to the primary route and, on any failure, once to the backup route
/// with the same payload. Never more than two attempts.
pub struct FallbackController {
    transport: Arc<dyn ChatTransport>,
    primary_route: String,
    backup_route: String,
}

impl FallbackController {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        primary_route: impl Into<String>,
        backup_route: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            primary_route: primary_route.into(),
            backup_route: backup_route.into(),
        }
    }

    pub async fn send(&self, payload: &ChatRequest) -> Outcome {
        match self.transport.post_chat(&self.primary_route, payload).await {
            Ok(text) => return Outcome::Primary(text),
            Err(e) => warn!(
                "Primary route {} failed: {}, retrying on {}",
                self.primary_route, e, self.backup_route
            ),
        }

        match self.transport.post_chat(&self.backup_route, payload).await {
            Ok(text) => {
                info!("Backup route {} answered", self.backup_route);
                Outcome::Backup(text)
            }
            Err(e) => {
                warn!("Backup route {} failed: {}", self.backup_route, e);
                Outcome::Failed
            }
        }
    }
}
