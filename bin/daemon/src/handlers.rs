//! Built-in action handlers for the daemon.
//!
//! The daemon ships logging handlers only: each action invocation is logged
//! with its rendered parameters and acknowledged with a receipt. Deployments
//! that talk to real gateways register their own [`ActionHandler`]s instead.

use async_trait::async_trait;
use chrono::Utc;
use copper_relay_engine::{
    ActionHandler, ActionKind, ActionParams, HandlerError, HandlerRegistry,
};
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;
use tracing::info;

/// Logs each invocation and succeeds with a receipt.
pub struct LoggingHandler {
    kind: ActionKind,
}

impl LoggingHandler {
    /// Creates a logging handler for one action kind.
    #[must_use]
    pub fn new(kind: ActionKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl ActionHandler for LoggingHandler {
    async fn invoke(&self, params: &ActionParams) -> Result<JsonValue, HandlerError> {
        info!(
            action = %self.kind,
            params = %serde_json::to_string(params).unwrap_or_default(),
            "action invoked"
        );
        Ok(json!({
            "action": self.kind.as_str(),
            "logged_at": Utc::now().to_rfc3339(),
        }))
    }
}

/// Builds a registry with a [`LoggingHandler`] for every action kind.
#[must_use]
pub fn logging_registry() -> HandlerRegistry {
    ActionKind::ALL.into_iter().fold(
        HandlerRegistry::new(),
        |registry, kind| registry.register(kind, Arc::new(LoggingHandler::new(kind))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_covers_every_kind() {
        let registry = logging_registry();
        for kind in ActionKind::ALL {
            assert!(registry.get(kind).is_some(), "missing handler for {kind}");
        }
    }

    #[tokio::test]
    async fn logging_handler_returns_a_receipt() {
        let handler = LoggingHandler::new(ActionKind::SendSms);
        let params = ActionParams::from([("to".to_string(), "+15551230000".to_string())]);

        let receipt = handler.invoke(&params).await.unwrap();
        assert_eq!(receipt["action"], "send_sms");
        assert!(receipt["logged_at"].is_string());
    }
}
