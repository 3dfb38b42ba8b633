//! Subscription billing: hosted checkout plus signed provider webhooks.

pub mod client;
pub mod events;
pub mod ledger;
pub mod signature;

pub use client::{CheckoutSession, PaymentsClient};
pub use events::{EventOutcome, PaymentEventHandler, WebhookEvent};
pub use ledger::WebhookLedger;
pub use signature::{sign, verify_signature};

use crate::config::PaymentsConfig;
use crate::error::{DropError, Result};
use crate::metrics::PaymentMetrics;
use crate::storage::Storage;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookReceipt {
    Processed(EventOutcome),
    /// The event id was already handled; nothing was applied.
    Duplicate,
}

/// Verifies, de-duplicates and applies webhook deliveries.
pub struct WebhookProcessor {
    ledger: Mutex<WebhookLedger>,
    handler: PaymentEventHandler,
    secret: Option<String>,
    tolerance_secs: i64,
}

impl WebhookProcessor {
    pub fn new(storage: Arc<dyn Storage>, ledger: WebhookLedger, config: &PaymentsConfig) -> Self {
        Self {
            ledger: Mutex::new(ledger),
            handler: PaymentEventHandler::new(storage),
            secret: config
                .webhook_secret
                .clone()
                .filter(|s| !s.trim().is_empty()),
            tolerance_secs: config.webhook_tolerance_secs,
        }
    }

    fn ledger(&self) -> Result<MutexGuard<'_, WebhookLedger>> {
        self.ledger
            .lock()
            .map_err(|e| DropError::database(format!("webhook ledger poisoned: {e}")))
    }

    pub async fn process(
        &self,
        signature: Option<&str>,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<WebhookReceipt> {
        let secret = self
            .secret
            .as_deref()
            .ok_or_else(|| DropError::Config("webhook secret is not configured".to_string()))?;
        let header = signature
            .ok_or_else(|| DropError::InvalidSignature("missing signature header".to_string()))?;
        if let Err(e) = verify_signature(header, body, secret, self.tolerance_secs, now.timestamp()) {
            PaymentMetrics::record_signature_rejected();
            warn!("Rejected webhook: {}", e);
            return Err(e);
        }

        let event: WebhookEvent = serde_json::from_slice(body)
            .map_err(|e| DropError::Validation(format!("malformed webhook event: {e}")))?;

        if !self
            .ledger()?
            .try_claim(&event.id, &event.event_type, now.timestamp())?
        {
            info!(event_id = %event.id, "Duplicate webhook delivery ignored");
            PaymentMetrics::record_webhook(&event.event_type, "duplicate");
            return Ok(WebhookReceipt::Duplicate);
        }

        match self.handler.handle(&event, now).await {
            Ok(outcome) => {
                self.ledger()?
                    .mark_processed(&event.id, outcome.as_str(), Utc::now().timestamp())?;
                PaymentMetrics::record_webhook(&event.event_type, outcome.as_str());
                Ok(WebhookReceipt::Processed(outcome))
            }
            Err(e) => {
                // Let the provider's retry through
                self.ledger()?.release(&event.id)?;
                PaymentMetrics::record_webhook(&event.event_type, "failed");
                Err(e)
            }
        }
    }
}
