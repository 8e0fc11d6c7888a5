use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use crate::errors::AppError;
use crate::models::TeamPayload;

/// Leads shown in a chat-style summary.
pub const SUMMARY_TOP_LEADS: usize = 3;

/// Transport that hands one team payload to one recipient.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Channel label carried in every delivery ("email", "whatsapp", "log").
    fn channel(&self) -> &str;

    async fn deliver(&self, recipient: &str, payload: &TeamPayload) -> Result<(), AppError>;
}

/// Client that relays team payloads to a webhook.
///
/// The relay owns the actual channel protocol (SMTP, WhatsApp, ...).
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
    channel: String,
}

impl WebhookNotifier {
    /// Creates a new `WebhookNotifier`.
    ///
    /// # Arguments
    ///
    /// * `url` - The relay endpoint that receives `POST` deliveries.
    /// * `channel` - Channel label forwarded with every payload.
    /// * `timeout` - Per-request timeout.
    pub fn new(
        url: impl Into<String>,
        channel: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            AppError::ExternalApiError(format!("Failed to create notify client: {}", e))
        })?;

        Ok(Self {
            client,
            url: url.into(),
            channel: channel.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn channel(&self) -> &str {
        &self.channel
    }

    async fn deliver(&self, recipient: &str, payload: &TeamPayload) -> Result<(), AppError> {
        tracing::info!(
            "Delivering {} lead(s) for {} to {} via {}",
            payload.leads.len(),
            payload.team,
            recipient,
            self.channel
        );

        // Title fingerprints let the relay drop repeats across retries
        let lead_ids: Vec<String> = payload.leads.iter().map(|l| l.lead().fingerprint()).collect();
        let body = json!({
            "recipient": recipient,
            "channel": self.channel,
            "lead_ids": lead_ids,
            "summary": format_team_summary(payload),
            "payload": payload,
        });

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout(format!("Notify relay timed out: {}", e))
                } else {
                    AppError::ExternalApiError(format!("Failed to deliver: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "Notify relay returned {}: {}",
                status, error_text
            )));
        }

        tracing::info!("✓ Delivered {} digest to {}", payload.team, recipient);
        Ok(())
    }
}

/// Dry-run transport: logs what would be sent.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn channel(&self) -> &str {
        "log"
    }

    async fn deliver(&self, recipient: &str, payload: &TeamPayload) -> Result<(), AppError> {
        tracing::info!(
            "[dry-run] {} -> {}\n{}",
            payload.team,
            recipient,
            format_team_summary(payload)
        );
        Ok(())
    }
}

/// Plain-text digest of a team payload with its top leads.
pub fn format_team_summary(payload: &TeamPayload) -> String {
    let mut out = format!(
        "{} | {} lead(s) | Rs. {:.2} Cr | {} MT steel\n",
        payload.team.label(),
        payload.leads.len(),
        payload.total_value,
        payload.total_steel
    );

    for (idx, scored) in payload.leads.iter().take(SUMMARY_TOP_LEADS).enumerate() {
        let lead = scored.lead();
        out.push_str(&format!(
            "\n{}. {}\n   Company: {}\n   Value: Rs. {:.2} Cr | Steel: {} MT ({})\n   Start: {} | Score: {:.2}\n   Tags: {}\n   Source: {}\n",
            idx + 1,
            lead.title,
            lead.company,
            lead.value,
            lead.steel_requirements.total(),
            lead.steel_requirements.primary().product_type,
            lead.start_date.format("%b %Y"),
            scored.priority_score(),
            scored.tags().join(", "),
            lead.source_url
        ));
        if let Some(contact) = lead.contacts.first() {
            out.push_str(&format!("   Contact: {} ({})\n", contact.name, contact.role));
        }
    }

    if payload.leads.len() > SUMMARY_TOP_LEADS {
        out.push_str(&format!(
            "\n+{} more lead(s) in the full digest\n",
            payload.leads.len() - SUMMARY_TOP_LEADS
        ));
    }
    out
}
