use crate::errors::AppError;
use crate::models::{Lead, LeadScore};
use reqwest;
use serde_json::json;
use std::time::Duration;
use tracing;

/// Client for delivering hot-lead alerts to a workshop's webhook endpoint.
///
/// Workshops configure a URL (Slack-compatible or their own CRM) that gets
/// a POST whenever a lead scores Hot or High priority. Delivery is
/// best-effort: a failed alert is logged and never fails the scoring call.
#[derive(Clone)]
pub struct AlertClient {
    client: reqwest::Client,
    webhook_url: String,
}

impl AlertClient {
    /// Creates a new `AlertClient` for the given webhook URL.
    pub fn new(webhook_url: String) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create alert client: {}", e))
            })?;

        Ok(Self {
            client,
            webhook_url,
        })
    }

    /// POST a hot-lead alert.
    ///
    /// The payload carries the identifiers and headline numbers a workshop
    /// needs to react; the full score stays in the database.
    pub async fn send_hot_lead_alert(
        &self,
        lead: &Lead,
        score: &LeadScore,
    ) -> Result<(), AppError> {
        let lead_label = lead
            .id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "unsaved".to_string());
        tracing::info!("Sending hot lead alert for lead {}", lead_label);

        let body = json!({
            "lead_id": lead.id,
            "kunde_id": lead.kunde_id,
            "name": lead.name,
            "total_score": score.total,
            "classification": score.classification,
            "priority": score.priority,
            "estimated_value": score.estimated_value,
        });

        let response = self
            .client
            .post(&self.webhook_url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Alert request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "Alert webhook returned {}: {}",
                status, error_text
            )));
        }

        tracing::info!("Hot lead alert delivered for lead {}", lead_label);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = AlertClient::new("https://example.com/hooks/leads".to_string());
        assert!(client.is_ok());
    }
}
