//! Outbound messages through the WhatsApp Cloud API

use super::TransportError;
use crate::config::WhatsAppConfig;
use crate::db::TenantChannel;
use crate::engine::{ReplyOption, ResponseAction};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

/// Sends rendered responses to `{graph}/{version}/{phone_number_id}/messages`
#[derive(Clone)]
pub struct WhatsAppClient {
    client: Client,
    base_url: String,
    list_button: String,
}

impl WhatsAppClient {
    pub fn new(config: &WhatsAppConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| TransportError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: format!(
                "{}/{}",
                config.graph_url.trim_end_matches('/'),
                config.api_version
            ),
            list_button: config.list_button.clone(),
        })
    }

    fn messages_url(&self, phone_number_id: &str) -> String {
        format!("{}/{phone_number_id}/messages", self.base_url)
    }

    /// Send one response action to a customer
    pub async fn send(
        &self,
        channel: &TenantChannel,
        to: &str,
        action: &ResponseAction,
    ) -> Result<(), TransportError> {
        let payload = render(to, action, &self.list_button);

        let response = self
            .client
            .post(self.messages_url(&channel.phone_number_id))
            .bearer_auth(&channel.access_token)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(TransportError::from_status(status.as_u16(), &body));
        }

        tracing::debug!(to = %to, kind = action.kind(), "Sent WhatsApp message");
        Ok(())
    }
}

/// Build the Cloud API request body for a response action.
///
/// Text and end nodes become plain text. Buttons become reply buttons; lists
/// become a single-section list opened by `list_button`.
pub fn render(to: &str, action: &ResponseAction, list_button: &str) -> Value {
    let mut payload = json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
    });

    match action {
        ResponseAction::Text { body } | ResponseAction::End { body } => {
            payload["type"] = json!("text");
            payload["text"] = json!({ "preview_url": false, "body": body });
        }
        ResponseAction::Buttons { body, options } => {
            payload["type"] = json!("interactive");
            payload["interactive"] = json!({
                "type": "button",
                "body": { "text": body },
                "action": {
                    "buttons": options
                        .iter()
                        .map(|ReplyOption { id, title }| json!({
                            "type": "reply",
                            "reply": { "id": id, "title": title }
                        }))
                        .collect::<Vec<_>>()
                }
            });
        }
        ResponseAction::List { body, options } => {
            payload["type"] = json!("interactive");
            payload["interactive"] = json!({
                "type": "list",
                "body": { "text": body },
                "action": {
                    "button": list_button,
                    "sections": [{
                        "rows": options
                            .iter()
                            .map(|ReplyOption { id, title }| json!({ "id": id, "title": title }))
                            .collect::<Vec<_>>()
                    }]
                }
            });
        }
    }

    payload
}
