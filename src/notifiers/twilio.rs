use async_trait::async_trait;
use log::debug;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde_json::Value;

use crate::config::TwilioCredentials;
use crate::error::NotifyError;
use crate::notifiers::Notifier;

const TWILIO_API: &str = "https://api.twilio.com/2010-04-01";

/// Twilio SMS notifier. Disabled when credentials are missing.
pub struct TwilioNotifier {
    credentials: Option<TwilioCredentials>,
    client: Client,
    base_url: String,
}

impl TwilioNotifier {
    pub fn new(credentials: Option<TwilioCredentials>, client: Client) -> Self {
        Self {
            credentials,
            client,
            base_url: TWILIO_API.to_string(),
        }
    }

    fn messages_url(&self, creds: &TwilioCredentials) -> String {
        format!("{}/Accounts/{}/Messages.json", self.base_url, creds.account_sid)
    }

    /// Form-encoded `From`/`To`/`Body` payload
    fn form_body(creds: &TwilioCredentials, message: &str) -> Result<String, NotifyError> {
        let params = [
            ("From", creds.from_number.as_str()),
            ("To", creds.to_number.as_str()),
            ("Body", message),
        ];
        Ok(serde_urlencoded::to_string(params)?)
    }
}

/// Pull the message id out of a Twilio response, or the error text when rejected
fn read_response(status: reqwest::StatusCode, data: &str) -> Result<String, NotifyError> {
    let json: Value = serde_json::from_str(data).unwrap_or(Value::Null);

    if !status.is_success() {
        let message = json["message"].as_str().unwrap_or(data).to_string();
        return Err(NotifyError::Rejected { status, message });
    }

    json["sid"]
        .as_str()
        .map(str::to_string)
        .ok_or(NotifyError::MissingId)
}

#[async_trait]
impl Notifier for TwilioNotifier {
    fn is_enabled(&self) -> bool {
        self.credentials.is_some()
    }

    async fn deliver(&self, message: &str) -> Result<String, NotifyError> {
        let creds = self.credentials.as_ref().ok_or(NotifyError::Disabled)?;
        let url = self.messages_url(creds);
        let post_data = Self::form_body(creds, message)?;

        debug!("Sending SMS via {}", url);

        let res = self
            .client
            .post(&url)
            .basic_auth(&creds.account_sid, Some(&creds.auth_token))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(post_data)
            .send()
            .await?;

        let status = res.status();
        let data = res.text().await?;
        debug!("Twilio response: {}", data);

        read_response(status, &data)
    }
}
