use askama::Template;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum EmailError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Email API error: {0}")]
    ApiError(String),

    #[error("Template rendering failed: {0}")]
    TemplateError(#[from] askama::Error),
}

#[derive(Debug, Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: &'a str,
    html: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct SendEmailResponse {
    pub id: String,
}

#[derive(Template)]
#[template(path = "emails/welcome.html")]
pub struct WelcomeEmail<'a> {
    pub gym_name: &'a str,
    pub first_name: &'a str,
    pub check_in_pin: &'a str,
    pub qr_data_uri: Option<&'a str>,
    pub monthly_total: u32,
    pub checkout_url: Option<&'a str>,
}

#[derive(Template)]
#[template(path = "emails/waiver_reminder.html")]
pub struct WaiverReminderEmail<'a> {
    pub gym_name: &'a str,
    pub first_name: &'a str,
    pub expires_on: &'a str,
    pub days_remaining: i64,
    pub needs_adult_waiver: bool,
    pub renew_url: &'a str,
}

#[derive(Template)]
#[template(path = "emails/promotion.html")]
pub struct PromotionEmail<'a> {
    pub gym_name: &'a str,
    pub first_name: &'a str,
    pub belt_name: &'a str,
    pub stripes: i16,
    pub promoted_by: Option<&'a str>,
}

#[derive(Clone)]
pub struct EmailClient {
    client: Client,
    api_base_url: String,
    api_key: Secret<String>,
    from: String,
}

impl EmailClient {
    pub fn new(api_base_url: &str, api_key: Secret<String>, from: &str) -> Self {
        Self {
            client: Client::new(),
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            api_key,
            from: from.to_string(),
        }
    }

    #[tracing::instrument(skip(self, html))]
    pub async fn send(&self, to: &str, subject: &str, html: &str) -> Result<String, EmailError> {
        let request_body = SendEmailRequest {
            from: &self.from,
            to: vec![to],
            subject,
            html,
        };

        let response = self
            .client
            .post(format!("{}/emails", self.api_base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(EmailError::ApiError(format!(
                "Status {}: {}",
                status, error_text
            )));
        }

        let sent: SendEmailResponse = response
            .json()
            .await
            .map_err(|e| EmailError::ApiError(format!("Failed to parse response: {}", e)))?;

        tracing::info!(email_id = %sent.id, "Email sent");

        Ok(sent.id)
    }

    /// Renders and sends a template
    pub async fn send_template<T: Template>(
        &self,
        to: &str,
        subject: &str,
        template: &T,
    ) -> Result<String, EmailError> {
        let html = template.render()?;
        self.send(to, subject, &html).await
    }
}

/// Sends without failing the caller; errors are logged
pub async fn send_best_effort<T: Template>(
    client: Option<&EmailClient>,
    to: &str,
    subject: &str,
    template: &T,
) {
    let Some(client) = client else {
        tracing::debug!(subject = %subject, "Email not configured, skipping");
        return;
    };

    if let Err(e) = client.send_template(to, subject, template).await {
        tracing::warn!(error = %e, subject = %subject, "Failed to send email");
    }
}
