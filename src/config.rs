use secrecy::Secret;
use serde::Deserialize;

pub const DEFAULT_STRIPE_API_URL: &str = "https://api.stripe.com";
pub const DEFAULT_EMAIL_API_URL: &str = "https://api.resend.com";
pub const DEFAULT_WAIVER_REMINDER_CRON: &str = "0 0 9 * * *";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub base_url: String,
    pub host: String,
    pub port: u16,
    pub gym_name: String,

    // Staff access
    pub admin_password: Secret<String>,

    // Stripe (optional: signup works without checkout when unset)
    pub stripe_secret_key: Option<Secret<String>>,
    pub stripe_webhook_secret: Option<Secret<String>>,
    pub stripe_api_url: String,

    // Transactional email (optional)
    pub email_api_key: Option<Secret<String>>,
    pub email_api_url: String,
    pub email_from: String,

    // Background jobs
    pub waiver_reminder_cron: String,

    // Security
    pub session_secret: Secret<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for local development)
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        Ok(Self {
            database_url: config.get("database_url")?,
            base_url: config.get("base_url")?,
            host: config.get("host").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: config.get("port")?,
            gym_name: config.get("gym_name").unwrap_or_else(|_| "Dojo".to_string()),

            admin_password: Secret::new(config.get("admin_password")?),

            stripe_secret_key: config
                .get::<String>("stripe_secret_key")
                .ok()
                .map(Secret::new),
            stripe_webhook_secret: config
                .get::<String>("stripe_webhook_secret")
                .ok()
                .map(Secret::new),
            stripe_api_url: config
                .get("stripe_api_url")
                .unwrap_or_else(|_| DEFAULT_STRIPE_API_URL.to_string()),

            email_api_key: config.get::<String>("email_api_key").ok().map(Secret::new),
            email_api_url: config
                .get("email_api_url")
                .unwrap_or_else(|_| DEFAULT_EMAIL_API_URL.to_string()),
            email_from: config
                .get("email_from")
                .unwrap_or_else(|_| "Dojo <no-reply@example.com>".to_string()),

            waiver_reminder_cron: config
                .get("waiver_reminder_cron")
                .unwrap_or_else(|_| DEFAULT_WAIVER_REMINDER_CRON.to_string()),

            session_secret: Secret::new(config.get("session_secret")?),
        })
    }

    /// Returns a Stripe client when a secret key is configured
    pub fn stripe_client(&self) -> Option<crate::services::stripe::StripeClient> {
        self.stripe_secret_key.as_ref().map(|key| {
            crate::services::stripe::StripeClient::new(&self.stripe_api_url, key.clone())
        })
    }

    /// Returns an email client when an API key is configured
    pub fn email_client(&self) -> Option<crate::services::email::EmailClient> {
        self.email_api_key.as_ref().map(|key| {
            crate::services::email::EmailClient::new(
                &self.email_api_url,
                key.clone(),
                &self.email_from,
            )
        })
    }
}
