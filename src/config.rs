use secrecy::Secret;
use serde::Deserialize;

const DEFAULT_EMAIL_DOMAIN: &str = "cse.bubt.edu.bd";
const DEFAULT_CARD_FILE_PREFIX: &str = "BUBT-ID-Card";
const DEFAULT_INSTITUTION_NAME: &str = "Bangladesh University of Business and Technology";
const DEFAULT_INSTITUTION_SHORT_NAME: &str = "BUBT";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub base_url: String,
    pub host: String,
    pub port: u16,

    // Backend REST API and upload store
    pub api_base_url: String,
    pub upload_base_url: String,
    pub http_timeout_secs: u64,

    // Google sign-in for students
    pub google_client_id: String,
    pub google_client_secret: Secret<String>,
    pub allowed_email_domain: String,

    // Card branding
    pub card_file_prefix: String,
    pub institution_name: String,
    pub institution_short_name: String,

    pub secure_cookies: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for local development)
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        let api_base_url: String = config.get("api_base_url")?;
        let api_base_url = api_base_url.trim_end_matches('/').to_string();

        Ok(Self {
            base_url: config.get("base_url")?,
            host: config.get("host").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: config.get("port")?,

            upload_base_url: config
                .get::<String>("upload_base_url")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| format!("{}/uploads", api_base_url)),
            api_base_url,
            http_timeout_secs: config.get("http_timeout_secs").unwrap_or(30),

            google_client_id: config.get("google_client_id")?,
            google_client_secret: Secret::new(config.get("google_client_secret")?),
            allowed_email_domain: config
                .get("allowed_email_domain")
                .unwrap_or_else(|_| DEFAULT_EMAIL_DOMAIN.to_string()),

            card_file_prefix: config
                .get("card_file_prefix")
                .unwrap_or_else(|_| DEFAULT_CARD_FILE_PREFIX.to_string()),
            institution_name: config
                .get("institution_name")
                .unwrap_or_else(|_| DEFAULT_INSTITUTION_NAME.to_string()),
            institution_short_name: config
                .get("institution_short_name")
                .unwrap_or_else(|_| DEFAULT_INSTITUTION_SHORT_NAME.to_string()),

            secure_cookies: config.get("secure_cookies").unwrap_or(true),
        })
    }

    /// Card branding derived from configuration
    pub fn card_branding(&self) -> crate::services::card_template::CardBranding {
        crate::services::card_template::CardBranding {
            institution_name: self.institution_name.clone(),
            short_name: self.institution_short_name.clone(),
        }
    }
}
