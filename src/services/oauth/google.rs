use oauth2::reqwest::async_http_client;
use oauth2::{
    basic::BasicClient, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope, TokenResponse as OAuth2TokenResponse,
    TokenUrl,
};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum GoogleOAuthError {
    #[error("OAuth URL construction failed: {0}")]
    UrlConstruction(String),

    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    #[error("Invalid redirect URI: {0}")]
    InvalidRedirectUri(String),

    #[error("User info request failed: {0}")]
    UserInfo(String),
}

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// Scopes needed to read the signed-in student's email and profile
pub const SIGN_IN_SCOPES: [&str; 3] = ["openid", "email", "profile"];

/// Identity returned by the Google userinfo endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleIdentity {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

impl GoogleIdentity {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.email)
    }
}

/// Whether the email belongs to the allowed institutional domain
pub fn is_allowed_email(email: &str, allowed_domain: &str) -> bool {
    let domain = allowed_domain.trim_start_matches('@');
    match email.trim().rsplit_once('@') {
        Some((local, host)) => !local.is_empty() && host.eq_ignore_ascii_case(domain),
        None => false,
    }
}

/// Builds the Google OAuth client
fn build_oauth_client(
    client_id: &str,
    client_secret: &Secret<String>,
    redirect_uri: &str,
) -> Result<BasicClient, GoogleOAuthError> {
    let redirect_url = RedirectUrl::new(redirect_uri.to_string())
        .map_err(|e| GoogleOAuthError::InvalidRedirectUri(e.to_string()))?;

    let client = BasicClient::new(
        ClientId::new(client_id.to_string()),
        Some(ClientSecret::new(client_secret.expose_secret().clone())),
        AuthUrl::new(GOOGLE_AUTH_URL.to_string())
            .map_err(|e| GoogleOAuthError::UrlConstruction(e.to_string()))?,
        Some(
            TokenUrl::new(GOOGLE_TOKEN_URL.to_string())
                .map_err(|e| GoogleOAuthError::UrlConstruction(e.to_string()))?,
        ),
    )
    .set_redirect_uri(redirect_url);

    Ok(client)
}

/// Generates the authorization URL for Google sign-in, restricted to the
/// hosted domain. Returns (auth_url, csrf_token, pkce_verifier).
pub fn build_auth_url(
    client_id: &str,
    client_secret: &Secret<String>,
    redirect_uri: &str,
    hosted_domain: &str,
) -> Result<(String, String, String), GoogleOAuthError> {
    let client = build_oauth_client(client_id, client_secret, redirect_uri)?;

    let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

    let (auth_url, csrf_token) = client
        .authorize_url(CsrfToken::new_random)
        .add_scopes(SIGN_IN_SCOPES.iter().map(|s| Scope::new(s.to_string())))
        .add_extra_param("hd", hosted_domain.to_string())
        .add_extra_param("prompt", "select_account")
        .set_pkce_challenge(pkce_challenge)
        .url();

    Ok((
        auth_url.to_string(),
        csrf_token.secret().clone(),
        pkce_verifier.secret().clone(),
    ))
}

/// Exchanges an authorization code for an access token
pub async fn exchange_code(
    code: &str,
    client_id: &str,
    client_secret: &Secret<String>,
    redirect_uri: &str,
    pkce_verifier: Option<&str>,
) -> Result<String, GoogleOAuthError> {
    let client = build_oauth_client(client_id, client_secret, redirect_uri)?;

    let mut token_request = client.exchange_code(AuthorizationCode::new(code.to_string()));

    if let Some(verifier) = pkce_verifier {
        token_request =
            token_request.set_pkce_verifier(PkceCodeVerifier::new(verifier.to_string()));
    }

    let token_response = token_request
        .request_async(async_http_client)
        .await
        .map_err(|e| GoogleOAuthError::TokenExchange(e.to_string()))?;

    Ok(token_response.access_token().secret().clone())
}

/// Fetches the signed-in identity from Google
pub async fn fetch_identity(access_token: &str) -> Result<GoogleIdentity, GoogleOAuthError> {
    let client = reqwest::Client::new();
    let response = client
        .get(GOOGLE_USERINFO_URL)
        .bearer_auth(access_token)
        .send()
        .await
        .map_err(|e| GoogleOAuthError::UserInfo(e.to_string()))?;

    if !response.status().is_success() {
        return Err(GoogleOAuthError::UserInfo(format!(
            "Google API error: {}",
            response.status()
        )));
    }

    response
        .json::<GoogleIdentity>()
        .await
        .map_err(|e| GoogleOAuthError::UserInfo(e.to_string()))
}
