use askama::Template;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use tower_sessions::Session;

use crate::api::middleware::session::{
    AppState, Flash, SESSION_KEY_CSRF_TOKEN, SESSION_KEY_PKCE_VERIFIER, SESSION_KEY_STUDENT,
};
use crate::services::oauth::google::{self, GoogleIdentity};

#[derive(Debug)]
pub enum AuthError {
    OAuthError(String),
    SessionError(String),
    CsrfMismatch,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::OAuthError(msg) => {
                (StatusCode::BAD_REQUEST, format!("OAuth error: {}", msg))
            }
            AuthError::SessionError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Session error: {}", msg),
            ),
            AuthError::CsrfMismatch => (StatusCode::BAD_REQUEST, "CSRF token mismatch".to_string()),
        };

        (status, message).into_response()
    }
}

impl From<tower_sessions::session::Error> for AuthError {
    fn from(e: tower_sessions::session::Error) -> Self {
        AuthError::SessionError(e.to_string())
    }
}

#[derive(Template)]
#[template(path = "home.html")]
struct HomeTemplate {
    institution: String,
    short_name: String,
    flash: Option<Flash>,
    student: Option<GoogleIdentity>,
    allowed_domain: String,
}

fn redirect_uri(state: &AppState) -> String {
    format!("{}/auth/google/callback", state.config.base_url)
}

/// Initiates Google sign-in, restricted to the institutional domain
async fn google_login(
    State(state): State<AppState>,
    session: Session,
) -> Result<Redirect, AuthError> {
    let (auth_url, csrf_token, pkce_verifier) = google::build_auth_url(
        &state.config.google_client_id,
        &state.config.google_client_secret,
        &redirect_uri(&state),
        &state.config.allowed_email_domain,
    )
    .map_err(|e| AuthError::OAuthError(e.to_string()))?;

    session.insert(SESSION_KEY_CSRF_TOKEN, csrf_token).await?;
    session.insert(SESSION_KEY_PKCE_VERIFIER, pkce_verifier).await?;

    tracing::info!("Redirecting to Google sign-in");

    Ok(Redirect::to(&auth_url))
}

#[derive(Deserialize)]
struct OAuthCallback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Handles the OAuth callback from Google
async fn google_callback(
    State(state): State<AppState>,
    Query(params): Query<OAuthCallback>,
    session: Session,
) -> Result<Redirect, AuthError> {
    if let Some(error) = params.error {
        tracing::warn!(error = %error, "Google sign-in was not completed");
        Flash::error("Login failed. Please try again.")
            .push(&session)
            .await;
        return Ok(Redirect::to("/"));
    }

    let stored_csrf: Option<String> = session.remove(SESSION_KEY_CSRF_TOKEN).await?;
    if stored_csrf.is_none() || stored_csrf != params.state {
        return Err(AuthError::CsrfMismatch);
    }

    let code = params
        .code
        .ok_or_else(|| AuthError::OAuthError("Missing authorization code".to_string()))?;
    let pkce_verifier: Option<String> = session.remove(SESSION_KEY_PKCE_VERIFIER).await?;

    let access_token = google::exchange_code(
        &code,
        &state.config.google_client_id,
        &state.config.google_client_secret,
        &redirect_uri(&state),
        pkce_verifier.as_deref(),
    )
    .await
    .map_err(|e| AuthError::OAuthError(e.to_string()))?;

    let identity = google::fetch_identity(&access_token)
        .await
        .map_err(|e| AuthError::OAuthError(e.to_string()))?;

    let domain = &state.config.allowed_email_domain;
    if !google::is_allowed_email(&identity.email, domain) {
        tracing::warn!(email = %identity.email, "Rejected sign-in from outside the allowed domain");
        session.flush().await?;
        Flash::error(format!(
            "Only @{} emails are allowed!",
            domain.trim_start_matches('@')
        ))
        .push(&session)
        .await;
        return Ok(Redirect::to("/"));
    }

    session.cycle_id().await?;
    session.insert(SESSION_KEY_STUDENT, &identity).await?;
    Flash::success(format!("Welcome {}!", identity.display_name()))
        .push(&session)
        .await;

    tracing::info!(email = %identity.email, "Student signed in");

    Ok(Redirect::to("/dashboard"))
}

/// Logs out the student
async fn logout(session: Session) -> Result<Redirect, AuthError> {
    session.flush().await?;
    Flash::success("Logged out successfully").push(&session).await;

    Ok(Redirect::to("/"))
}

/// Shows the home/login page
async fn home_page(
    State(state): State<AppState>,
    session: Session,
) -> Result<HomeTemplate, AuthError> {
    let student: Option<GoogleIdentity> = session.get(SESSION_KEY_STUDENT).await?;

    Ok(HomeTemplate {
        institution: state.config.institution_name.clone(),
        short_name: state.config.institution_short_name.clone(),
        flash: Flash::take(&session).await,
        student,
        allowed_domain: state
            .config
            .allowed_email_domain
            .trim_start_matches('@')
            .to_string(),
    })
}

/// Creates the student sign-in router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(home_page))
        .route("/auth/google/login", get(google_login))
        .route("/auth/google/callback", get(google_callback))
        .route("/auth/logout", get(logout))
}
