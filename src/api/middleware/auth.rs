use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

use super::session::{Flash, SESSION_KEY_ADMIN_TOKEN, SESSION_KEY_STUDENT};
use crate::services::oauth::google::GoogleIdentity;
use crate::services::portal_api::AdminSession;

/// Authentication error responses
#[derive(Debug)]
pub enum AuthError {
    StudentSignInRequired,
    AdminSignInRequired,
    SessionError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            AuthError::StudentSignInRequired => Redirect::to("/").into_response(),
            AuthError::AdminSignInRequired => Redirect::to("/admin/login").into_response(),
            AuthError::SessionError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Session error occurred.").into_response()
            }
        }
    }
}

/// Middleware that requires an administrator token. The token is handed to
/// the handler as an `Extension<AdminSession>`.
pub async fn require_admin(
    session: Session,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let admin = match get_admin_session(&session).await {
        Ok(admin) => admin,
        Err(AuthError::AdminSignInRequired) => {
            Flash::error("Please login first").push(&session).await;
            return Err(AuthError::AdminSignInRequired);
        }
        Err(e) => return Err(e),
    };

    request.extensions_mut().insert(admin);
    Ok(next.run(request).await)
}

/// Extracts the signed-in student from the session
pub async fn get_signed_in_student(session: &Session) -> Result<GoogleIdentity, AuthError> {
    session
        .get::<GoogleIdentity>(SESSION_KEY_STUDENT)
        .await
        .map_err(|_| AuthError::SessionError)?
        .ok_or(AuthError::StudentSignInRequired)
}

/// Extracts the administrator token from the session
pub async fn get_admin_session(session: &Session) -> Result<AdminSession, AuthError> {
    let token: String = session
        .get(SESSION_KEY_ADMIN_TOKEN)
        .await
        .map_err(|_| AuthError::SessionError)?
        .ok_or(AuthError::AdminSignInRequired)?;

    Ok(AdminSession::new(token))
}

/// Drops an administrator token the backend no longer accepts and sends
/// the browser back to the login page
pub async fn expire_admin(session: &Session) -> Response {
    if let Err(e) = session.remove::<String>(SESSION_KEY_ADMIN_TOKEN).await {
        tracing::warn!(error = %e, "Failed to clear admin token");
    }
    Flash::error("Session expired. Please log in again.")
        .push(session)
        .await;

    tracing::info!("Admin token expired, redirecting to login");

    Redirect::to("/admin/login").into_response()
}
