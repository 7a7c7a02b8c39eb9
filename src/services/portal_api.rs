use std::fmt;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::models::application::Application;
use crate::models::card_request::CardRequest;

#[derive(thiserror::Error, Debug)]
pub enum PortalApiError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Session expired. Please log in again.")]
    Unauthorized,

    #[error("{0}")]
    Rejected(ApiRejection),

    #[error("Unexpected backend response: {0}")]
    InvalidResponse(String),

    #[error("Invalid backend URL: {0}")]
    InvalidBaseUrl(String),
}

impl PortalApiError {
    /// Message suitable for a user-facing notice
    pub fn notice(&self) -> String {
        match self {
            PortalApiError::HttpError(_) => {
                "Network error. Please check your connection and try again.".to_string()
            }
            PortalApiError::Rejected(rejection) => rejection.notice(),
            other => other.to_string(),
        }
    }

    /// Applies duplicate classification to a refused card request
    fn classify_submission(self) -> Self {
        match self {
            PortalApiError::Rejected(rejection) => PortalApiError::Rejected(rejection.classified()),
            other => other,
        }
    }

    pub fn rejection_kind(&self) -> Option<RejectionKind> {
        match self {
            PortalApiError::Rejected(r) => Some(r.kind),
            _ => None,
        }
    }
}

/// Why the backend refused a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    DuplicateTransaction,
    DuplicateSubject,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRejection {
    pub status: u16,
    pub kind: RejectionKind,
    pub message: String,
    pub code: Option<String>,
}

impl ApiRejection {
    /// Looks for a duplicate signal. Server errors are never duplicates.
    fn classified(self) -> Self {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if !(status.is_client_error() || status.is_success()) {
            return self;
        }

        Self {
            kind: classify_rejection(self.code.as_deref(), &self.message),
            ..self
        }
    }

    pub fn notice(&self) -> String {
        match self.kind {
            RejectionKind::DuplicateTransaction => {
                "This TRX ID is already used. Please use a different TRX ID.".to_string()
            }
            RejectionKind::DuplicateSubject => "This Student ID is already registered.".to_string(),
            RejectionKind::Other => self.message.clone(),
        }
    }
}

impl fmt::Display for ApiRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Status {}: {}", self.status, self.message)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
    code: Option<String>,
}

const DUPLICATE_CUES: [&str; 4] = ["already", "exists", "duplicate", "used"];

/// Classifies a refused card request. A structured `code` wins; the message
/// match is the fallback for backends that only send text and needs both a
/// subject keyword and a duplicate cue.
pub fn classify_rejection(code: Option<&str>, message: &str) -> RejectionKind {
    match code {
        Some("DUPLICATE_TRX_ID") => return RejectionKind::DuplicateTransaction,
        Some("DUPLICATE_STUDENT_ID") => return RejectionKind::DuplicateSubject,
        _ => {}
    }

    let lowered = message.to_lowercase();
    if !DUPLICATE_CUES.iter().any(|cue| lowered.contains(cue)) {
        return RejectionKind::Other;
    }

    if lowered.contains("trx") || lowered.contains("transaction") {
        RejectionKind::DuplicateTransaction
    } else if lowered.contains("student id") {
        RejectionKind::DuplicateSubject
    } else if lowered.contains("already exists") {
        RejectionKind::DuplicateTransaction
    } else {
        RejectionKind::Other
    }
}

fn rejection_from_body(status: StatusCode, body: &str, fallback: &str) -> ApiRejection {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .error
        .or(parsed.message)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string());

    ApiRejection {
        status: status.as_u16(),
        kind: RejectionKind::Other,
        message,
        code: parsed.code,
    }
}

/// Bearer token for the administrator console. Passed explicitly to every
/// call that needs authorization.
#[derive(Clone)]
pub struct AdminSession {
    token: Secret<String>,
}

impl AdminSession {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Secret::new(token.into()),
        }
    }

    pub fn token(&self) -> &str {
        self.token.expose_secret()
    }
}

impl fmt::Debug for AdminSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AdminSession([REDACTED])")
    }
}

/// Approve or reject a pending application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewAction {
    Approve,
    Reject { reason: String },
}

impl ReviewAction {
    pub fn verb(&self) -> &'static str {
        match self {
            ReviewAction::Approve => "approve",
            ReviewAction::Reject { .. } => "reject",
        }
    }

    pub fn past_tense(&self) -> &'static str {
        match self {
            ReviewAction::Approve => "approved",
            ReviewAction::Reject { .. } => "rejected",
        }
    }
}

#[derive(Debug, Serialize)]
struct ActionRequest<'a> {
    action: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: Option<String>,
}

#[derive(Debug, Serialize)]
struct ForgotPasswordRequest<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResetPasswordRequest<'a> {
    token: &'a str,
    email: &'a str,
    new_password: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SuccessResponse {
    #[serde(default)]
    success: bool,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    data: Vec<Application>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PendingApplications {
    #[serde(default)]
    pending_applications: Vec<Application>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DashboardResponse {
    data: Option<PendingApplications>,
    #[serde(default)]
    pending_applications: Vec<Application>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApplicationEnvelope {
    Data { data: Application },
    Named { application: Application },
    Bare(Application),
}

impl ApplicationEnvelope {
    fn into_inner(self) -> Application {
        match self {
            ApplicationEnvelope::Data { data } => data,
            ApplicationEnvelope::Named { application } => application,
            ApplicationEnvelope::Bare(app) => app,
        }
    }
}

/// Typed client for the backend REST API
#[derive(Debug, Clone)]
pub struct PortalApi {
    client: Client,
    base_url: Url,
}

impl PortalApi {
    pub fn new(api_base_url: &str, timeout: Duration) -> Result<Self, PortalApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Self::with_client(client, api_base_url)
    }

    pub fn with_client(client: Client, api_base_url: &str) -> Result<Self, PortalApiError> {
        let base_url = Url::parse(api_base_url)
            .map_err(|e| PortalApiError::InvalidBaseUrl(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(PortalApiError::InvalidBaseUrl(api_base_url.to_string()));
        }

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Sends a request and returns the body of a successful response.
    ///
    /// With `authorized`, a 401 means the admin token is no longer valid.
    async fn send(
        &self,
        request: RequestBuilder,
        authorized: bool,
        fallback: &str,
    ) -> Result<String, PortalApiError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read response body".to_string());

        if authorized && status == StatusCode::UNAUTHORIZED {
            tracing::warn!("Backend rejected admin token");
            return Err(PortalApiError::Unauthorized);
        }

        if !status.is_success() {
            tracing::error!(
                status = %status,
                error = %body,
                "Backend request failed"
            );
            return Err(PortalApiError::Rejected(rejection_from_body(
                status, &body, fallback,
            )));
        }

        Ok(body)
    }

    fn parse<T: for<'de> Deserialize<'de>>(body: &str) -> Result<T, PortalApiError> {
        serde_json::from_str(body)
            .map_err(|e| PortalApiError::InvalidResponse(format!("Failed to parse response: {}", e)))
    }

    /// Fails when a 2xx response still reports `success: false`
    fn ensure_success(body: &str, fallback: &str) -> Result<(), PortalApiError> {
        let result: SuccessResponse = Self::parse(body)?;
        if result.success {
            Ok(())
        } else {
            Err(PortalApiError::Rejected(rejection_from_body(
                StatusCode::OK,
                body,
                fallback,
            )))
        }
    }

    /// `GET /api/applications`
    #[tracing::instrument(skip(self))]
    pub async fn list_applications(&self) -> Result<Vec<Application>, PortalApiError> {
        let url = self.endpoint(&["api", "applications"]);
        let body = self
            .send(self.client.get(url), false, "Failed to fetch applications")
            .await?;
        let list: ListResponse = Self::parse(&body)?;

        tracing::debug!(count = list.data.len(), "Fetched applications");

        Ok(list.data)
    }

    /// `GET /api/admin/dashboard`
    #[tracing::instrument(skip(self, session))]
    pub async fn pending_applications(
        &self,
        session: &AdminSession,
    ) -> Result<Vec<Application>, PortalApiError> {
        let url = self.endpoint(&["api", "admin", "dashboard"]);
        let body = self
            .send(
                self.client.get(url).bearer_auth(session.token()),
                true,
                "Failed to fetch applications",
            )
            .await?;
        let dashboard: DashboardResponse = Self::parse(&body)?;

        let pending = match dashboard.data {
            Some(data) if !data.pending_applications.is_empty() => data.pending_applications,
            _ => dashboard.pending_applications,
        };

        tracing::info!(count = pending.len(), "Loaded pending applications");

        Ok(pending)
    }

    /// `GET /api/admin/application/:studentId`
    #[tracing::instrument(skip(self, session))]
    pub async fn application(
        &self,
        session: &AdminSession,
        student_id: &str,
    ) -> Result<Application, PortalApiError> {
        let url = self.endpoint(&["api", "admin", "application", student_id]);
        let body = self
            .send(
                self.client.get(url).bearer_auth(session.token()),
                true,
                "Failed to fetch application details",
            )
            .await?;
        let envelope: ApplicationEnvelope = Self::parse(&body)?;

        Ok(envelope.into_inner())
    }

    /// `POST /api/admin/application/:id/action`
    #[tracing::instrument(skip(self, session, action), fields(review_action = action.verb()))]
    pub async fn review(
        &self,
        session: &AdminSession,
        application_id: &str,
        action: &ReviewAction,
    ) -> Result<(), PortalApiError> {
        let url = self.endpoint(&["api", "admin", "application", application_id, "action"]);
        let payload = ActionRequest {
            action: action.verb(),
            reason: match action {
                ReviewAction::Approve => None,
                ReviewAction::Reject { reason } => Some(reason.as_str()),
            },
        };
        let fallback = format!("Failed to {} application", action.verb());

        let body = self
            .send(
                self.client
                    .post(url)
                    .bearer_auth(session.token())
                    .json(&payload),
                true,
                &fallback,
            )
            .await?;
        Self::ensure_success(&body, &fallback)?;

        tracing::info!(application_id = %application_id, "Application {}", action.past_tense());

        Ok(())
    }

    /// `POST /api/students`
    #[tracing::instrument(skip(self, request), fields(student_id = %request.identity().student_id))]
    pub async fn submit_request(&self, request: CardRequest) -> Result<(), PortalApiError> {
        let url = self.endpoint(&["api", "students"]);
        let form = request.into_multipart()?;

        let body = self
            .send(self.client.post(url).multipart(form), false, "Unknown error")
            .await
            .map_err(PortalApiError::classify_submission)?;
        Self::ensure_success(&body, "Unknown error").map_err(PortalApiError::classify_submission)?;

        tracing::info!("Card request submitted");

        Ok(())
    }

    /// `POST /api/auth/login`
    #[tracing::instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<AdminSession, PortalApiError> {
        let url = self.endpoint(&["api", "auth", "login"]);
        let body = self
            .send(
                self.client
                    .post(url)
                    .json(&LoginRequest { username, password }),
                false,
                "Login failed",
            )
            .await?;
        let login: LoginResponse = Self::parse(&body)?;

        let token = login
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| PortalApiError::InvalidResponse("Login response has no token".to_string()))?;

        Ok(AdminSession::new(token))
    }

    /// `POST /api/auth/forgot-password`
    #[tracing::instrument(skip(self))]
    pub async fn forgot_password(&self, email: &str) -> Result<Option<String>, PortalApiError> {
        let url = self.endpoint(&["api", "auth", "forgot-password"]);
        let body = self
            .send(
                self.client.post(url).json(&ForgotPasswordRequest { email }),
                false,
                "Something went wrong",
            )
            .await?;

        Ok(serde_json::from_str::<MessageResponse>(&body)
            .ok()
            .and_then(|m| m.message))
    }

    /// `POST /api/auth/reset-password`
    #[tracing::instrument(skip(self, token, new_password))]
    pub async fn reset_password(
        &self,
        token: &str,
        email: &str,
        new_password: &str,
    ) -> Result<Option<String>, PortalApiError> {
        let url = self.endpoint(&["api", "auth", "reset-password"]);
        let body = self
            .send(
                self.client.post(url).json(&ResetPasswordRequest {
                    token,
                    email,
                    new_password,
                }),
                false,
                "Reset failed",
            )
            .await?;

        Ok(serde_json::from_str::<MessageResponse>(&body)
            .ok()
            .and_then(|m| m.message))
    }

    /// Lightweight reachability check used by `/health`
    pub async fn check_health(&self) -> Result<(), PortalApiError> {
        let url = self.endpoint(&["api", "applications"]);
        let response = self
            .client
            .head(url)
            .timeout(Duration::from_secs(3))
            .send()
            .await?;

        if response.status().is_server_error() {
            return Err(PortalApiError::InvalidResponse(format!(
                "Backend unavailable: HTTP {}",
                response.status()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_code_wins_over_message() {
        assert_eq!(
            classify_rejection(Some("DUPLICATE_STUDENT_ID"), "TRX ID already exists"),
            RejectionKind::DuplicateSubject
        );
        assert_eq!(
            classify_rejection(Some("DUPLICATE_TRX_ID"), "anything"),
            RejectionKind::DuplicateTransaction
        );
    }

    #[test]
    fn test_message_fallback_classification() {
        assert_eq!(
            classify_rejection(None, "TRX ID TRX9001 already exists"),
            RejectionKind::DuplicateTransaction
        );
        assert_eq!(
            classify_rejection(None, "Student ID is already registered"),
            RejectionKind::DuplicateSubject
        );
        assert_eq!(
            classify_rejection(None, "Record already exists"),
            RejectionKind::DuplicateTransaction
        );
        assert_eq!(
            classify_rejection(None, "Photo is required"),
            RejectionKind::Other
        );
    }

    #[test]
    fn test_validation_messages_are_not_duplicates() {
        for message in [
            "trxId is required",
            "Transaction amount does not match",
            "Invalid TRX ID format",
            "Student ID must be numeric",
        ] {
            assert_eq!(classify_rejection(None, message), RejectionKind::Other, "{}", message);
        }
        assert_eq!(
            classify_rejection(None, "Duplicate transaction"),
            RejectionKind::DuplicateTransaction
        );
    }

    #[test]
    fn test_rejection_notice_is_friendly() {
        let rejection = rejection_from_body(
            StatusCode::BAD_REQUEST,
            r#"{"success":false,"error":"TRX ID already exists"}"#,
            "Unknown error",
        );
        assert_eq!(rejection.kind, RejectionKind::Other);

        let rejection = rejection.classified();
        assert_eq!(rejection.kind, RejectionKind::DuplicateTransaction);
        assert!(rejection.notice().contains("already used"));
    }

    #[test]
    fn test_unclassified_rejection_is_verbatim() {
        let err = PortalApiError::Rejected(rejection_from_body(
            StatusCode::BAD_REQUEST,
            r#"{"error":"Transaction already approved","code":"DUPLICATE_TRX_ID"}"#,
            "Failed to approve application",
        ));
        assert_eq!(err.rejection_kind(), Some(RejectionKind::Other));
        assert_eq!(err.notice(), "Transaction already approved");
    }

    #[test]
    fn test_rejection_without_body_uses_fallback() {
        let rejection = rejection_from_body(StatusCode::BAD_REQUEST, "", "Login failed");
        assert_eq!(rejection.message, "Login failed");
        assert_eq!(rejection.kind, RejectionKind::Other);
    }

    #[test]
    fn test_server_errors_are_not_duplicates() {
        let rejection = rejection_from_body(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"error":"transaction already exists in a locked ledger"}"#,
            "Unknown error",
        );
        assert_eq!(rejection.classified().kind, RejectionKind::Other);
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let api = PortalApi::with_client(Client::new(), "https://example.test/backend/").unwrap();
        let url = api.endpoint(&["api", "admin", "application", "22 35", "action"]);
        assert_eq!(
            url.as_str(),
            "https://example.test/backend/api/admin/application/22%2035/action"
        );
    }

    #[test]
    fn test_action_request_serialization() {
        let json = serde_json::to_string(&ActionRequest {
            action: "reject",
            reason: Some("Blurry photo"),
        })
        .unwrap();
        assert_eq!(json, r#"{"action":"reject","reason":"Blurry photo"}"#);

        let json = serde_json::to_string(&ActionRequest {
            action: "approve",
            reason: None,
        })
        .unwrap();
        assert_eq!(json, r#"{"action":"approve"}"#);
    }

    #[test]
    fn test_admin_session_debug_is_redacted() {
        let session = AdminSession::new("secret-token");
        assert_eq!(format!("{:?}", session), "AdminSession([REDACTED])");
        assert_eq!(session.token(), "secret-token");
    }
}
