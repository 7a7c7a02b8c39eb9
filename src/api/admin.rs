use askama::Template;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Extension, Form, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tower_sessions::Session;

use crate::api::middleware::auth::{expire_admin, get_admin_session, require_admin, AuthError};
use crate::api::middleware::session::{AppState, Flash, SESSION_KEY_ADMIN_TOKEN};
use crate::models::application::{Application, ApplicationStatus};
use crate::services::portal_api::{AdminSession, PortalApiError, ReviewAction};
use crate::services::review_queue::{self, Page, PER_PAGE};

const DASHBOARD: &str = "/admin/dashboard";
const LOGIN: &str = "/admin/login";

#[derive(Debug)]
pub enum AdminError {
    Auth(AuthError),
    SessionError(String),
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        match self {
            AdminError::Auth(e) => e.into_response(),
            AdminError::SessionError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Session error: {}", msg),
            )
                .into_response(),
        }
    }
}

impl From<AuthError> for AdminError {
    fn from(e: AuthError) -> Self {
        AdminError::Auth(e)
    }
}

impl From<tower_sessions::session::Error> for AdminError {
    fn from(e: tower_sessions::session::Error) -> Self {
        AdminError::SessionError(e.to_string())
    }
}

fn format_timestamp(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

fn or_na(value: Option<&str>) -> String {
    value
        .filter(|v| !v.trim().is_empty())
        .unwrap_or("N/A")
        .to_string()
}

// Login, logout and password recovery

#[derive(Template)]
#[template(path = "admin_login.html")]
struct AdminLoginTemplate {
    institution: String,
    short_name: String,
    flash: Option<Flash>,
    username: String,
}

#[derive(Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

async fn login_page(
    State(state): State<AppState>,
    session: Session,
) -> Result<Response, AdminError> {
    if get_admin_session(&session).await.is_ok() {
        return Ok(Redirect::to(DASHBOARD).into_response());
    }

    Ok(AdminLoginTemplate {
        institution: state.config.institution_name.clone(),
        short_name: state.config.institution_short_name.clone(),
        flash: Flash::take(&session).await,
        username: String::new(),
    }
    .into_response())
}

async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Response, AdminError> {
    match state.api.login(form.username.trim(), &form.password).await {
        Ok(admin) => {
            session.cycle_id().await?;
            session
                .insert(SESSION_KEY_ADMIN_TOKEN, admin.token())
                .await?;
            Flash::success("Login successful! Redirecting to dashboard...")
                .push(&session)
                .await;

            tracing::info!(username = %form.username.trim(), "Administrator signed in");

            Ok(Redirect::to(DASHBOARD).into_response())
        }
        Err(e) => {
            tracing::warn!(username = %form.username.trim(), error = %e, "Administrator login failed");
            let page = AdminLoginTemplate {
                institution: state.config.institution_name.clone(),
                short_name: state.config.institution_short_name.clone(),
                flash: Some(Flash::error(e.notice())),
                username: form.username,
            };
            Ok((StatusCode::UNAUTHORIZED, page).into_response())
        }
    }
}

async fn logout(session: Session) -> Result<Redirect, AdminError> {
    session.remove::<String>(SESSION_KEY_ADMIN_TOKEN).await?;
    Flash::success("Logged out successfully").push(&session).await;

    Ok(Redirect::to(LOGIN))
}

#[derive(Template)]
#[template(path = "forgot_password.html")]
struct ForgotPasswordTemplate {
    institution: String,
    short_name: String,
    flash: Option<Flash>,
    email: String,
}

#[derive(Deserialize)]
struct ForgotPasswordForm {
    email: String,
}

async fn forgot_password_page(
    State(state): State<AppState>,
    session: Session,
) -> ForgotPasswordTemplate {
    ForgotPasswordTemplate {
        institution: state.config.institution_name.clone(),
        short_name: state.config.institution_short_name.clone(),
        flash: Flash::take(&session).await,
        email: String::new(),
    }
}

async fn forgot_password(
    State(state): State<AppState>,
    Form(form): Form<ForgotPasswordForm>,
) -> ForgotPasswordTemplate {
    let email = form.email.trim().to_string();
    let flash = match state.api.forgot_password(&email).await {
        Ok(message) => Flash::success(
            message.unwrap_or_else(|| "Password reset link sent to your email".to_string()),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Password reset request failed");
            Flash::error(e.notice())
        }
    };

    ForgotPasswordTemplate {
        institution: state.config.institution_name.clone(),
        short_name: state.config.institution_short_name.clone(),
        flash: Some(flash),
        email,
    }
}

#[derive(Template)]
#[template(path = "reset_password.html")]
struct ResetPasswordTemplate {
    institution: String,
    short_name: String,
    flash: Option<Flash>,
    token: String,
    email: String,
}

#[derive(Deserialize)]
struct ResetPasswordQuery {
    token: Option<String>,
    email: Option<String>,
}

#[derive(Deserialize)]
struct ResetPasswordForm {
    #[serde(default)]
    token: String,
    #[serde(default)]
    email: String,
    new_password: String,
}

/// Both the token and the email must be present and non-blank
fn reset_credentials(token: Option<&str>, email: Option<&str>) -> Option<(String, String)> {
    let token = token.map(str::trim).filter(|t| !t.is_empty())?;
    let email = email.map(str::trim).filter(|e| !e.is_empty())?;
    Some((token.to_string(), email.to_string()))
}

async fn invalid_reset_link(session: &Session) -> Response {
    Flash::error("Invalid or missing reset token.")
        .push(session)
        .await;
    Redirect::to(LOGIN).into_response()
}

async fn reset_password_page(
    State(state): State<AppState>,
    Query(query): Query<ResetPasswordQuery>,
    session: Session,
) -> Response {
    let Some((token, email)) = reset_credentials(query.token.as_deref(), query.email.as_deref())
    else {
        return invalid_reset_link(&session).await;
    };

    ResetPasswordTemplate {
        institution: state.config.institution_name.clone(),
        short_name: state.config.institution_short_name.clone(),
        flash: Flash::take(&session).await,
        token,
        email,
    }
    .into_response()
}

async fn reset_password(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<ResetPasswordForm>,
) -> Response {
    let Some((token, email)) = reset_credentials(Some(&form.token), Some(&form.email)) else {
        return invalid_reset_link(&session).await;
    };

    match state
        .api
        .reset_password(&token, &email, &form.new_password)
        .await
    {
        Ok(message) => {
            Flash::success(message.unwrap_or_else(|| "Password reset successful!".to_string()))
                .push(&session)
                .await;
            Redirect::to(LOGIN).into_response()
        }
        Err(e) => {
            tracing::warn!(error = %e, "Password reset failed");
            ResetPasswordTemplate {
                institution: state.config.institution_name.clone(),
                short_name: state.config.institution_short_name.clone(),
                flash: Some(Flash::error(e.notice())),
                token,
                email,
            }
            .into_response()
        }
    }
}

// Review queue

/// One pending application as listed in the admin table
#[derive(Debug, Clone)]
pub struct AdminRow {
    pub index: usize,
    pub id: String,
    pub student_id: String,
    pub name: String,
    pub email: String,
    pub program: String,
    pub trx_id: String,
    pub amount: String,
    pub submitted: String,
    pub card_type: &'static str,
}

impl AdminRow {
    fn new(index: usize, app: &Application) -> Self {
        Self {
            index,
            id: app.id.clone(),
            student_id: app.student_id.clone(),
            name: app.full_name(),
            email: app.email.clone(),
            program: or_na(app.program.as_deref()),
            trx_id: or_na(app.trx_id.as_deref()),
            amount: or_na(app.amount.as_deref()),
            submitted: format_timestamp(app.created_at),
            card_type: app.card_type.badge_label(),
        }
    }
}

#[derive(Template)]
#[template(path = "admin_dashboard.html")]
struct AdminDashboardTemplate {
    institution: String,
    short_name: String,
    flash: Option<Flash>,
    query: String,
    total_pending: usize,
    page: Page<AdminRow>,
    previous_href: Option<String>,
    next_href: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DashboardQuery {
    #[serde(default)]
    q: String,
    page: Option<usize>,
}

fn dashboard_href(query: &str, page: usize) -> String {
    let mut params = url::form_urlencoded::Serializer::new(String::new());
    if !query.trim().is_empty() {
        params.append_pair("q", query.trim());
    }
    params.append_pair("page", &page.to_string());
    format!("{}?{}", DASHBOARD, params.finish())
}

/// Filters and paginates the pending list
fn review_page(applications: &[Application], query: &str, requested: usize) -> Page<AdminRow> {
    let page = Page::of(review_queue::filter(applications, query), requested, PER_PAGE);
    let mut index = page.first_index();
    page.map(|app| {
        let row = AdminRow::new(index, app);
        index += 1;
        row
    })
}

async fn dashboard(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminSession>,
    Query(query): Query<DashboardQuery>,
    session: Session,
) -> Response {
    let mut flash = Flash::take(&session).await;

    let applications = match state.api.pending_applications(&admin).await {
        Ok(applications) => applications,
        Err(PortalApiError::Unauthorized) => return expire_admin(&session).await,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load pending applications");
            flash = Some(Flash::error(e.notice()));
            Vec::new()
        }
    };

    let page = review_page(&applications, &query.q, query.page.unwrap_or(1));

    AdminDashboardTemplate {
        institution: state.config.institution_name.clone(),
        short_name: state.config.institution_short_name.clone(),
        flash,
        previous_href: page
            .has_previous()
            .then(|| dashboard_href(&query.q, page.number - 1)),
        next_href: page
            .has_next()
            .then(|| dashboard_href(&query.q, page.number + 1)),
        query: query.q.trim().to_string(),
        total_pending: applications.len(),
        page,
    }
    .into_response()
}

#[derive(Deserialize)]
struct RejectForm {
    #[serde(default)]
    reason: String,
}

async fn apply_review(
    state: &AppState,
    admin: &AdminSession,
    session: &Session,
    application_id: &str,
    action: ReviewAction,
) -> Response {
    match state.api.review(admin, application_id, &action).await {
        Ok(()) => {
            Flash::success(format!("Application {} successfully!", action.past_tense()))
                .push(session)
                .await;
        }
        Err(PortalApiError::Unauthorized) => return expire_admin(session).await,
        Err(e) => {
            tracing::warn!(application_id = %application_id, error = %e, "Review action failed");
            Flash::error(e.notice()).push(session).await;
        }
    }

    Redirect::to(DASHBOARD).into_response()
}

async fn approve(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminSession>,
    Path(application_id): Path<String>,
    session: Session,
) -> Response {
    apply_review(&state, &admin, &session, &application_id, ReviewAction::Approve).await
}

async fn reject(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminSession>,
    Path(application_id): Path<String>,
    session: Session,
    Form(form): Form<RejectForm>,
) -> Response {
    let reason = form.reason.trim();
    if reason.is_empty() {
        Flash::error("Please provide a reason for rejection")
            .push(&session)
            .await;
        return Redirect::to(DASHBOARD).into_response();
    }

    let action = ReviewAction::Reject {
        reason: reason.to_string(),
    };
    apply_review(&state, &admin, &session, &application_id, action).await
}

// Application details

pub struct AttachmentLink {
    pub label: &'static str,
    pub url: String,
}

/// Every field of an application, formatted for display
pub struct DetailView {
    pub id: String,
    pub student_id: String,
    pub full_name: String,
    pub email: String,
    pub program: String,
    pub trx_id: String,
    pub amount: String,
    pub payment_status: String,
    pub request_type: String,
    pub card_type: &'static str,
    pub status: &'static str,
    pub is_pending: bool,
    pub rejection_reason: Option<String>,
    pub created: String,
    pub updated: String,
    pub approved: Option<String>,
    pub attachments: Vec<AttachmentLink>,
}

impl DetailView {
    fn new(app: &Application, attachment_url: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            id: app.id.clone(),
            student_id: app.student_id.clone(),
            full_name: app.full_name(),
            email: or_na(Some(app.email.as_str())),
            program: or_na(app.program.as_deref()),
            trx_id: or_na(app.trx_id.as_deref()),
            amount: or_na(app.amount.as_deref()),
            payment_status: or_na(app.payment_status.as_deref()),
            request_type: or_na(app.request_type.map(|r| r.as_str())),
            card_type: app.card_type.as_str(),
            status: app.status.as_str(),
            is_pending: app.status == ApplicationStatus::Pending,
            rejection_reason: app.rejection_reason.clone(),
            created: format_timestamp(app.created_at),
            updated: format_timestamp(app.updated_at),
            approved: app.approved_at.map(|at| format_timestamp(Some(at))),
            attachments: app
                .attachments()
                .into_iter()
                .filter_map(|(label, file)| {
                    attachment_url(file).map(|url| AttachmentLink { label, url })
                })
                .collect(),
        }
    }
}

#[derive(Template)]
#[template(path = "application_detail.html")]
struct ApplicationDetailTemplate {
    institution: String,
    short_name: String,
    flash: Option<Flash>,
    detail: DetailView,
}

async fn application_detail(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminSession>,
    Path(student_id): Path<String>,
    session: Session,
) -> Response {
    match state.api.application(&admin, &student_id).await {
        Ok(app) => {
            let loader = state.exporter.asset_loader();
            let detail = DetailView::new(&app, |file| {
                loader.photo_url(file).ok().map(|url| url.to_string())
            });

            ApplicationDetailTemplate {
                institution: state.config.institution_name.clone(),
                short_name: state.config.institution_short_name.clone(),
                flash: Flash::take(&session).await,
                detail,
            }
            .into_response()
        }
        Err(PortalApiError::Unauthorized) => expire_admin(&session).await,
        Err(e) => {
            tracing::warn!(student_id = %student_id, error = %e, "Failed to load application details");
            let notice = match &e {
                PortalApiError::Rejected(r) if r.status == 404 => {
                    format!("Application {} not found", student_id)
                }
                _ => e.notice(),
            };
            Flash::error(notice).push(&session).await;
            Redirect::to(DASHBOARD).into_response()
        }
    }
}

/// Creates the admin console router
pub fn router() -> Router<AppState> {
    let protected = Router::new()
        .route("/admin/dashboard", get(dashboard))
        .route("/admin/application/:id/approve", post(approve))
        .route("/admin/application/:id/reject", post(reject))
        .route("/admin/application/:id", get(application_detail))
        .route_layer(middleware::from_fn(require_admin));

    Router::new()
        .route("/admin/login", get(login_page).post(login))
        .route("/admin/logout", get(logout))
        .route(
            "/admin/forgot-password",
            get(forgot_password_page).post(forgot_password),
        )
        .route("/reset-password", get(reset_password_page).post(reset_password))
        .merge(protected)
}
