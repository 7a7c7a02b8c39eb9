use askama::Template;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::api::middleware::auth::{get_signed_in_student, AuthError};
use crate::api::middleware::session::{AppState, Flash, SESSION_KEY_LAST_SUBMISSION};
use crate::error::AppError;
use crate::models::application::{Application, ApplicationStatus};
use crate::models::card_request::{
    CardRequest, CardRequestForm, FieldError, Program, Upload, MAX_UPLOAD_BYTES,
};
use crate::services::asset_loader::embed_photo;
use crate::services::card_export::{ExportError, ExportedCard};
use crate::services::card_template::program_display_name;
use crate::services::oauth::google::GoogleIdentity;
use crate::services::portal_api::{PortalApiError, RejectionKind};
use crate::services::validity;

/// Three attachments plus the text fields
const MAX_FORM_BYTES: usize = 3 * MAX_UPLOAD_BYTES + 64 * 1024;

const EXPORT_FAILED: &str = "Error generating ID card. Please try again.";

#[derive(Debug)]
pub enum DashboardError {
    Auth(AuthError),
    Multipart(String),
}

impl IntoResponse for DashboardError {
    fn into_response(self) -> Response {
        match self {
            DashboardError::Auth(e) => e.into_response(),
            DashboardError::Multipart(msg) => (
                StatusCode::BAD_REQUEST,
                format!("Invalid form submission: {}", msg),
            )
                .into_response(),
        }
    }
}

impl From<AuthError> for DashboardError {
    fn from(e: AuthError) -> Self {
        DashboardError::Auth(e)
    }
}

/// Text values echoed back into the request form
#[derive(Debug, Clone)]
pub struct FormValues {
    pub student_id: String,
    pub card_type: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub program: String,
    pub trx_id: String,
    pub amount: String,
    pub request_type: String,
}

impl Default for FormValues {
    fn default() -> Self {
        Self {
            student_id: String::new(),
            card_type: "student".to_string(),
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            program: String::new(),
            trx_id: String::new(),
            amount: String::new(),
            request_type: "new".to_string(),
        }
    }
}

impl From<&CardRequestForm> for FormValues {
    fn from(form: &CardRequestForm) -> Self {
        let or_default = |value: &str, default: &str| {
            if value.trim().is_empty() {
                default.to_string()
            } else {
                value.to_string()
            }
        };

        Self {
            student_id: form.student_id.clone(),
            card_type: or_default(&form.card_type, "student"),
            first_name: form.first_name.clone(),
            last_name: form.last_name.clone(),
            email: form.email.clone(),
            program: form.program.clone(),
            trx_id: form.trx_id.clone(),
            amount: form.amount.clone(),
            request_type: or_default(&form.request_type, "new"),
        }
    }
}

pub struct ProgramOption {
    pub code: &'static str,
    pub label: &'static str,
}

/// One application as listed on the student dashboard
#[derive(Debug, Clone)]
pub struct ApplicationRow {
    pub student_id: String,
    pub name: String,
    pub email: String,
    pub program: Option<String>,
    pub approved_on: String,
    pub status_label: String,
    pub status_class: &'static str,
    pub rejection_reason: Option<String>,
    pub days_left: u32,
    pub exportable: bool,
}

/// Cards are only handed to the account that requested them
fn belongs_to(app: &Application, student: &GoogleIdentity) -> bool {
    app.email.trim().eq_ignore_ascii_case(student.email.trim())
}

impl ApplicationRow {
    pub fn new(app: &Application, now: DateTime<Utc>, viewer: &GoogleIdentity) -> Self {
        let days_left = validity::countdown(app, now);
        let (status_label, status_class) = match (app.status, app.validity_anchor()) {
            (ApplicationStatus::Rejected, _) => ("Rejected".to_string(), "rejected"),
            (_, None) => (validity::status_label(app, now), "pending"),
            (_, Some(_)) if days_left > 0 => (validity::status_label(app, now), "valid"),
            (_, Some(_)) => (validity::status_label(app, now), "expired"),
        };

        Self {
            student_id: app.student_id.clone(),
            name: app.full_name(),
            email: app.email.clone(),
            program: app.program.clone(),
            approved_on: app
                .validity_anchor()
                .map(|at| at.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "Not Approved".to_string()),
            status_label,
            status_class,
            rejection_reason: app.rejection_reason.clone(),
            days_left,
            exportable: days_left > 0 && belongs_to(app, viewer),
        }
    }
}

/// What the student just sent, shown once on the applications view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionSummary {
    pub student_id: String,
    pub name: String,
    pub card_type: String,
    pub program: Option<String>,
    pub photo: Option<String>,
}

impl SubmissionSummary {
    fn new(request: &CardRequest) -> Self {
        let identity = request.identity();
        let program = match request {
            CardRequest::Student { program, .. } => {
                Some(program_display_name(program.code()).to_string())
            }
            _ => None,
        };

        Self {
            student_id: identity.student_id.clone(),
            name: format!("{} {}", identity.first_name, identity.last_name)
                .trim()
                .to_string(),
            card_type: request.category().badge_label().to_string(),
            program,
            photo: None,
        }
    }
}

/// Square preview of the uploaded photo, if it decodes
async fn photo_preview(bytes: Vec<u8>) -> Option<String> {
    match tokio::task::spawn_blocking(move || embed_photo(&bytes)).await {
        Ok(Ok(image)) => Some(image.data_uri().to_string()),
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "Uploaded photo has no preview");
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "Photo preview worker failed");
            None
        }
    }
}

/// Duplicates are conflicts, other refusals are bad requests and anything
/// else is a gateway failure
fn refusal_status(e: &PortalApiError) -> StatusCode {
    match e {
        PortalApiError::Rejected(r) => match r.kind {
            RejectionKind::DuplicateTransaction | RejectionKind::DuplicateSubject => {
                StatusCode::CONFLICT
            }
            RejectionKind::Other if r.status < 500 => StatusCode::BAD_REQUEST,
            RejectionKind::Other => StatusCode::BAD_GATEWAY,
        },
        _ => StatusCode::BAD_GATEWAY,
    }
}

#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardTemplate {
    institution: String,
    short_name: String,
    flash: Option<Flash>,
    student: GoogleIdentity,
    show_applications: bool,
    form: FormValues,
    programs: Vec<ProgramOption>,
    errors: Vec<FieldError>,
    rows: Vec<ApplicationRow>,
    load_error: Option<String>,
    submitted: Option<SubmissionSummary>,
}

impl DashboardTemplate {
    fn request_view(state: &AppState, student: GoogleIdentity, flash: Option<Flash>) -> Self {
        Self {
            institution: state.config.institution_name.clone(),
            short_name: state.config.institution_short_name.clone(),
            flash,
            student,
            show_applications: false,
            form: FormValues::default(),
            programs: Program::ALL
                .iter()
                .map(|p| ProgramOption {
                    code: p.code(),
                    label: p.form_label(),
                })
                .collect(),
            errors: Vec::new(),
            rows: Vec::new(),
            load_error: None,
            submitted: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct DashboardQuery {
    view: Option<String>,
}

/// Shows the request form or the application list
async fn dashboard(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
    session: Session,
) -> Result<DashboardTemplate, DashboardError> {
    let student = get_signed_in_student(&session).await?;
    let flash = Flash::take(&session).await;
    let mut page = DashboardTemplate::request_view(&state, student, flash);

    if query.view.as_deref() == Some("applications") {
        page.show_applications = true;
        page.submitted = session
            .remove::<SubmissionSummary>(SESSION_KEY_LAST_SUBMISSION)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to read submission summary");
                None
            });

        match state.api.list_applications().await {
            Ok(applications) => {
                let now = Utc::now();
                page.rows = applications
                    .iter()
                    .map(|app| ApplicationRow::new(app, now, &page.student))
                    .collect();
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to load applications");
                page.load_error = Some(e.notice());
            }
        }
    }

    Ok(page)
}

/// Collects the multipart request form
async fn read_form(mut multipart: Multipart) -> Result<CardRequestForm, DashboardError> {
    let mut form = CardRequestForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| DashboardError::Multipart(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "photo" | "gdCopy" | "oldIdImage" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| DashboardError::Multipart(e.to_string()))?;

                // Browsers send an empty part for an untouched file input
                if file_name.is_empty() && bytes.is_empty() {
                    continue;
                }

                let upload = Some(Upload {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
                match name.as_str() {
                    "photo" => form.photo = upload,
                    "gdCopy" => form.gd_copy = upload,
                    _ => form.old_id_image = upload,
                }
            }
            _ => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| DashboardError::Multipart(e.to_string()))?;
                match name.as_str() {
                    "studentId" => form.student_id = value,
                    "cardType" => form.card_type = value,
                    "firstName" => form.first_name = value,
                    "lastName" => form.last_name = value,
                    "email" => form.email = value,
                    "program" => form.program = value,
                    "trxId" => form.trx_id = value,
                    "amount" => form.amount = value,
                    "requestType" => form.request_type = value,
                    _ => {}
                }
            }
        }
    }

    Ok(form)
}

/// Validates the request form and forwards it to the backend
#[tracing::instrument(skip_all)]
async fn submit_request(
    State(state): State<AppState>,
    session: Session,
    multipart: Multipart,
) -> Result<Response, DashboardError> {
    let student = get_signed_in_student(&session).await?;
    let form = read_form(multipart).await?;
    let values = FormValues::from(&form);
    let photo_bytes = form.photo.as_ref().map(|upload| upload.bytes.clone());

    let request = match CardRequest::try_from(form) {
        Ok(request) => request,
        Err(errors) => {
            tracing::debug!(errors = %errors, "Card request failed validation");
            let mut page = DashboardTemplate::request_view(
                &state,
                student,
                Some(Flash::error("Please fill all required fields")),
            );
            page.form = values;
            page.errors = errors.0;
            return Ok((StatusCode::UNPROCESSABLE_ENTITY, page).into_response());
        }
    };

    let mut summary = SubmissionSummary::new(&request);

    match state.api.submit_request(request).await {
        Ok(()) => {
            if let Some(bytes) = photo_bytes {
                summary.photo = photo_preview(bytes).await;
            }
            if let Err(e) = session.insert(SESSION_KEY_LAST_SUBMISSION, &summary).await {
                tracing::warn!(error = %e, "Failed to store submission summary");
            }
            Flash::success("Application submitted successfully!")
                .push(&session)
                .await;
            Ok(Redirect::to("/dashboard?view=applications").into_response())
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                rejection = ?e.rejection_kind(),
                "Card request was not accepted"
            );
            let mut page =
                DashboardTemplate::request_view(&state, student, Some(Flash::error(e.notice())));
            page.form = values;
            Ok((refusal_status(&e), page).into_response())
        }
    }
}

async fn export_card(
    state: &AppState,
    student: &GoogleIdentity,
    student_id: &str,
) -> Result<ExportedCard, AppError> {
    let applications = state.api.list_applications().await?;
    let application = applications
        .iter()
        .find(|app| app.student_id == student_id && belongs_to(app, student))
        .ok_or_else(|| AppError::NotFound(format!("Application {}", student_id)))?;

    Ok(state.exporter.export(application, Utc::now()).await?)
}

/// Streams the ID card PDF for one application
async fn download_card(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
    session: Session,
) -> Result<Response, DashboardError> {
    let student = get_signed_in_student(&session).await?;

    match export_card(&state, &student, &student_id).await {
        Ok(card) => Ok((
            [
                (header::CONTENT_TYPE, "application/pdf".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", card.filename),
                ),
            ],
            card.bytes,
        )
            .into_response()),
        Err(e @ (AppError::NotFound(_) | AppError::Export(ExportError::ValidityExpired(_)))) => {
            tracing::warn!(student_id = %student_id, error = %e, "Card not available for export");
            Ok(e.into_response())
        }
        Err(e) => {
            tracing::error!(student_id = %student_id, error = %e, "Card export failed");
            Flash::error(EXPORT_FAILED).push(&session).await;
            Ok(Redirect::to("/dashboard?view=applications").into_response())
        }
    }
}

/// Creates the student dashboard router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route(
            "/dashboard/request",
            post(submit_request).layer(DefaultBodyLimit::max(MAX_FORM_BYTES)),
        )
        .route("/applications/:student_id/card.pdf", get(download_card))
}
