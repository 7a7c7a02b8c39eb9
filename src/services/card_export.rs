use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::models::application::Application;
use crate::services::asset_loader::{AssetLoader, PhotoAsset};
use crate::services::card_template::CardTemplate;
use crate::services::document::{self, PackageError};
use crate::services::rasterizer::{RasterizeError, Rasterizer};
use crate::services::render_target::RenderHost;
use crate::services::validity;

#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    #[error("Card for {0} is outside its validity window")]
    ValidityExpired(String),

    #[error("Rasterization failed: {0}")]
    Rasterize(#[from] RasterizeError),

    #[error("PDF packaging failed: {0}")]
    Package(#[from] PackageError),

    #[error("Render worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// A finished card export
#[derive(Debug, Clone)]
pub struct ExportedCard {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Runs the load, layout, rasterize and package steps for one card
#[derive(Debug, Clone)]
pub struct CardExporter {
    loader: AssetLoader,
    template: CardTemplate,
    rasterizer: Rasterizer,
    host: RenderHost,
    file_prefix: String,
}

impl CardExporter {
    pub fn new(
        loader: AssetLoader,
        template: CardTemplate,
        rasterizer: Rasterizer,
        host: RenderHost,
        file_prefix: impl Into<String>,
    ) -> Self {
        Self {
            loader,
            template,
            rasterizer,
            host,
            file_prefix: file_prefix.into(),
        }
    }

    pub fn asset_loader(&self) -> &AssetLoader {
        &self.loader
    }

    pub fn render_host(&self) -> &RenderHost {
        &self.host
    }

    /// `<prefix>-<studentId>.pdf`
    pub fn filename_for(&self, student_id: &str) -> String {
        format!("{}-{}.pdf", self.file_prefix, student_id)
    }

    /// Exports the card for a snapshot of the application taken at `now`
    #[tracing::instrument(skip(self, application, now), fields(student_id = %application.student_id))]
    pub async fn export(
        &self,
        application: &Application,
        now: DateTime<Utc>,
    ) -> Result<ExportedCard, ExportError> {
        let start_time = Instant::now();

        if !validity::is_exportable(application, now) {
            tracing::warn!(status = %application.status.as_str(), "Export refused outside validity window");
            return Err(ExportError::ValidityExpired(application.student_id.clone()));
        }

        let load_start = Instant::now();
        let photo = self.loader.load(application.photo.as_deref()).await;
        tracing::debug!(
            placeholder = matches!(photo, PhotoAsset::Placeholder),
            load_duration_ms = load_start.elapsed().as_millis(),
            "Photo resolved"
        );

        let mut target = self.host.acquire();
        target.populate(self.template.build(application, &photo, now));

        let filename = self.filename_for(&application.student_id);
        let title = filename.trim_end_matches(".pdf").to_string();
        let rasterizer = self.rasterizer.clone();
        let span = tracing::Span::current();

        // Runs off the async workers; the target is released on that thread
        let (bytes, raster_duration, package_duration) =
            tokio::task::spawn_blocking(move || {
                span.in_scope(|| -> Result<_, ExportError> {
                    let raster_start = Instant::now();
                    let raster = rasterizer.rasterize(&target)?;
                    let raster_duration = raster_start.elapsed();
                    drop(target);

                    let package_start = Instant::now();
                    let bytes = document::package(&raster, &title)?;
                    Ok((bytes, raster_duration, package_start.elapsed()))
                })
            })
            .await??;

        tracing::info!(
            filename = %filename,
            bytes = bytes.len(),
            raster_duration_ms = raster_duration.as_millis(),
            package_duration_ms = package_duration.as_millis(),
            total_duration_ms = start_time.elapsed().as_millis(),
            "Card exported"
        );

        Ok(ExportedCard { filename, bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::application::{ApplicationStatus, CardCategory};
    use crate::services::card_template::CardBranding;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn exporter() -> CardExporter {
        CardExporter::new(
            AssetLoader::with_client(reqwest::Client::new(), "http://127.0.0.1:9/uploads"),
            CardTemplate::new(CardBranding {
                institution_name: "Bangladesh University of Business and Technology".to_string(),
                short_name: "BUBT".to_string(),
            }),
            Rasterizer::with_fontdb(Arc::new(usvg::fontdb::Database::new())),
            RenderHost::new(),
            "BUBT-ID-Card",
        )
    }

    fn application(status: ApplicationStatus, approved_at: Option<DateTime<Utc>>) -> Application {
        Application {
            id: "rec42".to_string(),
            student_id: "22235103042".to_string(),
            first_name: "Tanvir".to_string(),
            last_name: "Hasan".to_string(),
            email: "tanvir@cse.bubt.edu.bd".to_string(),
            card_type: CardCategory::Student,
            request_type: None,
            program: Some("EEE".to_string()),
            trx_id: Some("TRX42".to_string()),
            amount: Some("300".to_string()),
            payment_status: None,
            photo: None,
            gd_copy: None,
            old_id_image: None,
            status,
            rejection_reason: None,
            created_at: None,
            updated_at: None,
            approved_at,
        }
    }

    fn approved() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 10, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_filename_uses_prefix_and_student_id() {
        assert_eq!(
            exporter().filename_for("22235103042"),
            "BUBT-ID-Card-22235103042.pdf"
        );
    }

    #[tokio::test]
    async fn test_pending_application_is_not_exported() {
        let exporter = exporter();
        let app = application(ApplicationStatus::Pending, None);

        let result = exporter.export(&app, approved()).await;
        assert!(matches!(result, Err(ExportError::ValidityExpired(_))));
        assert_eq!(exporter.render_host().live_targets(), 0);
    }

    #[tokio::test]
    async fn test_expired_application_is_not_exported() {
        let exporter = exporter();
        let app = application(ApplicationStatus::Approved, Some(approved()));

        let result = exporter.export(&app, approved() + Duration::days(4)).await;
        assert!(matches!(result, Err(ExportError::ValidityExpired(_))));
    }

    #[tokio::test]
    async fn test_export_without_photo_produces_pdf() {
        let exporter = exporter();
        let app = application(ApplicationStatus::Approved, Some(approved()));

        let card = exporter
            .export(&app, approved() + Duration::hours(5))
            .await
            .unwrap();

        assert_eq!(card.filename, "BUBT-ID-Card-22235103042.pdf");
        assert!(card.bytes.starts_with(b"%PDF-"));
        assert_eq!(exporter.render_host().live_targets(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_exports_render_off_the_runtime() {
        let exporter = exporter();
        let app = application(ApplicationStatus::Approved, Some(approved()));
        let now = approved() + Duration::hours(5);

        let (first, second) = tokio::join!(exporter.export(&app, now), exporter.export(&app, now));

        assert_eq!(first.unwrap().bytes, second.unwrap().bytes);
        assert_eq!(exporter.render_host().live_targets(), 0);
    }
}
