//! ID-card layout.
//!
//! The card is described as an SVG document in millimetre user units with a
//! fixed 85 x 54 mm canvas. Building the layout is pure: the same
//! application, photo and clock always produce the same bytes.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use html_escape::{encode_double_quoted_attribute, encode_text};

use crate::models::application::Application;
use crate::services::asset_loader::PhotoAsset;
use crate::services::validity;

pub const CARD_WIDTH_MM: f32 = 85.0;
pub const CARD_HEIGHT_MM: f32 = 54.0;

/// Marker id carried by the placeholder photo box
pub const PLACEHOLDER_ID: &str = "photo-placeholder";

const NAVY: &str = "#1e3a8a";
const BLUE: &str = "#1e40af";
const RED: &str = "#dc2626";
const SLATE: &str = "#374151";
const GREY: &str = "#6b7280";
const RULE: &str = "#d1d5db";

const FONT_FAMILY: &str = "Arial, Helvetica, sans-serif";

// Geometry, in millimetres
const PADDING: f32 = 2.1;
const LOGO_DIAMETER: f32 = 9.3;
const HEADER_RULE_Y: f32 = 13.2;
const PHOTO_X: f32 = 3.0;
const PHOTO_Y: f32 = 15.0;
const PHOTO_SIZE: f32 = 19.8;
const DETAILS_X: f32 = 26.0;
const DETAILS_WIDTH: f32 = CARD_WIDTH_MM - DETAILS_X - PADDING - 1.0;
const FOOTER_RULE_Y: f32 = 47.6;

/// Display names for program codes. Unknown codes are printed as-is.
const PROGRAM_NAMES: &[(&str, &str)] = &[
    ("CSE", "B.Sc. Engg. in CSE"),
    ("EEE", "B.Sc. Engg. in EEE"),
    ("BBA", "Bachelor of Business Administration"),
    ("English", "BA in English"),
    ("Law", "LLB"),
    ("computer-science", "B.Sc. Engg. in CSE"),
    ("business", "BBA"),
    ("engineering", "B.Sc. Engineering"),
    ("arts", "BA"),
    ("medicine", "MBBS"),
];

pub fn program_display_name(code: &str) -> &str {
    PROGRAM_NAMES
        .iter()
        .find(|(k, _)| *k == code)
        .map(|(_, name)| *name)
        .unwrap_or(code)
}

/// Institution details printed on every card
#[derive(Debug, Clone)]
pub struct CardBranding {
    pub institution_name: String,
    pub short_name: String,
}

impl CardBranding {
    /// Splits the institution name over the two header lines
    fn header_lines(&self) -> (String, Option<String>) {
        let name = self.institution_name.trim();
        if let Some(idx) = name.find(" of ") {
            let (first, rest) = name.split_at(idx + " of".len());
            return (first.to_string(), Some(rest.trim().to_string()));
        }

        let words: Vec<&str> = name.split_whitespace().collect();
        if words.len() < 3 {
            return (name.to_string(), None);
        }
        let mid = words.len().div_ceil(2);
        (words[..mid].join(" "), Some(words[mid..].join(" ")))
    }
}

/// A populated card layout, ready for rasterization
#[derive(Debug, Clone)]
pub struct CardLayout {
    pub(crate) svg: String,
    pub(crate) image_hrefs: Vec<String>,
    pub(crate) uses_placeholder: bool,
}

impl CardLayout {
    pub fn svg(&self) -> &str {
        &self.svg
    }

    /// Every image reference in the layout
    pub fn image_hrefs(&self) -> &[String] {
        &self.image_hrefs
    }

    pub fn uses_placeholder(&self) -> bool {
        self.uses_placeholder
    }
}

#[derive(Debug, Clone)]
pub struct CardTemplate {
    branding: CardBranding,
}

impl CardTemplate {
    pub fn new(branding: CardBranding) -> Self {
        Self { branding }
    }

    /// Builds the card for one application snapshot
    pub fn build(&self, app: &Application, photo: &PhotoAsset, now: DateTime<Utc>) -> CardLayout {
        let mut svg = String::with_capacity(4096);
        let mut image_hrefs = Vec::new();

        let _ = write!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}mm" height="{h}mm" viewBox="0 0 {w} {h}" font-family="{font}">"#,
            w = CARD_WIDTH_MM,
            h = CARD_HEIGHT_MM,
            font = FONT_FAMILY,
        );
        svg.push_str(concat!(
            r#"<defs><linearGradient id="card-bg" x1="0" y1="0" x2="1" y2="1">"#,
            r##"<stop offset="0" stop-color="#ffffff"/><stop offset="1" stop-color="#f0f9ff"/>"##,
            r#"</linearGradient>"#,
        ));
        let _ = write!(
            svg,
            r#"<clipPath id="photo-clip"><rect x="{x}" y="{y}" width="{s}" height="{s}" rx="1.3"/></clipPath></defs>"#,
            x = PHOTO_X,
            y = PHOTO_Y,
            s = PHOTO_SIZE,
        );

        // Card body
        let _ = write!(
            svg,
            r#"<rect x="0.3" y="0.3" width="{}" height="{}" rx="2.1" fill="url(#card-bg)" stroke="{}" stroke-width="0.53"/>"#,
            CARD_WIDTH_MM - 0.6,
            CARD_HEIGHT_MM - 0.6,
            BLUE,
        );

        self.write_header(&mut svg);

        let uses_placeholder = match photo {
            PhotoAsset::Loaded(image) => {
                let _ = write!(
                    svg,
                    r#"<image id="photo" x="{x}" y="{y}" width="{s}" height="{s}" preserveAspectRatio="xMidYMid slice" clip-path="url(#photo-clip)" xlink:href="{href}"/>"#,
                    x = PHOTO_X,
                    y = PHOTO_Y,
                    s = PHOTO_SIZE,
                    href = encode_double_quoted_attribute(image.data_uri()),
                );
                image_hrefs.push(image.data_uri().to_string());
                false
            }
            PhotoAsset::Placeholder => {
                let _ = write!(
                    svg,
                    r##"<g id="{id}"><rect x="{x}" y="{y}" width="{s}" height="{s}" rx="1.3" fill="#e5e7eb"/>"##,
                    id = PLACEHOLDER_ID,
                    x = PHOTO_X,
                    y = PHOTO_Y,
                    s = PHOTO_SIZE,
                );
                let _ = write!(
                    svg,
                    r#"<text x="{cx}" y="{cy}" font-size="2.4" font-weight="bold" fill="{fill}" text-anchor="middle">PHOTO</text></g>"#,
                    cx = PHOTO_X + PHOTO_SIZE / 2.0,
                    cy = PHOTO_Y + PHOTO_SIZE / 2.0 + 0.8,
                    fill = GREY,
                );
                true
            }
        };
        let _ = write!(
            svg,
            r#"<rect x="{x}" y="{y}" width="{s}" height="{s}" rx="1.3" fill="none" stroke="{stroke}" stroke-width="0.53"/>"#,
            x = PHOTO_X,
            y = PHOTO_Y,
            s = PHOTO_SIZE,
            stroke = BLUE,
        );

        // Category badge under the photo
        let badge_y = PHOTO_Y + PHOTO_SIZE + 0.9;
        let _ = write!(
            svg,
            r##"<rect id="category-badge" x="{x}" y="{y}" width="{s}" height="3.4" rx="0.8" fill="#fef2f2"/>"##,
            x = PHOTO_X,
            y = badge_y,
            s = PHOTO_SIZE,
        );
        let _ = write!(
            svg,
            r#"<text x="{cx}" y="{ty}" font-size="2.4" font-weight="bold" fill="{fill}" text-anchor="middle">{label}</text>"#,
            cx = PHOTO_X + PHOTO_SIZE / 2.0,
            ty = badge_y + 2.5,
            fill = RED,
            label = app.card_type.badge_label(),
        );

        self.write_details(&mut svg, app, now);

        // Bottom band
        let _ = write!(
            svg,
            r#"<line x1="{x1}" y1="{y}" x2="{x2}" y2="{y}" stroke="{stroke}" stroke-width="0.26"/>"#,
            x1 = PADDING,
            x2 = CARD_WIDTH_MM - PADDING,
            y = FOOTER_RULE_Y,
            stroke = RULE,
        );
        let _ = write!(
            svg,
            r#"<text x="{cx}" y="{y}" font-size="2.65" font-weight="bold" fill="{fill}" text-anchor="middle" letter-spacing="0.26">{name} ID CARD</text>"#,
            cx = CARD_WIDTH_MM / 2.0,
            y = FOOTER_RULE_Y + 3.6,
            fill = NAVY,
            name = encode_text(&self.branding.short_name.to_uppercase()),
        );

        svg.push_str("</svg>");

        CardLayout {
            svg,
            image_hrefs,
            uses_placeholder,
        }
    }

    fn write_header(&self, svg: &mut String) {
        let r = LOGO_DIAMETER / 2.0;
        let cx = PADDING + 0.9 + r;
        let cy = PADDING + 0.9 + r;
        let _ = write!(
            svg,
            r#"<circle cx="{cx}" cy="{cy}" r="{r}" fill="{fill}"/>"#,
            fill = NAVY,
        );
        let _ = write!(
            svg,
            r#"<text x="{cx}" y="{ty}" font-size="2.65" font-weight="bold" fill="white" text-anchor="middle">{name}</text>"#,
            ty = cy + 0.9,
            name = encode_text(&self.branding.short_name),
        );

        let text_x = cx + r + 2.1;
        let (first, second) = self.branding.header_lines();
        let _ = write!(
            svg,
            r#"<text x="{text_x}" y="{y}" font-size="3.175" font-weight="bold" fill="{fill}">{line}</text>"#,
            y = PADDING + 4.6,
            fill = NAVY,
            line = encode_text(&first),
        );
        if let Some(second) = second {
            let _ = write!(
                svg,
                r#"<text x="{text_x}" y="{y}" font-size="2.9" font-weight="bold" fill="{fill}">{line}</text>"#,
                y = PADDING + 8.3,
                fill = NAVY,
                line = encode_text(&second),
            );
        }

        let _ = write!(
            svg,
            r#"<line x1="{x1}" y1="{y}" x2="{x2}" y2="{y}" stroke="{stroke}" stroke-width="0.53"/>"#,
            x1 = PADDING,
            x2 = CARD_WIDTH_MM - PADDING,
            y = HEADER_RULE_Y,
            stroke = BLUE,
        );
    }

    fn write_details(&self, svg: &mut String, app: &Application, now: DateTime<Utc>) {
        let mut y = PHOTO_Y + 2.6;

        write_fitted_text(
            svg,
            "name",
            y,
            3.175,
            "bold",
            NAVY,
            &encode_text(&app.full_name()),
            app.full_name().chars().count(),
        );
        let _ = write!(
            svg,
            r#"<line x1="{x1}" y1="{ly}" x2="{x2}" y2="{ly}" stroke="{stroke}" stroke-width="0.26"/>"#,
            x1 = DETAILS_X,
            x2 = DETAILS_X + DETAILS_WIDTH,
            ly = y + 1.1,
            stroke = RULE,
        );
        y += 4.6;

        if let Some(program) = app.program.as_deref() {
            let text = format!("Program: {}", program_display_name(program));
            write_labelled(svg, "program", y, 2.4, "Program:", program_display_name(program), text.chars().count());
            y += 3.2;
        }

        let id_text = format!("ID: {}", app.student_id);
        write_labelled(svg, "student-id", y, 2.4, "ID:", &app.student_id, id_text.chars().count());
        y += 3.2;

        let email_text = format!("Email: {}", app.email);
        write_labelled(svg, "email", y, 2.1, "Email:", &app.email, email_text.chars().count());

        // Validity footer
        let rule_y = 39.0;
        let _ = write!(
            svg,
            r#"<line x1="{x1}" y1="{rule_y}" x2="{x2}" y2="{rule_y}" stroke="{stroke}" stroke-width="0.26" stroke-dasharray="0.8 0.5"/>"#,
            x1 = DETAILS_X,
            x2 = DETAILS_X + DETAILS_WIDTH,
            stroke = RULE,
        );

        let center = DETAILS_X + DETAILS_WIDTH / 2.0;
        let days = validity::countdown(app, now);
        let _ = write!(
            svg,
            r#"<text id="validity" x="{center}" y="{y}" font-size="1.85" font-weight="bold" fill="{fill}" text-anchor="middle">Valid for: {days} days • Temporary ID</text>"#,
            y = rule_y + 2.7,
            fill = RED,
        );
        let issued = app
            .validity_anchor()
            .map(|at| at.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "N/A".to_string());
        let _ = write!(
            svg,
            r#"<text id="issued" x="{center}" y="{y}" font-size="1.6" fill="{fill}" text-anchor="middle">Issued: {issued}</text>"#,
            y = rule_y + 4.9,
            fill = GREY,
        );
    }
}

/// Average glyph advance as a fraction of the font size
const GLYPH_ADVANCE: f32 = 0.55;

/// Extra attributes that squeeze text into the details column when it
/// would overflow
fn fit_attrs(char_count: usize, font_size: f32) -> String {
    let estimated = char_count as f32 * font_size * GLYPH_ADVANCE;
    if estimated > DETAILS_WIDTH {
        format!(
            r#" textLength="{}" lengthAdjust="spacingAndGlyphs""#,
            DETAILS_WIDTH
        )
    } else {
        String::new()
    }
}

#[allow(clippy::too_many_arguments)]
fn write_fitted_text(
    svg: &mut String,
    id: &str,
    y: f32,
    font_size: f32,
    weight: &str,
    fill: &str,
    escaped: &str,
    char_count: usize,
) {
    let _ = write!(
        svg,
        r#"<text id="{id}" x="{x}" y="{y}" font-size="{font_size}" font-weight="{weight}" fill="{fill}"{fit}>{escaped}</text>"#,
        x = DETAILS_X,
        fit = fit_attrs(char_count, font_size),
    );
}

fn write_labelled(
    svg: &mut String,
    id: &str,
    y: f32,
    font_size: f32,
    label: &str,
    value: &str,
    char_count: usize,
) {
    let _ = write!(
        svg,
        r#"<text id="{id}" x="{x}" y="{y}" font-size="{font_size}" fill="{fill}"{fit}><tspan font-weight="bold">{label}</tspan> {value}</text>"#,
        x = DETAILS_X,
        fill = SLATE,
        fit = fit_attrs(char_count, font_size),
        label = encode_text(label),
        value = encode_text(value),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::application::{ApplicationStatus, CardCategory};
    use crate::services::asset_loader::EmbeddedImage;
    use chrono::{Duration, TimeZone};

    fn template() -> CardTemplate {
        CardTemplate::new(CardBranding {
            institution_name: "Bangladesh University of Business and Technology".to_string(),
            short_name: "BUBT".to_string(),
        })
    }

    fn approved_app() -> Application {
        Application {
            id: "rec1".to_string(),
            student_id: "22235103001".to_string(),
            first_name: "Nusrat".to_string(),
            last_name: "Jahan".to_string(),
            email: "nusrat@cse.bubt.edu.bd".to_string(),
            card_type: CardCategory::Student,
            request_type: None,
            program: Some("CSE".to_string()),
            trx_id: Some("TRX9001".to_string()),
            amount: Some("300".to_string()),
            payment_status: None,
            photo: None,
            gd_copy: None,
            old_id_image: None,
            status: ApplicationStatus::Approved,
            rejection_reason: None,
            created_at: None,
            updated_at: None,
            approved_at: Some(Utc.with_ymd_and_hms(2026, 10, 18, 6, 0, 0).unwrap()),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 6, 0, 0).unwrap() + Duration::hours(20)
    }

    #[test]
    fn test_layout_contains_identity_fields() {
        let layout = template().build(&approved_app(), &PhotoAsset::Placeholder, now());
        let svg = layout.svg();

        assert!(svg.contains(r#"width="85mm" height="54mm""#));
        assert!(svg.contains("Nusrat Jahan"));
        assert!(svg.contains("B.Sc. Engg. in CSE"));
        assert!(svg.contains("22235103001"));
        assert!(svg.contains("nusrat@cse.bubt.edu.bd"));
        assert!(svg.contains(">Student<"));
        assert!(svg.contains("Valid for: 3 days"));
        assert!(svg.contains("Issued: 2026-10-18"));
        assert!(svg.contains("BUBT ID CARD"));
    }

    #[test]
    fn test_placeholder_marker_without_photo() {
        let layout = template().build(&approved_app(), &PhotoAsset::Placeholder, now());

        assert!(layout.uses_placeholder());
        assert!(layout.svg().contains(PLACEHOLDER_ID));
        assert!(layout.svg().contains(">PHOTO<"));
        assert!(layout.image_hrefs().is_empty());
    }

    #[test]
    fn test_loaded_photo_is_embedded() {
        let photo = PhotoAsset::Loaded(EmbeddedImage::from_png_bytes(&[0x89, b'P', b'N', b'G'], 1, 1));
        let layout = template().build(&approved_app(), &photo, now());

        assert!(!layout.uses_placeholder());
        assert!(!layout.svg().contains(PLACEHOLDER_ID));
        assert_eq!(layout.image_hrefs().len(), 1);
        assert!(layout.image_hrefs()[0].starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_program_line_omitted_when_absent() {
        let mut app = approved_app();
        app.program = None;
        let layout = template().build(&app, &PhotoAsset::Placeholder, now());

        assert!(!layout.svg().contains("Program:"));
        assert!(!layout.svg().contains(r#"id="program""#));
    }

    #[test]
    fn test_unmapped_program_passes_through() {
        assert_eq!(program_display_name("Pharmacy"), "Pharmacy");
        assert_eq!(program_display_name("business"), "BBA");
    }

    #[test]
    fn test_user_text_is_escaped() {
        let mut app = approved_app();
        app.first_name = "<script>".to_string();
        app.last_name = "O'Neil & Co".to_string();
        let layout = template().build(&app, &PhotoAsset::Placeholder, now());

        assert!(!layout.svg().contains("<script>"));
        assert!(layout.svg().contains("&lt;script&gt;"));
        assert!(layout.svg().contains("&amp; Co"));
    }

    #[test]
    fn test_build_is_deterministic() {
        let app = approved_app();
        let a = template().build(&app, &PhotoAsset::Placeholder, now());
        let b = template().build(&app, &PhotoAsset::Placeholder, now());
        assert_eq!(a.svg(), b.svg());
    }

    #[test]
    fn test_pending_application_shows_zero_days() {
        let mut app = approved_app();
        app.status = ApplicationStatus::Pending;
        app.approved_at = None;
        let layout = template().build(&app, &PhotoAsset::Placeholder, now());

        assert!(layout.svg().contains("Valid for: 0 days"));
        assert!(layout.svg().contains("Issued: N/A"));
    }

    #[test]
    fn test_header_lines_split_on_of() {
        let (first, second) = template().branding.header_lines();
        assert_eq!(first, "Bangladesh University of");
        assert_eq!(second.as_deref(), Some("Business and Technology"));
    }

    #[test]
    fn test_long_email_is_fitted() {
        let mut app = approved_app();
        app.email = "a.very.long.address.for.testing.purposes@cse.bubt.edu.bd".to_string();
        let layout = template().build(&app, &PhotoAsset::Placeholder, now());
        assert!(layout.svg().contains("lengthAdjust"));
    }
}
