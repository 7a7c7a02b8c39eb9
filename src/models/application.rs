use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Lifecycle status of a card request. Moves only from `Pending` to one of
/// the terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardCategory {
    Student,
    Staff,
    Visitor,
}

impl CardCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardCategory::Student => "student",
            CardCategory::Staff => "staff",
            CardCategory::Visitor => "visitor",
        }
    }

    /// Label printed on the card badge
    pub fn badge_label(&self) -> &'static str {
        match self {
            CardCategory::Student => "Student",
            CardCategory::Staff => "Staff",
            CardCategory::Visitor => "Visitor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestReason {
    New,
    Lost,
    Damaged,
}

impl RequestReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestReason::New => "new",
            RequestReason::Lost => "lost",
            RequestReason::Damaged => "damaged",
        }
    }
}

/// A submitted ID-card request as returned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    #[serde(rename = "_id")]
    pub id: String,
    pub student_id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,

    pub card_type: CardCategory,
    #[serde(default)]
    pub request_type: Option<RequestReason>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub program: Option<String>,

    #[serde(default, deserialize_with = "empty_as_none")]
    pub trx_id: Option<String>,
    #[serde(default, deserialize_with = "amount_as_text")]
    pub amount: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,

    #[serde(default, deserialize_with = "empty_as_none")]
    pub photo: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub gd_copy: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub old_id_image: Option<String>,

    pub status: ApplicationStatus,
    #[serde(default)]
    pub rejection_reason: Option<String>,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub approved_at: Option<DateTime<Utc>>,
}

impl Application {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Start of the validity window.
    ///
    /// Only an approved application has one; an `approvedAt` on any other
    /// status is ignored.
    pub fn validity_anchor(&self) -> Option<DateTime<Utc>> {
        match (self.status, self.approved_at) {
            (ApplicationStatus::Approved, Some(at)) => Some(at),
            (ApplicationStatus::Approved, None) => {
                tracing::warn!(
                    application_id = %self.id,
                    "Approved application is missing approvedAt"
                );
                None
            }
            (status, Some(_)) => {
                tracing::warn!(
                    application_id = %self.id,
                    status = status.as_str(),
                    "approvedAt present on a non-approved application"
                );
                None
            }
            (_, None) => None,
        }
    }

    /// Attachments that are present, labelled for display
    pub fn attachments(&self) -> Vec<(&'static str, &str)> {
        [
            ("Student Photo", self.photo.as_deref()),
            ("GD Copy", self.gd_copy.as_deref()),
            ("Old ID Image", self.old_id_image.as_deref()),
        ]
        .into_iter()
        .filter_map(|(label, file)| file.map(|f| (label, f)))
        .collect()
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.trim().is_empty()))
}

fn amount_as_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
