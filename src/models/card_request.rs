use std::fmt;
use std::str::FromStr;

use reqwest::multipart::{Form, Part};

use crate::models::application::{CardCategory, RequestReason};

/// Upload size limit for every attachment
pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

const INCIDENT_REPORT_TYPES: &[&str] = &["application/pdf", "image/png", "image/jpeg", "image/jpg"];

/// Academic programs offered on the request form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Program {
    Cse,
    Eee,
    Bba,
    English,
    Law,
}

impl Program {
    pub const ALL: [Program; 5] = [
        Program::Cse,
        Program::Eee,
        Program::Bba,
        Program::English,
        Program::Law,
    ];

    /// Code sent to and stored by the backend
    pub fn code(&self) -> &'static str {
        match self {
            Program::Cse => "CSE",
            Program::Eee => "EEE",
            Program::Bba => "BBA",
            Program::English => "English",
            Program::Law => "Law",
        }
    }

    /// Label shown in the request form
    pub fn form_label(&self) -> &'static str {
        match self {
            Program::Cse => "Computer Science & Engineering",
            Program::Eee => "Electrical & Electronic Engineering",
            Program::Bba => "Business Administration",
            Program::English => "English",
            Program::Law => "Law",
        }
    }
}

impl FromStr for Program {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Program::ALL
            .into_iter()
            .find(|p| p.code() == s)
            .ok_or(())
    }
}

/// A file received from the request form
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    fn into_part(self) -> Result<Part, reqwest::Error> {
        Part::bytes(self.bytes)
            .file_name(self.file_name)
            .mime_str(&self.content_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub student_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payment {
    pub trx_id: String,
    pub amount: String,
}

/// Reason for a student card request, carrying the supporting document it
/// allows
#[derive(Debug, Clone)]
pub enum StudentRequest {
    New,
    Lost { incident_report: Option<Upload> },
    Damaged { old_card_image: Option<Upload> },
}

impl StudentRequest {
    pub fn reason(&self) -> RequestReason {
        match self {
            StudentRequest::New => RequestReason::New,
            StudentRequest::Lost { .. } => RequestReason::Lost,
            StudentRequest::Damaged { .. } => RequestReason::Damaged,
        }
    }
}

/// A validated card request. Each category carries only the fields it
/// requires.
#[derive(Debug, Clone)]
pub enum CardRequest {
    Student {
        identity: Identity,
        payment: Payment,
        program: Program,
        photo: Upload,
        request: StudentRequest,
    },
    Staff {
        identity: Identity,
        payment: Payment,
        photo: Option<Upload>,
    },
    Visitor {
        identity: Identity,
        payment: Payment,
        photo: Option<Upload>,
    },
}

/// Raw request form values, before validation
#[derive(Debug, Clone, Default)]
pub struct CardRequestForm {
    pub student_id: String,
    pub card_type: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub program: String,
    pub trx_id: String,
    pub amount: String,
    pub request_type: String,
    pub photo: Option<Upload>,
    pub gd_copy: Option<Upload>,
    pub old_id_image: Option<Upload>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    pub fn has(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = self.0.iter().map(|e| e.message.as_str()).collect();
        write!(f, "{}", messages.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

struct Collector(Vec<FieldError>);

impl Collector {
    fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push(FieldError {
            field,
            message: message.into(),
        });
    }

    fn required(&mut self, field: &'static str, label: &str, value: &str) -> String {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            self.push(field, format!("{} is required", label));
        }
        trimmed.to_string()
    }

    fn upload(
        &mut self,
        field: &'static str,
        label: &str,
        upload: Option<Upload>,
        allowed: impl Fn(&str) -> bool,
    ) -> Option<Upload> {
        let upload = upload.filter(|u| !u.bytes.is_empty())?;
        if upload.bytes.len() > MAX_UPLOAD_BYTES {
            self.push(field, format!("{} must be 5MB or smaller", label));
        }
        if !allowed(&upload.content_type) {
            self.push(
                field,
                format!("{} has an unsupported file type ({})", label, upload.content_type),
            );
        }
        Some(upload)
    }
}

fn is_image(content_type: &str) -> bool {
    content_type.starts_with("image/")
}

impl TryFrom<CardRequestForm> for CardRequest {
    type Error = ValidationErrors;

    fn try_from(form: CardRequestForm) -> Result<Self, Self::Error> {
        let mut errors = Collector(Vec::new());

        let identity = Identity {
            student_id: errors.required("studentId", "ID Number", &form.student_id),
            first_name: errors.required("firstName", "First Name", &form.first_name),
            last_name: errors.required("lastName", "Last Name", &form.last_name),
            email: errors.required("email", "Email", &form.email),
        };
        if !identity.email.is_empty() && !identity.email.contains('@') {
            errors.push("email", "Email must be a valid address");
        }

        let payment = Payment {
            trx_id: errors.required("trxId", "Transaction ID", &form.trx_id),
            amount: errors.required("amount", "Amount", &form.amount),
        };
        if !payment.amount.is_empty() {
            match payment.amount.parse::<f64>() {
                Ok(v) if v > 0.0 && v.is_finite() => {}
                _ => errors.push("amount", "Amount must be a positive number"),
            }
        }

        let category = match form.card_type.trim() {
            "" | "student" => CardCategory::Student,
            "staff" => CardCategory::Staff,
            "visitor" => CardCategory::Visitor,
            other => {
                errors.push("cardType", format!("Unknown card type: {}", other));
                CardCategory::Student
            }
        };

        let photo = errors.upload("photo", "Photo", form.photo, is_image);

        let request = match category {
            CardCategory::Student => {
                let program = match form.program.trim() {
                    "" => {
                        errors.push("program", "Academic Program is required");
                        None
                    }
                    code => match code.parse::<Program>() {
                        Ok(p) => Some(p),
                        Err(()) => {
                            errors.push("program", format!("Unknown program: {}", code));
                            None
                        }
                    },
                };

                if photo.is_none() {
                    errors.push("photo", "Photo is required for student cards");
                }

                let request = match form.request_type.trim() {
                    "" | "new" => Some(StudentRequest::New),
                    "lost" => Some(StudentRequest::Lost {
                        incident_report: errors.upload("gdCopy", "GD Copy", form.gd_copy, |ct| {
                            INCIDENT_REPORT_TYPES.contains(&ct)
                        }),
                    }),
                    "damaged" => Some(StudentRequest::Damaged {
                        old_card_image: errors.upload(
                            "oldIdImage",
                            "Old ID Image",
                            form.old_id_image,
                            is_image,
                        ),
                    }),
                    other => {
                        errors.push("requestType", format!("Unknown request type: {}", other));
                        None
                    }
                };

                match (program, photo, request) {
                    (Some(program), Some(photo), Some(request)) if errors.0.is_empty() => {
                        Some(CardRequest::Student {
                            identity,
                            payment,
                            program,
                            photo,
                            request,
                        })
                    }
                    _ => None,
                }
            }
            CardCategory::Staff => Some(CardRequest::Staff {
                identity,
                payment,
                photo,
            }),
            CardCategory::Visitor => Some(CardRequest::Visitor {
                identity,
                payment,
                photo,
            }),
        };

        match request {
            Some(request) if errors.0.is_empty() => Ok(request),
            _ => Err(ValidationErrors(errors.0)),
        }
    }
}

impl CardRequest {
    pub fn category(&self) -> CardCategory {
        match self {
            CardRequest::Student { .. } => CardCategory::Student,
            CardRequest::Staff { .. } => CardCategory::Staff,
            CardRequest::Visitor { .. } => CardCategory::Visitor,
        }
    }

    pub fn identity(&self) -> &Identity {
        match self {
            CardRequest::Student { identity, .. }
            | CardRequest::Staff { identity, .. }
            | CardRequest::Visitor { identity, .. } => identity,
        }
    }

    pub fn payment(&self) -> &Payment {
        match self {
            CardRequest::Student { payment, .. }
            | CardRequest::Staff { payment, .. }
            | CardRequest::Visitor { payment, .. } => payment,
        }
    }

    /// Builds the multipart body expected by `POST /api/students`
    pub fn into_multipart(self) -> Result<Form, reqwest::Error> {
        let category = self.category();
        let identity = self.identity().clone();
        let payment = self.payment().clone();

        let mut form = Form::new()
            .text("studentId", identity.student_id)
            .text("cardType", category.as_str())
            .text("firstName", identity.first_name)
            .text("lastName", identity.last_name)
            .text("email", identity.email)
            .text("trxId", payment.trx_id)
            .text("amount", payment.amount);

        match self {
            CardRequest::Student {
                program,
                photo,
                request,
                ..
            } => {
                form = form
                    .text("program", program.code())
                    .text("requestType", request.reason().as_str())
                    .part("photo", photo.into_part()?);

                match request {
                    StudentRequest::Lost {
                        incident_report: Some(report),
                    } => form = form.part("gdCopy", report.into_part()?),
                    StudentRequest::Damaged {
                        old_card_image: Some(image),
                    } => form = form.part("oldIdImage", image.into_part()?),
                    _ => {}
                }
            }
            CardRequest::Staff { photo, .. } | CardRequest::Visitor { photo, .. } => {
                form = form
                    .text("program", "")
                    .text("requestType", RequestReason::New.as_str());
                if let Some(photo) = photo {
                    form = form.part("photo", photo.into_part()?);
                }
            }
        }

        Ok(form)
    }
}
