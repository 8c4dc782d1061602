//! Rescue form validation and certificate assembly.
//!
//! The core validates the form and produces the certificate as data: file
//! name, storage path and content lines. Rendering those lines onto a PDF
//! page is the shell's job.

use serde::{Deserialize, Serialize};

use crate::model::{AlertCase, AlertId, BlobRef, UnixTimeMs, UserId};
use crate::{AppError, ErrorKind};

/// Filled in by the rescuer when marking a case as resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescueForm {
    pub rescuer_name: String,
    pub national_id: String,
    pub phone: String,
    pub address: String,
    pub notes: Option<String>,
    /// Captured signature, uploaded by the shell before submission.
    pub signature: Option<BlobRef>,
}

impl RescueForm {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.rescuer_name.trim().is_empty() {
            return Err(AppError::new(ErrorKind::Validation, "Enter your full name"));
        }

        let id = self.national_id.trim();
        if id.len() < 8 || id.len() > 12 || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(AppError::new(
                ErrorKind::Validation,
                "Enter a valid national id (8 to 12 characters)",
            ));
        }

        let phone = self.phone.trim();
        let digits = phone.strip_prefix('+').unwrap_or(phone);
        if digits.len() < 6 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(AppError::new(
                ErrorKind::Validation,
                "Enter a valid phone number",
            ));
        }

        if self.address.trim().is_empty() {
            return Err(AppError::new(ErrorKind::Validation, "Enter your address"));
        }

        if self.signature.is_none() {
            return Err(AppError::new(
                ErrorKind::Validation,
                "Sign the form before submitting",
            ));
        }

        Ok(())
    }
}

/// The certificate artifact, as data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub case_code: String,
    pub file_name: String,
    pub storage_path: String,
    pub lines: Vec<String>,
}

impl Certificate {
    #[must_use]
    pub fn blob_ref(&self) -> BlobRef {
        BlobRef::new(self.storage_path.clone())
    }
}

#[must_use]
pub fn certificate_file_name(alert_id: &AlertId, now: UnixTimeMs) -> String {
    let code = alert_id.case_code();
    format!("Rescate_{}_{}.pdf", code.trim_start_matches('#'), now.0)
}

#[must_use]
pub fn certificate_storage_path(alert_id: &AlertId, file_name: &str) -> String {
    format!("certificates/{}/{}", alert_id.as_str(), file_name)
}

/// Assembles the certificate for a validated form. Fails if the form does
/// not validate; never partially assembles.
pub fn build(
    case: &AlertCase,
    form: &RescueForm,
    resolver: &UserId,
    now: UnixTimeMs,
) -> Result<Certificate, AppError> {
    form.validate()?;

    let case_code = case.id.case_code();
    let file_name = certificate_file_name(&case.id, now);
    let storage_path = certificate_storage_path(&case.id, &file_name);

    let mut lines = vec![
        "CERTIFICADO DE RESCATE".to_string(),
        format!("Caso {case_code}"),
        format!("Fecha: {}", format_utc_date(now)),
        String::new(),
        format!("Animal: {} ({})", case.species_label(), case.condition_label()),
        format!("Reportado por: {}", case.reporter.as_str()),
        String::new(),
        format!("Rescatista: {}", form.rescuer_name.trim()),
        format!("Documento: {}", form.national_id.trim()),
        format!("Telefono: {}", form.phone.trim()),
        format!("Direccion: {}", form.address.trim()),
        format!("Cuenta: {}", resolver.as_str()),
    ];
    if let Some(notes) = form.notes.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        lines.push(String::new());
        lines.push(format!("Notas: {notes}"));
    }

    Ok(Certificate {
        case_code,
        file_name,
        storage_path,
        lines,
    })
}

/// Calendar date (UTC) of a millisecond timestamp, `YYYY-MM-DD`.
#[must_use]
fn format_utc_date(ts: UnixTimeMs) -> String {
    #[allow(clippy::cast_possible_wrap)]
    let days = (ts.0 / 86_400_000) as i64;

    // Howard Hinnant's civil_from_days.
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };

    format!("{y:04}-{m:02}-{d:02}")
}
