//! Deep links of the form `alertamascota://alert/<case-id>`.

use thiserror::Error;
use url::Url;

use crate::model::AlertId;
use crate::{AppError, ErrorKind};

pub const SCHEME: &str = "alertamascota";
pub const ALERT_HOST: &str = "alert";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeepLinkError {
    #[error("Not a valid URL: {0}")]
    Malformed(String),
    #[error("Unsupported scheme: {0}")]
    WrongScheme(String),
    #[error("Unsupported deep link target: {0}")]
    WrongTarget(String),
    #[error("Deep link is missing the case id")]
    MissingCaseId,
}

impl From<DeepLinkError> for AppError {
    fn from(e: DeepLinkError) -> Self {
        AppError::new(ErrorKind::Validation, e.to_string())
    }
}

#[must_use]
pub fn format(alert_id: &AlertId) -> String {
    format!("{SCHEME}://{ALERT_HOST}/{}", alert_id.as_str())
}

pub fn parse(link: &str) -> Result<AlertId, DeepLinkError> {
    let url = Url::parse(link).map_err(|e| DeepLinkError::Malformed(e.to_string()))?;

    if url.scheme() != SCHEME {
        return Err(DeepLinkError::WrongScheme(url.scheme().to_string()));
    }
    let host = url.host_str().unwrap_or_default();
    if host != ALERT_HOST {
        return Err(DeepLinkError::WrongTarget(host.to_string()));
    }

    let id = url
        .path_segments()
        .and_then(|mut segments| segments.next())
        .filter(|s| !s.is_empty())
        .ok_or(DeepLinkError::MissingCaseId)?;

    Ok(AlertId(id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let id = AlertId("case-abc1234".into());
        let link = format(&id);
        assert_eq!(link, "alertamascota://alert/case-abc1234");
        assert_eq!(parse(&link).unwrap(), id);
    }

    #[test]
    fn rejects_foreign_scheme() {
        assert_eq!(
            parse("https://alert/case-1"),
            Err(DeepLinkError::WrongScheme("https".into()))
        );
    }

    #[test]
    fn rejects_unknown_target() {
        assert!(matches!(
            parse("alertamascota://settings/case-1"),
            Err(DeepLinkError::WrongTarget(_))
        ));
    }

    #[test]
    fn rejects_missing_id() {
        assert_eq!(
            parse("alertamascota://alert/"),
            Err(DeepLinkError::MissingCaseId)
        );
        assert_eq!(parse("alertamascota://alert"), Err(DeepLinkError::MissingCaseId));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(parse("not a url"), Err(DeepLinkError::Malformed(_))));
    }
}
