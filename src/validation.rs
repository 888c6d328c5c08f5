use reqwest::Url;

use crate::errors::{AppError, AppResult};
use crate::source::RawFile;

/// Media types accepted regardless of file name
pub const ACCEPTED_MEDIA_TYPES: [&str; 4] = [
    "text/plain",
    "application/pdf",
    "text/csv",
    "application/vnd.ms-excel",
];

/// Extensions accepted regardless of declared media type (compared lower-cased)
pub const ACCEPTED_EXTENSIONS: [&str; 3] = ["txt", "pdf", "csv"];

pub struct InputValidator;

impl InputValidator {
    /// Either a known media type or a known extension is enough. Browsers and
    /// operating systems disagree on media types for the same extension.
    pub fn is_acceptable(file: &dyn RawFile) -> bool {
        Self::is_accepted_media_type(file.media_type()) || Self::is_accepted_extension(file.name())
    }

    pub fn validate_file(file: &dyn RawFile) -> AppResult<()> {
        if Self::is_acceptable(file) {
            Ok(())
        } else {
            Err(AppError::rejected(file.name(), file.media_type()))
        }
    }

    pub fn is_accepted_media_type(media_type: &str) -> bool {
        // Ignore parameters such as "; charset=utf-8"
        let essence = media_type.split(';').next().unwrap_or_default().trim();
        ACCEPTED_MEDIA_TYPES
            .iter()
            .any(|accepted| accepted.eq_ignore_ascii_case(essence))
    }

    pub fn is_accepted_extension(file_name: &str) -> bool {
        Self::file_extension(file_name)
            .map(|ext| ACCEPTED_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false)
    }

    /// Lower-cased text after the last `.`, if the name has one
    pub fn file_extension(file_name: &str) -> Option<String> {
        file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
    }

    pub fn validate_endpoint_url(url: &str) -> AppResult<()> {
        let trimmed = url.trim();

        if trimmed.is_empty() {
            return Err(AppError::validation("endpoint_url", "Endpoint URL cannot be empty"));
        }

        let parsed = Url::parse(trimmed).map_err(|_| AppError::invalid_endpoint(trimmed))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(AppError::invalid_endpoint(trimmed));
        }

        Ok(())
    }
}
