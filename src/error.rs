// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for Plantify

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::acquisition::SourceKind;

/// Result type alias for Plantify operations
pub type Result<T> = std::result::Result<T, PlantifyError>;

/// Message shown when no API credential is configured
pub const MISSING_CREDENTIAL: &str = "API key is missing. Please contact the developer.";

/// Failures of the local history store
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to read history: {0}")]
    Read(#[source] std::io::Error),

    #[error("Failed to write history: {0}")]
    Write(#[source] std::io::Error),

    #[error("Stored history is corrupted: {0}")]
    Corrupted(#[source] serde_json::Error),

    #[error("Failed to encode history: {0}")]
    Encode(#[source] serde_json::Error),

    /// The list could not be loaded while saving a new record
    #[error("Failed to save history: {0}")]
    Append(#[source] Box<StorageError>),
}

impl StorageError {
    /// Whether this failure happened while loading (as opposed to saving)
    pub fn is_load_failure(&self) -> bool {
        matches!(self, Self::Read(_) | Self::Corrupted(_))
    }

    /// Non-fatal notice for the user
    pub fn user_message(&self) -> &'static str {
        if self.is_load_failure() {
            "Failed to load analysis history."
        } else {
            "Failed to save analysis history."
        }
    }
}

/// Plantify error types
#[derive(Error, Debug)]
pub enum PlantifyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0} permission not granted")]
    PermissionDenied(SourceKind),

    #[error("{0} was cancelled")]
    Cancelled(SourceKind),

    #[error("No image from {0}")]
    NoSelection(SourceKind),

    #[error("Acquisition failed: {0}")]
    Acquisition(String),

    #[error("Request timed out after {0:?}")]
    TimedOut(Duration),

    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Coarse classification of every failure the application can surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ConfigurationError,
    PermissionDenied,
    CancelledByUser,
    NoSelection,
    AcquisitionFailed,
    TimedOut,
    ApiError,
    NetworkError,
    StorageError,
    IoError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigurationError => "configuration_error",
            Self::PermissionDenied => "permission_denied",
            Self::CancelledByUser => "cancelled_by_user",
            Self::NoSelection => "no_selection",
            Self::AcquisitionFailed => "acquisition_failed",
            Self::TimedOut => "timed_out",
            Self::ApiError => "api_error",
            Self::NetworkError => "network_error",
            Self::StorageError => "storage_error",
            Self::IoError => "io_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PlantifyError {
    /// The error raised when an analysis is attempted without a credential
    pub fn missing_credential() -> Self {
        Self::Config(MISSING_CREDENTIAL.to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::ConfigurationError,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::Cancelled(_) => ErrorKind::CancelledByUser,
            Self::NoSelection(_) => ErrorKind::NoSelection,
            Self::Acquisition(_) | Self::Image(_) => ErrorKind::AcquisitionFailed,
            Self::TimedOut(_) => ErrorKind::TimedOut,
            Self::Api(_) => ErrorKind::ApiError,
            Self::Network(_) => ErrorKind::NetworkError,
            Self::Storage(_) => ErrorKind::StorageError,
            Self::FileSystem(_) => ErrorKind::IoError,
        }
    }

    /// Whether the user should be offered a manual retry with the same image
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::TimedOut | ErrorKind::ApiError | ErrorKind::NetworkError | ErrorKind::IoError
        )
    }

    /// Text shown to the user at the command boundary
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(msg) => msg.clone(),
            Self::PermissionDenied(source) => format!(
                "{} permission not granted! Please enable {} access in your device settings.",
                source,
                source.to_string().to_lowercase()
            ),
            Self::Cancelled(SourceKind::Camera) => "Photo capture was cancelled.".to_string(),
            Self::Cancelled(SourceKind::Gallery) => "Image selection was cancelled.".to_string(),
            Self::NoSelection(SourceKind::Camera) => "No image was captured.".to_string(),
            Self::NoSelection(SourceKind::Gallery) => "No image was selected.".to_string(),
            Self::Acquisition(reason) => reason.clone(),
            Self::TimedOut(_) => "The request timed out. Please try again.".to_string(),
            Self::Api(msg) => format!("OpenAI API error: {}", msg),
            Self::Network(e) => format!("API error: {}", e),
            Self::Storage(e) => e.user_message().to_string(),
            Self::FileSystem(e) => format!("Could not read the image: {}", e),
            Self::Image(e) => format!("Could not process the image: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corrupted() -> StorageError {
        let err = serde_json::from_str::<Vec<String>>("{not json").unwrap_err();
        StorageError::Corrupted(err)
    }

    #[test]
    fn test_kind_strings() {
        assert_eq!(PlantifyError::missing_credential().kind().as_str(), "configuration_error");
        assert_eq!(PlantifyError::Cancelled(SourceKind::Camera).kind().as_str(), "cancelled_by_user");
        assert_eq!(PlantifyError::TimedOut(Duration::from_secs(30)).kind().to_string(), "timed_out");
        assert_eq!(PlantifyError::Storage(corrupted()).kind(), ErrorKind::StorageError);
    }

    #[test]
    fn test_retryable() {
        assert!(PlantifyError::TimedOut(Duration::from_secs(30)).is_retryable());
        assert!(PlantifyError::Api("rate limited".into()).is_retryable());
        assert!(!PlantifyError::missing_credential().is_retryable());
        assert!(!PlantifyError::PermissionDenied(SourceKind::Gallery).is_retryable());
        assert!(!PlantifyError::Storage(corrupted()).is_retryable());
    }

    #[test]
    fn test_user_messages() {
        assert_eq!(
            PlantifyError::PermissionDenied(SourceKind::Camera).user_message(),
            "Camera permission not granted! Please enable camera access in your device settings."
        );
        assert_eq!(
            PlantifyError::PermissionDenied(SourceKind::Gallery).user_message(),
            "Gallery permission not granted! Please enable gallery access in your device settings."
        );
        assert_eq!(
            PlantifyError::Api("rate limited".into()).user_message(),
            "OpenAI API error: rate limited"
        );
        assert_eq!(PlantifyError::missing_credential().user_message(), MISSING_CREDENTIAL);
        assert_eq!(PlantifyError::NoSelection(SourceKind::Camera).user_message(), "No image was captured.");
    }

    #[test]
    fn test_storage_notice() {
        assert_eq!(corrupted().user_message(), "Failed to load analysis history.");
        let write = StorageError::Write(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
        assert!(!write.is_load_failure());
        assert_eq!(write.user_message(), "Failed to save analysis history.");

        let append = StorageError::Append(Box::new(corrupted()));
        assert!(!append.is_load_failure());
        assert_eq!(append.user_message(), "Failed to save analysis history.");
    }
}
