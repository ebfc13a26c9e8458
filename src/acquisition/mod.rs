// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Image acquisition from the camera or the gallery
//!
//! Every acquisition asks for permission first, then hands back the URI of a
//! transient JPEG re-encoded at the configured quality. The transient file is
//! left in the temp directory; nothing here deletes it.

pub mod camera;
pub mod gallery;
pub mod prepare;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::{PlantifyError, Result};

pub use camera::CameraSource;
pub use gallery::GallerySource;

/// Where an image comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Camera,
    Gallery,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Camera => f.write_str("Camera"),
            Self::Gallery => f.write_str("Gallery"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

/// `file://` URI of a local image
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageUri(String);

impl ImageUri {
    const SCHEME: &'static str = "file://";

    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let absolute = if path.is_relative() {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        } else {
            path.to_path_buf()
        };
        Self(format!("{}{}", Self::SCHEME, absolute.display()))
    }

    /// Accept either a `file://` URI or a plain path
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with(Self::SCHEME) {
            Self(raw.to_string())
        } else {
            Self::from_path(raw)
        }
    }

    pub fn to_path(&self) -> PathBuf {
        PathBuf::from(self.0.strip_prefix(Self::SCHEME).unwrap_or(&self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of a camera or gallery operation
#[derive(Debug, Clone, PartialEq)]
pub enum Acquisition {
    Picked(ImageUri),
    PermissionDenied(SourceKind),
    Cancelled,
    NoSelection,
    Failed(String),
}

impl Acquisition {
    /// Convert into the error taxonomy, tagging statuses with their source
    pub fn into_result(self, source: SourceKind) -> Result<ImageUri> {
        match self {
            Self::Picked(uri) => Ok(uri),
            Self::PermissionDenied(kind) => Err(PlantifyError::PermissionDenied(kind)),
            Self::Cancelled => Err(PlantifyError::Cancelled(source)),
            Self::NoSelection => Err(PlantifyError::NoSelection(source)),
            Self::Failed(reason) => Err(PlantifyError::Acquisition(reason)),
        }
    }
}

/// User-facing prompts the acquisition and retry flows suspend on
#[async_trait]
pub trait Interaction: Send + Sync {
    /// Ask for access to a source. Called before every acquisition.
    async fn request_permission(&self, source: SourceKind) -> PermissionStatus;

    /// Pick one of the candidates, `None` when the user backs out
    async fn choose_image(&self, candidates: &[PathBuf]) -> Option<usize>;

    /// Yes/no question
    async fn confirm(&self, question: &str) -> bool;
}

/// A camera or gallery
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn acquire(&self, interaction: &dyn Interaction) -> Acquisition;
}

/// Take a photo with the configured camera command
pub async fn capture_from_camera(config: &AppConfig, interaction: &dyn Interaction) -> Acquisition {
    CameraSource::from_config(&config.acquisition).acquire(interaction).await
}

/// Pick an image, either the given file or one chosen from the gallery directory
pub async fn pick_from_gallery(
    config: &AppConfig,
    selection: Option<PathBuf>,
    interaction: &dyn Interaction,
) -> Acquisition {
    GallerySource::from_config(config, selection).acquire(interaction).await
}

/// Re-encode the chosen file and wrap the result
pub(crate) async fn finish(source: PathBuf, quality: f32, out_dir: PathBuf) -> Acquisition {
    let job = tokio::task::spawn_blocking(move || {
        prepare::compress_to_jpeg(&source, quality, &out_dir)
    });

    match job.await {
        Ok(Ok(path)) => {
            debug!("Prepared image at {:?}", path);
            Acquisition::Picked(ImageUri::from_path(path))
        }
        Ok(Err(e)) => Acquisition::Failed(e.user_message()),
        Err(e) => Acquisition::Failed(format!("Image preparation was interrupted: {}", e)),
    }
}

/// Prompts on the controlling terminal
pub struct TerminalInteraction {
    assume_granted: bool,
}

impl TerminalInteraction {
    pub fn new(assume_granted: bool) -> Self {
        Self { assume_granted }
    }

    async fn ask(prompt: String) -> Option<String> {
        let answer = tokio::task::spawn_blocking(move || {
            eprint!("{}", prompt);
            io::stderr().flush().ok();
            let mut line = String::new();
            match io::stdin().lock().read_line(&mut line) {
                Ok(0) | Err(_) => None,
                Ok(_) => Some(line.trim().to_string()),
            }
        })
        .await;

        answer.ok().flatten()
    }
}

fn is_yes(answer: Option<String>) -> bool {
    matches!(answer.as_deref().map(str::to_lowercase).as_deref(), Some("y" | "yes"))
}

#[async_trait]
impl Interaction for TerminalInteraction {
    async fn request_permission(&self, source: SourceKind) -> PermissionStatus {
        if self.assume_granted {
            return PermissionStatus::Granted;
        }

        let what = match source {
            SourceKind::Camera => "the camera",
            SourceKind::Gallery => "your photos",
        };
        if is_yes(Self::ask(format!("Allow Plantify to access {}? [y/N] ", what)).await) {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Denied
        }
    }

    async fn choose_image(&self, candidates: &[PathBuf]) -> Option<usize> {
        for (i, path) in candidates.iter().enumerate() {
            eprintln!("  {:3}. {}", i + 1, path.display());
        }

        let answer = Self::ask("Select an image (empty to cancel): ".to_string()).await?;
        if answer.is_empty() {
            return None;
        }
        match answer.parse::<usize>() {
            Ok(n) if (1..=candidates.len()).contains(&n) => Some(n - 1),
            _ => {
                warn!("Invalid selection: {:?}", answer);
                None
            }
        }
    }

    async fn confirm(&self, question: &str) -> bool {
        is_yes(Self::ask(format!("{} [y/N] ", question)).await)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_round_trip() {
        let uri = ImageUri::from_path("/tmp/plant.jpg");
        assert_eq!(uri.as_str(), "file:///tmp/plant.jpg");
        assert_eq!(uri.to_path(), PathBuf::from("/tmp/plant.jpg"));
        assert_eq!(ImageUri::parse("file:///tmp/plant.jpg"), uri);
        assert_eq!(ImageUri::parse("/tmp/plant.jpg"), uri);
    }

    #[test]
    fn test_relative_uri_is_absolute() {
        let uri = ImageUri::from_path("plant.jpg");
        assert!(uri.to_path().is_absolute());
    }

    #[test]
    fn test_into_result() {
        let uri = ImageUri::from_path("/tmp/a.jpg");
        assert_eq!(Acquisition::Picked(uri.clone()).into_result(SourceKind::Camera).unwrap(), uri);

        let err = Acquisition::Cancelled.into_result(SourceKind::Gallery).unwrap_err();
        assert!(matches!(err, PlantifyError::Cancelled(SourceKind::Gallery)));

        let err = Acquisition::PermissionDenied(SourceKind::Camera)
            .into_result(SourceKind::Camera)
            .unwrap_err();
        assert_eq!(err.kind().as_str(), "permission_denied");

        let err = Acquisition::Failed("boom".into()).into_result(SourceKind::Camera).unwrap_err();
        assert_eq!(err.user_message(), "boom");
    }

    #[test]
    fn test_is_yes() {
        assert!(is_yes(Some("y".into())));
        assert!(is_yes(Some("YES".into())));
        assert!(!is_yes(Some("".into())));
        assert!(!is_yes(Some("no".into())));
        assert!(!is_yes(None));
    }

    #[tokio::test]
    async fn test_assume_granted_skips_prompt() {
        let interaction = TerminalInteraction::new(true);
        assert_eq!(
            interaction.request_permission(SourceKind::Camera).await,
            PermissionStatus::Granted
        );
    }
}
