// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Gallery picking from a local image directory

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info};

use super::{finish, Acquisition, ImageSource, Interaction, PermissionStatus, SourceKind};
use crate::config::AppConfig;

/// Picks an image from a directory, or takes an explicit file
pub struct GallerySource {
    dir: PathBuf,
    selection: Option<PathBuf>,
    formats: Vec<String>,
    quality: f32,
    out_dir: PathBuf,
}

impl GallerySource {
    pub fn new(dir: PathBuf, formats: Vec<String>, quality: f32, out_dir: PathBuf) -> Self {
        Self {
            dir,
            selection: None,
            formats,
            quality,
            out_dir,
        }
    }

    pub fn from_config(config: &AppConfig, selection: Option<PathBuf>) -> Self {
        Self::new(
            config.gallery_dir(),
            config.acquisition.formats.clone(),
            config.acquisition.quality,
            std::env::temp_dir(),
        )
        .with_selection(selection)
    }

    /// Skip the chooser and use this file
    pub fn with_selection(mut self, selection: Option<PathBuf>) -> Self {
        self.selection = selection;
        self
    }

    fn is_image(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.formats.iter().any(|f| f.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }

    /// Images in the gallery directory, newest first
    pub async fn list_images(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut found: Vec<(SystemTime, PathBuf)> = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let meta = entry.metadata().await?;
            if meta.is_file() && self.is_image(&path) {
                let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                found.push((modified, path));
            }
        }

        found.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        Ok(found.into_iter().map(|(_, path)| path).collect())
    }
}

#[async_trait]
impl ImageSource for GallerySource {
    async fn acquire(&self, interaction: &dyn Interaction) -> Acquisition {
        if interaction.request_permission(SourceKind::Gallery).await != PermissionStatus::Granted {
            return Acquisition::PermissionDenied(SourceKind::Gallery);
        }

        let chosen = match &self.selection {
            Some(path) => {
                if !path.is_file() {
                    return Acquisition::Failed(format!("Image not found: {}", path.display()));
                }
                path.clone()
            }
            None => {
                let candidates = match self.list_images().await {
                    Ok(candidates) => candidates,
                    Err(e) => {
                        return Acquisition::Failed(format!(
                            "Could not read gallery {}: {}", self.dir.display(), e
                        ))
                    }
                };
                debug!("Gallery {:?} has {} images", self.dir, candidates.len());

                if candidates.is_empty() {
                    return Acquisition::NoSelection;
                }
                match interaction.choose_image(&candidates).await {
                    None => return Acquisition::Cancelled,
                    Some(index) => match candidates.get(index) {
                        Some(path) => path.clone(),
                        None => return Acquisition::NoSelection,
                    },
                }
            }
        };

        info!("Selected image: {:?}", chosen);
        finish(chosen, self.quality, self.out_dir.clone()).await
    }
}
