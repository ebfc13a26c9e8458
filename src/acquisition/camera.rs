// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Camera capture through an external command

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use tokio::process::Command;
use tracing::{debug, info};
use uuid::Uuid;

use super::{finish, Acquisition, ImageSource, Interaction, PermissionStatus, SourceKind};
use crate::config::{AcquisitionConfig, OUTPUT_PLACEHOLDER};

/// Exit code shells report for Ctrl+C
const INTERRUPTED: i32 = 130;

/// Runs a capture command that writes a photo to a given path
pub struct CameraSource {
    command: Vec<String>,
    quality: f32,
    out_dir: PathBuf,
}

impl CameraSource {
    pub fn new(command: Vec<String>, quality: f32, out_dir: PathBuf) -> Self {
        Self { command, quality, out_dir }
    }

    pub fn from_config(config: &AcquisitionConfig) -> Self {
        Self::new(config.camera_command.clone(), config.quality, std::env::temp_dir())
    }

    fn render_args(&self, output: &Path) -> Vec<String> {
        let output = output.to_string_lossy();
        self.command
            .iter()
            .map(|arg| arg.replace(OUTPUT_PLACEHOLDER, &output))
            .collect()
    }

    async fn collect(&self, status: ExitStatus, raw: &Path) -> Acquisition {
        if !status.success() {
            // Killed by a signal or interrupted from the keyboard
            if status.code().is_none() || status.code() == Some(INTERRUPTED) {
                return Acquisition::Cancelled;
            }
            return Acquisition::Failed(format!("Camera command exited with {}", status));
        }

        match tokio::fs::metadata(raw).await {
            Ok(meta) if meta.len() > 0 => {}
            _ => return Acquisition::NoSelection,
        }

        info!("Captured photo: {:?}", raw);
        finish(raw.to_path_buf(), self.quality, self.out_dir.clone()).await
    }
}

#[async_trait]
impl ImageSource for CameraSource {
    async fn acquire(&self, interaction: &dyn Interaction) -> Acquisition {
        if interaction.request_permission(SourceKind::Camera).await != PermissionStatus::Granted {
            return Acquisition::PermissionDenied(SourceKind::Camera);
        }

        if let Err(e) = tokio::fs::create_dir_all(&self.out_dir).await {
            return Acquisition::Failed(format!("Could not prepare capture directory: {}", e));
        }
        let raw = self.out_dir.join(format!("plantify-capture-{}.jpg", Uuid::new_v4()));

        let args = self.render_args(&raw);
        let Some((program, rest)) = args.split_first() else {
            return Acquisition::Failed("Camera command is not configured.".to_string());
        };

        debug!("Running camera command: {:?}", args);
        let picked = match Command::new(program).args(rest).status().await {
            Ok(status) => self.collect(status, &raw).await,
            Err(e) => {
                return Acquisition::Failed(format!(
                    "Could not start camera command '{}': {}", program, e
                ))
            }
        };

        // Only the re-encoded copy outlives the capture
        discard(&raw).await;
        picked
    }
}

async fn discard(raw: &Path) {
    match tokio::fs::remove_file(raw).await {
        Ok(()) => debug!("Removed raw capture {:?}", raw),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => debug!("Could not remove raw capture {:?}: {}", raw, e),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::acquisition::testing::{write_png, ScriptedInteraction};

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_denied_permission_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let camera = CameraSource::new(
            sh(&format!("touch {}", marker.display())),
            0.7,
            dir.path().to_path_buf(),
        );

        let interaction = ScriptedInteraction::denying();
        let outcome = camera.acquire(&interaction).await;

        assert_eq!(outcome, Acquisition::PermissionDenied(SourceKind::Camera));
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_capture_success() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = dir.path().join("fixture.png");
        write_png(&fixture);

        let command = vec![
            "cp".to_string(),
            fixture.to_string_lossy().to_string(),
            OUTPUT_PLACEHOLDER.to_string(),
        ];
        let out_dir = dir.path().join("captures");
        let camera = CameraSource::new(command, 0.7, out_dir.clone());

        let interaction = ScriptedInteraction::granting(None);
        let outcome = camera.acquire(&interaction).await;

        let Acquisition::Picked(uri) = outcome else {
            panic!("Expected a picked image, got {:?}", outcome);
        };
        let path = uri.to_path();
        assert!(path.starts_with(&out_dir));
        assert_eq!(image::ImageFormat::from_path(&path).unwrap(), image::ImageFormat::Jpeg);
        assert_eq!(interaction.requests(), 1);
        assert!(raw_captures(&out_dir).is_empty());
    }

    #[tokio::test]
    async fn test_permission_requested_every_time() {
        let dir = tempfile::tempdir().unwrap();
        let camera = CameraSource::new(sh("true"), 0.7, dir.path().to_path_buf());
        let interaction = ScriptedInteraction::granting(None);

        camera.acquire(&interaction).await;
        camera.acquire(&interaction).await;
        assert_eq!(interaction.requests(), 2);
    }

    #[tokio::test]
    async fn test_no_output_is_no_selection() {
        let dir = tempfile::tempdir().unwrap();
        let camera = CameraSource::new(sh("true"), 0.7, dir.path().to_path_buf());

        let outcome = camera.acquire(&ScriptedInteraction::granting(None)).await;
        assert_eq!(outcome, Acquisition::NoSelection);
    }

    fn raw_captures(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.to_string_lossy().contains("plantify-capture-"))
            .collect()
    }

    #[tokio::test]
    async fn test_empty_capture_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let camera = CameraSource::new(sh(": > {output}"), 0.7, dir.path().to_path_buf());

        let outcome = camera.acquire(&ScriptedInteraction::granting(None)).await;
        assert_eq!(outcome, Acquisition::NoSelection);
        assert!(raw_captures(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_capture_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let camera = CameraSource::new(sh("echo not-a-photo > {output}"), 0.7, dir.path().to_path_buf());

        let outcome = camera.acquire(&ScriptedInteraction::granting(None)).await;
        assert!(matches!(outcome, Acquisition::Failed(_)));
        assert!(raw_captures(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_failing_command() {
        let dir = tempfile::tempdir().unwrap();
        let camera = CameraSource::new(sh("exit 3"), 0.7, dir.path().to_path_buf());

        let outcome = camera.acquire(&ScriptedInteraction::granting(None)).await;
        assert!(matches!(outcome, Acquisition::Failed(_)));
    }

    #[tokio::test]
    async fn test_interrupted_command_is_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let camera = CameraSource::new(sh("exit 130"), 0.7, dir.path().to_path_buf());

        let outcome = camera.acquire(&ScriptedInteraction::granting(None)).await;
        assert_eq!(outcome, Acquisition::Cancelled);
    }

    #[tokio::test]
    async fn test_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let camera = CameraSource::new(
            vec!["plantify-no-such-camera".to_string(), OUTPUT_PLACEHOLDER.to_string()],
            0.7,
            dir.path().to_path_buf(),
        );

        let outcome = camera.acquire(&ScriptedInteraction::granting(None)).await;
        assert!(matches!(outcome, Acquisition::Failed(reason) if reason.contains("plantify-no-such-camera")));
    }
}
