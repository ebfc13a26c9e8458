// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Plant identification through a remote vision model
//!
//! One call to [`AnalysisClient::analyze`] reads and encodes the image, sends
//! a single chat-completion request and records a successful answer in the
//! history. The whole read-and-request sequence races one deadline; when the
//! deadline wins, the in-flight request is dropped and its answer can never
//! reach the history.

use base64::{engine::general_purpose, Engine as _};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::acquisition::ImageUri;
use crate::config::{ApiCredential, AppConfig};
use crate::error::StorageError;
use crate::history::{AnalysisRecord, HistoryStore, KeyValueStore};
use crate::openai::{ChatRequest, OpenAiClient};
use crate::{PlantifyError, Result};

/// Text recorded when the model answers without any content
pub const NO_RESPONSE_PLACEHOLDER: &str = "No response received.";

/// Everything an analysis needs besides the credential
#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    pub base_url: String,
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl AnalysisSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            base_url: config.api.base_url.clone(),
            model: config.api.model.clone(),
            system_prompt: config.prompts.system.clone(),
            user_prompt: config.prompts.user.clone(),
            max_tokens: config.api.max_tokens,
            timeout: config.api.timeout(),
        }
    }
}

/// Progress of a single analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisState {
    Idle,
    Encoding,
    AwaitingResponse,
    Succeeded,
    TimedOut,
    ApiError,
    NetworkError,
    ReadFailed,
}

impl AnalysisState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Idle | Self::Encoding | Self::AwaitingResponse)
    }
}

/// A successful analysis and what happened when saving it
#[derive(Debug)]
pub struct AnalysisOutcome {
    pub record: AnalysisRecord,
    /// The model sent no text and the placeholder was used
    pub placeholder: bool,
    pub persisted: std::result::Result<(), StorageError>,
}

impl AnalysisOutcome {
    pub fn text(&self) -> &str {
        self.record.result()
    }
}

/// Sends images to the vision model and records the answers
pub struct AnalysisClient<S> {
    settings: AnalysisSettings,
    api: Option<OpenAiClient>,
    history: Arc<HistoryStore<S>>,
}

impl<S: KeyValueStore> AnalysisClient<S> {
    /// Without a credential every analysis fails before touching the network
    pub fn new(
        settings: AnalysisSettings,
        credential: Option<ApiCredential>,
        history: Arc<HistoryStore<S>>,
    ) -> Result<Self> {
        let api = credential
            .map(|c| OpenAiClient::new(&settings.base_url, c))
            .transpose()?;

        Ok(Self { settings, api, history })
    }

    pub fn has_credential(&self) -> bool {
        self.api.is_some()
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    pub async fn analyze(&self, image: &ImageUri) -> Result<AnalysisOutcome> {
        self.analyze_with_progress(image, |_| {}).await
    }

    /// Analyze `image`, reporting each state change to `on_state`
    pub async fn analyze_with_progress<F>(&self, image: &ImageUri, mut on_state: F) -> Result<AnalysisOutcome>
    where
        F: FnMut(AnalysisState),
    {
        let mut report = |state: AnalysisState| {
            debug!("Analysis of {} is {:?}", image, state);
            on_state(state);
        };
        report(AnalysisState::Idle);

        let Some(api) = &self.api else {
            warn!("No API credential configured, not sending {}", image);
            return Err(PlantifyError::missing_credential());
        };

        let timeout = self.settings.timeout;
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        report(AnalysisState::Encoding);
        let encoded = tokio::select! {
            read = tokio::fs::read(image.to_path()) => read,
            _ = &mut deadline => {
                report(AnalysisState::TimedOut);
                warn!("Analysis timed out after {:?} while reading {}", timeout, image);
                return Err(PlantifyError::TimedOut(timeout));
            }
        };
        let encoded = match encoded {
            Ok(bytes) => general_purpose::STANDARD.encode(&bytes),
            Err(e) => {
                report(AnalysisState::ReadFailed);
                return Err(PlantifyError::FileSystem(e));
            }
        };

        let request = ChatRequest::vision(
            &self.settings.model,
            &self.settings.system_prompt,
            &self.settings.user_prompt,
            &encoded,
            self.settings.max_tokens,
        );

        report(AnalysisState::AwaitingResponse);
        let response = tokio::select! {
            response = api.chat_completion(&request) => response,
            _ = &mut deadline => {
                report(AnalysisState::TimedOut);
                warn!("Analysis timed out after {:?}, dropping the request", timeout);
                return Err(PlantifyError::TimedOut(timeout));
            }
        };

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                report(AnalysisState::NetworkError);
                return Err(e);
            }
        };

        if let Some(message) = response.error_message() {
            report(AnalysisState::ApiError);
            return Err(PlantifyError::Api(message));
        }

        let (text, placeholder) = match response.first_content() {
            Some(text) => (text.to_string(), false),
            None => {
                warn!("Response carried no completion text, recording placeholder");
                (NO_RESPONSE_PLACEHOLDER.to_string(), true)
            }
        };
        report(AnalysisState::Succeeded);

        let record = AnalysisRecord::new(image, text);
        let persisted = self.history.append(record.clone()).await;
        match &persisted {
            Ok(()) => info!("Saved analysis of {} to history", image),
            Err(e) => warn!("Failed to save analysis history: {}", e),
        }

        Ok(AnalysisOutcome {
            record,
            placeholder,
            persisted,
        })
    }
}
