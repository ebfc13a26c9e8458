// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Plantify: Plant Identification from Photos
//!
//! Captures or picks a photo, asks a vision language model what plant it
//! shows, and keeps a local newest-first history of the answers.

pub mod acquisition;
pub mod analysis;
pub mod config;
pub mod error;
pub mod history;
pub mod openai;

pub use config::AppConfig;
pub use error::{PlantifyError, Result};
