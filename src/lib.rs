//! # Sustainability Compass
//!
//! AI-assisted ESG/SDG assessment of organizational reports, with
//! multi-year trend comparison.
//!
//! ## Features
//!
//! - **Model fallback**: a ranked chain of Gemini models, tried in order with
//!   per-attempt timeouts, bounded retries for transient failures and
//!   cooperative cancellation
//! - **Analysis**: document text in, a validated assessment out (three ESG
//!   dimension scores, all 17 SDGs, executive summary, recommendations)
//! - **Report store**: SQLite persistence keyed by organization and year
//! - **Comparison**: per-dimension and per-SDG trends across years plus an
//!   AI-written narrative that degrades to a placeholder on failure
//!
//! ## Architecture
//!
//! ```text
//! document text → AnalysisEngine ─┐
//!                                 ├→ ModelSelector → ModelBackend (Gemini HTTP)
//! ReportStore → ComparisonEngine ─┘
//!      ↑
//!  SQLite (reports)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sustainability_compass::{
//!     AnalysisEngine, Config, EngineCore, GeminiClient, Language, ModelSelector, SqliteStorage,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let storage = Arc::new(SqliteStorage::new(&config.database).await?);
//!     let backend = Arc::new(GeminiClient::new(&config.gemini, &config.request)?);
//!     let selector = ModelSelector::new(config.models.clone(), backend, config.request.clone())?;
//!     let engine = AnalysisEngine::new(EngineCore::new(selector, storage), &config.analysis);
//!     let result = engine.analyze("Annual report text...", Language::En).await?;
//!     println!("{}", serde_json::to_string_pretty(&result)?);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// ESG/SDG assessment records.
pub mod assessment;
/// Configuration loaded from the environment.
pub mod config;
/// Analysis and comparison engines.
pub mod engine;
/// Error types and result aliases for the application.
pub mod error;
/// Gemini API client.
pub mod gemini;
/// Prompt text for analysis and comparison.
pub mod prompts;
/// Ranked model fallback with retry and cancellation.
pub mod selector;
/// SQLite report store.
pub mod storage;

pub use assessment::{AnalysisRequest, AnalysisResult, Language, SourceMetadata, StoredReport};
pub use config::Config;
pub use engine::{AnalysisEngine, ComparisonEngine, ComparisonResult, EngineCore};
pub use error::{AppError, AppResult};
pub use gemini::GeminiClient;
pub use selector::{CostTier, ModelBackend, ModelCandidate, ModelSelector};
pub use storage::{ReportStore, SqliteStorage};
