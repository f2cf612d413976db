use std::env;
use std::path::PathBuf;

use crate::error::AppError;
use crate::selector::{CostTier, ModelCandidate};

/// Default fallback chain: free-tier models first, paid model last.
pub const DEFAULT_MODEL_CANDIDATES: &str =
    "gemini-2.5-flash:free,gemini-2.0-flash:free,gemini-1.5-flash:free,gemini-1.5-pro:free,gemini-2.5-pro:paid";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Gemini endpoint and credentials
    pub gemini: GeminiConfig,
    /// Fallback chain in trial order
    pub models: Vec<ModelCandidate>,
    /// Report store location
    pub database: DatabaseConfig,
    /// Log level and format
    pub logging: LoggingConfig,
    /// Timeout and retry policy
    pub request: RequestConfig,
    /// Analysis tuning
    pub analysis: AnalysisConfig,
}

/// Gemini API configuration
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key sent with every request
    pub api_key: String,
    /// Base URL without the `/v1beta` path
    pub base_url: String,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// SQLite file, created if missing
    pub path: PathBuf,
    /// Pool size
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    /// Human-readable
    Pretty,
    /// One JSON object per line
    Json,
}

/// Per-attempt timeout and transient retry policy
#[derive(Debug, Clone)]
pub struct RequestConfig {
    /// Deadline of one model attempt.
    pub timeout_ms: u64,
    /// Retries of a transient failure on the same candidate.
    pub max_retries: u32,
    /// Wait before the first retry; doubles on each further retry.
    pub retry_delay_ms: u64,
    /// Ceiling on any single retry wait.
    pub max_retry_delay_ms: u64,
}

/// Analysis tuning
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Document text beyond this many characters is dropped before prompting.
    pub max_document_chars: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let gemini = GeminiConfig {
            api_key: env::var("GEMINI_API_KEY").map_err(|_| AppError::Config {
                message: "GEMINI_API_KEY is required".to_string(),
            })?,
            base_url: env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_string()),
        };

        let models = parse_model_candidates(
            &env::var("MODEL_CANDIDATES").unwrap_or_else(|_| DEFAULT_MODEL_CANDIDATES.to_string()),
        )?;

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/reports.db".to_string()),
            ),
            max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: parse_or("REQUEST_TIMEOUT_MS", 30000),
            max_retries: parse_or("MAX_RETRIES", 3),
            retry_delay_ms: parse_or("RETRY_DELAY_MS", 1000),
            max_retry_delay_ms: parse_or("MAX_RETRY_DELAY_MS", 30000),
        };

        let analysis = AnalysisConfig {
            max_document_chars: parse_or("MAX_DOCUMENT_CHARS", 60000),
        };

        Ok(Config {
            gemini,
            models,
            database,
            logging,
            request,
            analysis,
        })
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Parse a `identifier[:free|paid]` comma list into a ranked fallback chain.
///
/// Rank follows list position. A missing tier means `free`.
pub fn parse_model_candidates(list: &str) -> Result<Vec<ModelCandidate>, AppError> {
    let mut candidates = Vec::new();

    for entry in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (identifier, tier) = match entry.rsplit_once(':') {
            Some((id, tier)) => {
                let tier = tier.parse::<CostTier>().map_err(|e| AppError::Config {
                    message: format!("MODEL_CANDIDATES entry '{}': {}", entry, e),
                })?;
                (id.trim(), tier)
            }
            None => (entry, CostTier::Free),
        };

        if identifier.is_empty() {
            return Err(AppError::Config {
                message: format!("MODEL_CANDIDATES entry '{}' has no model identifier", entry),
            });
        }

        candidates.push(ModelCandidate::new(identifier, tier, candidates.len() as u32));
    }

    if candidates.is_empty() {
        return Err(AppError::Config {
            message: "MODEL_CANDIDATES must name at least one model".to_string(),
        });
    }

    Ok(candidates)
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 3,
            retry_delay_ms: 1000,
            max_retry_delay_ms: 30000,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_document_chars: 60000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_chain_is_ranked_in_order() {
        let models = parse_model_candidates(DEFAULT_MODEL_CANDIDATES).unwrap();
        assert_eq!(models.len(), 5);
        assert_eq!(models[0].identifier, "gemini-2.5-flash");
        assert_eq!(models[4].cost_tier, CostTier::Paid);
        for (i, m) in models.iter().enumerate() {
            assert_eq!(m.priority_rank, i as u32);
        }
    }

    #[test]
    fn test_tier_defaults_to_free() {
        let models = parse_model_candidates("alpha, beta:paid").unwrap();
        assert_eq!(models[0].identifier, "alpha");
        assert_eq!(models[0].cost_tier, CostTier::Free);
        assert_eq!(models[1].identifier, "beta");
        assert_eq!(models[1].cost_tier, CostTier::Paid);
    }

    #[test]
    fn test_unknown_tier_is_rejected() {
        let err = parse_model_candidates("alpha:premium").unwrap_err();
        assert!(err.to_string().contains("alpha:premium"));
    }

    #[test]
    fn test_empty_list_is_rejected() {
        assert!(parse_model_candidates(" , ").is_err());
        assert!(parse_model_candidates(":free").is_err());
    }

    #[test]
    fn test_request_config_default() {
        let config = RequestConfig::default();
        assert_eq!(config.timeout_ms, 30000);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay_ms, 1000);
        assert_eq!(config.max_retry_delay_ms, 30000);
    }
}
