use chrono::Utc;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::EngineCore;
use crate::assessment::{
    AnalysisRequest, AnalysisResult, EsgDimension, EsgJustification, EsgScore, ImpactLevel,
    Language, SdgAssessment, SdgEntry, SdgId, SourceMetadata, StoredReport,
};
use crate::config::AnalysisConfig;
use crate::error::{AppError, AppResult};
use crate::prompts::build_analysis_prompt;
use crate::selector::{extract_json_from_completion, FieldKind, ResponseSchema};

/// Shape the selector checks before accepting an analysis answer.
pub fn analysis_schema() -> ResponseSchema {
    ResponseSchema::json("esg_sdg_analysis")
        .field("esg", FieldKind::Object)
        .field("sdg", FieldKind::Array)
        .field("executive_summary", FieldKind::String)
        .field("recommendations", FieldKind::Array)
}

/// Turns document text into a validated ESG/SDG assessment.
#[derive(Clone)]
pub struct AnalysisEngine {
    core: EngineCore,
    max_document_chars: usize,
}

impl AnalysisEngine {
    /// Create a new analysis engine
    pub fn new(core: EngineCore, config: &AnalysisConfig) -> Self {
        Self {
            core,
            max_document_chars: config.max_document_chars,
        }
    }

    /// Analyze a document with no cancellation.
    pub async fn analyze(
        &self,
        document_text: &str,
        language: Language,
    ) -> AppResult<AnalysisResult> {
        let request = AnalysisRequest::new(document_text, language);
        self.analyze_request(&request, &CancellationToken::new())
            .await
    }

    /// Analyze a document.
    ///
    /// Fails with `Validation` for blank text, propagates selector failures
    /// unchanged, and reports `ExtractionIncomplete` when the accepted answer
    /// does not hold a complete assessment. Nothing is persisted.
    pub async fn analyze_request(
        &self,
        request: &AnalysisRequest,
        cancel: &CancellationToken,
    ) -> AppResult<AnalysisResult> {
        let request_id = Uuid::new_v4();
        let start = Instant::now();

        if request.document_text.trim().is_empty() {
            return Err(AppError::Validation {
                field: "document_text".to_string(),
                reason: "Document text cannot be empty".to_string(),
            });
        }

        let document = truncate_chars(&request.document_text, self.max_document_chars);
        if document.len() < request.document_text.len() {
            warn!(
                request_id = %request_id,
                original_chars = request.document_text.chars().count(),
                kept_chars = self.max_document_chars,
                "Document truncated before analysis"
            );
        }

        let prompt = build_analysis_prompt(
            document,
            request.language,
            request.organization_hint.as_deref(),
        );

        debug!(
            request_id = %request_id,
            language = %request.language,
            prompt_chars = prompt.len(),
            "Starting analysis"
        );

        let response = self
            .core
            .selector()
            .invoke(&prompt, &analysis_schema(), cancel)
            .await?;

        let result = parse_analysis(&response.raw, &response.model).map_err(|e| {
            warn!(
                request_id = %request_id,
                model = %response.model,
                error = %e,
                "Model answer failed assessment validation"
            );
            e
        })?;

        info!(
            request_id = %request_id,
            model = %result.model_used,
            latency_ms = start.elapsed().as_millis(),
            "Analysis completed"
        );

        Ok(result)
    }

    /// Analyze a document and file the result under `(organization, year)`.
    ///
    /// The store is only touched after a fully validated result exists.
    pub async fn analyze_and_save(
        &self,
        request: &AnalysisRequest,
        organization: &str,
        year: i32,
        metadata: SourceMetadata,
        cancel: &CancellationToken,
    ) -> AppResult<StoredReport> {
        if organization.is_empty() {
            return Err(AppError::Validation {
                field: "organization".to_string(),
                reason: "Organization cannot be empty".to_string(),
            });
        }

        let result = self.analyze_request(request, cancel).await?;

        let mut source_metadata = metadata;
        source_metadata.language.get_or_insert(request.language);
        source_metadata.analyzed_at.get_or_insert(result.timestamp);

        let report = StoredReport {
            organization: organization.to_string(),
            year,
            result,
            source_metadata,
        };
        self.core.storage().save(&report).await?;

        info!(organization = %organization, year, "Analysis saved");
        Ok(report)
    }
}

/// First `max_chars` characters of `text`.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// Wire shape of the model's answer. Field checks beyond what serde can
// express happen in `parse_analysis`.
#[derive(Deserialize)]
struct RawAnalysis {
    esg: RawEsg,
    sdg: Vec<RawSdg>,
    executive_summary: String,
    recommendations: Vec<String>,
}

#[derive(Deserialize)]
struct RawEsg {
    economic: Option<RawDimension>,
    environmental: Option<RawDimension>,
    social: Option<RawDimension>,
}

impl RawEsg {
    fn take(&mut self, dimension: EsgDimension) -> Option<RawDimension> {
        match dimension {
            EsgDimension::Economic => self.economic.take(),
            EsgDimension::Environmental => self.environmental.take(),
            EsgDimension::Social => self.social.take(),
        }
    }
}

#[derive(Deserialize)]
struct RawDimension {
    #[serde(deserialize_with = "lenient_f64")]
    score: f64,
    #[serde(default)]
    justification: String,
}

#[derive(Deserialize)]
struct RawSdg {
    id: u8,
    impact_level: String,
    #[serde(deserialize_with = "lenient_f64")]
    score: f64,
    #[serde(default)]
    contributions: Vec<String>,
    #[serde(default)]
    improvement_areas: Vec<String>,
}

/// Accept `7.5` as well as `"7.5"`; some models quote numbers.
fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        String(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("'{}' is not a number", s))),
    }
}

fn incomplete(message: impl Into<String>) -> AppError {
    AppError::ExtractionIncomplete {
        message: message.into(),
    }
}

/// Validate a schema-conforming answer into an [`AnalysisResult`].
fn parse_analysis(raw: &str, model: &str) -> AppResult<AnalysisResult> {
    let json = extract_json_from_completion(raw).map_err(incomplete)?;
    let mut parsed: RawAnalysis = serde_json::from_str(json)
        .map_err(|e| incomplete(format!("Malformed assessment: {}", e)))?;

    let mut scores = [0.0; 3];
    let mut justification = EsgJustification::default();
    for (slot, dimension) in EsgDimension::ALL.into_iter().enumerate() {
        let entry = parsed
            .esg
            .take(dimension)
            .ok_or_else(|| incomplete(format!("Missing ESG dimension: {}", dimension)))?;
        scores[slot] = entry.score;
        match dimension {
            EsgDimension::Economic => justification.economic = entry.justification,
            EsgDimension::Environmental => justification.environmental = entry.justification,
            EsgDimension::Social => justification.social = entry.justification,
        }
    }
    let esg = EsgScore::new(scores[0], scores[1], scores[2]).map_err(incomplete)?;

    let mut entries = BTreeMap::new();
    for raw_sdg in parsed.sdg {
        let id = SdgId::new(raw_sdg.id)
            .ok_or_else(|| incomplete(format!("SDG id {} is outside 1..=17", raw_sdg.id)))?;
        let impact_level: ImpactLevel = raw_sdg.impact_level.parse().map_err(incomplete)?;

        let entry = SdgEntry {
            impact_level,
            score: raw_sdg.score,
            contributions: raw_sdg.contributions,
            improvement_areas: raw_sdg.improvement_areas,
        };
        if entries.insert(id, entry).is_some() {
            return Err(incomplete(format!("{} assessed more than once", id)));
        }
    }
    let sdg = SdgAssessment::from_entries(entries).map_err(incomplete)?;

    if parsed.executive_summary.trim().is_empty() {
        return Err(incomplete("Executive summary is empty"));
    }

    Ok(AnalysisResult {
        esg,
        esg_justification: justification,
        sdg,
        executive_summary: parsed.executive_summary.trim().to_string(),
        recommendations: parsed.recommendations,
        model_used: model.to_string(),
        timestamp: Utc::now(),
    })
}
