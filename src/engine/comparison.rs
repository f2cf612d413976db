use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::EngineCore;
use crate::assessment::{EsgDimension, SdgId, StoredReport};
use crate::error::{AppError, AppResult, SelectorError};
use crate::prompts::{build_comparison_prompt, excerpt, SUMMARY_EXCERPT_CHARS};
use crate::selector::ResponseSchema;

/// SDGs scoring above this are listed as a year's strengths in the narrative prompt.
const STRONG_SDG_SCORE: f64 = 6.0;

/// Narrative used when no candidate could write one.
pub const NARRATIVE_UNAVAILABLE: &str =
    "[Narrative generation failed: no model candidate produced a comparison narrative. Quantitative trends are unaffected.]";

/// Sign of a change between the first and last year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Last value above the first
    Improving,
    /// Last value below the first
    Declining,
    /// Equal endpoints
    Flat,
}

impl Direction {
    /// Classify a delta with exact comparison against zero.
    pub fn from_delta(delta: f64) -> Self {
        if delta > 0.0 {
            Direction::Improving
        } else if delta < 0.0 {
            Direction::Declining
        } else {
            Direction::Flat
        }
    }

    /// Get the direction as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Improving => "improving",
            Direction::Declining => "declining",
            Direction::Flat => "flat",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Change of one score between the chronologically first and last year.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendDelta {
    /// Score in the earliest year
    pub first_value: f64,
    /// Score in the latest year
    pub last_value: f64,
    /// `last_value - first_value`
    pub delta: f64,
    /// Sign of `delta`
    pub direction: Direction,
}

impl TrendDelta {
    /// Delta from `first_value` to `last_value`
    pub fn between(first_value: f64, last_value: f64) -> Self {
        let delta = last_value - first_value;
        Self {
            first_value,
            last_value,
            delta,
            direction: Direction::from_delta(delta),
        }
    }
}

/// Counts of improving, declining and flat series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionCounts {
    /// Series with a positive delta
    pub improving: usize,
    /// Series with a negative delta
    pub declining: usize,
    /// Series with a zero delta
    pub flat: usize,
}

impl DirectionCounts {
    fn tally<'a>(deltas: impl Iterator<Item = &'a TrendDelta>) -> Self {
        deltas.fold(Self::default(), |mut counts, d| {
            match d.direction {
                Direction::Improving => counts.improving += 1,
                Direction::Declining => counts.declining += 1,
                Direction::Flat => counts.flat += 1,
            }
            counts
        })
    }
}

/// Headline numbers of a comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonSummary {
    /// `"first-last"`, e.g. `"2022-2024"`.
    pub year_range: String,
    /// Distinct years compared.
    pub total_years: usize,
    /// Directions over the three ESG dimensions.
    pub esg: DirectionCounts,
    /// Directions over the 17 SDGs.
    pub sdg: DirectionCounts,
}

/// Multi-year trend analysis of one organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    /// Organization compared.
    pub organization: String,
    /// Ascending, at least two.
    pub years: Vec<i32>,
    /// First-to-last change of each ESG dimension.
    pub per_dimension_delta: BTreeMap<EsgDimension, TrendDelta>,
    /// One score per entry of `years`, in the same order.
    pub per_sdg_trajectory: BTreeMap<SdgId, Vec<f64>>,
    /// First-to-last change of each SDG.
    pub per_sdg_delta: BTreeMap<SdgId, TrendDelta>,
    /// Headline counts.
    pub summary: ComparisonSummary,
    /// Model-written analysis, or [`NARRATIVE_UNAVAILABLE`].
    pub narrative: String,
    /// Model that wrote `narrative`; `None` when the placeholder is used.
    pub narrative_model: Option<String>,
    /// When the comparison finished.
    pub generated_at: DateTime<Utc>,
}

impl ComparisonResult {
    /// True when the narrative step failed and the placeholder was used.
    pub fn narrative_failed(&self) -> bool {
        self.narrative_model.is_none()
    }
}

/// Aggregates stored reports across years into trends plus a narrative.
#[derive(Clone)]
pub struct ComparisonEngine {
    core: EngineCore,
}

impl ComparisonEngine {
    /// Create a new comparison engine
    pub fn new(core: EngineCore) -> Self {
        Self { core }
    }

    /// Compare the given years of an organization with no cancellation.
    pub async fn compare(
        &self,
        organization: &str,
        years: &[i32],
    ) -> AppResult<ComparisonResult> {
        self.compare_with_cancel(organization, years, &CancellationToken::new())
            .await
    }

    /// Compare the given years of an organization.
    ///
    /// Duplicate years count once. Years are processed in ascending order
    /// whatever order they are passed in. The narrative is written in the
    /// language recorded for the latest year.
    pub async fn compare_with_cancel(
        &self,
        organization: &str,
        years: &[i32],
        cancel: &CancellationToken,
    ) -> AppResult<ComparisonResult> {
        let request_id = Uuid::new_v4();
        let start = Instant::now();

        let distinct: BTreeSet<i32> = years.iter().copied().collect();
        if distinct.len() < 2 {
            return Err(AppError::InsufficientYears {
                distinct: distinct.len(),
            });
        }

        let mut reports = Vec::with_capacity(distinct.len());
        for year in &distinct {
            reports.push(self.core.storage().load(organization, *year).await?);
        }

        debug!(
            request_id = %request_id,
            organization = %organization,
            years = ?distinct,
            "Loaded reports for comparison"
        );

        let trends = Trends::compute(&reports);

        let language = reports
            .last()
            .and_then(|r| r.source_metadata.language)
            .unwrap_or_default();
        let prompt = build_comparison_prompt(&trends.payload(organization, &reports), language);

        let (narrative, narrative_model) = match self
            .core
            .selector()
            .invoke(&prompt, &ResponseSchema::Text, cancel)
            .await
        {
            Ok(response) => (response.raw.trim().to_string(), Some(response.model)),
            Err(SelectorError::AllCandidatesExhausted { failures }) => {
                warn!(
                    request_id = %request_id,
                    failed_candidates = failures.len(),
                    "Narrative generation failed, returning quantitative comparison"
                );
                (NARRATIVE_UNAVAILABLE.to_string(), None)
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            request_id = %request_id,
            organization = %organization,
            years = trends.years.len(),
            narrative_model = ?narrative_model,
            latency_ms = start.elapsed().as_millis(),
            "Comparison completed"
        );

        let summary = trends.summary();
        Ok(ComparisonResult {
            organization: organization.to_string(),
            years: trends.years,
            per_dimension_delta: trends.per_dimension_delta,
            per_sdg_trajectory: trends.per_sdg_trajectory,
            per_sdg_delta: trends.per_sdg_delta,
            summary,
            narrative,
            narrative_model,
            generated_at: Utc::now(),
        })
    }
}

/// The deterministic half of a comparison.
struct Trends {
    years: Vec<i32>,
    per_dimension_delta: BTreeMap<EsgDimension, TrendDelta>,
    per_sdg_trajectory: BTreeMap<SdgId, Vec<f64>>,
    per_sdg_delta: BTreeMap<SdgId, TrendDelta>,
}

impl Trends {
    /// `reports` must be non-empty and sorted by year ascending.
    fn compute(reports: &[StoredReport]) -> Self {
        let years = reports.iter().map(|r| r.year).collect();

        let per_dimension_delta = EsgDimension::ALL
            .into_iter()
            .map(|dimension| {
                let series: Vec<f64> = reports
                    .iter()
                    .map(|r| r.result.esg.get(dimension))
                    .collect();
                (dimension, delta_of(&series))
            })
            .collect();

        let per_sdg_trajectory: BTreeMap<SdgId, Vec<f64>> = SdgId::all()
            .map(|id| {
                let series = reports.iter().map(|r| r.result.sdg.get(id).score).collect();
                (id, series)
            })
            .collect();

        let per_sdg_delta = per_sdg_trajectory
            .iter()
            .map(|(id, series)| (*id, delta_of(series)))
            .collect();

        Self {
            years,
            per_dimension_delta,
            per_sdg_trajectory,
            per_sdg_delta,
        }
    }

    fn summary(&self) -> ComparisonSummary {
        let first = self.years.first().copied().unwrap_or_default();
        let last = self.years.last().copied().unwrap_or_default();
        ComparisonSummary {
            year_range: format!("{}-{}", first, last),
            total_years: self.years.len(),
            esg: DirectionCounts::tally(self.per_dimension_delta.values()),
            sdg: DirectionCounts::tally(self.per_sdg_delta.values()),
        }
    }

    /// Aggregation payload handed to the narrative prompt.
    fn payload(&self, organization: &str, reports: &[StoredReport]) -> serde_json::Value {
        let esg_trends: Vec<serde_json::Value> = self
            .per_dimension_delta
            .iter()
            .map(|(dimension, delta)| {
                json!({
                    "dimension": dimension,
                    "label": dimension.label(),
                    "first_value": delta.first_value,
                    "last_value": delta.last_value,
                    "delta": delta.delta,
                    "direction": delta.direction,
                })
            })
            .collect();

        let sdg_trends: Vec<serde_json::Value> = self
            .per_sdg_trajectory
            .iter()
            .map(|(id, series)| {
                json!({
                    "id": id.get(),
                    "name": id.name(),
                    "scores": series,
                    "direction": self.per_sdg_delta[id].direction,
                })
            })
            .collect();

        let yearly: Vec<serde_json::Value> = reports
            .iter()
            .map(|r| {
                let strongest: Vec<serde_json::Value> = r
                    .result
                    .sdg
                    .top(STRONG_SDG_SCORE)
                    .into_iter()
                    .map(|(id, score)| json!({"id": id.get(), "name": id.name(), "score": score}))
                    .collect();
                json!({
                    "year": r.year,
                    "esg_average": r.result.esg.average(),
                    "strongest_sdgs": strongest,
                    "executive_summary": excerpt(&r.result.executive_summary, SUMMARY_EXCERPT_CHARS),
                    "recommendations": r.result.recommendations,
                })
            })
            .collect();

        json!({
            "organization": organization,
            "years": self.years,
            "summary": self.summary(),
            "esg_trends": esg_trends,
            "sdg_trends": sdg_trends,
            "yearly_reports": yearly,
        })
    }
}

fn delta_of(series: &[f64]) -> TrendDelta {
    let first = series.first().copied().unwrap_or_default();
    let last = series.last().copied().unwrap_or_default();
    TrendDelta::between(first, last)
}
