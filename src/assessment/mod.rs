//! ESG/SDG assessment records.
//!
//! These are the structured values produced by the analysis engine, kept by
//! the report store and consumed by the comparison engine.


use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Inclusive upper bound of every ESG and SDG score.
pub const MAX_SCORE: f64 = 10.0;

/// Number of UN Sustainable Development Goals.
pub const SDG_COUNT: u8 = 17;

/// Official short names of the 17 SDGs, indexed by `id - 1`.
pub const SDG_NAMES: [&str; SDG_COUNT as usize] = [
    "No Poverty",
    "Zero Hunger",
    "Good Health and Well-being",
    "Quality Education",
    "Gender Equality",
    "Clean Water and Sanitation",
    "Affordable and Clean Energy",
    "Decent Work and Economic Growth",
    "Industry, Innovation and Infrastructure",
    "Reduced Inequalities",
    "Sustainable Cities and Communities",
    "Responsible Consumption and Production",
    "Climate Action",
    "Life Below Water",
    "Life on Land",
    "Peace, Justice and Strong Institutions",
    "Partnerships for the Goals",
];

/// True when `score` is a finite number within `[0, MAX_SCORE]`.
pub fn score_in_range(score: f64) -> bool {
    score.is_finite() && (0.0..=MAX_SCORE).contains(&score)
}

/// Output language of an analysis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// English
    #[default]
    En,
    /// Arabic
    Ar,
}

impl Language {
    /// Get the language tag as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Ar => "ar",
        }
    }

    /// Guess the language of extracted text: Arabic when more than 30% of
    /// its alphabetic characters are Arabic script.
    pub fn detect(text: &str) -> Self {
        let (arabic, alphabetic) = text
            .chars()
            .filter(|c| c.is_alphabetic())
            .fold((0usize, 0usize), |(ar, total), c| {
                (ar + usize::from(is_arabic_script(c)), total + 1)
            });

        if alphabetic > 0 && arabic * 10 > alphabetic * 3 {
            Language::Ar
        } else {
            Language::En
        }
    }
}

fn is_arabic_script(c: char) -> bool {
    matches!(c,
        '\u{0600}'..='\u{06FF}'
        | '\u{0750}'..='\u{077F}'
        | '\u{08A0}'..='\u{08FF}'
        | '\u{FB50}'..='\u{FDFF}'
        | '\u{FE70}'..='\u{FEFF}')
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "en" | "english" => Ok(Language::En),
            "ar" | "arabic" => Ok(Language::Ar),
            _ => Err(format!("Unsupported language: {}", s)),
        }
    }
}

/// One of the three scored performance dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EsgDimension {
    /// Economic and financial performance
    Economic,
    /// Environmental impact
    Environmental,
    /// Social responsibility
    Social,
}

impl EsgDimension {
    /// All dimensions in canonical order.
    pub const ALL: [EsgDimension; 3] = [
        EsgDimension::Economic,
        EsgDimension::Environmental,
        EsgDimension::Social,
    ];

    /// Get the dimension key as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            EsgDimension::Economic => "economic",
            EsgDimension::Environmental => "environmental",
            EsgDimension::Social => "social",
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            EsgDimension::Economic => "Economic/Financial Performance",
            EsgDimension::Environmental => "Environmental Impact",
            EsgDimension::Social => "Social Responsibility",
        }
    }
}

impl std::fmt::Display for EsgDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Scores for the three ESG dimensions, each in `[0, 10]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EsgScore {
    /// Economic score
    pub economic: f64,
    /// Environmental score
    pub environmental: f64,
    /// Social score
    pub social: f64,
}

impl EsgScore {
    /// Create a score set, rejecting any value outside `[0, 10]`.
    pub fn new(economic: f64, environmental: f64, social: f64) -> Result<Self, String> {
        let score = Self {
            economic,
            environmental,
            social,
        };
        for dimension in EsgDimension::ALL {
            let value = score.get(dimension);
            if !score_in_range(value) {
                return Err(format!(
                    "{} score {} is outside [0, {}]",
                    dimension, value, MAX_SCORE
                ));
            }
        }
        Ok(score)
    }

    /// Score of one dimension
    pub fn get(&self, dimension: EsgDimension) -> f64 {
        match dimension {
            EsgDimension::Economic => self.economic,
            EsgDimension::Environmental => self.environmental,
            EsgDimension::Social => self.social,
        }
    }

    /// Mean of the three dimensions
    pub fn average(&self) -> f64 {
        (self.economic + self.environmental + self.social) / 3.0
    }
}

/// Model-supplied reasoning behind each ESG score.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EsgJustification {
    /// Evidence for the economic score
    #[serde(default)]
    pub economic: String,
    /// Evidence for the environmental score
    #[serde(default)]
    pub environmental: String,
    /// Evidence for the social score
    #[serde(default)]
    pub social: String,
}

/// How strongly an organization touches an SDG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactLevel {
    /// No visible link
    None,
    /// Indirect or marginal
    Low,
    /// Material
    Medium,
    /// Core to the business
    High,
}

impl ImpactLevel {
    /// Get the level as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            ImpactLevel::None => "none",
            ImpactLevel::Low => "low",
            ImpactLevel::Medium => "medium",
            ImpactLevel::High => "high",
        }
    }
}

impl std::fmt::Display for ImpactLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ImpactLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(ImpactLevel::None),
            "low" => Ok(ImpactLevel::Low),
            "medium" => Ok(ImpactLevel::Medium),
            "high" => Ok(ImpactLevel::High),
            _ => Err(format!("Unknown impact level: {}", s)),
        }
    }
}

/// SDG number, always within `1..=17`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct SdgId(u8);

impl SdgId {
    /// Create an id, or `None` outside `1..=17`.
    pub fn new(id: u8) -> Option<Self> {
        (1..=SDG_COUNT).contains(&id).then_some(Self(id))
    }

    /// All 17 ids in numeric order.
    pub fn all() -> impl Iterator<Item = SdgId> {
        (1..=SDG_COUNT).map(SdgId)
    }

    /// Numeric value
    pub fn get(&self) -> u8 {
        self.0
    }

    /// Official goal name
    pub fn name(&self) -> &'static str {
        SDG_NAMES[(self.0 - 1) as usize]
    }
}

impl TryFrom<u8> for SdgId {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        SdgId::new(value).ok_or_else(|| format!("SDG id {} is outside 1..={}", value, SDG_COUNT))
    }
}

impl From<SdgId> for u8 {
    fn from(id: SdgId) -> Self {
        id.0
    }
}

impl std::fmt::Display for SdgId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SDG {}", self.0)
    }
}

/// Assessment of a single SDG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SdgEntry {
    /// Strength of the link to the goal
    pub impact_level: ImpactLevel,
    /// Score in `[0, 10]`
    pub score: f64,
    /// Key contributions cited by the model
    #[serde(default)]
    pub contributions: Vec<String>,
    /// Areas where the organization falls short
    #[serde(default)]
    pub improvement_areas: Vec<String>,
}

impl SdgEntry {
    /// Create an entry without prose details
    pub fn new(impact_level: ImpactLevel, score: f64) -> Self {
        Self {
            impact_level,
            score,
            contributions: Vec::new(),
            improvement_areas: Vec::new(),
        }
    }
}

/// All 17 SDG assessments, ordered by goal number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<SdgId, SdgEntry>", into = "BTreeMap<SdgId, SdgEntry>")]
pub struct SdgAssessment {
    entries: BTreeMap<SdgId, SdgEntry>,
}

impl SdgAssessment {
    /// Build an assessment; every goal 1..=17 must be present with a score in range.
    pub fn from_entries(entries: BTreeMap<SdgId, SdgEntry>) -> Result<Self, String> {
        if entries.len() != SDG_COUNT as usize {
            let missing: Vec<String> = SdgId::all()
                .filter(|id| !entries.contains_key(id))
                .map(|id| id.get().to_string())
                .collect();
            return Err(format!(
                "expected {} SDG entries, found {} (missing: {})",
                SDG_COUNT,
                entries.len(),
                missing.join(", ")
            ));
        }

        if let Some((id, entry)) = entries.iter().find(|(_, e)| !score_in_range(e.score)) {
            return Err(format!(
                "{} score {} is outside [0, {}]",
                id, entry.score, MAX_SCORE
            ));
        }

        Ok(Self { entries })
    }

    /// Entry for one goal
    pub fn get(&self, id: SdgId) -> &SdgEntry {
        // from_entries guarantees every id is present
        &self.entries[&id]
    }

    /// Iterate goals in numeric order
    pub fn iter(&self) -> impl Iterator<Item = (SdgId, &SdgEntry)> {
        self.entries.iter().map(|(id, e)| (*id, e))
    }

    /// Goals scoring strictly above `threshold`, highest first.
    pub fn top(&self, threshold: f64) -> Vec<(SdgId, f64)> {
        let mut top: Vec<(SdgId, f64)> = self
            .iter()
            .filter(|(_, e)| e.score > threshold)
            .map(|(id, e)| (id, e.score))
            .collect();
        top.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        top
    }
}

impl TryFrom<BTreeMap<SdgId, SdgEntry>> for SdgAssessment {
    type Error = String;

    fn try_from(entries: BTreeMap<SdgId, SdgEntry>) -> Result<Self, Self::Error> {
        SdgAssessment::from_entries(entries)
    }
}

impl From<SdgAssessment> for BTreeMap<SdgId, SdgEntry> {
    fn from(assessment: SdgAssessment) -> Self {
        assessment.entries
    }
}

/// Input to one analysis call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// Extracted report text; must not be blank.
    pub document_text: String,
    /// Language the prose fields are written in.
    pub language: Language,
    /// Organization named in the prompt, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_hint: Option<String>,
}

impl AnalysisRequest {
    /// Create a new request
    pub fn new(document_text: impl Into<String>, language: Language) -> Self {
        Self {
            document_text: document_text.into(),
            language,
            organization_hint: None,
        }
    }

    /// Name the organization the document belongs to
    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization_hint = Some(organization.into());
        self
    }
}

/// Validated outcome of one successful analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Dimension scores.
    pub esg: EsgScore,
    /// Reasoning behind `esg`.
    #[serde(default)]
    pub esg_justification: EsgJustification,
    /// All 17 goals.
    pub sdg: SdgAssessment,
    /// Non-empty overview paragraph.
    pub executive_summary: String,
    /// Actions in the priority order the model gave.
    pub recommendations: Vec<String>,
    /// Identifier of the candidate model that produced this result.
    pub model_used: String,
    /// When the analysis finished.
    pub timestamp: DateTime<Utc>,
}

/// Provenance of a stored report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// Name of the source document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Pages in the source document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    /// Language the analysis was written in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
    /// When the analysis ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzed_at: Option<DateTime<Utc>>,
    /// Anything else the extraction collaborator wants to keep.
    #[serde(default)]
    pub extra: serde_json::Value,
}

impl SourceMetadata {
    /// Set the source file name
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    /// Set the page count
    pub fn with_page_count(mut self, page_count: u32) -> Self {
        self.page_count = Some(page_count);
        self
    }

    /// Set the document language
    pub fn with_language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }

    /// Set the analysis time
    pub fn with_analyzed_at(mut self, analyzed_at: DateTime<Utc>) -> Self {
        self.analyzed_at = Some(analyzed_at);
        self
    }

    /// Attach free-form metadata
    pub fn with_extra(mut self, extra: serde_json::Value) -> Self {
        self.extra = extra;
        self
    }
}

/// An analysis result filed under `(organization, year)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReport {
    /// Organization name, exact case.
    pub organization: String,
    /// Reporting year.
    pub year: i32,
    /// The validated analysis.
    pub result: AnalysisResult,
    /// Where the analysis came from.
    pub source_metadata: SourceMetadata,
}
