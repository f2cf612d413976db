//! Centralized prompt definitions for analysis and comparison
//!
//! Prompts are built here so the engines only deal with data, and so the
//! wording can be tested without a model.

use crate::assessment::{Language, SdgId};

/// Fixed instructions for a single-year ESG/SDG assessment.
pub const ANALYSIS_PROMPT: &str = r#"You are a sustainability expert assessing an organization's ESG performance and its contribution to the 17 UN Sustainable Development Goals.

Assess the document below on three dimensions, each scored from 0 to 10:
1. ECONOMIC/FINANCIAL PERFORMANCE: financial health, revenue growth, profitability, economic impact on stakeholders.
2. ENVIRONMENTAL PERFORMANCE: emissions and climate impact, energy efficiency, waste and circularity, water use, biodiversity.
3. SOCIAL PERFORMANCE: employee welfare, diversity and inclusion, community engagement, human rights, product safety.

Then assess EVERY one of the 17 SDGs listed below with an impact level (high, medium, low or none), a score from 0 to 10, up to two key contributions and up to two improvement areas.

Your response MUST be valid JSON in this exact format:
{
  "esg": {
    "economic": {"score": 7.5, "justification": "evidence from the document"},
    "environmental": {"score": 5.0, "justification": "evidence from the document"},
    "social": {"score": 6.0, "justification": "evidence from the document"}
  },
  "sdg": [
    {"id": 1, "impact_level": "low", "score": 3.0, "contributions": [], "improvement_areas": []}
  ],
  "executive_summary": "one paragraph overview",
  "recommendations": ["most important action first"]
}

Guidelines:
- The "sdg" array must contain exactly 17 entries, ids 1 to 17, each exactly once
- Scores are numbers between 0 and 10
- Base every judgement on the document; use "none" and a low score where it is silent
- Order recommendations by priority

Always respond with valid JSON only, no other text."#;

/// Fixed instructions for a multi-year narrative.
pub const COMPARISON_PROMPT: &str = r#"You are a sustainability expert reviewing how one organization's ESG and SDG performance changed across several reporting years.

Using the quantitative trends and yearly summaries below, write a comparative analysis with these sections:
1. Performance Trends: which dimensions and goals improved or declined, and by how much.
2. Strategic Insights: strategic shifts visible between the first and last year.
3. Persistent Issues: weaknesses that appear in every year.
4. Future Recommendations: concrete, prioritized actions for the coming years.
5. Benchmark Analysis: how the trajectory compares with typical industry progress.

Respond in plain prose with the section titles as headings. Do not return JSON."#;

/// Per-year executive summaries are cut to this many characters in the
/// comparison prompt.
pub const SUMMARY_EXCERPT_CHARS: usize = 200;

/// Sentence telling the model which language to answer in.
pub fn language_instruction(language: Language) -> &'static str {
    match language {
        Language::En => "Please write all prose fields in English.",
        Language::Ar => "يرجى التحليل باللغة العربية. Write all prose fields in Arabic; keep JSON keys and impact levels in English.",
    }
}

/// Numbered list of the 17 goals, one per line.
pub fn sdg_catalogue() -> String {
    SdgId::all()
        .map(|id| format!("{}: {}", id.get(), id.name()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the full single-year analysis prompt.
pub fn build_analysis_prompt(
    document_text: &str,
    language: Language,
    organization_hint: Option<&str>,
) -> String {
    let mut prompt = String::with_capacity(ANALYSIS_PROMPT.len() + document_text.len() + 1024);
    prompt.push_str(language_instruction(language));
    prompt.push_str("\n\n");
    prompt.push_str(ANALYSIS_PROMPT);
    prompt.push_str("\n\nUN SDGs:\n");
    prompt.push_str(&sdg_catalogue());

    if let Some(organization) = organization_hint.filter(|o| !o.trim().is_empty()) {
        prompt.push_str("\n\nOrganization: ");
        prompt.push_str(organization.trim());
    }

    prompt.push_str("\n\nDocument Content:\n");
    prompt.push_str(document_text);
    prompt
}

/// Build the comparison narrative prompt around a JSON trend payload.
pub fn build_comparison_prompt(payload: &serde_json::Value, language: Language) -> String {
    let pretty = serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string());
    format!(
        "{}\n\n{}\n\nComparison Data:\n{}",
        language_instruction(language),
        COMPARISON_PROMPT,
        pretty
    )
}

/// First `max_chars` characters of `text`, with an ellipsis when cut.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
