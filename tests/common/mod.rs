//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use sustainability_compass::assessment::{
    AnalysisResult, EsgJustification, EsgScore, ImpactLevel, Language, SdgAssessment, SdgEntry,
    SdgId, SourceMetadata, StoredReport,
};
use sustainability_compass::config::RequestConfig;
use sustainability_compass::error::{ModelError, ModelResult};
use sustainability_compass::selector::{CostTier, ModelBackend, ModelCandidate, ModelRequest};

/// What a scripted model does on one call.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Quota,
    Unavailable,
    ServerError,
    /// Answer after a delay.
    Slow(Duration, String),
    /// Never answer.
    Hang,
}

/// Backend whose models follow per-model scripts. The last reply of a
/// script repeats once the script runs out.
#[derive(Default)]
pub struct ScriptedBackend {
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, model: &str, replies: Vec<Reply>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(model.to_string(), replies.into());
        self
    }

    /// Models called so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn next_reply(&self, model: &str) -> Reply {
        let mut scripts = self.scripts.lock().unwrap();
        let script = scripts
            .get_mut(model)
            .unwrap_or_else(|| panic!("no script for model {}", model));
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().cloned().expect("empty script")
        }
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    async fn generate(&self, request: &ModelRequest) -> ModelResult<String> {
        self.calls.lock().unwrap().push(request.model.clone());
        self.prompts.lock().unwrap().push(request.prompt.clone());

        match self.next_reply(&request.model) {
            Reply::Text(text) => Ok(text),
            Reply::Quota => Err(ModelError::QuotaExceeded {
                message: format!("{} quota exhausted", request.model),
            }),
            Reply::Unavailable => Err(ModelError::Unavailable {
                message: format!("{} not found", request.model),
            }),
            Reply::ServerError => Err(ModelError::Api {
                status: 503,
                message: "overloaded".to_string(),
            }),
            Reply::Slow(delay, text) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
            Reply::Hang => std::future::pending().await,
        }
    }
}

/// Free-tier candidates ranked in the given order.
pub fn candidates(models: &[&str]) -> Vec<ModelCandidate> {
    models
        .iter()
        .enumerate()
        .map(|(rank, id)| ModelCandidate::new(*id, CostTier::Free, rank as u32))
        .collect()
}

/// Short timeouts and delays so retry paths finish quickly.
pub fn fast_request_config() -> RequestConfig {
    RequestConfig {
        timeout_ms: 200,
        max_retries: 2,
        retry_delay_ms: 1,
        max_retry_delay_ms: 50,
    }
}

/// A model answer holding a complete assessment with `sdg_count` goals.
pub fn analysis_answer(esg: (f64, f64, f64), sdg_count: u8) -> String {
    let sdg: Vec<Value> = (1..=sdg_count)
        .map(|id| {
            json!({
                "id": id,
                "impact_level": if id % 2 == 0 { "high" } else { "low" },
                "score": f64::from(id) / 2.0,
                "contributions": ["Reported initiative"],
                "improvement_areas": []
            })
        })
        .collect();

    json!({
        "esg": {
            "economic": {"score": esg.0, "justification": "Revenue and margins"},
            "environmental": {"score": esg.1, "justification": "Emissions data"},
            "social": {"score": esg.2, "justification": "Workforce programs"}
        },
        "sdg": sdg,
        "executive_summary": "The organization shows steady progress.",
        "recommendations": ["Set science-based targets", "Expand supplier audits"]
    })
    .to_string()
}

/// A stored report whose SDG `n` scores `sdg_score(n)`.
pub fn stored_report(
    organization: &str,
    year: i32,
    esg: (f64, f64, f64),
    sdg_score: impl Fn(u8) -> f64,
) -> StoredReport {
    let sdg = SdgAssessment::from_entries(
        SdgId::all()
            .map(|id| (id, SdgEntry::new(ImpactLevel::Medium, sdg_score(id.get()))))
            .collect(),
    )
    .unwrap();

    StoredReport {
        organization: organization.to_string(),
        year,
        result: AnalysisResult {
            esg: EsgScore::new(esg.0, esg.1, esg.2).unwrap(),
            esg_justification: EsgJustification::default(),
            sdg,
            executive_summary: format!("{} performance in {}", organization, year),
            recommendations: vec![format!("Priority action for {}", year)],
            model_used: "gemini-2.5-flash".to_string(),
            timestamp: Utc.with_ymd_and_hms(year, 6, 30, 0, 0, 0).unwrap(),
        },
        source_metadata: SourceMetadata::default().with_language(Language::En),
    }
}
