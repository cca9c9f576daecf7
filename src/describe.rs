//! Long-form recipe descriptions from a text-generation service
//!
//! The calculator never depends on this succeeding: callers turn any
//! `DescribeError` into a fixed failure marker and keep the numbers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::DescriberSettings;
use crate::models::{
    AdditiveEntry, FattyAcid, FattyAcidProfile, FormulationResult, OilLine, SoapProperties,
};

/// Shown while the description is still being generated
pub const PENDING_DESCRIPTION: &str = "Analyzing...";

/// Shown when the description could not be generated
pub const FAILED_DESCRIPTION: &str = "Error: failed to generate the soap description.";

#[derive(Error, Debug)]
pub enum DescribeError {
    #[error("Description service unavailable: {0}")]
    Unavailable(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Description service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Description service returned no text")]
    EmptyResponse,
}

/// Everything the text-generation service gets to see about a recipe
#[derive(Debug, Clone)]
pub struct DescriptionRequest {
    pub properties: SoapProperties,
    pub fatty_acids: FattyAcidProfile,
    pub top_oils: Vec<String>,
    pub essential_oils: Vec<AdditiveEntry>,
    pub powders: Vec<AdditiveEntry>,
}

impl DescriptionRequest {
    pub fn new(result: &FormulationResult, oils: &[OilLine], top_n: usize) -> Self {
        Self {
            properties: result.properties,
            fatty_acids: result.fatty_acid_profile,
            top_oils: top_oils(oils, top_n),
            essential_oils: result.essential_oils.clone(),
            powders: result.powders.clone(),
        }
    }
}

/// Short display name: "올리브 오일 (Olive Oil)" becomes "올리브 오일"
pub fn display_name(name: &str) -> &str {
    name.split(" (").next().unwrap_or(name)
}

/// Names of the heaviest oils, heaviest first (ties keep recipe order)
pub fn top_oils(oils: &[OilLine], n: usize) -> Vec<String> {
    let mut sorted: Vec<&OilLine> = oils.iter().collect();
    sorted.sort_by(|a, b| b.weight.total_cmp(&a.weight));
    sorted
        .into_iter()
        .take(n)
        .map(|line| display_name(&line.oil.name).to_string())
        .collect()
}

/// Most abundant fatty acids, largest first
pub fn top_fatty_acids(profile: &FattyAcidProfile, n: usize) -> Vec<(FattyAcid, f64)> {
    let mut acids: Vec<(FattyAcid, f64)> = profile.iter().collect();
    acids.sort_by(|a, b| b.1.total_cmp(&a.1));
    acids.truncate(n);
    acids
}

fn additive_list(entries: &[AdditiveEntry]) -> String {
    entries
        .iter()
        .map(|a| format!("{} ({}g)", a.name, a.weight))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Build the prompt sent to the text-generation model
pub fn build_prompt(request: &DescriptionRequest, language: &str) -> String {
    let oils = request.top_oils.join(", ");
    let acids = top_fatty_acids(&request.fatty_acids, 3)
        .into_iter()
        .map(|(acid, value)| format!("{}: {:.1}%", acid.name(), value))
        .collect::<Vec<_>>()
        .join(", ");

    let mut additives = String::new();
    if !request.essential_oils.is_empty() {
        additives.push_str(&format!(
            "Essential Oils: {}. ",
            additive_list(&request.essential_oils)
        ));
    }
    if !request.powders.is_empty() {
        additives.push_str(&format!("Powders: {}.", additive_list(&request.powders)));
    }
    let additives = match additives.trim() {
        "" => "None",
        trimmed => trimmed,
    };

    let p = &request.properties;
    format!(
        "You are an expert soap maker giving a concise analysis of a cold process soap recipe.\n\
         Respond in {language}. Do not use markdown tables.\n\
         \n\
         Recipe data:\n\
         - Key Oils: {oils}\n\
         - Key Fatty Acids: {acids}\n\
         - Calculated Properties: hardness={:.0}, cleansing={:.0}, conditioning={:.0}, bubbly={:.0}, creamy={:.0}\n\
         - Additives: {additives}\n\
         \n\
         Answer in exactly this format:\n\
         \n\
         ### Key characteristics\n\
         - Hardness: [hard / soft / medium]\n\
         - Cleansing: [strong / mild / medium]\n\
         - Lather: [big fluffy bubbles / small dense bubbles / creamy lather]\n\
         \n\
         ### Detailed explanation\n\
         [Explain how the key oils and their fatty acids shape the bar. If additives are present, \
         describe what the essential oils' main components and the powders do for the skin.]\n\
         \n\
         ### Recommendation\n\
         - Skin type: [dry / oily / combination / all skin types]\n\
         - Suited for: [a concrete audience such as babies, sensitive skin, adults]\n",
        p.hardness, p.cleansing, p.conditioning, p.bubbly, p.creamy,
    )
}

/// A text-generation service that can describe a recipe
#[async_trait]
pub trait Describer: Send + Sync {
    async fn describe(&self, request: &DescriptionRequest) -> Result<String, DescribeError>;
}

/// Used when no service is configured; always fails
pub struct OfflineDescriber {
    reason: String,
}

impl OfflineDescriber {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Describer for OfflineDescriber {
    async fn describe(&self, _request: &DescriptionRequest) -> Result<String, DescribeError> {
        Err(DescribeError::Unavailable(self.reason.clone()))
    }
}

/// Client for a Gemini-style `generateContent` endpoint
pub struct GeminiDescriber {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
    language: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Concatenated text of the first candidate, trimmed
fn response_text(response: GenerateResponse) -> Result<String, DescribeError> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    let text = text.trim();
    if text.is_empty() {
        return Err(DescribeError::EmptyResponse);
    }
    Ok(text.to_string())
}

impl GeminiDescriber {
    pub fn new(settings: &DescriberSettings, api_key: String) -> Result<Self, DescribeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key,
            language: settings.language.clone(),
        })
    }
}

#[async_trait]
impl Describer for GeminiDescriber {
    async fn describe(&self, request: &DescriptionRequest) -> Result<String, DescribeError> {
        let prompt = build_prompt(request, &self.language);
        let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);
        log::debug!("Requesting description from {}", url);

        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: &prompt }],
            }],
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DescribeError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response_text(response.json::<GenerateResponse>().await?)
    }
}

/// Pick the describer for these settings
///
/// Falls back to an offline describer when descriptions are disabled, the
/// API key is missing, or the HTTP client can't be built.
pub fn from_settings(settings: &DescriberSettings) -> Arc<dyn Describer> {
    if !settings.enabled {
        return Arc::new(OfflineDescriber::new("descriptions are disabled"));
    }

    let api_key = match std::env::var(&settings.api_key_env) {
        Ok(key) if !key.trim().is_empty() => key,
        _ => {
            log::warn!(
                "{} is not set; recipe descriptions will not be generated",
                settings.api_key_env
            );
            return Arc::new(OfflineDescriber::new(format!("{} is not set", settings.api_key_env)));
        }
    };

    match GeminiDescriber::new(settings, api_key) {
        Ok(describer) => Arc::new(describer),
        Err(e) => {
            log::error!("Failed to set up description client: {}", e);
            Arc::new(OfflineDescriber::new(e.to_string()))
        }
    }
}
