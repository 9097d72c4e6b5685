//! # Transcript Summaries
//!
//! Summaries written back onto a finished job's result.
//!
//! ## Algorithms:
//! - **truncate**: the first N characters, with `...` appended when text was cut
//! - **lead**: as many whole leading sentences as fit in N characters
//! - **textrank**: the highest ranked sentences that fit in N characters, in
//!   their original order
//! - **llm** (alias `doubao`): an abstractive summary from an OpenAI-compatible
//!   chat completion endpoint, configured under `[summary.llm]`

use crate::config::{LlmConfig, SummaryConfig};
use crate::error::{AppError, AppResult};
use crate::jobs::store::JobStore;
use crate::models::TranscriptResult;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

const SENTENCE_END: [char; 6] = ['。', '！', '？', '!', '?', '.'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryAlgorithm {
    Truncate,
    Lead,
    TextRank,
    Llm,
}

impl FromStr for SummaryAlgorithm {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "truncate" => Ok(SummaryAlgorithm::Truncate),
            "lead" => Ok(SummaryAlgorithm::Lead),
            "textrank" => Ok(SummaryAlgorithm::TextRank),
            "llm" | "doubao" => Ok(SummaryAlgorithm::Llm),
            other => Err(AppError::BadRequest(format!(
                "Unknown summary algorithm '{}'; expected truncate, lead, textrank or llm",
                other
            ))),
        }
    }
}

impl fmt::Display for SummaryAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SummaryAlgorithm::Truncate => write!(f, "truncate"),
            SummaryAlgorithm::Lead => write!(f, "lead"),
            SummaryAlgorithm::TextRank => write!(f, "textrank"),
            SummaryAlgorithm::Llm => write!(f, "llm"),
        }
    }
}

/// Body of `POST /summary`.
#[derive(Debug, Clone, Deserialize)]
pub struct SummaryRequest {
    pub job_id: Uuid,
    pub algorithm: Option<String>,
    pub length: Option<usize>,
}

/// Run a local algorithm. `None` for [`SummaryAlgorithm::Llm`], which needs
/// the remote model (see [`LlmSummarizer`]).
pub fn summarize(text: &str, algorithm: SummaryAlgorithm, length: usize) -> Option<String> {
    match algorithm {
        SummaryAlgorithm::Truncate => Some(truncate(text, length)),
        SummaryAlgorithm::Lead => Some(lead(text, length)),
        SummaryAlgorithm::TextRank => Some(textrank(text, length)),
        SummaryAlgorithm::Llm => None,
    }
}

fn truncate(text: &str, length: usize) -> String {
    if text.chars().count() <= length {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(length).collect();
    cut.push_str("...");
    cut
}

/// Falls back to [`truncate`] when the first sentence alone is too long.
fn lead(text: &str, length: usize) -> String {
    let mut summary = String::new();
    let mut count = 0;
    for sentence in sentences(text) {
        let sentence_len = sentence.chars().count();
        if count + sentence_len > length {
            break;
        }
        summary.push_str(sentence);
        count += sentence_len;
    }

    if summary.trim().is_empty() {
        truncate(text, length)
    } else {
        summary.trim().to_string()
    }
}

const DAMPING: f64 = 0.85;
const RANK_ITERATIONS: usize = 30;

/// Character bigrams of the letters and digits in `sentence`.
fn bigrams(sentence: &str) -> HashSet<(char, char)> {
    let chars: Vec<char> = sentence.chars().filter(|c| c.is_alphanumeric()).collect();
    chars.windows(2).map(|pair| (pair[0], pair[1])).collect()
}

/// Overlap normalized by the log of both sentence sizes.
fn similarity(a: &HashSet<(char, char)>, b: &HashSet<(char, char)>) -> f64 {
    let overlap = a.intersection(b).count() as f64;
    let norm = (a.len() as f64).ln() + (b.len() as f64).ln();
    if overlap == 0.0 || norm <= 0.0 {
        0.0
    } else {
        overlap / norm
    }
}

/// Rank sentences by weighted PageRank over their bigram overlap, keep the
/// best ones that fit in `length` characters and restore their text order.
fn textrank(text: &str, length: usize) -> String {
    let sentences: Vec<&str> = sentences(text)
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if sentences.len() < 2 {
        return lead(text, length);
    }

    let grams: Vec<_> = sentences.iter().map(|s| bigrams(s)).collect();
    let n = sentences.len();
    let mut weights = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let w = similarity(&grams[i], &grams[j]);
            weights[i][j] = w;
            weights[j][i] = w;
        }
    }
    let out_weight: Vec<f64> = weights.iter().map(|row| row.iter().sum()).collect();

    let mut scores = vec![1.0; n];
    for _ in 0..RANK_ITERATIONS {
        scores = (0..n)
            .map(|i| {
                let incoming: f64 = (0..n)
                    .filter(|&j| out_weight[j] > 0.0)
                    .map(|j| weights[j][i] / out_weight[j] * scores[j])
                    .sum();
                (1.0 - DAMPING) + DAMPING * incoming
            })
            .collect();
    }

    let mut ranked: Vec<usize> = (0..n).collect();
    ranked.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));

    let mut chosen = Vec::new();
    let mut count = 0;
    for idx in ranked {
        let sentence_len = sentences[idx].chars().count();
        if count + sentence_len <= length {
            chosen.push(idx);
            count += sentence_len;
        }
    }
    if chosen.is_empty() {
        return truncate(text, length);
    }
    chosen.sort_unstable();
    chosen.iter().map(|&idx| sentences[idx]).collect()
}

/// Split after every sentence-ending mark, keeping the mark.
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    for (idx, c) in text.char_indices() {
        if SENTENCE_END.contains(&c) {
            let end = idx + c.len_utf8();
            out.push(&text[start..end]);
            start = end;
        }
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

/// Client for an OpenAI-compatible `chat/completions` endpoint.
pub struct LlmSummarizer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl LlmSummarizer {
    /// ## Errors:
    /// - `ConfigError` when no API key is configured
    pub fn from_config(config: &LlmConfig) -> AppResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(AppError::ConfigError(
                "LLM summaries need summary.llm.api_key (or DOUBAO_API_KEY)".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    pub async fn summarize(&self, text: &str, length: usize) -> AppResult<String> {
        let prompt = format!(
            "请对以下内容进行专业、简明的中文摘要，字数不超过{}字：\n{}",
            length, text
        );
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": 0.2,
            "max_tokens": length * 2
        });

        debug!(endpoint = %self.endpoint, model = %self.model, "requesting LLM summary");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("LLM request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let preview: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(240)
                .collect();
            return Err(AppError::Internal(format!(
                "LLM summary failed ({}): {}",
                status, preview
            )));
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("Malformed LLM response: {}", e)))?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .filter(|summary| !summary.is_empty())
            .ok_or_else(|| AppError::Internal("LLM response contained no summary".to_string()))
    }
}

/// Summarize the result of `request.job_id` and store the summary on it.
pub async fn summarize_job(
    store: &dyn JobStore,
    config: &SummaryConfig,
    request: &SummaryRequest,
) -> AppResult<TranscriptResult> {
    let algorithm = request
        .algorithm
        .as_deref()
        .unwrap_or(config.default_algorithm.as_str())
        .parse::<SummaryAlgorithm>()?;
    let length = request.length.unwrap_or(config.default_length);
    if length == 0 {
        return Err(AppError::ValidationError("Summary length must be greater than 0".to_string()));
    }

    let result = store.get_result(request.job_id)?;
    let summary = match summarize(&result.text, algorithm, length) {
        Some(summary) => summary,
        None => {
            LlmSummarizer::from_config(&config.llm)?
                .summarize(&result.text, length)
                .await?
        }
    };
    let updated = store.set_summary(request.job_id, summary, algorithm.to_string())?;

    info!(job_id = %request.job_id, algorithm = %algorithm, length, "summary generated");
    Ok(updated)
}
