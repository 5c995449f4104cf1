use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::config::Settings;
use crate::db::models::ScheduleRow;

const SCHEDULE_SYSTEM_PROMPT: &str = r#"You read photographed or scanned school timetables.
Extract every teaching session of the timetable in the image.

Rules:
- One row per session, in the order they appear.
- "session" is the session number or label exactly as printed.
- "time" is the session's time range written as H:MM–H:MM with an en dash (U+2013).
- For each weekday column present (sunday to saturday) give the subject taught, or omit the
  key when the cell is empty.
- If the image is not a timetable or cannot be read, return an empty schedule and describe the
  problem in "errors".

Respond with strict JSON only:
{
  "schedule": [
    {"session": "1", "time": "7:45–8:30", "sunday": "Math", "monday": "Physics"}
  ],
  "errors": null
}
"#;

const FALLBACK_ERROR: &str = "An unexpected error occurred while analyzing the schedule. The AI \
model might be unavailable, misconfigured, or the image format could be unsupported.";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ScheduleAnalysis {
    pub(crate) schedule: Vec<ScheduleRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) errors: Option<String>,
}

impl ScheduleAnalysis {
    pub(crate) fn failed(message: impl Into<String>) -> Self {
        let message = message.into();
        let errors = if message.trim().is_empty() { FALLBACK_ERROR.to_string() } else { message };
        Self { schedule: Vec::new(), errors: Some(errors) }
    }
}

/// Extracts schedule rows from an image. Implementations report failures through
/// [`ScheduleAnalysis::errors`] instead of returning an error.
#[async_trait]
pub(crate) trait ScheduleAnalyzer: Send + Sync {
    async fn analyze(&self, image_base64: &str, mime_type: &str) -> ScheduleAnalysis;
}

#[derive(Debug, Clone)]
pub(crate) struct OpenAiScheduleAnalyzer {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl OpenAiScheduleAnalyzer {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Self> {
        let timeout = Duration::from_secs(settings.ai().ai_request_timeout);
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key: settings.ai().openai_api_key.clone(),
            base_url: settings.ai().openai_base_url.trim_end_matches('/').to_string(),
            model: settings.ai().ai_model.clone(),
            max_tokens: settings.ai().ai_max_tokens,
        })
    }

    async fn request(&self, image_base64: &str, mime_type: &str) -> Result<ScheduleAnalysis> {
        if self.api_key.is_empty() {
            anyhow::bail!("OPENAI_API_KEY is not configured");
        }

        let payload = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SCHEDULE_SYSTEM_PROMPT},
                {"role": "user", "content": [
                    {"type": "text", "text": "Extract the timetable from this image as JSON."},
                    {
                        "type": "image_url",
                        "image_url": {"url": format!("data:{mime_type};base64,{image_base64}")}
                    }
                ]}
            ],
            "max_completion_tokens": self.max_tokens,
            "response_format": {"type": "json_object"}
        });

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .context("Failed to call OpenAI API")?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            anyhow::bail!("OpenAI API error ({status}): {body}");
        }

        let content = body
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|value| value.as_str())
            .context("Missing OpenAI response content")?;

        parse_analysis_content(content)
    }
}

#[async_trait]
impl ScheduleAnalyzer for OpenAiScheduleAnalyzer {
    async fn analyze(&self, image_base64: &str, mime_type: &str) -> ScheduleAnalysis {
        let timer = Instant::now();
        tracing::info!(model = %self.model, bytes = image_base64.len(), "Analyzing schedule");

        let analysis = match self.request(image_base64, mime_type).await {
            Ok(analysis) => analysis,
            Err(err) => {
                tracing::error!(error = %format!("{err:#}"), "Schedule analysis failed");
                ScheduleAnalysis::failed(format!("{err:#}"))
            }
        };

        let outcome = if analysis.schedule.is_empty() { "empty" } else { "extracted" };
        metrics::counter!("schedule_analyses_total", "outcome" => outcome).increment(1);
        tracing::info!(
            rows = analysis.schedule.len(),
            duration_seconds = timer.elapsed().as_secs_f64(),
            "Schedule analysis completed"
        );
        analysis
    }
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parses the model's reply. Accepts `{schedule, errors}` or a bare array of rows; rows without
/// a session or a time are dropped.
pub(crate) fn parse_analysis_content(content: &str) -> Result<ScheduleAnalysis> {
    let value: Value =
        serde_json::from_str(strip_code_fence(content)).context("Failed to parse AI JSON")?;

    let (rows, errors) = match value {
        Value::Array(rows) => (Value::Array(rows), None),
        Value::Object(mut object) => {
            let errors = match object.remove("errors") {
                Some(Value::String(text)) if !text.trim().is_empty() => Some(text),
                _ => None,
            };
            (object.remove("schedule").unwrap_or(Value::Array(Vec::new())), errors)
        }
        other => anyhow::bail!("Unexpected AI response shape: {other}"),
    };

    let rows: Vec<ScheduleRow> =
        serde_json::from_value(rows).context("AI schedule rows have an unexpected shape")?;
    let schedule = rows
        .into_iter()
        .filter(|row| !row.session.trim().is_empty() && !row.time.trim().is_empty())
        .collect();

    Ok(ScheduleAnalysis { schedule, errors })
}
