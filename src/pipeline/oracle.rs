//! The layout oracle: a vision model that describes one slide image.
//!
//! [`LayoutOracle`] is the seam between the pipeline and the model. The
//! production implementation, [`VisionOracle`], sends the page to an
//! `edgequake-llm` provider and validates the JSON it returns with
//! [`parse_analysis`]. Tests substitute a scripted oracle.
//!
//! Every call resolves to one of four outcomes: a validated
//! [`PageAnalysis`], [`OracleError::RateLimited`], [`OracleError::InvalidAnalysis`],
//! or a plain failure. Error messages name fields and positions only; raw
//! model output never leaves this module.

use crate::config::ConversionConfig;
use crate::error::OracleError;
use crate::model::{FigureRegion, LayoutCategory, NormalizedBox, PageAnalysis, NORMALIZED_GRID};
use crate::pipeline::encode::encode_page;
use crate::pipeline::render::PageImage;
use crate::prompts::{LAYOUT_ANALYSIS_PROMPT, PAGE_INSTRUCTION};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, LlmError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Describes the layout of one rasterised page.
#[async_trait]
pub trait LayoutOracle: Send + Sync {
    async fn analyze(&self, page: &PageImage) -> Result<PageAnalysis, OracleError>;
}

/// [`LayoutOracle`] backed by a multimodal LLM provider.
pub struct VisionOracle {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    system_prompt: String,
    max_pixels: u32,
    timeout: Duration,
}

impl VisionOracle {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ConversionConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| LAYOUT_ANALYSIS_PROMPT.to_string()),
            max_pixels: config.oracle_max_pixels,
            timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }
}

#[async_trait]
impl LayoutOracle for VisionOracle {
    async fn analyze(&self, page: &PageImage) -> Result<PageAnalysis, OracleError> {
        let start = Instant::now();
        let image = encode_page(&page.image, self.max_pixels)
            .map_err(|e| OracleError::Failed(format!("page encoding failed: {e}")))?;

        let messages = vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user_with_images(PAGE_INSTRUCTION, vec![image]),
        ];

        let response = match tokio::time::timeout(
            self.timeout,
            self.provider.chat(&messages, Some(&self.options)),
        )
        .await
        {
            Err(_) => {
                return Err(OracleError::Timeout {
                    secs: self.timeout.as_secs(),
                })
            }
            Ok(Err(e)) => {
                let err = classify_provider_error(&e, self.timeout);
                if let OracleError::Failed(ref kind) = err {
                    warn!(page = page.page_num, kind = %kind, "Vision model call failed");
                }
                return Err(err);
            }
            Ok(Ok(response)) => response,
        };

        debug!(
            page = page.page_num,
            input_tokens = response.prompt_tokens,
            output_tokens = response.completion_tokens,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Vision model responded"
        );

        parse_analysis(&response.content)
    }
}

/// Build `CompletionOptions` from the conversion config.
fn build_options(config: &ConversionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// Map a provider error onto the oracle contract.
///
/// The typed variant decides where it can. Providers that only report an
/// HTTP status inside `ApiError` text fall back to [`is_rate_limit_message`].
/// `Failed` carries a short fixed label, never the provider's message, which
/// may quote the response body.
pub fn classify_provider_error(err: &LlmError, timeout: Duration) -> OracleError {
    let failed = |label: String| OracleError::Failed(label);
    match err {
        LlmError::RateLimited(_) => OracleError::RateLimited,
        LlmError::Timeout => OracleError::Timeout {
            secs: timeout.as_secs(),
        },
        LlmError::AuthError(_) => failed("authentication rejected".into()),
        LlmError::InvalidRequest(_) => failed("request rejected".into()),
        LlmError::TokenLimitExceeded { max, got } => {
            failed(format!("token limit exceeded (max {max}, got {got})"))
        }
        LlmError::ModelNotFound(_) => failed("model not found".into()),
        LlmError::NetworkError(_) => failed("network error".into()),
        LlmError::SerializationError(_) => failed("unreadable provider response".into()),
        LlmError::ConfigError(_) => failed("provider misconfigured".into()),
        LlmError::NotSupported(_) => failed("not supported by provider".into()),
        LlmError::ApiError(msg) | LlmError::ProviderError(msg) | LlmError::Unknown(msg) => {
            if is_rate_limit_message(msg) {
                return OracleError::RateLimited;
            }
            match http_status(msg) {
                Some(code) => failed(format!("provider error (HTTP {code})")),
                None => failed("provider error".into()),
            }
        }
    }
}

static RE_HTTP_429: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b429\b").unwrap());
static RE_HTTP_STATUS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:status(?: code)?[:= ]*|\()([45]\d{2})\b").unwrap());

/// `true` if a provider error message signals a rate ceiling.
///
/// For providers that report throttling only as text: HTTP 429, gRPC
/// `RESOURCE_EXHAUSTED`, quota messages.
pub fn is_rate_limit_message(msg: &str) -> bool {
    if RE_HTTP_429.is_match(msg) {
        return true;
    }
    let lower = msg.to_ascii_lowercase();
    [
        "rate limit",
        "rate_limit",
        "ratelimit",
        "too many requests",
        "resource_exhausted",
        "resource exhausted",
        "quota",
    ]
    .iter()
    .any(|needle| lower.contains(needle))
}

/// HTTP status quoted in a provider message, e.g. `(503)` or `status: 400`.
fn http_status(msg: &str) -> Option<u16> {
    RE_HTTP_STATUS
        .captures(msg)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

// ── Response validation ──────────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\s*\n(.*?)\n?```\s*$").unwrap());

fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    match RE_OUTER_FENCES.captures(trimmed).and_then(|c| c.get(1)) {
        Some(m) => m.as_str(),
        None => trimmed,
    }
}

fn invalid(reason: impl Into<String>) -> OracleError {
    OracleError::InvalidAnalysis(reason.into())
}

/// Validate a raw model response against the analysis schema.
///
/// * `layout_type` must name a [`LayoutCategory`] exactly.
/// * `title` must be a non-empty string.
/// * `body_text`, `speaker_notes` and `figures` default to empty when absent.
/// * Each `box_2d` must hold four integers in `0..=1000`. Boxes with no area
///   are dropped rather than rejected.
pub fn parse_analysis(raw: &str) -> Result<PageAnalysis, OracleError> {
    let value: Value = serde_json::from_str(strip_fences(raw)).map_err(|e| {
        invalid(format!(
            "response is not JSON (line {}, column {})",
            e.line(),
            e.column()
        ))
    })?;
    let obj = value
        .as_object()
        .ok_or_else(|| invalid("response is not a JSON object"))?;

    let layout = match obj.get("layout_type") {
        Some(Value::String(s)) => s
            .trim()
            .parse::<LayoutCategory>()
            .map_err(|_| invalid("'layout_type' is not a known layout"))?,
        Some(_) => return Err(invalid("'layout_type' is not a string")),
        None => return Err(invalid("missing field 'layout_type'")),
    };

    let title = match obj.get("title") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::String(_)) => return Err(invalid("'title' is empty")),
        Some(_) => return Err(invalid("'title' is not a string")),
        None => return Err(invalid("missing field 'title'")),
    };

    let body_lines = parse_body(obj)?;

    let speaker_notes = match obj.get("speaker_notes") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(_) => return Err(invalid("'speaker_notes' is not a string")),
    };

    let figures = parse_figures(obj)?;

    Ok(PageAnalysis {
        layout,
        title,
        body_lines,
        speaker_notes,
        figures,
    })
}

fn parse_body(obj: &Map<String, Value>) -> Result<Vec<String>, OracleError> {
    match obj.get("body_text") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| match item {
                Value::String(s) if s.trim().is_empty() => None,
                Value::String(s) => Some(Ok(s.trim().to_string())),
                _ => Some(Err(invalid(format!("'body_text[{i}]' is not a string")))),
            })
            .collect(),
        Some(_) => Err(invalid("'body_text' is not an array")),
    }
}

fn parse_figures(obj: &Map<String, Value>) -> Result<Vec<FigureRegion>, OracleError> {
    let items = match obj.get("figures") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(invalid("'figures' is not an array")),
    };

    let mut figures = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let fig = item
            .as_object()
            .ok_or_else(|| invalid(format!("'figures[{i}]' is not an object")))?;

        let description = match fig.get("description") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.trim().to_string(),
            Some(_) => return Err(invalid(format!("'figures[{i}].description' is not a string"))),
        };

        let bbox = parse_box(fig.get("box_2d"), i)?;
        if !bbox.is_ordered() {
            debug!(figure = i, "Dropping figure with empty box");
            continue;
        }
        figures.push(FigureRegion { description, bbox });
    }
    Ok(figures)
}

fn parse_box(value: Option<&Value>, i: usize) -> Result<NormalizedBox, OracleError> {
    let coords = match value {
        Some(Value::Array(coords)) => coords,
        Some(_) => return Err(invalid(format!("'figures[{i}].box_2d' is not an array"))),
        None => return Err(invalid(format!("missing field 'figures[{i}].box_2d'"))),
    };
    if coords.len() != 4 {
        return Err(invalid(format!(
            "'figures[{i}].box_2d' has {} values, expected 4",
            coords.len()
        )));
    }

    let mut out = [0u32; 4];
    for (slot, coord) in out.iter_mut().zip(coords) {
        *slot = coord
            .as_u64()
            .filter(|&n| n <= NORMALIZED_GRID as u64)
            .map(|n| n as u32)
            .ok_or_else(|| {
                invalid(format!(
                    "'figures[{i}].box_2d' must hold integers in 0..={NORMALIZED_GRID}"
                ))
            })?;
    }
    let [y_min, x_min, y_max, x_max] = out;
    Ok(NormalizedBox::new(y_min, x_min, y_max, x_max))
}
