//! LLM 모듈 - Gemini 답변 생성
//!
//! `generateContent`로 한 번에, `streamGenerateContent?alt=sse`로 스트리밍 생성합니다.
//! source: https://ai.google.dev/api/generate-content

pub mod prompt;

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::config::LlmSettings;
use crate::gemini::GeminiTransport;

/// 생성 요청 타임아웃 (스트리밍 포함)
const GENERATE_TIMEOUT: Duration = Duration::from_secs(300);

/// 텍스트 조각 스트림
pub type TextStream = BoxStream<'static, Result<String>>;

// ============================================================================
// LanguageModel Trait
// ============================================================================

/// 언어 모델 트레이트
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// 프롬프트에 대한 전체 답변 생성
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// 스트리밍 생성 (기본 구현: generate 결과 하나)
    async fn stream(&self, prompt: &str) -> Result<TextStream> {
        let text = self.generate(prompt).await?;
        Ok(stream::once(async move { Ok(text) }).boxed())
    }

    /// 모델 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Gemini Request / Response
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    system_instruction: Content,
    generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    top_p: f32,
    top_k: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Content,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

impl GenerateResponse {
    /// 첫 후보의 텍스트 조각을 이어 붙임
    fn text(&self) -> String {
        self.candidates
            .first()
            .map(|c| c.content.parts.iter().map(|p| p.text.as_str()).collect())
            .unwrap_or_default()
    }

    /// 텍스트가 없을 때의 사유 (차단/종료)
    fn empty_reason(&self) -> String {
        if let Some(reason) = self
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.clone())
        {
            return format!("prompt blocked: {}", reason);
        }
        match self.candidates.first().and_then(|c| c.finish_reason.clone()) {
            Some(reason) => format!("finish reason: {}", reason),
            None => "no candidates returned".to_string(),
        }
    }
}

// ============================================================================
// SSE Parsing
// ============================================================================

/// SSE 한 줄 해석 결과
#[derive(Debug, Clone, PartialEq)]
pub enum SseLine {
    /// `data:` 페이로드
    Data(String),
    /// `data: [DONE]`
    Done,
    /// 빈 줄, 주석, 다른 필드
    Ignore,
}

/// SSE 한 줄 파싱
pub fn parse_sse_line(line: &str) -> SseLine {
    let line = line.trim_end_matches(['\r', '\n']);
    match line.strip_prefix("data:") {
        Some(rest) => {
            let data = rest.trim();
            if data == "[DONE]" {
                SseLine::Done
            } else if data.is_empty() {
                SseLine::Ignore
            } else {
                SseLine::Data(data.to_string())
            }
        }
        None => SseLine::Ignore,
    }
}

/// 버퍼에서 완성된 줄 하나 꺼내기
fn drain_line(buf: &mut Vec<u8>) -> Option<String> {
    let pos = buf.iter().position(|&b| b == b'\n')?;
    let raw: Vec<u8> = buf.drain(..=pos).collect();
    Some(String::from_utf8_lossy(&raw).into_owned())
}

/// 스트림 끝에서 줄바꿈 없이 남은 마지막 줄 꺼내기
fn drain_rest(buf: &mut Vec<u8>) -> Option<String> {
    if buf.iter().all(|b| b.is_ascii_whitespace()) {
        buf.clear();
        return None;
    }
    let raw = std::mem::take(buf);
    Some(String::from_utf8_lossy(&raw).into_owned())
}

/// 스트리밍 이벤트 하나를 텍스트로 변환
///
/// 아직 텍스트가 나오지 않았는데 차단 피드백이 오면 에러입니다.
fn decode_stream_event(data: &str, produced: bool) -> Result<Option<String>> {
    let event: GenerateResponse =
        serde_json::from_str(data).context("Failed to parse streaming chunk")?;
    let text = event.text();
    if !text.is_empty() {
        return Ok(Some(text));
    }
    if !produced && event.prompt_feedback.is_some() {
        anyhow::bail!("Gemini returned no text ({})", event.empty_reason());
    }
    Ok(None)
}

// ============================================================================
// GeminiChat
// ============================================================================

/// Gemini 생성 모델 클라이언트
#[derive(Debug, Clone)]
pub struct GeminiChat {
    transport: GeminiTransport,
    settings: LlmSettings,
    system_instruction: String,
}

impl GeminiChat {
    /// # Arguments
    /// * `api_key` - Google AI API 키
    /// * `settings` - 모델/샘플링 설정
    /// * `subject` - 시스템 지시문에 들어갈 과목명
    pub fn new(api_key: String, settings: LlmSettings, subject: &str) -> Result<Self> {
        let transport = GeminiTransport::new(api_key, GENERATE_TIMEOUT, Duration::ZERO)?;
        Ok(Self {
            transport,
            settings,
            system_instruction: prompt::system_instruction(subject),
        })
    }

    fn request(&self, prompt: &str) -> GenerateRequest {
        GenerateRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: self.system_instruction.clone(),
                }],
            },
            generation_config: GenerationConfig {
                temperature: self.settings.temperature,
                max_output_tokens: self.settings.max_output_tokens,
                top_p: self.settings.top_p,
                top_k: self.settings.top_k,
            },
        }
    }
}

#[async_trait]
impl LanguageModel for GeminiChat {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let started = std::time::Instant::now();
        let url = GeminiTransport::model_url(&self.settings.model, "generateContent");
        let response: GenerateResponse = self
            .transport
            .post_json(&url, &self.request(prompt))
            .await
            .context("Failed to generate response")?;

        let text = response.text();
        if text.trim().is_empty() {
            anyhow::bail!("Gemini returned no text ({})", response.empty_reason());
        }

        tracing::debug!(
            "Generated {} chars with {} in {:?}",
            text.len(),
            self.settings.model,
            started.elapsed()
        );
        Ok(text)
    }

    async fn stream(&self, prompt: &str) -> Result<TextStream> {
        let url = format!(
            "{}?alt=sse",
            GeminiTransport::model_url(&self.settings.model, "streamGenerateContent")
        );
        let response = self
            .transport
            .post(&url, &self.request(prompt))
            .await
            .context("Failed to start streaming response")?;

        let strm = async_stream::stream! {
            let mut bytes = response.bytes_stream();
            let mut buf: Vec<u8> = Vec::with_capacity(8192);
            let mut produced = false;
            let mut eof = false;

            'outer: loop {
                match bytes.next().await {
                    Some(Ok(chunk)) => buf.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        yield Err(anyhow::Error::new(e).context("Failed to read streaming response"));
                        return;
                    }
                    None => eof = true,
                }

                let mut lines = Vec::new();
                while let Some(line) = drain_line(&mut buf) {
                    lines.push(line);
                }
                if eof {
                    lines.extend(drain_rest(&mut buf));
                }

                for line in lines {
                    match parse_sse_line(&line) {
                        SseLine::Data(data) => match decode_stream_event(&data, produced) {
                            Ok(Some(text)) => {
                                produced = true;
                                yield Ok(text);
                            }
                            Ok(None) => {}
                            Err(e) => {
                                yield Err(e);
                                return;
                            }
                        },
                        SseLine::Done => break 'outer,
                        SseLine::Ignore => {}
                    }
                }

                if eof {
                    break;
                }
            }

            if !produced {
                yield Err(anyhow::anyhow!("Gemini stream ended without text"));
            }
        };

        Ok(strm.boxed())
    }

    fn name(&self) -> &str {
        &self.settings.model
    }
}

// ============================================================================
// Tests
// ============================================================================
