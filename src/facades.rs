/// External collaborator contracts: speech-to-text, language detection,
/// translation, assistant dialog, and speech synthesis (spec §4.H).
///
/// Each trait is a narrow, cancellation-aware contract; the Call
/// Session owns the deadline and never retries a failed call in-band.
/// Default implementations are thin HTTP adapters, grounded on
/// `packages/common/http.go`'s `PostHttpReq`, `packages/whisper-asr`'s
/// multipart upload, and `packages/assistants/anthropic.go`'s JSON POST.
use crate::error::FacadeError;
use async_trait::async_trait;
use std::path::{ Path, PathBuf };
use std::time::Duration;
use tokio::time::Instant;

/// One assistant reply, addressed to a recipient (mirrors the
/// original's `{recipient_id, text}` assistant response shape).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantMessage {
    pub recipient_id: String,
    pub text: String,
}

/// Input to the transcriber: a WAV file already staged at 8kHz/16-bit/mono.
#[derive(Debug, Clone)]
pub struct TranscribeInput {
    pub wav_path: PathBuf,
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, input: TranscribeInput, deadline: Instant) -> Result<String, FacadeError>;
}

#[async_trait]
pub trait LanguageDetector: Send + Sync {
    /// Best-effort language guess; `None` means "could not tell",
    /// matching the original's tolerant treatment of detection misses.
    async fn detect(&self, text: &str) -> Option<String>;
}

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
        deadline: Instant
    ) -> Result<String, FacadeError>;
}

#[async_trait]
pub trait Assistant: Send + Sync {
    async fn reply(
        &self,
        call_id: &str,
        text: &str,
        deadline: Instant
    ) -> Result<Vec<AssistantMessage>, FacadeError>;
}

#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, lang_tag: &str, deadline: Instant) -> Result<PathBuf, FacadeError>;
}

/// Shared helper: turn the remaining time to `deadline` into a
/// `reqwest` timeout, erroring immediately if it has already passed.
fn remaining(deadline: Instant) -> Result<Duration, FacadeError> {
    let now = Instant::now();
    if now >= deadline {
        return Err(FacadeError::Timeout("deadline already elapsed".into()));
    }
    Ok(deadline - now)
}

async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, FacadeError> {
    if resp.status().is_success() {
        Ok(resp)
    } else {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Err(FacadeError::Status { status, body })
    }
}

/// HTTP transcriber: multipart-uploads the WAV to `endpoint`, matching
/// `packages/whisper-asr/main.go`'s form-file POST.
pub struct HttpTranscriber {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpTranscriber {
    pub fn new(client: reqwest::Client, endpoint: String, api_key: Option<String>) -> Self {
        Self { client, endpoint, api_key }
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, input: TranscribeInput, deadline: Instant) -> Result<String, FacadeError> {
        let bytes = tokio::fs::read(&input.wav_path).await?;
        let filename = file_name_or_default(&input.wav_path);
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename).mime_str("audio/wav").map_err(|e|
            FacadeError::Decode(e.to_string())
        )?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let mut req = self.client.post(&self.endpoint).timeout(remaining(deadline)?).multipart(form);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = ensure_success(req.send().await?).await?;
        let body: serde_json::Value = resp.json().await?;
        body
            .get("text")
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .ok_or_else(|| FacadeError::Decode("response missing \"text\" field".into()))
    }
}

fn file_name_or_default(path: &Path) -> String {
    path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_owned)
        .unwrap_or_else(|| "utterance.wav".to_string())
}

/// HTTP translator: JSON POST `{text, source, target}` -> `{text}`.
pub struct HttpTranslator {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpTranslator {
    pub fn new(client: reqwest::Client, endpoint: String, api_key: Option<String>) -> Self {
        Self { client, endpoint, api_key }
    }
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
        deadline: Instant
    ) -> Result<String, FacadeError> {
        let mut req = self.client
            .post(&self.endpoint)
            .timeout(remaining(deadline)?)
            .json(&serde_json::json!({ "text": text, "source": source, "target": target }));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = ensure_success(req.send().await?).await?;
        let body: serde_json::Value = resp.json().await?;
        body
            .get("text")
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .ok_or_else(|| FacadeError::Decode("response missing \"text\" field".into()))
    }
}

/// HTTP assistant: JSON POST `{sender_id, text}` -> list of
/// `{recipient_id, text}`, grounded on `anthropic.go`'s `Interact`.
pub struct HttpAssistant {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpAssistant {
    pub fn new(client: reqwest::Client, endpoint: String, api_key: Option<String>) -> Self {
        Self { client, endpoint, api_key }
    }
}

#[derive(serde::Deserialize)]
struct AssistantReplyWire {
    recipient_id: String,
    text: String,
}

#[async_trait]
impl Assistant for HttpAssistant {
    async fn reply(&self, call_id: &str, text: &str, deadline: Instant) -> Result<Vec<AssistantMessage>, FacadeError> {
        let mut req = self.client
            .post(&self.endpoint)
            .timeout(remaining(deadline)?)
            .json(&serde_json::json!({ "sender_id": call_id, "text": text }));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = ensure_success(req.send().await?).await?;
        let wire: Vec<AssistantReplyWire> = resp.json().await?;
        Ok(
            wire
                .into_iter()
                .map(|m| AssistantMessage { recipient_id: m.recipient_id, text: m.text })
                .collect()
        )
    }
}

/// HTTP synthesizer: JSON POST `{text, lang}` -> streamed WAV bytes,
/// staged to a temp file under `work_dir`.
pub struct HttpSynthesizer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    work_dir: PathBuf,
}

impl HttpSynthesizer {
    pub fn new(client: reqwest::Client, endpoint: String, api_key: Option<String>, work_dir: PathBuf) -> Self {
        Self { client, endpoint, api_key, work_dir }
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str, lang_tag: &str, deadline: Instant) -> Result<PathBuf, FacadeError> {
        let mut req = self.client
            .post(&self.endpoint)
            .timeout(remaining(deadline)?)
            .json(&serde_json::json!({ "text": text, "lang": lang_tag }));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = ensure_success(req.send().await?).await?;
        let bytes = resp.bytes().await?;

        tokio::fs::create_dir_all(&self.work_dir).await?;
        let path = self.work_dir.join(format!("tts-{}.wav", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, &bytes).await?;
        Ok(path)
    }
}

/// Fixed-table heuristic language detector: stands in for the
/// original's `lingua-go` detector. Scores text against a short list
/// of common-word markers per language and picks the best match above
/// a minimum-hit floor; the trait boundary, not detection accuracy, is
/// what this crate guarantees.
pub struct HeuristicLanguageDetector {
    markers: Vec<(&'static str, &'static [&'static str])>,
}

impl Default for HeuristicLanguageDetector {
    fn default() -> Self {
        Self {
            markers: vec![
                ("en", &["the", "and", "you", "is", "what"]),
                ("es", &["el", "la", "que", "de", "hola"]),
                ("fr", &["le", "la", "et", "vous", "bonjour"]),
                ("pt", &["o", "a", "que", "voce", "ola"])
            ],
        }
    }
}

#[async_trait]
impl LanguageDetector for HeuristicLanguageDetector {
    async fn detect(&self, text: &str) -> Option<String> {
        let words: Vec<String> = text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_owned)
            .collect();
        if words.is_empty() {
            return None;
        }

        let mut best: Option<(&'static str, usize)> = None;
        for (lang, marker_words) in &self.markers {
            let hits = words
                .iter()
                .filter(|w| marker_words.contains(&w.as_str()))
                .count();
            if hits > 0 && best.map_or(true, |(_, best_hits)| hits > best_hits) {
                best = Some((lang, hits));
            }
        }
        best.map(|(lang, _)| lang.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn heuristic_detector_picks_highest_scoring_language() {
        let detector = HeuristicLanguageDetector::default();
        let lang = detector.detect("hola, que tal, la verdad").await;
        assert_eq!(lang.as_deref(), Some("es"));
    }

    #[tokio::test]
    async fn heuristic_detector_returns_none_for_no_markers() {
        let detector = HeuristicLanguageDetector::default();
        let lang = detector.detect("xyzzy plugh qux").await;
        assert_eq!(lang, None);
    }

    #[test]
    fn remaining_errors_once_deadline_passed() {
        let past = Instant::now() - Duration::from_secs(1);
        assert!(remaining(past).is_err());
    }

    #[test]
    fn remaining_returns_positive_duration_before_deadline() {
        let future = Instant::now() + Duration::from_secs(5);
        let d = remaining(future).unwrap();
        assert!(d.as_millis() > 0);
    }
}
