use crate::volume::AudioCodec;
use clap::{ Parser, ValueEnum };
use std::path::PathBuf;

/// Realtime voice-dialog bridge between an AudioSocket telephony PBX
/// and a text-based conversational assistant.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct BridgeConfig {
    /// AudioSocket listen address
    #[arg(long, env = "BRIDGE_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: String,

    /// Uplink audio format
    #[arg(long, value_enum, default_value_t = AudioFormatArg::Pcm16)]
    pub audio_format: AudioFormatArg,

    /// G.711 sub-codec, required when audio-format is g711
    #[arg(long, value_enum)]
    pub g711_codec: Option<G711CodecArg>,

    /// Override the per-format default silence (RMS) threshold
    #[arg(long)]
    pub silence_threshold: Option<f64>,

    /// Trailing silence required to close an utterance, in milliseconds
    #[arg(long, default_value_t = 2000)]
    pub silence_duration_ms: u64,

    /// Hard ceiling on a single call's duration, in seconds
    #[arg(long, default_value_t = 120)]
    pub max_call_duration_secs: u64,

    /// ISO-639-1 language tag the assistant operates in
    #[arg(long, default_value = "en")]
    pub assistant_language: String,

    /// Speech-to-text endpoint URL
    #[arg(long, env = "STT_URL", default_value = "")]
    pub stt_url: String,
    /// Speech-to-text bearer token / API key
    #[arg(long, env = "STT_API_KEY")]
    pub stt_api_key: Option<String>,

    /// Translation endpoint URL
    #[arg(long, env = "TRANSLATE_URL", default_value = "")]
    pub translate_url: String,
    /// Translation bearer token / API key
    #[arg(long, env = "TRANSLATE_API_KEY")]
    pub translate_api_key: Option<String>,

    /// Assistant dialog endpoint URL
    #[arg(long, env = "ASSISTANT_URL", default_value = "")]
    pub assistant_url: String,
    /// Assistant bearer token / API key
    #[arg(long, env = "ASSISTANT_API_KEY")]
    pub assistant_api_key: Option<String>,

    /// Text-to-speech endpoint URL
    #[arg(long, env = "TTS_URL", default_value = "")]
    pub tts_url: String,
    /// Text-to-speech bearer token / API key
    #[arg(long, env = "TTS_API_KEY")]
    pub tts_api_key: Option<String>,

    /// Directory for per-turn temporary WAV files
    #[arg(long, default_value = "./work")]
    pub work_dir: PathBuf,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormatArg {
    Pcm16,
    G711,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum G711CodecArg {
    Ulaw,
    Alaw,
}

impl BridgeConfig {
    /// The tagged codec variant used by the Volume/Decoder Kit and the
    /// endpointer. `validate()` must have already confirmed
    /// `g711_codec` is set whenever `audio_format` is `g711`.
    pub fn audio_codec(&self) -> AudioCodec {
        match self.audio_format {
            AudioFormatArg::Pcm16 => AudioCodec::Pcm16Le,
            AudioFormatArg::G711 =>
                match self.g711_codec {
                    Some(G711CodecArg::Ulaw) | None => AudioCodec::G711ULaw,
                    Some(G711CodecArg::Alaw) => AudioCodec::G711ALaw,
                },
        }
    }

    /// The effective silence threshold: the explicit override if set,
    /// else the codec's default.
    pub fn silence_threshold(&self) -> f64 {
        self.silence_threshold.unwrap_or_else(|| self.audio_codec().default_silence_threshold())
    }

    /// Refuse to start on missing required configuration (spec §4.J /
    /// §6 Exit codes): G.711 sub-codec must be set when the audio
    /// format needs one, and every facade URL must be non-empty.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.audio_format == AudioFormatArg::G711 && self.g711_codec.is_none() {
            anyhow::bail!("--g711-codec is required when --audio-format=g711");
        }
        for (name, url) in [
            ("--stt-url", &self.stt_url),
            ("--translate-url", &self.translate_url),
            ("--assistant-url", &self.assistant_url),
            ("--tts-url", &self.tts_url),
        ] {
            if url.trim().is_empty() {
                anyhow::bail!("{name} must be set");
            }
        }
        Ok(())
    }

    /// Construct a config for unit tests without going through CLI
    /// parsing; service URLs are filled in with inert placeholders.
    #[cfg(test)]
    pub fn for_tests(work_dir: PathBuf) -> Self {
        Self {
            listen: "127.0.0.1:0".to_string(),
            audio_format: AudioFormatArg::Pcm16,
            g711_codec: None,
            silence_threshold: None,
            silence_duration_ms: 2000,
            max_call_duration_secs: 120,
            assistant_language: "en".to_string(),
            stt_url: "http://127.0.0.1:0/stt".to_string(),
            stt_api_key: None,
            translate_url: "http://127.0.0.1:0/translate".to_string(),
            translate_api_key: None,
            assistant_url: "http://127.0.0.1:0/assistant".to_string(),
            assistant_api_key: None,
            tts_url: "http://127.0.0.1:0/tts".to_string(),
            tts_api_key: None,
            work_dir,
        }
    }
}
