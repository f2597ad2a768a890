mod bargein;
mod config;
mod endpoint;
mod error;
mod facades;
mod frame;
mod paced_writer;
mod server;
mod session;
mod volume;
mod wav;

use clap::Parser;
use config::BridgeConfig;
use facades::{ HeuristicLanguageDetector, HttpAssistant, HttpSynthesizer, HttpTranscriber, HttpTranslator };
use session::SessionDeps;
use std::sync::Arc;
use tracing::{ error, info };

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber
        ::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter
                ::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
        )
        .with_target(false)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .init();

    let config = BridgeConfig::parse();
    if let Err(e) = config.validate() {
        error!(error = %e, "invalid configuration");
        std::process::exit(1);
    }
    if let Err(e) = tokio::fs::create_dir_all(&config.work_dir).await {
        error!(error = %e, work_dir = %config.work_dir.display(), "failed to create work directory");
        std::process::exit(1);
    }

    info!(
        listen = %config.listen,
        audio_codec = ?config.audio_codec(),
        assistant_language = %config.assistant_language,
        "voice-dialog-bridge starting"
    );

    let http_client = reqwest::Client::new();
    let deps = Arc::new(SessionDeps {
        transcriber: Arc::new(
            HttpTranscriber::new(http_client.clone(), config.stt_url.clone(), config.stt_api_key.clone())
        ),
        detector: Arc::new(HeuristicLanguageDetector::default()),
        translator: Arc::new(
            HttpTranslator::new(http_client.clone(), config.translate_url.clone(), config.translate_api_key.clone())
        ),
        assistant: Arc::new(
            HttpAssistant::new(http_client.clone(), config.assistant_url.clone(), config.assistant_api_key.clone())
        ),
        synthesizer: Arc::new(
            HttpSynthesizer::new(
                http_client,
                config.tts_url.clone(),
                config.tts_api_key.clone(),
                config.work_dir.clone()
            )
        ),
    });

    let config = Arc::new(config);
    if let Err(e) = server::run(config, deps).await {
        error!(error = %e, "listener failed");
        std::process::exit(1);
    }

    Ok(())
}
