/// Call Session: per-connection orchestration (spec §4.F).
///
/// Owns the single writer to the TCP connection. The uplink reader /
/// endpointer runs as a long-lived task for the whole life of the
/// call, independent of the turn loop below: it keeps demultiplexing
/// frames — and can detect a fresh voice onset — while `run_turn` is
/// still playing out a *previous* turn's response, which is what lets
/// a barge-in interrupt that playback (spec §5 requires the uplink
/// reader and the paced writer to be separate, concurrently-running
/// activities, not sequential turn-by-turn steps). Grounded on
/// `Handle`/`processFromAsterisk` in `packages/audiosocket/main.go`
/// (`go sendAudio(...)` is fire-and-forget, so the next
/// `go processFromAsterisk(...)` already reads the uplink while the
/// previous reply is still playing), redesigned so all state the Go
/// source kept in package-level globals (`audioData`, `id`, `language`,
/// `ctx`/`cancel`) is owned here instead, and captured by
/// reference/channel into the spawned uplink/barge-in activities.
use crate::bargein;
use crate::config::BridgeConfig;
use crate::endpoint::{ Endpointer, FrameOutcome };
use crate::error::{ SessionError, SessionOutcome };
use crate::facades::{ Assistant, LanguageDetector, Synthesizer, Transcriber, Translator, TranscribeInput };
use crate::frame::{ self, Kind };
use crate::paced_writer::{ self, PlaybackOutcome };
use crate::volume::AudioCodec;
use crate::wav;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{ Duration, Instant as StdInstant };
use tokio::io::{ AsyncReadExt, AsyncWriteExt };
use tokio::net::TcpStream;
use tokio::sync::{ mpsc, watch };
use tokio::time::{ self, Instant };
use uuid::Uuid;

/// The external collaborators a session needs. Shared across sessions
/// (safe for concurrent use, per spec §4.G), handed to each session by
/// the accept loop.
pub struct SessionDeps {
    pub transcriber: Arc<dyn Transcriber>,
    pub detector: Arc<dyn LanguageDetector>,
    pub translator: Arc<dyn Translator>,
    pub assistant: Arc<dyn Assistant>,
    pub synthesizer: Arc<dyn Synthesizer>,
}

/// Why the uplink reader task stopped. Delivered to the orchestrator
/// over a channel so a peer close/hangup/protocol error ends the turn
/// loop (and cancels any turn in progress) promptly, instead of only
/// being noticed once the current turn's playback happens to finish.
enum UplinkTerminal {
    PeerClosed,
    Hangup,
    Error(SessionError),
}

impl UplinkTerminal {
    fn into_outcome(self) -> SessionOutcome {
        match self {
            UplinkTerminal::PeerClosed => SessionOutcome::PeerClosed,
            UplinkTerminal::Hangup => SessionOutcome::Hangup,
            UplinkTerminal::Error(e) => SessionOutcome::Error(e),
        }
    }
}

/// Reads uplink frames for the whole life of the call. Each completed
/// utterance is handed to the orchestrator over `utterance_tx`;
/// `caller_speaking` is published `true` on voice onset and reset back
/// to `false` once that utterance closes, so a later playback start
/// only ever observes a *fresh* onset, never one left over from the
/// utterance that produced the response now playing. Runs until the
/// peer hangs up, the connection closes, or a framing error occurs,
/// reporting the reason via `terminal_tx` before returning.
async fn run_uplink_reader<R: AsyncReadExt + Unpin>(
    mut reader: R,
    codec: AudioCodec,
    threshold: f64,
    silence_duration: Duration,
    caller_speaking: watch::Sender<bool>,
    utterance_tx: mpsc::Sender<Vec<u8>>,
    terminal_tx: mpsc::Sender<UplinkTerminal>
) {
    let mut endpointer = Endpointer::new(threshold, silence_duration);

    loop {
        let msg = match frame::next_message(&mut reader).await {
            Ok(m) => m,
            Err(e) if e.is_eof() => {
                let _ = terminal_tx.send(UplinkTerminal::PeerClosed).await;
                return;
            }
            Err(e) => {
                let _ = terminal_tx.send(UplinkTerminal::Error(SessionError::Protocol(e))).await;
                return;
            }
        };

        match msg.kind {
            Kind::Hangup => {
                let _ = terminal_tx.send(UplinkTerminal::Hangup).await;
                return;
            }
            Kind::Error => {
                // Informational only; counts as packet loss, state unchanged.
                tracing::warn!("received Error frame on uplink");
            }
            Kind::Slin => {
                let rms = codec.rms(&msg.payload);
                let now = StdInstant::now();
                match endpointer.feed(&msg.payload, rms, now) {
                    FrameOutcome::Continue => {}
                    FrameOutcome::SpeechStarted => {
                        let _ = caller_speaking.send(true);
                    }
                    FrameOutcome::UtteranceComplete => {
                        let bytes = endpointer.take_utterance();
                        endpointer = Endpointer::new(threshold, silence_duration);
                        let _ = caller_speaking.send(false);
                        if utterance_tx.send(bytes).await.is_err() {
                            return;
                        }
                    }
                }
            }
            Kind::Id | Kind::Unknown(_) => {}
        }
    }
}

/// Drive one full call from Identifier read to terminal teardown.
pub async fn run(stream: TcpStream, config: Arc<BridgeConfig>, deps: Arc<SessionDeps>) -> SessionOutcome {
    let (mut read_half, mut write_half) = stream.into_split();

    let call_id = match frame::get_id(&mut read_half).await {
        Ok(bytes) => Uuid::from_bytes(bytes),
        Err(e) => {
            tracing::warn!(error = %e, "failed to read call identifier");
            return SessionOutcome::Error(SessionError::Protocol(e));
        }
    };
    let call_id_str = call_id.to_string();
    tracing::info!(call_id = %call_id_str, "call started");

    let deadline = Instant::now() + Duration::from_secs(config.max_call_duration_secs);

    let (playback_active_tx, playback_active_rx) = watch::channel(false);
    let (caller_speaking_tx, caller_speaking_rx) = watch::channel(false);
    let (interrupt_tx, mut interrupt_rx) = mpsc::channel::<()>(1);
    let (bargein_done_tx, bargein_done_rx) = mpsc::channel::<()>(1);

    let bargein_handle = tokio::spawn(
        bargein::run(playback_active_rx, caller_speaking_rx, interrupt_tx, bargein_done_rx)
    );

    // The uplink reader/endpointer is spawned once for the whole call,
    // not re-entered each turn: it keeps running (and can observe a
    // barge-in) while `run_turn` below is still synthesizing/playing a
    // previous response. Utterances and terminal conditions reach the
    // orchestrator over these two channels.
    let (utterance_tx, mut utterance_rx) = mpsc::channel::<Vec<u8>>(4);
    let (terminal_tx, mut terminal_rx) = mpsc::channel::<UplinkTerminal>(1);
    let reader_handle = tokio::spawn(
        run_uplink_reader(
            read_half,
            config.audio_codec(),
            config.silence_threshold(),
            Duration::from_millis(config.silence_duration_ms),
            caller_speaking_tx,
            utterance_tx,
            terminal_tx
        )
    );

    let mut language_state: Option<String> = None;
    let mut turn_index: u64 = 0;

    let outcome = 'turns: loop {
        tokio::select! {
            biased;

            _ = time::sleep_until(deadline) => {
                break 'turns SessionOutcome::Deadline;
            }

            terminal = terminal_rx.recv() => {
                break 'turns terminal.map_or(SessionOutcome::PeerClosed, UplinkTerminal::into_outcome);
            }

            Some(utterance) = utterance_rx.recv() => {
                turn_index += 1;
                let turn_fut = run_turn(
                    turn_index,
                    &call_id_str,
                    utterance,
                    &mut language_state,
                    &config,
                    &deps,
                    &mut write_half,
                    &playback_active_tx,
                    &mut interrupt_rx,
                    deadline
                );

                // Race the turn itself (STT/translate/assistant/TTS/play)
                // against the same deadline and the uplink's terminal
                // signal, so a call that expires or whose peer hangs up
                // mid-playback is cut off immediately rather than once
                // that turn's processing happens to finish (spec §5, §7
                // policy 3).
                tokio::select! {
                    biased;

                    _ = time::sleep_until(deadline) => {
                        break 'turns SessionOutcome::Deadline;
                    }

                    terminal = terminal_rx.recv() => {
                        break 'turns terminal.map_or(SessionOutcome::PeerClosed, UplinkTerminal::into_outcome);
                    }

                    turn_result = turn_fut => {
                        if let Err(outcome) = turn_result {
                            break 'turns outcome;
                        }
                    }
                }
            }
        }
    };

    // Fixed teardown order: stop the uplink reader and the barge-in
    // coordinator before the best-effort hangup write, so no activity
    // is left reading from or writing to the connection once it starts
    // closing.
    reader_handle.abort();
    let _ = reader_handle.await;
    let _ = bargein_done_tx.send(()).await;
    let _ = bargein_handle.await;

    let hangup = frame::hangup_message();
    let _ = frame::write_frame(&mut write_half, &hangup).await;

    tracing::info!(call_id = %call_id_str, outcome = ?outcome, "call ended");
    outcome
}

#[allow(clippy::too_many_arguments)]
async fn run_turn<W: AsyncWriteExt + Unpin>(
    turn_index: u64,
    call_id: &str,
    utterance: Vec<u8>,
    language_state: &mut Option<String>,
    config: &BridgeConfig,
    deps: &SessionDeps,
    write_half: &mut W,
    playback_active_tx: &watch::Sender<bool>,
    interrupt_rx: &mut mpsc::Receiver<()>,
    deadline: Instant
) -> Result<(), SessionOutcome> {
    let input_wav_path: PathBuf = config.work_dir.join(format!("input-{call_id}-{turn_index}.wav"));
    if let Err(e) = wav::write_slin_wav_async(input_wav_path.clone(), utterance).await {
        tracing::warn!(call_id, error = %e, "failed to stage input WAV");
        return Err(SessionOutcome::Error(SessionError::Io(e)));
    }

    let transcription = deps.transcriber
        .transcribe(TranscribeInput { wav_path: input_wav_path.clone() }, deadline).await
        .map_err(|e| {
            wav::delete_in_background(input_wav_path.clone());
            SessionOutcome::Error(SessionError::External(e))
        })?;
    wav::delete_in_background(input_wav_path);

    tracing::debug!(call_id, turn = turn_index, %transcription, "transcription ready");

    if language_state.is_none() {
        if let Some(lang) = deps.detector.detect(&transcription).await {
            tracing::debug!(call_id, detected_language = %lang, "pinned caller language");
            *language_state = Some(lang);
        }
    }

    let caller_lang = language_state.clone().unwrap_or_else(|| config.assistant_language.clone());

    let assistant_input = if caller_lang != config.assistant_language {
        deps.translator
            .translate(&transcription, &caller_lang, &config.assistant_language, deadline).await
            .map_err(|e| SessionOutcome::Error(SessionError::External(e)))?
    } else {
        transcription
    };

    let responses = deps.assistant
        .reply(call_id, &assistant_input, deadline).await
        .map_err(|e| SessionOutcome::Error(SessionError::External(e)))?;

    if responses.is_empty() {
        tracing::debug!(call_id, turn = turn_index, "assistant returned no responses");
        return Ok(());
    }

    for (i, response) in responses.iter().enumerate() {
        let reply_text = if caller_lang != config.assistant_language {
            deps.translator
                .translate(&response.text, &config.assistant_language, &caller_lang, deadline).await
                .map_err(|e| SessionOutcome::Error(SessionError::External(e)))?
        } else {
            response.text.clone()
        };

        let tts_wav_path = deps.synthesizer
            .synthesize(&reply_text, &caller_lang, deadline).await
            .map_err(|e| SessionOutcome::Error(SessionError::External(e)))?;

        let pcm = wav::read_wav_as_slin_async(tts_wav_path.clone()).await.map_err(|e| {
            wav::delete_in_background(tts_wav_path.clone());
            SessionOutcome::Error(SessionError::Io(e))
        })?;
        wav::delete_in_background(tts_wav_path);

        tracing::debug!(call_id, turn = turn_index, response_index = i, "playing response");

        match paced_writer::play(write_half, &pcm, playback_active_tx, interrupt_rx).await {
            Ok(PlaybackOutcome::Finished) => {}
            Ok(PlaybackOutcome::Interrupted) => {
                tracing::debug!(call_id, turn = turn_index, "playback interrupted by barge-in");
                break;
            }
            Ok(PlaybackOutcome::PeerGone) => {
                return Err(SessionOutcome::PeerClosed);
            }
            Err(e) => {
                return Err(SessionOutcome::Error(SessionError::Protocol(e)));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FacadeError;
    use crate::facades::AssistantMessage;
    use async_trait::async_trait;
    use std::sync::atomic::{ AtomicUsize, Ordering };
    use tempfile::tempdir;
    use tokio::io::duplex;

    struct StubTranscriber(String);
    #[async_trait]
    impl Transcriber for StubTranscriber {
        async fn transcribe(&self, _input: TranscribeInput, _deadline: Instant) -> Result<String, FacadeError> {
            Ok(self.0.clone())
        }
    }

    struct StubDetector;
    #[async_trait]
    impl LanguageDetector for StubDetector {
        async fn detect(&self, _text: &str) -> Option<String> {
            Some("en".to_string())
        }
    }

    struct PassthroughTranslator;
    #[async_trait]
    impl Translator for PassthroughTranslator {
        async fn translate(
            &self,
            text: &str,
            _source: &str,
            _target: &str,
            _deadline: Instant
        ) -> Result<String, FacadeError> {
            Ok(format!("[translated]{text}"))
        }
    }

    struct EmptyAssistant;
    #[async_trait]
    impl Assistant for EmptyAssistant {
        async fn reply(&self, _call_id: &str, _text: &str, _deadline: Instant) -> Result<Vec<AssistantMessage>, FacadeError> {
            Ok(vec![])
        }
    }

    struct FailingAssistant;
    #[async_trait]
    impl Assistant for FailingAssistant {
        async fn reply(&self, _call_id: &str, _text: &str, _deadline: Instant) -> Result<Vec<AssistantMessage>, FacadeError> {
            Err(FacadeError::Status { status: 500, body: "boom".into() })
        }
    }

    struct StubSynthesizer {
        dir: PathBuf,
        calls: AtomicUsize,
    }
    #[async_trait]
    impl Synthesizer for StubSynthesizer {
        async fn synthesize(&self, _text: &str, _lang_tag: &str, _deadline: Instant) -> Result<PathBuf, FacadeError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let path = self.dir.join(format!("tts-{n}.wav"));
            wav::write_slin_wav(&path, &[0u8; 320]).map_err(FacadeError::Io)?;
            Ok(path)
        }
    }

    fn test_config(work_dir: PathBuf) -> BridgeConfig {
        BridgeConfig::for_tests(work_dir)
    }

    #[tokio::test]
    async fn empty_assistant_response_proceeds_silently() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path().to_path_buf());
        let deps = SessionDeps {
            transcriber: Arc::new(StubTranscriber("hello".into())),
            detector: Arc::new(StubDetector),
            translator: Arc::new(PassthroughTranslator),
            assistant: Arc::new(EmptyAssistant),
            synthesizer: Arc::new(
                StubSynthesizer { dir: dir.path().to_path_buf(), calls: AtomicUsize::new(0) }
            ),
        };

        let (mut client, _server) = duplex(1 << 20);
        let (playback_tx, _playback_rx) = watch::channel(false);
        let (_interrupt_tx, mut interrupt_rx) = mpsc::channel(1);
        let mut language_state = None;
        let deadline = Instant::now() + Duration::from_secs(5);

        let result = run_turn(
            1,
            "call-1",
            vec![0u8; 320],
            &mut language_state,
            &config,
            &deps,
            &mut client,
            &playback_tx,
            &mut interrupt_rx,
            deadline
        ).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn assistant_failure_ends_session_with_external_error() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path().to_path_buf());
        let deps = SessionDeps {
            transcriber: Arc::new(StubTranscriber("hello".into())),
            detector: Arc::new(StubDetector),
            translator: Arc::new(PassthroughTranslator),
            assistant: Arc::new(FailingAssistant),
            synthesizer: Arc::new(
                StubSynthesizer { dir: dir.path().to_path_buf(), calls: AtomicUsize::new(0) }
            ),
        };

        let mut language_state = Some("en".to_string());
        let deadline = Instant::now() + Duration::from_secs(5);
        let (playback_tx, _playback_rx) = watch::channel(false);
        let (_interrupt_tx, mut interrupt_rx) = mpsc::channel(1);
        let (mut client, _server) = duplex(1 << 20);

        let result = run_turn(
            1,
            "call-1",
            vec![0u8; 320],
            &mut language_state,
            &config,
            &deps,
            &mut client,
            &playback_tx,
            &mut interrupt_rx,
            deadline
        ).await;

        assert!(matches!(result, Err(SessionOutcome::Error(SessionError::External(_)))));
    }
}
