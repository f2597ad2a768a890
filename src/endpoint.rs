/// Per-utterance voice-activity/silence endpointing state machine.
///
/// States: `Idle` (no voice yet this utterance), `Voiced` (at least one
/// above-threshold frame accumulated), `Trailing` (sub-threshold run in
/// progress within a voiced utterance). Transitions are driven by each
/// uplink SlinAudio frame's RMS against `silence_threshold` (spec §4.C).
///
/// Policy: pre-onset silence is excluded from the emitted utterance —
/// payload is discarded while `Idle` and accumulation starts at the
/// first voiced frame (see SPEC_FULL.md §4, resolving the spec's open
/// question on this point).
use std::time::{ Duration, Instant };

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Voiced,
    Trailing,
}

/// Outcome of feeding one uplink frame to the endpointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Nothing user-visible happened yet; keep reading frames.
    Continue,
    /// The caller began speaking this utterance (emit once, on the
    /// Idle -> Voiced transition).
    SpeechStarted,
    /// A full utterance has been captured; call `take_utterance` and
    /// start a fresh endpointer for the next turn.
    UtteranceComplete,
}

/// Drives the VAD state machine for a single utterance capture.
pub struct Endpointer {
    state: State,
    threshold: f64,
    silence_duration: Duration,
    silence_start: Option<Instant>,
    buffer: Vec<u8>,
}

impl Endpointer {
    pub fn new(threshold: f64, silence_duration: Duration) -> Self {
        Self {
            state: State::Idle,
            threshold,
            silence_duration,
            silence_start: None,
            buffer: Vec::new(),
        }
    }

    /// Feed one SlinAudio payload's RMS and bytes through the state
    /// machine. `now` is injected for deterministic testing.
    pub fn feed(&mut self, payload: &[u8], rms: f64, now: Instant) -> FrameOutcome {
        let voiced = rms >= self.threshold;

        match self.state {
            State::Idle => {
                if voiced {
                    self.state = State::Voiced;
                    self.buffer.extend_from_slice(payload);
                    FrameOutcome::SpeechStarted
                } else {
                    // Pre-onset silence is discarded, not accumulated.
                    FrameOutcome::Continue
                }
            }
            State::Voiced => {
                self.buffer.extend_from_slice(payload);
                if voiced {
                    FrameOutcome::Continue
                } else {
                    self.state = State::Trailing;
                    self.silence_start = Some(now);
                    FrameOutcome::Continue
                }
            }
            State::Trailing => {
                self.buffer.extend_from_slice(payload);
                if voiced {
                    self.state = State::Voiced;
                    self.silence_start = None;
                    FrameOutcome::Continue
                } else {
                    let start = self.silence_start.expect("Trailing state always has silence_start set");
                    if now.duration_since(start) >= self.silence_duration {
                        FrameOutcome::UtteranceComplete
                    } else {
                        FrameOutcome::Continue
                    }
                }
            }
        }
    }

    /// Consume and return the accumulated utterance bytes. Call only
    /// after `feed` returns `UtteranceComplete`.
    pub fn take_utterance(self) -> Vec<u8> {
        self.buffer
    }

    /// `true` once at least one voiced frame has been observed.
    pub fn has_spoken(&self) -> bool {
        self.state != State::Idle
    }
}
