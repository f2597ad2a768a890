/// Paced downlink writer: feeds a PCM16LE buffer to the caller in
/// 20ms/320-byte SlinAudio frames, one per tick, stopping immediately
/// on a barge-in interrupt (spec §4.D).
///
/// Grounded on `sendAudio` in `packages/audiosocket/main.go`: a
/// `time.NewTicker(20*time.Millisecond)` loop with a `select` over an
/// interrupt channel and a default chunk-send branch, toggling a
/// playback-active flag at start and on every exit path.
use crate::error::FrameError;
use crate::frame;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{ mpsc, watch };
use tokio::time::{ interval, MissedTickBehavior };

/// 20ms at 8kHz/16-bit/mono.
pub const CHUNK_BYTES: usize = 320;
const TICK: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// All chunks were written.
    Finished,
    /// A barge-in interrupt arrived; playback stopped early.
    Interrupted,
    /// The write side failed because the peer is gone.
    PeerGone,
}

/// Write `pcm` to `writer` in paced 320-byte frames, publishing
/// `playback_active` transitions and checking `interrupt_rx` between
/// every frame (non-blocking: a pending interrupt from a prior turn
/// would otherwise fire mid-stream).
pub async fn play<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    pcm: &[u8],
    playback_active: &watch::Sender<bool>,
    interrupt_rx: &mut mpsc::Receiver<()>
) -> Result<PlaybackOutcome, FrameError> {
    // Drain any interrupt left over from a previous, already-finished
    // turn so it doesn't immediately cancel this one.
    while interrupt_rx.try_recv().is_ok() {}

    let _ = playback_active.send(true);

    let mut ticker = interval(TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await; // consume the immediate first tick

    let outcome = 'chunks: {
        for chunk in pcm.chunks(CHUNK_BYTES) {
            tokio::select! {
                biased;

                _ = interrupt_rx.recv() => {
                    break 'chunks PlaybackOutcome::Interrupted;
                }

                _ = ticker.tick() => {
                    let frame_bytes = frame::slin_message(chunk);
                    if let Err(e) = frame::write_frame(writer, &frame_bytes).await {
                        let _ = playback_active.send(false);
                        if e.is_broken_pipe() {
                            return Ok(PlaybackOutcome::PeerGone);
                        }
                        return Err(e);
                    }
                }
            }
        }
        PlaybackOutcome::Finished
    };

    let _ = playback_active.send(false);
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;
    use tokio::io::duplex;

    #[tokio::test]
    async fn plays_all_chunks_when_uninterrupted() {
        let (mut client, mut server) = duplex(1 << 20);
        let (active_tx, mut active_rx) = watch::channel(false);
        let (_interrupt_tx, mut interrupt_rx) = mpsc::channel(1);

        let pcm = vec![0x55u8; CHUNK_BYTES * 3];
        let result = play(&mut client, &pcm, &active_tx, &mut interrupt_rx).await.unwrap();
        assert_eq!(result, PlaybackOutcome::Finished);
        assert_eq!(*active_rx.borrow_and_update(), false);

        // Read back all three frames from the server side.
        for _ in 0..3 {
            let msg = frame::next_message(&mut server).await.unwrap();
            assert_eq!(msg.payload.len(), CHUNK_BYTES);
        }
    }

    #[tokio::test]
    async fn stops_immediately_on_interrupt() {
        let (mut client, mut server) = duplex(1 << 20);
        let (active_tx, _active_rx) = watch::channel(false);
        let (interrupt_tx, mut interrupt_rx) = mpsc::channel(1);

        let pcm = vec![0x7fu8; CHUNK_BYTES * 20];

        let play_task = tokio::spawn(async move {
            play(&mut client, &pcm, &active_tx, &mut interrupt_rx).await
        });

        // Let a couple of frames go out, then interrupt.
        tokio::time::sleep(StdDuration::from_millis(45)).await;
        interrupt_tx.send(()).await.unwrap();

        let result = play_task.await.unwrap().unwrap();
        assert_eq!(result, PlaybackOutcome::Interrupted);

        // Drain what made it through before the interrupt; must be
        // strictly fewer than the full 20 frames.
        let mut count = 0;
        loop {
            let fut = frame::next_message(&mut server);
            match tokio::time::timeout(StdDuration::from_millis(50), fut).await {
                Ok(Ok(_)) => count += 1,
                _ => break,
            }
        }
        assert!(count < 20, "expected early termination, got {count} frames");
    }

    #[tokio::test]
    async fn toggles_playback_active_around_the_call() {
        let (mut client, _server) = duplex(1 << 20);
        let (active_tx, mut active_rx) = watch::channel(false);
        let (_interrupt_tx, mut interrupt_rx) = mpsc::channel(1);

        let pcm = vec![0u8; CHUNK_BYTES];
        active_rx.borrow_and_update();
        play(&mut client, &pcm, &active_tx, &mut interrupt_rx).await.unwrap();

        // We can't observe the transient `true` without racing the
        // writer, but the final state must be false.
        assert_eq!(*active_rx.borrow(), false);
    }
}
