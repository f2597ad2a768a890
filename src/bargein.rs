/// Barge-in coordinator: combines the latest-wins `playback-active` and
/// `caller-speaking` booleans into a one-shot `interrupt-playback`
/// event (spec §4.E).
///
/// Rule: once both signals are observed true simultaneously, emit
/// exactly one interrupt and reset the caller-speaking latch so
/// re-entry requires a fresh voice onset.
use tokio::sync::{ mpsc, watch };

/// Spawn the coordinator task. Returns when `done` fires.
///
/// `playback_active` / `caller_speaking` are `watch` receivers (latest-
/// wins semantics); `interrupt_tx` carries the one-shot interrupt to
/// the paced writer.
pub async fn run(
    mut playback_active: watch::Receiver<bool>,
    mut caller_speaking: watch::Receiver<bool>,
    interrupt_tx: mpsc::Sender<()>,
    mut done: mpsc::Receiver<()>
) {
    let mut latched_speaking = false;

    loop {
        tokio::select! {
            biased;

            _ = done.recv() => {
                return;
            }

            changed = playback_active.changed() => {
                if changed.is_err() {
                    return;
                }
                let active = *playback_active.borrow();
                if active && latched_speaking {
                    fire_interrupt(&interrupt_tx, &mut latched_speaking).await;
                }
            }

            changed = caller_speaking.changed() => {
                if changed.is_err() {
                    return;
                }
                let speaking = *caller_speaking.borrow();
                if speaking {
                    latched_speaking = true;
                    if *playback_active.borrow() {
                        fire_interrupt(&interrupt_tx, &mut latched_speaking).await;
                    }
                } else {
                    // The caller has gone back to silence (utterance closed):
                    // clear the latch so the *next* playback doesn't inherit a
                    // stale "speaking" latch from the utterance that produced
                    // it and self-interrupt on start.
                    latched_speaking = false;
                }
            }
        }
    }
}

async fn fire_interrupt(interrupt_tx: &mpsc::Sender<()>, latched_speaking: &mut bool) {
    let _ = interrupt_tx.send(()).await;
    *latched_speaking = false;
}
