//! Headless clock backend
//!
//! Renders one period every period duration into a scratch buffer, so voices
//! consume their queues in real time without an audio device.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{bounded, RecvTimeoutError, Sender};

use crate::error::{AudioError, AudioResult};
use crate::hardware::SoftwareMixer;

/// Periods rendered back to back before the clock gives up catching up
const MAX_CATCH_UP: u32 = 8;

pub(super) struct ClockThread {
    shutdown: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl ClockThread {
    pub fn start(mixer: Arc<SoftwareMixer>, sample_rate: u32, period_frames: u32) -> AudioResult<Self> {
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let period = Duration::from_secs_f64(period_frames as f64 / sample_rate.max(1) as f64);

        let thread = thread::Builder::new()
            .name("cadence-clock".to_string())
            .spawn(move || {
                let mut scratch = vec![0.0f32; period_frames as usize * 2];
                let mut deadline = Instant::now() + period;
                log::debug!("Headless clock running: {:?} per period", period);

                loop {
                    let timeout = deadline.saturating_duration_since(Instant::now());
                    match shutdown_rx.recv_timeout(timeout) {
                        Err(RecvTimeoutError::Timeout) => {}
                        _ => break,
                    }

                    let mut rendered = 0;
                    while Instant::now() >= deadline && rendered < MAX_CATCH_UP {
                        mixer.render(&mut scratch, 2);
                        deadline += period;
                        rendered += 1;
                    }
                    if rendered == MAX_CATCH_UP {
                        // Too far behind: drop the backlog instead of bursting
                        deadline = Instant::now() + period;
                    }
                }
                log::debug!("Headless clock stopped");
            })
            .map_err(|e| AudioError::ContextError(format!("failed to spawn clock thread: {}", e)))?;

        Ok(Self {
            shutdown: shutdown_tx,
            thread: Some(thread),
        })
    }
}

impl Drop for ClockThread {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Clock thread panicked");
            }
        }
    }
}
