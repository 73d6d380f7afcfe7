//! Audio activity sampling.
//!
//! An [`AudioMonitor`] owns one sampling task per audio source. The task
//! reads the analyser's spectrum once per frame tick and reports a level in
//! `[0, 1]`. It never ends on its own: it stops when the monitor is stopped
//! or dropped, which also disconnects the analyser.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::media::AudioAnalyser;

/// Default frame tick, roughly one display refresh at 60 Hz.
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// `min(mean(spectrum) / 128, 1)`. An empty spectrum is silence.
pub fn level_from_spectrum(spectrum: &[u8]) -> f32 {
    if spectrum.is_empty() {
        return 0.0;
    }
    let sum: u32 = spectrum.iter().map(|&b| u32::from(b)).sum();
    let mean = sum as f32 / spectrum.len() as f32;
    (mean / 128.0).min(1.0)
}

pub struct AudioMonitor {
    task: Option<JoinHandle<()>>,
    analyser: Arc<dyn AudioAnalyser>,
}

impl AudioMonitor {
    /// Spawn the sampling loop. `on_level` runs on every tick, the first
    /// one immediately.
    pub fn start<F>(analyser: Arc<dyn AudioAnalyser>, interval: Duration, on_level: F) -> Self
    where
        F: Fn(f32) + Send + Sync + 'static,
    {
        let sampler = Arc::clone(&analyser);
        let task = tokio::spawn(async move {
            let mut spectrum = vec![0u8; sampler.bin_count()];
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                sampler.frequency_data(&mut spectrum);
                on_level(level_from_spectrum(&spectrum));
            }
        });

        Self {
            task: Some(task),
            analyser,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Cancel the loop and detach the analyser. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            self.analyser.disconnect();
        }
    }
}

impl Drop for AudioMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for AudioMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioMonitor")
            .field("running", &self.is_running())
            .finish()
    }
}
