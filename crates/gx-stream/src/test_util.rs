//! Transport double shared by the unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use gx_core::error::{GxError, Result};
use gx_core::ws::Transport;

/// Records every frame; can be switched into a failing state.
#[derive(Default)]
pub struct RecordingTransport {
    frames: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl RecordingTransport {
    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().unwrap().clone()
    }

    pub fn count_of(&self, frame: &str) -> usize {
        self.frames.lock().unwrap().iter().filter(|f| *f == frame).count()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_text(&self, frame: String) -> Result<()> {
        // Give racing subscribers a chance to interleave.
        tokio::task::yield_now().await;
        if self.failing.load(Ordering::SeqCst) {
            return Err(GxError::Transmission("connection closed".into()));
        }
        self.frames.lock().unwrap().push(frame);
        Ok(())
    }
}
