use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

mod timed;

pub use timed::TimedAudio;

/// Identifies one local audio element for the lifetime of a runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSignal {
    Ended,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct AudioNotification {
    pub handle: HandleId,
    pub signal: AudioSignal,
}

/// Completion/failure channel handed to every element at creation.
#[derive(Debug, Clone)]
pub struct AudioNotifier {
    handle: HandleId,
    tx: mpsc::UnboundedSender<AudioNotification>,
}

impl AudioNotifier {
    pub fn new(handle: HandleId, tx: mpsc::UnboundedSender<AudioNotification>) -> Self {
        Self { handle, tx }
    }

    pub fn handle(&self) -> HandleId {
        self.handle
    }

    pub fn ended(&self) {
        self.send(AudioSignal::Ended);
    }

    pub fn failed(&self, err: impl ToString) {
        self.send(AudioSignal::Failed(err.to_string()));
    }

    fn send(&self, signal: AudioSignal) {
        // The runtime may already be gone during shutdown.
        let _ = self.tx.send(AudioNotification {
            handle: self.handle,
            signal,
        });
    }
}

/// Token-authenticated control of a remote playback device.
#[async_trait]
pub trait RemotePlayback: Send + Sync {
    fn name(&self) -> &'static str;
    async fn start(&self, device: &str, track_ref: &str, offset: Duration) -> Result<()>;
    async fn pause(&self, device: &str) -> Result<()>;
}

pub trait LocalAudio: Send + Sync {
    fn name(&self) -> &'static str;
    fn create(&self, source: &str, notifier: AudioNotifier) -> Result<Box<dyn AudioElement>>;
}

/// A single local playback element. Dropping it stops its audio.
pub trait AudioElement: Send {
    fn play(&mut self) -> Result<()>;
    fn pause(&mut self);
    fn set_position(&mut self, position: Duration);
    fn position(&self) -> Duration;
}

/// Remote collaborator used when no access token is configured.
pub struct NullRemote;

#[async_trait]
impl RemotePlayback for NullRemote {
    fn name(&self) -> &'static str {
        "null"
    }

    async fn start(&self, _device: &str, _track_ref: &str, _offset: Duration) -> Result<()> {
        Err(anyhow!("no remote playback configured"))
    }

    async fn pause(&self, _device: &str) -> Result<()> {
        Err(anyhow!("no remote playback configured"))
    }
}

#[cfg(test)]
mod tests {
    use super::{AudioNotifier, AudioSignal, HandleId, NullRemote, RemotePlayback};
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn null_remote_always_fails() {
        let remote = NullRemote;
        assert!(remote
            .start("dev", "spotify:track:1", Duration::ZERO)
            .await
            .is_err());
        assert!(remote.pause("dev").await.is_err());
    }

    #[test]
    fn notifier_tags_signals_with_its_handle() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let notifier = AudioNotifier::new(HandleId(7), tx);
        notifier.failed("rejected");
        notifier.ended();

        let first = rx.try_recv().unwrap();
        assert_eq!(first.handle, HandleId(7));
        assert_eq!(first.signal, AudioSignal::Failed("rejected".to_string()));
        assert_eq!(rx.try_recv().unwrap().signal, AudioSignal::Ended);
    }

    #[test]
    fn notifier_survives_closed_channel() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        AudioNotifier::new(HandleId(1), tx).ended();
    }
}
