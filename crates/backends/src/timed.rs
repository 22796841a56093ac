use crate::{AudioElement, AudioNotifier, LocalAudio};
use anyhow::{anyhow, Result};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Local output that simulates audio elements with timers: every source
/// "plays" for `length` and then reports its natural end.
pub struct TimedAudio {
    length: Duration,
}

impl TimedAudio {
    pub fn new(length: Duration) -> Self {
        Self { length }
    }
}

impl LocalAudio for TimedAudio {
    fn name(&self) -> &'static str {
        "timed"
    }

    fn create(&self, source: &str, notifier: AudioNotifier) -> Result<Box<dyn AudioElement>> {
        debug!(source, handle = ?notifier.handle(), "creating timed audio element");
        Ok(Box::new(TimedElement {
            source: source.to_string(),
            length: self.length,
            position: Duration::ZERO,
            playing_since: None,
            notifier,
            task: None,
        }))
    }
}

struct TimedElement {
    source: String,
    length: Duration,
    position: Duration,
    playing_since: Option<Instant>,
    notifier: AudioNotifier,
    task: Option<JoinHandle<()>>,
}

impl AudioElement for TimedElement {
    fn play(&mut self) -> Result<()> {
        if self.source.trim().is_empty() {
            return Err(anyhow!("audio source is empty"));
        }
        if self.task.is_some() {
            return Ok(());
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| anyhow!("no async runtime to drive audio playback"))?;

        let remaining = self.length.saturating_sub(self.position);
        let notifier = self.notifier.clone();
        self.playing_since = Some(Instant::now());
        self.task = Some(runtime.spawn(async move {
            tokio::time::sleep(remaining).await;
            notifier.ended();
        }));
        Ok(())
    }

    fn pause(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if let Some(since) = self.playing_since.take() {
            self.position = (self.position + since.elapsed()).min(self.length);
        }
    }

    fn set_position(&mut self, position: Duration) {
        let was_playing = self.task.is_some();
        self.pause();
        self.position = position.min(self.length);
        if was_playing {
            if let Err(err) = self.play() {
                self.notifier.failed(err);
            }
        }
    }

    fn position(&self) -> Duration {
        let running = self
            .playing_since
            .map(|since| since.elapsed())
            .unwrap_or_default();
        (self.position + running).min(self.length)
    }
}

impl Drop for TimedElement {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::TimedAudio;
    use crate::{AudioNotifier, AudioSignal, HandleId, LocalAudio};
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn reports_natural_end_after_length() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let audio = TimedAudio::new(Duration::from_secs(5));
        let mut el = audio
            .create("https://p.example/a.mp3", AudioNotifier::new(HandleId(1), tx))
            .unwrap();

        el.play().unwrap();
        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(200)).await;
        let note = rx.recv().await.unwrap();
        assert_eq!(note.handle, HandleId(1));
        assert_eq!(note.signal, AudioSignal::Ended);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_holds_position_and_seek_shortens_remaining() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let audio = TimedAudio::new(Duration::from_secs(10));
        let mut el = audio
            .create("a.mp3", AudioNotifier::new(HandleId(2), tx))
            .unwrap();

        el.play().unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        el.pause();
        assert_eq!(el.position(), Duration::from_secs(3));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(rx.try_recv().is_err());

        el.set_position(Duration::from_secs(8));
        el.play().unwrap();
        tokio::time::sleep(Duration::from_millis(2_100)).await;
        assert_eq!(rx.recv().await.unwrap().signal, AudioSignal::Ended);
    }

    #[tokio::test]
    async fn empty_source_is_rejected_on_play() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let audio = TimedAudio::new(Duration::from_secs(1));
        let mut el = audio.create("  ", AudioNotifier::new(HandleId(3), tx)).unwrap();
        assert!(el.play().is_err());
    }
}
