use crate::clock::ClipClock;
use crate::effect::{AudioRole, Effect, Ticket};
use crate::selector::select_backend;
use crate::sequencer::{AdvanceChain, ChainStage};
use crate::EngineConfig;
use clipdeck_backends::HandleId;
use clipdeck_core::{BackendKind, DeviceReadiness, Track};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Starting,
    Playing,
    Paused,
    Advancing,
}

/// Events whose validity depends on the current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Pause,
    Resume,
    Tick,
    ClipEnded,
    ClipStarted,
    AdvanceStep,
}

impl Phase {
    /// Transition table. An event arriving in a phase that does not accept it
    /// is dropped. `play_at`, `next`, `prev` and list replacement are accepted
    /// in every phase.
    pub fn accepts(self, trigger: Trigger) -> bool {
        use Phase::*;
        matches!(
            (self, trigger),
            (Starting | Playing | Advancing, Trigger::Pause)
                | (Paused, Trigger::Resume)
                | (Starting | Playing, Trigger::Tick | Trigger::ClipEnded)
                | (Starting, Trigger::ClipStarted)
                | (Advancing, Trigger::AdvanceStep)
        )
    }

    pub fn is_playing(self) -> bool {
        matches!(self, Phase::Starting | Phase::Playing)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStatus {
    pub generation: u64,
    pub phase: Phase,
    pub current_index: Option<usize>,
    pub track_id: Option<String>,
    pub is_playing: bool,
    pub elapsed: Duration,
    pub total: Duration,
    pub play_count: u64,
    pub backend: Option<BackendKind>,
    pub interstitial: Option<String>,
}

impl SessionStatus {
    pub fn progress(&self) -> f64 {
        if self.total.is_zero() {
            return 0.0;
        }
        (self.elapsed.as_secs_f64() / self.total.as_secs_f64()).min(1.0)
    }
}

enum ClipSource {
    Remote { device: String, track_ref: String },
    Local { source: String },
}

impl ClipSource {
    fn kind(&self) -> BackendKind {
        match self {
            ClipSource::Remote { .. } => BackendKind::Full,
            ClipSource::Local { .. } => BackendKind::Preview,
        }
    }
}

/// Clip playback state machine.
///
/// Every method runs to completion on the caller's timeline and returns the
/// effects the runtime has to carry out. Completions of those effects come
/// back through the `on_*` methods; anything tagged with a stale ticket or
/// arriving in a phase that does not accept it is ignored.
pub struct PlaybackSession {
    pub(crate) cfg: EngineConfig,
    device: watch::Receiver<DeviceReadiness>,
    pub(crate) tracks: Vec<Track>,
    generation: u64,
    epoch: u64,
    pub(crate) phase: Phase,
    pub(crate) current: Option<usize>,
    backend: Option<BackendKind>,
    clock: ClipClock,
    pub(crate) elapsed: Duration,
    total: Duration,
    advanced: bool,
    play_count: u64,
    pub(crate) interstitial: Option<String>,
    clip_handle: Option<HandleId>,
    pub(crate) interstitial_handle: Option<HandleId>,
    pub(crate) chain: Option<AdvanceChain>,
    /// Device a full clip was started on and not yet paused.
    pub(crate) remote_device: Option<String>,
    next_handle: u64,
}

impl PlaybackSession {
    pub fn new(cfg: EngineConfig, device: watch::Receiver<DeviceReadiness>) -> Self {
        Self {
            cfg,
            device,
            tracks: Vec::new(),
            generation: 0,
            epoch: 0,
            phase: Phase::Idle,
            current: None,
            backend: None,
            clock: ClipClock::new(),
            elapsed: Duration::ZERO,
            total: Duration::ZERO,
            advanced: false,
            play_count: 0,
            interstitial: None,
            clip_handle: None,
            interstitial_handle: None,
            chain: None,
            remote_device: None,
            next_handle: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            generation: self.generation,
            phase: self.phase,
            current_index: self.current,
            track_id: self
                .current
                .and_then(|i| self.tracks.get(i))
                .map(|t| t.id.clone()),
            is_playing: self.phase.is_playing(),
            elapsed: self.elapsed,
            total: self.total,
            play_count: self.play_count,
            backend: self.backend,
            interstitial: self.interstitial.clone(),
        }
    }

    /// Replaces the track list. Everything in flight for the old list is
    /// cancelled and later completions for it are discarded.
    pub fn load_tracks(&mut self, tracks: Vec<Track>) -> Vec<Effect> {
        let mut fx = Vec::new();
        self.halt(&mut fx);

        self.generation += 1;
        self.tracks = tracks;
        self.current = None;
        self.backend = None;
        self.elapsed = Duration::ZERO;
        self.total = Duration::ZERO;
        self.advanced = false;
        self.phase = Phase::Idle;

        info!(
            generation = self.generation,
            count = self.tracks.len(),
            unplayable = self.tracks.iter().filter(|t| !t.is_playable()).count(),
            "track list replaced"
        );
        fx
    }

    /// Applies late catalog detail for one track, but only to the list it was
    /// fetched for. Returns whether it was applied.
    pub fn resolve_track(&mut self, generation: u64, index: usize, track: Track) -> bool {
        if generation != self.generation {
            debug!(
                generation,
                current = self.generation,
                "discarding track resolution for a replaced list"
            );
            return false;
        }
        match self.tracks.get_mut(index) {
            Some(slot) if slot.id == track.id => {
                *slot = track;
                true
            }
            _ => {
                debug!(index, track_id = %track.id, "track resolution does not match the list");
                false
            }
        }
    }

    /// Takes effect at the next advance that reads it.
    pub fn set_interstitial(&mut self, selection: Option<String>) {
        self.interstitial = selection.filter(|s| !s.trim().is_empty());
        debug!(interstitial = ?self.interstitial, "interstitial selection changed");
    }

    pub fn play_at(&mut self, index: usize, now: Instant) -> Vec<Effect> {
        let Some(track) = self.tracks.get(index) else {
            warn!(index, len = self.tracks.len(), "play_at index out of range; ignoring");
            return Vec::new();
        };
        let Some(source) = self.source_for(index) else {
            warn!(index, track_id = %track.id, "track has no playable source; ignoring");
            return Vec::new();
        };

        let mut fx = Vec::new();
        self.halt(&mut fx);

        self.current = Some(index);
        self.advanced = false;
        self.play_count += 1;
        let kind = source.kind();
        self.start_clip(source, Duration::ZERO, now, &mut fx);

        info!(index, backend = ?kind, play_count = self.play_count, "starting clip");
        fx
    }

    pub fn pause(&mut self, now: Instant) -> Vec<Effect> {
        if !self.phase.accepts(Trigger::Pause) {
            debug!(phase = ?self.phase, "pause ignored");
            return Vec::new();
        }
        if let Some(elapsed) = self.clock.tick(now) {
            self.elapsed = self.elapsed.max(elapsed);
        }

        let mut fx = Vec::new();
        self.cancel_ticks(&mut fx);
        self.detach_interstitial(&mut fx);
        self.chain = None;
        self.stop_remote(&mut fx);
        if let Some(handle) = self.clip_handle {
            fx.push(Effect::PauseAudio { handle });
        }
        self.phase = Phase::Paused;

        info!(elapsed_ms = self.elapsed.as_millis() as u64, "paused");
        fx
    }

    pub fn resume(&mut self, now: Instant) -> Vec<Effect> {
        if !self.phase.accepts(Trigger::Resume) {
            debug!(phase = ?self.phase, "resume ignored");
            return Vec::new();
        }
        let Some(index) = self.current else {
            debug!("resume ignored; nothing loaded");
            return Vec::new();
        };
        // Stay on the paused backend while it still works.
        let source = self
            .backend
            .and_then(|kind| self.source_of_kind(index, kind))
            .or_else(|| self.source_for(index));
        let Some(source) = source else {
            warn!(index, "track is no longer playable; cannot resume");
            return Vec::new();
        };

        let mut fx = Vec::new();
        let carry = if Some(source.kind()) == self.backend {
            self.elapsed
        } else {
            info!(from = ?self.backend, to = ?source.kind(), "backend changed while paused; restarting clip");
            self.release_clip_audio(&mut fx);
            Duration::ZERO
        };

        self.advanced = false;
        self.start_clip(source, carry, now, &mut fx);
        fx
    }

    pub fn next(&mut self, now: Instant) -> Vec<Effect> {
        match self.current {
            Some(i) if i + 1 < self.tracks.len() => self.play_at(i + 1, now),
            _ => {
                debug!(current = ?self.current, "next ignored at end of list");
                Vec::new()
            }
        }
    }

    pub fn prev(&mut self, now: Instant) -> Vec<Effect> {
        match self.current {
            Some(i) if i > 0 => self.play_at(i - 1, now),
            _ => {
                debug!(current = ?self.current, "prev ignored at start of list");
                Vec::new()
            }
        }
    }

    pub fn on_tick(&mut self, epoch: u64, now: Instant) -> Vec<Effect> {
        if epoch != self.epoch || !self.phase.accepts(Trigger::Tick) {
            return Vec::new();
        }
        let Some(elapsed) = self.clock.tick(now) else {
            return Vec::new();
        };
        self.elapsed = self.elapsed.max(elapsed);

        if self.elapsed >= self.total {
            return self.finish_clip();
        }
        Vec::new()
    }

    pub fn on_remote_started(&mut self, ticket: Ticket, result: Result<(), String>) -> Vec<Effect> {
        if ticket != self.ticket() || !self.phase.accepts(Trigger::ClipStarted) {
            debug!(?ticket, "discarding stale remote start completion");
            return Vec::new();
        }
        match result {
            Ok(()) => {
                self.phase = Phase::Playing;
                Vec::new()
            }
            Err(err) => {
                warn!(error = %err, "remote start failed; abandoning clip");
                let mut fx = Vec::new();
                self.cancel_ticks(&mut fx);
                self.remote_device = None;
                self.phase = Phase::Paused;
                fx
            }
        }
    }

    pub fn on_remote_paused(&mut self, ticket: Ticket, result: Result<(), String>) -> Vec<Effect> {
        if let Err(err) = &result {
            warn!(error = %err, "remote pause failed; continuing");
        }
        if !self.awaiting(Some(ticket), &ChainStage::StoppingRemote) {
            return Vec::new();
        }
        let mut fx = Vec::new();
        self.after_remote_stopped(&mut fx);
        fx
    }

    pub fn on_settled(&mut self, ticket: Ticket, now: Instant) -> Vec<Effect> {
        if !self.awaiting(Some(ticket), &ChainStage::Settling) {
            debug!(?ticket, "discarding stale settle");
            return Vec::new();
        }
        self.continue_to_next(now)
    }

    pub fn on_audio_started(&mut self, handle: HandleId) {
        if Some(handle) == self.clip_handle && self.phase.accepts(Trigger::ClipStarted) {
            self.phase = Phase::Playing;
        } else if Some(handle) == self.interstitial_handle {
            debug!(?handle, "interstitial playing");
        }
    }

    pub fn on_audio_ended(&mut self, handle: HandleId, now: Instant) -> Vec<Effect> {
        if Some(handle) == self.clip_handle {
            if !self.phase.accepts(Trigger::ClipEnded) {
                return Vec::new();
            }
            if let Some(elapsed) = self.clock.tick(now) {
                self.elapsed = self.elapsed.max(elapsed);
            }
            return self.finish_clip();
        }
        if Some(handle) == self.interstitial_handle {
            return self.finish_interstitial(handle, now);
        }
        debug!(?handle, "ignoring end of a released audio element");
        Vec::new()
    }

    pub fn on_audio_failed(&mut self, handle: HandleId, error: &str, now: Instant) -> Vec<Effect> {
        if Some(handle) == self.clip_handle {
            warn!(%error, "local playback failed; stopping");
            let mut fx = Vec::new();
            self.cancel_ticks(&mut fx);
            self.release_clip_audio(&mut fx);
            if self.phase.is_playing() {
                self.phase = Phase::Paused;
            }
            return fx;
        }
        if Some(handle) == self.interstitial_handle {
            warn!(%error, "interstitial failed to play; moving on");
            return self.finish_interstitial(handle, now);
        }
        debug!(?handle, %error, "ignoring failure of a released audio element");
        Vec::new()
    }

    pub(crate) fn readiness(&self) -> DeviceReadiness {
        self.device.borrow().clone()
    }

    pub(crate) fn ticket(&self) -> Ticket {
        Ticket {
            generation: self.generation,
            epoch: self.epoch,
        }
    }

    pub(crate) fn alloc_handle(&mut self) -> HandleId {
        self.next_handle += 1;
        HandleId(self.next_handle)
    }

    fn source_for(&self, index: usize) -> Option<ClipSource> {
        let track = self.tracks.get(index)?;
        let kind = select_backend(track, &self.readiness()).backend()?;
        self.source_of_kind(index, kind)
    }

    fn source_of_kind(&self, index: usize, kind: BackendKind) -> Option<ClipSource> {
        let track = self.tracks.get(index)?;
        match kind {
            BackendKind::Full => Some(ClipSource::Remote {
                device: self.readiness().usable_device()?.to_string(),
                track_ref: track.remote_ref.clone()?,
            }),
            BackendKind::Preview => Some(ClipSource::Local {
                source: track.preview_ref.clone()?,
            }),
        }
    }

    fn start_clip(&mut self, source: ClipSource, carry: Duration, now: Instant, fx: &mut Vec<Effect>) {
        let kind = source.kind();
        let window = self.cfg.windows.for_backend(kind);
        self.epoch += 1;
        let ticket = self.ticket();

        match source {
            ClipSource::Remote { device, track_ref } => {
                self.remote_device = Some(device.clone());
                fx.push(Effect::RemoteStart {
                    ticket,
                    device,
                    track_ref,
                    offset: window.start_offset + carry,
                });
            }
            ClipSource::Local { source } => {
                // A fresh handle per start, so a notification from before a
                // pause cannot end the resumed clip.
                self.release_clip_audio(fx);
                let handle = self.alloc_handle();
                self.clip_handle = Some(handle);
                fx.push(Effect::CreateAudio {
                    handle,
                    role: AudioRole::Clip,
                    source,
                    position: window.start_offset + carry,
                });
            }
        }

        self.backend = Some(kind);
        self.total = window.duration;
        self.elapsed = carry;
        self.clock.start(now, carry);
        fx.push(Effect::StartTicker { epoch: ticket.epoch });
        self.phase = Phase::Starting;
    }

    /// One-shot end of the current clip; hands over to the sequencer.
    fn finish_clip(&mut self) -> Vec<Effect> {
        if self.advanced {
            debug!("clip end already handled");
            return Vec::new();
        }
        self.advanced = true;

        let mut fx = Vec::new();
        self.cancel_ticks(&mut fx);
        self.phase = Phase::Paused;
        self.begin_advance(&mut fx);
        fx
    }

    pub(crate) fn awaiting(&self, ticket: Option<Ticket>, stage: &ChainStage) -> bool {
        self.phase.accepts(Trigger::AdvanceStep)
            && self.chain.as_ref().is_some_and(|chain| {
                &chain.stage == stage && ticket.map_or(true, |t| t == chain.ticket)
            })
    }

    /// Invalidates outstanding ticks and completions.
    fn cancel_ticks(&mut self, fx: &mut Vec<Effect>) {
        self.epoch += 1;
        if self.clock.stop() {
            fx.push(Effect::StopTicker);
        }
    }

    pub(crate) fn detach_interstitial(&mut self, fx: &mut Vec<Effect>) {
        if let Some(handle) = self.interstitial_handle.take() {
            fx.push(Effect::ReleaseAudio { handle });
        }
    }

    pub(crate) fn release_clip_audio(&mut self, fx: &mut Vec<Effect>) {
        if let Some(handle) = self.clip_handle.take() {
            fx.push(Effect::ReleaseAudio { handle });
        }
    }

    pub(crate) fn stop_remote(&mut self, fx: &mut Vec<Effect>) {
        if let Some(device) = self.remote_device.take() {
            fx.push(Effect::RemotePause {
                ticket: self.ticket(),
                device,
            });
        }
    }

    /// Releases every live resource before a new clip or list takes over.
    fn halt(&mut self, fx: &mut Vec<Effect>) {
        self.cancel_ticks(fx);
        self.detach_interstitial(fx);
        self.chain = None;
        self.release_clip_audio(fx);
        self.stop_remote(fx);
    }
}
