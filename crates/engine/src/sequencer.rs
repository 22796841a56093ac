use crate::effect::{AudioRole, Effect, Ticket};
use crate::selector::select_backend;
use crate::session::{Phase, PlaybackSession};
use clipdeck_backends::HandleId;
use clipdeck_core::{Capability, DeviceReadiness, Track};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ChainStage {
    StoppingRemote,
    Settling,
    Interstitial(HandleId),
}

/// An advance in progress: the next index is already committed, the chain
/// waits for one step to settle before running the next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AdvanceChain {
    pub ticket: Ticket,
    pub next: usize,
    pub stage: ChainStage,
}

/// First index after `current`, wrapping around, whose track can be played
/// with the given device state. The current track itself is the last resort.
pub fn next_playable_index(
    tracks: &[Track],
    current: usize,
    device: &DeviceReadiness,
) -> Option<usize> {
    let len = tracks.len();
    (1..=len)
        .map(|step| (current + step) % len)
        .find(|&i| select_backend(&tracks[i], device) != Capability::Unplayable)
}

impl PlaybackSession {
    pub(crate) fn begin_advance(&mut self, fx: &mut Vec<Effect>) {
        let readiness = self.readiness();
        let next = self
            .current
            .and_then(|current| next_playable_index(&self.tracks, current, &readiness));
        self.release_clip_audio(fx);

        let Some(next) = next else {
            info!("nothing playable to advance to; going idle");
            self.stop_remote(fx);
            self.current = None;
            self.elapsed = Duration::ZERO;
            self.phase = Phase::Idle;
            return;
        };

        // The index is committed before any audio for the next clip loads.
        self.current = Some(next);
        self.elapsed = Duration::ZERO;
        self.phase = Phase::Advancing;

        let ticket = self.ticket();
        info!(next, "advancing");
        match self.remote_device.take() {
            Some(device) => {
                fx.push(Effect::RemotePause { ticket, device });
                self.chain = Some(AdvanceChain {
                    ticket,
                    next,
                    stage: ChainStage::StoppingRemote,
                });
            }
            None => {
                self.chain = Some(AdvanceChain {
                    ticket,
                    next,
                    stage: ChainStage::Settling,
                });
                self.after_remote_stopped(fx);
            }
        }
    }

    /// Reads the interstitial selection at this instant and either plays it
    /// or waits out the settle delay.
    pub(crate) fn after_remote_stopped(&mut self, fx: &mut Vec<Effect>) {
        let Some(mut chain) = self.chain.take() else {
            return;
        };

        match self.interstitial.clone() {
            None => {
                chain.stage = ChainStage::Settling;
                fx.push(Effect::Settle {
                    ticket: chain.ticket,
                    delay: self.cfg.settle_delay,
                });
            }
            Some(source) => {
                self.detach_interstitial(fx);
                let handle = self.alloc_handle();
                self.interstitial_handle = Some(handle);
                chain.stage = ChainStage::Interstitial(handle);
                fx.push(Effect::CreateAudio {
                    handle,
                    role: AudioRole::Interstitial,
                    source,
                    position: Duration::ZERO,
                });
            }
        }

        self.chain = Some(chain);
    }

    /// Natural end or start failure of the interstitial. Whichever arrives
    /// first detaches the handle, so the other finds nothing to continue.
    pub(crate) fn finish_interstitial(&mut self, handle: HandleId, now: Instant) -> Vec<Effect> {
        let waiting = self.awaiting(None, &ChainStage::Interstitial(handle));
        let mut fx = Vec::new();
        self.detach_interstitial(&mut fx);
        if waiting {
            fx.extend(self.continue_to_next(now));
        }
        fx
    }

    pub(crate) fn continue_to_next(&mut self, now: Instant) -> Vec<Effect> {
        let Some(chain) = self.chain.take() else {
            return Vec::new();
        };
        let fx = self.play_at(chain.next, now);
        if self.phase == Phase::Advancing {
            warn!(index = chain.next, "next clip could not start; stopping");
            self.phase = Phase::Paused;
        }
        fx
    }
}
