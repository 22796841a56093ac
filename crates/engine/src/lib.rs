use clipdeck_core::{AppConfig, ClipWindows};
use std::time::Duration;

mod clock;
mod driver;
mod effect;
mod selector;
mod sequencer;
mod session;

pub use clock::ClipClock;
pub use driver::{spawn_runtime, PlayerHandle};
pub use effect::{AudioRole, Effect, Ticket};
pub use selector::select_backend;
pub use sequencer::next_playable_index;
pub use session::{Phase, PlaybackSession, SessionStatus, Trigger};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub windows: ClipWindows,
    pub tick_interval: Duration,
    pub settle_delay: Duration,
}

impl EngineConfig {
    pub fn from_app_config(cfg: &AppConfig) -> Self {
        Self {
            windows: cfg.clips.windows(),
            tick_interval: Duration::from_millis(cfg.timing.tick_interval_ms.max(10)),
            settle_delay: Duration::from_millis(cfg.timing.settle_delay_ms),
        }
    }
}
