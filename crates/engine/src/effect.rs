use clipdeck_backends::HandleId;
use std::time::Duration;

/// Tags an asynchronous request with the list generation and session epoch
/// it was issued under. A completion carrying a ticket that no longer matches
/// is stale and gets dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub generation: u64,
    pub epoch: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioRole {
    Clip,
    Interstitial,
}

/// Side effects requested by the session. The runtime executes them in order
/// and reports completions back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    RemoteStart {
        ticket: Ticket,
        device: String,
        track_ref: String,
        offset: Duration,
    },
    RemotePause {
        ticket: Ticket,
        device: String,
    },
    /// Create a local element, seek it to `position` and play it.
    CreateAudio {
        handle: HandleId,
        role: AudioRole,
        source: String,
        position: Duration,
    },
    PauseAudio {
        handle: HandleId,
    },
    ReleaseAudio {
        handle: HandleId,
    },
    StartTicker {
        epoch: u64,
    },
    StopTicker,
    Settle {
        ticket: Ticket,
        delay: Duration,
    },
}
