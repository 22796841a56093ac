pub mod config;
pub mod model;
pub mod playlist;

pub use config::{AppConfig, ClipConfig, RemoteConfig, TimingConfig};
pub use model::{BackendKind, Capability, ClipWindow, ClipWindows, DeviceReadiness, Track};
pub use playlist::{load_playlist, parse_playlist, PlaylistError};
