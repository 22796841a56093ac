use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Remote device playback of the full track, seekable to any offset.
    Full,
    /// Local playback of a short pre-rendered preview.
    Preview,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Capability {
    Full,
    Preview,
    Unplayable,
}

impl Capability {
    pub fn backend(self) -> Option<BackendKind> {
        match self {
            Capability::Full => Some(BackendKind::Full),
            Capability::Preview => Some(BackendKind::Preview),
            Capability::Unplayable => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub remote_ref: Option<String>,
    #[serde(default)]
    pub preview_ref: Option<String>,
}

impl Track {
    /// A track with neither reference can never be selected by a backend.
    pub fn is_playable(&self) -> bool {
        self.remote_ref.is_some() || self.preview_ref.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipWindow {
    pub start_offset: Duration,
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipWindows {
    pub full: ClipWindow,
    pub preview: ClipWindow,
}

impl ClipWindows {
    pub fn for_backend(&self, kind: BackendKind) -> ClipWindow {
        match kind {
            BackendKind::Full => self.full,
            BackendKind::Preview => self.preview,
        }
    }
}

/// Readiness of the remote playback device. Flips to ready only after the
/// external device handshake has completed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceReadiness {
    pub ready: bool,
    pub device_ref: Option<String>,
}

impl DeviceReadiness {
    pub fn ready(device_ref: impl Into<String>) -> Self {
        Self {
            ready: true,
            device_ref: Some(device_ref.into()),
        }
    }

    pub fn not_ready() -> Self {
        Self::default()
    }

    /// The device reference, only while the device is usable.
    pub fn usable_device(&self) -> Option<&str> {
        if self.ready {
            self.device_ref.as_deref()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BackendKind, Capability, DeviceReadiness, Track};

    fn track(remote: Option<&str>, preview: Option<&str>) -> Track {
        Track {
            id: "t".to_string(),
            title: "Title".to_string(),
            artist: "Artist".to_string(),
            album: None,
            remote_ref: remote.map(str::to_string),
            preview_ref: preview.map(str::to_string),
        }
    }

    #[test]
    fn playable_needs_one_reference() {
        assert!(track(Some("remote:1"), None).is_playable());
        assert!(track(None, Some("https://p/1.mp3")).is_playable());
        assert!(!track(None, None).is_playable());
    }

    #[test]
    fn readiness_hides_device_until_ready() {
        let pending = DeviceReadiness {
            ready: false,
            device_ref: Some("dev".to_string()),
        };
        assert_eq!(pending.usable_device(), None);
        assert_eq!(DeviceReadiness::ready("dev").usable_device(), Some("dev"));
    }

    #[test]
    fn capability_maps_to_backend() {
        assert_eq!(Capability::Full.backend(), Some(BackendKind::Full));
        assert_eq!(Capability::Unplayable.backend(), None);
    }
}
