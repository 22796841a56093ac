use clipdeck_core::{Capability, DeviceReadiness, Track};

/// Picks the playback backend for `track` given the current device state.
/// Full playback wins whenever both are possible.
pub fn select_backend(track: &Track, device: &DeviceReadiness) -> Capability {
    if track.remote_ref.is_some() && device.usable_device().is_some() {
        Capability::Full
    } else if track.preview_ref.is_some() {
        Capability::Preview
    } else {
        Capability::Unplayable
    }
}

#[cfg(test)]
mod tests {
    use super::select_backend;
    use clipdeck_core::{Capability, DeviceReadiness, Track};

    fn track(remote: bool, preview: bool) -> Track {
        Track {
            id: "1".to_string(),
            title: "Title".to_string(),
            artist: "Artist".to_string(),
            album: None,
            remote_ref: remote.then(|| "spotify:track:1".to_string()),
            preview_ref: preview.then(|| "https://p.example/1.mp3".to_string()),
        }
    }

    #[test]
    fn prefers_full_when_device_ready() {
        let ready = DeviceReadiness::ready("dev");
        assert_eq!(select_backend(&track(true, true), &ready), Capability::Full);
        assert_eq!(select_backend(&track(true, false), &ready), Capability::Full);
        assert_eq!(select_backend(&track(false, true), &ready), Capability::Preview);
    }

    #[test]
    fn falls_back_to_preview_without_device() {
        let idle = DeviceReadiness::not_ready();
        assert_eq!(select_backend(&track(true, true), &idle), Capability::Preview);
        assert_eq!(select_backend(&track(true, false), &idle), Capability::Unplayable);
        assert_eq!(select_backend(&track(false, false), &idle), Capability::Unplayable);
    }
}
