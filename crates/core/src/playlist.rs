use crate::model::Track;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlaylistError {
    #[error("failed to read playlist: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse playlist: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("duplicate track id `{0}` in playlist")]
    DuplicateId(String),

    #[error("track at position {0} has an empty id")]
    EmptyId(usize),
}

#[derive(Debug, Deserialize)]
struct PlaylistFile {
    #[serde(default)]
    tracks: Vec<Track>,
}

/// Parses a playlist document: an ordered list of `[[tracks]]` tables.
///
/// Tracks without any playable reference are kept; the session skips them.
pub fn parse_playlist(text: &str) -> Result<Vec<Track>, PlaylistError> {
    let file: PlaylistFile = toml::from_str(text)?;

    let mut seen = HashSet::new();
    for (pos, track) in file.tracks.iter().enumerate() {
        if track.id.trim().is_empty() {
            return Err(PlaylistError::EmptyId(pos));
        }
        if !seen.insert(track.id.as_str()) {
            return Err(PlaylistError::DuplicateId(track.id.clone()));
        }
    }

    Ok(file.tracks)
}

pub fn load_playlist(path: &Path) -> Result<Vec<Track>, PlaylistError> {
    let text = std::fs::read_to_string(path)?;
    parse_playlist(&text)
}

#[cfg(test)]
mod tests {
    use super::{parse_playlist, PlaylistError};

    #[test]
    fn keeps_order_and_optional_refs() {
        let tracks = parse_playlist(
            r#"
[[tracks]]
id = "a"
title = "First"
artist = "One"
remote_ref = "spotify:track:a"

[[tracks]]
id = "b"
title = "Second"
artist = "Two"
album = "Album"
preview_ref = "https://p.example/b.mp3"

[[tracks]]
id = "c"
title = "Third"
artist = "Three"
"#,
        )
        .unwrap();

        let ids: Vec<_> = tracks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(tracks[1].album.as_deref(), Some("Album"));
        assert!(tracks[0].preview_ref.is_none());
        assert!(!tracks[2].is_playable());
    }

    #[test]
    fn rejects_duplicate_ids() {
        let err = parse_playlist(
            r#"
[[tracks]]
id = "a"
title = "x"
artist = "y"

[[tracks]]
id = "a"
title = "x"
artist = "y"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, PlaylistError::DuplicateId(id) if id == "a"));
    }

    #[test]
    fn empty_document_is_an_empty_list() {
        assert!(parse_playlist("").unwrap().is_empty());
    }
}
