use std::path::PathBuf;

pub const HELP: &str = "commands: play N | pause | resume | next | prev | interstitial REF|none | load FILE | device | status | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Play(usize),
    Pause,
    Resume,
    Next,
    Prev,
    Interstitial(Option<String>),
    Load(PathBuf),
    Device,
    Status,
    Help,
    Quit,
}

/// Parses one line typed on stdin. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let cmd = match word.to_ascii_lowercase().as_str() {
        "play" | "p" => {
            let index = rest
                .parse::<usize>()
                .map_err(|_| format!("expected a track index, got {rest:?}"))?;
            ConsoleCommand::Play(index)
        }
        "pause" => ConsoleCommand::Pause,
        "resume" => ConsoleCommand::Resume,
        "next" | "n" => ConsoleCommand::Next,
        "prev" => ConsoleCommand::Prev,
        "interstitial" => match rest {
            "" => return Err("interstitial needs a source or `none`".to_string()),
            "none" | "off" => ConsoleCommand::Interstitial(None),
            source => ConsoleCommand::Interstitial(Some(source.to_string())),
        },
        "load" => {
            if rest.is_empty() {
                return Err("load needs a playlist file".to_string());
            }
            ConsoleCommand::Load(PathBuf::from(rest))
        }
        "device" => ConsoleCommand::Device,
        "status" | "s" => ConsoleCommand::Status,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" | "q" => ConsoleCommand::Quit,
        other => return Err(format!("unknown command {other:?}")),
    };
    Ok(Some(cmd))
}

#[cfg(test)]
mod tests {
    use super::{parse_command, ConsoleCommand};
    use std::path::PathBuf;

    #[test]
    fn parses_playback_commands() {
        assert_eq!(parse_command("play 3"), Ok(Some(ConsoleCommand::Play(3))));
        assert_eq!(parse_command("  PAUSE "), Ok(Some(ConsoleCommand::Pause)));
        assert_eq!(parse_command("n"), Ok(Some(ConsoleCommand::Next)));
        assert_eq!(parse_command("quit"), Ok(Some(ConsoleCommand::Quit)));
        assert_eq!(parse_command(""), Ok(None));
    }

    #[test]
    fn interstitial_accepts_source_or_none() {
        assert_eq!(
            parse_command("interstitial sounds/ding.mp3"),
            Ok(Some(ConsoleCommand::Interstitial(Some(
                "sounds/ding.mp3".to_string()
            ))))
        );
        assert_eq!(
            parse_command("interstitial none"),
            Ok(Some(ConsoleCommand::Interstitial(None)))
        );
        assert!(parse_command("interstitial").is_err());
    }

    #[test]
    fn load_keeps_paths_with_spaces() {
        assert_eq!(
            parse_command("load my lists/party.toml"),
            Ok(Some(ConsoleCommand::Load(PathBuf::from("my lists/party.toml"))))
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_command("play").is_err());
        assert!(parse_command("play -1").is_err());
        assert!(parse_command("rewind").is_err());
    }
}
