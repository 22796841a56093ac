use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clipdeck_backends::{NullRemote, RemotePlayback, TimedAudio};
use clipdeck_core::{load_playlist, AppConfig, Capability, DeviceReadiness, Track};
use clipdeck_engine::{
    select_backend, spawn_runtime, EngineConfig, Phase, PlaybackSession, PlayerHandle,
    SessionStatus,
};
use clipdeck_remote::WebPlaybackClient;
use console::{parse_command, ConsoleCommand, HELP};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

mod console;

#[derive(Parser, Debug)]
#[command(name = "clipdeck", about = "Plays a playlist as a run of short clips")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Run(RunArgs),
    Doctor,
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args, Debug, Default)]
struct RunArgs {
    /// Playlist file; overrides `playlist` from the config.
    #[arg(long)]
    playlist: Option<PathBuf>,

    /// Audio played between clips; overrides `interstitial` from the config.
    #[arg(long)]
    interstitial: Option<String>,

    /// Index of the first clip.
    #[arg(long, default_value_t = 0)]
    start: usize,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cmd = cli.command.unwrap_or(Commands::Run(RunArgs::default()));
    let cfg_path = cli.config.unwrap_or_else(default_config_path);

    match cmd {
        Commands::Config {
            action: ConfigAction::Init,
        } => {
            init_config(&cfg_path)?;
            println!("Initialized config at {}", cfg_path.display());
            Ok(())
        }
        Commands::Doctor => {
            let cfg = load_or_default(&cfg_path)?;
            init_logging(&cfg.log_level);
            doctor(&cfg, &cfg_path).await
        }
        Commands::Run(args) => {
            let cfg = load_or_default(&cfg_path)?;
            init_logging(&cfg.log_level);
            run(cfg, cfg_path, args).await
        }
    }
}

async fn run(mut cfg: AppConfig, cfg_path: PathBuf, args: RunArgs) -> Result<()> {
    let client = build_client(&cfg)?;
    let remote: Arc<dyn RemotePlayback> = match &client {
        Some(client) => {
            info!(api_base = client.api_base(), "full-track playback enabled");
            Arc::clone(client) as Arc<dyn RemotePlayback>
        }
        None => {
            info!("no access token configured; full-track playback disabled");
            Arc::new(NullRemote)
        }
    };
    let audio = Arc::new(TimedAudio::new(Duration::from_millis(cfg.preview_length_ms)));

    let (device_tx, device_rx) = watch::channel(DeviceReadiness::not_ready());
    refresh_device(client.as_deref(), &cfg, &device_tx).await;

    let session = PlaybackSession::new(EngineConfig::from_app_config(&cfg), device_rx);
    let (player, runtime) = spawn_runtime(session, remote, audio);
    info!(remote = client.is_some(), "clipdeck started");

    let mut interstitial = args.interstitial.clone().or_else(|| cfg.interstitial.clone());
    player.set_interstitial(interstitial.clone())?;

    let mut playlist_path = args.playlist.clone().or_else(|| cfg.playlist.clone());
    let mut tracks = Vec::new();
    match &playlist_path {
        Some(path) => {
            tracks = load_tracks(&player, path)?;
            if !tracks.is_empty() {
                player.play_at(args.start)?;
            }
        }
        None => println!("No playlist configured; use `load FILE`."),
    }
    println!("{HELP}");

    let (reload_tx, mut reload_rx) = mpsc::channel::<()>(4);
    spawn_reload_watchers(
        cfg_path.clone(),
        cfg.timing.config_watch_poll_ms,
        reload_tx,
    )
    .await?;

    let mut status_rx = player.subscribe();
    let mut shown = Shown::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        debug!("stdin closed; waiting for ctrl-c");
                        stdin_open = false;
                        continue;
                    }
                    Err(err) => {
                        warn!(error=%err, "failed to read stdin");
                        stdin_open = false;
                        continue;
                    }
                };
                let cmd = match parse_command(&line) {
                    Ok(Some(cmd)) => cmd,
                    Ok(None) => continue,
                    Err(msg) => {
                        println!("{msg}");
                        continue;
                    }
                };
                match cmd {
                    ConsoleCommand::Play(index) => player.play_at(index)?,
                    ConsoleCommand::Pause => player.pause()?,
                    ConsoleCommand::Resume => player.resume()?,
                    ConsoleCommand::Next => player.next()?,
                    ConsoleCommand::Prev => player.prev()?,
                    ConsoleCommand::Interstitial(selection) => {
                        interstitial = selection;
                        player.set_interstitial(interstitial.clone())?;
                    }
                    ConsoleCommand::Load(path) => match load_tracks(&player, &path) {
                        Ok(loaded) => {
                            tracks = loaded;
                            playlist_path = Some(path);
                        }
                        Err(err) => println!("{err:#}"),
                    },
                    ConsoleCommand::Device => {
                        refresh_device(client.as_deref(), &cfg, &device_tx).await;
                        let readiness = device_tx.borrow().clone();
                        println!("device: {}", describe_device(&readiness));
                    }
                    ConsoleCommand::Status => print_status(&player.status(), &tracks),
                    ConsoleCommand::Help => println!("{HELP}"),
                    ConsoleCommand::Quit => break,
                }
            }
            changed = status_rx.changed() => {
                if changed.is_err() {
                    warn!("session runtime ended unexpectedly");
                    break;
                }
                let status = status_rx.borrow_and_update().clone();
                shown.report(&status, &tracks);
            }
            msg = reload_rx.recv() => {
                if msg.is_some() {
                    match load_or_default(&cfg_path) {
                        Ok(new_cfg) => {
                            if new_cfg.interstitial != cfg.interstitial {
                                interstitial = new_cfg.interstitial.clone();
                                player.set_interstitial(interstitial.clone())?;
                            }
                            let changed_playlist = new_cfg
                                .playlist
                                .clone()
                                .filter(|p| cfg.playlist.as_ref() != Some(p));
                            if let Some(path) = changed_playlist {
                                match load_tracks(&player, &path) {
                                    Ok(loaded) => {
                                        tracks = loaded;
                                        playlist_path = Some(path);
                                    }
                                    Err(err) => error!(error=%format!("{err:#}"), "failed to load playlist"),
                                }
                            }
                            cfg = new_cfg;
                            info!(?playlist_path, ?interstitial, "configuration reloaded");
                        }
                        Err(err) => {
                            error!(error=%err, "failed to reload config");
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received ctrl-c; shutting down");
                break;
            }
        }
    }

    player.shutdown()?;
    if let Err(err) = runtime.await {
        error!(error=%err, "session runtime panicked");
    }
    Ok(())
}

fn build_client(cfg: &AppConfig) -> Result<Option<Arc<WebPlaybackClient>>> {
    let Some(token) = cfg.remote.access_token.as_deref().filter(|t| !t.trim().is_empty()) else {
        return Ok(None);
    };
    let client = WebPlaybackClient::builder()
        .api_base(cfg.remote.api_base_url.clone())
        .access_token(token)
        .timeout(Duration::from_millis(cfg.remote.request_timeout_ms))
        .build()
        .context("failed to build playback client")?;
    Ok(Some(Arc::new(client)))
}

/// Marks the configured device ready only when the account lists it.
async fn refresh_device(
    client: Option<&WebPlaybackClient>,
    cfg: &AppConfig,
    device_tx: &watch::Sender<DeviceReadiness>,
) {
    let readiness = check_readiness(client, cfg).await;
    device_tx.send_replace(readiness);
}

async fn check_readiness(client: Option<&WebPlaybackClient>, cfg: &AppConfig) -> DeviceReadiness {
    let (Some(client), Some(device_id)) = (client, cfg.remote.device_id.as_deref()) else {
        return DeviceReadiness::not_ready();
    };
    match client.check_device(device_id).await {
        Ok(true) => {
            info!(device_id, "playback device available");
            DeviceReadiness::ready(device_id)
        }
        Ok(false) => {
            warn!(device_id, "configured device is not listed for this account");
            DeviceReadiness::not_ready()
        }
        Err(err) => {
            warn!(error=%err, "device check failed");
            DeviceReadiness::not_ready()
        }
    }
}

fn load_tracks(player: &PlayerHandle, path: &Path) -> Result<Vec<Track>> {
    let tracks = load_playlist(path)
        .with_context(|| format!("failed to load playlist {}", path.display()))?;
    info!(path = %path.display(), tracks = tracks.len(), "playlist loaded");
    player.load_tracks(tracks.clone())?;
    Ok(tracks)
}

/// What was last printed, so only new clips and pauses reach stdout.
#[derive(Default)]
struct Shown {
    clip: Option<(u64, Option<usize>, u64)>,
    phase: Phase,
}

impl Shown {
    fn report(&mut self, status: &SessionStatus, tracks: &[Track]) {
        if status.phase.is_playing() {
            let clip = (status.generation, status.current_index, status.play_count);
            if self.clip != Some(clip) {
                self.clip = Some(clip);
                if let Some(line) = now_playing(status, tracks) {
                    println!("{line}");
                }
            }
        } else if status.phase != self.phase {
            debug!(phase = ?status.phase, "phase changed");
            if status.phase == Phase::Paused {
                println!("paused at {}", format_duration(status.elapsed));
            }
        }
        self.phase = status.phase;
    }
}

fn now_playing(status: &SessionStatus, tracks: &[Track]) -> Option<String> {
    let index = status.current_index?;
    let track = tracks.get(index)?;
    let backend = status
        .backend
        .map(|b| format!("{b:?}"))
        .unwrap_or_else(|| "?".to_string());
    Some(format!(
        "> [{index}] {} - {} ({backend}, {})",
        track.artist,
        track.title,
        format_duration(status.total)
    ))
}

fn print_status(status: &SessionStatus, tracks: &[Track]) {
    println!("phase: {:?}", status.phase);
    match status.current_index.and_then(|i| tracks.get(i).map(|t| (i, t))) {
        Some((index, track)) => {
            println!("track: [{index}] {} - {}", track.artist, track.title);
            if let Some(album) = &track.album {
                println!("album: {album}");
            }
        }
        None => println!("track: <none>"),
    }
    if let Some(backend) = status.backend {
        println!("backend: {backend:?}");
    }
    println!(
        "elapsed: {} / {} ({:.0}%)",
        format_duration(status.elapsed),
        format_duration(status.total),
        status.progress() * 100.0
    );
    println!("clips played: {}", status.play_count);
    println!(
        "interstitial: {}",
        status.interstitial.as_deref().unwrap_or("<none>")
    );
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}:{:02}.{}", secs / 60, secs % 60, d.subsec_millis() / 100)
}

fn describe_device(readiness: &DeviceReadiness) -> String {
    match readiness.usable_device() {
        Some(device) => format!("ready ({device})"),
        None => "not ready".to_string(),
    }
}

async fn doctor(cfg: &AppConfig, cfg_path: &Path) -> Result<()> {
    println!("== clipdeck doctor ==");
    println!(
        "Config file: {} ({})",
        cfg_path.display(),
        if cfg_path.exists() { "found" } else { "defaults" }
    );
    let client = build_client(cfg)?;
    println!(
        "Playback API: {}",
        client
            .as_ref()
            .map_or(cfg.remote.api_base_url.as_str(), |c| c.api_base())
    );
    println!(
        "Access token: {}",
        if client.is_some() { "present" } else { "missing" }
    );
    println!(
        "Device id: {}",
        cfg.remote.device_id.as_deref().unwrap_or("<not set>")
    );

    let readiness = check_readiness(client.as_deref(), cfg).await;
    println!("Device: {}", describe_device(&readiness));

    match &cfg.playlist {
        Some(path) => match load_playlist(path) {
            Ok(tracks) => {
                let counts = capability_counts(&tracks, &readiness);
                println!("Playlist: {} ({} tracks)", path.display(), tracks.len());
                println!(
                    "  full: {}, preview: {}, unplayable: {}",
                    counts.full, counts.preview, counts.unplayable
                );
            }
            Err(err) => println!("Playlist error: {err}"),
        },
        None => println!("Playlist: <not set>"),
    }

    match &cfg.interstitial {
        Some(source) => println!("Interstitial: {source}"),
        None => println!("Interstitial: <none>"),
    }

    Ok(())
}

#[derive(Debug, Default, PartialEq, Eq)]
struct CapabilityCounts {
    full: usize,
    preview: usize,
    unplayable: usize,
}

fn capability_counts(tracks: &[Track], readiness: &DeviceReadiness) -> CapabilityCounts {
    let mut counts = CapabilityCounts::default();
    for track in tracks {
        match select_backend(track, readiness) {
            Capability::Full => counts.full += 1,
            Capability::Preview => counts.preview += 1,
            Capability::Unplayable => counts.unplayable += 1,
        }
    }
    counts
}

fn default_config_path() -> PathBuf {
    let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("clipdeck").join("config.toml")
}

fn init_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    let cfg = AppConfig::default();
    let toml = toml::to_string_pretty(&cfg)?;
    std::fs::write(path, toml)
        .with_context(|| format!("failed to write config file {}", path.display()))?;
    Ok(())
}

fn load_or_default(path: &Path) -> Result<AppConfig> {
    let mut cfg = if !path.exists() {
        AppConfig::default()
    } else {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&data).with_context(|| format!("failed to parse {}", path.display()))?
    };
    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());
    Ok(cfg)
}

fn init_logging(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn spawn_reload_watchers(path: PathBuf, poll_ms: u64, tx: mpsc::Sender<()>) -> Result<()> {
    let tx_poll = tx.clone();
    tokio::spawn(async move {
        let mut known_mtime = file_mtime(&path);
        let sleep = Duration::from_millis(poll_ms.max(2_000));
        loop {
            tokio::time::sleep(sleep).await;
            let current = file_mtime(&path);
            if current.is_some() && current != known_mtime {
                known_mtime = current;
                let _ = tx_poll.send(()).await;
            }
        }
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let tx_hup = tx.clone();
        tokio::spawn(async move {
            if let Ok(mut sig) = signal(SignalKind::hangup()) {
                while sig.recv().await.is_some() {
                    let _ = tx_hup.send(()).await;
                }
            }
        });
    }

    Ok(())
}

fn file_mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).ok()?.modified().ok()
}

fn apply_env_overrides(cfg: &mut AppConfig, var: impl Fn(&str) -> Option<String>) {
    let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = non_empty("CLIPDECK_LOG_LEVEL") {
        cfg.log_level = v;
    }
    if let Some(v) = non_empty("CLIPDECK_ACCESS_TOKEN") {
        cfg.remote.access_token = Some(v);
    }
    if let Some(v) = non_empty("CLIPDECK_DEVICE_ID") {
        cfg.remote.device_id = Some(v);
    }
    if let Some(v) = non_empty("CLIPDECK_API_BASE") {
        cfg.remote.api_base_url = v;
    }
}

#[cfg(test)]
mod tests {
    use super::{apply_env_overrides, capability_counts, format_duration, CapabilityCounts};
    use clipdeck_core::{AppConfig, DeviceReadiness, Track};
    use std::collections::HashMap;
    use std::time::Duration;

    #[test]
    fn env_overrides_replace_non_empty_values() {
        let vars: HashMap<&str, &str> = [
            ("CLIPDECK_LOG_LEVEL", "debug"),
            ("CLIPDECK_ACCESS_TOKEN", "tok"),
            ("CLIPDECK_DEVICE_ID", "  "),
        ]
        .into_iter()
        .collect();

        let mut cfg = AppConfig::default();
        cfg.remote.device_id = Some("desk".to_string());
        apply_env_overrides(&mut cfg, |key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.remote.access_token.as_deref(), Some("tok"));
        assert_eq!(cfg.remote.device_id.as_deref(), Some("desk"));
        assert_eq!(cfg.remote.api_base_url, "https://api.spotify.com/v1");
    }

    #[test]
    fn counts_follow_device_readiness() {
        let track = |id: &str, remote: bool, preview: bool| Track {
            id: id.to_string(),
            title: id.to_string(),
            artist: "Artist".to_string(),
            album: None,
            remote_ref: remote.then(|| format!("spotify:track:{id}")),
            preview_ref: preview.then(|| format!("https://p.example/{id}.mp3")),
        };
        let tracks = vec![
            track("a", true, true),
            track("b", true, false),
            track("c", false, true),
            track("d", false, false),
        ];

        assert_eq!(
            capability_counts(&tracks, &DeviceReadiness::ready("dev")),
            CapabilityCounts {
                full: 2,
                preview: 1,
                unplayable: 1
            }
        );
        assert_eq!(
            capability_counts(&tracks, &DeviceReadiness::not_ready()),
            CapabilityCounts {
                full: 0,
                preview: 2,
                unplayable: 2
            }
        );
    }

    #[test]
    fn durations_render_as_minutes_and_tenths() {
        assert_eq!(format_duration(Duration::from_millis(75_340)), "1:15.3");
        assert_eq!(format_duration(Duration::ZERO), "0:00.0");
    }
}
