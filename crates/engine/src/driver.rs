use crate::effect::{Effect, Ticket};
use crate::session::{PlaybackSession, SessionStatus};
use anyhow::{anyhow, Result};
use clipdeck_backends::{
    AudioElement, AudioNotification, AudioNotifier, AudioSignal, HandleId, LocalAudio,
    RemotePlayback,
};
use clipdeck_core::Track;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug)]
enum Command {
    PlayAt(usize),
    Pause,
    Resume,
    Next,
    Prev,
    SetInterstitial(Option<String>),
    LoadTracks(Vec<Track>),
    ResolveTrack {
        generation: u64,
        index: usize,
        track: Track,
    },
    Shutdown,
}

#[derive(Debug)]
enum Input {
    Command(Command),
    Tick { epoch: u64 },
    RemoteStarted { ticket: Ticket, result: Result<(), String> },
    RemotePaused { ticket: Ticket, result: Result<(), String> },
    Settled { ticket: Ticket },
}

enum RemoteJob {
    Start {
        ticket: Ticket,
        device: String,
        track_ref: String,
        offset: Duration,
    },
    Pause {
        ticket: Ticket,
        device: String,
    },
}

/// Cloneable front door to a running session.
#[derive(Clone)]
pub struct PlayerHandle {
    tx: mpsc::UnboundedSender<Input>,
    status: watch::Receiver<SessionStatus>,
}

impl PlayerHandle {
    pub fn play_at(&self, index: usize) -> Result<()> {
        self.send(Command::PlayAt(index))
    }

    pub fn pause(&self) -> Result<()> {
        self.send(Command::Pause)
    }

    pub fn resume(&self) -> Result<()> {
        self.send(Command::Resume)
    }

    pub fn next(&self) -> Result<()> {
        self.send(Command::Next)
    }

    pub fn prev(&self) -> Result<()> {
        self.send(Command::Prev)
    }

    pub fn set_interstitial(&self, selection: Option<String>) -> Result<()> {
        self.send(Command::SetInterstitial(selection))
    }

    pub fn load_tracks(&self, tracks: Vec<Track>) -> Result<()> {
        self.send(Command::LoadTracks(tracks))
    }

    /// Delivers late catalog detail fetched for list `generation`.
    pub fn resolve_track(&self, generation: u64, index: usize, track: Track) -> Result<()> {
        self.send(Command::ResolveTrack {
            generation,
            index,
            track,
        })
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown)
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    fn send(&self, cmd: Command) -> Result<()> {
        self.tx
            .send(Input::Command(cmd))
            .map_err(|_| anyhow!("session runtime has stopped"))
    }
}

/// Starts the session runtime on the current tokio runtime.
///
/// All session state lives in one task; remote calls run on a separate FIFO
/// worker so they reach the device in the order they were issued.
pub fn spawn_runtime(
    session: PlaybackSession,
    remote: Arc<dyn RemotePlayback>,
    audio: Arc<dyn LocalAudio>,
) -> (PlayerHandle, JoinHandle<()>) {
    let (tx, inputs) = mpsc::unbounded_channel();
    let (audio_tx, audio_rx) = mpsc::unbounded_channel();
    let (remote_tx, remote_rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = watch::channel(session.status());

    let worker = tokio::spawn(remote_worker(remote, remote_rx, tx.downgrade()));

    let runtime = SessionRuntime {
        tick_interval: session.cfg.tick_interval,
        session,
        audio,
        elements: HashMap::new(),
        tx: tx.downgrade(),
        inputs,
        audio_tx,
        audio_rx,
        remote_tx,
        remote_worker: worker,
        ticker: None,
        status_tx,
    };
    let task = tokio::spawn(runtime.run());

    (
        PlayerHandle {
            tx,
            status: status_rx,
        },
        task,
    )
}

struct SessionRuntime {
    session: PlaybackSession,
    audio: Arc<dyn LocalAudio>,
    elements: HashMap<HandleId, Box<dyn AudioElement>>,
    tx: mpsc::WeakUnboundedSender<Input>,
    inputs: mpsc::UnboundedReceiver<Input>,
    audio_tx: mpsc::UnboundedSender<AudioNotification>,
    audio_rx: mpsc::UnboundedReceiver<AudioNotification>,
    remote_tx: mpsc::UnboundedSender<RemoteJob>,
    remote_worker: JoinHandle<()>,
    ticker: Option<JoinHandle<()>>,
    tick_interval: Duration,
    status_tx: watch::Sender<SessionStatus>,
}

impl SessionRuntime {
    async fn run(mut self) {
        info!(audio = self.audio.name(), "session runtime started");
        loop {
            tokio::select! {
                input = self.inputs.recv() => match input {
                    Some(input) => {
                        if !self.handle_input(input) {
                            break;
                        }
                    }
                    None => {
                        debug!("every player handle dropped");
                        self.release_all();
                        break;
                    }
                },
                Some(note) = self.audio_rx.recv() => self.handle_audio(note),
            }
            self.publish();
        }

        self.stop_ticker();
        for (_, mut element) in self.elements.drain() {
            element.pause();
        }
        self.publish();

        // Queued remote calls, the final pause included, still reach the device.
        let SessionRuntime {
            remote_tx,
            remote_worker,
            ..
        } = self;
        drop(remote_tx);
        if let Err(err) = remote_worker.await {
            warn!(error = %err, "remote worker failed");
        }
        info!("session runtime stopped");
    }

    fn release_all(&mut self) {
        let effects = self.session.load_tracks(Vec::new());
        self.apply(effects);
    }

    fn handle_input(&mut self, input: Input) -> bool {
        let now = Instant::now();
        let effects = match input {
            Input::Command(cmd) => match cmd {
                Command::PlayAt(index) => self.session.play_at(index, now),
                Command::Pause => self.session.pause(now),
                Command::Resume => self.session.resume(now),
                Command::Next => self.session.next(now),
                Command::Prev => self.session.prev(now),
                Command::SetInterstitial(selection) => {
                    self.session.set_interstitial(selection);
                    Vec::new()
                }
                Command::LoadTracks(tracks) => self.session.load_tracks(tracks),
                Command::ResolveTrack {
                    generation,
                    index,
                    track,
                } => {
                    self.session.resolve_track(generation, index, track);
                    Vec::new()
                }
                Command::Shutdown => {
                    self.release_all();
                    return false;
                }
            },
            Input::Tick { epoch } => self.session.on_tick(epoch, now),
            Input::RemoteStarted { ticket, result } => self.session.on_remote_started(ticket, result),
            Input::RemotePaused { ticket, result } => self.session.on_remote_paused(ticket, result),
            Input::Settled { ticket } => self.session.on_settled(ticket, now),
        };
        self.apply(effects);
        true
    }

    fn handle_audio(&mut self, note: AudioNotification) {
        let now = Instant::now();
        let effects = match note.signal {
            AudioSignal::Ended => self.session.on_audio_ended(note.handle, now),
            AudioSignal::Failed(err) => self.session.on_audio_failed(note.handle, &err, now),
        };
        self.apply(effects);
    }

    /// Executes effects in order. Follow-ups produced synchronously (a local
    /// element refusing to play) run after the rest of the batch.
    fn apply(&mut self, effects: Vec<Effect>) {
        let mut queue: VecDeque<Effect> = effects.into();
        while let Some(effect) = queue.pop_front() {
            let follow_up = self.execute(effect);
            queue.extend(follow_up);
        }
    }

    fn execute(&mut self, effect: Effect) -> Vec<Effect> {
        match effect {
            Effect::RemoteStart {
                ticket,
                device,
                track_ref,
                offset,
            } => {
                self.enqueue_remote(RemoteJob::Start {
                    ticket,
                    device,
                    track_ref,
                    offset,
                });
                Vec::new()
            }
            Effect::RemotePause { ticket, device } => {
                self.enqueue_remote(RemoteJob::Pause { ticket, device });
                Vec::new()
            }
            Effect::CreateAudio {
                handle,
                role,
                source,
                position,
            } => {
                debug!(?handle, ?role, %source, "creating audio element");
                let notifier = AudioNotifier::new(handle, self.audio_tx.clone());
                match self.audio.create(&source, notifier) {
                    Ok(element) => {
                        self.elements.insert(handle, element);
                        self.start_element(handle, position)
                    }
                    Err(err) => {
                        self.session
                            .on_audio_failed(handle, &format!("{err:#}"), Instant::now())
                    }
                }
            }
            Effect::PauseAudio { handle } => {
                if let Some(element) = self.elements.get_mut(&handle) {
                    element.pause();
                    debug!(?handle, position_ms = element.position().as_millis() as u64, "audio paused");
                }
                Vec::new()
            }
            Effect::ReleaseAudio { handle } => {
                if let Some(mut element) = self.elements.remove(&handle) {
                    element.pause();
                }
                Vec::new()
            }
            Effect::StartTicker { epoch } => {
                self.stop_ticker();
                self.ticker = Some(spawn_ticker(epoch, self.tick_interval, self.tx.clone()));
                Vec::new()
            }
            Effect::StopTicker => {
                self.stop_ticker();
                Vec::new()
            }
            Effect::Settle { ticket, delay } => {
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Some(tx) = tx.upgrade() {
                        let _ = tx.send(Input::Settled { ticket });
                    }
                });
                Vec::new()
            }
        }
    }

    fn start_element(&mut self, handle: HandleId, position: Duration) -> Vec<Effect> {
        let Some(element) = self.elements.get_mut(&handle) else {
            return self
                .session
                .on_audio_failed(handle, "audio element is gone", Instant::now());
        };
        element.set_position(position);
        match element.play() {
            Ok(()) => {
                self.session.on_audio_started(handle);
                Vec::new()
            }
            Err(err) => {
                self.session
                    .on_audio_failed(handle, &format!("{err:#}"), Instant::now())
            }
        }
    }

    fn enqueue_remote(&self, job: RemoteJob) {
        if self.remote_tx.send(job).is_err() {
            warn!("remote worker is gone; dropping remote call");
        }
    }

    fn stop_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }

    fn publish(&self) {
        let status = self.session.status();
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

fn spawn_ticker(
    epoch: u64,
    period: Duration,
    tx: mpsc::WeakUnboundedSender<Input>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let Some(tx) = tx.upgrade() else {
                break;
            };
            if tx.send(Input::Tick { epoch }).is_err() {
                break;
            }
        }
    })
}

async fn remote_worker(
    remote: Arc<dyn RemotePlayback>,
    mut jobs: mpsc::UnboundedReceiver<RemoteJob>,
    tx: mpsc::WeakUnboundedSender<Input>,
) {
    while let Some(job) = jobs.recv().await {
        let input = match job {
            RemoteJob::Start {
                ticket,
                device,
                track_ref,
                offset,
            } => {
                debug!(remote = remote.name(), %device, %track_ref, offset_ms = offset.as_millis() as u64, "remote start");
                let result = remote
                    .start(&device, &track_ref, offset)
                    .await
                    .map_err(|err| format!("{err:#}"));
                Input::RemoteStarted { ticket, result }
            }
            RemoteJob::Pause { ticket, device } => {
                debug!(remote = remote.name(), %device, "remote pause");
                let result = remote
                    .pause(&device)
                    .await
                    .map_err(|err| format!("{err:#}"));
                Input::RemotePaused { ticket, result }
            }
        };
        // Completions after the session is gone have nobody to report to,
        // but the remaining calls still run.
        if let Some(tx) = tx.upgrade() {
            let _ = tx.send(input);
        }
    }
}
