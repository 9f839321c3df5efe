use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::error::{IntervalError, Result};
use crate::import::WorkoutSource;

use super::clock::{Clock, SystemClock};
use super::engine::{PlaybackEngine, PlaybackSnapshot, ReadingSource};
use super::PlaybackConfig;

const COMMAND_BUFFER: usize = 32;

/// Requests accepted by a running session
pub enum SessionCommand {
    Load(Box<dyn WorkoutSource>),
    Start,
    Pause,
    Skip,
    Restart,
    Finish,
    /// Host came back from suspension
    Foreground,
    SetAverageSource(ReadingSource),
    Shutdown,
}

impl std::fmt::Debug for SessionCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionCommand::Load(_) => "Load",
            SessionCommand::Start => "Start",
            SessionCommand::Pause => "Pause",
            SessionCommand::Skip => "Skip",
            SessionCommand::Restart => "Restart",
            SessionCommand::Finish => "Finish",
            SessionCommand::Foreground => "Foreground",
            SessionCommand::SetAverageSource(_) => "SetAverageSource",
            SessionCommand::Shutdown => "Shutdown",
        };
        f.write_str(name)
    }
}

/// Cloneable sender side of a session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub async fn send(&self, command: SessionCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|e| IntervalError::Session(format!("session has stopped, dropped {:?}", e.0)))
    }

    pub async fn load(&self, source: impl WorkoutSource + 'static) -> Result<()> {
        self.send(SessionCommand::Load(Box::new(source))).await
    }

    pub async fn start(&self) -> Result<()> {
        self.send(SessionCommand::Start).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.send(SessionCommand::Pause).await
    }

    pub async fn skip(&self) -> Result<()> {
        self.send(SessionCommand::Skip).await
    }

    pub async fn restart(&self) -> Result<()> {
        self.send(SessionCommand::Restart).await
    }

    pub async fn finish(&self) -> Result<()> {
        self.send(SessionCommand::Finish).await
    }

    pub async fn foreground(&self) -> Result<()> {
        self.send(SessionCommand::Foreground).await
    }

    pub async fn set_average_source(&self, source: ReadingSource) -> Result<()> {
        self.send(SessionCommand::SetAverageSource(source)).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(SessionCommand::Shutdown).await
    }
}

enum Event {
    Command(Option<SessionCommand>),
    Tick,
    Sample,
}

/// Owns a [`PlaybackEngine`] and serializes commands and both timers onto
/// a single task. Timers exist only while the engine is running.
pub struct SessionRunner<C: Clock = SystemClock> {
    engine: PlaybackEngine<C>,
    commands: mpsc::Receiver<SessionCommand>,
    snapshots: watch::Sender<PlaybackSnapshot>,
    tick_period: Duration,
    average_period: Duration,
    tick_timer: Option<Interval>,
    average_timer: Option<Interval>,
}

impl<C: Clock> SessionRunner<C> {
    pub fn new(
        engine: PlaybackEngine<C>,
        config: &PlaybackConfig,
    ) -> (Self, SessionHandle, watch::Receiver<PlaybackSnapshot>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (snapshot_tx, snapshot_rx) = watch::channel(engine.snapshot());

        let runner = Self {
            engine,
            commands: command_rx,
            snapshots: snapshot_tx,
            tick_period: Duration::from_millis(config.tick_interval_ms.max(1)),
            average_period: Duration::from_millis(config.average_interval_ms.max(1)),
            tick_timer: None,
            average_timer: None,
        };
        (runner, SessionHandle { commands: command_tx }, snapshot_rx)
    }

    pub async fn run(mut self) {
        debug!("Session runner started");
        loop {
            let event = tokio::select! {
                command = self.commands.recv() => Event::Command(command),
                _ = next_tick(&mut self.tick_timer) => Event::Tick,
                _ = next_tick(&mut self.average_timer) => Event::Sample,
            };

            match event {
                Event::Command(None) | Event::Command(Some(SessionCommand::Shutdown)) => break,
                Event::Command(Some(command)) => self.handle(command),
                Event::Tick => self.engine.tick(),
                Event::Sample => self.engine.sample_average(),
            }

            self.sync_timers();
            self.publish();
        }

        self.stop_timers();
        info!("Session runner stopped");
    }

    fn handle(&mut self, command: SessionCommand) {
        debug!(?command, "Session command");
        match command {
            SessionCommand::Load(source) => {
                self.stop_timers();
                if let Err(e) = self.engine.load(&*source) {
                    debug!(error = %e, "Load rejected, keeping current session");
                }
            }
            SessionCommand::Start => self.engine.start(),
            SessionCommand::Pause => self.engine.pause(),
            SessionCommand::Skip => self.engine.skip_interval(),
            SessionCommand::Restart => {
                self.stop_timers();
                self.engine.restart();
            }
            SessionCommand::Finish => {
                self.stop_timers();
                self.engine.finish();
            }
            SessionCommand::Foreground => self.engine.reconcile_after_suspension(),
            SessionCommand::SetAverageSource(source) => self.engine.set_average_source(source),
            SessionCommand::Shutdown => {}
        }
    }

    /// Create timers on entering Running and drop them on leaving it.
    /// Calling this repeatedly never stacks timers.
    fn sync_timers(&mut self) {
        if !self.engine.is_running() {
            self.stop_timers();
            return;
        }
        if self.tick_timer.is_none() {
            self.tick_timer = Some(periodic(self.tick_period));
        }
        if self.average_timer.is_none() {
            self.average_timer = Some(periodic(self.average_period));
        }
    }

    fn stop_timers(&mut self) {
        self.tick_timer = None;
        self.average_timer = None;
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.engine.snapshot());
    }
}

fn periodic(period: Duration) -> Interval {
    let mut timer = interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    timer
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Run an engine on its own task. Must be called inside a tokio runtime.
pub fn spawn<C: Clock>(
    engine: PlaybackEngine<C>,
    config: &PlaybackConfig,
) -> (SessionHandle, watch::Receiver<PlaybackSnapshot>, JoinHandle<()>) {
    let (runner, handle, snapshots) = SessionRunner::new(engine, config);
    let task = tokio::spawn(runner.run());
    (handle, snapshots, task)
}
