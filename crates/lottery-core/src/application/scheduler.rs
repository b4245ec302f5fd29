//! Round Scheduler
//!
//! A single task owns every timer of the live round: the countdown ticker
//! while a round is active and the grace deadline after a winner is drawn.
//! The service notifies it over a channel; all timer callbacks carry the
//! round id they were armed for, so a timer that outlives its round is inert.

use crate::application::service::{RoundService, ServiceDeps, TickOutcome};
use crate::config::LotteryConfig;
use crate::domain::round::RoundId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

/// Notifications from the service to the scheduler
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerCommand {
    /// The first participant of this round was admitted
    CountdownStarted(RoundId),
    /// A fresh round replaced the live one
    RoundReset(RoundId),
}

/// Sending half held by the service.
///
/// Sends never fail loudly: without a running scheduler the round simply
/// never advances on its own.
#[derive(Clone, Debug)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<SchedulerCommand>,
}

impl SchedulerHandle {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SchedulerCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// A handle with no scheduler behind it.
    pub fn detached() -> Self {
        Self::channel().0
    }

    pub fn countdown_started(&self, round_id: RoundId) {
        self.send(SchedulerCommand::CountdownStarted(round_id));
    }

    pub fn round_reset(&self, round_id: RoundId) {
        self.send(SchedulerCommand::RoundReset(round_id));
    }

    fn send(&self, command: SchedulerCommand) {
        if self.tx.send(command).is_err() {
            debug!(?command, "Scheduler not running, command dropped");
        }
    }
}

enum Timer {
    Idle,
    Countdown { round_id: RoundId, ticker: Interval },
    Grace { round_id: RoundId, deadline: Instant },
}

enum Event {
    Command(Option<SchedulerCommand>),
    Tick,
    GraceElapsed,
}

pub struct RoundScheduler {
    service: Arc<RoundService>,
    commands: mpsc::UnboundedReceiver<SchedulerCommand>,
    tick_interval: Duration,
    grace_period: Duration,
}

impl RoundScheduler {
    pub fn new(service: Arc<RoundService>, commands: mpsc::UnboundedReceiver<SchedulerCommand>) -> Self {
        let tick_interval = service.config().tick_interval;
        let grace_period = service.config().grace_period;
        Self {
            service,
            commands,
            tick_interval,
            grace_period,
        }
    }

    /// Build a service with its scheduler and spawn the scheduler task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn launch(config: LotteryConfig, deps: ServiceDeps) -> (Arc<RoundService>, JoinHandle<()>) {
        let (handle, commands) = SchedulerHandle::channel();
        let service = Arc::new(RoundService::new(config, deps, handle));
        let task = tokio::spawn(Self::new(service.clone(), commands).run());
        (service, task)
    }

    /// Drive timers until the command channel closes or the task is aborted.
    pub async fn run(mut self) {
        let mut timer = Timer::Idle;

        loop {
            let event = match &mut timer {
                Timer::Idle => Event::Command(self.commands.recv().await),
                Timer::Countdown { ticker, .. } => tokio::select! {
                    command = self.commands.recv() => Event::Command(command),
                    _ = ticker.tick() => Event::Tick,
                },
                Timer::Grace { deadline, .. } => tokio::select! {
                    command = self.commands.recv() => Event::Command(command),
                    _ = time::sleep_until(*deadline) => Event::GraceElapsed,
                },
            };

            timer = match (event, timer) {
                (Event::Command(None), _) => break,
                (Event::Command(Some(command)), current) => self.apply(command, current),
                (Event::Tick, Timer::Countdown { round_id, ticker }) => {
                    self.on_tick(round_id, ticker).await
                }
                (Event::GraceElapsed, Timer::Grace { round_id, .. }) => {
                    self.service.reset_round(Some(round_id));
                    Timer::Idle
                }
                (_, current) => current,
            };
        }

        debug!("Round scheduler stopped");
    }

    fn apply(&self, command: SchedulerCommand, current: Timer) -> Timer {
        match command {
            SchedulerCommand::CountdownStarted(round_id) => {
                if let Timer::Countdown { round_id: armed, .. } = &current {
                    if *armed == round_id {
                        return current;
                    }
                }
                debug!(round_id, "Countdown ticker armed");
                let mut ticker = time::interval_at(Instant::now() + self.tick_interval, self.tick_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                Timer::Countdown { round_id, ticker }
            }
            SchedulerCommand::RoundReset(round_id) => {
                debug!(round_id, "Timers cancelled for new round");
                Timer::Idle
            }
        }
    }

    async fn on_tick(&self, round_id: RoundId, ticker: Interval) -> Timer {
        match self.service.tick(round_id) {
            TickOutcome::Running(_) => Timer::Countdown { round_id, ticker },
            TickOutcome::Stale => Timer::Idle,
            TickOutcome::Expired => match self.service.finish_round(round_id).await {
                Some(winner) => {
                    info!(
                        round_id,
                        winner = %winner,
                        grace_ms = self.grace_period.as_millis() as u64,
                        "Round ended, reset scheduled"
                    );
                    Timer::Grace {
                        round_id,
                        deadline: Instant::now() + self.grace_period,
                    }
                }
                None => {
                    self.service.reset_round(Some(round_id));
                    Timer::Idle
                }
            },
        }
    }
}
