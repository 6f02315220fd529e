//! Tick loop
//!
//! Drives an [`EngineContext`] from a tokio interval until every instance
//! has finished or shutdown is requested.

use al_config::ProjectConfig;
use al_script::{EngineContext, SchedulerEvent};
use anyhow::{Context, Result};
use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// No instance is live
    Idle,
    Shutdown,
}

/// Totals reported when the loop stops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub completed: usize,
    pub halted: usize,
    pub reason: StopReason,
}

/// An engine plus its tick cadence
pub struct Runner {
    ctx: EngineContext,
    events: broadcast::Receiver<SchedulerEvent>,
    interval: Duration,
}

impl Runner {
    pub fn new(ctx: EngineContext) -> Self {
        let events = ctx.subscribe();
        let interval = Duration::from_secs_f32(ctx.settings.tick_interval());
        Self {
            ctx,
            events,
            interval,
        }
    }

    /// Build the engine of a project and start its autostart sequences
    pub fn from_project(project: &ProjectConfig) -> Result<Self> {
        let ctx = project.build_context().context("failed to build engine")?;
        let mut runner = Self::new(ctx);
        for id in project.autostart_ids() {
            runner
                .ctx
                .start(&id, 0, false)
                .with_context(|| format!("failed to start sequence '{}'", id))?;
        }
        Ok(runner)
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    /// Tick until idle or until `shutdown` resolves
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) -> RunSummary {
        let dt = self.ctx.settings.tick_interval();
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        let mut summary = RunSummary {
            ticks: 0,
            completed: 0,
            halted: 0,
            reason: StopReason::Idle,
        };

        info!(tick_rate = self.ctx.settings.tick_rate, "Running");
        loop {
            if self.ctx.scheduler.is_empty() {
                break;
            }
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    summary.reason = StopReason::Shutdown;
                    break;
                }
                _ = ticker.tick() => {
                    self.ctx.tick(dt);
                    summary.ticks += 1;
                    self.drain_events(&mut summary);
                }
            }
        }

        info!(
            ticks = summary.ticks,
            completed = summary.completed,
            halted = summary.halted,
            "Stopped"
        );
        summary
    }

    fn drain_events(&mut self, summary: &mut RunSummary) {
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    match &event {
                        SchedulerEvent::Completed { .. } => summary.completed += 1,
                        SchedulerEvent::Halted { .. } => summary.halted += 1,
                        _ => {}
                    }
                    debug!(?event, "Scheduler event");
                }
                Err(TryRecvError::Lagged(n)) => warn!("Runner lagged by {} events", n),
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
    }
}
