//! Poll Loop
//!
//! Stopped → `start` → Running → `stop` → Stopped. While running, a
//! background task reads every enabled sensor on a fixed interval and
//! reports the samples plus one heartbeat tick per interval. The owner
//! invokes the tick callback only for ticks of the current run, so no
//! callback fires once `stop` has returned.

use crate::domain::models::{SensorEnablement, SensorReading};
use crate::error::{ControllerError, Result};
use crate::infrastructure::sensors::SensorSource;
use crate::infrastructure::uart::CoreEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

pub type TickCallback = Box<dyn FnMut()>;

struct Running {
    run_id: u64,
    on_tick: TickCallback,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Owner-side handle of the poll task
pub struct PollLoop {
    next_run_id: u64,
    running: Option<Running>,
}

/// What the poll task needs from the manager
pub(crate) struct PollContext<S> {
    pub sensors: Arc<S>,
    pub enablement: watch::Receiver<SensorEnablement>,
    pub events: mpsc::UnboundedSender<CoreEvent>,
    pub request_timeout: Duration,
}

impl Default for PollLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl PollLoop {
    pub fn new() -> Self {
        Self {
            next_run_id: 1,
            running: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Only valid from Stopped, with a non-zero interval
    pub(crate) fn start<S: SensorSource>(
        &mut self,
        interval: Duration,
        on_tick: TickCallback,
        context: PollContext<S>,
    ) -> Result<()> {
        if self.running.is_some() {
            return Err(ControllerError::PollAlreadyRunning);
        }
        if interval.is_zero() {
            return Err(ControllerError::InvalidPollInterval);
        }

        let run_id = self.next_run_id;
        self.next_run_id += 1;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run(run_id, interval, context, shutdown_rx));

        info!("Poll loop started ({:?} interval)", interval);
        self.running = Some(Running {
            run_id,
            on_tick,
            shutdown,
            task,
        });
        Ok(())
    }

    /// Always safe. In-flight reads may finish but their tick is ignored.
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.shutdown.send(true);
            info!("Poll loop stopped");
        }
    }

    /// Whether samples from `run_id` belong to the current run
    pub(crate) fn is_current(&self, run_id: u64) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| running.run_id == run_id)
    }

    /// Invoke the tick callback if `run_id` is the current run
    pub(crate) fn deliver_tick(&mut self, run_id: u64) -> bool {
        match self.running.as_mut() {
            Some(running) if running.run_id == run_id => {
                (running.on_tick)();
                true
            }
            _ => {
                trace!("Dropping stale tick from run {}", run_id);
                false
            }
        }
    }

    /// Abort the task outright; used when the owner is torn down
    pub(crate) fn shutdown(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.shutdown.send(true);
            running.task.abort();
        }
    }
}

impl Drop for PollLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run<S: SensorSource>(
    run_id: u64,
    interval: Duration,
    context: PollContext<S>,
    mut shutdown: watch::Receiver<bool>,
) {
    let PollContext {
        sensors,
        enablement,
        events,
        request_timeout,
    } = context;

    let mut ticker = tokio::time::interval(interval);
    // Ticks never overlap: a slow round delays the next one
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }
        if *shutdown.borrow() {
            break;
        }

        let enabled = *enablement.borrow();
        for sensor in enabled.enabled() {
            match tokio::time::timeout(request_timeout, sensors.read(sensor)).await {
                Ok(Ok(Some(components))) => match SensorReading::new(sensor, components) {
                    Ok(reading) => {
                        let _ = events.send(CoreEvent::SensorSample { run_id, reading });
                    }
                    Err(e) => warn!("Discarding sample: {}", e),
                },
                Ok(Ok(None)) => trace!("No {} data yet", sensor),
                Ok(Err(e)) => warn!("Reading {} failed: {}", sensor, e),
                Err(_) => warn!("Reading {} timed out after {:?}", sensor, request_timeout),
            }

            if *shutdown.borrow() {
                break;
            }
        }

        if events.send(CoreEvent::Tick { run_id }).is_err() {
            break;
        }
    }

    debug!("Poll task {} finished", run_id);
}
