//! Race-time reconciliation of remote runners
//!
//! While the race runs, the game tick only moves the local runner. A single
//! dispatcher task takes the inbound queue, applies peer position reports to
//! the remote runners and stops as soon as the final times arrive. The inbound
//! queue is handed back with the outcome so the next phase can read it.
//!
//! The finish deadline only starts once the game arms it through
//! [`DispatchHandle::arm_deadline`], after the local runner has crossed the
//! line and reported its time.

use crate::field::Field;
use crate::network::decode_line;
use crate::roster::{lock_remotes, SharedRemotes};
use log::{debug, info, warn};
use shared::{RunnerPosition, ServerMessage, RUNNER_COUNT};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};

pub type Inbound = mpsc::Receiver<String>;
pub type FinalTimes = [Duration; RUNNER_COUNT];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaceOutcome {
    /// The server published the final times.
    Finished,
    /// No final times within the deadline after the local runner finished;
    /// runners keep their own times.
    TimedOut,
    /// The transport closed during the race.
    Disconnected,
}

#[derive(Debug)]
pub struct DispatchReport {
    pub outcome: RaceOutcome,
    /// Per-runner times. Outside `Finished` the local slot is zero.
    pub times: FinalTimes,
    pub inbound: Inbound,
}

pub struct Dispatcher {
    inbound: Inbound,
    remotes: SharedRemotes,
    field: Field,
    timeout: Option<Duration>,
    arm: Option<oneshot::Receiver<()>>,
}

enum Wake {
    Line(Option<String>),
    Armed,
    Deadline,
}

impl Dispatcher {
    pub fn new(
        inbound: Inbound,
        remotes: SharedRemotes,
        field: Field,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            inbound,
            remotes,
            field,
            timeout,
            arm: None,
        }
    }

    /// Starts the dispatcher on the current runtime. The deadline waits for
    /// [`DispatchHandle::arm_deadline`].
    pub fn spawn(mut self) -> DispatchHandle {
        let (arm, armed) = oneshot::channel();
        self.arm = Some(armed);

        let (sender, receiver) = oneshot::channel();
        tokio::spawn(async move {
            let report = self.run().await;
            if sender.send(report).is_err() {
                warn!("Race dispatcher finished after the game went away");
            }
        });
        DispatchHandle {
            receiver,
            arm: Some(arm),
        }
    }

    /// Runs until the race is over. Without an arming handle the deadline
    /// counts from the start.
    pub async fn run(mut self) -> DispatchReport {
        let mut deadline = match self.arm {
            Some(_) => None,
            None => self.deadline_from_now(),
        };

        loop {
            let wake = tokio::select! {
                next = self.inbound.recv() => Wake::Line(next),
                _ = armed(&mut self.arm), if self.arm.is_some() => Wake::Armed,
                _ = deadline_passed(deadline) => Wake::Deadline,
            };

            let line = match wake {
                Wake::Line(Some(line)) => line,
                Wake::Line(None) => {
                    warn!("Inbound channel closed during the race");
                    return self.force_finish(RaceOutcome::Disconnected);
                }
                Wake::Armed => {
                    debug!("Local runner finished, starting the results deadline");
                    self.arm = None;
                    deadline = self.deadline_from_now();
                    continue;
                }
                Wake::Deadline => {
                    warn!("No race results before the deadline, using local times");
                    return self.force_finish(RaceOutcome::TimedOut);
                }
            };

            match decode_line(&line) {
                Some(ServerMessage::Position(report)) => self.apply_position(&report),
                Some(ServerMessage::RaceFinished { times }) => return self.finish(times),
                Some(other) => debug!("Ignoring {:?} during the race", other),
                None => {}
            }
        }
    }

    fn deadline_from_now(&self) -> Option<tokio::time::Instant> {
        self.timeout.map(|timeout| tokio::time::Instant::now() + timeout)
    }

    fn apply_position(&self, report: &RunnerPosition) {
        let mut remotes = lock_remotes(&self.remotes);
        match remotes.get_mut(report.id) {
            Some(runner) if !runner.arrived => {
                runner.apply_report(report);
                runner.check_arrival(&self.field, Instant::now());
                runner.update_animation();
            }
            Some(_) => {}
            None => debug!("Ignoring relayed position of local runner {}", report.id),
        }
    }

    fn finish(self, times: FinalTimes) -> DispatchReport {
        info!("Race finished: {:?}", times);
        {
            let mut remotes = lock_remotes(&self.remotes);
            for (id, runner) in remotes.iter_mut() {
                runner.finalize(times[id]);
            }
        }

        DispatchReport {
            outcome: RaceOutcome::Finished,
            times,
            inbound: self.inbound,
        }
    }

    fn force_finish(self, outcome: RaceOutcome) -> DispatchReport {
        let mut times = [Duration::ZERO; RUNNER_COUNT];
        {
            let mut remotes = lock_remotes(&self.remotes);
            for (id, runner) in remotes.iter_mut() {
                runner.finalize(runner.run_time);
                times[id] = runner.run_time;
            }
        }

        DispatchReport {
            outcome,
            times,
            inbound: self.inbound,
        }
    }
}

async fn armed(arm: &mut Option<oneshot::Receiver<()>>) {
    if let Some(receiver) = arm {
        // A dropped handle arms the deadline too.
        let _ = receiver.await;
    }
}

async fn deadline_passed(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// The game tick's side of a running dispatcher.
pub struct DispatchHandle {
    receiver: oneshot::Receiver<DispatchReport>,
    arm: Option<oneshot::Sender<()>>,
}

#[derive(Debug)]
pub enum DispatchPoll {
    Pending,
    Done(DispatchReport),
    /// The task ended without reporting; the inbound queue went with it.
    Lost,
}

impl DispatchHandle {
    /// Starts the finish deadline. Later calls do nothing.
    pub fn arm_deadline(&mut self) {
        if let Some(arm) = self.arm.take() {
            if arm.send(()).is_err() {
                debug!("Race dispatcher already finished");
            }
        }
    }

    /// Checks for completion without blocking.
    pub fn poll(&mut self) -> DispatchPoll {
        match self.receiver.try_recv() {
            Ok(report) => DispatchPoll::Done(report),
            Err(oneshot::error::TryRecvError::Empty) => DispatchPoll::Pending,
            Err(oneshot::error::TryRecvError::Closed) => DispatchPoll::Lost,
        }
    }
}
