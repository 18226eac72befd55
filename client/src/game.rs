//! Race state machine
//!
//! The host calls [`Game::update`] once per frame. Each phase handler polls at
//! most one inbound message without blocking, runs its local logic and posts
//! outbound messages without blocking. The server has the final word on every
//! phase change: local countdowns only decide when the client may move on once
//! the server's signal has arrived.
//!
//! ```text
//! WelcomeScreen -> ChooseRunner -> LaunchRun -> Run -> Result
//!                                      ^                 |
//!                                      +-----------------+
//! ```

use crate::config::ClientConfig;
use crate::dispatcher::{
    DispatchHandle, DispatchPoll, Dispatcher, FinalTimes, Inbound, RaceOutcome,
};
use crate::field::Field;
use crate::input::Intent;
use crate::network::decode_line;
use crate::roster::Roster;
use crate::runner::Runner;
use log::{debug, error, info, warn};
use shared::{
    ClientMessage, RunnerPosition, ServerMessage, COUNTDOWN_STEPS, RESULT_STEPS, RUNNER_COUNT,
    STEP_INTERVAL,
};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

pub type Outbound = mpsc::UnboundedSender<String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    WelcomeScreen,
    ChooseRunner,
    LaunchRun,
    Run,
    Result,
}

impl Phase {
    /// The only back-edge is Result -> LaunchRun.
    pub fn next(self) -> Phase {
        match self {
            Phase::WelcomeScreen => Phase::ChooseRunner,
            Phase::ChooseRunner => Phase::LaunchRun,
            Phase::LaunchRun => Phase::Run,
            Phase::Run => Phase::Result,
            Phase::Result => Phase::LaunchRun,
        }
    }
}

/// Scratch state of the current phase, replaced on every transition.
#[derive(Debug, Default)]
struct PhaseScope {
    /// The server signal this phase waits for has arrived.
    ready: bool,
    /// The phase's one-shot message has been posted.
    sent: bool,
    clients_count: usize,
    step: u32,
}

/// Everything the renderer needs for one frame.
#[derive(Debug, Clone)]
pub struct RaceView {
    pub phase: Phase,
    pub local_id: usize,
    pub runners: [Runner; RUNNER_COUNT],
    pub field: Field,
    pub step: u32,
    pub clients_count: usize,
    pub final_times: FinalTimes,
    pub outcome: Option<RaceOutcome>,
}

pub struct Game {
    phase: Phase,
    scope: PhaseScope,
    field: Field,
    roster: Roster,
    final_times: FinalTimes,
    outcome: Option<RaceOutcome>,
    inbound: Option<Inbound>,
    outbound: Outbound,
    dispatch: Option<DispatchHandle>,
    finish_timeout: Option<Duration>,
    disconnected: bool,
}

impl Game {
    pub fn new(
        local_id: usize,
        inbound: Inbound,
        outbound: Outbound,
        config: &ClientConfig,
        now: Instant,
    ) -> Self {
        let field = Field::new(config.track.start, config.track.finish, now);

        Self {
            phase: Phase::WelcomeScreen,
            scope: PhaseScope::default(),
            roster: Roster::new(local_id, &field, config.track.max_frame_interval),
            field,
            final_times: [Duration::ZERO; RUNNER_COUNT],
            outcome: None,
            inbound: Some(inbound),
            outbound,
            dispatch: None,
            finish_timeout: config.finish_timeout(),
            disconnected: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn local_id(&self) -> usize {
        self.roster.local_id()
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn step(&self) -> u32 {
        self.scope.step
    }

    pub fn clients_count(&self) -> usize {
        self.scope.clients_count
    }

    pub fn is_ready(&self) -> bool {
        self.scope.ready
    }

    pub fn final_times(&self) -> &FinalTimes {
        &self.final_times
    }

    /// How the last race ended, cleared when the next one is set up.
    pub fn outcome(&self) -> Option<RaceOutcome> {
        self.outcome
    }

    /// The transport is gone; the session cannot progress any further.
    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    pub fn view(&self) -> RaceView {
        RaceView {
            phase: self.phase,
            local_id: self.local_id(),
            runners: self.roster.snapshot(),
            field: self.field,
            step: self.scope.step,
            clients_count: self.scope.clients_count,
            final_times: self.final_times,
            outcome: self.outcome,
        }
    }

    /// Runs one simulation tick. Never blocks.
    pub fn update(&mut self, intent: Intent, now: Instant) {
        let done = match self.phase {
            Phase::WelcomeScreen => self.handle_welcome_screen(intent),
            Phase::ChooseRunner => self.handle_choose_runner(intent),
            Phase::LaunchRun => self.handle_launch_run(now),
            Phase::Run => self.handle_run(intent, now),
            Phase::Result => self.handle_result(intent, now),
        };

        if done {
            self.advance_phase(now);
        }
    }

    fn advance_phase(&mut self, now: Instant) {
        match self.phase {
            Phase::WelcomeScreen => self.send(ClientMessage::NeedClientCount),
            Phase::ChooseRunner => self.roster.for_each_mut(|_, runner| runner.update_animation()),
            Phase::LaunchRun => {
                self.field.reset(now);
                self.start_dispatcher();
            }
            Phase::Run => {}
            Phase::Result => {
                let field = self.field;
                self.roster.for_each_mut(|_, runner| runner.reset(&field));
                self.field.reset(now);
                self.final_times = [Duration::ZERO; RUNNER_COUNT];
                self.outcome = None;
            }
        }

        let next = self.phase.next();
        info!("Phase {:?} -> {:?}", self.phase, next);
        self.phase = next;
        self.scope = PhaseScope::default();

        if matches!(next, Phase::LaunchRun | Phase::Run | Phase::Result) {
            self.field.reset(now);
        }
    }

    /// Waits for every client to connect, then for the local player to confirm.
    pub(crate) fn handle_welcome_screen(&mut self, intent: Intent) -> bool {
        match self.poll_message() {
            Some(ServerMessage::AllConnected) => self.scope.ready = true,
            Some(ServerMessage::ClientsInQueue { count }) if !self.scope.ready => {
                self.scope.clients_count = count;
            }
            Some(other) => self.ignore(&other),
            None => {}
        }

        self.scope.ready && intent.is_action()
    }

    pub(crate) fn handle_choose_runner(&mut self, intent: Intent) -> bool {
        let choice = self.roster.local_mut().choose(intent);
        let (id, color, selected) = {
            let local = self.roster.local();
            (self.roster.local_id(), local.color, local.selected)
        };

        if choice.color_changed {
            self.send(ClientMessage::RunnerChoice { id, color });
        }
        if choice.toggled {
            self.send(ClientMessage::RunnerChosen { selected });
        }

        match self.poll_message() {
            Some(ServerMessage::AllRunnersChosen) => self.scope.ready = true,
            Some(ServerMessage::ClientsInQueue { count }) => {
                // The server counts runners chosen; show how many are still choosing.
                self.scope.clients_count = RUNNER_COUNT.saturating_sub(count);
            }
            Some(ServerMessage::RunnerChoice { id, color }) => self.apply_choice(id, color),
            Some(other) => self.ignore(&other),
            None => {}
        }

        self.scope.ready
    }

    /// Counts down once the server started the race.
    pub(crate) fn handle_launch_run(&mut self, now: Instant) -> bool {
        match self.poll_message() {
            Some(ServerMessage::StartRace) if !self.scope.ready => {
                self.scope.ready = true;
                self.field.reset(now);
            }
            Some(ServerMessage::RunnerChoice { id, color }) => self.apply_choice(id, color),
            Some(other) => self.ignore(&other),
            None => {}
        }

        if !self.scope.ready {
            return false;
        }

        if self.field.elapsed(now) >= STEP_INTERVAL {
            self.scope.step += 1;
            self.field.reset(now);
        }
        self.scope.step >= COUNTDOWN_STEPS
    }

    /// Moves the local runner; remote runners belong to the dispatcher.
    pub(crate) fn handle_run(&mut self, intent: Intent, now: Instant) -> bool {
        let id = self.roster.local_id();
        let field = self.field;
        let local = self.roster.local_mut();

        local.advance(intent.is_action());
        let report = (!local.arrived).then(|| RunnerPosition {
            id,
            position: local.position,
            speed: local.speed,
        });
        local.check_arrival(&field, now);
        local.update_animation();
        let (arrived, run_time) = (local.arrived, local.run_time);

        if let Some(report) = report {
            self.send(ClientMessage::Position(report));
        }
        if arrived && !self.scope.sent {
            self.send(ClientMessage::FinishRace { elapsed: run_time });
            self.scope.sent = true;
            if let Some(handle) = self.dispatch.as_mut() {
                handle.arm_deadline();
            }
        }

        self.poll_dispatcher();

        self.roster.local().arrived && self.scope.ready
    }

    /// Reveals the results, then waits for the next race.
    pub(crate) fn handle_result(&mut self, intent: Intent, now: Instant) -> bool {
        if self.field.elapsed(now) >= STEP_INTERVAL || intent.is_action() {
            self.scope.step = (self.scope.step + 1).min(RESULT_STEPS);
            self.field.reset(now);
        }

        if self.scope.step >= RESULT_STEPS && intent.is_action() && !self.scope.sent {
            self.send(ClientMessage::WishRestart);
            self.scope.sent = true;
        }

        match self.poll_message() {
            Some(ServerMessage::StartRace) => self.scope.ready = true,
            Some(ServerMessage::ClientsInQueue { count }) => self.scope.clients_count = count,
            Some(other) => self.ignore(&other),
            None => {}
        }

        self.scope.ready && self.scope.sent
    }

    fn start_dispatcher(&mut self) {
        let Some(inbound) = self.inbound.take() else {
            error!("No inbound channel to hand to the race dispatcher");
            self.disconnected = true;
            return;
        };

        let dispatcher = Dispatcher::new(
            inbound,
            self.roster.remotes_handle(),
            self.field,
            self.finish_timeout,
        );
        self.dispatch = Some(dispatcher.spawn());
    }

    fn poll_dispatcher(&mut self) {
        let Some(handle) = self.dispatch.as_mut() else {
            return;
        };

        match handle.poll() {
            DispatchPoll::Pending => {}
            DispatchPoll::Done(report) => {
                self.dispatch = None;
                self.inbound = Some(report.inbound);

                let id = self.roster.local_id();
                let local = self.roster.local_mut();
                // Only the server may declare an unfinished local runner arrived.
                let local_time = match report.outcome {
                    RaceOutcome::Finished => {
                        local.finalize(report.times[id]);
                        report.times[id]
                    }
                    RaceOutcome::TimedOut | RaceOutcome::Disconnected if local.arrived => {
                        local.run_time
                    }
                    RaceOutcome::TimedOut | RaceOutcome::Disconnected => Duration::ZERO,
                };

                self.final_times = report.times;
                self.final_times[id] = local_time;
                self.outcome = Some(report.outcome);
                if report.outcome == RaceOutcome::Disconnected {
                    self.disconnected = true;
                }
                self.scope.ready = true;
            }
            DispatchPoll::Lost => {
                error!("Race dispatcher ended without reporting");
                self.dispatch = None;
                self.disconnected = true;
            }
        }
    }

    fn apply_choice(&mut self, id: usize, color: usize) {
        match self.roster.remotes().get_mut(id) {
            Some(runner) => runner.color = color,
            None => debug!("Ignoring relayed choice of local runner {}", id),
        }
    }

    fn poll_message(&mut self) -> Option<ServerMessage> {
        let inbound = self.inbound.as_mut()?;
        match inbound.try_recv() {
            Ok(line) => decode_line(&line),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                if !self.disconnected {
                    warn!("Inbound channel closed");
                    self.disconnected = true;
                }
                None
            }
        }
    }

    fn send(&mut self, message: ClientMessage) {
        debug!("Sending {:?}", message);
        if self.outbound.send(message.encode()).is_err() {
            if !self.disconnected {
                error!("Outbound channel closed, dropping {:?}", message);
            }
            self.disconnected = true;
        }
    }

    fn ignore(&self, message: &ServerMessage) {
        debug!("Ignoring {:?} in {:?}", message, self.phase);
    }
}
