//! Ownership split between the local runner and the remote runners
//!
//! The game tick owns the local runner outright. Remote runners sit behind a
//! shared lock whose accessors refuse the local id, so a handle to them cannot
//! be used to touch the local runner.

use crate::field::Field;
use crate::runner::Runner;
use shared::RUNNER_COUNT;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub type SharedRemotes = Arc<Mutex<RemoteRunners>>;

#[derive(Debug)]
pub struct RemoteRunners {
    local_id: usize,
    // The local slot is never handed out.
    runners: [Runner; RUNNER_COUNT],
}

impl RemoteRunners {
    fn new(local_id: usize, field: &Field, max_frame_interval: u32) -> Self {
        Self {
            local_id,
            runners: std::array::from_fn(|i| Runner::new(i, field, max_frame_interval)),
        }
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut Runner> {
        if id == self.local_id {
            return None;
        }
        self.runners.get_mut(id)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut Runner)> {
        let local_id = self.local_id;
        self.runners
            .iter_mut()
            .enumerate()
            .filter(move |(id, _)| *id != local_id)
    }
}

#[derive(Debug)]
pub struct Roster {
    local_id: usize,
    local: Runner,
    remotes: SharedRemotes,
}

impl Roster {
    pub fn new(local_id: usize, field: &Field, max_frame_interval: u32) -> Self {
        Self {
            local_id,
            local: Runner::new(local_id, field, max_frame_interval),
            remotes: Arc::new(Mutex::new(RemoteRunners::new(
                local_id,
                field,
                max_frame_interval,
            ))),
        }
    }

    pub fn local_id(&self) -> usize {
        self.local_id
    }

    pub fn local(&self) -> &Runner {
        &self.local
    }

    pub fn local_mut(&mut self) -> &mut Runner {
        &mut self.local
    }

    /// Handle for a task that may only write remote runners.
    pub fn remotes_handle(&self) -> SharedRemotes {
        Arc::clone(&self.remotes)
    }

    pub fn remotes(&self) -> MutexGuard<'_, RemoteRunners> {
        lock_remotes(&self.remotes)
    }

    /// Applies `f` to every runner, local included. Not for use while a
    /// dispatcher is running.
    pub fn for_each_mut(&mut self, mut f: impl FnMut(usize, &mut Runner)) {
        f(self.local_id, &mut self.local);
        let mut remotes = lock_remotes(&self.remotes);
        for (id, runner) in remotes.iter_mut() {
            f(id, runner);
        }
    }

    pub fn snapshot(&self) -> [Runner; RUNNER_COUNT] {
        let mut runners = self.remotes().runners.clone();
        runners[self.local_id] = self.local.clone();
        runners
    }
}

/// Locks the remote runners, recovering the data if a holder panicked.
pub fn lock_remotes(remotes: &SharedRemotes) -> MutexGuard<'_, RemoteRunners> {
    remotes.lock().unwrap_or_else(PoisonError::into_inner)
}
