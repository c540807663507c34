// Job board: the priority queue that matches agents to work.
//
// Requesters (construction sites, player commands, tests) `post` a
// `JobRequest`; idle agents call `get_available`, which returns the
// highest-priority unclaimed job and marks it claimed in the same call. A
// claimed job is never handed out again until it is released (its agent
// went away) or removed (`complete` / `cancel`). Removal invokes the job's
// callback so the requester can unwind.
//
// Ordering is strict priority; equal priorities go to the earliest post
// (lowest `JobId`). There is no aging or anti-starvation, and a cancelled
// job is not re-queued; requesters that want a retry post a new job.
//
// See also: `agent.rs` for the Idle state that polls this board and the
// work states that complete or cancel jobs, `sim.rs` which owns the board.
//
// **Critical constraint: determinism.** Jobs live in a `BTreeMap` keyed by
// sequential `JobId`, so scans and tie-breaks are stable.

use crate::types::{EntityRef, JobId, JobKind, WorldPos};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// How a job left the board.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Cancelled,
}

/// Invoked exactly once when a job is completed or cancelled.
pub type JobCallback = Rc<dyn Fn(JobId, JobOutcome)>;

#[derive(Clone)]
pub struct JobRequest {
    /// Assigned by `JobBoard::post`.
    pub id: JobId,
    pub kind: JobKind,
    pub target: WorldPos,
    pub target_entity: Option<EntityRef>,
    pub priority: i32,
    pub claimed: bool,
    pub callback: Option<JobCallback>,
}

impl JobRequest {
    pub fn new(kind: JobKind, target: WorldPos, priority: i32) -> Self {
        Self {
            id: JobId(0),
            kind,
            target,
            target_entity: None,
            priority,
            claimed: false,
            callback: None,
        }
    }

    pub fn with_entity(mut self, entity: EntityRef) -> Self {
        self.target_entity = Some(entity);
        self
    }

    pub fn with_callback(mut self, callback: impl Fn(JobId, JobOutcome) + 'static) -> Self {
        self.callback = Some(Rc::new(callback));
        self
    }
}

impl fmt::Debug for JobRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRequest")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("target", &self.target)
            .field("target_entity", &self.target_entity)
            .field("priority", &self.priority)
            .field("claimed", &self.claimed)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct JobBoard {
    jobs: BTreeMap<JobId, JobRequest>,
    next_id: u64,
}

impl JobBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a job and return its freshly assigned ID. Any
    /// `id`/`claimed` values on the request are overwritten.
    pub fn post(&mut self, mut job: JobRequest) -> JobId {
        let id = JobId(self.next_id);
        self.next_id += 1;
        job.id = id;
        job.claimed = false;
        tracing::debug!(%id, kind = ?job.kind, priority = job.priority, "job posted");
        self.jobs.insert(id, job);
        id
    }

    /// The highest-priority unclaimed job (earliest posted on ties), marked
    /// claimed before it is returned.
    pub fn get_available(&mut self) -> Option<JobRequest> {
        let id = self
            .jobs
            .values()
            .filter(|j| !j.claimed)
            .min_by_key(|j| (Reverse(j.priority), j.id))?
            .id;
        let job = self.jobs.get_mut(&id)?;
        job.claimed = true;
        tracing::trace!(%id, "job claimed");
        Some(job.clone())
    }

    /// Remove a job and notify its owner with `Cancelled`. Returns `false`
    /// if the job is unknown.
    pub fn cancel(&mut self, id: JobId) -> bool {
        self.finish(id, JobOutcome::Cancelled)
    }

    /// Remove a job and notify its owner with `Completed`. Returns `false`
    /// if the job is unknown.
    pub fn complete(&mut self, id: JobId) -> bool {
        self.finish(id, JobOutcome::Completed)
    }

    fn finish(&mut self, id: JobId, outcome: JobOutcome) -> bool {
        let Some(job) = self.jobs.remove(&id) else {
            return false;
        };
        tracing::debug!(%id, ?outcome, "job removed");
        if let Some(callback) = job.callback {
            callback(id, outcome);
        }
        true
    }

    /// Put a claimed job back up for grabs.
    pub fn release(&mut self, id: JobId) -> bool {
        match self.jobs.get_mut(&id) {
            Some(job) if job.claimed => {
                job.claimed = false;
                tracing::debug!(%id, "job released");
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, id: JobId) -> Option<&JobRequest> {
        self.jobs.get(&id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Number of unclaimed jobs.
    pub fn available_count(&self) -> usize {
        self.jobs.values().filter(|j| !j.claimed).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn job(priority: i32) -> JobRequest {
        JobRequest::new(JobKind::Haul, WorldPos::new(1.0, 0.0, 1.0), priority)
    }

    #[test]
    fn higher_priority_first_regardless_of_post_order() {
        for low_first in [true, false] {
            let mut board = JobBoard::new();
            let (high_id, low_id) = if low_first {
                let low = board.post(job(10));
                (board.post(job(100)), low)
            } else {
                let high = board.post(job(100));
                (high, board.post(job(10)))
            };

            let first = board.get_available().unwrap();
            assert_eq!(first.id, high_id);
            assert!(first.claimed);

            // The claimed job is never returned a second time.
            let second = board.get_available().unwrap();
            assert_eq!(second.id, low_id);
            assert!(board.get_available().is_none());
        }
    }

    #[test]
    fn ties_go_to_earliest_post() {
        let mut board = JobBoard::new();
        let a = board.post(job(5));
        let b = board.post(job(5));
        assert_eq!(board.get_available().unwrap().id, a);
        assert_eq!(board.get_available().unwrap().id, b);
    }

    #[test]
    fn empty_board_has_nothing() {
        let mut board = JobBoard::new();
        assert!(board.get_available().is_none());
        assert!(board.is_empty());
    }

    #[test]
    fn cancel_invokes_callback_and_removes() {
        let log: Rc<RefCell<Vec<(JobId, JobOutcome)>>> = Rc::default();
        let sink = Rc::clone(&log);
        let mut board = JobBoard::new();
        let id = board.post(job(1).with_callback(move |id, outcome| {
            sink.borrow_mut().push((id, outcome));
        }));

        board.get_available();
        assert!(board.cancel(id));
        assert_eq!(*log.borrow(), vec![(id, JobOutcome::Cancelled)]);
        assert!(board.get(id).is_none());
        // Not re-queued.
        assert!(board.get_available().is_none());
        assert!(!board.cancel(id));
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn complete_invokes_callback() {
        let log: Rc<RefCell<Vec<JobOutcome>>> = Rc::default();
        let sink = Rc::clone(&log);
        let mut board = JobBoard::new();
        let callback = move |_: JobId, outcome: JobOutcome| sink.borrow_mut().push(outcome);
        let id = board.post(job(1).with_callback(callback));
        assert!(board.complete(id));
        assert_eq!(*log.borrow(), vec![JobOutcome::Completed]);
    }

    #[test]
    fn release_makes_job_available_again() {
        let mut board = JobBoard::new();
        let id = board.post(job(3));
        assert_eq!(board.get_available().unwrap().id, id);
        assert_eq!(board.available_count(), 0);
        assert!(board.release(id));
        assert!(!board.release(id));
        assert_eq!(board.available_count(), 1);
        assert_eq!(board.get_available().unwrap().id, id);
    }

    #[test]
    fn post_resets_claimed_flag() {
        let mut board = JobBoard::new();
        let mut request = job(2);
        request.claimed = true;
        board.post(request);
        assert!(board.get_available().is_some());
    }
}
