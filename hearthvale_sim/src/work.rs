// Work-tick collaborator.
//
// Once an agent reaches its job site, the work states call
// `WorkHandler::work_tick` every `work_interval_secs`. The handler stands in
// for whatever the host simulates at the site (block placement, resource
// depletion) and reports whether the job advanced, finished, is blocked on
// missing stock, or failed outright.
//
// `SimpleWorkHandler` is the built-in handler. Every non-Move job takes
// `ticks_per_job` successful ticks, except Haul which finishes in one:
//
// - Chop yields one Wood per tick.
// - Build consumes one Wood per tick.
// - Craft turns one Wood into one Plank per tick.
//
// A tick that cannot take its input is `Blocked` and does not count.
//
// See also: `agent.rs` for retry/cancel handling of the outcomes,
// `inventory.rs` for the stock being moved around.

use crate::inventory::Inventory;
use crate::job::JobRequest;
use crate::types::{ItemKind, JobId, JobKind};
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkOutcome {
    /// Progressed; more ticks needed.
    Progress,
    Done,
    /// Insufficient stock; try again later.
    Blocked,
    /// The job can never finish (target gone, wrong kind).
    Failed,
}

pub trait WorkHandler {
    fn work_tick(&mut self, job: &JobRequest, inventory: &mut dyn Inventory) -> WorkOutcome;

    /// Drop any progress kept for `job` (it was completed or cancelled).
    fn forget(&mut self, _job: JobId) {}
}

#[derive(Clone, Debug)]
pub struct SimpleWorkHandler {
    ticks_per_job: u32,
    progress: BTreeMap<JobId, u32>,
}

impl SimpleWorkHandler {
    pub fn new(ticks_per_job: u32) -> Self {
        Self {
            ticks_per_job: ticks_per_job.max(1),
            progress: BTreeMap::new(),
        }
    }

    /// Successful ticks recorded for `job`.
    pub fn progress(&self, job: JobId) -> u32 {
        self.progress.get(&job).copied().unwrap_or(0)
    }
}

impl WorkHandler for SimpleWorkHandler {
    fn work_tick(&mut self, job: &JobRequest, inventory: &mut dyn Inventory) -> WorkOutcome {
        let needed = match job.kind {
            JobKind::Move => return WorkOutcome::Done,
            JobKind::Haul => 1,
            JobKind::Chop => {
                inventory.add_item(ItemKind::Wood, 1);
                self.ticks_per_job
            }
            JobKind::Build => {
                if !inventory.consume_item(ItemKind::Wood, 1) {
                    return WorkOutcome::Blocked;
                }
                self.ticks_per_job
            }
            JobKind::Craft => {
                if !inventory.consume_item(ItemKind::Wood, 1) {
                    return WorkOutcome::Blocked;
                }
                inventory.add_item(ItemKind::Plank, 1);
                self.ticks_per_job
            }
        };

        let done = self.progress.entry(job.id).or_insert(0);
        *done += 1;
        if *done >= needed {
            self.progress.remove(&job.id);
            WorkOutcome::Done
        } else {
            WorkOutcome::Progress
        }
    }

    fn forget(&mut self, job: JobId) {
        self.progress.remove(&job);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::Stockpile;
    use crate::types::WorldPos;

    fn job(id: u64, kind: JobKind) -> JobRequest {
        let mut job = JobRequest::new(kind, WorldPos::ZERO, 0);
        job.id = JobId(id);
        job
    }

    #[test]
    fn chop_yields_wood_every_tick() {
        let mut handler = SimpleWorkHandler::new(3);
        let mut pile = Stockpile::new();
        let chop = job(1, JobKind::Chop);
        assert_eq!(handler.work_tick(&chop, &mut pile), WorkOutcome::Progress);
        assert_eq!(handler.work_tick(&chop, &mut pile), WorkOutcome::Progress);
        assert_eq!(handler.work_tick(&chop, &mut pile), WorkOutcome::Done);
        assert_eq!(pile.count(ItemKind::Wood), 3);
        assert_eq!(handler.progress(JobId(1)), 0);
    }

    #[test]
    fn build_blocks_without_wood() {
        let mut handler = SimpleWorkHandler::new(2);
        let mut pile = Stockpile::with_items([(ItemKind::Wood, 1)]);
        let build = job(2, JobKind::Build);
        assert_eq!(handler.work_tick(&build, &mut pile), WorkOutcome::Progress);
        assert_eq!(handler.work_tick(&build, &mut pile), WorkOutcome::Blocked);
        // Blocked ticks don't count.
        assert_eq!(handler.progress(JobId(2)), 1);
        pile.add_item(ItemKind::Wood, 1);
        assert_eq!(handler.work_tick(&build, &mut pile), WorkOutcome::Done);
    }

    #[test]
    fn craft_converts_wood_to_planks() {
        let mut handler = SimpleWorkHandler::new(2);
        let mut pile = Stockpile::with_items([(ItemKind::Wood, 5)]);
        let craft = job(3, JobKind::Craft);
        handler.work_tick(&craft, &mut pile);
        handler.work_tick(&craft, &mut pile);
        assert_eq!(pile.count(ItemKind::Wood), 3);
        assert_eq!(pile.count(ItemKind::Plank), 2);
    }

    #[test]
    fn move_and_haul_finish_fast() {
        let mut handler = SimpleWorkHandler::new(5);
        let mut pile = Stockpile::new();
        let walk = handler.work_tick(&job(4, JobKind::Move), &mut pile);
        let haul = handler.work_tick(&job(5, JobKind::Haul), &mut pile);
        assert_eq!(walk, WorkOutcome::Done);
        assert_eq!(haul, WorkOutcome::Done);
    }

    #[test]
    fn forget_drops_progress() {
        let mut handler = SimpleWorkHandler::new(3);
        let mut pile = Stockpile::new();
        handler.work_tick(&job(6, JobKind::Chop), &mut pile);
        handler.forget(JobId(6));
        assert_eq!(handler.progress(JobId(6)), 0);
    }
}
