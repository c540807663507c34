// Per-agent behavior state machine.
//
// An `Agent` owns its position, needs, mover and stuck monitor, plus the ID
// of the job it has claimed. Its behavior is a closed `AgentState` enum with
// per-state data; `enter`, `tick` and `exit` dispatch on it with a single
// match each. Every transition goes through `change_state`, which runs
// `exit` on the old state, `enter` on the new one, and publishes
// `StateChanged { name }` on the event bus.
//
// Global transitions are evaluated every update before the per-state tick:
// critical hunger forces Survival (unless already there); otherwise
// critical energy or night forces Sleep (unless sleeping or surviving).
// Preemption leaves the claimed job on the board; once the agent is back in
// Idle it resumes that job before polling for a new one.
//
// Work states (Working, Gather, Building) travel to the job site with the
// mover, then run a work tick every `work_interval_secs` through the
// `WorkHandler` collaborator against the shared `Inventory`. Move jobs
// complete on arrival; Build jobs hand over from Working to Building on
// arrival. A `Blocked` tick is retried up to `max_work_retries` times;
// travelling without a path for `job_give_up_secs` cancels the job.
//
// Everything the machine touches outside the agent arrives through an
// explicit `AgentContext` of borrowed components built by `World::step`.
//
// See also: `sim.rs` for the per-agent tick order and recovery hand-off,
// `job.rs` for the board, `mover.rs` for travel, `needs.rs` for thresholds.

use crate::clock::TimeProvider;
use crate::config::SimConfig;
use crate::event::{EventBus, SimEventKind};
use crate::inventory::Inventory;
use crate::job::{JobBoard, JobRequest};
use crate::mover::{AgentMover, MoveStatus, NavContext};
use crate::needs::Needs;
use crate::stuck::StuckMonitor;
use crate::types::{AgentId, ItemKind, JobId, JobKind, VoxelCoord, WorldPos};
use crate::work::{WorkHandler, WorkOutcome};
use serde::{Deserialize, Serialize};

/// Bookkeeping for the job an agent is working on.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    pub job: JobId,
    /// Where the agent stands to do the work.
    pub site: WorldPos,
    pub at_site: bool,
    pub work_timer: f32,
    /// Consecutive `Blocked` work ticks.
    pub retries: u32,
}

impl JobProgress {
    fn new(job: JobId, site: WorldPos) -> Self {
        Self {
            job,
            site,
            at_site: false,
            work_timer: 0.0,
            retries: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AgentState {
    Idle,
    Working(JobProgress),
    Gather(JobProgress),
    Sleep,
    Survival { timer: f32 },
    Building(JobProgress),
}

impl AgentState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Working(_) => "Working",
            Self::Gather(_) => "Gather",
            Self::Sleep => "Sleep",
            Self::Survival { .. } => "Survival",
            Self::Building(_) => "Building",
        }
    }

    pub fn job_progress(&self) -> Option<&JobProgress> {
        match self {
            Self::Working(p) | Self::Gather(p) | Self::Building(p) => Some(p),
            Self::Idle | Self::Sleep | Self::Survival { .. } => None,
        }
    }
}

/// Borrowed world components an agent update may touch.
pub struct AgentContext<'a> {
    pub config: &'a SimConfig,
    pub nav: NavContext<'a>,
    pub jobs: &'a mut JobBoard,
    pub inventory: &'a mut dyn Inventory,
    pub work: &'a mut dyn WorkHandler,
    pub time: &'a dyn TimeProvider,
    pub events: &'a mut EventBus,
    pub tick: u64,
}

#[derive(Clone, Debug)]
pub struct Agent {
    pub id: AgentId,
    /// Centre of the agent's stance cell while standing.
    pub position: WorldPos,
    pub current_job: Option<JobId>,
    pub state: AgentState,
    pub mover: AgentMover,
    pub stuck: StuckMonitor,
    pub needs: Needs,
}

/// The parts of an agent a work-state tick mutates besides its state.
struct Worker<'a> {
    id: AgentId,
    position: &'a mut WorldPos,
    mover: &'a mut AgentMover,
    current_job: &'a mut Option<JobId>,
}

impl Agent {
    pub fn new(id: AgentId, position: WorldPos, needs: Needs) -> Self {
        Self {
            id,
            position,
            current_job: None,
            state: AgentState::Idle,
            mover: AgentMover::new(),
            stuck: StuckMonitor::new(),
            needs,
        }
    }

    /// Held from the stuck declaration until recovery finishes; the state
    /// machine does not run meanwhile.
    pub fn is_recovering(&self) -> bool {
        self.stuck.is_recovering()
    }

    pub fn cell(&self) -> VoxelCoord {
        VoxelCoord::from_world(self.position)
    }

    /// Global transitions, then the current state's tick.
    pub fn update(&mut self, dt: f32, ctx: &mut AgentContext<'_>) {
        let config = ctx.config;
        let needs = &config.needs;
        let surviving = matches!(self.state, AgentState::Survival { .. });
        if self.needs.is_starving(needs) && !surviving {
            self.change_state(AgentState::Survival { timer: 0.0 }, ctx);
        } else if (self.needs.is_exhausted(needs) || ctx.time.is_night(&config.time))
            && !matches!(self.state, AgentState::Sleep | AgentState::Survival { .. })
        {
            self.change_state(AgentState::Sleep, ctx);
        }

        if let Some(next) = self.tick_state(dt, ctx) {
            self.change_state(next, ctx);
        }
    }

    /// `exit(old)`, `enter(new)`, then publish the new state's name.
    pub fn change_state(&mut self, next: AgentState, ctx: &mut AgentContext<'_>) {
        let old = std::mem::replace(&mut self.state, next);
        self.exit(&old);
        self.enter();
        tracing::debug!(
            agent = %self.id,
            from = old.name(),
            to = self.state.name(),
            "state change"
        );
        ctx.events.publish(
            ctx.tick,
            SimEventKind::StateChanged {
                agent: self.id,
                name: self.state.name().to_string(),
            },
        );
    }

    fn enter(&mut self) {
        match self.state {
            AgentState::Idle | AgentState::Sleep | AgentState::Survival { .. } => {
                self.mover.stop();
            }
            AgentState::Working(p) | AgentState::Gather(p) | AgentState::Building(p) => {
                if p.at_site {
                    self.mover.stop();
                } else {
                    self.mover.move_to(p.site);
                }
            }
        }
    }

    fn exit(&mut self, old: &AgentState) {
        match old {
            AgentState::Working(_) | AgentState::Gather(_) | AgentState::Building(_) => {
                self.mover.stop();
            }
            AgentState::Sleep => {
                tracing::trace!(agent = %self.id, energy = self.needs.energy, "woke up");
            }
            AgentState::Idle | AgentState::Survival { .. } => {}
        }
    }

    /// Per-state tick. Returns the state to switch to, if any.
    fn tick_state(&mut self, dt: f32, ctx: &mut AgentContext<'_>) -> Option<AgentState> {
        let config = ctx.config;
        let building = matches!(self.state, AgentState::Building(_));
        match self.state {
            AgentState::Idle => self.tick_idle(ctx),
            AgentState::Sleep => {
                self.needs.rest(dt, &config.needs);
                let day = !ctx.time.is_night(&config.time);
                (self.needs.is_rested(&config.needs) && day).then_some(AgentState::Idle)
            }
            AgentState::Survival { ref mut timer } => {
                let needs = &config.needs;
                *timer += dt;
                if *timer >= needs.eat_interval_secs {
                    *timer -= needs.eat_interval_secs;
                    if ctx.inventory.consume_item(ItemKind::Food, 1) {
                        self.needs.eat(needs.food_restore, needs);
                        tracing::trace!(agent = %self.id, hunger = self.needs.hunger, "ate");
                    }
                }
                (!self.needs.is_starving(needs)).then_some(AgentState::Idle)
            }
            AgentState::Working(ref mut p)
            | AgentState::Gather(ref mut p)
            | AgentState::Building(ref mut p) => {
                let worker = Worker {
                    id: self.id,
                    position: &mut self.position,
                    mover: &mut self.mover,
                    current_job: &mut self.current_job,
                };
                tick_job(p, building, worker, dt, ctx)
            }
        }
    }

    fn tick_idle(&mut self, ctx: &mut AgentContext<'_>) -> Option<AgentState> {
        if let Some(id) = self.current_job {
            match ctx.jobs.get(id) {
                Some(job) => {
                    let job = job.clone();
                    return Some(self.start_job(&job, ctx));
                }
                None => self.current_job = None,
            }
        }
        let job = ctx.jobs.get_available()?;
        self.current_job = Some(job.id);
        tracing::debug!(agent = %self.id, job = %job.id, kind = ?job.kind, "claimed job");
        ctx.events.publish(
            ctx.tick,
            SimEventKind::JobClaimed {
                agent: self.id,
                job: job.id,
            },
        );
        Some(self.start_job(&job, ctx))
    }

    /// Pick the work site and the work state for a claimed job.
    fn start_job(&self, job: &JobRequest, ctx: &AgentContext<'_>) -> AgentState {
        let target = VoxelCoord::from_world(job.target);
        let site = match job.kind {
            JobKind::Move => target,
            _ => ctx
                .nav
                .grid
                .nearest_stance(target, self.cell())
                .unwrap_or(target),
        };
        let progress = JobProgress::new(job.id, site.center());
        match job.kind {
            JobKind::Chop => AgentState::Gather(progress),
            JobKind::Move | JobKind::Build | JobKind::Haul | JobKind::Craft => {
                AgentState::Working(progress)
            }
        }
    }
}

/// Travel to the site, then run work ticks. Returns the next state when the
/// job ends or hands over.
fn tick_job(
    p: &mut JobProgress,
    building: bool,
    worker: Worker<'_>,
    dt: f32,
    ctx: &mut AgentContext<'_>,
) -> Option<AgentState> {
    let Some(job) = ctx.jobs.get(p.job).cloned() else {
        tracing::debug!(agent = %worker.id, job = %p.job, "job vanished from board");
        ctx.work.forget(p.job);
        *worker.current_job = None;
        return Some(AgentState::Idle);
    };
    let config = ctx.config;
    let params = &config.agent;

    if !p.at_site {
        if !worker.mover.is_moving() && !worker.mover.has_arrived() {
            worker.mover.move_to(p.site);
        }
        match worker.mover.tick(worker.position, dt, ctx.nav, params) {
            MoveStatus::Arrived => {
                p.at_site = true;
                worker.mover.stop();
                match job.kind {
                    JobKind::Move => {
                        return Some(finish_job(&job, true, worker, ctx));
                    }
                    JobKind::Build if !building => return Some(AgentState::Building(*p)),
                    _ => {}
                }
            }
            MoveStatus::NoPath if worker.mover.no_path_secs() >= params.job_give_up_secs => {
                tracing::info!(
                    agent = %worker.id,
                    job = %job.id,
                    secs = worker.mover.no_path_secs(),
                    "no path to job site, giving up"
                );
                return Some(finish_job(&job, false, worker, ctx));
            }
            _ => {}
        }
        return None;
    }

    p.work_timer += dt;
    if p.work_timer < params.work_interval_secs {
        return None;
    }
    p.work_timer -= params.work_interval_secs;

    match ctx.work.work_tick(&job, &mut *ctx.inventory) {
        WorkOutcome::Progress => {
            p.retries = 0;
            None
        }
        WorkOutcome::Done => Some(finish_job(&job, true, worker, ctx)),
        WorkOutcome::Blocked => {
            p.retries += 1;
            if p.retries > params.max_work_retries {
                tracing::info!(agent = %worker.id, job = %job.id, "work blocked, cancelling");
                Some(finish_job(&job, false, worker, ctx))
            } else {
                None
            }
        }
        WorkOutcome::Failed => Some(finish_job(&job, false, worker, ctx)),
    }
}

/// Complete or cancel the job on the board and drop it from the agent.
fn finish_job(
    job: &JobRequest,
    completed: bool,
    worker: Worker<'_>,
    ctx: &mut AgentContext<'_>,
) -> AgentState {
    ctx.work.forget(job.id);
    *worker.current_job = None;
    let kind = if completed {
        ctx.jobs.complete(job.id);
        SimEventKind::JobCompleted {
            agent: worker.id,
            job: job.id,
        }
    } else {
        ctx.jobs.cancel(job.id);
        SimEventKind::JobCancelled {
            agent: Some(worker.id),
            job: job.id,
        }
    };
    ctx.events.publish(ctx.tick, kind);
    AgentState::Idle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimClock;
    use crate::grid::VoxelGrid;
    use crate::inventory::Stockpile;
    use crate::job::JobOutcome;
    use crate::nav::ConnectionRegistry;
    use crate::pathfinding::Pathfinder;
    use crate::types::CellKind;
    use crate::work::SimpleWorkHandler;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Harness {
        config: SimConfig,
        grid: VoxelGrid,
        connections: ConnectionRegistry,
        pathfinder: Pathfinder,
        jobs: JobBoard,
        stock: Stockpile,
        work: SimpleWorkHandler,
        clock: SimClock,
        events: EventBus,
        tick: u64,
    }

    impl Harness {
        fn new() -> Self {
            let config = SimConfig::default();
            let mut grid = VoxelGrid::new(VoxelCoord::new(-8, -1, -8), 16, 8, 16);
            grid.fill_box(
                VoxelCoord::new(-8, -1, -8),
                VoxelCoord::new(7, -1, 7),
                CellKind::Solid,
            );
            let pathfinder = Pathfinder::from_params(&config.pathfinding);
            let work = SimpleWorkHandler::new(config.agent.work_ticks_per_job);
            let clock = SimClock::new(&config.time);
            Self {
                config,
                grid,
                connections: ConnectionRegistry::new(),
                pathfinder,
                jobs: JobBoard::new(),
                stock: Stockpile::new(),
                work,
                clock,
                events: EventBus::new(),
                tick: 0,
            }
        }

        fn agent(&self) -> Agent {
            Agent::new(AgentId(0), WorldPos::ZERO, Needs::full(&self.config.needs))
        }

        fn update(&mut self, agent: &mut Agent, dt: f32) {
            self.tick += 1;
            let mut ctx = AgentContext {
                config: &self.config,
                nav: NavContext {
                    grid: &self.grid,
                    connections: &self.connections,
                    pathfinder: &self.pathfinder,
                },
                jobs: &mut self.jobs,
                inventory: &mut self.stock,
                work: &mut self.work,
                time: &self.clock,
                events: &mut self.events,
                tick: self.tick,
            };
            agent.update(dt, &mut ctx);
        }

        fn run(&mut self, agent: &mut Agent, secs: f32) {
            let ticks = (secs / 0.1).round() as usize;
            for _ in 0..ticks {
                self.update(agent, 0.1);
            }
        }

        /// Names published by `StateChanged` since the last call.
        fn state_names(&mut self) -> Vec<String> {
            self.events
                .drain()
                .into_iter()
                .filter_map(|e| match e.kind {
                    SimEventKind::StateChanged { name, .. } => Some(name),
                    _ => None,
                })
                .collect()
        }

        /// Post a job whose outcome is recorded in the returned log.
        fn post(
            &mut self,
            kind: JobKind,
            target: WorldPos,
        ) -> (JobId, Rc<RefCell<Vec<JobOutcome>>>) {
            let log: Rc<RefCell<Vec<JobOutcome>>> = Rc::default();
            let sink = Rc::clone(&log);
            let id = self.jobs.post(
                JobRequest::new(kind, target, 10)
                    .with_callback(move |_, outcome| sink.borrow_mut().push(outcome)),
            );
            (id, log)
        }
    }

    #[test]
    fn idle_without_jobs_stays_idle() {
        let mut h = Harness::new();
        let mut agent = h.agent();
        h.run(&mut agent, 100.0);
        assert_eq!(agent.state, AgentState::Idle);
        assert!(h.state_names().is_empty());
        assert_eq!(agent.position, WorldPos::ZERO);
    }

    #[test]
    fn move_job_completes_on_arrival() {
        let mut h = Harness::new();
        let mut agent = h.agent();
        let (id, log) = h.post(JobKind::Move, WorldPos::new(3.0, 0.0, 0.0));

        h.update(&mut agent, 0.1);
        assert!(matches!(agent.state, AgentState::Working(_)));
        assert_eq!(agent.current_job, Some(id));
        assert!(h.jobs.get(id).unwrap().claimed);

        h.run(&mut agent, 3.0);
        assert_eq!(agent.state, AgentState::Idle);
        assert_eq!(agent.position, WorldPos::new(3.0, 0.0, 0.0));
        assert_eq!(*log.borrow(), vec![JobOutcome::Completed]);
        assert!(agent.current_job.is_none());
        assert_eq!(h.state_names(), vec!["Working", "Idle"]);
    }

    #[test]
    fn chop_job_gathers_beside_the_tree() {
        let mut h = Harness::new();
        h.grid.fill_box(
            VoxelCoord::new(3, 0, 0),
            VoxelCoord::new(3, 3, 0),
            CellKind::Solid,
        );
        let mut agent = h.agent();
        let (_, log) = h.post(JobKind::Chop, WorldPos::new(3.0, 0.0, 0.0));

        h.update(&mut agent, 0.1);
        let Some(progress) = agent.state.job_progress().copied() else {
            panic!("expected a work state, got {:?}", agent.state);
        };
        assert_eq!(agent.state.name(), "Gather");
        assert_eq!(progress.site, WorldPos::new(2.0, 0.0, 0.0));

        h.run(&mut agent, 6.0);
        assert_eq!(agent.position, WorldPos::new(2.0, 0.0, 0.0));
        assert_eq!(h.stock.count(ItemKind::Wood), 3);
        assert_eq!(*log.borrow(), vec![JobOutcome::Completed]);
        assert_eq!(h.state_names(), vec!["Gather", "Idle"]);
    }

    #[test]
    fn build_job_hands_over_to_building() {
        let mut h = Harness::new();
        h.stock.add_item(ItemKind::Wood, 5);
        let mut agent = h.agent();
        let (_, log) = h.post(JobKind::Build, WorldPos::new(3.0, 0.0, 0.0));

        h.run(&mut agent, 8.0);
        assert_eq!(*log.borrow(), vec![JobOutcome::Completed]);
        assert_eq!(h.stock.count(ItemKind::Wood), 2);
        assert_eq!(h.state_names(), vec!["Working", "Building", "Idle"]);
    }

    #[test]
    fn blocked_work_cancels_after_retries() {
        let mut h = Harness::new();
        let mut agent = h.agent();
        let (id, log) = h.post(JobKind::Build, WorldPos::new(3.0, 0.0, 0.0));

        h.run(&mut agent, 5.0);
        assert!(log.borrow().is_empty());
        assert!(matches!(agent.state, AgentState::Building(_)));

        h.run(&mut agent, 5.0);
        assert_eq!(*log.borrow(), vec![JobOutcome::Cancelled]);
        assert!(h.jobs.get(id).is_none());
        assert_eq!(agent.state, AgentState::Idle);
    }

    #[test]
    fn unreachable_job_is_cancelled_after_give_up_time() {
        let mut h = Harness::new();
        h.config.agent.job_give_up_secs = 5.0;
        h.grid.fill_box(
            VoxelCoord::new(3, 0, 0),
            VoxelCoord::new(3, 2, 0),
            CellKind::Solid,
        );
        let mut agent = h.agent();
        let (_, log) = h.post(JobKind::Move, WorldPos::new(3.0, 3.0, 0.0));

        h.run(&mut agent, 4.0);
        assert!(log.borrow().is_empty());
        assert!(agent.mover.is_moving());

        h.run(&mut agent, 2.0);
        assert_eq!(*log.borrow(), vec![JobOutcome::Cancelled]);
        assert_eq!(agent.state, AgentState::Idle);
        assert_eq!(agent.position, WorldPos::ZERO);
    }

    #[test]
    fn job_cancelled_elsewhere_returns_agent_to_idle() {
        let mut h = Harness::new();
        let mut agent = h.agent();
        let (id, _) = h.post(JobKind::Move, WorldPos::new(6.0, 0.0, 0.0));
        h.run(&mut agent, 1.0);
        h.jobs.cancel(id);
        h.update(&mut agent, 0.1);
        assert_eq!(agent.state, AgentState::Idle);
        assert!(agent.current_job.is_none());
    }

    #[test]
    fn critical_hunger_preempts_working_next_tick() {
        let mut h = Harness::new();
        let mut agent = h.agent();
        let (id, log) = h.post(JobKind::Move, WorldPos::new(6.0, 0.0, 0.0));
        h.run(&mut agent, 1.0);
        assert!(matches!(agent.state, AgentState::Working(_)));

        agent.needs.hunger = h.config.needs.critical_hunger;
        h.update(&mut agent, 0.1);
        assert!(matches!(agent.state, AgentState::Survival { .. }));
        // The job stays claimed and unfinished.
        assert_eq!(agent.current_job, Some(id));
        assert!(h.jobs.get(id).unwrap().claimed);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn survival_eats_then_resumes_claimed_job() {
        let mut h = Harness::new();
        h.stock.add_item(ItemKind::Food, 1);
        let mut agent = h.agent();
        let (_, log) = h.post(JobKind::Move, WorldPos::new(6.0, 0.0, 0.0));
        h.run(&mut agent, 1.0);
        agent.needs.hunger = h.config.needs.critical_hunger - 1.0;
        h.state_names();

        h.run(&mut agent, 2.5);
        assert_eq!(h.stock.count(ItemKind::Food), 0);
        assert!(!agent.needs.is_starving(&h.config.needs));
        assert_eq!(h.state_names(), vec!["Survival", "Idle", "Working"]);

        h.run(&mut agent, 5.0);
        assert_eq!(*log.borrow(), vec![JobOutcome::Completed]);
        assert_eq!(agent.position, WorldPos::new(6.0, 0.0, 0.0));
    }

    #[test]
    fn night_forces_sleep_and_day_wakes() {
        let mut h = Harness::new();
        let mut agent = h.agent();
        h.clock.set_hour(22);
        h.run(&mut agent, 5.0);
        assert_eq!(agent.state, AgentState::Sleep);

        h.clock.set_hour(7);
        h.update(&mut agent, 0.1);
        assert_eq!(agent.state, AgentState::Idle);
        assert_eq!(h.state_names(), vec!["Sleep", "Idle"]);
    }

    #[test]
    fn exhaustion_forces_sleep_until_rested() {
        let mut h = Harness::new();
        let mut agent = h.agent();
        agent.needs.energy = h.config.needs.critical_energy;
        h.update(&mut agent, 0.1);
        assert_eq!(agent.state, AgentState::Sleep);

        h.run(&mut agent, 70.0);
        assert_eq!(agent.state, AgentState::Sleep);
        h.run(&mut agent, 20.0);
        assert_eq!(agent.state, AgentState::Idle);
        assert!(agent.needs.is_rested(&h.config.needs));
    }

    #[test]
    fn starvation_outranks_sleep() {
        let mut h = Harness::new();
        let mut agent = h.agent();
        h.clock.set_hour(23);
        agent.needs.hunger = 0.0;
        h.run(&mut agent, 10.0);
        // No food in stock: the agent keeps trying to eat rather than sleep.
        assert!(matches!(agent.state, AgentState::Survival { .. }));
        assert_eq!(h.state_names(), vec!["Survival"]);
    }
}
