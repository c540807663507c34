// Top-level world state and the fixed-rate step loop.
//
// `World` owns every component: config, voxel grid, ladder connections,
// pathfinder, job board, inventory and work collaborators, clock, event
// bus, agents, recovery structures and their in-flight build tasks. Each
// component is constructed once here and reaches the agents through an
// explicit `AgentContext` of borrows, so nothing is looked up globally.
//
// ## Step order
//
// `step(dt)` runs, in order:
//
//   1. Clock: advance and publish one `MinuteChanged` per whole minute.
//   2. Per agent (in `AgentId` order):
//      a. needs decay;
//      b. the state machine, unless the agent is recovering;
//      c. stuck sampling against the mover;
//      d. on a fresh stuck signal, plan a recovery: ladder plans register
//         an Emergency structure and a `BuildTask` and hold the agent in
//         recovery; a teleport relocates it and resumes its mover at once.
//   3. Build tasks: each places its due rungs, pushes any agent standing in
//      a new rung up one cell, and on completion registers the ladder
//      connection, releases the owning agent and resumes its mover.
//   4. Structure expiry: expired structures revoke their connection and
//      restore their rungs.
//
// Every event published during the step is also returned in `StepResult`.
//
// See also: `agent.rs` for the state machine, `recovery.rs` for planning,
// `structure.rs` for build tasks and expiry, `event.rs` for the bus.
//
// **Critical constraint: determinism.** Agents, jobs and structures live in
// `BTreeMap`s keyed by sequential IDs, build tasks run in request order, and
// nothing reads wall-clock time. The same config and call sequence always
// produce the same events.

use crate::agent::{Agent, AgentContext};
use crate::clock::SimClock;
use crate::collision::GridCollider;
use crate::config::SimConfig;
use crate::event::{EventBus, EventTopic, SimEvent, SimEventKind};
use crate::grid::VoxelGrid;
use crate::inventory::{Inventory, Stockpile};
use crate::job::{JobBoard, JobRequest};
use crate::mover::NavContext;
use crate::nav::ConnectionRegistry;
use crate::needs::Needs;
use crate::pathfinding::Pathfinder;
use crate::recovery::{RecoveryOutcome, RecoveryPlanner};
use crate::structure::{BuildStatus, BuildTask, StructureRegistry};
use crate::types::*;
use crate::work::{SimpleWorkHandler, WorkHandler};
use std::collections::BTreeMap;

/// Everything observable that happened during one `step`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepResult {
    pub tick: u64,
    pub events: Vec<SimEvent>,
}

pub struct World {
    pub config: SimConfig,
    pub grid: VoxelGrid,
    pub connections: ConnectionRegistry,
    pub pathfinder: Pathfinder,
    pub jobs: JobBoard,
    pub structures: StructureRegistry,
    inventory: Box<dyn Inventory>,
    work: Box<dyn WorkHandler>,
    clock: SimClock,
    events: EventBus,
    agents: BTreeMap<AgentId, Agent>,
    build_tasks: Vec<BuildTask>,
    planner: RecoveryPlanner,
    tick: u64,
    next_agent_id: u64,
}

impl World {
    /// A world with an empty grid sized by `config.grid`, an empty
    /// `Stockpile` and the `SimpleWorkHandler`.
    pub fn new(config: SimConfig) -> Self {
        let work = SimpleWorkHandler::new(config.agent.work_ticks_per_job);
        Self::with_collaborators(config, Box::new(Stockpile::new()), Box::new(work))
    }

    pub fn with_collaborators(
        config: SimConfig,
        inventory: Box<dyn Inventory>,
        work: Box<dyn WorkHandler>,
    ) -> Self {
        let grid = VoxelGrid::from_params(&config.grid);
        let pathfinder = Pathfinder::from_params(&config.pathfinding);
        let planner = RecoveryPlanner::new(config.recovery.clone());
        let clock = SimClock::new(&config.time);
        Self {
            config,
            grid,
            connections: ConnectionRegistry::new(),
            pathfinder,
            jobs: JobBoard::new(),
            structures: StructureRegistry::new(),
            inventory,
            work,
            clock,
            events: EventBus::new(),
            agents: BTreeMap::new(),
            build_tasks: Vec::new(),
            planner,
            tick: 0,
            next_agent_id: 0,
        }
    }

    /// Steps taken so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut SimClock {
        &mut self.clock
    }

    pub fn inventory(&self) -> &dyn Inventory {
        self.inventory.as_ref()
    }

    pub fn inventory_mut(&mut self) -> &mut dyn Inventory {
        self.inventory.as_mut()
    }

    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(&id)
    }

    pub fn agent_mut(&mut self, id: AgentId) -> Option<&mut Agent> {
        self.agents.get_mut(&id)
    }

    pub fn agents(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values()
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Builds still placing rungs.
    pub fn build_tasks(&self) -> &[BuildTask] {
        &self.build_tasks
    }

    /// Place a new agent on the cell containing `position`, with full needs.
    pub fn spawn_agent(&mut self, position: WorldPos) -> AgentId {
        let id = AgentId(self.next_agent_id);
        self.next_agent_id += 1;
        let position = VoxelCoord::from_world(position).center();
        let agent = Agent::new(id, position, Needs::full(&self.config.needs));
        self.agents.insert(id, agent);
        tracing::info!(agent = %id, %position, "agent spawned");
        self.events.publish(
            self.tick,
            SimEventKind::AgentSpawned {
                agent: id,
                position,
            },
        );
        id
    }

    /// Remove an agent. Its claimed job goes back on the board; a ladder
    /// being built for it keeps building without an owner.
    pub fn remove_agent(&mut self, id: AgentId) -> bool {
        let Some(agent) = self.agents.remove(&id) else {
            return false;
        };
        if let Some(job) = agent.current_job {
            self.work.forget(job);
            self.jobs.release(job);
        }
        for task in &mut self.build_tasks {
            if task.agent == Some(id) {
                task.agent = None;
            }
        }
        tracing::info!(agent = %id, "agent removed");
        self.events
            .publish(self.tick, SimEventKind::AgentRemoved { agent: id });
        true
    }

    pub fn post_job(&mut self, job: JobRequest) -> JobId {
        self.jobs.post(job)
    }

    /// Cancel a job from outside; an agent working on it drops it on its
    /// next update.
    pub fn cancel_job(&mut self, id: JobId) -> bool {
        if !self.jobs.cancel(id) {
            return false;
        }
        self.work.forget(id);
        self.events.publish(
            self.tick,
            SimEventKind::JobCancelled {
                agent: None,
                job: id,
            },
        );
        true
    }

    /// Schedule an agentless ladder build between the `lower` and `upper`
    /// stances. A negative `lifetime` makes the structure permanent.
    pub fn request_structure(
        &mut self,
        kind: StructureKind,
        lower: VoxelCoord,
        upper: VoxelCoord,
        lifetime: f32,
    ) -> StructureId {
        let structure = self.structures.register(kind, lower, upper, lifetime, None);
        self.build_tasks
            .push(BuildTask::new(structure, None, lower, upper));
        self.events.publish(
            self.tick,
            SimEventKind::StructureStarted { structure, kind },
        );
        structure
    }

    /// Dismantle every structure of `kind` (e.g. scaffolds once a site is
    /// done). Unfinished builds among them are abandoned on the next step.
    pub fn clear_structures(&mut self, kind: StructureKind) -> Vec<StructureId> {
        self.structures
            .clear_kind(kind, &mut self.grid, &mut self.connections)
    }

    pub fn subscribe(
        &mut self,
        topic: EventTopic,
        handler: impl FnMut(&SimEvent) + 'static,
    ) -> SubscriptionId {
        self.events.subscribe(topic, handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Advance the world by `dt` simulated seconds.
    pub fn step(&mut self, dt: f32) -> StepResult {
        self.tick += 1;
        let tick = self.tick;

        let changed = self.clock.advance(dt);
        let now = self.clock.total_minutes();
        for minute in (now + 1 - u64::from(changed))..=now {
            self.events.publish(
                tick,
                SimEventKind::MinuteChanged {
                    total_minutes: minute,
                    hour: ((minute / 60) % 24) as u32,
                },
            );
        }

        let ids: Vec<AgentId> = self.agents.keys().copied().collect();
        for id in ids {
            if self.update_agent(id, dt, tick) {
                self.start_recovery(id, tick);
            }
        }

        self.advance_builds(dt, tick);

        for structure in self
            .structures
            .tick(dt, &mut self.grid, &mut self.connections)
        {
            self.events
                .publish(tick, SimEventKind::StructureExpired { structure });
        }

        StepResult {
            tick,
            events: self.events.drain(),
        }
    }

    /// Needs, state machine and stuck sampling for one agent. Returns
    /// `true` when the agent just became stuck.
    fn update_agent(&mut self, id: AgentId, dt: f32, tick: u64) -> bool {
        let Some(agent) = self.agents.get_mut(&id) else {
            return false;
        };
        agent.needs.decay(dt, &self.config.needs);

        if !agent.is_recovering() {
            let mut ctx = AgentContext {
                config: &self.config,
                nav: NavContext {
                    grid: &self.grid,
                    connections: &self.connections,
                    pathfinder: &self.pathfinder,
                },
                jobs: &mut self.jobs,
                inventory: self.inventory.as_mut(),
                work: self.work.as_mut(),
                time: &self.clock,
                events: &mut self.events,
                tick,
            };
            agent.update(dt, &mut ctx);
        }

        agent.stuck.observe(
            agent.position,
            agent.mover.is_moving(),
            dt,
            &self.config.stuck,
        )
    }

    fn start_recovery(&mut self, id: AgentId, tick: u64) {
        let Some(agent) = self.agents.get_mut(&id) else {
            return;
        };
        let position = agent.position;
        tracing::info!(agent = %id, %position, "agent stuck");
        self.events
            .publish(tick, SimEventKind::AgentStuck { agent: id, position });

        let target = agent.mover.target().unwrap_or(position);
        let collider = GridCollider::new(&self.grid);
        let outcome =
            self.planner
                .plan(position, target, &collider, &self.grid, &self.connections);
        tracing::info!(agent = %id, ?outcome, "recovery planned");
        self.events.publish(
            tick,
            SimEventKind::RecoveryPlanned {
                agent: id,
                outcome,
            },
        );

        if let Some((lower, upper)) = outcome.ladder_span() {
            let kind = StructureKind::Emergency;
            let lifetime = self.config.recovery.emergency_lifetime_secs;
            let structure = self
                .structures
                .register(kind, lower, upper, lifetime, Some(id));
            self.build_tasks
                .push(BuildTask::new(structure, Some(id), lower, upper));
            agent.stuck.begin_recovery();
            self.events
                .publish(tick, SimEventKind::StructureStarted { structure, kind });
            return;
        }

        match outcome {
            RecoveryOutcome::Teleport { to } => {
                agent.position = to;
                agent.stuck.finish_recovery();
                agent.mover.resume();
                self.events.publish(
                    tick,
                    SimEventKind::AgentRelocated {
                        agent: id,
                        from: position,
                        to,
                    },
                );
            }
            _ => agent.stuck.finish_recovery(),
        }
    }

    fn advance_builds(&mut self, dt: f32, tick: u64) {
        let unit_delay = self.config.recovery.build_unit_delay_secs;
        let ladder_cost = self.config.pathfinding.ladder_cost_multiplier;
        let mut remaining = Vec::with_capacity(self.build_tasks.len());

        for mut task in std::mem::take(&mut self.build_tasks) {
            let progress = task.advance(dt, unit_delay, &mut self.grid, &mut self.structures);
            for &rung in &progress.placed {
                self.displace_from(rung, tick);
            }
            match progress.status {
                BuildStatus::Building => remaining.push(task),
                BuildStatus::Done => {
                    if let Some(connection) =
                        task.complete(&mut self.structures, &mut self.connections, ladder_cost)
                    {
                        self.events.publish(
                            tick,
                            SimEventKind::StructureBuilt {
                                structure: task.structure,
                                connection,
                            },
                        );
                    }
                    self.release_from_recovery(task.agent);
                }
                BuildStatus::Abandoned => {
                    tracing::debug!(structure = %task.structure, "build abandoned");
                    self.release_from_recovery(task.agent);
                }
            }
        }

        self.build_tasks = remaining;
    }

    /// Push every agent whose stance cell just turned Solid up one cell.
    fn displace_from(&mut self, rung: VoxelCoord, tick: u64) {
        for agent in self.agents.values_mut() {
            if agent.cell() != rung {
                continue;
            }
            let from = agent.position;
            let to = rung.up().center();
            agent.position = to;
            agent.mover.resume();
            tracing::debug!(agent = %agent.id, %from, %to, "displaced by rung");
            self.events.publish(
                tick,
                SimEventKind::AgentDisplaced {
                    agent: agent.id,
                    from,
                    to,
                },
            );
        }
    }

    fn release_from_recovery(&mut self, owner: Option<AgentId>) {
        let Some(agent) = owner.and_then(|id| self.agents.get_mut(&id)) else {
            return;
        };
        agent.stuck.finish_recovery();
        agent.mover.resume();
    }
}
