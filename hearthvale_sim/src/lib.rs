// hearthvale_sim: settlement agent simulation library.
//
// This crate contains the simulation core for Hearthvale: a voxel grid of
// walkable surfaces, A* pathfinding with ladder connections, a prioritized
// job board, per-agent behavior state machines driven by needs and the time
// of day, and the stuck-detection / recovery pipeline that builds emergency
// ladders (or relocates an agent) when navigation fails. It has no rendering
// or engine dependencies and runs headless under a fixed-rate `step(dt)`.
//
// Module overview:
// - `sim.rs`:         World: owns every component, fixed-rate step loop.
// - `types.rs`:       VoxelCoord, WorldPos, entity IDs, cell/job/structure kinds.
// - `config.rs`:      SimConfig, every tunable, loadable from JSON.
// - `grid.rs`:        VoxelGrid: cell kinds plus derived walkable/cost flags.
// - `nav.rs`:         ConnectionRegistry: ladder edges between stance cells.
// - `pathfinding.rs`: A* over grid step moves and connections.
// - `job.rs`:         JobRequest / JobBoard: priority claiming with callbacks.
// - `mover.rs`:       AgentMover: path following with timed re-planning.
// - `stuck.rs`:       StuckMonitor: progress sampling and strike counting.
// - `collision.rs`:   CollisionQuery trait + GridCollider (3D DDA raycast).
// - `recovery.rs`:    RecoveryPlanner: climb / descend / teleport decisions.
// - `structure.rs`:   Recovery structures, their registry, and BuildTask.
// - `needs.rs`:       Hunger and energy.
// - `inventory.rs`:   Inventory trait + Stockpile.
// - `work.rs`:        WorkHandler trait + SimpleWorkHandler.
// - `clock.rs`:       TimeProvider trait + SimClock.
// - `event.rs`:       SimEvent and the topic-keyed EventBus.
// - `agent.rs`:       Agent and the AgentState machine.
//
// **Critical constraint: determinism.** Given the same config and the same
// sequence of calls, a `World` produces the same events. Registries are
// `BTreeMap`s keyed by sequential IDs; `FxHashMap`/`FxHashSet` appear only
// as search scratch and lookup indexes that are never iterated for output.
// No system time, no OS entropy.

pub mod agent;
pub mod clock;
pub mod collision;
pub mod config;
pub mod event;
pub mod grid;
pub mod inventory;
pub mod job;
pub mod mover;
pub mod nav;
pub mod needs;
pub mod pathfinding;
pub mod recovery;
pub mod sim;
pub mod structure;
pub mod stuck;
pub mod types;
pub mod work;
