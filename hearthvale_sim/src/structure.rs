// Recovery structures: ladders built to unblock navigation.
//
// This file has two concerns:
//
// ## Structure registry
//
// `RecoveryStructure` records one ladder: its kind, the lower and upper
// stances it joins, its remaining lifetime, the rung cells it actually
// turned Solid, and the pathfinding connection it registered once finished.
// `StructureRegistry` owns them in a `BTreeMap`. Structures are registered
// when their build starts, so an interrupted build still expires and cleans
// up after itself.
//
// Dismantling (lifetime expiry, `remove`, `clear_kind`) revokes the
// connection and restores rungs that are still Solid to Empty. A rung that
// was changed by something else since (mined out, paved over) is left alone.
//
// ## Build task
//
// `BuildTask` is the resumable construction job for one structure: a step
// index and a timer. Each `advance` places at most one rung per
// `build_unit_delay_secs`. The rungs form the column at the lower stance's
// x/z from `lower.y + 1` to `upper.y - 1`; cells that are already non-Empty
// are skipped rather than overwritten. `complete` registers the
// `lower <-> upper` connection and records it on the structure.
//
// See also: `recovery.rs` for the plans these are built from, `nav.rs` for
// connections, `sim.rs` which drives build tasks and expiry each tick and
// displaces agents caught in a new rung.
//
// **Critical constraint: determinism.** Structures iterate in `StructureId`
// order, so expiry and clearance revoke connections in a stable order.

use crate::grid::VoxelGrid;
use crate::nav::ConnectionRegistry;
use crate::types::{AgentId, CellKind, ConnectionId, StructureId, StructureKind, VoxelCoord};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecoveryStructure {
    pub id: StructureId,
    pub kind: StructureKind,
    pub bottom: VoxelCoord,
    pub top: VoxelCoord,
    /// Seconds remaining; negative means permanent.
    pub lifetime: f32,
    /// Cells this structure turned Solid.
    pub placed_cells: Vec<VoxelCoord>,
    /// Set when the build finishes.
    pub connection: Option<ConnectionId>,
    /// The agent it was built for, if any.
    pub owner: Option<AgentId>,
}

impl RecoveryStructure {
    pub fn is_permanent(&self) -> bool {
        self.lifetime < 0.0
    }
}

#[derive(Clone, Debug, Default)]
pub struct StructureRegistry {
    structures: BTreeMap<StructureId, RecoveryStructure>,
    next_id: u64,
}

impl StructureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        kind: StructureKind,
        bottom: VoxelCoord,
        top: VoxelCoord,
        lifetime: f32,
        owner: Option<AgentId>,
    ) -> StructureId {
        let id = StructureId(self.next_id);
        self.next_id += 1;
        self.structures.insert(
            id,
            RecoveryStructure {
                id,
                kind,
                bottom,
                top,
                lifetime,
                placed_cells: Vec::new(),
                connection: None,
                owner,
            },
        );
        tracing::debug!(%id, ?kind, %bottom, %top, lifetime, "structure registered");
        id
    }

    pub fn get(&self, id: StructureId) -> Option<&RecoveryStructure> {
        self.structures.get(&id)
    }

    pub fn contains(&self, id: StructureId) -> bool {
        self.structures.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.structures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.structures.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecoveryStructure> {
        self.structures.values()
    }

    /// Count down lifetimes and dismantle every structure that ran out.
    /// Returns the expired IDs in order.
    pub fn tick(
        &mut self,
        dt: f32,
        grid: &mut VoxelGrid,
        connections: &mut ConnectionRegistry,
    ) -> Vec<StructureId> {
        let mut expired = Vec::new();
        for s in self.structures.values_mut() {
            if s.is_permanent() {
                continue;
            }
            s.lifetime -= dt;
            if s.lifetime <= 0.0 {
                expired.push(s.id);
            }
        }
        for &id in &expired {
            tracing::debug!(%id, "structure expired");
            self.remove(id, grid, connections);
        }
        expired
    }

    /// Dismantle one structure.
    pub fn remove(
        &mut self,
        id: StructureId,
        grid: &mut VoxelGrid,
        connections: &mut ConnectionRegistry,
    ) -> Option<RecoveryStructure> {
        let structure = self.structures.remove(&id)?;
        if let Some(conn) = structure.connection {
            connections.remove(conn);
        }
        for &cell in &structure.placed_cells {
            if grid.kind(cell) == Some(CellKind::Solid) {
                grid.set_cell(cell, CellKind::Empty);
            }
        }
        Some(structure)
    }

    /// Dismantle every structure of `kind` (e.g. all scaffolds once a
    /// construction site finishes). Returns the removed IDs.
    pub fn clear_kind(
        &mut self,
        kind: StructureKind,
        grid: &mut VoxelGrid,
        connections: &mut ConnectionRegistry,
    ) -> Vec<StructureId> {
        let ids: Vec<StructureId> = self
            .structures
            .values()
            .filter(|s| s.kind == kind)
            .map(|s| s.id)
            .collect();
        for &id in &ids {
            self.remove(id, grid, connections);
        }
        if !ids.is_empty() {
            tracing::info!(?kind, count = ids.len(), "structures cleared");
        }
        ids
    }
}

// ---------------------------------------------------------------------------
// Build task
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildStatus {
    Building,
    /// Every rung is placed; call `complete`.
    Done,
    /// The structure was removed before the build finished.
    Abandoned,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildProgress {
    /// Rungs turned Solid during this advance.
    pub placed: SmallVec<[VoxelCoord; 4]>,
    pub status: BuildStatus,
}

#[derive(Clone, Debug)]
pub struct BuildTask {
    pub structure: StructureId,
    /// The agent waiting on this build, if any.
    pub agent: Option<AgentId>,
    lower: VoxelCoord,
    upper: VoxelCoord,
    rungs: Vec<VoxelCoord>,
    step: usize,
    timer: f32,
}

impl BuildTask {
    pub fn new(
        structure: StructureId,
        agent: Option<AgentId>,
        lower: VoxelCoord,
        upper: VoxelCoord,
    ) -> Self {
        let rungs = ((lower.y + 1)..upper.y)
            .map(|y| VoxelCoord::new(lower.x, y, lower.z))
            .collect();
        Self {
            structure,
            agent,
            lower,
            upper,
            rungs,
            step: 0,
            timer: 0.0,
        }
    }

    pub fn lower(&self) -> VoxelCoord {
        self.lower
    }

    pub fn upper(&self) -> VoxelCoord {
        self.upper
    }

    /// Rung cells in placement order.
    pub fn rungs(&self) -> &[VoxelCoord] {
        &self.rungs
    }

    pub fn is_done(&self) -> bool {
        self.step >= self.rungs.len()
    }

    /// Advance the build by `dt` seconds, placing one rung per `unit_delay`.
    pub fn advance(
        &mut self,
        dt: f32,
        unit_delay: f32,
        grid: &mut VoxelGrid,
        registry: &mut StructureRegistry,
    ) -> BuildProgress {
        let mut placed = SmallVec::new();
        let Some(structure) = registry.structures.get_mut(&self.structure) else {
            return BuildProgress {
                placed,
                status: BuildStatus::Abandoned,
            };
        };

        self.timer += dt;
        while !self.is_done() && self.timer >= unit_delay {
            self.timer -= unit_delay;
            let rung = self.rungs[self.step];
            self.step += 1;
            if grid.is_empty(rung) && grid.set_cell(rung, CellKind::Solid) {
                structure.placed_cells.push(rung);
                placed.push(rung);
                tracing::trace!(structure = %self.structure, %rung, "rung placed");
            }
        }

        let status = if self.is_done() {
            BuildStatus::Done
        } else {
            BuildStatus::Building
        };
        BuildProgress { placed, status }
    }

    /// Register the `lower <-> upper` connection and record it on the
    /// structure. `None` if the structure no longer exists.
    pub fn complete(
        &self,
        registry: &mut StructureRegistry,
        connections: &mut ConnectionRegistry,
        ladder_cost_multiplier: f32,
    ) -> Option<ConnectionId> {
        let structure = registry.structures.get_mut(&self.structure)?;
        let id = connections.add(
            self.lower,
            self.upper,
            ladder_cost_multiplier,
            Some(self.structure),
        );
        structure.connection = Some(id);
        tracing::info!(
            structure = %self.structure,
            lower = %self.lower,
            upper = %self.upper,
            rungs = structure.placed_cells.len(),
            "structure built"
        );
        Some(id)
    }
}
