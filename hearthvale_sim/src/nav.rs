// Non-geometric navigation edges.
//
// The voxel grid already encodes walking, single-block steps up and
// single-block drops. Anything taller is crossed through a `Connection`: a
// bidirectional edge between two stance cells registered by a finished
// recovery structure (ladder, scaffold). The pathfinder consults this
// registry alongside the grid's geometric neighbours.
//
// Connections are stored once in a `BTreeMap` keyed by sequential
// `ConnectionId`, with an `FxHashMap` adjacency index from each endpoint to
// the ids touching it. Adjacency lists stay in id order, so neighbour
// expansion order is deterministic.
//
// See also: `structure.rs` which adds connections on build completion and
// revokes them on expiry, `pathfinding.rs` for the A* consumer.

use crate::types::{ConnectionId, StructureId, VoxelCoord};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeMap;

/// A bidirectional edge between two stance cells.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub a: VoxelCoord,
    pub b: VoxelCoord,
    /// Traversal cost in either direction.
    pub cost: f32,
    /// The structure that registered this edge, if any.
    pub structure: Option<StructureId>,
}

impl Connection {
    /// The endpoint opposite `from`, if `from` is one of the endpoints.
    pub fn other_end(&self, from: VoxelCoord) -> Option<VoxelCoord> {
        if from == self.a {
            Some(self.b)
        } else if from == self.b {
            Some(self.a)
        } else {
            None
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConnectionRegistry {
    connections: BTreeMap<ConnectionId, Connection>,
    adjacency: FxHashMap<VoxelCoord, SmallVec<[ConnectionId; 2]>>,
    next_id: u64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bidirectional edge `a <-> b` costing
    /// `manhattan(a, b) * cost_multiplier`. Returns its ID.
    pub fn add(
        &mut self,
        a: VoxelCoord,
        b: VoxelCoord,
        cost_multiplier: f32,
        structure: Option<StructureId>,
    ) -> ConnectionId {
        let id = ConnectionId(self.next_id);
        self.next_id += 1;
        let cost = a.manhattan_distance(b) as f32 * cost_multiplier;
        self.connections.insert(
            id,
            Connection {
                id,
                a,
                b,
                cost,
                structure,
            },
        );
        self.adjacency.entry(a).or_default().push(id);
        if b != a {
            self.adjacency.entry(b).or_default().push(id);
        }
        tracing::debug!(%id, %a, %b, cost, "connection registered");
        id
    }

    /// Revoke a connection. Returns the removed edge, or `None` if the ID is
    /// unknown (already revoked).
    pub fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        let conn = self.connections.remove(&id)?;
        for end in [conn.a, conn.b] {
            if let Some(ids) = self.adjacency.get_mut(&end) {
                ids.retain(|c| *c != id);
                if ids.is_empty() {
                    self.adjacency.remove(&end);
                }
            }
        }
        tracing::debug!(%id, a = %conn.a, b = %conn.b, "connection revoked");
        Some(conn)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    /// Cells reachable from `from` through a connection, with the edge cost.
    pub fn neighbors(&self, from: VoxelCoord) -> SmallVec<[(VoxelCoord, f32); 2]> {
        let mut out = SmallVec::new();
        if let Some(ids) = self.adjacency.get(&from) {
            for id in ids {
                let conn = &self.connections[id];
                if let Some(to) = conn.other_end(from) {
                    out.push((to, conn.cost));
                }
            }
        }
        out
    }

    /// Whether some connection joins `a` and `b` (in either direction).
    pub fn connects(&self, a: VoxelCoord, b: VoxelCoord) -> bool {
        self.neighbors(a).iter().any(|(to, _)| *to == b)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }
}
