// Core types shared across the simulation.
//
// Defines grid coordinates (`VoxelCoord`), continuous world positions
// (`WorldPos`), strongly-typed entity identifiers, and the small enums that
// classify cells, jobs, structures, and items. All types derive `Serialize`
// and `Deserialize` so configs and event logs can be dumped as JSON.
//
// World-space convention: cell `(x, y, z)` is centred on the world point
// `(x, y, z)` and spans ±0.5 on every axis. An agent's position is the centre
// of the cell it stands in, so snapping a position to its cell is a plain
// per-component round.
//
// **Critical constraint: determinism.** Entity IDs are sequential integers
// handed out by their owning registry, never random. Use `BTreeMap` keyed by
// these IDs wherever iteration order is observable.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Mul, Sub};

// ---------------------------------------------------------------------------
// Spatial types
// ---------------------------------------------------------------------------

/// The four horizontal step directions, in the fixed order the grid and
/// pathfinder expand them: +X, -X, +Z, -Z.
pub const CARDINALS: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

/// A cell position in the 3D voxel grid. Each component is in voxel units.
///
/// - X: east  (positive) / west  (negative)
/// - Y: up    (positive) / down  (negative)
/// - Z: south (positive) / north (negative)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoxelCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl VoxelCoord {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Manhattan distance between two coordinates.
    pub fn manhattan_distance(self, other: Self) -> u32 {
        ((self.x - other.x).unsigned_abs())
            + ((self.y - other.y).unsigned_abs())
            + ((self.z - other.z).unsigned_abs())
    }

    pub const fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    pub const fn up(self) -> Self {
        self.offset(0, 1, 0)
    }

    pub const fn down(self) -> Self {
        self.offset(0, -1, 0)
    }

    /// World-space centre of this cell.
    pub fn center(self) -> WorldPos {
        WorldPos::new(self.x as f32, self.y as f32, self.z as f32)
    }

    /// The cell containing a world position.
    pub fn from_world(pos: WorldPos) -> Self {
        Self::new(
            pos.x.round() as i32,
            pos.y.round() as i32,
            pos.z.round() as i32,
        )
    }
}

impl fmt::Display for VoxelCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// A continuous world-space position (or direction), in voxel units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldPos {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl WorldPos {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);
    pub const UP: Self = Self::new(0.0, 1.0, 0.0);
    pub const DOWN: Self = Self::new(0.0, -1.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn distance(self, other: Self) -> f32 {
        (other - self).length()
    }

    /// Unit vector in the same direction, or `ZERO` for a zero-length vector.
    pub fn normalized(self) -> Self {
        let len = self.length();
        if len <= f32::EPSILON {
            Self::ZERO
        } else {
            self * (1.0 / len)
        }
    }

    pub fn as_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

impl Add for WorldPos {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for WorldPos {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for WorldPos {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl fmt::Display for WorldPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

// ---------------------------------------------------------------------------
// Strongly-typed entity ID wrappers
// ---------------------------------------------------------------------------

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

entity_id!(/// Unique identifier for a worker agent.
AgentId);
entity_id!(/// Unique identifier for a posted job. Lower IDs were posted earlier.
JobId);
entity_id!(/// Unique identifier for a recovery structure (ladder, scaffold, ...).
StructureId);
entity_id!(/// Unique identifier for a non-geometric pathfinding connection.
ConnectionId);
entity_id!(/// Handle returned by `EventBus::subscribe`.
SubscriptionId);
entity_id!(/// Opaque reference to an entity owned by an outside collaborator
/// (a tree, a construction site). The core never dereferences it.
EntityRef);

// ---------------------------------------------------------------------------
// Simulation enums
// ---------------------------------------------------------------------------

/// Navigation classification of a single grid cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellKind {
    #[default]
    Empty,
    Solid,
    /// Solid ground that agents cross faster.
    Road,
    /// Blocks movement like `Solid`, but placed by transient gameplay
    /// (a dropped crate, a cart) rather than terrain.
    TemporaryObstacle,
}

impl CellKind {
    pub fn is_empty(self) -> bool {
        self == Self::Empty
    }

    /// Anything non-empty can be stood on.
    pub fn supports_stance(self) -> bool {
        !self.is_empty()
    }
}

/// The type of work a job represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JobKind {
    /// Walk to the target. Completes on arrival.
    Move,
    /// Fell a tree / deplete a resource node.
    Chop,
    /// Place blocks at a construction site.
    Build,
    /// Carry goods to the target.
    Haul,
    /// Turn raw goods into finished ones at a workstation.
    Craft,
}

/// What a recovery structure was built for. Affects bookkeeping only; every
/// kind is a climbable column plus one ladder connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StructureKind {
    Standard,
    /// Built automatically to unstick an agent.
    Emergency,
    Siege,
    /// Temporary access for a construction site; cleared when the site ends.
    Scaffold,
}

/// Goods tracked by the `Inventory` collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ItemKind {
    Wood,
    Stone,
    Plank,
    Food,
}
