// Collision queries used by recovery planning.
//
// `CollisionQuery` is the narrow raycast capability the recovery planner
// queries the world through. The planner treats it as an opaque oracle, so a
// host engine can plug in its own physics; `GridCollider` is the built-in
// implementation that marches a ray through the voxel grid.
//
// `GridCollider::cast` is a 3D DDA (Amanatides & Woo): it steps from voxel to
// voxel along the ray, testing each cell against the mask, and stops at the
// first hit or once the ray has travelled `max_distance`. Cells are centred
// on integer coordinates, so the ray origin is shifted by +0.5 before the
// usual floor-based traversal. A ray that starts inside a matching cell hits
// immediately at distance 0 with a zero normal.
//
// See also: `recovery.rs` for the casts, `grid.rs` for the cells being
// tested.

use crate::grid::VoxelGrid;
use crate::types::{CellKind, VoxelCoord, WorldPos};
use serde::{Deserialize, Serialize};
use std::ops::BitOr;

/// Which cell classifications a ray collides with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollisionMask(pub u8);

impl CollisionMask {
    pub const NONE: Self = Self(0);
    /// `Solid` and `Road`.
    pub const TERRAIN: Self = Self(1 << 0);
    /// `TemporaryObstacle`.
    pub const OBSTACLES: Self = Self(1 << 1);
    pub const ALL: Self = Self(Self::TERRAIN.0 | Self::OBSTACLES.0);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn matches(self, kind: CellKind) -> bool {
        match kind {
            CellKind::Empty => false,
            CellKind::Solid | CellKind::Road => self.contains(Self::TERRAIN),
            CellKind::TemporaryObstacle => self.contains(Self::OBSTACLES),
        }
    }
}

impl BitOr for CollisionMask {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RayHit {
    /// Where the ray entered the hit cell.
    pub point: WorldPos,
    /// Outward face normal of the entered face (zero when the ray started
    /// inside the cell).
    pub normal: WorldPos,
    /// The cell that was hit.
    pub cell: VoxelCoord,
    /// Distance along the ray from the origin.
    pub distance: f32,
}

pub trait CollisionQuery {
    /// First cell matching `mask` along the ray, within `max_distance`.
    fn cast(
        &self,
        origin: WorldPos,
        direction: WorldPos,
        max_distance: f32,
        mask: CollisionMask,
    ) -> Option<RayHit>;
}

/// Voxel-grid raycaster.
#[derive(Clone, Copy)]
pub struct GridCollider<'a> {
    grid: &'a VoxelGrid,
}

impl<'a> GridCollider<'a> {
    pub fn new(grid: &'a VoxelGrid) -> Self {
        Self { grid }
    }

    fn hits(&self, voxel: [i32; 3], mask: CollisionMask) -> bool {
        self.grid
            .kind(VoxelCoord::new(voxel[0], voxel[1], voxel[2]))
            .is_some_and(|kind| mask.matches(kind))
    }
}

impl CollisionQuery for GridCollider<'_> {
    fn cast(
        &self,
        origin: WorldPos,
        direction: WorldPos,
        max_distance: f32,
        mask: CollisionMask,
    ) -> Option<RayHit> {
        let dir = direction.normalized().as_array();
        if dir == [0.0; 3] || max_distance < 0.0 {
            return None;
        }
        // Shift so that cell boundaries fall on integers.
        let from = (origin + WorldPos::new(0.5, 0.5, 0.5)).as_array();

        let mut voxel = [
            from[0].floor() as i32,
            from[1].floor() as i32,
            from[2].floor() as i32,
        ];

        if self.hits(voxel, mask) {
            return Some(RayHit {
                point: origin,
                normal: WorldPos::ZERO,
                cell: VoxelCoord::new(voxel[0], voxel[1], voxel[2]),
                distance: 0.0,
            });
        }

        // Step direction (+1 or -1) and tMax/tDelta for each axis.
        let mut step = [0i32; 3];
        let mut t_max = [f32::INFINITY; 3];
        let mut t_delta = [f32::INFINITY; 3];
        for axis in 0..3 {
            if dir[axis] > 0.0 {
                step[axis] = 1;
                t_delta[axis] = 1.0 / dir[axis];
                t_max[axis] = ((voxel[axis] as f32 + 1.0) - from[axis]) / dir[axis];
            } else if dir[axis] < 0.0 {
                step[axis] = -1;
                t_delta[axis] = 1.0 / (-dir[axis]);
                t_max[axis] = (from[axis] - voxel[axis] as f32) / (-dir[axis]);
            }
            // dir[axis] == 0: the axis never advances.
        }

        loop {
            let axis = if t_max[0] <= t_max[1] && t_max[0] <= t_max[2] {
                0
            } else if t_max[1] <= t_max[2] {
                1
            } else {
                2
            };
            let t = t_max[axis];
            if t > max_distance {
                return None;
            }
            voxel[axis] += step[axis];
            t_max[axis] += t_delta[axis];

            if self.hits(voxel, mask) {
                let mut normal = [0.0; 3];
                normal[axis] = -step[axis] as f32;
                return Some(RayHit {
                    point: origin + WorldPos::new(dir[0], dir[1], dir[2]) * t,
                    normal: WorldPos::new(normal[0], normal[1], normal[2]),
                    cell: VoxelCoord::new(voxel[0], voxel[1], voxel[2]),
                    distance: t,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> VoxelGrid {
        let mut grid = VoxelGrid::new(VoxelCoord::new(-8, -1, -8), 16, 16, 16);
        grid.fill_box(
            VoxelCoord::new(-8, -1, -8),
            VoxelCoord::new(7, -1, 7),
            CellKind::Solid,
        );
        grid
    }

    #[test]
    fn cast_down_hits_floor() {
        let grid = grid();
        let collider = GridCollider::new(&grid);
        let hit = collider
            .cast(
                WorldPos::new(0.0, 5.0, 0.0),
                WorldPos::DOWN,
                20.0,
                CollisionMask::ALL,
            )
            .unwrap();
        assert_eq!(hit.cell, VoxelCoord::new(0, -1, 0));
        assert_eq!(hit.normal, WorldPos::UP);
        // Floor top face is at y = -0.5.
        assert!((hit.distance - 5.5).abs() < 1e-5);
        assert!((hit.point.y + 0.5).abs() < 1e-5);
    }

    #[test]
    fn cast_forward_hits_wall_face() {
        let mut grid = grid();
        grid.set_cell(VoxelCoord::new(3, 0, 0), CellKind::Solid);
        let collider = GridCollider::new(&grid);
        let hit = collider
            .cast(
                WorldPos::new(0.0, 0.0, 0.0),
                WorldPos::new(1.0, 0.0, 0.0),
                5.0,
                CollisionMask::ALL,
            )
            .unwrap();
        assert_eq!(hit.cell, VoxelCoord::new(3, 0, 0));
        assert_eq!(hit.normal, WorldPos::new(-1.0, 0.0, 0.0));
        assert!((hit.distance - 2.5).abs() < 1e-5);
    }

    #[test]
    fn cast_respects_max_distance() {
        let mut grid = grid();
        grid.set_cell(VoxelCoord::new(5, 0, 0), CellKind::Solid);
        let collider = GridCollider::new(&grid);
        let hit = collider.cast(
            WorldPos::new(0.0, 0.0, 0.0),
            WorldPos::new(1.0, 0.0, 0.0),
            2.5,
            CollisionMask::ALL,
        );
        assert!(hit.is_none());
    }

    #[test]
    fn cast_from_inside_solid_hits_at_origin() {
        let grid = grid();
        let collider = GridCollider::new(&grid);
        let origin = WorldPos::new(1.0, -1.0, 1.0);
        let hit = collider
            .cast(origin, WorldPos::UP, 10.0, CollisionMask::ALL)
            .unwrap();
        assert_eq!(hit.distance, 0.0);
        assert_eq!(hit.point, origin);
        assert_eq!(hit.cell, VoxelCoord::new(1, -1, 1));
    }

    #[test]
    fn mask_filters_obstacles() {
        let mut grid = grid();
        grid.set_cell(VoxelCoord::new(2, 0, 0), CellKind::TemporaryObstacle);
        let collider = GridCollider::new(&grid);
        let origin = WorldPos::new(0.0, 0.0, 0.0);
        let east = WorldPos::new(1.0, 0.0, 0.0);
        let terrain = collider.cast(origin, east, 5.0, CollisionMask::TERRAIN);
        assert!(terrain.is_none());
        let obstacle = collider.cast(origin, east, 5.0, CollisionMask::OBSTACLES);
        assert_eq!(obstacle.unwrap().cell, VoxelCoord::new(2, 0, 0));
    }

    #[test]
    fn zero_direction_never_hits() {
        let grid = grid();
        let collider = GridCollider::new(&grid);
        let origin = WorldPos::new(0.0, 0.0, 0.0);
        let hit = collider.cast(origin, WorldPos::ZERO, 10.0, CollisionMask::ALL);
        assert!(hit.is_none());
    }
}
