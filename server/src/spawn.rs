//! Placement of spawns and apples on free cells.

use log::warn;
use rand::Rng;
use shared::{Direction, Position};
use std::collections::HashSet;

/// Picks a random cell not in `occupied`.
///
/// Tries `grid_size²` random cells, then scans the grid in order. Only a grid
/// with no free cell at all yields an occupied position.
pub fn random_free_cell<R: Rng + ?Sized>(
    rng: &mut R,
    grid_size: i32,
    occupied: &HashSet<Position>,
) -> Position {
    let attempts = (grid_size * grid_size).max(1);
    for _ in 0..attempts {
        let cell = Position::new(rng.gen_range(0..grid_size), rng.gen_range(0..grid_size));
        if !occupied.contains(&cell) {
            return cell;
        }
    }

    for y in 0..grid_size {
        for x in 0..grid_size {
            let cell = Position::new(x, y);
            if !occupied.contains(&cell) {
                return cell;
            }
        }
    }

    warn!(
        "No free cell on a {}x{} grid, placing on an occupied cell",
        grid_size, grid_size
    );
    Position::new(rng.gen_range(0..grid_size), rng.gen_range(0..grid_size))
}

/// Initial heading for a fresh snake: towards the far side of the grid.
pub fn spawn_direction(spawn: Position, grid_size: i32) -> Direction {
    if spawn.x < grid_size / 2 {
        Direction::Right
    } else {
        Direction::Left
    }
}
