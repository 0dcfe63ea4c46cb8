//! Movement and collision rules.
//!
//! The engine applies these authoritatively and the client predictor applies
//! them locally, so both sides agree on every step as long as they see the same
//! inputs. Segments are always head-first.

use crate::{Collision, Direction, MapLayout, Position};

/// Whether a snake heading `current` may turn to `requested`.
///
/// Single-cell snakes may reverse; longer snakes would run into their own neck.
pub fn can_turn(current: Direction, requested: Direction, length: usize) -> bool {
    length <= 1 || !current.is_opposite(requested)
}

/// Next head cell when moving from `head` towards `direction`, after portals.
///
/// The result may lie outside the grid; callers check walls separately.
pub fn next_head(head: Position, direction: Direction, layout: &MapLayout) -> Position {
    layout.teleport(head.step(direction))
}

/// Moves a snake one cell. The tail is kept when `grow` is set.
pub fn advance(
    segments: &[Position],
    direction: Direction,
    grow: bool,
    layout: &MapLayout,
) -> Vec<Position> {
    let Some(&head) = segments.first() else {
        return Vec::new();
    };

    let mut moved = Vec::with_capacity(segments.len() + 1);
    moved.push(next_head(head, direction, layout));
    moved.extend_from_slice(segments);
    if !grow {
        moved.pop();
    }
    moved
}

pub fn hits_wall(head: Position, grid_size: i32) -> bool {
    !head.in_bounds(grid_size)
}

/// True when the head shares a cell with any other segment of the same snake.
pub fn hits_self(segments: &[Position]) -> bool {
    match segments.split_first() {
        Some((head, body)) => body.contains(head),
        None => false,
    }
}

/// Id of the first other snake whose body contains `head`.
///
/// Cells covered by a tunnel never count as a hit.
pub fn hits_other<'a, I>(head: Position, others: I, layout: &MapLayout) -> Option<u32>
where
    I: IntoIterator<Item = (u32, &'a [Position])>,
{
    if layout.in_tunnel(head) {
        return None;
    }
    others
        .into_iter()
        .find(|(_, segments)| segments.contains(&head))
        .map(|(id, _)| id)
}

/// Classifies a freshly moved snake, checking wall, then self, then other snakes.
pub fn detect_collision<'a, I>(
    segments: &[Position],
    others: I,
    grid_size: i32,
    layout: &MapLayout,
) -> Option<Collision>
where
    I: IntoIterator<Item = (u32, &'a [Position])>,
{
    let head = *segments.first()?;

    if segments.iter().any(|p| hits_wall(*p, grid_size)) {
        return Some(Collision::wall());
    }
    if hits_self(segments) {
        return Some(Collision::with_self());
    }
    hits_other(head, others, layout).map(Collision::with_snake)
}

/// Number of indices at which two segment lists disagree, counting length differences.
pub fn segment_difference(a: &[Position], b: &[Position]) -> usize {
    let longest = a.len().max(b.len());
    (0..longest).filter(|&i| a.get(i) != b.get(i)).count()
}
