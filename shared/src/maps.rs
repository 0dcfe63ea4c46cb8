//! Built-in map layouts.
//!
//! A map only adds features on top of the bare grid: tunnels suspend
//! snake-versus-snake collisions for the cells they cover, teleporters move a
//! head that steps onto one portal to its partner.

use crate::Position;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MapId {
    #[default]
    Classic,
    Tunnels,
    Portals,
}

impl MapId {
    pub const ALL: [MapId; 3] = [MapId::Classic, MapId::Tunnels, MapId::Portals];

    pub fn as_str(&self) -> &'static str {
        match self {
            MapId::Classic => "classic",
            MapId::Tunnels => "tunnels",
            MapId::Portals => "portals",
        }
    }
}

impl fmt::Display for MapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MapId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MapId::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown map '{}'", s.trim()))
    }
}

/// Axis-aligned run of cells, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tunnel {
    pub start: Position,
    pub end: Position,
}

impl Tunnel {
    pub fn horizontal(y: i32, x0: i32, x1: i32) -> Self {
        Self {
            start: Position::new(x0.min(x1), y),
            end: Position::new(x0.max(x1), y),
        }
    }

    pub fn vertical(x: i32, y0: i32, y1: i32) -> Self {
        Self {
            start: Position::new(x, y0.min(y1)),
            end: Position::new(x, y0.max(y1)),
        }
    }

    pub fn contains(&self, p: Position) -> bool {
        let (min_x, max_x) = (self.start.x.min(self.end.x), self.start.x.max(self.end.x));
        let (min_y, max_y) = (self.start.y.min(self.end.y), self.start.y.max(self.end.y));
        (min_x..=max_x).contains(&p.x) && (min_y..=max_y).contains(&p.y)
    }
}

/// A pair of linked portals. Entering either one exits through the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Teleporter {
    pub a: Position,
    pub b: Position,
}

impl Teleporter {
    pub fn exit_for(&self, entry: Position) -> Option<Position> {
        if entry == self.a {
            Some(self.b)
        } else if entry == self.b {
            Some(self.a)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapLayout {
    pub id: MapId,
    pub tunnels: Vec<Tunnel>,
    pub teleporters: Vec<Teleporter>,
}

impl MapLayout {
    pub fn classic() -> Self {
        Self {
            id: MapId::Classic,
            tunnels: Vec::new(),
            teleporters: Vec::new(),
        }
    }

    /// Builds the layout for `id`, scaled to the grid.
    pub fn load(id: MapId, grid_size: i32) -> Self {
        let quarter = grid_size / 4;
        let far = grid_size - 1 - quarter;

        match id {
            MapId::Classic => Self::classic(),
            MapId::Tunnels => Self {
                id,
                tunnels: vec![
                    Tunnel::horizontal(quarter, quarter, far),
                    Tunnel::horizontal(far, quarter, far),
                ],
                teleporters: Vec::new(),
            },
            MapId::Portals => Self {
                id,
                tunnels: Vec::new(),
                teleporters: vec![Teleporter {
                    a: Position::new(2, 2),
                    b: Position::new(grid_size - 3, grid_size - 3),
                }],
            },
        }
    }

    pub fn in_tunnel(&self, p: Position) -> bool {
        self.tunnels.iter().any(|t| t.contains(p))
    }

    /// Where a head that just stepped onto `p` actually ends up.
    pub fn teleport(&self, p: Position) -> Position {
        self.teleporters
            .iter()
            .find_map(|t| t.exit_for(p))
            .unwrap_or(p)
    }

    pub fn is_portal(&self, p: Position) -> bool {
        self.teleporters.iter().any(|t| t.a == p || t.b == p)
    }

    /// Both ends of every teleporter.
    pub fn portal_cells(&self) -> impl Iterator<Item = Position> + '_ {
        self.teleporters.iter().flat_map(|t| [t.a, t.b])
    }
}

impl Default for MapLayout {
    fn default() -> Self {
        Self::classic()
    }
}
