use std::ops::Add;

use serde::{Deserialize, Serialize};

pub mod config;
pub mod entity;
pub mod learning;
pub mod map;
pub mod q_table;
pub mod scene;

/// Unique identifier for movable entities (agent, package).
pub type EntityId = usize;

/// Represents a 2D coordinate. x grows rightward, y grows downward.
///
/// Coordinates are signed so that probes just outside the map, such as
/// `(-1, 0)`, can be expressed and answered as unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Point { x, y }
    }
}

impl Add<Vector> for Point {
    type Output = Point;

    fn add(self, vector: Vector) -> Point {
        Point {
            x: self.x + vector.dx,
            y: self.y + vector.dy,
        }
    }
}

/// A single step on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Vector {
    pub dx: i32,
    pub dy: i32,
}

impl Vector {
    pub const fn new(dx: i32, dy: i32) -> Self {
        Vector { dx, dy }
    }
}

/// The four moves available to the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Action {
    North,
    South,
    East,
    West,
}

impl Action {
    /// Every action, in a fixed order. Index into this with [`Action::index`].
    pub const ALL: [Action; 4] = [Action::North, Action::South, Action::East, Action::West];

    /// Unit displacement of this move.
    pub const fn vector(self) -> Vector {
        match self {
            Action::North => Vector::new(0, -1),
            Action::South => Vector::new(0, 1),
            Action::East => Vector::new(1, 0),
            Action::West => Vector::new(-1, 0),
        }
    }

    /// Position of this action in [`Action::ALL`].
    pub const fn index(self) -> usize {
        match self {
            Action::North => 0,
            Action::South => 1,
            Action::East => 2,
            Action::West => 3,
        }
    }

    /// Arrow glyph used by renderers for policy overlays.
    pub const fn arrow(self) -> char {
        match self {
            Action::North => '↑',
            Action::South => '↓',
            Action::East => '→',
            Action::West => '←',
        }
    }
}
