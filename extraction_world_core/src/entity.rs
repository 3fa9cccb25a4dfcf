//! Positional entities and the capture relationship between them.
//!
//! The agent and the package share one type: a [`Movable`] that owns the
//! entities it has captured. Moving a movable moves everything it carries.

use serde::{Deserialize, Serialize};

use crate::{EntityId, Point, Vector};

/// An entity on the grid together with everything it has captured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movable {
    id: EntityId,
    position: Point,
    captured: Vec<Movable>,
}

impl Movable {
    /// Creates an entity at `position` that carries nothing.
    ///
    /// # Arguments
    ///
    /// * `id` - Identity used to keep captures idempotent.
    /// * `position` - Reference point on the grid.
    pub fn new(id: EntityId, position: Point) -> Self {
        Self {
            id,
            position,
            captured: Vec::new(),
        }
    }

    /// Reference point of this entity alone.
    pub fn position(&self) -> Point {
        self.position
    }

    /// Captured entities, in capture order.
    pub fn captured(&self) -> &[Movable] {
        &self.captured
    }

    /// True if `id` is among the directly captured entities.
    pub fn has_captured(&self, id: EntityId) -> bool {
        self.captured.iter().any(|entity| entity.id == id)
    }

    /// Every point covered by this entity and, recursively, by what it carries.
    /// Self first, then captured entities in capture order.
    pub fn occupied_area(&self) -> Vec<Point> {
        self.occupied_area_on_movement(Vector::new(0, 0))
    }

    /// The occupied area as it would be after moving by `vector`.
    pub fn occupied_area_on_movement(&self, vector: Vector) -> Vec<Point> {
        let mut area = Vec::with_capacity(1 + self.captured.len());
        self.collect_area(vector, &mut area);
        area
    }

    fn collect_area(&self, vector: Vector, area: &mut Vec<Point>) {
        area.push(self.position + vector);
        for entity in &self.captured {
            entity.collect_area(vector, area);
        }
    }

    /// Shifts this entity and everything it carries. No legality checks;
    /// callers validate against the map first.
    pub fn move_by(&mut self, vector: Vector) {
        self.position = self.position + vector;
        for entity in &mut self.captured {
            entity.move_by(vector);
        }
    }

    /// Takes ownership of `entity`. Capturing an entity that is already carried,
    /// or capturing oneself, changes nothing.
    ///
    /// Returns true if the entity was newly captured.
    pub fn capture(&mut self, entity: Movable) -> bool {
        if entity.id == self.id || self.has_captured(entity.id) {
            return false;
        }
        self.captured.push(entity);
        true
    }

    /// Points from which this entity can be grabbed: directly east and west.
    pub fn capture_area(&self) -> [Point; 2] {
        [
            self.position + Vector::new(1, 0),
            self.position + Vector::new(-1, 0),
        ]
    }

    pub fn is_within_capture_area(&self, point: Point) -> bool {
        self.capture_area().contains(&point)
    }
}
