use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{EntityId, Point, Vector, entity::Movable, map::GridMap};

/// Entity id of the agent in every scene.
pub const AGENT_ID: EntityId = 0;
/// Entity id of the package in every scene.
pub const PACKAGE_ID: EntityId = 1;

/// Represents errors raised when a scene cannot be set up from a map.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SceneInitializationError {
    #[error("Map has no agent spawn ('I') tile")]
    MissingAgentSpawn,
    #[error("Map has no package spawn ('P') tile")]
    MissingPackageSpawn,
}

/// What a renderer should draw at a point.
/// Variants are listed in precedence order: agent > package > extraction > wall > floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellKind {
    Agent,
    Package,
    Extraction,
    Wall,
    Floor,
}

/// Represents the outcome of asking the scene to move the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MoveOutcome {
    /// The move was legal and has been applied.
    pub moved: bool,
    /// The package was captured at the start of this move.
    pub captured_now: bool,
}

/// A live episode: one static map, one agent and one package.
///
/// Once captured, the package is owned by the agent and travels with it.
#[derive(Debug, Clone)]
pub struct Scene {
    map: Arc<GridMap>,
    agent_spawn: Point,
    package_spawn: Point,
    agent: Movable,
    /// The package while it still lies on the floor; `None` once carried.
    loose_package: Option<Movable>,
}

impl Scene {
    /// Places the agent and package on their spawn points.
    pub fn new(map: Arc<GridMap>) -> Result<Self, SceneInitializationError> {
        let agent_spawn = map
            .agent_spawn()
            .ok_or(SceneInitializationError::MissingAgentSpawn)?;
        let package_spawn = map
            .package_spawn()
            .ok_or(SceneInitializationError::MissingPackageSpawn)?;

        Ok(Scene {
            map,
            agent_spawn,
            package_spawn,
            agent: Movable::new(AGENT_ID, agent_spawn),
            loose_package: Some(Movable::new(PACKAGE_ID, package_spawn)),
        })
    }

    /// Puts both entities back on their spawn points and drops any capture.
    pub fn reset(&mut self) {
        self.agent = Movable::new(AGENT_ID, self.agent_spawn);
        self.loose_package = Some(Movable::new(PACKAGE_ID, self.package_spawn));
    }

    pub fn map(&self) -> &Arc<GridMap> {
        &self.map
    }

    pub fn agent(&self) -> &Movable {
        &self.agent
    }

    pub fn package(&self) -> &Movable {
        match &self.loose_package {
            Some(package) => package,
            // The package is the only thing the agent ever captures.
            None => &self.agent.captured()[0],
        }
    }

    pub fn agent_position(&self) -> Point {
        self.agent.position()
    }

    pub fn package_position(&self) -> Point {
        self.package().position()
    }

    pub fn is_package_captured(&self) -> bool {
        self.agent.has_captured(PACKAGE_ID)
    }

    /// The package is carried and its whole footprint lies inside the
    /// extraction zone. The agent itself may stand outside the zone.
    pub fn is_goal_achieved(&self) -> bool {
        self.is_package_captured()
            && self
                .package()
                .occupied_area()
                .into_iter()
                .all(|point| self.map.is_within_extraction_area(point))
    }

    /// Attempts to move the agent (and whatever it carries) by `vector`.
    ///
    /// An agent standing beside the package captures it first. The move is then
    /// applied only if every point of the moved footprint is reachable and does
    /// not overlap a package that is still loose. Illegal moves leave the
    /// positions untouched.
    pub fn move_agent(&mut self, vector: Vector) -> MoveOutcome {
        let mut outcome = MoveOutcome::default();

        let agent_position = self.agent.position();
        if let Some(package) = self
            .loose_package
            .take_if(|package| package.is_within_capture_area(agent_position))
        {
            trace!(position = ?package.position(), "package captured");
            outcome.captured_now = self.agent.capture(package);
        }

        if self.is_move_legal(vector) {
            self.agent.move_by(vector);
            outcome.moved = true;
        }
        outcome
    }

    fn is_move_legal(&self, vector: Vector) -> bool {
        let package_captured = self.is_package_captured();
        let package_position = self.package_position();
        self.agent
            .occupied_area_on_movement(vector)
            .into_iter()
            .all(|point| {
                self.map.is_reachable(point) && (package_captured || point != package_position)
            })
    }

    /// Classifies a point for rendering. Points outside the map, or past the
    /// end of a short row, count as walls.
    pub fn classify(&self, point: Point) -> CellKind {
        if point == self.agent.position() {
            CellKind::Agent
        } else if point == self.package_position() {
            CellKind::Package
        } else if self.map.is_within_extraction_area(point) {
            CellKind::Extraction
        } else if self.map.is_reachable(point) {
            CellKind::Floor
        } else {
            CellKind::Wall
        }
    }
}
