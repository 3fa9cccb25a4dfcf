//! Tabular Q-learning over a [`Scene`].
//!
//! The engine owns the scene and the value table. Each cycle it reads the
//! agent's position as the state, picks an epsilon-greedy action, asks the
//! scene to apply it and updates the table from the observed transition.

use std::sync::Arc;

use rand::{Rng, SeedableRng, rngs::StdRng, seq::IndexedRandom};
use tracing::{debug, info, trace};

use crate::{
    Action, Point,
    config::{ConfigError, LearningParameters},
    map::GridMap,
    q_table::QTable,
    scene::{Scene, SceneInitializationError},
};

/// Represents errors that prevent an engine from being built.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Scene(#[from] SceneInitializationError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// What a single transition amounted to, from the learner's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RewardEvent {
    /// The agent did not move.
    InvalidMovement,
    /// The carried package lies in the extraction zone.
    PackageExtraction,
    /// The agent now stands beside a package it has not yet captured.
    PackageCapture,
    /// An ordinary step.
    Movement,
}

impl RewardEvent {
    /// Classifies a transition. Rules are checked in order and the first match wins.
    ///
    /// `scene` is the scene after the move; `was_captured` is whether the package
    /// was captured before it.
    pub fn classify(
        old_state: Point,
        new_state: Point,
        was_captured: bool,
        scene: &Scene,
    ) -> Self {
        if new_state == old_state {
            RewardEvent::InvalidMovement
        } else if scene.is_package_captured()
            && scene
                .map()
                .is_within_extraction_area(scene.package_position())
        {
            RewardEvent::PackageExtraction
        } else if !was_captured && scene.package().is_within_capture_area(new_state) {
            RewardEvent::PackageCapture
        } else {
            RewardEvent::Movement
        }
    }

    pub fn reward(self, parameters: &LearningParameters) -> f64 {
        match self {
            RewardEvent::InvalidMovement => parameters.punishment_for_invalid_movement,
            RewardEvent::PackageExtraction => parameters.reward_for_package_extraction,
            RewardEvent::PackageCapture => parameters.reward_for_package_capture,
            RewardEvent::Movement => parameters.punishment_for_movement,
        }
    }
}

/// One cycle of an episode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub old_state: Point,
    pub action: Action,
    pub new_state: Point,
    pub event: RewardEvent,
    pub reward: f64,
    /// Table value for (old_state, action) after the update.
    pub value: f64,
    pub goal_achieved: bool,
}

/// Summary of one finished episode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeReport {
    /// Zero-based index of the episode within the engine's lifetime.
    pub episode: usize,
    /// Number of actions taken before the goal was reached.
    pub cycles: usize,
    pub total_reward: f64,
}

/// Per-episode results of a training run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingReport {
    pub episodes: Vec<EpisodeReport>,
}

impl TrainingReport {
    pub fn total_cycles(&self) -> usize {
        self.episodes.iter().map(|e| e.cycles).sum()
    }

    pub fn best_cycles(&self) -> Option<usize> {
        self.episodes.iter().map(|e| e.cycles).min()
    }

    pub fn last(&self) -> Option<&EpisodeReport> {
        self.episodes.last()
    }

    /// Mean cycle count over the last `window` episodes (fewer if the run was shorter).
    pub fn mean_cycles_of_last(&self, window: usize) -> Option<f64> {
        let start = self.episodes.len().saturating_sub(window);
        let recent = &self.episodes[start..];
        if recent.is_empty() {
            return None;
        }
        let sum: usize = recent.iter().map(|e| e.cycles).sum();
        Some(sum as f64 / recent.len() as f64)
    }
}

/// Epsilon-greedy tabular Q-learner driving a single scene.
#[derive(Debug)]
pub struct LearningEngine {
    parameters: LearningParameters,
    scene: Scene,
    table: QTable,
    rng: StdRng,
    episodes_run: usize,
}

impl LearningEngine {
    /// Creates an engine whose random draws are seeded from the operating system.
    pub fn new(map: Arc<GridMap>, parameters: LearningParameters) -> Result<Self, EngineError> {
        Self::with_rng(map, parameters, StdRng::from_os_rng())
    }

    /// Creates an engine with reproducible random draws.
    pub fn with_seed(
        map: Arc<GridMap>,
        parameters: LearningParameters,
        seed: u64,
    ) -> Result<Self, EngineError> {
        Self::with_rng(map, parameters, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        map: Arc<GridMap>,
        parameters: LearningParameters,
        rng: StdRng,
    ) -> Result<Self, EngineError> {
        parameters.validate()?;
        let table = QTable::with_states(map.reachable_points());
        let scene = Scene::new(map)?;
        Ok(Self {
            parameters,
            scene,
            table,
            rng,
            episodes_run: 0,
        })
    }

    pub fn parameters(&self) -> &LearningParameters {
        &self.parameters
    }

    /// Replaces the parameters for subsequent cycles. The table is kept.
    pub fn set_parameters(&mut self, parameters: LearningParameters) -> Result<(), ConfigError> {
        parameters.validate()?;
        self.parameters = parameters;
        Ok(())
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn table(&self) -> &QTable {
        &self.table
    }

    pub fn episodes_run(&self) -> usize {
        self.episodes_run
    }

    /// The current state: the agent's position.
    pub fn state(&self) -> Point {
        self.scene.agent_position()
    }

    /// Starts a fresh episode on the same map. The table is untouched.
    pub fn reset(&mut self) {
        self.scene.reset();
    }

    /// Epsilon-greedy choice for the current state. Ties between maximal
    /// actions are broken uniformly at random.
    pub fn choose_action(&mut self) -> Action {
        let explore = self.rng.random_bool(self.parameters.exploration_rate);
        if !explore {
            let best = self.table.best_actions(self.state());
            if let Some(action) = best.choose(&mut self.rng) {
                return *action;
            }
        }
        *Action::ALL
            .choose(&mut self.rng)
            .unwrap_or(&Action::North)
    }

    /// A deterministic policy readout for `state`: the first maximal action, or
    /// `None` while all four actions are still valued equally.
    pub fn greedy_action(&self, state: Point) -> Option<Action> {
        let best = self.table.best_actions(state);
        if best.len() == Action::ALL.len() {
            None
        } else {
            best.first().copied()
        }
    }

    /// Runs one cycle: choose, act, observe, learn.
    pub fn step(&mut self) -> Transition {
        self.advance(true)
    }

    /// Runs one cycle without updating the table, for replaying what has been
    /// learned. `Transition::value` is the table's current value for the pair.
    pub fn act(&mut self) -> Transition {
        self.advance(false)
    }

    fn advance(&mut self, learn: bool) -> Transition {
        let old_state = self.state();
        let was_captured = self.scene.is_package_captured();
        let action = self.choose_action();

        self.scene.move_agent(action.vector());

        let new_state = self.state();
        let event = RewardEvent::classify(old_state, new_state, was_captured, &self.scene);
        let reward = event.reward(&self.parameters);
        let value = if learn {
            self.table.update(
                old_state,
                action,
                reward,
                new_state,
                self.parameters.learning_rate,
                self.parameters.decay_rate,
            )
        } else {
            self.table.get(old_state, action)
        };
        let goal_achieved = self.scene.is_goal_achieved();

        trace!(
            ?old_state,
            ?action,
            ?new_state,
            ?event,
            reward,
            value,
            learn,
            "transition"
        );

        Transition {
            old_state,
            action,
            new_state,
            event,
            reward,
            value,
            goal_achieved,
        }
    }

    /// Resets the scene and steps until the goal is achieved.
    ///
    /// There is no cycle limit: a map on which the goal cannot be reached keeps
    /// this running.
    pub fn run_episode(&mut self) -> EpisodeReport {
        self.reset();
        let mut report = EpisodeReport {
            episode: self.episodes_run,
            cycles: 0,
            total_reward: 0.0,
        };
        while !self.scene.is_goal_achieved() {
            let transition = self.step();
            report.cycles += 1;
            report.total_reward += transition.reward;
        }
        self.episodes_run += 1;

        debug!(
            episode = report.episode,
            cycles = report.cycles,
            total_reward = report.total_reward,
            "episode finished"
        );
        report
    }

    /// Runs `episodes` episodes back to back, carrying the table between them.
    pub fn train(&mut self, episodes: usize) -> TrainingReport {
        let mut report = TrainingReport {
            episodes: Vec::with_capacity(episodes),
        };
        for _ in 0..episodes {
            report.episodes.push(self.run_episode());
        }

        info!(
            episodes,
            total_cycles = report.total_cycles(),
            best_cycles = ?report.best_cycles(),
            last_cycles = ?report.last().map(|e| e.cycles),
            "training finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The extraction tile has floor on both sides, so the package can be
    /// delivered whichever side it was captured from.
    const OPEN_YARD: &str = "I.....\n......\n..P.E.";

    fn map(source: &str) -> Arc<GridMap> {
        Arc::new(source.parse().unwrap())
    }

    fn greedy() -> LearningParameters {
        LearningParameters {
            exploration_rate: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn constructor_rejects_invalid_parameters() {
        let params = LearningParameters {
            learning_rate: -0.5,
            ..Default::default()
        };
        let err = LearningEngine::with_seed(map("IP.\n..E"), params, 1).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn constructor_rejects_maps_without_spawns() {
        let err = LearningEngine::with_seed(map("I..\n..E"), greedy(), 1).unwrap_err();
        assert_eq!(
            err,
            EngineError::Scene(SceneInitializationError::MissingPackageSpawn)
        );
    }

    #[test]
    fn table_is_presized_to_reachable_states() {
        let engine = LearningEngine::with_seed(map("I#P\n..E"), greedy(), 1).unwrap();
        assert_eq!(engine.table().len(), 5 * 4);
    }

    #[test]
    fn greedy_choice_picks_the_maximum() {
        let mut engine = LearningEngine::with_seed(map("I..\n.P.\n..E"), greedy(), 7).unwrap();
        let state = engine.state();
        engine.table.set(state, Action::South, 0.3);
        for _ in 0..50 {
            assert_eq!(engine.choose_action(), Action::South);
        }
    }

    #[test]
    fn greedy_ties_are_broken_randomly() {
        let mut engine = LearningEngine::with_seed(map("I..\n.P.\n..E"), greedy(), 7).unwrap();
        let state = engine.state();
        engine.table.set(state, Action::South, 0.3);
        engine.table.set(state, Action::East, 0.3);
        let mut seen_south = false;
        let mut seen_east = false;
        for _ in 0..200 {
            match engine.choose_action() {
                Action::South => seen_south = true,
                Action::East => seen_east = true,
                other => panic!("non-maximal action {other:?}"),
            }
        }
        assert!(seen_south && seen_east);
    }

    #[test]
    fn full_exploration_ignores_the_table() {
        let params = LearningParameters {
            exploration_rate: 1.0,
            ..Default::default()
        };
        let mut engine = LearningEngine::with_seed(map("I..\n.P.\n..E"), params, 3).unwrap();
        let state = engine.state();
        engine.table.set(state, Action::South, 10.0);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..400 {
            seen.insert(engine.choose_action());
        }
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn greedy_action_is_none_until_preferences_exist() {
        let mut engine = LearningEngine::with_seed(map("I..\n.P.\n..E"), greedy(), 7).unwrap();
        let state = engine.state();
        assert_eq!(engine.greedy_action(state), None);
        engine.table.set(state, Action::West, -1.0);
        assert_eq!(engine.greedy_action(state), Some(Action::North));
    }

    #[test]
    fn invalid_move_is_punished_and_learned() {
        // Only East and South are open from the spawn; make North the greedy pick.
        let mut engine = LearningEngine::with_seed(map("I..\n.P.\n..E"), greedy(), 7).unwrap();
        let spawn = engine.state();
        engine.table.set(spawn, Action::North, 0.5);

        let transition = engine.step();

        assert_eq!(transition.action, Action::North);
        assert_eq!(transition.new_state, spawn);
        assert_eq!(transition.event, RewardEvent::InvalidMovement);
        assert_eq!(transition.reward, -1.0);
        let expected = 0.5 + 0.01 * (-1.0 + 0.9 * 0.5 - 0.5);
        assert_eq!(transition.value, expected);
        assert_eq!(engine.table().get(spawn, Action::North), expected);
    }

    #[test]
    fn acting_leaves_the_table_untouched() {
        let mut engine = LearningEngine::with_seed(map("I..\n.P.\n..E"), greedy(), 7).unwrap();
        let spawn = engine.state();
        engine.table.set(spawn, Action::North, 0.5);
        let before = engine.table().clone();

        let transition = engine.act();

        assert_eq!(transition.action, Action::North);
        assert_eq!(transition.event, RewardEvent::InvalidMovement);
        assert_eq!(transition.reward, -1.0);
        assert_eq!(transition.value, 0.5);
        assert_eq!(engine.table(), &before);

        // The same cycle through `step` does learn.
        engine.step();
        assert_ne!(engine.table(), &before);
    }

    #[test]
    fn reward_rules_apply_in_order() {
        let parameters = LearningParameters::default();
        let mut scene = Scene::new(map("I...\n..P.\n...E")).unwrap();
        let start = scene.agent_position();

        // Illegal: off the map.
        scene.move_agent(Action::North.vector());
        let event = RewardEvent::classify(start, scene.agent_position(), false, &scene);
        assert_eq!(event, RewardEvent::InvalidMovement);
        assert_eq!(event.reward(&parameters), -1.0);

        // Ordinary step.
        scene.move_agent(Action::East.vector());
        let event = RewardEvent::classify(start, scene.agent_position(), false, &scene);
        assert_eq!(event, RewardEvent::Movement);
        assert_eq!(event.reward(&parameters), -0.1);

        // Step next to the loose package.
        let before = scene.agent_position();
        scene.move_agent(Action::South.vector());
        let event = RewardEvent::classify(before, scene.agent_position(), false, &scene);
        assert_eq!(event, RewardEvent::PackageCapture);
        assert_eq!(event.reward(&parameters), 1.0);

        // Capture and carry; not yet in the zone. The package was loose before
        // this step and the agent still stands beside it.
        let before = scene.agent_position();
        scene.move_agent(Action::South.vector());
        assert!(scene.is_package_captured());
        let event = RewardEvent::classify(before, scene.agent_position(), false, &scene);
        assert_eq!(event, RewardEvent::PackageCapture);

        // Once carried, ordinary steps cost again.
        let event = RewardEvent::classify(start, scene.agent_position(), true, &scene);
        assert_eq!(event, RewardEvent::Movement);

        // Deliver.
        let before = scene.agent_position();
        scene.move_agent(Action::East.vector());
        let event = RewardEvent::classify(before, scene.agent_position(), true, &scene);
        assert_eq!(event, RewardEvent::PackageExtraction);
        assert!(scene.is_goal_achieved());
    }

    #[test]
    fn extraction_outranks_capture_on_the_same_step() {
        // Moving north both captures the package and lifts it into the zone.
        let mut engine = LearningEngine::with_seed(map("EE.\nIP."), greedy(), 11).unwrap();
        let spawn = engine.state();
        engine.table.set(spawn, Action::North, 1.0);

        let transition = engine.step();

        assert_eq!(transition.action, Action::North);
        assert_eq!(transition.event, RewardEvent::PackageExtraction);
        assert_eq!(transition.reward, 1.0);
        assert!(transition.goal_achieved);
        assert!(engine.scene().is_goal_achieved());
    }

    #[test]
    fn episode_counts_cycles_until_goal() {
        let mut engine =
            LearningEngine::with_seed(map(OPEN_YARD), LearningParameters::default(), 5)
                .unwrap();
        let report = engine.run_episode();
        assert_eq!(report.episode, 0);
        assert!(report.cycles >= 5);
        assert!(engine.scene().is_goal_achieved());
        assert_eq!(engine.episodes_run(), 1);
    }

    #[test]
    fn table_survives_across_episodes() {
        let mut engine =
            LearningEngine::with_seed(map(OPEN_YARD), LearningParameters::default(), 5)
                .unwrap();
        engine.run_episode();
        let after_first = engine.table().clone();
        assert_ne!(after_first, QTable::with_states(engine.scene().map().reachable_points()));
        engine.run_episode();
        assert_ne!(engine.table(), &after_first);
        assert_eq!(engine.table().len(), after_first.len());
    }

    #[test]
    fn seeded_training_is_reproducible() {
        let run = || {
            let mut engine = LearningEngine::with_seed(
                map(OPEN_YARD),
                LearningParameters::default(),
                99,
            )
            .unwrap();
            engine
                .train(20)
                .episodes
                .iter()
                .map(|e| e.cycles)
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn training_report_summaries() {
        let report = TrainingReport {
            episodes: [40, 12, 30, 10]
                .into_iter()
                .enumerate()
                .map(|(episode, cycles)| EpisodeReport {
                    episode,
                    cycles,
                    total_reward: 0.0,
                })
                .collect(),
        };
        assert_eq!(report.total_cycles(), 92);
        assert_eq!(report.best_cycles(), Some(10));
        assert_eq!(report.last().map(|e| e.cycles), Some(10));
        assert_eq!(report.mean_cycles_of_last(2), Some(20.0));
        assert_eq!(report.mean_cycles_of_last(10), Some(23.0));
        assert_eq!(TrainingReport::default().mean_cycles_of_last(3), None);
    }
}
