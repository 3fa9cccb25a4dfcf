//! State-action value table for tabular Q-learning.

use std::collections::HashMap;

use crate::{Action, Point};

/// Key of a table entry: the agent's position and the action taken there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateAction {
    pub state: Point,
    pub action: Action,
}

/// Q-values keyed by (state, action). Entries that were never written read as 0.0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QTable {
    values: HashMap<StateAction, f64>,
}

impl QTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table with a zero entry for every action in each of `states`.
    pub fn with_states(states: impl IntoIterator<Item = Point>) -> Self {
        let values = states
            .into_iter()
            .flat_map(|state| {
                Action::ALL
                    .into_iter()
                    .map(move |action| (StateAction { state, action }, 0.0))
            })
            .collect();
        Self { values }
    }

    /// Value of taking `action` in `state`; 0.0 if never written.
    pub fn get(&self, state: Point, action: Action) -> f64 {
        self.values
            .get(&StateAction { state, action })
            .copied()
            .unwrap_or(0.0)
    }

    /// Overwrites the value of taking `action` in `state`.
    pub fn set(&mut self, state: Point, action: Action, value: f64) {
        self.values.insert(StateAction { state, action }, value);
    }

    /// Values of all four actions in `state`, indexed by [`Action::index`].
    pub fn row(&self, state: Point) -> [f64; 4] {
        Action::ALL.map(|action| self.get(state, action))
    }

    /// Largest value in the row of `state`.
    pub fn max_value(&self, state: Point) -> f64 {
        self.row(state)
            .into_iter()
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Every action attaining the row maximum, in [`Action::ALL`] order.
    pub fn best_actions(&self, state: Point) -> Vec<Action> {
        let row = self.row(state);
        let max = row.into_iter().fold(f64::NEG_INFINITY, f64::max);
        Action::ALL
            .into_iter()
            .filter(|action| row[action.index()] == max)
            .collect()
    }

    /// One-step Q-learning update:
    ///
    /// Q(s,a) ← Q(s,a) + α[r + γ max_a' Q(s',a') - Q(s,a)]
    ///
    /// # Arguments
    ///
    /// * `learning_rate` - α, how far the value moves toward the target.
    /// * `decay_rate` - γ, the weight of the best value reachable from `next_state`.
    ///
    /// Returns the new value of Q(s,a).
    pub fn update(
        &mut self,
        state: Point,
        action: Action,
        reward: f64,
        next_state: Point,
        learning_rate: f64,
        decay_rate: f64,
    ) -> f64 {
        let current = self.get(state, action);
        let target = reward + decay_rate * self.max_value(next_state);
        let value = current + learning_rate * (target - current);
        self.set(state, action, value);
        value
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
