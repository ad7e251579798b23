use std::collections::HashSet;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::gameplay::GameState;
use crate::model::{ColorId, Container, are_all_sorted};
use crate::moves::{PourPolicy, ValidMove, apply_move, enumerate_moves};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Give up once more than this many distinct states have been seen.
    pub max_states: usize,
    /// Give up once more than this many states have been expanded.
    pub max_expansions: usize,
    pub policy: PourPolicy,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_states: 10_000,
            max_expansions: 1_000,
            policy: PourPolicy::AllOrNothing,
        }
    }
}

/// Result of a bounded search. Only `Solved` is a solvability proof.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SearchOutcome {
    Solved {
        moves: Vec<ValidMove>,
        states_visited: usize,
        expansions: usize,
    },
    /// Every reachable state was visited without finding a sorted one.
    Unsolvable { states_visited: usize },
    BudgetExceeded {
        states_visited: usize,
        expansions: usize,
    },
    Cancelled,
}

impl SearchOutcome {
    pub fn is_solved(&self) -> bool {
        matches!(self, SearchOutcome::Solved { .. })
    }
}

/// Shared cancellation switch. Clones observe the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Container contents with ids and order stripped.
type StateKey = Vec<(usize, Vec<(ColorId, usize)>)>;

fn canonical_key(containers: &[Container]) -> StateKey {
    let mut key: StateKey = containers
        .iter()
        .map(|c| {
            let mut runs: Vec<(ColorId, usize)> = Vec::with_capacity(c.get_layers().len());
            for layer in c.get_layers() {
                match runs.last_mut() {
                    Some((color, volume)) if *color == layer.color => *volume += layer.volume,
                    _ => runs.push((layer.color, layer.volume)),
                }
            }
            (c.get_capacity(), runs)
        })
        .collect();
    key.sort_unstable();
    key
}

#[derive(Clone)]
struct SearchNode {
    containers: Vec<Container>,
    history: Vec<ValidMove>,
}

impl SearchNode {
    fn successors(&self, policy: PourPolicy) -> Vec<SearchNode> {
        enumerate_moves(&self.containers, policy)
            .into_iter()
            .filter_map(|mv| {
                let containers = apply_move(&self.containers, &mv)?;
                let mut history = self.history.clone();
                history.push(mv);
                Some(SearchNode {
                    containers,
                    history,
                })
            })
            .collect()
    }
}

/// Breadth-first search for a sorted layout, one frontier layer at a time.
/// Each layer is expanded in parallel and merged back in frontier order, so the
/// outcome does not depend on thread scheduling.
pub struct Solver {
    config: SearchConfig,
    cancel: CancelFlag,
}

impl Solver {
    pub fn new(config: SearchConfig) -> Solver {
        Solver {
            config,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Solver {
        self.cancel = cancel;
        self
    }

    pub fn get_config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn is_solvable(&self, containers: &[Container]) -> bool {
        self.solve(containers).is_solved()
    }

    pub fn solve(&self, containers: &[Container]) -> SearchOutcome {
        if are_all_sorted(containers) {
            return SearchOutcome::Solved {
                moves: vec![],
                states_visited: 1,
                expansions: 0,
            };
        }

        let mut visited: HashSet<StateKey> = HashSet::new();
        visited.insert(canonical_key(containers));
        let mut frontier = vec![SearchNode {
            containers: containers.to_vec(),
            history: vec![],
        }];
        let mut expansions = 0usize;

        while !frontier.is_empty() {
            if self.cancel.is_cancelled() {
                return SearchOutcome::Cancelled;
            }
            let remaining = self.config.max_expansions.saturating_sub(expansions);
            if remaining == 0 {
                debug!("Expansion budget spent with {} states queued.", frontier.len());
                return SearchOutcome::BudgetExceeded {
                    states_visited: visited.len(),
                    expansions,
                };
            }
            let truncated = frontier.len() > remaining;
            frontier.truncate(remaining);
            expansions += frontier.len();

            let policy = self.config.policy;
            let cancel = &self.cancel;
            let expanded: Vec<Vec<SearchNode>> = frontier
                .par_iter()
                .map(|node| {
                    if cancel.is_cancelled() {
                        return vec![];
                    }
                    node.successors(policy)
                })
                .collect();
            if self.cancel.is_cancelled() {
                return SearchOutcome::Cancelled;
            }

            let mut next = Vec::new();
            for node in expanded.into_iter().flatten() {
                if are_all_sorted(&node.containers) {
                    debug!(
                        "Solved in {} moves after {} expansions.",
                        node.history.len(),
                        expansions
                    );
                    return SearchOutcome::Solved {
                        moves: node.history,
                        states_visited: visited.len() + 1,
                        expansions,
                    };
                }
                if visited.insert(canonical_key(&node.containers)) {
                    if visited.len() > self.config.max_states {
                        debug!("State budget of {} exceeded.", self.config.max_states);
                        return SearchOutcome::BudgetExceeded {
                            states_visited: visited.len(),
                            expansions,
                        };
                    }
                    next.push(node);
                }
            }
            if truncated {
                return SearchOutcome::BudgetExceeded {
                    states_visited: visited.len(),
                    expansions,
                };
            }
            frontier = next;
        }

        debug!("Search space exhausted after {} states.", visited.len());
        SearchOutcome::Unsolvable {
            states_visited: visited.len(),
        }
    }
}

/// First move of a shortest solution from the current position, if one is found in budget.
pub fn hint(state: &GameState, config: SearchConfig) -> Option<ValidMove> {
    match Solver::new(config).solve(state.get_containers()) {
        SearchOutcome::Solved { moves, .. } => moves.first().copied(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Level;

    fn containers(repr: &str) -> Vec<Container> {
        Level::new_from_repr(0, 0, repr).unwrap().initial_containers
    }

    #[test]
    fn sorted_start_is_trivially_solved() {
        let outcome = Solver::new(SearchConfig::default()).solve(&containers("AAAA BBBB ...."));
        assert_eq!(
            outcome,
            SearchOutcome::Solved {
                moves: vec![],
                states_visited: 1,
                expansions: 0
            }
        );
    }

    #[test]
    fn finds_a_replayable_solution() {
        let start = containers("AABB BBAA ....");
        let SearchOutcome::Solved { moves, .. } = Solver::new(SearchConfig::default()).solve(&start)
        else {
            panic!("expected a solution");
        };
        assert!(!moves.is_empty());

        let mut state = GameState::initialize_level(0, &start);
        for mv in &moves {
            state = state.execute_pour(mv.from_container, mv.to_container).unwrap();
        }
        assert!(state.check_win_condition());
    }

    #[test]
    fn stuck_board_is_proven_unsolvable() {
        let outcome = Solver::new(SearchConfig::default()).solve(&containers("AABB BBAA"));
        assert_eq!(outcome, SearchOutcome::Unsolvable { states_visited: 1 });
    }

    #[test]
    fn exceeding_budget_is_not_a_proof() {
        let config = SearchConfig {
            max_states: 10_000,
            max_expansions: 1,
            policy: PourPolicy::AllOrNothing,
        };
        let outcome = Solver::new(config).solve(&containers("ABCA BCAB CABC .... ...."));
        assert!(matches!(outcome, SearchOutcome::BudgetExceeded { .. }));
        assert!(!Solver::new(config).is_solvable(&containers("ABCA BCAB CABC .... ....")));
    }

    #[test]
    fn tiny_state_budget_is_respected() {
        let config = SearchConfig {
            max_states: 2,
            ..SearchConfig::default()
        };
        let outcome = Solver::new(config).solve(&containers("ABCA BCAB CABC .... ...."));
        assert!(matches!(
            outcome,
            SearchOutcome::BudgetExceeded { states_visited: 3, .. }
        ));
    }

    #[test]
    fn cancelled_search_stops() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let outcome = Solver::new(SearchConfig::default())
            .with_cancel_flag(cancel)
            .solve(&containers("AABB BBAA ...."));
        assert_eq!(outcome, SearchOutcome::Cancelled);
    }

    #[test]
    fn hint_points_at_a_legal_pour() {
        let state = GameState::initialize_level(0, &containers("AABB BBAA ...."));
        let mv = hint(&state, SearchConfig::default()).unwrap();
        assert!(state.attempt_pour(mv.from_container, mv.to_container).is_ok());
    }
}
