use std::collections::BTreeSet;

use log::debug;
use thiserror::Error;

use crate::model::{ColorId, Container, ContainerError, Level};
use crate::solver::{CancelFlag, SearchConfig, SearchOutcome, Solver};

/// Levels smaller than this are never shrunk further.
const MIN_OPTIMIZED_CONTAINERS: usize = 3;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("level declares {declared} containers but has {actual}")]
    ContainerCountMismatch { declared: usize, actual: usize },
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error("colour {color} has {volume} units, which matches no container capacity")]
    VolumeMismatch { color: ColorId, volume: usize },
    #[error("level is already solved")]
    AlreadySolved,
    #[error("container {id} is already completed")]
    CompletedContainer { id: usize },
    #[error("solvability could not be proven: {outcome:?}")]
    Unprovable { outcome: SearchOutcome },
}

/// True if some container is full and single-coloured.
pub fn has_completed_containers(level: &Level) -> bool {
    level.initial_containers.iter().any(Container::is_completed)
}

/// A copy of `level` with consecutive same-colour layers collapsed.
pub fn merge_adjacent_layers(level: &Level) -> Level {
    level.with_containers(
        level
            .initial_containers
            .iter()
            .map(Container::merge_adjacent_layers)
            .collect(),
    )
}

pub struct LevelValidator {
    solver: Solver,
}

impl LevelValidator {
    pub fn new(search: SearchConfig) -> Self {
        Self {
            solver: Solver::new(search),
        }
    }

    pub fn with_cancel_flag(self, cancel: CancelFlag) -> Self {
        Self {
            solver: self.solver.with_cancel_flag(cancel),
        }
    }

    pub fn validate_level(&self, level: &Level) -> bool {
        self.validate_generated_level(level).is_ok()
    }

    /// Structural checks first, then a bounded solvability search.
    pub fn validate_generated_level(&self, level: &Level) -> Result<(), ValidationError> {
        let actual = level.initial_containers.len();
        if level.container_count != actual {
            return Err(ValidationError::ContainerCountMismatch {
                declared: level.container_count,
                actual,
            });
        }
        for container in &level.initial_containers {
            container.check_invariants()?;
        }

        let capacities: BTreeSet<usize> = level
            .initial_containers
            .iter()
            .map(Container::get_capacity)
            .collect();
        if let Some((color, volume)) = level
            .get_color_volumes()
            .into_iter()
            .find(|(_, volume)| !capacities.contains(volume))
        {
            return Err(ValidationError::VolumeMismatch { color, volume });
        }

        if level.is_solved() {
            return Err(ValidationError::AlreadySolved);
        }
        if let Some(completed) = level.initial_containers.iter().find(|c| c.is_completed()) {
            return Err(ValidationError::CompletedContainer {
                id: completed.get_id(),
            });
        }

        match self.solver.solve(&level.initial_containers) {
            SearchOutcome::Solved { .. } => Ok(()),
            outcome => Err(ValidationError::Unprovable { outcome }),
        }
    }

    /// Drops trailing empty containers while the level stays provably solvable.
    ///
    /// Stops at the first empty container the search cannot do without, on the
    /// assumption that the rest are needed too. Ids are renumbered from 0.
    pub fn optimize_empty_containers(&self, level: &Level) -> Level {
        let mut containers = level.initial_containers.clone();
        while containers.len() > MIN_OPTIMIZED_CONTAINERS
            && containers.iter().filter(|c| c.is_empty()).count() > 1
        {
            let Some(last_empty) = containers.iter().rposition(Container::is_empty) else {
                break;
            };
            let mut reduced = containers.clone();
            reduced.remove(last_empty);
            if !self.solver.is_solvable(&reduced) {
                debug!(
                    "Level {} needs {} containers, keeping the rest.",
                    level.id,
                    containers.len()
                );
                break;
            }
            containers = reduced;
        }
        for (id, container) in containers.iter_mut().enumerate() {
            container.set_id(id);
        }
        level.with_containers(containers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(repr: &str) -> Level {
        Level::new_from_repr(4, 2, repr).unwrap()
    }

    fn validator() -> LevelValidator {
        LevelValidator::new(SearchConfig::default())
    }

    #[test]
    fn accepts_solvable_mixed_level() {
        assert_eq!(validator().validate_generated_level(&level("AABB BBAA ....")), Ok(()));
    }

    #[test]
    fn rejects_count_mismatch() {
        let mut l = level("AABB BBAA ....");
        l.container_count = 4;
        assert_eq!(
            validator().validate_generated_level(&l),
            Err(ValidationError::ContainerCountMismatch {
                declared: 4,
                actual: 3
            })
        );
    }

    #[test]
    fn rejects_solved_and_completed() {
        assert_eq!(
            validator().validate_generated_level(&level("AA.. AA.. BBBB ....")),
            Err(ValidationError::AlreadySolved)
        );
        let l = level("AAAA BBCC CCBB ....");
        assert!(has_completed_containers(&l));
        assert_eq!(
            validator().validate_generated_level(&l),
            Err(ValidationError::CompletedContainer { id: 0 })
        );
    }

    #[test]
    fn rejects_uneven_volumes() {
        assert!(matches!(
            validator().validate_generated_level(&level("AABB BBA. ....")),
            Err(ValidationError::VolumeMismatch { .. })
        ));
    }

    #[test]
    fn rejects_stuck_level() {
        assert_eq!(
            validator().validate_generated_level(&level("AABB BBAA")),
            Err(ValidationError::Unprovable {
                outcome: SearchOutcome::Unsolvable { states_visited: 1 }
            })
        );
    }

    #[test]
    fn optimizer_removes_spare_empties() {
        let l = level("AABB BBAA .... .... ....");
        let optimized = validator().optimize_empty_containers(&l);
        assert_eq!(optimized.container_count, 3);
        assert_eq!(optimized.get_empty_container_count(), 1);
        assert_eq!(optimized.get_total_volume(), l.get_total_volume());
        let ids: Vec<usize> = optimized.initial_containers.iter().map(Container::get_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(optimized.signature, "containers:3|pattern:AABB,BBAA,EMPTY");
        assert!(validator().validate_level(&optimized));
    }

    #[test]
    fn optimizer_renumbers_after_interior_removal() {
        let l = level("AABB .... BBAA .... CCCC");
        let optimized = validator().optimize_empty_containers(&l);
        let reprs: Vec<String> = optimized
            .initial_containers
            .iter()
            .map(Container::get_text_representation)
            .collect();
        assert_eq!(reprs, vec!["AABB", "....", "BBAA", "CCCC"]);
        let ids: Vec<usize> = optimized.initial_containers.iter().map(Container::get_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }

    #[test]
    fn merge_keeps_volume_and_ids() {
        let c = Container::with_layers(
            5,
            4,
            vec![
                crate::model::LiquidLayer::new(ColorId(0), 1),
                crate::model::LiquidLayer::new(ColorId(0), 1),
                crate::model::LiquidLayer::new(ColorId(1), 2),
            ],
        )
        .unwrap();
        let l = Level::new(1, 1, vec![c]);
        let merged = merge_adjacent_layers(&l);
        assert_eq!(merged.initial_containers[0].get_layers().len(), 2);
        assert_eq!(merged.initial_containers[0].get_id(), 5);
        assert_eq!(merged.get_total_volume(), 4);
    }
}
