use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{ColorId, Container, Level, LiquidLayer, are_all_sorted};
use crate::moves::{PourPolicy, enumerate_moves};

/// Why a pour was refused. These are expected outcomes, not failures of the engine.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PourError {
    #[error("cannot pour a container into itself")]
    SameContainer,
    #[error("no container with id {id}")]
    InvalidContainer { id: usize },
    #[error("source container is empty")]
    EmptySource,
    #[error("target container is full")]
    ContainerFull,
    #[error("cannot pour {source_color} onto {target_color}")]
    ColorMismatch {
        source_color: ColorId,
        target_color: ColorId,
    },
    #[error("need room for {attempted_volume} units but only {available_capacity} are free")]
    InsufficientCapacity {
        attempted_volume: usize,
        available_capacity: usize,
    },
}

pub type PourResult = Result<Move, PourError>;

/// A recorded pour. Replaying it forward or backward reproduces the layout exactly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    pub from_container_id: usize,
    pub to_container_id: usize,
    pub liquid_moved: LiquidLayer,
    pub timestamp: u64,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// One snapshot of a game in progress. Every pour, undo or redo yields a new snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameState {
    level_id: u32,
    containers: Vec<Container>,
    move_history: Vec<Move>,
    /// Index of the last applied move; `None` is the position before the first move.
    current_move_index: Option<usize>,
    is_completed: bool,
    is_lost: bool,
    move_count: usize,
}

impl GameState {
    /// Starts a game. Adjacent same-colour layers are merged so every run is one layer.
    pub fn initialize_level(level_id: u32, containers: &[Container]) -> Self {
        let containers = containers
            .iter()
            .map(Container::merge_adjacent_layers)
            .collect();
        Self::from_parts(level_id, containers, Vec::new(), None)
    }

    pub fn from_level(level: &Level) -> Self {
        Self::initialize_level(level.id, &level.initial_containers)
    }

    pub(crate) fn from_parts(
        level_id: u32,
        containers: Vec<Container>,
        move_history: Vec<Move>,
        current_move_index: Option<usize>,
    ) -> Self {
        let mut state = Self {
            level_id,
            containers,
            move_history,
            current_move_index,
            is_completed: false,
            is_lost: false,
            move_count: current_move_index.map_or(0, |i| i + 1),
        };
        state.refresh_status();
        state
    }

    fn refresh_status(&mut self) {
        self.is_completed = self.check_win_condition();
        self.is_lost = self.check_loss_condition();
    }

    pub fn get_level_id(&self) -> u32 {
        self.level_id
    }

    pub fn get_containers(&self) -> &[Container] {
        &self.containers
    }

    pub fn get_container(&self, id: usize) -> Option<&Container> {
        self.containers.iter().find(|c| c.get_id() == id)
    }

    fn position_of(&self, id: usize) -> Option<usize> {
        self.containers.iter().position(|c| c.get_id() == id)
    }

    pub fn get_move_history(&self) -> &[Move] {
        &self.move_history
    }

    pub fn get_current_move_index(&self) -> Option<usize> {
        self.current_move_index
    }

    pub fn get_move_count(&self) -> usize {
        self.move_count
    }

    pub fn is_completed(&self) -> bool {
        self.is_completed
    }

    pub fn is_lost(&self) -> bool {
        self.is_lost
    }

    pub fn can_undo(&self) -> bool {
        self.current_move_index.is_some()
    }

    pub fn can_redo(&self) -> bool {
        let next = self.current_move_index.map_or(0, |i| i + 1);
        next < self.move_history.len()
    }

    /// Checks a pour without applying it. The whole top run must fit in the target.
    pub fn attempt_pour(&self, from_id: usize, to_id: usize) -> PourResult {
        if from_id == to_id {
            return Err(PourError::SameContainer);
        }
        let from = self
            .get_container(from_id)
            .ok_or(PourError::InvalidContainer { id: from_id })?;
        let to = self
            .get_container(to_id)
            .ok_or(PourError::InvalidContainer { id: to_id })?;
        let Some(color) = from.get_top_color() else {
            return Err(PourError::EmptySource);
        };
        if to.is_full() {
            return Err(PourError::ContainerFull);
        }
        if let Some(target_color) = to.get_top_color()
            && target_color != color
        {
            return Err(PourError::ColorMismatch {
                source_color: color,
                target_color,
            });
        }
        let run = from.get_top_run_volume();
        let space = to.get_empty_space();
        if run > space {
            return Err(PourError::InsufficientCapacity {
                attempted_volume: run,
                available_capacity: space,
            });
        }
        Ok(Move {
            from_container_id: from_id,
            to_container_id: to_id,
            liquid_moved: LiquidLayer::new(color, run),
            timestamp: now_millis(),
        })
    }

    /// Applies a pour, dropping any redo entries past the current position.
    pub fn execute_pour(&self, from_id: usize, to_id: usize) -> Result<GameState, PourError> {
        let mv = self.attempt_pour(from_id, to_id)?;
        let containers = self
            .transfer(mv.from_container_id, mv.to_container_id, mv.liquid_moved)
            .ok_or(PourError::InvalidContainer { id: from_id })?;

        let next_index = self.current_move_index.map_or(0, |i| i + 1);
        let mut history = self.move_history[..next_index].to_vec();
        history.push(mv);
        debug!(
            "level {}: poured {} x{} from {} to {}",
            self.level_id, mv.liquid_moved.color, mv.liquid_moved.volume, from_id, to_id
        );
        Ok(Self::from_parts(
            self.level_id,
            containers,
            history,
            Some(next_index),
        ))
    }

    /// Moves `liquid` off the top of `from_id` onto `to_id`.
    fn transfer(&self, from_id: usize, to_id: usize, liquid: LiquidLayer) -> Option<Vec<Container>> {
        let from = self.position_of(from_id)?;
        let to = self.position_of(to_id)?;
        if self.containers[to].get_empty_space() < liquid.volume {
            return None;
        }
        let mut containers = self.containers.clone();
        let taken = containers[from].take_from_top(liquid.volume)?;
        if taken.color != liquid.color {
            return None;
        }
        containers[to].pour_in(taken);
        Some(containers)
    }

    pub fn undo_last_move(&self) -> Option<GameState> {
        let index = self.current_move_index?;
        let mv = self.move_history.get(index)?;
        let containers = self.transfer(mv.to_container_id, mv.from_container_id, mv.liquid_moved)?;
        Some(Self::from_parts(
            self.level_id,
            containers,
            self.move_history.clone(),
            index.checked_sub(1),
        ))
    }

    pub fn redo_next_move(&self) -> Option<GameState> {
        let index = self.current_move_index.map_or(0, |i| i + 1);
        let mv = self.move_history.get(index)?;
        let containers = self.transfer(mv.from_container_id, mv.to_container_id, mv.liquid_moved)?;
        Some(Self::from_parts(
            self.level_id,
            containers,
            self.move_history.clone(),
            Some(index),
        ))
    }

    /// Rewinds to the initial layout. The history is kept, so every move can be redone.
    pub fn restart(&self) -> GameState {
        let mut state = self.clone();
        while let Some(previous) = state.undo_last_move() {
            state = previous;
        }
        state
    }

    pub fn check_win_condition(&self) -> bool {
        are_all_sorted(&self.containers)
    }

    pub fn check_loss_condition(&self) -> bool {
        self.check_loss_condition_with(PourPolicy::AllOrNothing)
    }

    /// Lost when not won and no pour is legal under `policy`.
    pub fn check_loss_condition_with(&self, policy: PourPolicy) -> bool {
        !self.check_win_condition() && enumerate_moves(&self.containers, policy).is_empty()
    }

    /// Same board and position, ignoring move timestamps and the redo tail.
    pub fn same_position(&self, other: &GameState) -> bool {
        self.level_id == other.level_id
            && self.containers == other.containers
            && self.current_move_index == other.current_move_index
            && self.move_count == other.move_count
            && self.is_completed == other.is_completed
            && self.is_lost == other.is_lost
    }

    pub fn get_text_representation(&self) -> String {
        self.containers
            .iter()
            .map(Container::get_text_representation)
            .collect::<Vec<_>>()
            .join(" ")
    }
}
