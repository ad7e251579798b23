//! Save/load of levels, game states and progress as opaque blobs.
//!
//! Only the primary data is stored. Signatures, counts and win/loss flags are
//! recomputed on load. Storage failures never propagate out of
//! [`ProgressStore`]: it switches to an in-memory copy and reports that it is
//! degraded.

use std::collections::{BTreeMap, HashMap};

use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gameplay::{GameState, Move};
use crate::model::{Container, ContainerError, Level};

pub const GAME_STATE_KEY: &str = "game_state";
pub const PROGRESS_KEY: &str = "progress";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("corrupt blob: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error("move index {index} is past a history of {len} moves")]
    MoveIndex { index: usize, len: usize },
}

/// Key/value blob storage supplied by the host platform.
pub trait Storage: Send {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
    fn save(&mut self, key: &str, blob: &[u8]) -> Result<(), StorageError>;
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    blobs: HashMap<String, Vec<u8>>,
}

impl Storage for MemoryStorage {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.blobs.get(key).cloned())
    }

    fn save(&mut self, key: &str, blob: &[u8]) -> Result<(), StorageError> {
        self.blobs.insert(key.to_string(), blob.to_vec());
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub highest_unlocked: u32,
    /// Fewest moves each level was completed in.
    pub best_moves: BTreeMap<u32, usize>,
}

impl Progress {
    pub fn record_completion(&mut self, level_id: u32, moves: usize) {
        let best = self.best_moves.entry(level_id).or_insert(moves);
        *best = (*best).min(moves);
        self.highest_unlocked = self.highest_unlocked.max(level_id.saturating_add(1));
    }
}

#[derive(Serialize, Deserialize)]
struct StoredLevel {
    id: u32,
    difficulty: u32,
    containers: Vec<Container>,
    signature: String,
}

#[derive(Serialize, Deserialize)]
struct StoredGameState {
    level_id: u32,
    containers: Vec<Container>,
    move_history: Vec<Move>,
    current_move_index: Option<usize>,
}

pub fn encode_level(level: &Level) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&StoredLevel {
        id: level.id,
        difficulty: level.difficulty,
        containers: level.initial_containers.clone(),
        signature: level.signature.clone(),
    })
}

/// The stored signature is ignored and recomputed.
pub fn decode_level(blob: &[u8]) -> Result<Level, PersistenceError> {
    let stored: StoredLevel = serde_json::from_slice(blob)?;
    for container in &stored.containers {
        container.check_invariants()?;
    }
    Ok(Level::new(stored.id, stored.difficulty, stored.containers))
}

pub fn encode_game_state(state: &GameState) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&StoredGameState {
        level_id: state.get_level_id(),
        containers: state.get_containers().to_vec(),
        move_history: state.get_move_history().to_vec(),
        current_move_index: state.get_current_move_index(),
    })
}

pub fn decode_game_state(blob: &[u8]) -> Result<GameState, PersistenceError> {
    let stored: StoredGameState = serde_json::from_slice(blob)?;
    for container in &stored.containers {
        container.check_invariants()?;
    }
    if let Some(index) = stored.current_move_index
        && index >= stored.move_history.len()
    {
        return Err(PersistenceError::MoveIndex {
            index,
            len: stored.move_history.len(),
        });
    }
    let containers = stored
        .containers
        .iter()
        .map(Container::merge_adjacent_layers)
        .collect();
    Ok(GameState::from_parts(
        stored.level_id,
        containers,
        stored.move_history,
        stored.current_move_index,
    ))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    Persisted,
    /// Kept only for this session.
    InMemoryOnly,
}

pub struct ProgressStore<S: Storage> {
    storage: S,
    fallback: MemoryStorage,
    degraded: bool,
}

impl<S: Storage> ProgressStore<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            fallback: MemoryStorage::default(),
            degraded: false,
        }
    }

    /// True once a storage failure forced the store into memory-only mode.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    fn save_blob(&mut self, key: &str, blob: &[u8]) -> SaveOutcome {
        if !self.degraded {
            match self.storage.save(key, blob) {
                Ok(()) => return SaveOutcome::Persisted,
                Err(e) => {
                    warn!("Saving {key} failed, progress is no longer persisted: {e}");
                    self.degraded = true;
                }
            }
        }
        // Memory storage cannot fail.
        let _ = self.fallback.save(key, blob);
        SaveOutcome::InMemoryOnly
    }

    fn load_blob(&mut self, key: &str) -> Option<Vec<u8>> {
        if self.degraded {
            return self.fallback.load(key).ok().flatten();
        }
        match self.storage.load(key) {
            Ok(blob) => blob,
            Err(e) => {
                warn!("Loading {key} failed, continuing in memory: {e}");
                self.degraded = true;
                None
            }
        }
    }

    pub fn save_progress(&mut self, progress: &Progress) -> SaveOutcome {
        match serde_json::to_vec(progress) {
            Ok(blob) => self.save_blob(PROGRESS_KEY, &blob),
            Err(e) => {
                warn!("Could not encode progress: {e}");
                SaveOutcome::InMemoryOnly
            }
        }
    }

    /// Missing or unreadable progress starts fresh.
    pub fn load_progress(&mut self) -> Progress {
        let Some(blob) = self.load_blob(PROGRESS_KEY) else {
            return Progress::default();
        };
        serde_json::from_slice(&blob).unwrap_or_else(|e| {
            warn!("Discarding unreadable progress: {e}");
            Progress::default()
        })
    }

    pub fn save_game_state(&mut self, state: &GameState) -> SaveOutcome {
        match encode_game_state(state) {
            Ok(blob) => self.save_blob(GAME_STATE_KEY, &blob),
            Err(e) => {
                warn!("Could not encode game state: {e}");
                SaveOutcome::InMemoryOnly
            }
        }
    }

    pub fn load_game_state(&mut self) -> Option<GameState> {
        let blob = self.load_blob(GAME_STATE_KEY)?;
        match decode_game_state(&blob) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!("Discarding unreadable game state: {e}");
                None
            }
        }
    }
}
