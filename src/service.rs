use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::GenerationError;
use crate::generator::LevelGenerator;
use crate::model::Level;
use crate::similarity::are_levels_similar_with;
use crate::solver::{CancelFlag, SearchConfig};
use crate::validator::LevelValidator;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub max_attempts: usize,
    pub similarity_threshold: f64,
    /// Entries kept when the history overflows `history_max`.
    pub history_min: usize,
    pub history_max: usize,
    /// Remove spare empty containers from accepted levels.
    pub optimize: bool,
    pub time_budget: Option<Duration>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_attempts: 50,
            similarity_threshold: 0.8,
            history_min: 10,
            history_max: 50,
            optimize: true,
            time_budget: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub level_id: u32,
    pub difficulty: u32,
    pub container_count: usize,
    pub color_count: usize,
}

/// Recently generated levels, oldest first.
#[derive(Clone, Debug, Default)]
pub struct SessionHistory {
    levels: VecDeque<Level>,
    min_size: usize,
    max_size: usize,
}

impl SessionHistory {
    pub fn new(min_size: usize, max_size: usize) -> Self {
        Self {
            levels: VecDeque::with_capacity(max_size + 1),
            min_size: min_size.min(max_size),
            max_size,
        }
    }

    /// Appends a level; past `max_size` the oldest entries go until `min_size` remain.
    pub fn record(&mut self, level: Level) {
        self.levels.push_back(level);
        if self.levels.len() > self.max_size {
            let excess = self.levels.len() - self.min_size;
            self.levels.drain(..excess);
            debug!("Session history trimmed to {} levels.", self.levels.len());
        }
    }

    pub fn clear(&mut self) {
        self.levels.clear();
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn levels(&self) -> impl Iterator<Item = &Level> {
        self.levels.iter()
    }

    pub fn signatures(&self) -> Vec<String> {
        self.levels.iter().map(|l| l.signature.clone()).collect()
    }
}

/// Generator, validator and similarity check behind a retry loop.
///
/// The session history is the only shared mutable state. It sits behind a
/// mutex and is only touched to snapshot, append, or clear, so concurrent
/// requests (see [`GenerationService::generate_batch`]) stay consistent.
pub struct GenerationService {
    config: ServiceConfig,
    search: SearchConfig,
    generator: LevelGenerator,
    history: Mutex<SessionHistory>,
    rng: Mutex<StdRng>,
}

impl GenerationService {
    pub fn new(config: &EngineConfig) -> Self {
        let rng = match config.generator.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            config: config.service,
            search: config.search,
            generator: LevelGenerator::new(config.generator),
            history: Mutex::new(SessionHistory::new(
                config.service.history_min,
                config.service.history_max,
            )),
            rng: Mutex::new(rng),
        }
    }

    fn lock_history(&self) -> MutexGuard<'_, SessionHistory> {
        self.history.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_seed(&self) -> u64 {
        self.rng.lock().unwrap_or_else(|e| e.into_inner()).next_u64()
    }

    pub fn history_snapshot(&self) -> Vec<Level> {
        self.lock_history().levels().cloned().collect()
    }

    pub fn clear_history(&self) {
        self.lock_history().clear();
    }

    pub fn record_level(&self, level: Level) {
        self.lock_history().record(level);
    }

    pub fn generate_next_level(&self, request: GenerationRequest) -> Result<Level, GenerationError> {
        self.generate_next_level_with_cancel(request, &CancelFlag::new())
    }

    /// Rejects candidates similar to anything in the session history. When
    /// every attempt is rejected the history is cleared and the next valid
    /// candidate is taken as is.
    pub fn generate_next_level_with_cancel(
        &self,
        request: GenerationRequest,
        cancel: &CancelFlag,
    ) -> Result<Level, GenerationError> {
        let started = Instant::now();
        let known = self.history_snapshot();
        if let Some(level) = self.find_candidate(request, cancel, started, &known)? {
            self.record_level(level.clone());
            return Ok(level);
        }

        warn!(
            "No unique level {} after {} attempts, clearing session history.",
            request.level_id, self.config.max_attempts
        );
        self.clear_history();
        match self.find_candidate(request, cancel, started, &[])? {
            Some(level) => {
                self.record_level(level.clone());
                Ok(level)
            }
            None => Err(GenerationError::Exhausted {
                attempts: self.config.max_attempts * 2,
            }),
        }
    }

    /// Like [`Self::generate_next_level`], but uniqueness is checked against
    /// `existing_levels` instead of the session history.
    pub fn generate_unique_level(
        &self,
        request: GenerationRequest,
        existing_levels: &[Level],
    ) -> Result<Level, GenerationError> {
        let cancel = CancelFlag::new();
        let started = Instant::now();
        let found = match self.find_candidate(request, &cancel, started, existing_levels)? {
            Some(level) => Some(level),
            None => {
                warn!(
                    "No level {} unlike the {} given, accepting any valid one.",
                    request.level_id,
                    existing_levels.len()
                );
                self.find_candidate(request, &cancel, started, &[])?
            }
        };
        let level = found.ok_or(GenerationError::Exhausted {
            attempts: self.config.max_attempts * 2,
        })?;
        self.record_level(level.clone());
        Ok(level)
    }

    /// Generates several levels in parallel, e.g. to prefetch upcoming ones.
    pub fn generate_batch(
        &self,
        requests: &[GenerationRequest],
    ) -> Vec<Result<Level, GenerationError>> {
        requests
            .par_iter()
            .map(|request| self.generate_next_level(*request))
            .collect()
    }

    fn find_candidate(
        &self,
        request: GenerationRequest,
        cancel: &CancelFlag,
        started: Instant,
        known: &[Level],
    ) -> Result<Option<Level>, GenerationError> {
        let validator = LevelValidator::new(self.search).with_cancel_flag(cancel.clone());
        for attempt in 0..self.config.max_attempts {
            if cancel.is_cancelled() {
                return Err(GenerationError::Cancelled);
            }
            if let Some(budget) = self.config.time_budget {
                let elapsed = started.elapsed();
                if elapsed >= budget {
                    return Err(GenerationError::TimedOut { elapsed });
                }
            }

            let mut rng = StdRng::seed_from_u64(self.next_seed());
            let candidate = self.generator.generate_with_rng(
                &mut rng,
                request.level_id,
                request.difficulty,
                request.container_count,
                request.color_count,
            )?;
            if let Err(reason) = validator.validate_generated_level(&candidate) {
                debug!("Attempt {attempt}: rejected ({reason}).");
                continue;
            }
            let level = if self.config.optimize {
                validator.optimize_empty_containers(&candidate)
            } else {
                candidate
            };
            if known
                .iter()
                .any(|k| are_levels_similar_with(&level, k, self.config.similarity_threshold))
            {
                debug!("Attempt {attempt}: too similar to a known level.");
                continue;
            }
            info!(
                "Level {} accepted after {} attempts: {}",
                level.id,
                attempt + 1,
                level.signature
            );
            return Ok(Some(level));
        }
        Ok(None)
    }
}
