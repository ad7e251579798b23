use log::debug;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::seq::{IndexedRandom, SliceRandom};
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;
use crate::model::{COLOR_NAMES, ColorId, Container, Level, LiquidLayer, are_all_sorted};

/// Reshuffles tried before a structurally trivial layout is handed to the validator anyway.
const MAX_LAYOUT_TRIES: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub container_capacity: usize,
    pub min_empty_containers: usize,
    pub max_empty_containers: usize,
    /// Fixed seed for reproducible output; `None` draws from the thread RNG.
    pub seed: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            container_capacity: 4,
            min_empty_containers: 1,
            max_empty_containers: 4,
            seed: None,
        }
    }
}

pub struct LevelGenerator {
    config: GeneratorConfig,
}

impl LevelGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    pub fn get_config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn validate_parameters(
        &self,
        container_count: usize,
        color_count: usize,
    ) -> Result<(), GenerationError> {
        let capacity = self.config.container_capacity;
        if capacity < 2 {
            return Err(GenerationError::invalid(format!(
                "container capacity {capacity} leaves no room to mix colours"
            )));
        }
        if color_count < 2 {
            return Err(GenerationError::invalid(format!(
                "{color_count} colours cannot make an unsorted level"
            )));
        }
        if color_count > COLOR_NAMES.len() {
            return Err(GenerationError::invalid(format!(
                "{color_count} colours requested but only {} exist",
                COLOR_NAMES.len()
            )));
        }
        if color_count >= container_count
            || color_count * capacity >= container_count * capacity
        {
            return Err(GenerationError::invalid(format!(
                "{color_count} colours need more than {container_count} containers"
            )));
        }
        let empty = container_count - color_count;
        if empty < self.config.min_empty_containers || empty > self.config.max_empty_containers {
            return Err(GenerationError::invalid(format!(
                "{empty} empty containers is outside {}..={}",
                self.config.min_empty_containers, self.config.max_empty_containers
            )));
        }
        Ok(())
    }

    /// Generates with the configured seed, or non-deterministically without one.
    pub fn generate_level(
        &self,
        level_id: u32,
        difficulty: u32,
        container_count: usize,
        color_count: usize,
    ) -> Result<Level, GenerationError> {
        match self.config.seed {
            Some(seed) => self.generate_with_rng(
                &mut StdRng::seed_from_u64(seed),
                level_id,
                difficulty,
                container_count,
                color_count,
            ),
            None => self.generate_with_rng(
                &mut rand::rng(),
                level_id,
                difficulty,
                container_count,
                color_count,
            ),
        }
    }

    pub fn generate_with_rng<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        level_id: u32,
        difficulty: u32,
        container_count: usize,
        color_count: usize,
    ) -> Result<Level, GenerationError> {
        self.validate_parameters(container_count, color_count)?;
        let capacity = self.config.container_capacity;

        let mut palette: Vec<usize> = (0..COLOR_NAMES.len()).collect();
        palette.shuffle(rng);
        let colors: Vec<ColorId> = palette.into_iter().take(color_count).map(ColorId).collect();

        let is_trivial =
            |cs: &[Container]| are_all_sorted(cs) || cs.iter().any(Container::is_completed);
        let runs = self.split_into_runs(rng, &colors, difficulty);
        let mut containers = distribute(rng, runs, color_count, capacity);
        let mut tries = 1;
        while is_trivial(&containers) && tries < MAX_LAYOUT_TRIES {
            debug!("Layout {tries} for level {level_id} was trivial, reshuffling.");
            let runs = self.split_into_runs(rng, &colors, difficulty);
            containers = distribute(rng, runs, color_count, capacity);
            tries += 1;
        }

        for id in color_count..container_count {
            containers.push(Container::new(id, capacity));
        }
        Ok(Level::new(level_id, difficulty, containers))
    }

    /// One container's worth of each colour, cut into sub-runs. Higher
    /// difficulty cuts into more pieces.
    fn split_into_runs<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        colors: &[ColorId],
        difficulty: u32,
    ) -> Vec<LiquidLayer> {
        let capacity = self.config.container_capacity;
        let max_runs = (difficulty as usize + 2).min(capacity);
        let min_runs = (difficulty as usize / 2 + 1).min(max_runs);

        let mut runs = Vec::new();
        for &color in colors {
            let pieces = rng.random_range(min_runs..=max_runs);
            let mut cuts: Vec<usize> = sample(rng, capacity - 1, pieces - 1)
                .into_iter()
                .map(|c| c + 1)
                .collect();
            cuts.sort_unstable();
            let mut start = 0;
            for cut in cuts.into_iter().chain(std::iter::once(capacity)) {
                runs.push(LiquidLayer::new(color, cut - start));
                start = cut;
            }
        }
        runs.shuffle(rng);
        runs
    }
}

/// Drops runs into random containers that still have room, spilling any
/// overflow into another one. Every container ends up exactly full.
fn distribute<R: Rng + ?Sized>(
    rng: &mut R,
    runs: Vec<LiquidLayer>,
    container_count: usize,
    capacity: usize,
) -> Vec<Container> {
    let mut containers: Vec<Container> = (0..container_count)
        .map(|id| Container::new(id, capacity))
        .collect();
    for run in runs {
        let mut remaining = run.volume;
        while remaining > 0 {
            let open: Vec<usize> = (0..container_count)
                .filter(|&i| !containers[i].is_full())
                .collect();
            let Some(&target) = open.choose(rng) else {
                break;
            };
            let amount = remaining.min(containers[target].get_empty_space());
            containers[target].pour_in(LiquidLayer::new(run.color, amount));
            remaining -= amount;
        }
    }
    containers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator(seed: Option<u64>) -> LevelGenerator {
        LevelGenerator::new(GeneratorConfig {
            seed,
            ..GeneratorConfig::default()
        })
    }

    #[test]
    fn rejects_bad_parameters() {
        let g = generator(None);
        assert!(matches!(
            g.generate_level(1, 1, 3, 3),
            Err(GenerationError::InvalidParameters { .. })
        ));
        assert!(matches!(
            g.generate_level(1, 1, 3, 4),
            Err(GenerationError::InvalidParameters { .. })
        ));
        assert!(matches!(
            g.generate_level(1, 1, 10, 2),
            Err(GenerationError::InvalidParameters { .. })
        ));
        assert!(matches!(
            g.generate_level(1, 1, 3, 1),
            Err(GenerationError::InvalidParameters { .. })
        ));
    }

    #[test]
    fn each_color_fills_exactly_one_container() {
        let g = generator(Some(11));
        let level = g.generate_level(3, 4, 6, 4).unwrap();
        assert_eq!(level.container_count, 6);
        assert_eq!(level.color_count, 4);
        assert_eq!(level.get_empty_container_count(), 2);
        for (_, volume) in level.get_color_volumes() {
            assert_eq!(volume, 4);
        }
        for container in &level.initial_containers[..4] {
            assert!(container.is_full());
        }
        let ids: Vec<usize> = level.initial_containers.iter().map(Container::get_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn same_seed_same_level() {
        let a = generator(Some(99)).generate_level(1, 2, 5, 3).unwrap();
        let b = generator(Some(99)).generate_level(1, 2, 5, 3).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    /// Always yields zero, so every random choice picks its lowest option.
    struct ZeroRng;

    impl rand::RngCore for ZeroRng {
        fn next_u32(&mut self) -> u32 {
            0
        }

        fn next_u64(&mut self) -> u64 {
            0
        }

        fn fill_bytes(&mut self, dst: &mut [u8]) {
            dst.fill(0);
        }
    }

    #[test]
    fn trivial_layout_is_left_for_the_validator() {
        use crate::solver::SearchConfig;
        use crate::validator::{LevelValidator, ValidationError, has_completed_containers};

        // Difficulty 0 under a zero RNG keeps each colour in one run, and
        // every run lands in the first open container.
        let level = generator(None)
            .generate_with_rng(&mut ZeroRng, 1, 0, 4, 2)
            .unwrap();
        assert!(has_completed_containers(&level));
        assert_eq!(level.get_empty_container_count(), 2);

        let validator = LevelValidator::new(SearchConfig::default());
        assert!(matches!(
            validator.validate_generated_level(&level),
            Err(ValidationError::AlreadySolved | ValidationError::CompletedContainer { .. })
        ));
        assert!(!validator.validate_level(&level));
    }

    #[test]
    fn layers_are_merged() {
        let level = generator(Some(5)).generate_level(1, 6, 7, 5).unwrap();
        for container in &level.initial_containers {
            for pair in container.get_layers().windows(2) {
                assert_ne!(pair[0].color, pair[1].color);
            }
        }
    }
}
