//! Property-based tests for the rules engine and level generator.

use liquid_sort::model::color_volumes;
use liquid_sort::{
    ColorId, Container, GameState, GeneratorConfig, Level, LevelGenerator, LevelValidator,
    LiquidLayer, SearchConfig,
};
use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

fn generate(seed: u64, colors: usize, empties: usize, difficulty: u32, capacity: usize) -> Level {
    let generator = LevelGenerator::new(GeneratorConfig {
        container_capacity: capacity,
        seed: Some(seed),
        ..GeneratorConfig::default()
    });
    generator
        .generate_level(1, difficulty, colors + empties, colors)
        .unwrap()
}

fn level_params() -> impl Strategy<Value = (u64, usize, usize, u32, usize)> {
    (any::<u64>(), 2usize..=5, 1usize..=3, 0u32..=6, 2usize..=6)
}

/// Up to twelve colours, enough for long runs of identically shaped containers.
fn wide_level_params() -> impl Strategy<Value = (u64, usize, usize, u32, usize)> {
    (any::<u64>(), 2usize..=12, 1usize..=3, 0u32..=6, 2usize..=6)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: every colour adds up to exactly one container's capacity.
    #[test]
    fn prop_generated_volume_is_conserved(
        (seed, colors, empties, difficulty, capacity) in level_params()
    ) {
        let level = generate(seed, colors, empties, difficulty, capacity);
        let volumes = level.get_color_volumes();
        prop_assert_eq!(volumes.len(), colors);
        for (color, volume) in volumes {
            prop_assert_eq!(volume, capacity, "colour {} has {} units", color, volume);
        }
        for container in &level.initial_containers {
            prop_assert!(container.get_current_volume() <= container.get_capacity());
        }
        prop_assert_eq!(level.get_empty_container_count(), empties);
    }

    /// Property: no sequence of pours overfills a container or loses liquid,
    /// undo exactly reverses a pour, and won/lost never hold together.
    #[test]
    fn prop_pours_respect_capacity_and_undo(
        (seed, colors, empties, difficulty, capacity) in level_params(),
        pours in prop::collection::vec((0usize..8, 0usize..8), 1..40)
    ) {
        let level = generate(seed, colors, empties, difficulty, capacity);
        let expected = level.get_color_volumes();
        let mut state = GameState::from_level(&level);

        for (from, to) in pours {
            let Ok(next) = state.execute_pour(from, to) else {
                continue;
            };
            for container in next.get_containers() {
                prop_assert!(container.get_current_volume() <= container.get_capacity());
            }
            prop_assert_eq!(color_volumes(next.get_containers()), expected.clone());
            prop_assert!(!(next.is_completed() && next.is_lost()));
            prop_assert_eq!(next.check_win_condition(), next.is_completed());

            let undone = next.undo_last_move().unwrap();
            prop_assert!(undone.same_position(&state));
            prop_assert_eq!(undone.get_containers(), state.get_containers());
            let redone = undone.redo_next_move().unwrap();
            prop_assert_eq!(&redone, &next);

            state = next;
        }
    }

    /// Property: signatures ignore which colours are used and how containers are ordered.
    #[test]
    fn prop_signature_invariant_under_recolor_and_permutation(
        (seed, colors, empties, difficulty, capacity) in wide_level_params(),
        shuffle_seed in any::<u64>()
    ) {
        let level = generate(seed, colors, empties, difficulty, capacity);
        let mut rng = StdRng::seed_from_u64(shuffle_seed);

        let mut palette: Vec<usize> = (0..40).collect();
        palette.shuffle(&mut rng);
        let mut order: Vec<usize> = (0..level.initial_containers.len()).collect();
        order.shuffle(&mut rng);

        let transformed: Vec<Container> = order
            .iter()
            .enumerate()
            .map(|(new_id, &old)| {
                let source = &level.initial_containers[old];
                let layers = source
                    .get_layers()
                    .iter()
                    .map(|l| LiquidLayer::new(ColorId(palette[l.color.0]), l.volume))
                    .collect();
                Container::with_layers(new_id, source.get_capacity(), layers).unwrap()
            })
            .collect();
        let other = Level::new(level.id, level.difficulty, transformed);

        prop_assert_eq!(&other.signature, &level.signature);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: small generated levels pass validation under the default budgets.
    #[test]
    fn prop_generated_levels_validate(
        seed in any::<u64>(),
        (colors, empties) in prop_oneof![Just((2usize, 2usize)), Just((3, 2)), Just((4, 2))],
        difficulty in 1u32..=6
    ) {
        let level = generate(seed, colors, empties, difficulty, 4);
        let validator = LevelValidator::new(SearchConfig::default());
        let verdict = validator.validate_generated_level(&level);
        prop_assert!(
            verdict.is_ok(),
            "{} rejected: {:?}",
            level.get_text_representation(),
            verdict
        );
    }
}
