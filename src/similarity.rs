//! Colour-agnostic, order-independent comparison of levels.
//!
//! Colours are relabelled A, B, C, ... in order of first appearance and every
//! container becomes one letter per unit of volume, bottom to top. Two levels
//! that differ only by which literal colours they use, or by the order of
//! their containers, produce the same signature.
//!
//! The canonical container order is the one whose relabelled patterns form the
//! smallest sequence. Containers that share no colour, directly or through
//! other containers, are canonicalised as separate groups and then joined in
//! the order of their own canonical sequences.

use std::cmp::Ordering;
use std::collections::HashMap;

use itertools::Itertools;

use crate::model::{ColorId, Container, Level, index_to_letters};

pub const SIMILARITY_THRESHOLD: f64 = 0.8;
pub const EMPTY_TOKEN: &str = "EMPTY";

/// Pattern of one container under `labels`, adding a label for each new colour.
fn relabel(container: &Container, labels: &mut HashMap<ColorId, String>) -> String {
    let mut pattern = String::new();
    for layer in container.get_layers() {
        let next = labels.len();
        let label = labels
            .entry(layer.color)
            .or_insert_with(|| index_to_letters(next));
        for _ in 0..layer.volume {
            pattern.push_str(label);
        }
    }
    pattern
}

fn normalize_refs<'a>(containers: impl IntoIterator<Item = &'a Container>) -> Vec<String> {
    let mut labels = HashMap::new();
    containers
        .into_iter()
        .map(|container| {
            if container.is_empty() {
                EMPTY_TOKEN.to_string()
            } else {
                relabel(container, &mut labels)
            }
        })
        .collect()
}

/// Relabels colours by first appearance, scanning containers in the given order.
pub fn normalize_colors(containers: &[Container]) -> Vec<String> {
    normalize_refs(containers)
}

/// Splits filled containers into groups that are connected through shared colours.
fn colour_groups<'a>(filled: &[&'a Container]) -> Vec<Vec<&'a Container>> {
    let mut group_of: HashMap<ColorId, usize> = HashMap::new();
    let mut groups: Vec<Vec<&'a Container>> = Vec::new();
    for &container in filled {
        let hits: Vec<usize> = container
            .get_layers()
            .iter()
            .filter_map(|l| group_of.get(&l.color).copied())
            .sorted()
            .dedup()
            .collect();
        let target = match hits.first() {
            Some(&group) => group,
            None => {
                groups.push(Vec::new());
                groups.len() - 1
            }
        };
        for &other in hits.iter().skip(1) {
            let moved = std::mem::take(&mut groups[other]);
            for layer in moved.iter().flat_map(|c| c.get_layers()) {
                group_of.insert(layer.color, target);
            }
            groups[target].extend(moved);
        }
        for layer in container.get_layers() {
            group_of.insert(layer.color, target);
        }
        groups[target].push(container);
    }
    groups.retain(|g| !g.is_empty());
    groups
}

/// Depth-first search for the container order with the smallest pattern sequence.
///
/// Each step only branches on the containers tied for the smallest next
/// pattern, skips containers identical to a tied sibling, and abandons a
/// branch once its prefix sorts after the best complete order.
struct OrderSearch<'a> {
    patterns: Vec<String>,
    order: Vec<&'a Container>,
    best: Option<(Vec<String>, Vec<&'a Container>)>,
}

impl<'a> OrderSearch<'a> {
    fn run(containers: &[&'a Container]) -> (Vec<String>, Vec<&'a Container>) {
        let mut search = Self {
            patterns: Vec::with_capacity(containers.len()),
            order: Vec::with_capacity(containers.len()),
            best: None,
        };
        search.place(containers, &HashMap::new());
        search.best.unwrap_or_default()
    }

    fn is_behind_best(&self, next: &str) -> bool {
        let Some((best, _)) = &self.best else {
            return false;
        };
        let depth = self.patterns.len();
        let prefix = self.patterns.iter().map(String::as_str).chain([next]);
        prefix.cmp(best[..=depth].iter().map(String::as_str)) == Ordering::Greater
    }

    fn place(&mut self, remaining: &[&'a Container], labels: &HashMap<ColorId, String>) {
        if remaining.is_empty() {
            let improves = self
                .best
                .as_ref()
                .is_none_or(|(best, _)| self.patterns < *best);
            if improves {
                self.best = Some((self.patterns.clone(), self.order.clone()));
            }
            return;
        }

        let ties = remaining
            .iter()
            .enumerate()
            .map(|(index, container)| {
                let mut extended = labels.clone();
                let pattern = relabel(container, &mut extended);
                (index, pattern, extended)
            })
            .min_set_by(|a, b| a.1.cmp(&b.1));
        if ties.first().is_none_or(|(_, next, _)| self.is_behind_best(next)) {
            return;
        }

        for (index, pattern, extended) in ties
            .iter()
            .unique_by(|(index, _, _)| remaining[*index].get_layers())
        {
            let rest: Vec<&'a Container> = remaining
                .iter()
                .enumerate()
                .filter(|&(i, _)| i != *index)
                .map(|(_, &c)| c)
                .collect();
            self.patterns.push(pattern.clone());
            self.order.push(remaining[*index]);
            self.place(&rest, extended);
            self.patterns.pop();
            self.order.pop();
        }
    }
}

/// Sorted per-container patterns, independent of both colour choice and container order.
pub fn canonical_patterns(containers: &[Container]) -> Vec<String> {
    let filled: Vec<&Container> = containers.iter().filter(|c| !c.is_empty()).collect();
    let empty_count = containers.len() - filled.len();

    let mut groups: Vec<(Vec<String>, Vec<&Container>)> = colour_groups(&filled)
        .iter()
        .map(|group| OrderSearch::run(group))
        .collect();
    groups.sort_by(|a, b| a.0.cmp(&b.0));

    let mut patterns = normalize_refs(groups.iter().flat_map(|(_, order)| order.iter().copied()));
    patterns.extend(std::iter::repeat_n(EMPTY_TOKEN.to_string(), empty_count));
    patterns.sort();
    patterns
}

pub fn generate_normalized_signature(level: &Level) -> String {
    let patterns = canonical_patterns(&level.initial_containers);
    format!(
        "containers:{}|pattern:{}",
        level.initial_containers.len(),
        patterns.join(",")
    )
}

/// Patterns recorded in a well-formed signature for this level's container count.
fn signature_patterns(level: &Level) -> Option<Vec<String>> {
    let (head, tail) = level.signature.split_once("|pattern:")?;
    let count: usize = head.strip_prefix("containers:")?.parse().ok()?;
    if count != level.initial_containers.len() {
        return None;
    }
    let patterns: Vec<String> = if tail.is_empty() {
        Vec::new()
    } else {
        tail.split(',').map(str::to_string).collect()
    };
    (patterns.len() == count).then_some(patterns)
}

/// Canonical patterns of a level, read back from its signature when it has one.
pub fn level_patterns(level: &Level) -> Vec<String> {
    signature_patterns(level).unwrap_or_else(|| canonical_patterns(&level.initial_containers))
}

/// Fraction of canonical container patterns the two levels share position for position.
pub fn compare_structural_patterns(a: &Level, b: &Level) -> f64 {
    if a.initial_containers.len() != b.initial_containers.len() {
        return 0.0;
    }
    let patterns_a = level_patterns(a);
    let patterns_b = level_patterns(b);
    if patterns_a.is_empty() {
        return 1.0;
    }
    let matching = patterns_a
        .iter()
        .zip(&patterns_b)
        .filter(|(x, y)| x == y)
        .count();
    matching as f64 / patterns_a.len() as f64
}

pub fn are_levels_similar(a: &Level, b: &Level) -> bool {
    are_levels_similar_with(a, b, SIMILARITY_THRESHOLD)
}

pub fn are_levels_similar_with(a: &Level, b: &Level, threshold: f64) -> bool {
    compare_structural_patterns(a, b) >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(repr: &str) -> Level {
        Level::new_from_repr(1, 1, repr).unwrap()
    }

    #[test]
    fn normalizes_by_first_appearance() {
        let l = level("CCAB BA.. ....");
        assert_eq!(normalize_colors(&l.initial_containers), vec!["AABC", "CB", "EMPTY"]);
    }

    #[test]
    fn signature_format() {
        let l = level("AABB BBAA ....");
        assert_eq!(l.signature, "containers:3|pattern:AABB,BBAA,EMPTY");
    }

    #[test]
    fn recoloring_keeps_signature() {
        let a = level("AABC BCCA CBAB ....");
        let b = level("XXYZ YZZX ZYXY ....");
        assert_eq!(a.signature, b.signature);
        assert_eq!(compare_structural_patterns(&a, &b), 1.0);
    }

    #[test]
    fn container_order_is_irrelevant() {
        let a = level("AABC BCCA CBAB .... AB..");
        let b = level(".... CBAB AB.. BCCA AABC");
        let c = level("AB.. AABC .... CBAB BCCA");
        assert_eq!(a.signature, b.signature);
        assert_eq!(a.signature, c.signature);
    }

    #[test]
    fn tied_shapes_are_canonical() {
        // Both filled containers have the shape "AABB" on their own.
        let a = level("AABB BBCC ....");
        let b = level("BBCC AABB ....");
        let c = level("CCAA AABB ....");
        assert_eq!(a.signature, b.signature);
        assert_eq!(a.signature, c.signature);
    }

    #[test]
    fn different_structure_changes_signature() {
        let a = level("AABB BBAA ....");
        let b = level("ABAB BABA ....");
        assert_ne!(a.signature, b.signature);
        assert!(compare_structural_patterns(&a, &b) < SIMILARITY_THRESHOLD);
    }

    #[test]
    fn container_count_mismatch_scores_zero() {
        let a = level("AABB BBAA ....");
        let b = level("AABB BBAA .... ....");
        assert_eq!(compare_structural_patterns(&a, &b), 0.0);
        assert!(!are_levels_similar(&a, &b));
    }

    #[test]
    fn long_tie_chains_are_canonical() {
        // Ten containers of identical shape linked in a ring of colours.
        let ring = "AABB BBCC CCDD DDEE EEFF FFGG GGHH HHII IIJJ JJAA .... ....";
        let rotated = ".... IIJJ JJAA AABB BBCC .... CCDD DDEE EEFF FFGG GGHH HHII";
        let recoloured = "QQPP PPOO OOMM MMLL LLKK KKZZ ZZYY YYXX XXWW WWQQ .... ....";
        let a = level(ring);
        assert_eq!(a.signature, level(rotated).signature);
        assert_eq!(a.signature, level(recoloured).signature);
    }

    #[test]
    fn disconnected_groups_are_canonical() {
        let a = level("AABB BBAA CCDD DDCC EEFE FEEF ....");
        let b = level("FEEF CCDD .... BBAA DDCC EEFE AABB");
        let c = level("AABB DDCC EEFE BBAA FEEF CCDD ....");
        assert_eq!(a.signature, b.signature);
        assert_eq!(a.signature, c.signature);
    }

    #[test]
    fn shuffled_generated_levels_keep_signature() {
        use crate::generator::{GeneratorConfig, LevelGenerator};
        use rand::SeedableRng;
        use rand::rngs::StdRng;
        use rand::seq::SliceRandom;

        for seed in 0..20 {
            let generator = LevelGenerator::new(GeneratorConfig {
                seed: Some(seed),
                ..GeneratorConfig::default()
            });
            let level = generator.generate_level(1, 6, 12, 10).unwrap();
            let mut rng = StdRng::seed_from_u64(seed);
            for _ in 0..3 {
                let mut containers = level.initial_containers.clone();
                containers.shuffle(&mut rng);
                let shuffled = level.with_containers(containers);
                assert_eq!(shuffled.signature, level.signature, "seed {seed}");
                assert_eq!(compare_structural_patterns(&level, &shuffled), 1.0);
            }
        }
    }

    #[test]
    fn comparison_reads_stored_signature() {
        let a = level("AABB BBAA ....");
        let mut stored = a.clone();
        stored.signature = "containers:3|pattern:ABAB,BABA,EMPTY".into();
        assert!((compare_structural_patterns(&a, &stored) - 1.0 / 3.0).abs() < 1e-9);

        let mut missing = a.clone();
        missing.signature.clear();
        assert_eq!(level_patterns(&missing), vec!["AABB", "BBAA", "EMPTY"]);
        assert_eq!(compare_structural_patterns(&a, &missing), 1.0);
    }

    #[test]
    fn partial_overlap_scores_fraction() {
        let a = level("AABB BBAA .... ....");
        let b = level("AABB BABA .... ....");
        let score = compare_structural_patterns(&a, &b);
        assert!((score - 0.75).abs() < 1e-9, "score was {score}");
        assert!(!are_levels_similar(&a, &b));
        assert!(are_levels_similar_with(&a, &b, 0.75));
    }
}
