use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::similarity::generate_normalized_signature;

pub const COLOR_NAMES: [&str; 32] = [
    "RED",
    "BLUE",
    "YELLOW",
    "GREEN",
    "PURPLE",
    "ORANGE",
    "CYAN",
    "MAGENTA",
    "LIME",
    "PINK",
    "BROWN",
    "NAVY",
    "TURQUOISE",
    "OLIVE",
    "MAROON",
    "AQUA",
    "TEAL",
    "GOLD",
    "SILVER",
    "CORAL",
    "VIOLET",
    "MINT",
    "BEIGE",
    "SALMON",
    "SANDYBROWN",
    "INDIGO",
    "CRIMSON",
    "KHAKI",
    "PLUM",
    "CHOCOLATE",
    "DARKGREEN",
    "DARKORANGE",
];

/// Identifier of a liquid colour. Indexes [`COLOR_NAMES`] modulo its length.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColorId(pub usize);

impl ColorId {
    pub fn new_from_repr(repr: &str) -> Option<Self> {
        letters_to_index(repr.trim()).map(ColorId)
    }

    pub fn get_name(&self) -> &'static str {
        COLOR_NAMES[self.0 % COLOR_NAMES.len()]
    }

    pub fn get_letter_representation(&self) -> String {
        index_to_letters(self.0)
    }
}

impl fmt::Display for ColorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.get_name())
    }
}

/// Convert a single letter (A-Z) into a 0-based index.
pub fn letter_to_index(ch: char) -> Option<usize> {
    if !ch.is_ascii_alphabetic() {
        return None;
    }
    let up = ch.to_ascii_uppercase();
    Some((up as u8 - b'A') as usize)
}

/// Convert a letter sequence like "A", "Z", "AA" into a 0-based index.
/// Uses Excel-style base-26 numbering: A=0, B=1, ..., Z=25, AA=26, AB=27, ...
pub fn letters_to_index(s: &str) -> Option<usize> {
    let mut acc: usize = 0;
    let mut saw_any = false;

    for ch in s.chars() {
        let digit = letter_to_index(ch)?;
        acc = acc.checked_mul(26)?.checked_add(digit + 1)?;
        saw_any = true;
    }

    if !saw_any {
        return None;
    }
    acc.checked_sub(1)
}

/// Inverse of [`letters_to_index`].
pub fn index_to_letters(index: usize) -> String {
    let mut chars = Vec::new();
    let mut id = index + 1;
    while id > 0 {
        let rem = (id - 1) % 26;
        chars.push((b'A' + rem as u8) as char);
        id = (id - 1) / 26;
    }
    chars.iter().rev().collect()
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct LiquidLayer {
    pub color: ColorId,
    pub volume: usize,
}

impl LiquidLayer {
    pub fn new(color: ColorId, volume: usize) -> Self {
        Self { color, volume }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContainerError {
    #[error("container {id} holds {volume} units but its capacity is {capacity}")]
    Overflow {
        id: usize,
        volume: usize,
        capacity: usize,
    },
    #[error("container {id} has a layer with zero volume")]
    EmptyLayer { id: usize },
    #[error("container {id} has zero capacity")]
    ZeroCapacity { id: usize },
    #[error("container {id} has liquid above free space at unit {position}")]
    LiquidAboveSpace { id: usize, position: usize },
    #[error("container {id} has unknown token {token:?}")]
    UnknownToken { id: usize, token: String },
}

/// A container of stacked liquid layers, bottom to top.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Container {
    id: usize,
    capacity: usize,
    layers: Vec<LiquidLayer>,
}

impl Container {
    pub fn new(id: usize, capacity: usize) -> Self {
        Self {
            id,
            capacity,
            layers: Vec::new(),
        }
    }

    pub fn with_layers(
        id: usize,
        capacity: usize,
        layers: Vec<LiquidLayer>,
    ) -> Result<Self, ContainerError> {
        let container = Self {
            id,
            capacity,
            layers,
        };
        container.check_invariants()?;
        Ok(container)
    }

    /// Parse a container from its letter form, e.g. `"AAB."` or `"A,AB,."`.
    /// Every token is one unit; `.` is free space and sets the capacity.
    /// Free space may only sit above the liquid.
    pub fn new_from_repr(id: usize, repr: &str) -> Result<Self, ContainerError> {
        let tokens: Vec<String> = if repr.contains(',') {
            repr.split(',').map(|t| t.trim().to_string()).collect()
        } else {
            repr.chars().map(|c| c.to_string()).collect()
        };
        let mut container = Self::new(id, tokens.len());
        let mut saw_space = false;
        for (position, token) in tokens.iter().enumerate() {
            if token == "." {
                saw_space = true;
                continue;
            }
            let Some(color) = ColorId::new_from_repr(token) else {
                return Err(ContainerError::UnknownToken {
                    id,
                    token: token.clone(),
                });
            };
            if saw_space {
                return Err(ContainerError::LiquidAboveSpace { id, position });
            }
            container.pour_in(LiquidLayer::new(color, 1));
        }
        container.check_invariants()?;
        Ok(container)
    }

    pub fn check_invariants(&self) -> Result<(), ContainerError> {
        if self.capacity == 0 {
            return Err(ContainerError::ZeroCapacity { id: self.id });
        }
        if self.layers.iter().any(|l| l.volume == 0) {
            return Err(ContainerError::EmptyLayer { id: self.id });
        }
        let volume = self.get_current_volume();
        if volume > self.capacity {
            return Err(ContainerError::Overflow {
                id: self.id,
                volume,
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    pub fn get_id(&self) -> usize {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: usize) {
        self.id = id;
    }

    pub fn get_capacity(&self) -> usize {
        self.capacity
    }

    pub fn get_layers(&self) -> &[LiquidLayer] {
        &self.layers
    }

    pub fn get_current_volume(&self) -> usize {
        self.layers.iter().map(|l| l.volume).sum()
    }

    pub fn get_empty_space(&self) -> usize {
        self.capacity.saturating_sub(self.get_current_volume())
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.get_current_volume() >= self.capacity
    }

    /// Empty, or every layer shares one colour.
    pub fn is_sorted(&self) -> bool {
        match self.layers.first() {
            None => true,
            Some(first) => self.layers.iter().all(|l| l.color == first.color),
        }
    }

    /// Full and single-coloured.
    pub fn is_completed(&self) -> bool {
        !self.is_empty() && self.is_full() && self.is_sorted()
    }

    pub fn get_top_color(&self) -> Option<ColorId> {
        self.layers.last().map(|l| l.color)
    }

    /// Volume of the contiguous same-colour run at the top.
    pub fn get_top_run_volume(&self) -> usize {
        let Some(top) = self.get_top_color() else {
            return 0;
        };
        self.layers
            .iter()
            .rev()
            .take_while(|l| l.color == top)
            .map(|l| l.volume)
            .sum()
    }

    /// Adds liquid on top, merging into the top layer when the colour matches.
    /// The caller is responsible for the capacity check.
    pub(crate) fn pour_in(&mut self, layer: LiquidLayer) {
        match self.layers.last_mut() {
            Some(top) if top.color == layer.color => top.volume += layer.volume,
            _ => self.layers.push(layer),
        }
    }

    /// Removes `volume` units of the top colour, splitting a layer if needed.
    /// Returns `None` without touching the container if the top run is shorter.
    pub(crate) fn take_from_top(&mut self, volume: usize) -> Option<LiquidLayer> {
        let color = self.get_top_color()?;
        if volume == 0 || self.get_top_run_volume() < volume {
            return None;
        }
        let mut remaining = volume;
        while remaining > 0 {
            let top = self.layers.last_mut()?;
            if top.volume > remaining {
                top.volume -= remaining;
                remaining = 0;
            } else {
                remaining -= top.volume;
                self.layers.pop();
            }
        }
        Some(LiquidLayer::new(color, volume))
    }

    /// A copy with consecutive same-colour layers collapsed into one.
    pub fn merge_adjacent_layers(&self) -> Container {
        let mut merged = Container::new(self.id, self.capacity);
        for layer in &self.layers {
            merged.pour_in(*layer);
        }
        merged
    }

    pub fn get_text_representation(&self) -> String {
        let mut repr = vec![];
        for layer in &self.layers {
            for _ in 0..layer.volume {
                repr.push(layer.color.get_letter_representation());
            }
        }
        for _ in 0..self.get_empty_space() {
            repr.push(".".to_string());
        }
        let has_multi_char = repr.iter().any(|s| s.len() > 1);
        let separator = if has_multi_char { "," } else { "" };
        repr.join(separator)
    }
}

/// True iff every container is sorted; empty containers count as solved.
pub fn are_all_sorted(containers: &[Container]) -> bool {
    containers.iter().all(Container::is_sorted)
}

/// Total volume per colour.
pub fn color_volumes(containers: &[Container]) -> BTreeMap<ColorId, usize> {
    let mut volumes = BTreeMap::new();
    for container in containers {
        for layer in container.get_layers() {
            *volumes.entry(layer.color).or_insert(0) += layer.volume;
        }
    }
    volumes
}

/// A generated puzzle. Never mutated in place: optimisation yields a new `Level`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    pub id: u32,
    pub difficulty: u32,
    pub container_count: usize,
    pub color_count: usize,
    pub initial_containers: Vec<Container>,
    pub signature: String,
}

impl Level {
    pub fn new(id: u32, difficulty: u32, initial_containers: Vec<Container>) -> Self {
        let color_count = color_volumes(&initial_containers).len();
        let mut level = Self {
            id,
            difficulty,
            container_count: initial_containers.len(),
            color_count,
            initial_containers,
            signature: String::new(),
        };
        level.signature = generate_normalized_signature(&level);
        level
    }

    /// Parse whitespace-separated container strings, see [`Container::new_from_repr`].
    pub fn new_from_repr(id: u32, difficulty: u32, repr: &str) -> Result<Self, ContainerError> {
        let containers = repr
            .split_whitespace()
            .enumerate()
            .map(|(index, token)| Container::new_from_repr(index, token))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(id, difficulty, containers))
    }

    /// Same id and difficulty over a different container list, with
    /// counts and signature recomputed.
    pub fn with_containers(&self, containers: Vec<Container>) -> Self {
        Self::new(self.id, self.difficulty, containers)
    }

    pub fn is_solved(&self) -> bool {
        are_all_sorted(&self.initial_containers)
    }

    pub fn get_color_volumes(&self) -> BTreeMap<ColorId, usize> {
        color_volumes(&self.initial_containers)
    }

    pub fn get_total_volume(&self) -> usize {
        self.initial_containers
            .iter()
            .map(Container::get_current_volume)
            .sum()
    }

    pub fn get_empty_container_count(&self) -> usize {
        self.initial_containers.iter().filter(|c| c.is_empty()).count()
    }

    pub fn get_text_representation(&self) -> String {
        self.initial_containers
            .iter()
            .map(Container::get_text_representation)
            .collect::<Vec<_>>()
            .join(" ")
    }
}
