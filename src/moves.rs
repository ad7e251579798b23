use serde::{Deserialize, Serialize};

use crate::model::{ColorId, Container, LiquidLayer};

/// How much of a top run a pour transfers when the target cannot take all of it.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PourPolicy {
    /// The whole run moves or the pour is illegal. This is what the player gets.
    #[default]
    AllOrNothing,
    /// The run is capped to the target's free space.
    Capped,
}

/// A candidate pour between two containers, addressed by container id.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidMove {
    pub from_container: usize,
    pub to_container: usize,
    pub liquid_color: ColorId,
    pub volume: usize,
}

/// Volume `from` could pour into `to` under `policy`, or 0 if the pour is illegal.
pub fn pourable_amount(from: &Container, to: &Container, policy: PourPolicy) -> usize {
    let Some(color) = from.get_top_color() else {
        return 0;
    };
    if to.is_full() {
        return 0;
    }
    if !to.is_empty() && to.get_top_color() != Some(color) {
        return 0;
    }
    let run = from.get_top_run_volume();
    let space = to.get_empty_space();
    match policy {
        PourPolicy::Capped => run.min(space),
        PourPolicy::AllOrNothing if run <= space => run,
        PourPolicy::AllOrNothing => 0,
    }
}

/// Every legal pour, capping each transfer to the target's free space.
pub fn enumerate_legal_moves(containers: &[Container]) -> Vec<ValidMove> {
    enumerate_moves(containers, PourPolicy::Capped)
}

pub fn enumerate_moves(containers: &[Container], policy: PourPolicy) -> Vec<ValidMove> {
    let mut moves = Vec::new();
    for from in containers {
        if from.is_empty() {
            continue;
        }
        for to in containers {
            if from.get_id() == to.get_id() {
                continue;
            }
            let volume = pourable_amount(from, to, policy);
            if volume >= 1
                && let Some(liquid_color) = from.get_top_color()
            {
                moves.push(ValidMove {
                    from_container: from.get_id(),
                    to_container: to.get_id(),
                    liquid_color,
                    volume,
                });
            }
        }
    }
    moves
}

/// Applies a move to a copy of `containers`. Returns `None` if the ids are
/// unknown or the move no longer fits the layout.
pub fn apply_move(containers: &[Container], mv: &ValidMove) -> Option<Vec<Container>> {
    let from = containers.iter().position(|c| c.get_id() == mv.from_container)?;
    let to = containers.iter().position(|c| c.get_id() == mv.to_container)?;
    if from == to || containers[to].get_empty_space() < mv.volume {
        return None;
    }
    let mut next = containers.to_vec();
    let taken = next[from].take_from_top(mv.volume)?;
    if taken.color != mv.liquid_color {
        return None;
    }
    next[to].pour_in(LiquidLayer::new(taken.color, taken.volume));
    Some(next)
}
