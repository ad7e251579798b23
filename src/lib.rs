//! Level generation and rules engine for a liquid-sorting puzzle.
//!
//! Containers hold stacked layers of coloured liquid. A pour moves the top
//! run of one container onto another, and a level is won when every container
//! holds a single colour.
//!
//! - [`gameplay::GameState`] applies pours and keeps an undo/redo history.
//! - [`solver::Solver`] proves levels solvable with a bounded breadth-first search.
//! - [`generator::LevelGenerator`] builds random layouts from a seed.
//! - [`validator::LevelValidator`] rejects trivial or unprovable levels and trims spare containers.
//! - [`similarity`] compares levels independent of colour choice and container order.
//! - [`service::GenerationService`] ties these together with retries and a session history.

pub mod config;
pub mod error;
pub mod gameplay;
pub mod generator;
pub mod model;
pub mod moves;
pub mod persistence;
pub mod service;
pub mod similarity;
pub mod solver;
pub mod validator;

pub use config::EngineConfig;
pub use error::GenerationError;
pub use gameplay::{GameState, Move, PourError, PourResult};
pub use generator::{GeneratorConfig, LevelGenerator};
pub use model::{ColorId, Container, Level, LiquidLayer};
pub use moves::{PourPolicy, ValidMove};
pub use service::{GenerationRequest, GenerationService, ServiceConfig};
pub use solver::{CancelFlag, SearchConfig, SearchOutcome, Solver};
pub use validator::{LevelValidator, ValidationError};
