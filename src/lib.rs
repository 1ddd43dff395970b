// virtual network embedding onto a substrate network, by growing a binary
// optimisation model one delta at a time

pub mod algorithm;
pub mod config;
pub(crate) mod dsa;
pub mod embedding;
pub mod error;
pub mod ilp;
pub mod matching;
pub mod network;
pub mod paths;

pub use algorithm::{AttemptState, EmbeddingAlgorithm, Lookahead, Migration, Pipeline, SinglePass, SolverFactory};
pub use config::{ConfigError, EngineConfig};
pub use embedding::{ApplyError, EmbeddingApplier};
pub use error::{EmbeddingError, Result};
pub use ilp::{DeltaBuilder, IncrementalSolver, LpSolver, Objective, OptimizationDelta, RejectionCost, SolverStatus, Statistics};
pub use matching::{CandidateScanner, Match, MatchSource};
pub use network::{EmbeddingState, Model, ModelError, NetworkIdx, Resources};
pub use paths::{generate_paths, PathConfig, PathError, PathMode};
