// incremental binary optimisation: deltas in, boolean mappings out

mod builder;
mod delta;
mod lp;
mod objective;
mod solver;

pub use builder::{mapping_name, rejection_name, DeltaBuilder};
pub use delta::{ConstraintDef, OptimizationDelta, Sense, TermDef, VariableDef};
pub use lp::LpSolver;
pub use objective::{Objective, RejectionCost, UnknownObjective, REJECTION_COST};
pub use solver::{IncrementalSolver, SolverError, SolverStatus, Statistics};
