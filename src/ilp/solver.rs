use std::collections::BTreeMap;
use std::fmt::Display;
use std::time::Duration;

use thiserror::Error;

use super::delta::OptimizationDelta;

#[derive(Error,Debug,Clone,PartialEq)]
pub enum SolverError {
    #[error("variable {name} is not part of the model")]
    UnknownVariable{name:String},
    #[error("constraint {name} is not part of the model")]
    UnknownConstraint{name:String},
    #[error("{name} is defined twice")]
    Redefinition{name:String},
    #[error("the solver was disposed")]
    Disposed,
}

#[derive(Debug,Clone,Copy,PartialEq,Eq)]
pub enum SolverStatus {
    Optimal,
    Infeasible,
    InfOrUnbounded,
    Unbounded,
    TimeOut
}

impl Display for SolverStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SolverStatus::Optimal => "OPTIMAL",
            SolverStatus::Infeasible => "INFEASIBLE",
            SolverStatus::InfOrUnbounded => "INF_OR_UNBOUNDED",
            SolverStatus::Unbounded => "UNBOUNDED",
            SolverStatus::TimeOut => "TIME_OUT"
        };
        write!(f,"{name}")
    }
}

#[derive(Debug,Clone,PartialEq)]
pub struct Statistics {
    pub status:SolverStatus,
    pub duration:Duration,
    pub presolve_time:Duration,
    pub rows_removed:usize,
    pub cols_removed:usize,
    pub objective:Option<f64>,
    pub has_incumbent:bool
}

impl Statistics {
    // optimal, or out of time with a solution in hand
    pub fn is_feasible(&self) -> bool {
        match self.status {
            SolverStatus::Optimal => true,
            SolverStatus::TimeOut => self.has_incumbent,
            _ => false
        }
    }
}

// the only boundary between the engine and an optimisation backend
pub trait IncrementalSolver {
    // empty deltas are ignored
    fn apply(&mut self,delta:OptimizationDelta) -> Result<(),SolverError>;
    fn solve(&mut self) -> Result<Statistics,SolverError>;
    // value of every variable after the last solve
    fn mappings(&self) -> &BTreeMap<String,bool>;
    // pins every variable the predicate picks to its last value, or to
    // false when it was never solved.
    fn lock_variables(&mut self,predicate:&dyn Fn(&str,bool) -> bool);
    fn set_time_limit(&mut self,limit:Option<Duration>);
    fn time_limit(&self) -> Option<Duration>;
    fn dispose(&mut self);
}
