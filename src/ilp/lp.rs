// named binary model on top of good_lp
// the good_lp problem is rebuilt from the named model on every solve, after a
// presolve that removes what locking and capacity already decide

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use good_lp::solvers::highs::highs;
use good_lp::{constraint, variable, Expression, ProblemVariables, ResolutionError, Solution, SolverModel, Variable};
use tracing::{debug, info, trace, warn};

use super::delta::{OptimizationDelta, Sense};
use super::solver::{IncrementalSolver, SolverError, SolverStatus, Statistics};

type Result<T> = std::result::Result<T,SolverError>;

const EPS:f64 = 1e-9;

#[derive(Debug,Clone)]
struct Column {
    cost:f64,
    fixed:Option<bool>
}

#[derive(Debug,Clone)]
struct Row {
    sense:Sense,
    rhs:f64,
    terms:BTreeMap<String,f64>
}

// a row left after presolve, over free columns only
struct ReducedRow {
    sense:Sense,
    rhs:f64,
    terms:Vec<(String,f64)>
}

struct Presolved {
    fixed:BTreeMap<String,bool>,
    rows:Vec<ReducedRow>,
    rows_removed:usize,
    infeasible:Option<String>
}

fn satisfies(rows:&[ReducedRow],values:&BTreeMap<String,bool>) -> bool {
    rows.iter().all(|row| {
        let lhs:f64 = row.terms.iter()
            .filter(|(name,_)| values.get(name).copied().unwrap_or(false))
            .map(|(_,coefficient)| coefficient)
            .sum();
        match row.sense {
            Sense::LessEqual => lhs <= row.rhs + EPS,
            Sense::Equal => (lhs - row.rhs).abs() <= EPS
        }
    })
}

fn verdict(limit:Option<Duration>,elapsed:Duration,feasible:bool) -> SolverStatus {
    let timed_out = limit.is_some_and(|limit| elapsed >= limit);
    match (timed_out,feasible) {
        (true,_) => SolverStatus::TimeOut,
        (false,true) => SolverStatus::Optimal,
        (false,false) => SolverStatus::InfOrUnbounded
    }
}

#[derive(Debug,Default)]
pub struct LpSolver {
    variables:BTreeMap<String,Column>,
    constraints:BTreeMap<String,Row>,
    sos1:BTreeMap<String,BTreeSet<String>>,
    mappings:BTreeMap<String,bool>,
    time_limit:Option<Duration>,
    disposed:bool
}

impl LpSolver {
    pub fn new(time_limit:Option<Duration>) -> Self {
        Self {time_limit,..Self::default()}
    }

    // rejects a delta up front instead of leaving half of it applied
    fn check(&self,delta:&OptimizationDelta) -> Result<()> {
        let new_variables:BTreeSet<&str> = delta.variables.iter().map(|v| v.name.as_str()).collect();
        let new_constraints:BTreeSet<&str> = delta.constraints.iter().map(|c| c.name.as_str()).collect();
        for name in new_variables.iter() {
            if self.variables.contains_key(*name) {
                return Err(SolverError::Redefinition { name:name.to_string() })
            }
        }
        for name in new_constraints.iter() {
            if self.constraints.contains_key(*name) {
                return Err(SolverError::Redefinition { name:name.to_string() })
            }
        }
        let known_variable = |name:&str| self.variables.contains_key(name) || new_variables.contains(name);
        let known_constraint = |name:&str| self.constraints.contains_key(name) || new_constraints.contains(name);
        for term in delta.terms.iter() {
            if !known_constraint(term.constraint.as_str()) {
                return Err(SolverError::UnknownConstraint { name:term.constraint.clone() })
            }
        }
        for (name,_) in delta.cost_updates.iter() {
            if !known_variable(name.as_str()) {
                return Err(SolverError::UnknownVariable { name:name.clone() })
            }
        }
        for (name,_) in delta.rhs_updates.iter() {
            if !known_constraint(name.as_str()) {
                return Err(SolverError::UnknownConstraint { name:name.clone() })
            }
        }
        for (_,member) in delta.sos1.iter() {
            if !known_variable(member.as_str()) {
                return Err(SolverError::UnknownVariable { name:member.clone() })
            }
        }
        for name in delta.removed_variables.iter() {
            if !known_variable(name.as_str()) {
                return Err(SolverError::UnknownVariable { name:name.clone() })
            }
        }
        for name in delta.removed_constraints.iter() {
            if !known_constraint(name.as_str()) {
                return Err(SolverError::UnknownConstraint { name:name.clone() })
            }
        }
        Ok(())
    }

    fn presolve(&self) -> Presolved {
        let mut fixed:BTreeMap<String,bool> = self.variables.iter()
            .filter_map(|(name,c)| Some((name.clone(),c.fixed?)))
            .collect();
        let is_free = |fixed:&BTreeMap<String,bool>,name:&str| {
            self.variables.contains_key(name) && !fixed.contains_key(name)
        };
        // rhs after moving fixed columns over, plus the terms still free
        let reduce = |fixed:&BTreeMap<String,bool>,row:&Row| -> (f64,Vec<(String,f64)>) {
            let mut rhs = row.rhs;
            let mut free = vec![];
            for (name,coefficient) in row.terms.iter() {
                match fixed.get(name) {
                    Some(true) => rhs -= coefficient,
                    Some(false) => {},
                    // unknown columns count as zero
                    None if !self.variables.contains_key(name) => {},
                    None => free.push((name.clone(),*coefficient))
                }
            }
            (rhs,free)
        };

        loop {
            let mut changed = false;
            for members in self.sos1.values() {
                if !members.iter().any(|m| fixed.get(m) == Some(&true)) {
                    continue;
                }
                for member in members.iter() {
                    if is_free(&fixed,member.as_str()) {
                        fixed.insert(member.clone(),false);
                        changed = true;
                    }
                }
            }
            for row in self.constraints.values() {
                let (rhs,free) = reduce(&fixed,row);
                if free.iter().any(|(_,c)| *c < 0.0) {
                    continue;
                }
                let close_all = row.sense == Sense::Equal && rhs.abs() <= EPS;
                for (name,coefficient) in free {
                    // a column that cannot fit on its own, or that would overshoot a satisfied equality
                    if (close_all && coefficient > EPS) || coefficient > rhs + EPS {
                        fixed.insert(name,false);
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }

        let mut rows = Vec::with_capacity(self.constraints.len());
        let mut rows_removed = 0;
        let mut infeasible = None;
        for (name,row) in self.constraints.iter() {
            let (rhs,free) = reduce(&fixed,row);
            if free.is_empty() {
                let holds = match row.sense {
                    Sense::LessEqual => rhs >= -EPS,
                    Sense::Equal => rhs.abs() <= EPS
                };
                if !holds && infeasible.is_none() {
                    infeasible = Some(name.clone());
                }
                rows_removed += 1;
                continue;
            }
            let redundant = row.sense == Sense::LessEqual
                && free.iter().all(|(_,c)| *c >= 0.0)
                && free.iter().map(|(_,c)| c).sum::<f64>() <= rhs + EPS;
            if redundant {
                rows_removed += 1;
                continue;
            }
            rows.push(ReducedRow {sense:row.sense,rhs,terms:free});
        }
        Presolved {fixed,rows,rows_removed,infeasible}
    }

    fn objective_of(&self,values:&BTreeMap<String,bool>) -> f64 {
        values.iter()
            .filter(|(_,v)| **v)
            .filter_map(|(name,_)| self.variables.get(name))
            .map(|c| c.cost)
            .sum()
    }

    // presolve decisions plus the backend's answer for the free columns
    fn run_backend(&self,presolved:&Presolved) -> std::result::Result<BTreeMap<String,bool>,ResolutionError> {
        let mut problem_vars = ProblemVariables::new();
        let mut columns:BTreeMap<&str,Variable> = BTreeMap::new();
        for (name,column) in self.variables.iter() {
            if column.fixed.is_none() && !presolved.fixed.contains_key(name) {
                columns.insert(name.as_str(),problem_vars.add(variable().binary()));
            }
        }
        let mut values = presolved.fixed.clone();
        if columns.is_empty() {
            return Ok(values);
        }
        let objective:Expression = columns.iter()
            .map(|(name,var)| self.variables.get(*name).map_or(0.0,|c| c.cost) * *var)
            .sum();
        let mut problem = highs(problem_vars.minimise(objective));
        if let Some(limit) = self.time_limit {
            problem = problem.set_time_limit(limit.as_secs_f64());
        }
        for row in presolved.rows.iter() {
            let lhs:Expression = row.terms.iter()
                .filter_map(|(name,coefficient)| Some(*coefficient * *columns.get(name.as_str())?))
                .sum();
            let rhs = row.rhs;
            match row.sense {
                Sense::LessEqual => problem.add_constraint(constraint!(lhs <= rhs)),
                Sense::Equal => problem.add_constraint(constraint!(lhs == rhs))
            };
        }
        let solution = problem.solve()?;
        for (name,var) in columns.iter() {
            values.insert(name.to_string(),solution.value(*var) > 0.5);
        }
        Ok(values)
    }
}

impl IncrementalSolver for LpSolver {
    fn apply(&mut self,delta:OptimizationDelta) -> Result<()> {
        if self.disposed {
            return Err(SolverError::Disposed)
        }
        if delta.is_empty() {
            trace!("empty delta ignored");
            return Ok(())
        }
        self.check(&delta)?;
        let size = delta.len();
        for def in delta.variables {
            self.variables.insert(def.name,Column {cost:def.cost,fixed:None});
        }
        for def in delta.constraints {
            self.constraints.insert(def.name,Row {sense:def.sense,rhs:def.rhs,terms:BTreeMap::new()});
        }
        for term in delta.terms {
            if let Some(row) = self.constraints.get_mut(&term.constraint) {
                row.terms.insert(term.variable,term.coefficient);
            }
        }
        for (name,cost) in delta.cost_updates {
            if let Some(column) = self.variables.get_mut(&name) {
                column.cost = cost;
            }
        }
        for (name,rhs) in delta.rhs_updates {
            if let Some(row) = self.constraints.get_mut(&name) {
                row.rhs = rhs;
            }
        }
        for (group,member) in delta.sos1 {
            self.sos1.entry(group).or_default().insert(member);
        }
        for name in delta.removed_variables.iter() {
            self.variables.remove(name);
            self.mappings.remove(name);
            for row in self.constraints.values_mut() {
                row.terms.remove(name);
            }
            for members in self.sos1.values_mut() {
                members.remove(name);
            }
        }
        for name in delta.removed_constraints.iter() {
            self.constraints.remove(name);
            self.sos1.remove(name);
        }
        self.sos1.retain(|_,members| !members.is_empty());
        debug!(entries = size, variables = self.variables.len(), constraints = self.constraints.len(), "delta applied");
        Ok(())
    }

    fn solve(&mut self) -> Result<Statistics> {
        if self.disposed {
            return Err(SolverError::Disposed)
        }
        let start = Instant::now();
        let presolved = self.presolve();
        let presolve_time = start.elapsed();
        let cols_removed = presolved.fixed.len();

        let (status,values) = if let Some(row) = presolved.infeasible.as_ref() {
            debug!(row = %row, "presolve proved infeasibility");
            (SolverStatus::Infeasible,None)
        } else {
            match self.run_backend(&presolved) {
                Ok(values) => {
                    // a stopped backend hands back whatever it had, possibly nothing usable
                    let feasible = satisfies(&presolved.rows,&values);
                    let status = verdict(self.time_limit,start.elapsed(),feasible);
                    (status,feasible.then_some(values))
                },
                Err(ResolutionError::Infeasible) => (SolverStatus::Infeasible,None),
                Err(ResolutionError::Unbounded) => (SolverStatus::Unbounded,None),
                Err(other) => {
                    warn!(error = %other, "backend failed");
                    (SolverStatus::InfOrUnbounded,None)
                }
            }
        };
        let duration = start.elapsed();
        let has_incumbent = values.is_some();
        let objective = values.as_ref().map(|v| self.objective_of(v));
        if let Some(values) = values {
            self.mappings = values;
        }
        info!(
            status = %status,
            duration_ms = duration.as_millis() as u64,
            rows = self.constraints.len(),
            cols = self.variables.len(),
            rows_removed = presolved.rows_removed,
            cols_removed,
            "model solved"
        );
        Ok(Statistics {
            status,
            duration,
            presolve_time,
            rows_removed:presolved.rows_removed,
            cols_removed,
            objective,
            has_incumbent
        })
    }

    fn mappings(&self) -> &BTreeMap<String,bool> {
        &self.mappings
    }

    fn lock_variables(&mut self,predicate:&dyn Fn(&str,bool) -> bool) {
        let mut locked = 0;
        for (name,column) in self.variables.iter_mut() {
            let value = self.mappings.get(name).copied().unwrap_or(false);
            if predicate(name.as_str(),value) {
                column.fixed = Some(value);
                locked += 1;
            }
        }
        debug!(locked, "variables locked");
    }

    fn set_time_limit(&mut self,limit:Option<Duration>) {
        self.time_limit = limit;
    }

    fn time_limit(&self) -> Option<Duration> {
        self.time_limit
    }

    fn dispose(&mut self) {
        self.variables.clear();
        self.constraints.clear();
        self.sos1.clear();
        self.mappings.clear();
        self.disposed = true;
    }
}
