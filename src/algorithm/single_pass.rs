use std::collections::BTreeSet;
use std::time::Duration;

use tracing::{debug, info};

use super::{repair_partial, validate_request, Attempt, AttemptState, EmbeddingAlgorithm, Request};
use crate::config::EngineConfig;
use crate::embedding::EmbeddingApplier;
use crate::error::{EmbeddingError, Result};
use crate::ilp::{DeltaBuilder, IncrementalSolver, LpSolver, Statistics};
use crate::matching::{CandidateScanner, MatchSource};
use crate::network::{Model, NetworkIdx};

pub type SolverFactory = fn(&EngineConfig) -> Box<dyn IncrementalSolver>;

fn lp_solver(config:&EngineConfig) -> Box<dyn IncrementalSolver> {
    Box::new(LpSolver::new(config.time_limit))
}

// builder, solver and applier live as long as nobody else touches the substrate
struct Session {
    substrate:NetworkIdx,
    // substrate revision right after our own last apply
    revision:u64,
    builder:DeltaBuilder,
    solver:Box<dyn IncrementalSolver>,
    applier:EmbeddingApplier
}

impl Session {
    fn new(config:&EngineConfig,factory:SolverFactory,substrate:NetworkIdx,revision:u64) -> Self {
        Self {
            substrate,
            revision,
            builder:DeltaBuilder::new(config.objective,config.rejection_cost,config.sos_hints),
            solver:factory(config),
            applier:EmbeddingApplier::new()
        }
    }
    fn is_rejected(&self,network:NetworkIdx) -> bool {
        self.builder.rejection_variable(network)
            .is_some_and(|r| self.solver.mappings().get(r).copied().unwrap_or(true))
    }
    // drops every variable of `networks` from the solver
    fn forget(&mut self,networks:&[NetworkIdx]) -> Result<()> {
        for network in networks {
            if !self.builder.contains_network(*network) {
                continue;
            }
            let delta = self.builder.remove_network(*network);
            self.solver.apply(delta)?;
        }
        Ok(())
    }
}

// one match, build, solve, apply round per `execute`. The optimisation model
// is carried over between calls while the substrate only changed through this
// instance.
pub struct SinglePass {
    name:String,
    config:EngineConfig,
    source:Box<dyn MatchSource>,
    solver_factory:SolverFactory,
    session:Option<Session>,
    request:Option<Request>,
    state:AttemptState,
    statistics:Option<Statistics>
}

impl SinglePass {
    pub fn new(config:EngineConfig) -> Self {
        Self {
            name:String::from("single-pass"),
            config,
            source:Box::new(CandidateScanner::new()),
            solver_factory:lp_solver,
            session:None,
            request:None,
            state:AttemptState::Idle,
            statistics:None
        }
    }
    pub fn with_match_source(self,source:Box<dyn MatchSource>) -> Self {
        Self {source,..self}
    }
    pub fn with_solver(self,solver_factory:SolverFactory) -> Self {
        Self {solver_factory,session:None,..self}
    }
    pub fn named(self,name:&str) -> Self {
        Self {name:name.to_owned(),..self}
    }
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
    pub fn last_statistics(&self) -> Option<&Statistics> {
        self.statistics.as_ref()
    }
    pub fn reset_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.solver.dispose();
            debug!(algorithm = %self.name, "session dropped");
        }
    }
    pub(crate) fn set_time_limit(&mut self,limit:Option<Duration>) {
        self.config.time_limit = limit;
        if let Some(session) = self.session.as_mut() {
            session.solver.set_time_limit(limit);
        }
    }
    pub(crate) fn set_state(&mut self,state:AttemptState) {
        self.state = state;
    }

    // runs one attempt. The solver model keeps the committed networks and
    // nothing else afterwards.
    pub(crate) fn run(&mut self,model:&mut Model,substrate:NetworkIdx,attempt:&Attempt) -> Result<bool> {
        let revision = model.revision(substrate)?;
        let stale = self.session.as_ref().is_none_or(|s| s.substrate != substrate || s.revision != revision);
        if stale {
            self.reset_session();
        }
        let config = &self.config;
        let factory = self.solver_factory;
        let session = self.session.get_or_insert_with(|| Session::new(config,factory,substrate,revision));

        let matches = self.source.poll_matches(model,substrate,&attempt.networks)?;
        self.state = AttemptState::Matched;
        for candidate in matches.iter() {
            session.builder.add_match(model,candidate)?;
        }
        let delta = session.builder.take_delta();
        debug!(matches = matches.len(), entries = delta.len(), "matches turned into a delta");
        session.solver.apply(delta)?;
        self.state = AttemptState::DeltaBuilt;

        if !attempt.pinned.is_empty() {
            let pinned:BTreeSet<String> = attempt.pinned.iter()
                .filter_map(|n| session.builder.rejection_variable(*n).map(str::to_owned))
                .collect();
            session.solver.lock_variables(&|name,_| pinned.contains(name));
        }
        let statistics = session.solver.solve()?;
        self.state = AttemptState::Solved;
        let feasible = statistics.is_feasible();
        self.statistics = Some(statistics);

        let accepted = feasible && attempt.required.iter().all(|n| !session.is_rejected(*n));
        if !accepted {
            session.forget(&attempt.networks)?;
            self.state = AttemptState::Rejected;
            info!(algorithm = %self.name, networks = attempt.networks.len(), feasible, "attempt rejected");
            return Ok(false);
        }

        let mut commit = attempt.required.clone();
        commit.extend(attempt.optional.iter().copied().filter(|n| !session.is_rejected(*n)));
        let applied = session.applier.apply_solution(model,substrate,&session.builder,session.solver.mappings(),&commit);
        if let Err(err) = applied {
            session.forget(&attempt.networks)?;
            self.state = AttemptState::Rejected;
            return Err(err.into());
        }

        let builder = &session.builder;
        session.solver.lock_variables(&|name,_| builder.network_of(name).is_some_and(|n| commit.contains(&n)));
        let dropped:Vec<NetworkIdx> = attempt.networks.iter().copied().filter(|n| !commit.contains(n)).collect();
        session.forget(&dropped)?;
        session.revision = model.revision(substrate)?;
        self.state = AttemptState::Applied;
        info!(algorithm = %self.name, committed = commit.len(), dropped = dropped.len(), "attempt applied");
        Ok(true)
    }
}

impl EmbeddingAlgorithm for SinglePass {
    fn name(&self) -> &str {
        &self.name
    }

    fn prepare(&mut self,model:&Model,substrate:NetworkIdx,requests:&[NetworkIdx]) -> Result<()> {
        self.request = Some(validate_request(model,&self.config,substrate,requests)?);
        self.state = AttemptState::Prepared;
        Ok(())
    }

    fn execute(&mut self,model:&mut Model) -> Result<bool> {
        let request = self.request.clone().ok_or(EmbeddingError::NotPrepared)?;
        let repaired = repair_partial(model)?;
        // the model may have moved since prepare
        validate_request(model,&self.config,request.substrate,&request.networks)?;
        let mut attempt = Attempt::all_required(request.networks);
        for network in repaired {
            attempt.push_optional(network);
        }
        self.state = AttemptState::Prepared;
        self.run(model,request.substrate,&attempt)
    }

    fn state(&self) -> AttemptState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ilp::Objective;
    use crate::network::{EmbeddingState, Resources};

    fn single_server(capacity:f64) -> (Model,NetworkIdx) {
        let mut model = Model::new();
        let sub = model.add_substrate_network("sub").unwrap();
        model.add_server(sub,"srv",Resources::uniform(capacity)).unwrap();
        (model,sub)
    }

    fn request(model:&mut Model,name:&str,demand:f64) -> NetworkIdx {
        let virt = model.add_virtual_network(name).unwrap();
        model.add_server(virt,&format!("{name}-v"),Resources::uniform(demand)).unwrap();
        virt
    }

    #[test]
    fn test_state_machine() {
        let (mut model,sub) = single_server(1.0);
        let first = request(&mut model,"first",1.0);
        let mut algorithm = SinglePass::new(EngineConfig::default());
        assert_eq!(algorithm.state(),AttemptState::Idle);
        assert_eq!(algorithm.execute(&mut model),Err(EmbeddingError::NotPrepared));
        algorithm.prepare(&model,sub,&[first]).unwrap();
        assert_eq!(algorithm.state(),AttemptState::Prepared);
        assert!(algorithm.execute(&mut model).unwrap());
        assert_eq!(algorithm.state(),AttemptState::Applied);
        assert!(algorithm.last_statistics().unwrap().is_feasible());

        // same request again is a caller bug
        assert!(matches!(algorithm.execute(&mut model),Err(EmbeddingError::AlreadyEmbedded{..})));
    }

    #[test]
    fn test_session_survives_own_applies_only() {
        let (mut model,sub) = single_server(2.0);
        let first = request(&mut model,"first",1.0);
        let second = request(&mut model,"second",1.0);
        let third = request(&mut model,"third",1.0);
        let mut algorithm = SinglePass::new(EngineConfig::default().with_sos_hints(true));
        algorithm.prepare(&model,sub,&[first]).unwrap();
        assert!(algorithm.execute(&mut model).unwrap());
        let revision = algorithm.session.as_ref().unwrap().revision;
        assert_eq!(revision,model.revision(sub).unwrap());

        algorithm.prepare(&model,sub,&[second]).unwrap();
        assert!(algorithm.execute(&mut model).unwrap());
        // the first network's variables are still in there, locked
        let session = algorithm.session.as_ref().unwrap();
        assert!(session.builder.contains_network(first));
        assert!(session.builder.contains_network(second));

        // the substrate is full now
        algorithm.prepare(&model,sub,&[third]).unwrap();
        assert!(!algorithm.execute(&mut model).unwrap());
        assert_eq!(algorithm.state(),AttemptState::Rejected);
        assert!(!algorithm.session.as_ref().unwrap().builder.contains_network(third));
        assert_eq!(model.embedding_state(third).unwrap(),EmbeddingState::Unembedded);
        model.check_capacity_invariant(sub).unwrap();

        // someone else frees capacity: the session starts over
        model.unembed_network(first).unwrap();
        assert!(algorithm.execute(&mut model).unwrap());
        assert!(!algorithm.session.as_ref().unwrap().builder.contains_network(second));
        model.check_capacity_invariant(sub).unwrap();
    }

    #[test]
    fn test_all_or_nothing() {
        let (mut model,sub) = single_server(1.0);
        let fits = request(&mut model,"fits",1.0);
        let too_big = request(&mut model,"too-big",2.0);
        let mut algorithm = SinglePass::new(EngineConfig::default())
            .with_solver(|config:&EngineConfig| -> Box<dyn IncrementalSolver> {Box::new(LpSolver::new(config.time_limit))});
        algorithm.prepare(&model,sub,&[fits,too_big]).unwrap();
        assert!(!algorithm.execute(&mut model).unwrap());
        assert_eq!(model.embedding_state(fits).unwrap(),EmbeddingState::Unembedded);
        let srv = model.node_by_name("srv").unwrap();
        assert_eq!(model.node(srv).unwrap().residual(),Some(Resources::uniform(1.0)));
    }

    #[test]
    fn test_partial_networks_are_repaired_and_placed() {
        let mut model = Model::new();
        let sub = model.add_substrate_network("sub").unwrap();
        let s1 = model.add_server(sub,"s1",Resources::uniform(1.0)).unwrap();
        model.add_server(sub,"s2",Resources::uniform(2.0)).unwrap();

        let broken = model.add_virtual_network("broken").unwrap();
        let b1 = model.add_server(broken,"b1",Resources::uniform(1.0)).unwrap();
        model.embed_network(broken,sub).unwrap();
        model.embed_node(b1,s1).unwrap();
        model.remove_node(s1).unwrap();
        assert_eq!(model.embedding_state(broken).unwrap(),EmbeddingState::Partial);

        let fresh = request(&mut model,"fresh",1.0);
        let mut algorithm = SinglePass::new(EngineConfig::default().with_objective(Objective::TotalCommB));
        algorithm.prepare(&model,sub,&[fresh]).unwrap();
        assert!(algorithm.execute(&mut model).unwrap());
        assert_eq!(model.embedding_state(fresh).unwrap(),EmbeddingState::Embedded(sub));
        assert_eq!(model.embedding_state(broken).unwrap(),EmbeddingState::Embedded(sub));
        let s2 = model.node_by_name("s2").unwrap();
        assert_eq!(model.node(s2).unwrap().residual(),Some(Resources::ZERO));
        model.check_capacity_invariant(sub).unwrap();
    }
}
