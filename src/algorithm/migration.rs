use tracing::{info, warn};

use super::{repair_partial, validate_request, Attempt, AttemptState, EmbeddingAlgorithm, Request, SinglePass};
use crate::config::EngineConfig;
use crate::error::{EmbeddingError, Result};
use crate::ilp::SolverStatus;
use crate::network::{EmbeddingSnapshot, EmbeddingState, Model, NetworkIdx};

// tears down every embedding on the substrate and solves the old guests plus
// the request in one go. Old guests may move but never get rejected.
pub struct Migration {
    inner:SinglePass,
    request:Option<Request>
}

impl Migration {
    pub fn new(config:EngineConfig) -> Self {
        Self {inner:SinglePass::new(config).named("migration"),request:None}
    }
    pub fn with_inner(inner:SinglePass) -> Self {
        Self {inner,request:None}
    }
    pub fn inner(&self) -> &SinglePass {
        &self.inner
    }

    fn restore(model:&mut Model,snapshots:&[EmbeddingSnapshot]) -> Result<()> {
        for snapshot in snapshots.iter() {
            if model.embedding_state(snapshot.network())? != EmbeddingState::Unembedded {
                model.unembed_network(snapshot.network())?;
            }
            model.restore_embedding(snapshot)?;
        }
        Ok(())
    }

    // one run per try, each with twice the time of the one before
    fn solve(&mut self,model:&mut Model,substrate:NetworkIdx,attempt:&Attempt) -> Result<bool> {
        let tries = self.inner.config().migration_tries;
        let base = self.inner.config().time_limit;
        let mut limit = base;
        let mut outcome = Ok(false);
        for attempt_no in 1..=tries {
            self.inner.set_time_limit(limit);
            outcome = self.inner.run(model,substrate,attempt);
            let proven = self.inner.last_statistics().is_some_and(|s| s.status == SolverStatus::Infeasible);
            match outcome {
                Ok(false) if !proven && attempt_no < tries => {
                    limit = limit.map(|l| l.saturating_mul(2));
                    info!(attempt = attempt_no, time_limit = ?limit, "migration retried");
                },
                _ => break
            }
        }
        self.inner.set_time_limit(base);
        outcome
    }
}

impl EmbeddingAlgorithm for Migration {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn prepare(&mut self,model:&Model,substrate:NetworkIdx,requests:&[NetworkIdx]) -> Result<()> {
        self.request = Some(validate_request(model,self.inner.config(),substrate,requests)?);
        self.inner.set_state(AttemptState::Prepared);
        Ok(())
    }

    fn execute(&mut self,model:&mut Model) -> Result<bool> {
        let request = self.request.clone().ok_or(EmbeddingError::NotPrepared)?;
        let substrate = request.substrate;
        let repaired = repair_partial(model)?;
        validate_request(model,self.inner.config(),substrate,&request.networks)?;

        let guests:Vec<NetworkIdx> = model.network(substrate)?.guests().iter().copied().collect();
        let mut snapshots = Vec::with_capacity(guests.len());
        for guest in guests.iter() {
            if let Some(snapshot) = model.snapshot_embedding(*guest)? {
                snapshots.push(snapshot);
            }
        }
        for guest in guests.iter() {
            model.unembed_network(*guest)?;
        }
        if let Err(err) = model.check_capacity_invariant(substrate) {
            warn!(error = %err, "substrate inconsistent after teardown, restoring");
            Self::restore(model,&snapshots)?;
            return Err(err.into())
        }
        info!(guests = guests.len(), requested = request.networks.len(), "guests torn down for migration");

        self.inner.reset_session();
        let mut attempt = Attempt::all_required(guests.clone());
        attempt.pinned.extend(guests.iter().copied());
        for network in request.networks.iter() {
            attempt.networks.push(*network);
            attempt.required.insert(*network);
        }
        for network in repaired {
            attempt.push_optional(network);
        }

        match self.solve(model,substrate,&attempt) {
            Ok(true) => Ok(true),
            Ok(false) => {
                Self::restore(model,&snapshots)?;
                info!(guests = snapshots.len(), "migration failed, placements restored");
                Ok(false)
            },
            Err(err) => {
                Self::restore(model,&snapshots)?;
                Err(err)
            }
        }
    }

    fn state(&self) -> AttemptState {
        self.inner.state()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::network::Resources;

    fn server_request(model:&mut Model,name:&str,demand:f64) -> NetworkIdx {
        let virt = model.add_virtual_network(name).unwrap();
        model.add_server(virt,&format!("{name}-v"),Resources::uniform(demand)).unwrap();
        virt
    }

    #[test]
    fn test_failed_migration_restores_placements() {
        let mut model = Model::new();
        let sub = model.add_substrate_network("sub").unwrap();
        model.add_server(sub,"big",Resources::uniform(2.0)).unwrap();
        let old = server_request(&mut model,"old",1.0);
        let mut single = SinglePass::new(EngineConfig::default());
        single.prepare(&model,sub,&[old]).unwrap();
        assert!(single.execute(&mut model).unwrap());
        let before = model.snapshot_embedding(old).unwrap();

        let greedy = server_request(&mut model,"greedy",2.0);
        let config = EngineConfig::default()
            .with_migration_tries(3)
            .with_time_limit(Duration::from_secs(5));
        let mut migration = Migration::new(config);
        migration.prepare(&model,sub,&[greedy]).unwrap();
        assert!(!migration.execute(&mut model).unwrap());
        assert_eq!(migration.state(),AttemptState::Rejected);
        assert_eq!(model.snapshot_embedding(old).unwrap(),before);
        assert_eq!(model.embedding_state(greedy).unwrap(),EmbeddingState::Unembedded);
        // the configured limit survives the retries
        assert_eq!(migration.inner().config().time_limit,Some(Duration::from_secs(5)));
        model.check_capacity_invariant(sub).unwrap();
    }

    #[test]
    fn test_migration_moves_old_guests() {
        let mut model = Model::new();
        let sub = model.add_substrate_network("sub").unwrap();
        let big = model.add_server(sub,"big",Resources::uniform(2.0)).unwrap();
        let old = server_request(&mut model,"old",1.0);
        let mut single = SinglePass::new(EngineConfig::default());
        single.prepare(&model,sub,&[old]).unwrap();
        assert!(single.execute(&mut model).unwrap());
        let small = model.add_server(sub,"small",Resources::uniform(1.0)).unwrap();

        let new = server_request(&mut model,"new",2.0);
        single.prepare(&model,sub,&[new]).unwrap();
        assert!(!single.execute(&mut model).unwrap());

        let mut migration = Migration::new(EngineConfig::default());
        migration.prepare(&model,sub,&[new]).unwrap();
        assert!(migration.execute(&mut model).unwrap());
        assert_eq!(migration.state(),AttemptState::Applied);
        let old_node = model.node_by_name("old-v").unwrap();
        let new_node = model.node_by_name("new-v").unwrap();
        assert_eq!(model.node(old_node).unwrap().host(),Some(small));
        assert_eq!(model.node(new_node).unwrap().host(),Some(big));
        model.check_capacity_invariant(sub).unwrap();
    }

    #[test]
    fn test_prepare_first() {
        let mut model = Model::new();
        let mut migration = Migration::new(EngineConfig::default());
        assert_eq!(migration.execute(&mut model),Err(EmbeddingError::NotPrepared));
    }
}
