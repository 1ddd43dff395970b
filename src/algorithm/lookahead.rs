use tracing::debug;

use super::{repair_partial, validate_request, Attempt, AttemptState, EmbeddingAlgorithm, Request, SinglePass};
use crate::config::EngineConfig;
use crate::error::{EmbeddingError, Result};
use crate::network::{Model, NetworkIdx};

// solves the first requested network together with the rest, but only the
// first one gets embedded. The others shape the placement and are dropped.
pub struct Lookahead {
    inner:SinglePass,
    request:Option<Request>
}

impl Lookahead {
    pub fn new(config:EngineConfig) -> Self {
        Self {inner:SinglePass::new(config).named("lookahead"),request:None}
    }
    pub fn with_inner(inner:SinglePass) -> Self {
        Self {inner,request:None}
    }
    pub fn inner(&self) -> &SinglePass {
        &self.inner
    }
}

impl EmbeddingAlgorithm for Lookahead {
    fn name(&self) -> &str {
        self.inner.name()
    }

    // `requests[0]` is the nominated network.
    fn prepare(&mut self,model:&Model,substrate:NetworkIdx,requests:&[NetworkIdx]) -> Result<()> {
        self.request = Some(validate_request(model,self.inner.config(),substrate,requests)?);
        self.inner.set_state(AttemptState::Prepared);
        Ok(())
    }

    fn execute(&mut self,model:&mut Model) -> Result<bool> {
        let request = self.request.clone().ok_or(EmbeddingError::NotPrepared)?;
        let repaired = repair_partial(model)?;
        validate_request(model,self.inner.config(),request.substrate,&request.networks)?;
        let Some((nominated,candidates)) = request.networks.split_first() else {
            return Err(EmbeddingError::EmptyRequest)
        };
        let mut attempt = Attempt::all_required(vec![*nominated]);
        attempt.networks.extend(candidates.iter().copied());
        for network in repaired {
            attempt.push_optional(network);
        }
        debug!(nominated, candidates = candidates.len(), "lookahead attempt");
        self.inner.run(model,request.substrate,&attempt)
    }

    fn state(&self) -> AttemptState {
        self.inner.state()
    }
}
