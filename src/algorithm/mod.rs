// embedding attempts: prepare -> match -> delta -> solve -> apply
// every attempt either commits completely or leaves the model as it found it

use std::collections::BTreeSet;
use std::fmt::Display;

use crate::config::EngineConfig;
use crate::error::{EmbeddingError, Result};
use crate::network::{EmbeddingState, Model, NetworkIdx, NetworkKind};

mod lookahead;
mod migration;
mod pipeline;
mod single_pass;

pub use lookahead::Lookahead;
pub use migration::Migration;
pub use pipeline::Pipeline;
pub use single_pass::{SinglePass, SolverFactory};

#[derive(Debug,Clone,Copy,PartialEq,Eq)]
pub enum AttemptState {
    Idle,
    Prepared,
    Matched,
    DeltaBuilt,
    Solved,
    Applied,
    Rejected
}

impl Display for AttemptState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AttemptState::Idle => "idle",
            AttemptState::Prepared => "prepared",
            AttemptState::Matched => "matched",
            AttemptState::DeltaBuilt => "delta-built",
            AttemptState::Solved => "solved",
            AttemptState::Applied => "applied",
            AttemptState::Rejected => "rejected"
        };
        write!(f,"{name}")
    }
}

pub trait EmbeddingAlgorithm {
    fn name(&self) -> &str;
    // checks the request and remembers it for `execute`. Malformed requests
    // and bad configuration fail here.
    fn prepare(&mut self,model:&Model,substrate:NetworkIdx,requests:&[NetworkIdx]) -> Result<()>;
    // `Ok(true)` when every requested network got embedded, `Ok(false)` when
    // the request does not fit. In that case the model is left untouched.
    fn execute(&mut self,model:&mut Model) -> Result<bool>;
    fn state(&self) -> AttemptState;
}

#[derive(Debug,Clone,PartialEq)]
pub(crate) struct Request {
    pub(crate) substrate:NetworkIdx,
    pub(crate) networks:Vec<NetworkIdx>
}

// one solve over `networks`. `required` must all be placed for the attempt to
// count, `optional` are committed only if they were placed, everything else is
// only there to shape the solution. Rejecting a `pinned` network is not an option.
#[derive(Debug,Clone,Default)]
pub(crate) struct Attempt {
    pub(crate) networks:Vec<NetworkIdx>,
    pub(crate) required:BTreeSet<NetworkIdx>,
    pub(crate) optional:BTreeSet<NetworkIdx>,
    pub(crate) pinned:BTreeSet<NetworkIdx>
}

impl Attempt {
    pub(crate) fn all_required(networks:Vec<NetworkIdx>) -> Self {
        let required = networks.iter().copied().collect();
        Self {networks,required,..Self::default()}
    }
    pub(crate) fn push_optional(&mut self,network:NetworkIdx) {
        if !self.networks.contains(&network) {
            self.networks.push(network);
            self.optional.insert(network);
        }
    }
}

pub(crate) fn validate_request(model:&Model,config:&EngineConfig,substrate:NetworkIdx,requests:&[NetworkIdx]) -> Result<Request> {
    config.validate()?;
    if requests.is_empty() {
        return Err(EmbeddingError::EmptyRequest)
    }
    let host = model.expect_kind(substrate,NetworkKind::Substrate)?;
    let mut seen = BTreeSet::new();
    let mut has_links = false;
    for index in requests {
        if !seen.insert(*index) {
            return Err(EmbeddingError::DuplicateRequest { network:*index })
        }
        let network = model.network(*index)?;
        if !network.is_virtual() {
            return Err(EmbeddingError::NotVirtual { network:network.name().to_owned() })
        }
        match model.embedding_state(*index)? {
            EmbeddingState::Embedded(current) if current == substrate => {
                return Err(EmbeddingError::AlreadyEmbedded { network:network.name().to_owned() })
            },
            EmbeddingState::Embedded(current) => {
                return Err(EmbeddingError::HostedElsewhere {
                    network:network.name().to_owned(),
                    host:model.network(current)?.name().to_owned()
                })
            },
            EmbeddingState::Unembedded | EmbeddingState::Partial => {}
        }
        has_links |= !network.links().is_empty();
    }
    if has_links {
        if host.paths().is_empty() {
            return Err(EmbeddingError::MissingPaths { substrate:host.name().to_owned() })
        }
        // the stored paths, not the configured bounds, are what gets priced
        let mut longest = 0;
        for path in host.paths() {
            longest = longest.max(model.path(*path)?.hop_count());
        }
        config.check_hop_cost(longest)?;
    }
    Ok(Request {substrate,networks:requests.to_vec()})
}

// unembeds every partially embedded network. Returns the repaired ones.
pub(crate) fn repair_partial(model:&mut Model) -> Result<Vec<NetworkIdx>> {
    let partial = model.partial_networks();
    for network in partial.iter() {
        model.repair_network(*network)?;
    }
    Ok(partial)
}
