// solver answer -> committed model mutation
// everything is validated before the first write, so an apply either lands
// completely or leaves the model as it was

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::ilp::DeltaBuilder;
use crate::matching::Match;
use crate::network::{LinkHost, LinkIdx, Model, ModelError, NetworkIdx, NodeIdx, Resources, EPS};

#[derive(Error,Debug,Clone,PartialEq)]
pub enum ApplyError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("network {network} was rejected by the solver")]
    Rejected{network:String},
    #[error("{element} is mapped {count} times, exactly once was expected")]
    MappingCount{element:String,count:usize},
    #[error("the solution asks {element} for {demand}, only {residual} is left")]
    Overcommitted{element:String,demand:String,residual:String},
}

type Result<T> = std::result::Result<T,ApplyError>;

// hosts picked for one network
#[derive(Default)]
struct Placement {
    nodes:BTreeMap<NodeIdx,Vec<NodeIdx>>,
    links:BTreeMap<LinkIdx,Vec<LinkHost>>
}

// applies mappings that turned true since the previous call
#[derive(Debug,Default)]
pub struct EmbeddingApplier {
    applied:BTreeSet<String>
}

impl EmbeddingApplier {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn applied_len(&self) -> usize {
        self.applied.len()
    }

    fn collect(&self,model:&Model,builder:&DeltaBuilder,mappings:&BTreeMap<String,bool>,commit:&BTreeSet<NetworkIdx>)
        -> Result<(BTreeMap<NetworkIdx,Placement>,Vec<String>)> {
        let mut placements:BTreeMap<NetworkIdx,Placement> = commit.iter().map(|n| (*n,Placement::default())).collect();
        let mut fresh = vec![];
        for (name,value) in mappings.iter() {
            if !*value || self.applied.contains(name) {
                continue;
            }
            let Some(network) = builder.network_of(name).filter(|n| commit.contains(n)) else {
                continue;
            };
            let Some(origin) = builder.origin(name) else {
                // only rejection variables have no origin
                return Err(ApplyError::Rejected { network:model.network(network)?.name().to_owned() })
            };
            let Some(placement) = placements.get_mut(&network) else {continue};
            match *origin {
                Match::Network { .. } => {},
                Match::Node { guest, host } | Match::Switch { guest, host } => {
                    placement.nodes.entry(guest).or_default().push(host);
                },
                Match::LinkToNode { guest, host } => {
                    placement.links.entry(guest).or_default().push(LinkHost::Node(host));
                },
                Match::LinkToPath { guest, host } => {
                    let chain = model.path(host)?.links().to_vec();
                    placement.links.entry(guest).or_default().push(LinkHost::Path(chain));
                }
            }
            fresh.push(name.clone());
        }
        Ok((placements,fresh))
    }

    // exactly one host per element and the summed demand fits the residuals
    fn validate(&self,model:&Model,placements:&BTreeMap<NetworkIdx,Placement>) -> Result<()> {
        let mut node_demand:BTreeMap<NodeIdx,Resources> = BTreeMap::new();
        let mut link_demand:BTreeMap<LinkIdx,f64> = BTreeMap::new();
        for (network,placement) in placements.iter() {
            let network = model.network(*network)?;
            for guest in network.nodes() {
                let node = model.node(*guest)?;
                let hosts = placement.nodes.get(guest).map_or(&[][..],|h| h.as_slice());
                if hosts.len() != 1 {
                    return Err(ApplyError::MappingCount { element:node.name().to_owned(),count:hosts.len() })
                }
                if node.is_server() {
                    *node_demand.entry(hosts[0]).or_default() += node.demand();
                }
            }
            for guest in network.links() {
                let link = model.link(*guest)?;
                let hosts = placement.links.get(guest).map_or(&[][..],|h| h.as_slice());
                if hosts.len() != 1 {
                    return Err(ApplyError::MappingCount { element:link.name().to_owned(),count:hosts.len() })
                }
                if let LinkHost::Path(chain) = &hosts[0] {
                    for substrate_link in chain {
                        *link_demand.entry(*substrate_link).or_default() += link.bandwidth();
                    }
                }
            }
        }
        for (host,demand) in node_demand.iter() {
            let node = model.node(*host)?;
            let residual = node.residual().unwrap_or_default();
            if !demand.fits_in(&residual) {
                return Err(ApplyError::Overcommitted {
                    element:node.name().to_owned(),
                    demand:format!("{demand:?}"),
                    residual:format!("{residual:?}")
                })
            }
        }
        for (host,demand) in link_demand.iter() {
            let link = model.link(*host)?;
            let residual = link.residual().unwrap_or(0.0);
            if *demand > residual + EPS {
                return Err(ApplyError::Overcommitted {
                    element:link.name().to_owned(),
                    demand:demand.to_string(),
                    residual:residual.to_string()
                })
            }
        }
        Ok(())
    }

    fn write(model:&mut Model,substrate:NetworkIdx,network:NetworkIdx,placement:Placement) -> std::result::Result<(),ModelError> {
        model.embed_network(network,substrate)?;
        for (guest,hosts) in placement.nodes {
            for host in hosts {
                model.embed_node(guest,host)?;
            }
        }
        for (guest,hosts) in placement.links {
            for host in hosts {
                model.embed_link(guest,host)?;
            }
        }
        Ok(())
    }

    // resolves the newly set mappings of the `commit` networks back to their
    // matches and writes them into the model. Returns the networks embedded.
    pub fn apply_solution(
        &mut self,
        model:&mut Model,
        substrate:NetworkIdx,
        builder:&DeltaBuilder,
        mappings:&BTreeMap<String,bool>,
        commit:&BTreeSet<NetworkIdx>
    ) -> Result<Vec<NetworkIdx>> {
        for network in commit.iter() {
            let rejected = builder.rejection_variable(*network)
                .is_some_and(|r| mappings.get(r).copied().unwrap_or(false));
            if rejected {
                return Err(ApplyError::Rejected { network:model.network(*network)?.name().to_owned() })
            }
        }
        let (placements,fresh) = self.collect(model,builder,mappings,commit)?;
        self.validate(model,&placements)?;

        let mut written = vec![];
        for (network,placement) in placements {
            written.push(network);
            if let Err(err) = Self::write(model,substrate,network,placement) {
                warn!(error = %err, "apply failed, rolling back");
                for network in written.iter() {
                    model.unembed_network(*network)?;
                }
                return Err(err.into())
            }
            debug!(network = %model.network(network)?.name(), "network embedded");
        }
        self.applied.extend(fresh);
        info!(networks = written.len(), mappings = self.applied.len(), "solution applied");
        Ok(written)
    }
}
