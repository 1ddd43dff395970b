// candidate virtual -> substrate mappings
// the scanner re-derives every candidate from the model on each poll

use crate::network::{EPS, LinkIdx, Model, ModelError, NetworkIdx, NetworkKind, NodeIdx, PathIdx, Role};

type Result<T> = std::result::Result<T,ModelError>;

fn hosts_of(candidates:&[(NodeIdx,Vec<NodeIdx>)],node:NodeIdx) -> &[NodeIdx] {
    candidates.iter()
        .find(|(guest,_)| *guest == node)
        .map(|(_,hosts)| hosts.as_slice())
        .unwrap_or(&[])
}

#[derive(Debug,Clone,Copy,PartialEq,Eq,Hash,PartialOrd,Ord)]
pub enum Match {
    // A request may be placed on the substrate at all.
    Network{guest:NetworkIdx,host:NetworkIdx},
    // virtual server onto a substrate server
    Node{guest:NodeIdx,host:NodeIdx},
    // virtual switch onto any substrate node
    Switch{guest:NodeIdx,host:NodeIdx},
    // both endpoints of a virtual link share one substrate node
    LinkToNode{guest:LinkIdx,host:NodeIdx},
    LinkToPath{guest:LinkIdx,host:PathIdx},
}

pub trait MatchSource {
    // every candidate mapping of the requested networks onto `substrate`.
    // Restartable: each call is a fresh, finite sequence.
    fn poll_matches(&mut self,model:&Model,substrate:NetworkIdx,requests:&[NetworkIdx]) -> Result<Vec<Match>>;
}

// brute force enumeration with capacity pre-filtering
#[derive(Debug,Clone,Default)]
pub struct CandidateScanner {
    max_path_hops:Option<usize>
}

impl CandidateScanner {
    pub fn new() -> Self {
        Self::default()
    }
    // drop path candidates longer than `hops`
    pub fn with_max_path_hops(hops:usize) -> Self {
        Self {max_path_hops:Some(hops)}
    }

    fn node_candidates(&self,model:&Model,substrate:NetworkIdx,guest:NodeIdx) -> Result<Vec<NodeIdx>> {
        let virtual_node = model.node(guest)?;
        let mut hosts = vec![];
        for index in model.network(substrate)?.nodes() {
            let host = model.node(*index)?;
            let fits = match virtual_node.role() {
                Role::Switch => true,
                Role::Server => host.is_server()
                    && host.residual().is_some_and(|r| virtual_node.demand().fits_in(&r))
            };
            if fits {
                hosts.push(*index);
            }
        }
        Ok(hosts)
    }
}

impl MatchSource for CandidateScanner {
    fn poll_matches(&mut self,model:&Model,substrate:NetworkIdx,requests:&[NetworkIdx]) -> Result<Vec<Match>> {
        let host_network = model.expect_kind(substrate,NetworkKind::Substrate)?;
        let mut matches = vec![];
        for guest_net in requests {
            let network = model.expect_kind(*guest_net,NetworkKind::Virtual)?;
            matches.push(Match::Network { guest:*guest_net,host:substrate });

            let mut candidates:Vec<(NodeIdx,Vec<NodeIdx>)> = Vec::with_capacity(network.nodes().len());
            for guest in network.nodes() {
                let hosts = self.node_candidates(model,substrate,*guest)?;
                let is_server = model.node(*guest)?.is_server();
                for host in hosts.iter() {
                    matches.push(if is_server {
                        Match::Node { guest:*guest,host:*host }
                    } else {
                        Match::Switch { guest:*guest,host:*host }
                    });
                }
                candidates.push((*guest,hosts));
            }
            for guest in network.links() {
                let link = model.link(*guest)?;
                let from = hosts_of(&candidates,link.source());
                let to = hosts_of(&candidates,link.target());
                for host in from.iter().filter(|h| to.contains(h)) {
                    matches.push(Match::LinkToNode { guest:*guest,host:*host });
                }
                for path_index in host_network.paths() {
                    let path = model.path(*path_index)?;
                    if self.max_path_hops.is_some_and(|max| path.hop_count() > max) {
                        continue;
                    }
                    if !from.contains(&path.source()) || !to.contains(&path.target()) {
                        continue;
                    }
                    if model.path_bottleneck(*path_index)? + EPS < link.bandwidth() {
                        continue;
                    }
                    matches.push(Match::LinkToPath { guest:*guest,host:*path_index });
                }
            }
        }
        Ok(matches)
    }
}
