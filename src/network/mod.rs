// capacity graph model shared by every other module
// substrate and virtual networks live in one arena, elements are addressed by index
// removed slots stay None, so an index is never handed out twice

use std::collections::{BTreeSet, HashMap as StdHashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

mod resources;

pub use resources::Resources;

pub type NetworkIdx = usize;
pub type NodeIdx = usize;
pub type LinkIdx = usize;
pub type PathIdx = usize;

// absolute tolerance for residual comparisons
pub(crate) const EPS:f64 = 1e-9;

#[derive(Error,Debug,Clone,PartialEq)]
pub enum ModelError {
    #[error("name {name} is already taken by another element")]
    DuplicateName{name:String},
    #[error("name {name} contains '@', which separates guest from host in mapping names")]
    ReservedCharacter{name:String},
    #[error("network {0} does not exist")]
    UnknownNetwork(NetworkIdx),
    #[error("node {0} does not exist")]
    UnknownNode(NodeIdx),
    #[error("link {0} does not exist")]
    UnknownLink(LinkIdx),
    #[error("path {0} does not exist")]
    UnknownPath(PathIdx),
    #[error("network {network} is a {actual:?} network, but a {expected:?} network was required")]
    WrongKind{network:String,expected:NetworkKind,actual:NetworkKind},
    #[error("link {link} must join two nodes of network {network}")]
    CrossNetworkLink{link:String,network:String},
    #[error("{element} was given the negative amount {value}")]
    NegativeAmount{element:String,value:f64},
    #[error("node {node} has residual {residual:?}, but {demand:?} was requested")]
    InsufficientResources{node:String,residual:Resources,demand:Resources},
    #[error("link {link} has residual bandwidth {residual}, but {demand} was requested")]
    InsufficientBandwidth{link:String,residual:f64,demand:f64},
    #[error("releasing capacity on {element} would push its residual above capacity")]
    ReleaseOverflow{element:String},
    #[error("{element} is already embedded")]
    AlreadyEmbedded{element:String},
    #[error("{element} must be hosted on network {expected}")]
    HostMismatch{element:String,expected:String},
    #[error("a switch ({host}) cannot host the virtual server {guest}")]
    RoleMismatch{host:String,guest:String},
    #[error("virtual link {link} does not connect the hosts of its endpoints")]
    InconsistentLinkHost{link:String},
    #[error("link chain is broken at {link}, which does not start at {expected}")]
    BrokenPath{link:String,expected:String},
    #[error("link chain visits node {node} twice")]
    CyclicPath{node:String},
    #[error("a path needs at least one link")]
    EmptyPath,
    #[error("capacity invariant broken on {element}: {detail}")]
    CapacityInvariant{element:String,detail:String},
}

type Result<T> = std::result::Result<T,ModelError>;

#[derive(Debug,Clone,Copy,PartialEq,Eq,Hash,Serialize,Deserialize)]
pub enum NetworkKind {
    Substrate,
    Virtual
}

#[derive(Debug,Clone,Copy,PartialEq,Eq,Hash,Serialize,Deserialize)]
pub enum Role {
    Server,
    Switch
}

#[derive(Debug,Clone,Copy,PartialEq,Eq,Hash)]
pub enum Element {
    Network(NetworkIdx),
    Node(NodeIdx),
    Link(LinkIdx),
    Path(PathIdx)
}

#[derive(Debug,Clone,PartialEq,Eq)]
pub enum LinkHost {
    // both endpoints share one substrate node
    Node(NodeIdx),
    // stored as the link chain, so regenerating paths never invalidates it
    Path(Vec<LinkIdx>)
}

#[derive(Debug,Clone,Copy,PartialEq,Eq)]
pub enum EmbeddingState {
    Unembedded,
    Embedded(NetworkIdx),
    Partial
}

#[derive(Debug,Clone)]
pub struct Node {
    name:String,
    network:NetworkIdx,
    role:Role,
    // requested amount for virtual nodes
    capacity:Resources,
    // none on virtual nodes
    residual:Option<Resources>,
    host:Option<NodeIdx>
}

impl Node {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn network(&self) -> NetworkIdx {
        self.network
    }
    pub fn role(&self) -> Role {
        self.role
    }
    pub fn is_server(&self) -> bool {
        self.role == Role::Server
    }
    pub fn capacity(&self) -> Resources {
        self.capacity
    }
    // what a virtual node asks for. Same field as the capacity of a substrate node.
    pub fn demand(&self) -> Resources {
        self.capacity
    }
    pub fn residual(&self) -> Option<Resources> {
        self.residual
    }
    pub fn host(&self) -> Option<NodeIdx> {
        self.host
    }
}

#[derive(Debug,Clone)]
pub struct Link {
    name:String,
    network:NetworkIdx,
    source:NodeIdx,
    target:NodeIdx,
    bandwidth:f64,
    residual:Option<f64>,
    host:Option<LinkHost>
}

impl Link {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn network(&self) -> NetworkIdx {
        self.network
    }
    pub fn source(&self) -> NodeIdx {
        self.source
    }
    pub fn target(&self) -> NodeIdx {
        self.target
    }
    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }
    pub fn residual(&self) -> Option<f64> {
        self.residual
    }
    pub fn host(&self) -> Option<&LinkHost> {
        self.host.as_ref()
    }
}

#[derive(Debug,Clone)]
pub struct Path {
    name:String,
    network:NetworkIdx,
    // nodes.len() == links.len() + 1
    nodes:Vec<NodeIdx>,
    links:Vec<LinkIdx>
}

impl Path {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn network(&self) -> NetworkIdx {
        self.network
    }
    pub fn source(&self) -> NodeIdx {
        self.nodes[0]
    }
    pub fn target(&self) -> NodeIdx {
        self.nodes[self.nodes.len() - 1]
    }
    pub fn nodes(&self) -> &[NodeIdx] {
        &self.nodes
    }
    pub fn links(&self) -> &[LinkIdx] {
        &self.links
    }
    pub fn hop_count(&self) -> usize {
        self.links.len()
    }
}

#[derive(Debug,Clone)]
pub struct Network {
    name:String,
    kind:NetworkKind,
    nodes:Vec<NodeIdx>,
    links:Vec<LinkIdx>,
    paths:Vec<PathIdx>,
    // virtual only: the substrate network currently hosting it
    host:Option<NetworkIdx>,
    // substrate only: virtual networks hosted here
    guests:BTreeSet<NetworkIdx>,
    revision:u64
}

impl Network {
    fn new(name:&str,kind:NetworkKind) -> Self {
        Self {
            name:name.to_owned(),
            kind,
            nodes:vec![],
            links:vec![],
            paths:vec![],
            host:None,
            guests:BTreeSet::new(),
            revision:0
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn kind(&self) -> NetworkKind {
        self.kind
    }
    pub fn is_virtual(&self) -> bool {
        self.kind == NetworkKind::Virtual
    }
    pub fn nodes(&self) -> &[NodeIdx] {
        &self.nodes
    }
    pub fn links(&self) -> &[LinkIdx] {
        &self.links
    }
    pub fn paths(&self) -> &[PathIdx] {
        &self.paths
    }
    pub fn host(&self) -> Option<NetworkIdx> {
        self.host
    }
    pub fn guests(&self) -> &BTreeSet<NetworkIdx> {
        &self.guests
    }
    // bumped on every structural or residual change of a substrate network
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

// everything needed to put a virtual network back where it was
#[derive(Debug,Clone,PartialEq)]
pub struct EmbeddingSnapshot {
    network:NetworkIdx,
    host:NetworkIdx,
    nodes:Vec<(NodeIdx,NodeIdx)>,
    links:Vec<(LinkIdx,LinkHost)>
}

impl EmbeddingSnapshot {
    pub fn network(&self) -> NetworkIdx {
        self.network
    }
    pub fn host(&self) -> NetworkIdx {
        self.host
    }
}

#[derive(Debug,Clone,Default)]
pub struct Model {
    networks:Vec<Option<Network>>,
    nodes:Vec<Option<Node>>,
    links:Vec<Option<Link>>,
    paths:Vec<Option<Path>>,
    names:StdHashMap<String,Element>
}

fn slot<T>(arena:&[Option<T>],index:usize) -> Option<&T> {
    arena.get(index).and_then(|slot| slot.as_ref())
}

fn slot_mut<T>(arena:&mut [Option<T>],index:usize) -> Option<&mut T> {
    arena.get_mut(index).and_then(|slot| slot.as_mut())
}

// lookups
impl Model {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn network(&self,index:NetworkIdx) -> Result<&Network> {
        slot(&self.networks,index).ok_or(ModelError::UnknownNetwork(index))
    }
    pub fn node(&self,index:NodeIdx) -> Result<&Node> {
        slot(&self.nodes,index).ok_or(ModelError::UnknownNode(index))
    }
    pub fn link(&self,index:LinkIdx) -> Result<&Link> {
        slot(&self.links,index).ok_or(ModelError::UnknownLink(index))
    }
    pub fn path(&self,index:PathIdx) -> Result<&Path> {
        slot(&self.paths,index).ok_or(ModelError::UnknownPath(index))
    }
    pub fn contains_network(&self,index:NetworkIdx) -> bool {
        slot(&self.networks,index).is_some()
    }
    pub fn find(&self,name:&str) -> Option<Element> {
        self.names.get(name).copied()
    }
    pub fn network_by_name(&self,name:&str) -> Option<NetworkIdx> {
        match self.find(name)? {
            Element::Network(index) => Some(index),
            _ => None
        }
    }
    pub fn node_by_name(&self,name:&str) -> Option<NodeIdx> {
        match self.find(name)? {
            Element::Node(index) => Some(index),
            _ => None
        }
    }
    pub fn link_by_name(&self,name:&str) -> Option<LinkIdx> {
        match self.find(name)? {
            Element::Link(index) => Some(index),
            _ => None
        }
    }
    pub fn networks(&self) -> impl Iterator<Item = (NetworkIdx,&Network)> {
        self.networks.iter().enumerate().filter_map(|(i,n)| Some((i,n.as_ref()?)))
    }
    // upper bound of every node index handed out so far
    pub fn node_slots(&self) -> usize {
        self.nodes.len()
    }
    pub fn link_slots(&self) -> usize {
        self.links.len()
    }
    pub fn expect_kind(&self,index:NetworkIdx,expected:NetworkKind) -> Result<&Network> {
        let network = self.network(index)?;
        if network.kind != expected {
            return Err(ModelError::WrongKind {
                network:network.name.clone(),
                expected,
                actual:network.kind
            })
        }
        Ok(network)
    }
    pub fn revision(&self,index:NetworkIdx) -> Result<u64> {
        Ok(self.network(index)?.revision)
    }
    pub fn path_bottleneck(&self,index:PathIdx) -> Result<f64> {
        self.chain_bottleneck(self.path(index)?.links())
    }
    // minimum residual bandwidth over a link chain
    pub fn chain_bottleneck(&self,links:&[LinkIdx]) -> Result<f64> {
        let mut bottleneck = f64::INFINITY;
        for link in links {
            let residual = self.link(*link)?.residual.unwrap_or(0.0);
            bottleneck = bottleneck.min(residual);
        }
        Ok(bottleneck)
    }
    // node sequence of a link chain, checking that consecutive links touch
    pub fn chain_nodes(&self,links:&[LinkIdx]) -> Result<Vec<NodeIdx>> {
        let Some(first) = links.first() else {
            return Err(ModelError::EmptyPath)
        };
        let mut nodes = Vec::with_capacity(links.len() + 1);
        nodes.push(self.link(*first)?.source);
        for index in links {
            let link = self.link(*index)?;
            let last = nodes[nodes.len() - 1];
            if link.source != last {
                return Err(ModelError::BrokenPath {
                    link:link.name.clone(),
                    expected:self.node(last)?.name.clone()
                })
            }
            if nodes.contains(&link.target) {
                return Err(ModelError::CyclicPath { node:self.node(link.target)?.name.clone() })
            }
            nodes.push(link.target);
        }
        Ok(nodes)
    }
}

// construction
impl Model {
    fn claim_name(&mut self,name:&str,element:Element) -> Result<()> {
        if name.contains('@') {
            return Err(ModelError::ReservedCharacter { name:name.to_owned() })
        }
        if self.names.contains_key(name) {
            return Err(ModelError::DuplicateName { name:name.to_owned() })
        }
        self.names.insert(name.to_owned(),element);
        Ok(())
    }
    fn network_mut(&mut self,index:NetworkIdx) -> Result<&mut Network> {
        slot_mut(&mut self.networks,index).ok_or(ModelError::UnknownNetwork(index))
    }
    fn node_mut(&mut self,index:NodeIdx) -> Result<&mut Node> {
        slot_mut(&mut self.nodes,index).ok_or(ModelError::UnknownNode(index))
    }
    fn link_mut(&mut self,index:LinkIdx) -> Result<&mut Link> {
        slot_mut(&mut self.links,index).ok_or(ModelError::UnknownLink(index))
    }
    fn bump(&mut self,index:NetworkIdx) {
        if let Some(network) = slot_mut(&mut self.networks,index) {
            network.revision += 1;
        }
    }
    fn add_network(&mut self,name:&str,kind:NetworkKind) -> Result<NetworkIdx> {
        let index = self.networks.len();
        self.claim_name(name,Element::Network(index))?;
        self.networks.push(Some(Network::new(name,kind)));
        Ok(index)
    }
    pub fn add_substrate_network(&mut self,name:&str) -> Result<NetworkIdx> {
        self.add_network(name,NetworkKind::Substrate)
    }
    pub fn add_virtual_network(&mut self,name:&str) -> Result<NetworkIdx> {
        self.add_network(name,NetworkKind::Virtual)
    }
    fn add_node(&mut self,network:NetworkIdx,name:&str,role:Role,capacity:Resources) -> Result<NodeIdx> {
        if !capacity.is_non_negative() {
            return Err(ModelError::NegativeAmount { element:name.to_owned(),value:capacity.min_component() })
        }
        let kind = self.network(network)?.kind;
        let index = self.nodes.len();
        self.claim_name(name,Element::Node(index))?;
        let residual = match kind {
            NetworkKind::Substrate => Some(capacity),
            NetworkKind::Virtual => None
        };
        self.nodes.push(Some(Node {name:name.to_owned(),network,role,capacity,residual,host:None}));
        self.network_mut(network)?.nodes.push(index);
        self.bump(network);
        Ok(index)
    }
    pub fn add_server(&mut self,network:NetworkIdx,name:&str,capacity:Resources) -> Result<NodeIdx> {
        self.add_node(network,name,Role::Server,capacity)
    }
    pub fn add_switch(&mut self,network:NetworkIdx,name:&str) -> Result<NodeIdx> {
        self.add_node(network,name,Role::Switch,Resources::ZERO)
    }
    pub fn add_link(&mut self,network:NetworkIdx,name:&str,source:NodeIdx,target:NodeIdx,bandwidth:f64) -> Result<LinkIdx> {
        if bandwidth < 0.0 {
            return Err(ModelError::NegativeAmount { element:name.to_owned(),value:bandwidth })
        }
        let net = self.network(network)?;
        let kind = net.kind;
        if self.node(source)?.network != network || self.node(target)?.network != network {
            return Err(ModelError::CrossNetworkLink { link:name.to_owned(),network:net.name.clone() })
        }
        let index = self.links.len();
        self.claim_name(name,Element::Link(index))?;
        let residual = match kind {
            NetworkKind::Substrate => Some(bandwidth),
            NetworkKind::Virtual => None
        };
        self.links.push(Some(Link {name:name.to_owned(),network,source,target,bandwidth,residual,host:None}));
        self.network_mut(network)?.links.push(index);
        self.bump(network);
        Ok(index)
    }
    // adds the two directed links `a->b` and `b->a`
    pub fn connect(&mut self,network:NetworkIdx,a:NodeIdx,b:NodeIdx,bandwidth:f64) -> Result<(LinkIdx,LinkIdx)> {
        let name_a = self.node(a)?.name.clone();
        let name_b = self.node(b)?.name.clone();
        let forward = self.add_link(network,&format!("{name_a}->{name_b}"),a,b,bandwidth)?;
        let backward = self.add_link(network,&format!("{name_b}->{name_a}"),b,a,bandwidth)?;
        Ok((forward,backward))
    }
    pub(crate) fn add_path(&mut self,network:NetworkIdx,links:Vec<LinkIdx>) -> Result<PathIdx> {
        self.expect_kind(network,NetworkKind::Substrate)?;
        let nodes = self.chain_nodes(&links)?;
        for link in links.iter() {
            if self.link(*link)?.network != network {
                return Err(ModelError::CrossNetworkLink {
                    link:self.link(*link)?.name.clone(),
                    network:self.network(network)?.name.clone()
                })
            }
        }
        let mut name = String::from("path[");
        for (i,link) in links.iter().enumerate() {
            if i > 0 {name.push(',')}
            name.push_str(&self.link(*link)?.name);
        }
        name.push(']');
        let index = self.paths.len();
        self.claim_name(&name,Element::Path(index))?;
        self.paths.push(Some(Path {name,network,nodes,links}));
        self.network_mut(network)?.paths.push(index);
        self.bump(network);
        Ok(index)
    }
    pub(crate) fn clear_paths(&mut self,network:NetworkIdx) -> Result<usize> {
        let paths = std::mem::take(&mut self.network_mut(network)?.paths);
        for index in paths.iter() {
            if let Some(path) = self.paths.get_mut(*index).and_then(|slot| slot.take()) {
                self.names.remove(&path.name);
            }
        }
        self.bump(network);
        Ok(paths.len())
    }
}

// residuals, only reachable from inside the crate
impl Model {
    pub(crate) fn reserve_node(&mut self,index:NodeIdx,demand:Resources) -> Result<()> {
        let node = self.node_mut(index)?;
        let residual = node.residual.unwrap_or(Resources::ZERO);
        if node.residual.is_none() || !demand.fits_in(&residual) {
            return Err(ModelError::InsufficientResources {node:node.name.clone(),residual,demand})
        }
        node.residual = Some((residual - demand).clamp_non_negative());
        let network = node.network;
        self.bump(network);
        Ok(())
    }
    pub(crate) fn release_node(&mut self,index:NodeIdx,demand:Resources) -> Result<()> {
        let node = self.node_mut(index)?;
        let Some(residual) = node.residual else {
            return Err(ModelError::ReleaseOverflow { element:node.name.clone() })
        };
        let released = residual + demand;
        if !released.fits_in(&node.capacity) {
            return Err(ModelError::ReleaseOverflow { element:node.name.clone() })
        }
        node.residual = Some(released.min(&node.capacity));
        let network = node.network;
        self.bump(network);
        Ok(())
    }
    pub(crate) fn reserve_bandwidth(&mut self,index:LinkIdx,demand:f64) -> Result<()> {
        let link = self.link_mut(index)?;
        let network = link.network;
        let residual = link.residual.unwrap_or(0.0);
        if demand > residual + EPS {
            return Err(ModelError::InsufficientBandwidth {link:link.name.clone(),residual,demand})
        }
        link.residual = Some((residual - demand).max(0.0));
        self.bump(network);
        Ok(())
    }
    pub(crate) fn release_bandwidth(&mut self,index:LinkIdx,demand:f64) -> Result<()> {
        let link = self.link_mut(index)?;
        let network = link.network;
        let Some(residual) = link.residual else {
            return Err(ModelError::ReleaseOverflow { element:link.name.clone() })
        };
        if residual + demand > link.bandwidth + EPS {
            return Err(ModelError::ReleaseOverflow { element:link.name.clone() })
        }
        link.residual = Some((residual + demand).min(link.bandwidth));
        self.bump(network);
        Ok(())
    }
}

// embedding bookkeeping
impl Model {
    pub(crate) fn embed_network(&mut self,virtual_net:NetworkIdx,substrate:NetworkIdx) -> Result<()> {
        self.expect_kind(substrate,NetworkKind::Substrate)?;
        let guest = self.expect_kind(virtual_net,NetworkKind::Virtual)?;
        match guest.host {
            Some(host) if host == substrate => return Ok(()),
            Some(_) => return Err(ModelError::AlreadyEmbedded { element:guest.name.clone() }),
            None => {}
        }
        self.network_mut(virtual_net)?.host = Some(substrate);
        self.network_mut(substrate)?.guests.insert(virtual_net);
        self.bump(substrate);
        Ok(())
    }
    fn expected_host(&self,virtual_net:NetworkIdx,element:&str) -> Result<NetworkIdx> {
        let network = self.network(virtual_net)?;
        network.host.ok_or_else(|| ModelError::HostMismatch {
            element:element.to_owned(),
            expected:format!("<host of {}>",network.name)
        })
    }
    pub(crate) fn embed_node(&mut self,guest:NodeIdx,host:NodeIdx) -> Result<()> {
        let virtual_node = self.node(guest)?;
        let substrate_node = self.node(host)?;
        let guest_name = virtual_node.name.clone();
        let (is_server,demand) = (virtual_node.is_server(),virtual_node.capacity);
        if virtual_node.host.is_some() {
            return Err(ModelError::AlreadyEmbedded { element:guest_name })
        }
        let expected = self.expected_host(virtual_node.network,&guest_name)?;
        if substrate_node.network != expected {
            return Err(ModelError::HostMismatch {element:guest_name,expected:self.network(expected)?.name.clone()})
        }
        if is_server && !substrate_node.is_server() {
            return Err(ModelError::RoleMismatch {host:substrate_node.name.clone(),guest:guest_name})
        }
        if is_server {
            self.reserve_node(host,demand)?;
        }
        self.node_mut(guest)?.host = Some(host);
        Ok(())
    }
    pub(crate) fn embed_link(&mut self,guest:LinkIdx,host:LinkHost) -> Result<()> {
        let link = self.link(guest)?;
        let link_name = link.name.clone();
        if link.host.is_some() {
            return Err(ModelError::AlreadyEmbedded { element:link_name })
        }
        let expected = self.expected_host(link.network,&link_name)?;
        let source_host = self.node(link.source)?.host;
        let target_host = self.node(link.target)?.host;
        let bandwidth = link.bandwidth;
        match &host {
            LinkHost::Node(node) => {
                if source_host != Some(*node) || target_host != Some(*node) {
                    return Err(ModelError::InconsistentLinkHost { link:link_name })
                }
            },
            LinkHost::Path(links) => {
                let nodes = self.chain_nodes(links)?;
                if source_host != nodes.first().copied() || target_host != nodes.last().copied() {
                    return Err(ModelError::InconsistentLinkHost { link:link_name })
                }
                for index in links.iter() {
                    let substrate_link = self.link(*index)?;
                    if substrate_link.network != expected {
                        return Err(ModelError::HostMismatch {element:link_name,expected:self.network(expected)?.name.clone()})
                    }
                    let residual = substrate_link.residual.unwrap_or(0.0);
                    if bandwidth > residual + EPS {
                        return Err(ModelError::InsufficientBandwidth {
                            link:substrate_link.name.clone(),residual,demand:bandwidth
                        })
                    }
                }
                // checked above, nothing below can fail half way
                for index in links.iter() {
                    self.reserve_bandwidth(*index,bandwidth)?;
                }
            }
        }
        self.link_mut(guest)?.host = Some(host);
        Ok(())
    }

    // removes every host reference of a virtual network and gives the substrate
    // capacity back. Tolerates partial embeddings and vanished substrate elements.
    pub fn unembed_network(&mut self,virtual_net:NetworkIdx) -> Result<()> {
        let network = self.expect_kind(virtual_net,NetworkKind::Virtual)?;
        let links = network.links.clone();
        let nodes = network.nodes.clone();
        let host = network.host;

        for index in links {
            let link = self.link_mut(index)?;
            let bandwidth = link.bandwidth;
            if let Some(LinkHost::Path(chain)) = link.host.take() {
                for substrate_link in chain {
                    if self.link(substrate_link).is_ok() {
                        self.release_bandwidth(substrate_link,bandwidth)?;
                    }
                }
            }
        }
        for index in nodes {
            let node = self.node_mut(index)?;
            let demand = node.capacity;
            let is_server = node.is_server();
            if let Some(host_node) = node.host.take() {
                if is_server && self.node(host_node).is_ok() {
                    self.release_node(host_node,demand)?;
                }
            }
        }
        self.network_mut(virtual_net)?.host = None;
        if let Some(host) = host {
            if let Some(substrate) = slot_mut(&mut self.networks,host) {
                substrate.guests.remove(&virtual_net);
                substrate.revision += 1;
            }
        }
        Ok(())
    }

    pub fn embedding_state(&self,virtual_net:NetworkIdx) -> Result<EmbeddingState> {
        let network = self.expect_kind(virtual_net,NetworkKind::Virtual)?;
        let Some(host) = network.host else {
            let any_host = network.nodes.iter().any(|n| self.node(*n).map(|n| n.host.is_some()).unwrap_or(false))
                || network.links.iter().any(|l| self.link(*l).map(|l| l.host.is_some()).unwrap_or(false));
            return Ok(if any_host {EmbeddingState::Partial} else {EmbeddingState::Unembedded})
        };
        if !self.contains_network(host) {
            return Ok(EmbeddingState::Partial)
        }
        for index in network.nodes.iter() {
            let hosted_ok = self.node(*index)?.host
                .and_then(|h| self.node(h).ok())
                .is_some_and(|h| h.network == host);
            if !hosted_ok {
                return Ok(EmbeddingState::Partial)
            }
        }
        for index in network.links.iter() {
            let hosted_ok = match self.link(*index)?.host.as_ref() {
                None => false,
                Some(LinkHost::Node(node)) => self.node(*node).is_ok(),
                Some(LinkHost::Path(chain)) => chain.iter().all(|l| self.link(*l).is_ok())
            };
            if !hosted_ok {
                return Ok(EmbeddingState::Partial)
            }
        }
        Ok(EmbeddingState::Embedded(host))
    }

    pub fn partial_networks(&self) -> Vec<NetworkIdx> {
        self.networks()
            .filter(|(_,n)| n.is_virtual())
            .map(|(i,_)| i)
            .filter(|i| self.embedding_state(*i) == Ok(EmbeddingState::Partial))
            .collect()
    }

    // brings a partially embedded network back to the unembedded state
    pub fn repair_network(&mut self,virtual_net:NetworkIdx) -> Result<()> {
        if self.embedding_state(virtual_net)? != EmbeddingState::Partial {
            return Ok(())
        }
        warn!(network = %self.network(virtual_net)?.name, "repairing partially embedded network");
        self.unembed_network(virtual_net)
    }

    pub fn snapshot_embedding(&self,virtual_net:NetworkIdx) -> Result<Option<EmbeddingSnapshot>> {
        let EmbeddingState::Embedded(host) = self.embedding_state(virtual_net)? else {
            return Ok(None)
        };
        let network = self.network(virtual_net)?;
        let mut nodes = Vec::with_capacity(network.nodes.len());
        for index in network.nodes.iter() {
            if let Some(host_node) = self.node(*index)?.host {
                nodes.push((*index,host_node));
            }
        }
        let mut links = Vec::with_capacity(network.links.len());
        for index in network.links.iter() {
            if let Some(link_host) = self.link(*index)?.host.clone() {
                links.push((*index,link_host));
            }
        }
        Ok(Some(EmbeddingSnapshot {network:virtual_net,host,nodes,links}))
    }

    pub fn restore_embedding(&mut self,snapshot:&EmbeddingSnapshot) -> Result<()> {
        self.embed_network(snapshot.network,snapshot.host)?;
        for (guest,host) in snapshot.nodes.iter() {
            self.embed_node(*guest,*host)?;
        }
        for (guest,host) in snapshot.links.iter() {
            self.embed_link(*guest,host.clone())?;
        }
        Ok(())
    }
}

// removal
impl Model {
    // virtual networks are unembedded first. Substrate networks go away
    // ungracefully: their guests keep dangling host references until repaired.
    pub fn remove_network(&mut self,index:NetworkIdx) -> Result<()> {
        let network = self.network(index)?;
        if network.is_virtual() {
            self.unembed_network(index)?;
        }
        let network = self.networks.get_mut(index)
            .and_then(|slot| slot.take())
            .ok_or(ModelError::UnknownNetwork(index))?;
        for path in network.paths.iter() {
            if let Some(path) = self.paths.get_mut(*path).and_then(|slot| slot.take()) {
                self.names.remove(&path.name);
            }
        }
        for link in network.links.iter() {
            if let Some(link) = self.links.get_mut(*link).and_then(|slot| slot.take()) {
                self.names.remove(&link.name);
            }
        }
        for node in network.nodes.iter() {
            if let Some(node) = self.nodes.get_mut(*node).and_then(|slot| slot.take()) {
                self.names.remove(&node.name);
            }
        }
        self.names.remove(&network.name);
        debug!(network = %network.name, "network removed");
        Ok(())
    }

    // drops a node with its incident links and every path crossing them.
    // Guests hosted on it are left floating.
    pub fn remove_node(&mut self,index:NodeIdx) -> Result<()> {
        let network = self.node(index)?.network;
        let incident:Vec<LinkIdx> = self.network(network)?.links.iter().copied()
            .filter(|l| self.link(*l).map(|l| l.source == index || l.target == index).unwrap_or(false))
            .collect();
        let crossing:Vec<PathIdx> = self.network(network)?.paths.iter().copied()
            .filter(|p| self.path(*p).map(|p| p.nodes.contains(&index)).unwrap_or(false))
            .collect();
        for path in crossing.iter() {
            if let Some(path) = self.paths.get_mut(*path).and_then(|slot| slot.take()) {
                self.names.remove(&path.name);
            }
        }
        for link in incident.iter() {
            if let Some(link) = self.links.get_mut(*link).and_then(|slot| slot.take()) {
                self.names.remove(&link.name);
            }
        }
        if let Some(node) = self.nodes.get_mut(index).and_then(|slot| slot.take()) {
            self.names.remove(&node.name);
        }
        let owner = self.network_mut(network)?;
        owner.links.retain(|l| !incident.contains(l));
        owner.paths.retain(|p| !crossing.contains(p));
        owner.nodes.retain(|n| *n != index);
        self.bump(network);
        Ok(())
    }
}

// invariants
impl Model {
    // for every substrate element: residual within [0, capacity] and
    // residual + hosted demand == capacity.
    pub fn check_capacity_invariant(&self,substrate:NetworkIdx) -> Result<()> {
        let network = self.expect_kind(substrate,NetworkKind::Substrate)?;
        let mut node_demand:StdHashMap<NodeIdx,Resources> = StdHashMap::new();
        let mut link_demand:StdHashMap<LinkIdx,f64> = StdHashMap::new();
        for guest in network.guests.iter() {
            let guest = self.network(*guest)?;
            for index in guest.nodes.iter() {
                let node = self.node(*index)?;
                if let (Some(host),true) = (node.host,node.is_server()) {
                    *node_demand.entry(host).or_default() += node.capacity;
                }
            }
            for index in guest.links.iter() {
                let link = self.link(*index)?;
                if let Some(LinkHost::Path(chain)) = link.host.as_ref() {
                    for substrate_link in chain {
                        *link_demand.entry(*substrate_link).or_default() += link.bandwidth;
                    }
                }
            }
        }
        for index in network.nodes.iter() {
            let node = self.node(*index)?;
            let residual = node.residual.unwrap_or(Resources::ZERO);
            if !residual.is_non_negative() || !residual.fits_in(&node.capacity) {
                return Err(ModelError::CapacityInvariant {
                    element:node.name.clone(),
                    detail:format!("residual {residual:?} outside [0, {:?}]",node.capacity)
                })
            }
            let used = node_demand.get(index).copied().unwrap_or_default();
            if !(residual + used).approx_eq(&node.capacity) {
                return Err(ModelError::CapacityInvariant {
                    element:node.name.clone(),
                    detail:format!("residual {residual:?} + hosted {used:?} != capacity {:?}",node.capacity)
                })
            }
        }
        for index in network.links.iter() {
            let link = self.link(*index)?;
            let residual = link.residual.unwrap_or(0.0);
            if residual < -EPS || residual > link.bandwidth + EPS {
                return Err(ModelError::CapacityInvariant {
                    element:link.name.clone(),
                    detail:format!("residual {residual} outside [0, {}]",link.bandwidth)
                })
            }
            let used = link_demand.get(index).copied().unwrap_or(0.0);
            if (residual + used - link.bandwidth).abs() > 1e-6 {
                return Err(ModelError::CapacityInvariant {
                    element:link.name.clone(),
                    detail:format!("residual {residual} + hosted {used} != bandwidth {}",link.bandwidth)
                })
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn substrate_with_server(model:&mut Model,capacity:f64) -> (NetworkIdx,NodeIdx) {
        let sub = model.add_substrate_network("sub").unwrap();
        let server = model.add_server(sub,"srv",Resources::uniform(capacity)).unwrap();
        (sub,server)
    }

    #[test]
    fn test_duplicate_names() {
        let mut model = Model::new();
        let sub = model.add_substrate_network("sub").unwrap();
        model.add_server(sub,"a",Resources::uniform(1.0)).unwrap();
        let err = model.add_switch(sub,"a").unwrap_err();
        assert_eq!(err,ModelError::DuplicateName { name:"a".into() });
        assert!(model.add_virtual_network("sub").is_err());
        let err = model.add_server(sub,"a@b",Resources::uniform(1.0)).unwrap_err();
        assert!(matches!(err,ModelError::ReservedCharacter{..}));
        assert_eq!(model.node_by_name("a@b"),None);
    }

    #[test]
    fn test_cross_network_link() {
        let mut model = Model::new();
        let sub = model.add_substrate_network("sub").unwrap();
        let virt = model.add_virtual_network("virt").unwrap();
        let a = model.add_server(sub,"a",Resources::uniform(1.0)).unwrap();
        let b = model.add_server(virt,"b",Resources::uniform(1.0)).unwrap();
        let err = model.add_link(sub,"a->b",a,b,1.0).unwrap_err();
        assert!(matches!(err,ModelError::CrossNetworkLink{..}));
    }

    #[test]
    fn test_embed_and_unembed_restores_residuals() {
        let mut model = Model::new();
        let (sub,server) = substrate_with_server(&mut model,2.0);
        let virt = model.add_virtual_network("virt").unwrap();
        let guest = model.add_server(virt,"v",Resources::uniform(1.0)).unwrap();

        model.embed_network(virt,sub).unwrap();
        model.embed_node(guest,server).unwrap();
        assert_eq!(model.node(server).unwrap().residual(),Some(Resources::uniform(1.0)));
        assert_eq!(model.embedding_state(virt).unwrap(),EmbeddingState::Embedded(sub));
        model.check_capacity_invariant(sub).unwrap();

        model.unembed_network(virt).unwrap();
        assert_eq!(model.node(server).unwrap().residual(),Some(Resources::uniform(2.0)));
        assert_eq!(model.embedding_state(virt).unwrap(),EmbeddingState::Unembedded);
        assert!(model.network(sub).unwrap().guests().is_empty());
        model.check_capacity_invariant(sub).unwrap();
    }

    #[test]
    fn test_reserve_beyond_residual_fails_untouched() {
        let mut model = Model::new();
        let (sub,server) = substrate_with_server(&mut model,1.0);
        let virt = model.add_virtual_network("virt").unwrap();
        let guest = model.add_server(virt,"v",Resources::new(1.0,2.0,1.0)).unwrap();
        model.embed_network(virt,sub).unwrap();
        let err = model.embed_node(guest,server).unwrap_err();
        assert!(matches!(err,ModelError::InsufficientResources{..}));
        assert_eq!(model.node(server).unwrap().residual(),Some(Resources::uniform(1.0)));
        assert_eq!(model.node(guest).unwrap().host(),None);
    }

    #[test]
    fn test_switch_cannot_host_server() {
        let mut model = Model::new();
        let sub = model.add_substrate_network("sub").unwrap();
        let switch = model.add_switch(sub,"sw").unwrap();
        let virt = model.add_virtual_network("virt").unwrap();
        let guest = model.add_server(virt,"v",Resources::uniform(1.0)).unwrap();
        model.embed_network(virt,sub).unwrap();
        assert!(matches!(model.embed_node(guest,switch),Err(ModelError::RoleMismatch{..})));
    }

    #[test]
    fn test_link_on_path_reserves_every_hop() {
        let mut model = Model::new();
        let sub = model.add_substrate_network("sub").unwrap();
        let a = model.add_server(sub,"a",Resources::uniform(1.0)).unwrap();
        let s = model.add_switch(sub,"s").unwrap();
        let b = model.add_server(sub,"b",Resources::uniform(1.0)).unwrap();
        let (a_s,_) = model.connect(sub,a,s,10.0).unwrap();
        let (s_b,_) = model.connect(sub,s,b,4.0).unwrap();
        let path = model.add_path(sub,vec![a_s,s_b]).unwrap();
        assert_eq!(model.path(path).unwrap().hop_count(),2);
        assert_eq!(model.path_bottleneck(path).unwrap(),4.0);

        let virt = model.add_virtual_network("virt").unwrap();
        let va = model.add_server(virt,"va",Resources::uniform(1.0)).unwrap();
        let vb = model.add_server(virt,"vb",Resources::uniform(1.0)).unwrap();
        let vl = model.add_link(virt,"va->vb",va,vb,3.0).unwrap();
        model.embed_network(virt,sub).unwrap();
        model.embed_node(va,a).unwrap();
        model.embed_node(vb,b).unwrap();
        model.embed_link(vl,LinkHost::Path(vec![a_s,s_b])).unwrap();

        assert_eq!(model.link(a_s).unwrap().residual(),Some(7.0));
        assert_eq!(model.link(s_b).unwrap().residual(),Some(1.0));
        assert_eq!(model.path_bottleneck(path).unwrap(),1.0);
        model.check_capacity_invariant(sub).unwrap();
    }

    #[test]
    fn test_broken_and_cyclic_chains() {
        let mut model = Model::new();
        let sub = model.add_substrate_network("sub").unwrap();
        let a = model.add_switch(sub,"a").unwrap();
        let b = model.add_switch(sub,"b").unwrap();
        let c = model.add_switch(sub,"c").unwrap();
        let (ab,ba) = model.connect(sub,a,b,1.0).unwrap();
        let (_,cb) = model.connect(sub,b,c,1.0).unwrap();
        assert!(matches!(model.add_path(sub,vec![ab,cb]),Err(ModelError::BrokenPath{..})));
        assert!(matches!(model.add_path(sub,vec![ab,ba]),Err(ModelError::CyclicPath{..})));
        assert!(matches!(model.add_path(sub,vec![]),Err(ModelError::EmptyPath)));
    }

    #[test]
    fn test_removed_host_leaves_partial_network_that_repairs() {
        let mut model = Model::new();
        let sub = model.add_substrate_network("sub").unwrap();
        let s1 = model.add_server(sub,"s1",Resources::uniform(1.0)).unwrap();
        let s2 = model.add_server(sub,"s2",Resources::uniform(1.0)).unwrap();
        let virt = model.add_virtual_network("virt").unwrap();
        let v1 = model.add_server(virt,"v1",Resources::uniform(1.0)).unwrap();
        let v2 = model.add_server(virt,"v2",Resources::uniform(1.0)).unwrap();
        model.embed_network(virt,sub).unwrap();
        model.embed_node(v1,s1).unwrap();
        model.embed_node(v2,s2).unwrap();

        model.remove_node(s1).unwrap();
        assert_eq!(model.embedding_state(virt).unwrap(),EmbeddingState::Partial);
        assert_eq!(model.partial_networks(),vec![virt]);

        model.repair_network(virt).unwrap();
        assert_eq!(model.embedding_state(virt).unwrap(),EmbeddingState::Unembedded);
        assert_eq!(model.node(s2).unwrap().residual(),Some(Resources::uniform(1.0)));
        model.check_capacity_invariant(sub).unwrap();
    }

    #[test]
    fn test_snapshot_restore() {
        let mut model = Model::new();
        let (sub,server) = substrate_with_server(&mut model,1.0);
        let virt = model.add_virtual_network("virt").unwrap();
        let guest = model.add_server(virt,"v",Resources::uniform(1.0)).unwrap();
        model.embed_network(virt,sub).unwrap();
        model.embed_node(guest,server).unwrap();

        let snapshot = model.snapshot_embedding(virt).unwrap().unwrap();
        model.unembed_network(virt).unwrap();
        assert_eq!(model.snapshot_embedding(virt).unwrap(),None);
        model.restore_embedding(&snapshot).unwrap();
        assert_eq!(model.node(guest).unwrap().host(),Some(server));
        assert_eq!(model.node(server).unwrap().residual(),Some(Resources::ZERO));
    }

    #[test]
    fn test_revision_moves_on_residual_change() {
        let mut model = Model::new();
        let (sub,server) = substrate_with_server(&mut model,1.0);
        let before = model.revision(sub).unwrap();
        model.reserve_node(server,Resources::uniform(0.5)).unwrap();
        assert!(model.revision(sub).unwrap() > before);
        assert!(model.release_node(server,Resources::uniform(1.0)).is_err());
    }

    #[test]
    fn test_substrate_removal_leaves_floating_guests() {
        let mut model = Model::new();
        let (sub,server) = substrate_with_server(&mut model,1.0);
        let virt = model.add_virtual_network("virt").unwrap();
        let guest = model.add_server(virt,"v",Resources::uniform(1.0)).unwrap();
        model.embed_network(virt,sub).unwrap();
        model.embed_node(guest,server).unwrap();
        model.remove_network(sub).unwrap();
        assert!(model.find("srv").is_none());
        assert_eq!(model.embedding_state(virt).unwrap(),EmbeddingState::Partial);
        model.repair_network(virt).unwrap();
        assert_eq!(model.embedding_state(virt).unwrap(),EmbeddingState::Unembedded);
    }
}
