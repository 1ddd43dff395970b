// candidate routes between every pair of substrate nodes
// the delta builder turns each stored path into a link embedding candidate

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::network::{Model, ModelError, NetworkIdx, NetworkKind};

mod dijkstra;
mod yen;

use dijkstra::{Exclusions, RawPath, SearchGraph, ShortestPathTree};

#[derive(Error,Debug,Clone,PartialEq)]
pub enum PathError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("k shortest path generation needs k >= 1")]
    ZeroK,
    #[error("the minimum path length must be at least one hop")]
    ZeroMinHops,
    #[error("maximum path length {max} is below the minimum {min}")]
    InvertedBounds{min:usize,max:usize},
    #[error("{candidates} paths were found, but none is between {min} and {max:?} hops long")]
    AllPathsRejected{candidates:usize,min:usize,max:Option<usize>},
    #[error("unknown path mode {0}")]
    UnknownMode(String),
}

type Result<T> = std::result::Result<T,PathError>;

#[derive(Debug,Clone,Copy,PartialEq,Eq,Serialize,Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PathMode {
    Shortest,
    KShortest(usize)
}

impl Display for PathMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathMode::Shortest => write!(f,"shortest"),
            PathMode::KShortest(k) => write!(f,"k-shortest:{k}")
        }
    }
}

impl FromStr for PathMode {
    type Err = PathError;
    // "shortest" or "k-shortest:<k>"
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s == "shortest" {
            return Ok(PathMode::Shortest)
        }
        let k = s.strip_prefix("k-shortest:")
            .and_then(|k| k.parse::<usize>().ok())
            .ok_or_else(|| PathError::UnknownMode(s.to_owned()))?;
        Ok(PathMode::KShortest(k))
    }
}

#[derive(Debug,Clone,Copy,PartialEq,Eq,Serialize,Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PathConfig {
    pub mode:PathMode,
    pub min_hops:usize,
    pub max_hops:Option<usize>
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {mode:PathMode::Shortest,min_hops:1,max_hops:None}
    }
}

impl PathConfig {
    pub fn shortest() -> Self {
        Self::default()
    }
    pub fn k_shortest(k:usize) -> Self {
        Self {mode:PathMode::KShortest(k),..Self::default()}
    }
    pub fn with_max_hops(self,max_hops:usize) -> Self {
        Self {max_hops:Some(max_hops),..self}
    }
    pub fn validate(&self) -> Result<()> {
        if self.mode == PathMode::KShortest(0) {
            return Err(PathError::ZeroK)
        }
        if self.min_hops == 0 {
            return Err(PathError::ZeroMinHops)
        }
        if let Some(max) = self.max_hops {
            if max < self.min_hops {
                return Err(PathError::InvertedBounds { min:self.min_hops,max })
            }
        }
        Ok(())
    }
    pub fn accepts(&self,hops:usize) -> bool {
        hops >= self.min_hops && self.max_hops.is_none_or(|max| hops <= max)
    }
}

// replaces the path set of `substrate` with freshly computed paths between
// every ordered pair of its nodes. Returns how many paths were stored.
pub fn generate_paths(model:&mut Model,substrate:NetworkIdx,config:&PathConfig) -> Result<usize> {
    config.validate()?;
    model.expect_kind(substrate,NetworkKind::Substrate)?;

    let graph = SearchGraph::build(model,substrate)?;
    let mut found:Vec<RawPath> = vec![];
    let mut candidates = 0;

    for source in graph.ordered_nodes() {
        let reachable = graph.reachable_from(*source);
        match config.mode {
            PathMode::Shortest => {
                let tree = ShortestPathTree::grow(&graph,*source,&Exclusions::none(&graph));
                for target in graph.ordered_nodes() {
                    let Some(path) = tree.path_to(*target) else {continue};
                    candidates += 1;
                    if config.accepts(path.hops()) {
                        found.push(path);
                    }
                }
            },
            PathMode::KShortest(k) => {
                for target in graph.ordered_nodes() {
                    if target == source || graph.has_no_incoming(*target) || !reachable.contains(target) {
                        continue;
                    }
                    for path in yen::k_shortest_paths(&graph,*source,*target,k) {
                        candidates += 1;
                        if config.accepts(path.hops()) {
                            found.push(path);
                        }
                    }
                }
            }
        }
        debug!(source = *source, reachable = reachable.len(), "paths searched");
    }

    if candidates > 0 && found.is_empty() {
        return Err(PathError::AllPathsRejected {candidates,min:config.min_hops,max:config.max_hops})
    }

    let removed = model.clear_paths(substrate)?;
    let stored = found.len();
    for path in found {
        debug_assert!(path.source() != path.target());
        model.add_path(substrate,path.links)?;
    }
    info!(
        network = %model.network(substrate)?.name(),
        mode = %config.mode,
        arcs = graph.arcs_len(),
        removed,
        stored,
        "substrate paths generated"
    );
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;
    use crate::network::{NodeIdx, Resources};

    fn line(model:&mut Model,size:usize) -> (NetworkIdx,Vec<NodeIdx>) {
        let sub = model.add_substrate_network("line").unwrap();
        let nodes:Vec<_> = (0..size)
            .map(|i| model.add_server(sub,&format!("s{i}"),Resources::uniform(1.0)).unwrap())
            .collect();
        for pair in nodes.windows(2) {
            model.connect(sub,pair[0],pair[1],10.0).unwrap();
        }
        (sub,nodes)
    }

    #[test]
    fn test_shortest_covers_every_pair() {
        let mut model = Model::new();
        let (sub,_) = line(&mut model,4);
        let stored = generate_paths(&mut model,sub,&PathConfig::shortest()).unwrap();
        assert_eq!(stored,4*3);
        for path in model.network(sub).unwrap().paths() {
            let path = model.path(*path).unwrap();
            assert_eq!(path.hop_count(),path.links().len());
            assert_eq!(model.chain_nodes(path.links()).unwrap(),path.nodes());
        }
    }

    #[test]
    fn test_regeneration_replaces_paths() {
        let mut model = Model::new();
        let (sub,_) = line(&mut model,3);
        generate_paths(&mut model,sub,&PathConfig::shortest()).unwrap();
        let stored = generate_paths(&mut model,sub,&PathConfig::shortest().with_max_hops(1)).unwrap();
        assert_eq!(stored,4);
        assert_eq!(model.network(sub).unwrap().paths().len(),4);
    }

    #[test]
    fn test_disconnected_pairs_are_skipped() {
        let mut model = Model::new();
        let (sub,_) = line(&mut model,2);
        model.add_server(sub,"island",Resources::uniform(1.0)).unwrap();
        assert_eq!(generate_paths(&mut model,sub,&PathConfig::shortest()).unwrap(),2);
    }

    #[test]
    fn test_min_hops_rejecting_everything_is_an_error() {
        let mut model = Model::new();
        let (sub,_) = line(&mut model,2);
        let config = PathConfig {min_hops:3,..PathConfig::shortest()};
        let err = generate_paths(&mut model,sub,&config).unwrap_err();
        assert!(matches!(err,PathError::AllPathsRejected{candidates:2,..}));
        // the old path set is left alone
        assert!(model.network(sub).unwrap().paths().is_empty());
    }

    #[test]
    fn test_invalid_configs() {
        let mut model = Model::new();
        let (sub,_) = line(&mut model,2);
        let zero = PathConfig {min_hops:0,..PathConfig::shortest()};
        assert_eq!(generate_paths(&mut model,sub,&zero),Err(PathError::ZeroMinHops));
        assert_eq!(generate_paths(&mut model,sub,&PathConfig::k_shortest(0)),Err(PathError::ZeroK));
        let inverted = PathConfig {min_hops:3,..PathConfig::shortest()}.with_max_hops(2);
        assert!(matches!(generate_paths(&mut model,sub,&inverted),Err(PathError::InvertedBounds{..})));
        let virt = model.add_virtual_network("virt").unwrap();
        assert!(matches!(generate_paths(&mut model,virt,&PathConfig::shortest()),Err(PathError::Model(_))));
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("shortest".parse::<PathMode>().unwrap(),PathMode::Shortest);
        assert_eq!("k-shortest:3".parse::<PathMode>().unwrap(),PathMode::KShortest(3));
        assert_eq!(PathMode::KShortest(4).to_string(),"k-shortest:4");
        assert!("k-shortest:x".parse::<PathMode>().is_err());
    }

    // every stored path: contiguous, loopless, hop count == link count,
    // bottleneck == min residual, and per pair the k paths never get shorter
    #[test]
    fn test_random_substrates_k_shortest() {
        let mut rng = rand::rng();
        for _ in 0..6 {
            let mut model = Model::new();
            let sub = model.add_substrate_network("sub").unwrap();
            let size:usize = rng.random_range(3..10);
            let nodes:Vec<_> = (0..size)
                .map(|i| model.add_switch(sub,&format!("w{i}")).unwrap())
                .collect();
            for i in 0..size {
                for j in i + 1..size {
                    if rng.random_bool(0.4) {
                        model.connect(sub,nodes[i],nodes[j],rng.random_range(1.0..100.0)).unwrap();
                    }
                }
            }
            let k = rng.random_range(1..5);
            if generate_paths(&mut model,sub,&PathConfig::k_shortest(k)).is_err() {
                continue;
            }
            let paths = model.network(sub).unwrap().paths().to_vec();
            let mut last:Option<(NodeIdx,NodeIdx,usize)> = None;
            for index in paths {
                let path = model.path(index).unwrap();
                assert_eq!(model.chain_nodes(path.links()).unwrap(),path.nodes());
                assert_eq!(path.hop_count(),path.links().len());
                let min = path.links().iter()
                    .map(|l| model.link(*l).unwrap().residual().unwrap())
                    .fold(f64::INFINITY,f64::min);
                assert_eq!(model.path_bottleneck(index).unwrap(),min);
                if let Some((source,target,hops)) = last {
                    if source == path.source() && target == path.target() {
                        assert!(hops <= path.hop_count());
                    }
                }
                last = Some((path.source(),path.target(),path.hop_count()));
            }
        }
    }
}
