use std::collections::BTreeMap;

use super::dijkstra::{Exclusions, RawPath, SearchGraph, ShortestPathTree};
use crate::network::{LinkIdx, NodeIdx};

// (hops, link name ranks): shortest first, then name order
type CandidateKey = (usize,Vec<usize>);

fn candidate_key(graph:&SearchGraph,path:&RawPath) -> CandidateKey {
    (path.hops(),path.links.iter().map(|l| graph.link_rank(*l)).collect())
}

// yen's k shortest loopless paths from `source` to `target`, shortest first.
// Fewer than `k` paths come back when the graph runs out of alternatives.
pub(crate) fn k_shortest_paths(graph:&SearchGraph,source:NodeIdx,target:NodeIdx,k:usize) -> Vec<RawPath> {
    if k == 0 || source == target {
        return vec![];
    }
    let Some(first) = ShortestPathTree::grow(graph,source,&Exclusions::none(graph)).path_to(target) else {
        return vec![];
    };
    let mut accepted:Vec<RawPath> = Vec::with_capacity(k);
    accepted.push(first);
    let mut candidates:BTreeMap<CandidateKey,RawPath> = BTreeMap::new();

    while accepted.len() < k {
        let last = &accepted[accepted.len() - 1];
        for spur_index in 0..last.hops() {
            let spur_node = last.nodes[spur_index];
            let root_links:&[LinkIdx] = &last.links[..spur_index];

            let mut excluded = Exclusions::none(graph);
            // the link leaving the shared prefix, for every accepted path with that prefix
            for path in accepted.iter() {
                if path.hops() > spur_index && path.links[..spur_index] == *root_links {
                    excluded.links.store_at(path.links[spur_index],true);
                }
            }
            // the prefix itself, so the deviation cannot loop back into it
            for node in last.nodes[..spur_index].iter() {
                excluded.nodes.store_at(*node,true);
            }

            let Some(spur) = ShortestPathTree::grow(graph,spur_node,&excluded).path_to(target) else {
                continue;
            };
            let mut nodes = last.nodes[..spur_index].to_vec();
            nodes.extend_from_slice(&spur.nodes);
            let mut links = root_links.to_vec();
            links.extend_from_slice(&spur.links);
            let total = RawPath {nodes,links};

            if accepted.iter().any(|p| p.links == total.links) {
                continue;
            }
            candidates.entry(candidate_key(graph,&total)).or_insert(total);
        }
        let Some((_,next)) = candidates.pop_first() else {
            break;
        };
        accepted.push(next);
    }
    accepted
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;
    use crate::network::{Model, NetworkIdx, Resources};

    fn ring(size:usize) -> (Model,NetworkIdx) {
        let mut model = Model::new();
        let sub = model.add_substrate_network("ring").unwrap();
        let nodes:Vec<_> = (0..size)
            .map(|i| model.add_switch(sub,&format!("n{i:02}")).unwrap())
            .collect();
        for i in 0..size {
            model.connect(sub,nodes[i],nodes[(i + 1) % size],1.0).unwrap();
        }
        (model,sub)
    }

    #[test]
    fn test_ring_has_two_paths() {
        let (model,sub) = ring(6);
        let graph = SearchGraph::build(&model,sub).unwrap();
        let a = model.node_by_name("n00").unwrap();
        let b = model.node_by_name("n02").unwrap();
        let paths = k_shortest_paths(&graph,a,b,5);
        assert_eq!(paths.len(),2);
        assert_eq!(paths[0].hops(),2);
        assert_eq!(paths[1].hops(),4);
        assert_ne!(paths[0].links,paths[1].links);
    }

    #[test]
    fn test_k_zero_and_same_node() {
        let (model,sub) = ring(4);
        let graph = SearchGraph::build(&model,sub).unwrap();
        let a = model.node_by_name("n00").unwrap();
        assert!(k_shortest_paths(&graph,a,a,3).is_empty());
        let b = model.node_by_name("n01").unwrap();
        assert!(k_shortest_paths(&graph,a,b,0).is_empty());
    }

    #[test]
    fn test_random_graphs_monotone_and_loopless() {
        let mut rng = rand::rng();
        for round in 0..8 {
            let mut model = Model::new();
            let sub = model.add_substrate_network("sub").unwrap();
            let size:usize = rng.random_range(4..12);
            let nodes:Vec<_> = (0..size)
                .map(|i| model.add_server(sub,&format!("s{i}"),Resources::uniform(1.0)).unwrap())
                .collect();
            let mut next_link = 0;
            for _ in 0..size*2 {
                let from = rng.random_range(0..size);
                let to = rng.random_range(0..size);
                if from == to {continue}
                model.add_link(sub,&format!("l{next_link}"),nodes[from],nodes[to],rng.random_range(1.0..10.0)).unwrap();
                next_link += 1;
            }
            let graph = SearchGraph::build(&model,sub).unwrap();
            let k = rng.random_range(1..6);
            for source in nodes.iter() {
                for target in nodes.iter() {
                    let paths = k_shortest_paths(&graph,*source,*target,k);
                    assert!(paths.len() <= k,"round {round}");
                    for pair in paths.windows(2) {
                        assert!(pair[0].hops() <= pair[1].hops(),"round {round}");
                        assert_ne!(pair[0].links,pair[1].links);
                    }
                    for path in paths.iter() {
                        assert_eq!(path.source(),*source);
                        assert_eq!(path.target(),*target);
                        assert_eq!(model.chain_nodes(&path.links).unwrap(),path.nodes);
                    }
                }
            }
        }
    }
}
