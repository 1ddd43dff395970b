use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::dsa::bitset::BitSet;
use crate::dsa::graph::{DirectedGraph, Visited};
use crate::network::{LinkIdx, Model, ModelError, NetworkIdx, NodeIdx};

type HashMap<K,V> = std::collections::hash_map::HashMap<K,V,nohash::BuildNoHashHasher<usize>>;

fn no_hash_map<V>(capacity:usize) -> HashMap<usize,V> {
    HashMap::with_capacity_and_hasher(capacity,nohash::BuildNoHashHasher::default())
}

// A link chain found by the search, not yet stored in the model.
#[derive(Debug,Clone,PartialEq,Eq)]
pub(crate) struct RawPath {
    pub(crate) nodes:Vec<NodeIdx>,
    pub(crate) links:Vec<LinkIdx>
}

impl RawPath {
    pub(crate) fn hops(&self) -> usize {
        self.links.len()
    }
    pub(crate) fn source(&self) -> NodeIdx {
        self.nodes[0]
    }
    pub(crate) fn target(&self) -> NodeIdx {
        self.nodes[self.nodes.len() - 1]
    }
}

// nodes and links a search must not touch. Local to one search, the graph
// itself is never changed.
pub(crate) struct Exclusions {
    pub(crate) nodes:BitSet,
    pub(crate) links:BitSet
}

impl Exclusions {
    pub(crate) fn none(graph:&SearchGraph) -> Self {
        Self {nodes:BitSet::zeros(graph.node_slots),links:BitSet::zeros(graph.link_slots)}
    }
}

// adjacency of one substrate network plus the name ranks used to break ties
pub(crate) struct SearchGraph {
    graph:DirectedGraph,
    node_rank:HashMap<NodeIdx,usize>,
    link_rank:HashMap<LinkIdx,usize>,
    // nodes ordered by name
    ordered:Vec<NodeIdx>,
    node_slots:usize,
    link_slots:usize
}

impl SearchGraph {
    pub(crate) fn build(model:&Model,network:NetworkIdx) -> Result<Self,ModelError> {
        let net = model.network(network)?;
        let mut graph = DirectedGraph::from_network(model,network)?;

        let mut ordered:Vec<NodeIdx> = net.nodes().to_vec();
        ordered.sort_by_key(|n| model.node(*n).map(|n| n.name().to_owned()).unwrap_or_default());
        let mut links:Vec<LinkIdx> = net.links().to_vec();
        links.sort_by_key(|l| model.link(*l).map(|l| l.name().to_owned()).unwrap_or_default());

        let mut node_rank = no_hash_map(ordered.len());
        for (rank,node) in ordered.iter().enumerate() {
            node_rank.insert(*node,rank);
        }
        let mut link_rank = no_hash_map(links.len());
        for (rank,link) in links.iter().enumerate() {
            link_rank.insert(*link,rank);
        }
        graph.sort_arcs_by_key(|(link,node)| (node_rank[node],link_rank[link]));

        debug_assert_eq!(graph.nodes_len(),ordered.len());
        Ok(Self {
            graph,
            node_rank,
            link_rank,
            ordered,
            node_slots:model.node_slots(),
            link_slots:model.link_slots()
        })
    }
    pub(crate) fn ordered_nodes(&self) -> &[NodeIdx] {
        &self.ordered
    }
    pub(crate) fn rank(&self,node:NodeIdx) -> usize {
        self.node_rank.get(&node).copied().unwrap_or(usize::MAX)
    }
    pub(crate) fn link_rank(&self,link:LinkIdx) -> usize {
        self.link_rank.get(&link).copied().unwrap_or(usize::MAX)
    }
    pub(crate) fn arcs_len(&self) -> usize {
        self.graph.edges_len()
    }
    // nothing can arrive at a node without incoming links
    pub(crate) fn has_no_incoming(&self,node:NodeIdx) -> bool {
        self.graph.prev_arcs(&node).is_empty()
    }
    pub(crate) fn reachable_from(&self,node:NodeIdx) -> Vec<NodeIdx> {
        self.graph.dfs(node).unwrap_or_default()
    }
}

// hop-count shortest path tree rooted at one node
pub(crate) struct ShortestPathTree {
    source:NodeIdx,
    distance:HashMap<NodeIdx,usize>,
    // node -> (link used to enter it, previous node)
    predecessor:HashMap<NodeIdx,(LinkIdx,NodeIdx)>
}

impl ShortestPathTree {
    // relaxation in (distance, name) order. A node keeps the predecessor that
    // reached it first, which is the name-smallest among equally short ones.
    pub(crate) fn grow(graph:&SearchGraph,source:NodeIdx,excluded:&Exclusions) -> Self {
        let mut distance = no_hash_map(graph.ordered.len());
        let mut predecessor = no_hash_map(graph.ordered.len());
        if !graph.graph.contains_node(&source) || excluded.nodes.get_at(source) {
            return Self {source,distance,predecessor};
        }
        let mut visited = Visited::from(&graph.graph);
        let mut heap = BinaryHeap::new();
        distance.insert(source,0);
        heap.push(Reverse((0usize,graph.rank(source),source)));

        while let Some(Reverse((dist,_,node))) = heap.pop() {
            if visited.is_visited(&node) != Some(false) {
                continue;
            }
            visited.visit(&node);
            for (link,next) in graph.graph.next_arcs(&node) {
                if excluded.links.get_at(*link) || excluded.nodes.get_at(*next) {
                    continue;
                }
                if visited.is_visited(next) != Some(false) {
                    continue;
                }
                let candidate = dist + 1;
                let improves = distance.get(next).is_none_or(|known| candidate < *known);
                if improves {
                    distance.insert(*next,candidate);
                    predecessor.insert(*next,(*link,node));
                    heap.push(Reverse((candidate,graph.rank(*next),*next)));
                }
            }
        }
        Self {source,distance,predecessor}
    }
    pub(crate) fn distance(&self,target:NodeIdx) -> Option<usize> {
        self.distance.get(&target).copied()
    }
    pub(crate) fn path_to(&self,target:NodeIdx) -> Option<RawPath> {
        if target == self.source {
            return None;
        }
        let hops = self.distance(target)?;
        let mut nodes = Vec::with_capacity(hops + 1);
        let mut links = Vec::with_capacity(hops);
        let mut current = target;
        nodes.push(current);
        while current != self.source {
            let (link,previous) = *self.predecessor.get(&current)?;
            links.push(link);
            nodes.push(previous);
            current = previous;
        }
        nodes.reverse();
        links.reverse();
        debug_assert_eq!(links.len(),hops);
        Some(RawPath {nodes,links})
    }
}
