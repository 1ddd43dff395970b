use std::borrow::Borrow;

use crate::network::{LinkIdx, Model, ModelError, NetworkIdx, NodeIdx};

type HashMap<K,V> = std::collections::hash_map::HashMap<K,V,nohash::BuildNoHashHasher<usize>>;
type HashSet<K> = std::collections::hash_set::HashSet<K,nohash::BuildNoHashHasher<usize>>;

// (link, node on the other side)
pub(crate) type Arc = (LinkIdx,NodeIdx);

#[derive(Clone)]
struct Neighbours {
    to:Vec<Arc>,
    from:Vec<Arc>,
}

impl Neighbours {
    fn new() -> Self {
        Self {to:vec![],from:vec![]}
    }
    fn shrink_to_fit(&mut self) {
        self.to.shrink_to_fit();
        self.from.shrink_to_fit();
    }
}

impl Default for Neighbours {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub(crate) struct Visited {
    visited_nodes:HashSet<usize>,
    unvisited_nodes:HashSet<usize>
}

impl From<&DirectedGraph> for Visited {
    fn from(value: &DirectedGraph) -> Self {
        let mut new_visited = Self::with_capacity(value.nodes_len());
        for node in value.nodes.keys() {
            new_visited.push_node(node);
        }
        new_visited
    }
}

impl Visited {
    fn new() -> Self {
        Self {visited_nodes:HashSet::with_hasher(nohash::BuildNoHashHasher::default()),
        unvisited_nodes:HashSet::with_hasher(nohash::BuildNoHashHasher::default())}
    }
    fn with_capacity(capacity:usize) -> Self {
        if capacity == 0 {
            return Self::new();
        }
        Self {visited_nodes:HashSet::with_capacity_and_hasher(capacity,nohash::BuildNoHashHasher::default()),
            unvisited_nodes:HashSet::with_capacity_and_hasher(capacity,nohash::BuildNoHashHasher::default())
        }
    }
    fn push_node(&mut self,node:&usize) {
        if self.visited_nodes.contains(node) {
            debug_assert!(!self.unvisited_nodes.contains(node));
            return;
        }
        self.unvisited_nodes.insert(*node);
    }
    pub(crate) fn visit(&mut self,node:&usize) {
        if !self.unvisited_nodes.contains(node) {
            return
        };
        // only nodes that exist and are still unvisited move over
        self.unvisited_nodes.remove(node);
        self.visited_nodes.insert(*node);
    }
    // none: not in the graph
    // Some(false): known, not visited yet
    // Some(true): known and visited
    pub(crate) fn is_visited(&self,node:&usize) -> Option<bool> {
        if self.unvisited_nodes.contains(node) {
            debug_assert!(!self.visited_nodes.contains(node));
            return Some(false);
        }
        if self.visited_nodes.contains(node) {
            debug_assert!(!self.unvisited_nodes.contains(node));
            return Some(true)
        }
        None
    }
}

impl<A:Borrow<usize>> FromIterator<A> for Visited {
    fn from_iter<T: IntoIterator<Item = A>>(iter: T) -> Self {
        let iter = iter.into_iter();
        let size = match iter.size_hint() {
            (_,Some(higher)) => {higher},
            (lower,None) => {lower}
        };
        let mut v = Self::with_capacity(size);
        for elem in iter {
            v.push_node(elem.borrow());
        }
        v
    }
}

// directed multigraph over model indices. Every arc carries the link that
// realises it, so parallel links stay distinguishable.
#[derive(Clone)]
pub(crate) struct DirectedGraph {
    edges_len:usize,
    nodes:HashMap<NodeIdx,Neighbours>
}

impl DirectedGraph {
    pub(crate) fn new() -> Self {
        Self {edges_len:0,nodes:HashMap::with_hasher(nohash::BuildNoHashHasher::default())}
    }
    pub(crate) fn with_capacity(capacity:usize) -> Self {
        if capacity == 0 {
            return Self::new();
        }
        Self {edges_len:0,nodes:HashMap::with_capacity_and_hasher(capacity, nohash::BuildNoHashHasher::default())}
    }
    // adjacency of one network as it is right now
    pub(crate) fn from_network(model:&Model,network:NetworkIdx) -> Result<Self,ModelError> {
        let net = model.network(network)?;
        let mut graph = Self::with_capacity(net.nodes().len());
        for node in net.nodes() {
            graph.push_node(*node);
        }
        for index in net.links() {
            let link = model.link(*index)?;
            graph.push_arc(*index,link.source(),link.target());
        }
        graph.shrink_to_fit();
        Ok(graph)
    }
    pub(crate) fn shrink_to_fit(&mut self) {
        self.nodes.shrink_to_fit();
        for neighbours in self.nodes.values_mut() {
            neighbours.shrink_to_fit();
        }
    }
    pub(crate) fn nodes_len(&self) -> usize {
        self.nodes.len()
    }
    pub(crate) fn edges_len(&self) -> usize {
        self.edges_len
    }
    pub(crate) fn contains_node(&self,node:&NodeIdx) -> bool {
        self.nodes.contains_key(node)
    }
    pub(crate) fn next_arcs(&self,node:&NodeIdx) -> &[Arc] {
        self.nodes.get(node).map(|n| n.to.as_slice()).unwrap_or(&[])
    }
    pub(crate) fn prev_arcs(&self,node:&NodeIdx) -> &[Arc] {
        self.nodes.get(node).map(|n| n.from.as_slice()).unwrap_or(&[])
    }
    #[cfg(debug_assertions)]
    fn assert_arc(&self,link:LinkIdx,start:NodeIdx,end:NodeIdx) {
        let start_node = &self.nodes[&start];
        let end_node = &self.nodes[&end];
        if !start_node.to.contains(&(link,end)) {
            panic!("Arc {start} -> {end} defined, but {end} is not in {start}'s to list");
        }
        if !end_node.from.contains(&(link,start)) {
            panic!("Arc {start} -> {end} defined, but {start} is not in {end}'s from list");
        }
    }
    pub(crate) fn push_node(&mut self,node:NodeIdx) {
        if self.nodes.contains_key(&node) {return;}
        self.nodes.insert(node, Neighbours::new());
    }
    pub(crate) fn push_arc(&mut self,link:LinkIdx,start:NodeIdx,end:NodeIdx) {
        self.nodes.entry(start).or_default().to.push((link,end));
        self.nodes.entry(end).or_default().from.push((link,start));
        self.edges_len += 1;

        #[cfg(debug_assertions)]
        self.assert_arc(link,start,end);
    }
    // orders every neighbour list by `key`, so traversals become deterministic
    pub(crate) fn sort_arcs_by_key<K:Ord>(&mut self,mut key:impl FnMut(&Arc) -> K) {
        for neighbours in self.nodes.values_mut() {
            neighbours.to.sort_by_key(&mut key);
            neighbours.from.sort_by_key(&mut key);
        }
    }
    pub(crate) fn dfs(&self,start_node:NodeIdx) -> Option<Vec<NodeIdx>> {
        if !self.nodes.contains_key(&start_node) {
            return None;
        }
        let mut visited:Visited = self.nodes.keys().collect();
        let mut stack = Vec::with_capacity(self.nodes_len());
        let mut order = Vec::with_capacity(self.nodes_len());
        stack.push(start_node);
        while let Some(current) = stack.pop() {
            if visited.is_visited(&current)? {
                continue;
            }
            visited.visit(&current);
            order.push(current);
            for (_,next) in self.next_arcs(&current).iter().rev() {
                if !visited.is_visited(next)? {
                    stack.push(*next);
                }
            }
        }
        Some(order)
    }
}

impl<A:Borrow<(LinkIdx,NodeIdx,NodeIdx)>> FromIterator<A> for DirectedGraph {
    fn from_iter<T: IntoIterator<Item = A>>(iter: T) -> Self {
        let iter = iter.into_iter();
        let size = match iter.size_hint() {
            (_,Some(higher)) => {higher},
            (lower,None) => {lower}
        };
        let mut new_graph = Self::with_capacity(size);
        for arc in iter {
            let (link,start,end) = arc.borrow();
            new_graph.push_arc(*link,*start,*end);
        }
        new_graph.shrink_to_fit();
        new_graph
    }
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::DirectedGraph;

    #[test]
    fn test_chain_dfs() {
        let mut rng = rand::rng();
        let len:usize = rng.random_range(2..64);
        let arcs:Vec<(usize,usize,usize)> = (0..len - 1).map(|i| (i,i,i + 1)).collect();
        let graph:DirectedGraph = arcs.iter().collect();
        let order = graph.dfs(0).unwrap();
        assert_eq!(order,(0..len).collect::<Vec<_>>());
        assert_eq!(graph.edges_len(),len - 1);
        assert_eq!(graph.prev_arcs(&(len - 1)),&[(len - 2,len - 2)]);
    }

    #[test]
    fn test_dfs_stops_at_unreachable() {
        let arcs:[(usize,usize,usize);3] = [(0,1,2),(1,2,1),(2,3,4)];
        let graph:DirectedGraph = arcs.iter().collect();
        let order = graph.dfs(1).unwrap();
        assert_eq!(order,vec![1,2]);
        assert!(graph.dfs(9).is_none());
        assert!(graph.contains_node(&4));
    }

    #[test]
    fn test_parallel_links_kept() {
        let arcs:[(usize,usize,usize);2] = [(7,0,1),(3,0,1)];
        let mut graph:DirectedGraph = arcs.iter().collect();
        graph.sort_arcs_by_key(|(link,_)| *link);
        assert_eq!(graph.next_arcs(&0),&[(3,1),(7,1)]);
        assert_eq!(graph.nodes_len(),2);
    }
}
