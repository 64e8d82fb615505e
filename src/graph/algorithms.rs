//! Schema graph algorithms over an adjacency snapshot.
//!
//! A [`SchemaGraph`] is built once from the current edge set. It does not follow
//! later changes to the [`IrGraph`]: check [`SchemaGraph::is_stale`] and rebuild
//! after any pass that mutates the graph.

use super::ir::{IrGraph, NodeId, NodeKind};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

const UNVISITED: usize = usize::MAX;

/// Result of cycle detection. Each cycle starts and ends with the same node.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub has_cycles: bool,
    pub cycles: Vec<Vec<NodeId>>,
}

/// Kahn ordering. `remaining` holds the nodes stuck behind a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TopologicalOrder {
    pub order: Vec<NodeId>,
    pub remaining: Vec<NodeId>,
}

impl TopologicalOrder {
    pub fn is_complete(&self) -> bool {
        self.remaining.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SchemaGraph {
    nodes: Vec<NodeId>,
    index: HashMap<NodeId, usize>,
    forward: Vec<Vec<usize>>,
    reverse: Vec<Vec<usize>>,
    roots: Vec<usize>,
    revision: Option<u64>,
}

impl SchemaGraph {
    /// Snapshot the IR. Absorbed edges and edges to missing nodes are skipped;
    /// controllers are the roots.
    pub fn from_ir(graph: &IrGraph) -> Self {
        let mut sg = SchemaGraph::default();
        for id in graph.node_ids() {
            sg.intern(id);
        }
        for edge in graph.edges() {
            if edge.is_absorbed() || !graph.contains(&edge.target) {
                continue;
            }
            sg.link(&edge.source, &edge.target);
        }
        sg.roots = graph
            .nodes_of(NodeKind::Controller)
            .filter_map(|n| sg.index.get(&n.id).copied())
            .collect();
        sg.revision = Some(graph.revision());
        sg
    }

    /// Snapshot a plain adjacency list. Nodes named only by an edge are added.
    pub fn from_edges<'s>(
        nodes: impl IntoIterator<Item = &'s str>,
        edges: impl IntoIterator<Item = (&'s str, &'s str)>,
    ) -> Self {
        let mut sg = SchemaGraph::default();
        for n in nodes {
            sg.intern(&NodeId::from(n));
        }
        for (from, to) in edges {
            sg.link(&NodeId::from(from), &NodeId::from(to));
        }
        sg
    }

    pub fn with_roots<'s>(mut self, roots: impl IntoIterator<Item = &'s str>) -> Self {
        self.roots = roots
            .into_iter()
            .filter_map(|r| self.index.get(&NodeId::from(r)).copied())
            .collect();
        self
    }

    fn intern(&mut self, id: &NodeId) -> usize {
        if let Some(&i) = self.index.get(id) {
            return i;
        }
        let i = self.nodes.len();
        self.nodes.push(id.clone());
        self.index.insert(id.clone(), i);
        self.forward.push(Vec::new());
        self.reverse.push(Vec::new());
        i
    }

    fn link(&mut self, from: &NodeId, to: &NodeId) {
        let (a, b) = (self.intern(from), self.intern(to));
        if !self.forward[a].contains(&b) {
            self.forward[a].push(b);
            self.reverse[b].push(a);
        }
    }

    /// True once `graph` has been mutated since this snapshot was taken.
    pub fn is_stale(&self, graph: &IrGraph) -> bool {
        self.revision != Some(graph.revision())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn successors(&self, id: &NodeId) -> Vec<&NodeId> {
        self.index
            .get(id)
            .map(|&i| self.forward[i].iter().map(|&j| &self.nodes[j]).collect())
            .unwrap_or_default()
    }

    /// Number of distinct nodes with an edge into `id`.
    pub fn usage_count(&self, id: &NodeId) -> usize {
        self.index.get(id).map(|&i| self.reverse[i].len()).unwrap_or(0)
    }

    /// DFS with an explicit recursion stack. Every back-edge yields one cycle:
    /// the stack slice from the repeated node, closed by that node again.
    pub fn detect_cycles(&self) -> CycleReport {
        let n = self.nodes.len();
        let mut visited = vec![false; n];
        let mut on_stack = vec![false; n];
        let mut cycles = Vec::new();

        for start in 0..n {
            if visited[start] {
                continue;
            }
            let mut path: Vec<usize> = vec![start];
            let mut cursor: Vec<usize> = vec![0];
            visited[start] = true;
            on_stack[start] = true;
            while let Some(&v) = path.last() {
                let depth = path.len() - 1;
                let next = cursor[depth];
                if next < self.forward[v].len() {
                    cursor[depth] += 1;
                    let w = self.forward[v][next];
                    if on_stack[w] {
                        let from = path.iter().position(|&p| p == w).unwrap_or(0);
                        let mut cycle: Vec<NodeId> =
                            path[from..].iter().map(|&p| self.nodes[p].clone()).collect();
                        cycle.push(self.nodes[w].clone());
                        cycles.push(cycle);
                    } else if !visited[w] {
                        visited[w] = true;
                        on_stack[w] = true;
                        path.push(w);
                        cursor.push(0);
                    }
                } else {
                    on_stack[v] = false;
                    path.pop();
                    cursor.pop();
                }
            }
        }
        CycleReport {
            has_cycles: !cycles.is_empty(),
            cycles,
        }
    }

    /// Tarjan's strongly connected components, in completion order.
    pub fn strongly_connected_components(&self) -> Vec<Vec<NodeId>> {
        let n = self.nodes.len();
        let mut index = vec![UNVISITED; n];
        let mut low = vec![0usize; n];
        let mut on_stack = vec![false; n];
        let mut stack: Vec<usize> = Vec::new();
        let mut counter = 0;
        let mut components = Vec::new();

        for start in 0..n {
            if index[start] != UNVISITED {
                continue;
            }
            let mut call: Vec<(usize, usize)> = vec![(start, 0)];
            index[start] = counter;
            low[start] = counter;
            counter += 1;
            stack.push(start);
            on_stack[start] = true;

            while let Some(&(v, i)) = call.last() {
                if i < self.forward[v].len() {
                    if let Some(top) = call.last_mut() {
                        top.1 += 1;
                    }
                    let w = self.forward[v][i];
                    if index[w] == UNVISITED {
                        index[w] = counter;
                        low[w] = counter;
                        counter += 1;
                        stack.push(w);
                        on_stack[w] = true;
                        call.push((w, 0));
                    } else if on_stack[w] {
                        low[v] = low[v].min(index[w]);
                    }
                    continue;
                }
                call.pop();
                if let Some(&(parent, _)) = call.last() {
                    low[parent] = low[parent].min(low[v]);
                }
                if low[v] == index[v] {
                    let mut component = Vec::new();
                    while let Some(w) = stack.pop() {
                        on_stack[w] = false;
                        component.push(self.nodes[w].clone());
                        if w == v {
                            break;
                        }
                    }
                    components.push(component);
                }
            }
        }
        components
    }

    /// Nodes on some cycle: members of multi-node SCCs and self-looping nodes.
    pub fn cyclic_nodes(&self) -> HashSet<NodeId> {
        let mut out = HashSet::new();
        for component in self.strongly_connected_components() {
            if component.len() > 1 {
                out.extend(component);
            } else if let Some(only) = component.first() {
                let i = self.index[only];
                if self.forward[i].contains(&i) {
                    out.insert(only.clone());
                }
            }
        }
        out
    }

    /// Kahn's algorithm: for every edge `(u, v)`, `u` precedes `v`.
    pub fn topological_sort(&self) -> TopologicalOrder {
        let n = self.nodes.len();
        let mut in_degree: Vec<usize> = self.reverse.iter().map(Vec::len).collect();
        let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        let mut done = vec![false; n];
        while let Some(v) = queue.pop_front() {
            done[v] = true;
            order.push(self.nodes[v].clone());
            for &w in &self.forward[v] {
                in_degree[w] -= 1;
                if in_degree[w] == 0 {
                    queue.push_back(w);
                }
            }
        }
        let remaining = (0..n)
            .filter(|&i| !done[i])
            .map(|i| self.nodes[i].clone())
            .collect();
        TopologicalOrder { order, remaining }
    }

    fn bfs(&self, starts: &[usize]) -> Vec<Option<usize>> {
        let mut dist = vec![None; self.nodes.len()];
        let mut queue = VecDeque::new();
        for &s in starts {
            if dist[s].is_none() {
                dist[s] = Some(0);
                queue.push_back(s);
            }
        }
        while let Some(v) = queue.pop_front() {
            let d = dist[v].unwrap_or(0);
            for &w in &self.forward[v] {
                if dist[w].is_none() {
                    dist[w] = Some(d + 1);
                    queue.push_back(w);
                }
            }
        }
        dist
    }

    /// Every node reachable from `id`, including `id` itself.
    pub fn reachable_from(&self, id: &NodeId) -> BTreeSet<NodeId> {
        let Some(&start) = self.index.get(id) else {
            return BTreeSet::new();
        };
        self.collect(&self.bfs(&[start]))
    }

    /// Every node reachable from the roots (controllers).
    pub fn reachable_from_roots(&self) -> BTreeSet<NodeId> {
        self.collect(&self.bfs(&self.roots))
    }

    fn collect(&self, dist: &[Option<usize>]) -> BTreeSet<NodeId> {
        dist.iter()
            .enumerate()
            .filter(|(_, d)| d.is_some())
            .map(|(i, _)| self.nodes[i].clone())
            .collect()
    }

    /// BFS shortest path, endpoints included.
    pub fn shortest_path(&self, from: &NodeId, to: &NodeId) -> Option<Vec<NodeId>> {
        let (&s, &t) = (self.index.get(from)?, self.index.get(to)?);
        let mut parent: Vec<Option<usize>> = vec![None; self.nodes.len()];
        let mut seen = vec![false; self.nodes.len()];
        let mut queue = VecDeque::from([s]);
        seen[s] = true;
        while let Some(v) = queue.pop_front() {
            if v == t {
                let mut path = vec![self.nodes[t].clone()];
                let mut cur = t;
                while let Some(p) = parent[cur] {
                    path.push(self.nodes[p].clone());
                    cur = p;
                }
                path.reverse();
                return Some(path);
            }
            for &w in &self.forward[v] {
                if !seen[w] {
                    seen[w] = true;
                    parent[w] = Some(v);
                    queue.push_back(w);
                }
            }
        }
        None
    }

    /// Nodes grouped by BFS distance from the roots; index 0 holds the roots.
    pub fn depth_groups(&self) -> Vec<Vec<NodeId>> {
        let dist = self.bfs(&self.roots);
        let mut groups: Vec<Vec<NodeId>> = Vec::new();
        for (i, d) in dist.iter().enumerate() {
            if let Some(d) = *d {
                if groups.len() <= d {
                    groups.resize(d + 1, Vec::new());
                }
                groups[d].push(self.nodes[i].clone());
            }
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[&str]) -> Vec<NodeId> {
        v.iter().map(|s| NodeId::from(*s)).collect()
    }

    #[test]
    fn test_cycle_path_closes_on_first_node() {
        let g = SchemaGraph::from_edges(["A", "B", "C"], [("A", "B"), ("B", "C"), ("C", "A")]);
        let report = g.detect_cycles();
        assert!(report.has_cycles);
        assert_eq!(report.cycles.len(), 1);
        let cycle = &report.cycles[0];
        assert_eq!(cycle.len(), 4);
        assert_eq!(cycle.first(), cycle.last());
        assert_eq!(cycle, &ids(&["A", "B", "C", "A"]));
    }

    #[test]
    fn test_acyclic_has_no_cycles() {
        let g = SchemaGraph::from_edges(["A", "B", "C"], [("A", "B"), ("A", "C"), ("B", "C")]);
        assert!(!g.detect_cycles().has_cycles);
    }

    #[test]
    fn test_scc_groups_mutual_references() {
        let g = SchemaGraph::from_edges(
            ["A", "B", "C", "D"],
            [("A", "B"), ("B", "A"), ("B", "C"), ("C", "C")],
        );
        let mut sccs: Vec<Vec<NodeId>> = g
            .strongly_connected_components()
            .into_iter()
            .map(|mut c| {
                c.sort();
                c
            })
            .collect();
        sccs.sort();
        assert_eq!(sccs, vec![ids(&["A", "B"]), ids(&["C"]), ids(&["D"])]);
        let cyclic = g.cyclic_nodes();
        assert!(cyclic.contains(&NodeId::from("C")));
        assert!(!cyclic.contains(&NodeId::from("D")));
    }

    #[test]
    fn test_topological_order_respects_edges() {
        let edges = [("A", "B"), ("A", "C"), ("C", "D"), ("B", "D"), ("E", "A")];
        let g = SchemaGraph::from_edges(["A", "B", "C", "D", "E"], edges);
        let topo = g.topological_sort();
        assert!(topo.is_complete());
        let pos = |n: &str| topo.order.iter().position(|x| x.as_str() == n).unwrap();
        for (u, v) in edges {
            assert!(pos(u) < pos(v), "{u} before {v}");
        }
    }

    #[test]
    fn test_topological_order_leaves_cycle_residual() {
        let g = SchemaGraph::from_edges(["A", "B", "C"], [("A", "B"), ("B", "C"), ("C", "B")]);
        let topo = g.topological_sort();
        assert_eq!(topo.order, ids(&["A"]));
        assert_eq!(topo.remaining.len(), 2);
    }

    #[test]
    fn test_reachability_and_shortest_path() {
        let g = SchemaGraph::from_edges(
            ["R", "A", "B", "C", "Z"],
            [("R", "A"), ("A", "B"), ("B", "C"), ("R", "C")],
        )
        .with_roots(["R"]);
        let reach = g.reachable_from_roots();
        assert!(reach.contains(&NodeId::from("C")));
        assert!(!reach.contains(&NodeId::from("Z")));
        assert_eq!(
            g.shortest_path(&NodeId::from("R"), &NodeId::from("C")),
            Some(ids(&["R", "C"]))
        );
        assert_eq!(g.shortest_path(&NodeId::from("C"), &NodeId::from("R")), None);
        let groups = g.depth_groups();
        assert_eq!(groups[0], ids(&["R"]));
        assert_eq!(groups[1].len(), 2);
    }

    #[test]
    fn test_snapshot_goes_stale_after_mutation() {
        use crate::graph::ir::{NodePayload, TypeDefPayload};
        let mut ir = IrGraph::new();
        ir.add_node(
            NodeKind::TypeDefinition,
            "A",
            None,
            NodePayload::TypeDefinition(TypeDefPayload::default()),
        );
        let sg = SchemaGraph::from_ir(&ir);
        assert!(!sg.is_stale(&ir));
        ir.add_node(
            NodeKind::TypeDefinition,
            "B",
            None,
            NodePayload::TypeDefinition(TypeDefPayload::default()),
        );
        assert!(sg.is_stale(&ir));
    }
}
