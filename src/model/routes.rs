//! Route enumeration over the road graph.

use super::Route;

/// One endpoint of a road in the mixed crusher / shovel / node index
/// space used while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GraphPoint {
    Crusher(usize),
    Shovel(usize),
    Node(usize),
}

/// An undirected road graph on crushers, shovels and intermediate nodes.
#[derive(Debug)]
pub(crate) struct RoadGraph {
    num_crushers: usize,
    num_shovels: usize,
    /// adjacency[point] = (neighbour, road index, direction from point).
    adjacency: Vec<Vec<(usize, usize, usize)>>,
}

impl RoadGraph {
    pub(crate) fn new(num_crushers: usize, num_shovels: usize, num_nodes: usize) -> Self {
        Self {
            num_crushers,
            num_shovels,
            adjacency: vec![Vec::new(); num_crushers + num_shovels + num_nodes],
        }
    }

    fn flatten(&self, point: GraphPoint) -> usize {
        match point {
            GraphPoint::Crusher(i) => i,
            GraphPoint::Shovel(i) => self.num_crushers + i,
            GraphPoint::Node(i) => self.num_crushers + self.num_shovels + i,
        }
    }

    /// Registers a road between two points. Direction 0 runs from `a`
    /// to `b`.
    pub(crate) fn add_road(&mut self, road: usize, a: GraphPoint, b: GraphPoint) {
        let (fa, fb) = (self.flatten(a), self.flatten(b));
        self.adjacency[fa].push((fb, road, 0));
        self.adjacency[fb].push((fa, road, 1));
    }
}

/// Enumerates every cycle-free crusher-to-shovel path in the graph.
///
/// Paths are grown depth-first from each crusher; a path terminates as
/// soon as it reaches any shovel, and is pruned if it would pass through
/// a crusher other than its origin or revisit a point. The recorded
/// direction of each road is the direction of traversal, so a route
/// describes the empty (outbound) trip.
pub(crate) fn routes_in_graph(graph: &RoadGraph) -> Vec<Route> {
    let mut routes = Vec::new();
    let mut seen = vec![false; graph.adjacency.len()];
    let mut roads = Vec::new();
    let mut directions = Vec::new();
    for crusher in 0..graph.num_crushers {
        dfs(
            graph,
            crusher,
            crusher,
            &mut seen,
            &mut roads,
            &mut directions,
            &mut routes,
        );
    }
    routes
}

fn dfs(
    graph: &RoadGraph,
    point: usize,
    origin: usize,
    seen: &mut Vec<bool>,
    roads: &mut Vec<usize>,
    directions: &mut Vec<usize>,
    routes: &mut Vec<Route>,
) {
    if point < graph.num_crushers {
        if point != origin {
            return;
        }
    } else if point < graph.num_crushers + graph.num_shovels {
        routes.push(Route {
            roads: roads.clone(),
            directions: directions.clone(),
            crusher: origin,
            shovel: point - graph.num_crushers,
        });
        return;
    }
    seen[point] = true;
    for &(next, road, dir) in &graph.adjacency[point] {
        if !seen[next] {
            roads.push(road);
            directions.push(dir);
            dfs(graph, next, origin, seen, roads, directions, routes);
            roads.pop();
            directions.pop();
        }
    }
    seen[point] = false;
}

/// Enumerates routes for an already-built adjacency description.
///
/// Public convenience wrapper used by the parser and by tests that build
/// graphs by hand.
pub fn enumerate_routes(
    num_crushers: usize,
    num_shovels: usize,
    num_nodes: usize,
    roads: &[((char, usize), (char, usize))],
) -> Vec<Route> {
    let mut graph = RoadGraph::new(num_crushers, num_shovels, num_nodes);
    for (i, &((k1, i1), (k2, i2))) in roads.iter().enumerate() {
        let a = point_of(k1, i1);
        let b = point_of(k2, i2);
        graph.add_road(i, a, b);
    }
    routes_in_graph(&graph)
}

fn point_of(kind: char, index: usize) -> GraphPoint {
    match kind {
        'c' => GraphPoint::Crusher(index),
        's' => GraphPoint::Shovel(index),
        'n' => GraphPoint::Node(index),
        other => panic!("unknown graph point kind: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_roads() {
        // c0 - s0, c0 - s1.
        let routes = enumerate_routes(1, 2, 0, &[(('c', 0), ('s', 0)), (('c', 0), ('s', 1))]);
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].roads, vec![0]);
        assert_eq!(routes[0].directions, vec![0]);
        assert_eq!(routes[0].shovel, 0);
        assert_eq!(routes[1].shovel, 1);
    }

    #[test]
    fn test_direction_recorded_per_traversal() {
        // Road declared s0 -> c0: traversing it from the crusher uses
        // direction 1.
        let routes = enumerate_routes(1, 1, 0, &[(('s', 0), ('c', 0))]);
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].directions, vec![1]);
    }

    #[test]
    fn test_path_through_node() {
        // c0 - n0 - s0 plus a direct c0 - s0 road: two routes.
        let routes = enumerate_routes(
            1,
            1,
            1,
            &[(('c', 0), ('n', 0)), (('n', 0), ('s', 0)), (('c', 0), ('s', 0))],
        );
        assert_eq!(routes.len(), 2);
        let lengths: Vec<usize> = routes.iter().map(Route::len).collect();
        assert!(lengths.contains(&1) && lengths.contains(&2));
    }

    #[test]
    fn test_paths_stop_at_first_shovel() {
        // c0 - s0 - s1: the path must not continue through s0 to s1.
        let routes = enumerate_routes(1, 2, 0, &[(('c', 0), ('s', 0)), (('s', 0), ('s', 1))]);
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].shovel, 0);
    }

    #[test]
    fn test_other_crushers_pruned() {
        // c0 - c1 - s0: no route from c0 may pass through c1, but c1
        // itself reaches s0.
        let routes = enumerate_routes(2, 1, 0, &[(('c', 0), ('c', 1)), (('c', 1), ('s', 0))]);
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].crusher, 1);
    }

    #[test]
    fn test_two_crushers_two_shovels() {
        // Diamond: c0-n0, c1-n0, n0-s0, n0-s1 => 4 routes.
        let routes = enumerate_routes(
            2,
            2,
            1,
            &[
                (('c', 0), ('n', 0)),
                (('c', 1), ('n', 0)),
                (('n', 0), ('s', 0)),
                (('n', 0), ('s', 1)),
            ],
        );
        assert_eq!(routes.len(), 4);
        for route in &routes {
            assert_eq!(route.len(), 2);
        }
    }
}
