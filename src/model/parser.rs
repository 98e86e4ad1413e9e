//! Input-file parser for both network formats.
//!
//! The format is line-oriented and rigid: any missing line, extra token,
//! non-numeric field or unknown tag is a hard failure naming the offending
//! line. The two formats are distinguished by the first line:
//!
//! ```text
//! T <num_trucks>                      simple network
//! T <num_trucks> <full_slowdown>      routed network
//! ```

use std::fmt::Write as _;
use std::path::Path;

use super::routes::{routes_in_graph, GraphPoint, RoadGraph};
use super::{MeanSd, Network, Road, RoadKind, SimpleNetwork, SimpleShovel};
use crate::error::HaulageError;

/// A parsed input file: one of the two supported network shapes.
#[derive(Debug, Clone)]
pub enum ParsedNetwork {
    /// Single-crusher network with one road per shovel.
    Simple(SimpleNetwork),
    /// Routed multi-crusher network.
    Routed(Network),
}

/// Reads and parses a network description file.
pub fn parse_file(path: &Path) -> Result<ParsedNetwork, HaulageError> {
    let text = std::fs::read_to_string(path)?;
    parse_str(&text)
}

/// Parses a network description from text.
pub fn parse_str(text: &str) -> Result<ParsedNetwork, HaulageError> {
    let mut lines = Lines::new(text);
    let first = lines.tokens()?;
    match first.as_slice() {
        [tag, trucks] if tag == "T" => {
            let num_trucks = lines.int(trucks)?;
            parse_simple(lines, num_trucks).map(ParsedNetwork::Simple)
        }
        [tag, trucks, slowdown] if tag == "T" => {
            let num_trucks = lines.int(trucks)?;
            let full_slowdown = lines.float(slowdown)?;
            parse_routed(lines, num_trucks, full_slowdown).map(ParsedNetwork::Routed)
        }
        _ => Err(lines.invalid("expected 'T <trucks>' or 'T <trucks> <slowdown>'")),
    }
}

fn parse_simple(mut lines: Lines<'_>, num_trucks: usize) -> Result<SimpleNetwork, HaulageError> {
    let crushers = lines.tagged_count("C")?;
    if crushers != 1 {
        return Err(lines.invalid("simple networks have exactly one crusher"));
    }
    let empty = lines.mean_sd()?;
    let num_shovels = lines.tagged_count("S")?;
    let mut shovels = Vec::with_capacity(num_shovels);
    for _ in 0..num_shovels {
        let tokens = lines.tokens()?;
        if tokens.len() != 4 {
            return Err(lines.invalid("expected '<travel_mean> <travel_sd> <fill_mean> <fill_sd>'"));
        }
        shovels.push(SimpleShovel {
            travel: MeanSd::new(lines.float(&tokens[0])?, lines.float(&tokens[1])?),
            fill: MeanSd::new(lines.float(&tokens[2])?, lines.float(&tokens[3])?),
        });
    }
    lines.expect_end()?;
    Ok(SimpleNetwork {
        num_trucks,
        empty,
        shovels,
    })
}

fn parse_routed(
    mut lines: Lines<'_>,
    num_trucks: usize,
    full_slowdown: f64,
) -> Result<Network, HaulageError> {
    let num_crushers = lines.tagged_count("C")?;
    let mut crushers = Vec::with_capacity(num_crushers);
    for _ in 0..num_crushers {
        crushers.push(lines.mean_sd()?);
    }
    let num_shovels = lines.tagged_count("S")?;
    let mut shovels = Vec::with_capacity(num_shovels);
    for _ in 0..num_shovels {
        shovels.push(lines.mean_sd()?);
    }
    let tokens = lines.tokens()?;
    let (num_roads, num_nodes) = match tokens.as_slice() {
        [r, roads, n, nodes] if r == "R" && n == "N" => (lines.int(roads)?, lines.int(nodes)?),
        _ => return Err(lines.invalid("expected 'R <roads> N <nodes>'")),
    };
    let mut roads = Vec::with_capacity(num_roads);
    let mut graph = RoadGraph::new(num_crushers, num_shovels, num_nodes);
    for road in 0..num_roads {
        let tokens = lines.tokens()?;
        if tokens.len() != 7 {
            return Err(lines.invalid("expected '<n1> <i1> <n2> <i2> <mean> <sd> <kind>'"));
        }
        let a = lines.graph_point(&tokens[0], &tokens[1], num_crushers, num_shovels, num_nodes)?;
        let b = lines.graph_point(&tokens[2], &tokens[3], num_crushers, num_shovels, num_nodes)?;
        let travel = MeanSd::new(lines.float(&tokens[4])?, lines.float(&tokens[5])?);
        let kind = match tokens[6].as_str() {
            "t" => RoadKind::TwoLane,
            "o" => RoadKind::OneLane,
            other => return Err(lines.invalid(format!("unknown road kind '{other}'"))),
        };
        roads.push(Road { travel, kind });
        graph.add_road(road, a, b);
    }
    lines.expect_end()?;
    let routes = routes_in_graph(&graph);
    Network::new(num_trucks, full_slowdown, crushers, shovels, roads, routes)
}

/// Line cursor carrying position information for error messages.
struct Lines<'a> {
    iter: std::str::Lines<'a>,
    line: usize,
}

impl<'a> Lines<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            iter: text.lines(),
            line: 0,
        }
    }

    fn tokens(&mut self) -> Result<Vec<String>, HaulageError> {
        self.line += 1;
        match self.iter.next() {
            Some(line) => Ok(line.split(' ').map(str::to_owned).collect()),
            None => Err(self.invalid("unexpected end of file")),
        }
    }

    fn expect_end(&mut self) -> Result<(), HaulageError> {
        self.line += 1;
        match self.iter.next() {
            Some(line) if line.trim().is_empty() => self.expect_end(),
            Some(_) => Err(self.invalid("trailing content after network description")),
            None => Ok(()),
        }
    }

    fn tagged_count(&mut self, tag: &str) -> Result<usize, HaulageError> {
        let tokens = self.tokens()?;
        match tokens.as_slice() {
            [t, count] if t == tag => self.int(count),
            _ => Err(self.invalid(format!("expected '{tag} <count>'"))),
        }
    }

    fn mean_sd(&mut self) -> Result<MeanSd, HaulageError> {
        let tokens = self.tokens()?;
        if tokens.len() != 2 {
            return Err(self.invalid("expected '<mean> <sd>'"));
        }
        Ok(MeanSd::new(self.float(&tokens[0])?, self.float(&tokens[1])?))
    }

    fn graph_point(
        &self,
        kind: &str,
        index: &str,
        num_crushers: usize,
        num_shovels: usize,
        num_nodes: usize,
    ) -> Result<GraphPoint, HaulageError> {
        let index = self.int(index)?;
        let (point, bound) = match kind {
            "c" => (GraphPoint::Crusher(index), num_crushers),
            "s" => (GraphPoint::Shovel(index), num_shovels),
            "n" => (GraphPoint::Node(index), num_nodes),
            other => return Err(self.invalid(format!("unknown point kind '{other}'"))),
        };
        if index >= bound {
            return Err(self.invalid(format!("point index {index} out of range")));
        }
        Ok(point)
    }

    fn int(&self, token: &str) -> Result<usize, HaulageError> {
        token
            .parse()
            .map_err(|_| self.invalid(format!("expected an integer, found '{token}'")))
    }

    fn float(&self, token: &str) -> Result<f64, HaulageError> {
        token
            .parse()
            .map_err(|_| self.invalid(format!("expected a number, found '{token}'")))
    }

    fn invalid(&self, message: impl Into<String>) -> HaulageError {
        HaulageError::parse(self.line, message.into())
    }
}

/// Writes a simple network in the input-file format.
pub fn write_simple(net: &SimpleNetwork) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "T {}", net.num_trucks);
    let _ = writeln!(out, "C 1");
    let _ = writeln!(out, "{} {}", net.empty.mean, net.empty.sd);
    let _ = writeln!(out, "S {}", net.shovels.len());
    for s in &net.shovels {
        let _ = writeln!(
            out,
            "{} {} {} {}",
            s.travel.mean, s.travel.sd, s.fill.mean, s.fill.sd
        );
    }
    out
}

/// Writes a routed network in the input-file format.
///
/// The road endpoint list is not stored on [`Network`], so it is supplied
/// by the caller in the same `(kind, index)` form the parser reads.
pub fn write_network(net: &Network, endpoints: &[((char, usize), (char, usize))]) -> String {
    let num_nodes = endpoints
        .iter()
        .flat_map(|(a, b)| [a, b])
        .filter(|(kind, _)| *kind == 'n')
        .map(|(_, index)| index + 1)
        .max()
        .unwrap_or(0);
    let mut out = String::new();
    let _ = writeln!(out, "T {} {}", net.num_trucks, net.full_slowdown);
    let _ = writeln!(out, "C {}", net.num_crushers());
    for c in &net.crushers {
        let _ = writeln!(out, "{} {}", c.mean, c.sd);
    }
    let _ = writeln!(out, "S {}", net.num_shovels());
    for s in &net.shovels {
        let _ = writeln!(out, "{} {}", s.mean, s.sd);
    }
    let _ = writeln!(out, "R {} N {}", net.num_roads(), num_nodes);
    for (road, ((k1, i1), (k2, i2))) in net.roads.iter().zip(endpoints) {
        let kind = match road.kind {
            RoadKind::TwoLane => 't',
            RoadKind::OneLane => 'o',
        };
        let _ = writeln!(
            out,
            "{k1} {i1} {k2} {i2} {} {} {kind}",
            road.travel.mean, road.travel.sd
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &str = "T 3\nC 1\n1.5 0.2\nS 2\n5 0.5 2 0.3\n7 0.6 2.5 0.4\n";

    const ROUTED: &str = "T 6 1.2\nC 2\n1 0.1\n1.2 0.1\nS 2\n2 0.2\n3 0.3\n\
R 4 N 1\nc 0 n 0 5 0.5 t\nc 1 n 0 6 0.5 t\nn 0 s 0 4 0.4 o\nn 0 s 1 3 0.3 t\n";

    #[test]
    fn test_parse_simple() {
        let ParsedNetwork::Simple(net) = parse_str(SIMPLE).unwrap() else {
            panic!("expected a simple network");
        };
        assert_eq!(net.num_trucks, 3);
        assert_eq!(net.empty, MeanSd::new(1.5, 0.2));
        assert_eq!(net.shovels.len(), 2);
        assert_eq!(net.shovels[1].travel, MeanSd::new(7.0, 0.6));
    }

    #[test]
    fn test_parse_routed() {
        let ParsedNetwork::Routed(net) = parse_str(ROUTED).unwrap() else {
            panic!("expected a routed network");
        };
        assert_eq!(net.num_trucks, 6);
        assert_eq!(net.full_slowdown, 1.2);
        assert_eq!(net.num_crushers(), 2);
        assert_eq!(net.num_roads(), 4);
        // Each crusher reaches each shovel through the node.
        assert_eq!(net.num_routes(), 4);
        assert_eq!(net.roads[2].kind, RoadKind::OneLane);
    }

    #[test]
    fn test_simple_round_trip() {
        let ParsedNetwork::Simple(net) = parse_str(SIMPLE).unwrap() else {
            panic!();
        };
        let ParsedNetwork::Simple(again) = parse_str(&write_simple(&net)).unwrap() else {
            panic!();
        };
        assert_eq!(net, again);
    }

    #[test]
    fn test_routed_round_trip() {
        let ParsedNetwork::Routed(net) = parse_str(ROUTED).unwrap() else {
            panic!();
        };
        let endpoints = [
            (('c', 0), ('n', 0)),
            (('c', 1), ('n', 0)),
            (('n', 0), ('s', 0)),
            (('n', 0), ('s', 1)),
        ];
        let text = write_network(&net, &endpoints);
        let ParsedNetwork::Routed(again) = parse_str(&text).unwrap() else {
            panic!();
        };
        assert_eq!(net, again);
    }

    #[test]
    fn test_rejects_missing_token() {
        assert!(parse_str("T\n").is_err());
    }

    #[test]
    fn test_rejects_extra_token() {
        let bad = SIMPLE.replace("1.5 0.2", "1.5 0.2 9");
        assert!(parse_str(&bad).is_err());
    }

    #[test]
    fn test_rejects_non_numeric() {
        let bad = SIMPLE.replace("1.5", "abc");
        assert!(parse_str(&bad).is_err());
    }

    #[test]
    fn test_rejects_unknown_tag() {
        let bad = ROUTED.replace("n 0 s 1 3 0.3 t", "x 0 s 1 3 0.3 t");
        assert!(parse_str(&bad).is_err());
    }

    #[test]
    fn test_rejects_out_of_range_index() {
        let bad = ROUTED.replace("c 1 n 0", "c 9 n 0");
        assert!(parse_str(&bad).is_err());
    }

    #[test]
    fn test_rejects_truncated_file() {
        let truncated: String = SIMPLE.lines().take(4).collect::<Vec<_>>().join("\n");
        assert!(parse_str(&truncated).is_err());
    }

    #[test]
    fn test_error_names_line() {
        let bad = SIMPLE.replace("5 0.5 2 0.3", "5 0.5 2");
        match parse_str(&bad) {
            Err(crate::error::HaulageError::Parse { line, .. }) => assert_eq!(line, 5),
            other => panic!("expected parse error, got {other:?}"),
        }
    }
}
