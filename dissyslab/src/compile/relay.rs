//! Inserts broadcast and merge relays to restore one-to-one connections.
//!
//! Users may wire the same outport into several edges (fan-out) or aim
//! several edges at the same inport (fan-in). Channels are strictly
//! point-to-point, so before flattening the compiler rewrites every such
//! port to pass through a fresh relay block: a broadcast that copies one
//! input to N outputs, or a merge that forwards N inputs to one output in
//! arrival order. Insertions at different ports commute, so the rewrite is
//! order-independent.

use smallvec::smallvec;

use crate::block::{Block, Logic, PortList};
use crate::graph::{Child, Connection, Graph};

/// Rewrites `graph` (recursively) so that every port is the endpoint of
/// exactly one connection.
pub(crate) fn insert_relays<D>(graph: &mut Graph<D>) {
    for child in graph.children.iter_mut() {
        if let Child::Graph(nested) = child {
            insert_relays(nested);
        }
    }

    let mut counter = 0;
    insert_broadcasts(graph, &mut counter);
    insert_merges(graph, &mut counter);
}

/// The side of a connection an endpoint group is keyed on.
#[derive(Clone, Copy)]
enum Side {
    Sending,
    Receiving,
}

/// Endpoints referenced by more than one connection, in first-appearance
/// order so that synthetic names are deterministic.
fn shared_endpoints(connections: &[Connection], side: Side) -> Vec<((String, String), Vec<usize>)> {
    let mut groups: Vec<((String, String), Vec<usize>)> = Vec::new();
    for (index, connection) in connections.iter().enumerate() {
        let (block, port) = match side {
            Side::Sending => (&connection.from_block, &connection.from_port),
            Side::Receiving => (&connection.to_block, &connection.to_port),
        };
        match groups.iter_mut().find(|(key, _)| key.0 == *block && key.1 == *port) {
            Some((_, indices)) => indices.push(index),
            None => groups.push(((block.clone(), port.clone()), vec![index])),
        }
    }
    groups.retain(|(_, indices)| indices.len() > 1);
    groups
}

fn insert_broadcasts<D>(graph: &mut Graph<D>, counter: &mut usize) {
    for ((from_block, from_port), indices) in shared_endpoints(&graph.connections, Side::Sending) {
        let name = fresh_name(graph, "broadcast", counter);
        let outports: PortList = (0..indices.len()).map(|i| format!("out{i}")).collect();
        tracing::debug!(
            graph = %graph.name,
            relay = %name,
            endpoint = %format!("{from_block}.{from_port}"),
            fanout = indices.len(),
            "inserting broadcast"
        );
        for (slot, &index) in indices.iter().enumerate() {
            let connection = &mut graph.connections[index];
            connection.from_block = name.clone();
            connection.from_port = format!("out{slot}");
        }
        graph.connections.push(Connection::new(&from_block, &from_port, &name, "in"));
        graph.children.push(Child::Block(Block::relay(
            name,
            Logic::Broadcast,
            smallvec!["in".to_owned()],
            outports,
        )));
    }
}

fn insert_merges<D>(graph: &mut Graph<D>, counter: &mut usize) {
    for ((to_block, to_port), indices) in shared_endpoints(&graph.connections, Side::Receiving) {
        let name = fresh_name(graph, "merge", counter);
        let inports: PortList = (0..indices.len()).map(|i| format!("in{i}")).collect();
        tracing::debug!(
            graph = %graph.name,
            relay = %name,
            endpoint = %format!("{to_block}.{to_port}"),
            fanin = indices.len(),
            "inserting merge"
        );
        for (slot, &index) in indices.iter().enumerate() {
            let connection = &mut graph.connections[index];
            connection.to_block = name.clone();
            connection.to_port = format!("in{slot}");
        }
        graph.connections.push(Connection::new(&name, "out", &to_block, &to_port));
        graph.children.push(Child::Block(Block::relay(
            name,
            Logic::Merge,
            inports,
            smallvec!["out".to_owned()],
        )));
    }
}

/// A synthetic name not colliding with any existing child.
fn fresh_name<D>(graph: &Graph<D>, kind: &str, counter: &mut usize) -> String {
    loop {
        let name = format!("{kind}_{counter}");
        *counter += 1;
        if graph.child(&name).is_none() {
            return name;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Role;
    use crate::graph::EXTERNAL;

    fn fanout_graph() -> Graph<u32> {
        let mut graph = Graph::new("main");
        graph
            .add(Block::source("s", 0..3))
            .add(Block::sink("a", |_x| {}))
            .add(Block::sink("b", |_x| {}))
            .connect("s", "out", "a", "in")
            .connect("s", "out", "b", "in");
        graph
    }

    #[test]
    fn fanout_gets_a_broadcast() {
        let mut graph = fanout_graph();
        insert_relays(&mut graph);

        let relay = graph.child("broadcast_0").expect("relay inserted");
        assert_eq!(relay.inports().len(), 1);
        assert_eq!(relay.outports(), ["out0", "out1"]);
        if let Child::Block(block) = relay {
            assert_eq!(block.role(), Role::Broadcast);
        }

        // The source's outport now feeds the relay, which feeds both sinks.
        assert!(graph
            .connections()
            .contains(&Connection::new("s", "out", "broadcast_0", "in")));
        assert!(graph
            .connections()
            .contains(&Connection::new("broadcast_0", "out0", "a", "in")));
        assert!(graph
            .connections()
            .contains(&Connection::new("broadcast_0", "out1", "b", "in")));
    }

    #[test]
    fn fanin_gets_a_merge() {
        let mut graph = Graph::new("main");
        graph
            .add(Block::source("s1", 0..3))
            .add(Block::source("s2", 3..6))
            .add(Block::sink("c", |_x| {}))
            .connect("s1", "out", "c", "in")
            .connect("s2", "out", "c", "in");
        insert_relays(&mut graph);

        let relay = graph.child("merge_0").expect("relay inserted");
        assert_eq!(relay.inports(), ["in0", "in1"]);
        assert_eq!(relay.outports(), ["out"]);
        assert!(graph
            .connections()
            .contains(&Connection::new("merge_0", "out", "c", "in")));
    }

    #[test]
    fn rewritten_ports_are_endpoints_of_exactly_one_connection() {
        let mut graph = fanout_graph();
        graph
            .add(Block::sink("d", |_x| {}))
            .connect("s", "out", "d", "in");
        insert_relays(&mut graph);

        for child in graph.children() {
            for port in child.inports() {
                let uses = graph
                    .connections()
                    .iter()
                    .filter(|c| c.to_block == child.name() && c.to_port == *port)
                    .count();
                assert_eq!(uses, 1, "{}.{port}", child.name());
            }
            for port in child.outports() {
                let uses = graph
                    .connections()
                    .iter()
                    .filter(|c| c.from_block == child.name() && c.from_port == *port)
                    .count();
                assert_eq!(uses, 1, "{}.{port}", child.name());
            }
        }
    }

    #[test]
    fn external_endpoints_participate_in_insertion() {
        let mut graph: Graph<u32> = Graph::new("split");
        graph
            .add(Block::sink("a", |_x| {}))
            .add(Block::sink("b", |_x| {}))
            .connect(EXTERNAL, "in", "a", "in")
            .connect(EXTERNAL, "in", "b", "in")
            .expose_inport("in");
        insert_relays(&mut graph);

        assert!(graph
            .connections()
            .contains(&Connection::new(EXTERNAL, "in", "broadcast_0", "in")));
    }

    #[test]
    fn synthetic_names_avoid_user_names() {
        let mut graph = fanout_graph();
        graph
            .add(Block::sink("broadcast_0", |_x| {}))
            .connect("s", "out", "broadcast_0", "in");
        insert_relays(&mut graph);

        assert!(graph.child("broadcast_1").is_some());
    }
}
