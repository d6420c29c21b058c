//! Flattens nested graphs to leaf paths and collapses boundary edges.
//!
//! Flattening lifts every leaf block to the top level under a qualified
//! name: the names of the graphs on the way down from the root, joined with
//! `.`. Connections touching the reserved `external` name are rewritten to
//! reference the enclosing composite itself, leaving pass-through boundary
//! edges such as `s -> G.in` and `G.in -> G.t`. A fixpoint loop then splices
//! each such pair into a direct edge, so that the final edge list connects
//! leaf blocks only.

use std::collections::HashSet;

use crate::block::Block;
use crate::graph::validate::{ValidateError, Violation};
use crate::graph::{Child, Connection, Graph, EXTERNAL};

/// The flat form of a specification, before channel allocation.
pub(crate) struct FlatGraph<D> {
    /// Leaf blocks under their qualified paths, in discovery order.
    pub(crate) leaves: Vec<(String, Block<D>)>,
    /// Connections with qualified endpoint paths.
    pub(crate) edges: Vec<Connection>,
    /// Qualified paths of composites, kept to recognize boundary edges.
    pub(crate) composites: HashSet<String>,
}

/// Expands `graph` recursively into a [`FlatGraph`].
pub(crate) fn flatten<D>(graph: Graph<D>) -> FlatGraph<D> {
    let mut flat = FlatGraph {
        leaves: Vec::new(),
        edges: Vec::new(),
        composites: HashSet::new(),
    };
    absorb(graph, "", &mut flat);
    flat
}

/// Moves the contents of `graph` into `flat`. `prefix` is the qualified path
/// of `graph` itself; the root has the empty prefix and its children keep
/// their bare names.
fn absorb<D>(graph: Graph<D>, prefix: &str, flat: &mut FlatGraph<D>) {
    let qualify = |name: &str| -> String {
        if name == EXTERNAL {
            prefix.to_owned()
        } else if prefix.is_empty() {
            name.to_owned()
        } else {
            format!("{prefix}.{name}")
        }
    };

    for connection in &graph.connections {
        flat.edges.push(Connection::new(
            &qualify(&connection.from_block),
            &connection.from_port,
            &qualify(&connection.to_block),
            &connection.to_port,
        ));
    }

    for child in graph.children {
        match child {
            Child::Block(block) => {
                let path = qualify(&block.name);
                flat.leaves.push((path, block));
            }
            Child::Graph(nested) => {
                let path = qualify(&nested.name);
                flat.composites.insert(path.clone());
                absorb(nested, &path, flat);
            }
        }
    }
}

/// Collapses pass-through boundary edges until only leaf-to-leaf edges
/// remain. Each iteration removes one edge, so the loop terminates.
pub(crate) fn resolve_boundaries<D>(flat: &mut FlatGraph<D>) -> Result<(), ValidateError> {
    loop {
        let Some(outer) = flat
            .edges
            .iter()
            .position(|edge| flat.composites.contains(&edge.to_block))
        else {
            break;
        };
        let target = (flat.edges[outer].to_block.clone(), flat.edges[outer].to_port.clone());
        let inner = flat
            .edges
            .iter()
            .position(|edge| edge.from_block == target.0 && edge.from_port == target.1);
        // A continuation must exist and must not be the boundary edge
        // itself (a composite port wired straight back to itself).
        let inner = match inner {
            Some(inner) if inner != outer => inner,
            _ => {
                return Err(ValidateError {
                    violations: vec![Violation::Boundary {
                        path: target.0,
                        port: target.1,
                    }],
                });
            }
        };
        let continuation = flat.edges.swap_remove(inner);
        // `outer` may have been the swapped-in element; relocate it by value.
        let position = flat
            .edges
            .iter()
            .position(|edge| edge.to_block == target.0 && edge.to_port == target.1)
            .expect("boundary edge still present after removing its continuation");
        flat.edges[position].to_block = continuation.to_block;
        flat.edges[position].to_port = continuation.to_port;
    }

    let mut violations = Vec::new();
    for edge in &flat.edges {
        if flat.composites.contains(&edge.from_block) {
            violations.push(Violation::Boundary {
                path: edge.from_block.clone(),
                port: edge.from_port.clone(),
            });
        }
        if flat.composites.contains(&edge.to_block) {
            violations.push(Violation::Boundary {
                path: edge.to_block.clone(),
                port: edge.to_port.clone(),
            });
        }
    }
    ValidateError::check(violations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Block;

    fn wrapped_transform() -> Graph<u32> {
        let mut inner = Graph::new("g");
        inner
            .add(Block::transform("t", |x| Some(x + 1)))
            .connect(EXTERNAL, "in", "t", "in")
            .connect("t", "out", EXTERNAL, "out")
            .expose_inport("in")
            .expose_outport("out");

        let mut root = Graph::new("main");
        root.add(Block::source("s", 0..3))
            .add(inner)
            .add(Block::sink("c", |_x| {}))
            .connect("s", "out", "g", "in")
            .connect("g", "out", "c", "in");
        root
    }

    #[test]
    fn leaves_acquire_qualified_paths() {
        let flat = flatten(wrapped_transform());
        let paths: Vec<&str> = flat.leaves.iter().map(|(path, _)| path.as_str()).collect();
        assert_eq!(paths, ["s", "g.t", "c"]);
        assert!(flat.composites.contains("g"));
    }

    #[test]
    fn boundary_edges_collapse_to_direct_edges() {
        let mut flat = flatten(wrapped_transform());
        resolve_boundaries(&mut flat).unwrap();

        assert_eq!(flat.edges.len(), 2);
        assert!(flat.edges.contains(&Connection::new("s", "out", "g.t", "in")));
        assert!(flat.edges.contains(&Connection::new("g.t", "out", "c", "in")));
    }

    #[test]
    fn doubly_nested_composites_collapse() {
        let mut innermost = Graph::new("h");
        innermost
            .add(Block::transform("t", |x: u32| Some(x)))
            .connect(EXTERNAL, "in", "t", "in")
            .connect("t", "out", EXTERNAL, "out")
            .expose_inport("in")
            .expose_outport("out");

        let mut middle = Graph::new("g");
        middle
            .add(innermost)
            .connect(EXTERNAL, "in", "h", "in")
            .connect("h", "out", EXTERNAL, "out")
            .expose_inport("in")
            .expose_outport("out");

        let mut root = Graph::new("main");
        root.add(Block::source("s", 0..3))
            .add(middle)
            .add(Block::sink("c", |_x| {}))
            .connect("s", "out", "g", "in")
            .connect("g", "out", "c", "in");

        let mut flat = flatten(root);
        resolve_boundaries(&mut flat).unwrap();

        assert_eq!(flat.edges.len(), 2);
        assert!(flat.edges.contains(&Connection::new("s", "out", "g.h.t", "in")));
        assert!(flat.edges.contains(&Connection::new("g.h.t", "out", "c", "in")));
    }

    #[test]
    fn a_pure_pass_through_composite_disappears() {
        let mut wire: Graph<u32> = Graph::new("wire");
        wire.connect(EXTERNAL, "in", EXTERNAL, "out")
            .expose_inport("in")
            .expose_outport("out");

        let mut root = Graph::new("main");
        root.add(Block::source("s", 0..3))
            .add(wire)
            .add(Block::sink("c", |_x| {}))
            .connect("s", "out", "wire", "in")
            .connect("wire", "out", "c", "in");

        let mut flat = flatten(root);
        resolve_boundaries(&mut flat).unwrap();

        assert_eq!(flat.edges, [Connection::new("s", "out", "c", "in")]);
    }
}
