//! Assembles a root graph from a list of edges between node references.
//!
//! The builder is the lightest way to describe a dataflow: add children,
//! then connect them pairwise. Each side of an edge is either a bare
//! [`NodeHandle`] (resolved through the child's default or sole port) or an
//! explicit [`NodeHandle::port`] reference. Resolution errors surface at the
//! `add_edge` call that introduced them, with the available ports listed.

use std::fmt;

use itertools::Itertools;
use thiserror::Error;

use crate::block::PortDirection;
use crate::graph::{Child, Connection, Graph};

/// An error raised at a builder call site.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    /// An explicit port reference named a port absent from the schema.
    #[error("no {direction} port `{port}` on `{block}`; available: [{available}]")]
    UnknownPort {
        /// The referenced child.
        block: String,
        /// The port that does not exist.
        port: String,
        /// Which side of the edge was being resolved.
        direction: PortDirection,
        /// The ports the child does declare.
        available: String,
    },
    /// A bare reference needed a default port the child does not declare.
    #[error("cannot choose an {direction} port for bare reference to `{block}`; declare a default or name one of [{available}]")]
    AmbiguousPort {
        /// The referenced child.
        block: String,
        /// Which side of the edge was being resolved.
        direction: PortDirection,
        /// The ports to choose from.
        available: String,
    },
    /// A distinct child with the same name was already added.
    ///
    /// Re-using the handle returned by the first `add` is the way to refer
    /// to the same child from several edges.
    #[error("a child named `{name}` was already added; re-use its handle instead")]
    DuplicateName {
        /// The colliding name.
        name: String,
    },
}

/// A handle to a child added to a [`GraphBuilder`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeHandle(pub(crate) usize);

impl NodeHandle {
    /// An explicit reference to a named port of this node.
    pub fn port(self, name: &str) -> NodeRef {
        NodeRef::Port(self, name.to_owned())
    }
}

/// One side of a builder edge: a bare node or an explicit port reference.
#[derive(Clone, Debug)]
pub enum NodeRef {
    /// A bare node; the edge resolves through its default or sole port.
    Node(NodeHandle),
    /// An explicit `(node, port)` reference.
    Port(NodeHandle, String),
}

impl From<NodeHandle> for NodeRef {
    fn from(handle: NodeHandle) -> Self {
        NodeRef::Node(handle)
    }
}

impl From<(NodeHandle, &str)> for NodeRef {
    fn from((handle, port): (NodeHandle, &str)) -> Self {
        NodeRef::Port(handle, port.to_owned())
    }
}

/// Builds a root-level [`Graph`] from pairwise edges.
///
/// # Examples
///
/// ```
/// use dissyslab::{Block, GraphBuilder};
///
/// let mut builder = GraphBuilder::new();
/// let numbers = builder.add(Block::source("numbers", 0..5)).unwrap();
/// let doubler = builder.add(Block::transform("doubler", |x: i32| Some(2 * x))).unwrap();
/// let printer = builder.add(Block::sink("printer", |x| println!("{x}"))).unwrap();
///
/// builder.add_edge(numbers, doubler).unwrap();
/// builder.add_edge(doubler.port("out"), printer).unwrap();
///
/// let graph = builder.build();
/// assert_eq!(graph.connections().len(), 2);
/// ```
pub struct GraphBuilder<D> {
    name: String,
    children: Vec<Child<D>>,
    edges: Vec<((usize, String), (usize, String))>,
}

impl<D> GraphBuilder<D> {
    /// Creates a builder for a root graph named `main`.
    pub fn new() -> Self {
        Self::named("main")
    }

    /// Creates a builder for a root graph with the given name.
    pub fn named(name: &str) -> Self {
        GraphBuilder {
            name: name.to_owned(),
            children: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Adds a child block or subgraph, returning a handle for use in edges.
    ///
    /// Adding two distinct children with the same name is rejected here, at
    /// the call site; referring to one child from several edges is done by
    /// re-using its handle.
    pub fn add(&mut self, child: impl Into<Child<D>>) -> Result<NodeHandle, BuildError> {
        let child = child.into();
        if self.children.iter().any(|existing| existing.name() == child.name()) {
            return Err(BuildError::DuplicateName {
                name: child.name().to_owned(),
            });
        }
        self.children.push(child);
        Ok(NodeHandle(self.children.len() - 1))
    }

    /// Records an edge from `from` to `to`, resolving bare references
    /// through default or sole ports.
    pub fn add_edge(&mut self, from: impl Into<NodeRef>, to: impl Into<NodeRef>) -> Result<(), BuildError> {
        let from = self.resolve(from.into(), PortDirection::Output)?;
        let to = self.resolve(to.into(), PortDirection::Input)?;
        self.edges.push((from, to));
        Ok(())
    }

    fn resolve(&self, node: NodeRef, direction: PortDirection) -> Result<(usize, String), BuildError> {
        let (handle, explicit) = match node {
            NodeRef::Node(handle) => (handle, None),
            NodeRef::Port(handle, port) => (handle, Some(port)),
        };
        let child = self
            .children
            .get(handle.0)
            .expect("node handle does not belong to this builder");
        let ports = match direction {
            PortDirection::Input => child.inports(),
            PortDirection::Output => child.outports(),
        };
        match explicit {
            Some(port) => {
                if ports.iter().any(|p| *p == port) {
                    Ok((handle.0, port))
                } else {
                    Err(BuildError::UnknownPort {
                        block: child.name().to_owned(),
                        port,
                        direction,
                        available: ports.iter().join(", "),
                    })
                }
            }
            None => {
                let default = match direction {
                    PortDirection::Input => child.default_inport(),
                    PortDirection::Output => child.default_outport(),
                };
                if let Some(port) = default {
                    Ok((handle.0, port.to_owned()))
                } else if ports.len() == 1 {
                    Ok((handle.0, ports[0].clone()))
                } else {
                    Err(BuildError::AmbiguousPort {
                        block: child.name().to_owned(),
                        direction,
                        available: ports.iter().join(", "),
                    })
                }
            }
        }
    }

    /// Finishes the graph: children become the graph's children, resolved
    /// edges become 4-tuple connections, and external ports stay empty (the
    /// builder describes a root-level graph).
    pub fn build(self) -> Graph<D> {
        let mut graph = Graph::new(&self.name);
        graph.connections = self
            .edges
            .iter()
            .map(|((from, from_port), (to, to_port))| {
                Connection::new(
                    self.children[*from].name(),
                    from_port,
                    self.children[*to].name(),
                    to_port,
                )
            })
            .collect();
        graph.children = self.children;
        graph
    }
}

impl<D> Default for GraphBuilder<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> fmt::Debug for GraphBuilder<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphBuilder")
            .field("name", &self.name)
            .field("children", &self.children)
            .field("edges", &self.edges)
            .finish()
    }
}
