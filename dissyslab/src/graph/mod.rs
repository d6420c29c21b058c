//! Graph specifications: named children wired by point-to-point connections.
//!
//! A [`Graph`] is the declarative half of the framework. It names a set of
//! children (leaf [`Block`]s or nested graphs), lists the connections
//! between their ports, and optionally declares external ports through which
//! an enclosing graph can reach inside. Specifications are plain data: they
//! are assembled, validated, and then handed to the compiler, which derives
//! a fresh executable plan without mutating them.

pub mod builder;
pub mod validate;

use std::fmt;

use crate::block::Block;

pub use builder::{BuildError, GraphBuilder, NodeHandle, NodeRef};

/// The reserved child name referring to a graph's own boundary.
///
/// A connection whose endpoint names `external` attaches to one of the
/// graph's declared external ports rather than to a child.
pub const EXTERNAL: &str = "external";

/// A connection from one child's outport to another child's inport.
///
/// Either end may name [`EXTERNAL`] to refer to the enclosing graph's own
/// boundary ports.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Connection {
    /// The sending child, or [`EXTERNAL`].
    pub from_block: String,
    /// The port on the sending child.
    pub from_port: String,
    /// The receiving child, or [`EXTERNAL`].
    pub to_block: String,
    /// The port on the receiving child.
    pub to_port: String,
}

impl Connection {
    /// Creates a connection between two named ports.
    pub fn new(from_block: &str, from_port: &str, to_block: &str, to_port: &str) -> Self {
        Connection {
            from_block: from_block.to_owned(),
            from_port: from_port.to_owned(),
            to_block: to_block.to_owned(),
            to_port: to_port.to_owned(),
        }
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} -> {}.{}",
            self.from_block, self.from_port, self.to_block, self.to_port
        )
    }
}

/// A child of a graph: a leaf block or a nested graph.
pub enum Child<D> {
    /// A leaf block hosting user logic.
    Block(Block<D>),
    /// A nested graph, reached through its external ports.
    Graph(Graph<D>),
}

impl<D> Child<D> {
    /// The child's name, unique within its parent.
    pub fn name(&self) -> &str {
        match self {
            Child::Block(block) => block.name(),
            Child::Graph(graph) => graph.name(),
        }
    }

    /// The ports on which this child receives values. For a nested graph
    /// these are its external inports.
    pub fn inports(&self) -> &[String] {
        match self {
            Child::Block(block) => block.inports(),
            Child::Graph(graph) => graph.external_inports(),
        }
    }

    /// The ports on which this child emits values. For a nested graph these
    /// are its external outports.
    pub fn outports(&self) -> &[String] {
        match self {
            Child::Block(block) => block.outports(),
            Child::Graph(graph) => graph.external_outports(),
        }
    }

    pub(crate) fn default_inport(&self) -> Option<&str> {
        match self {
            Child::Block(block) => block.default_inport(),
            Child::Graph(_) => None,
        }
    }

    pub(crate) fn default_outport(&self) -> Option<&str> {
        match self {
            Child::Block(block) => block.default_outport(),
            Child::Graph(_) => None,
        }
    }
}

impl<D> From<Block<D>> for Child<D> {
    fn from(block: Block<D>) -> Self {
        Child::Block(block)
    }
}

impl<D> From<Graph<D>> for Child<D> {
    fn from(graph: Graph<D>) -> Self {
        Child::Graph(graph)
    }
}

impl<D> fmt::Debug for Child<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Child::Block(block) => block.fmt(f),
            Child::Graph(graph) => graph.fmt(f),
        }
    }
}

/// A graph specification: named children and the connections among them.
///
/// Graphs nest: a graph added as a child of another is reached through the
/// external ports it declares with [`Graph::expose_inport`] and
/// [`Graph::expose_outport`]. Inside the graph those ports are addressed
/// with the reserved name [`EXTERNAL`].
///
/// # Examples
///
/// A pass-through composite wrapping one transformer:
///
/// ```
/// use dissyslab::{Block, Graph, EXTERNAL};
///
/// let mut inner = Graph::new("shout");
/// inner
///     .add(Block::transform("upper", |x: String| Some(x.to_uppercase())))
///     .connect(EXTERNAL, "in", "upper", "in")
///     .connect("upper", "out", EXTERNAL, "out")
///     .expose_inport("in")
///     .expose_outport("out");
/// ```
pub struct Graph<D> {
    pub(crate) name: String,
    pub(crate) children: Vec<Child<D>>,
    pub(crate) connections: Vec<Connection>,
    pub(crate) external_inports: Vec<String>,
    pub(crate) external_outports: Vec<String>,
}

impl<D> Graph<D> {
    /// Creates an empty graph.
    pub fn new(name: &str) -> Self {
        Graph {
            name: name.to_owned(),
            children: Vec::new(),
            connections: Vec::new(),
            external_inports: Vec::new(),
            external_outports: Vec::new(),
        }
    }

    /// Adds a child block or nested graph.
    ///
    /// Name uniqueness is checked by the validator rather than here, so that
    /// all structural problems are reported together.
    pub fn add(&mut self, child: impl Into<Child<D>>) -> &mut Self {
        self.children.push(child.into());
        self
    }

    /// Records a connection from `(from_block, from_port)` to
    /// `(to_block, to_port)`. Either block name may be [`EXTERNAL`].
    pub fn connect(&mut self, from_block: &str, from_port: &str, to_block: &str, to_port: &str) -> &mut Self {
        self.connections.push(Connection::new(from_block, from_port, to_block, to_port));
        self
    }

    /// Declares an external input port, fed by the enclosing graph and
    /// consumed inside this graph via `(EXTERNAL, port)` as a sender.
    pub fn expose_inport(&mut self, port: &str) -> &mut Self {
        self.external_inports.push(port.to_owned());
        self
    }

    /// Declares an external output port, fed inside this graph via
    /// `(EXTERNAL, port)` as a receiver and consumed by the enclosing graph.
    pub fn expose_outport(&mut self, port: &str) -> &mut Self {
        self.external_outports.push(port.to_owned());
        self
    }

    /// The graph's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The children, in insertion order.
    pub fn children(&self) -> &[Child<D>] {
        &self.children
    }

    /// The recorded connections, in insertion order.
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// The declared external input ports.
    pub fn external_inports(&self) -> &[String] {
        &self.external_inports
    }

    /// The declared external output ports.
    pub fn external_outports(&self) -> &[String] {
        &self.external_outports
    }

    /// Looks up a child by name.
    pub fn child(&self, name: &str) -> Option<&Child<D>> {
        self.children.iter().find(|child| child.name() == name)
    }
}

impl<D> fmt::Debug for Graph<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("name", &self.name)
            .field("children", &self.children)
            .field("connections", &self.connections)
            .field("external_inports", &self.external_inports)
            .field("external_outports", &self.external_outports)
            .finish()
    }
}
