//! Leaf blocks: port schemas, roles, and the user logic they host.
//!
//! A [`Block`] wraps an ordinary function together with the names of the
//! ports on which it exchanges values. The three user-facing roles differ
//! only in the arity of their ports and the shape of their callable, so they
//! are represented as tagged variants rather than a type hierarchy: a
//! source produces values until it signals end-of-stream, a transformer maps
//! each input to at most one output, and a sink consumes values for their
//! side effects. The compiler synthesizes two further roles, broadcast and
//! merge, which users never construct directly.

use std::fmt;

use serde::Serialize;
use smallvec::{smallvec, SmallVec};

/// A marker trait for types that may flow along channels.
///
/// Values are cloned when a broadcast copies them to several downstream
/// blocks, and move between worker threads, hence the bounds.
pub trait Data: Clone + Send + 'static {}
impl<T: Clone + Send + 'static> Data for T {}

/// Port-name lists; blocks rarely declare more than two ports per direction.
pub(crate) type PortList = SmallVec<[String; 2]>;

/// Distinguishes the two port directions in diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortDirection {
    /// A port on which a block receives values.
    Input,
    /// A port on which a block emits values.
    Output,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortDirection::Input => write!(f, "input"),
            PortDirection::Output => write!(f, "output"),
        }
    }
}

/// The role a leaf block plays at execution time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Produces a sequence of values and an end-of-stream signal.
    Source,
    /// Maps each input to one output, or drops it.
    Transform,
    /// Consumes values for their side effects.
    Sink,
    /// Copies each input to every outport; inserted by the compiler.
    Broadcast,
    /// Forwards inputs to one outport in arrival order; inserted by the compiler.
    Merge,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Source => write!(f, "source"),
            Role::Transform => write!(f, "transformer"),
            Role::Sink => write!(f, "sink"),
            Role::Broadcast => write!(f, "broadcast"),
            Role::Merge => write!(f, "merge"),
        }
    }
}

/// The callable hosted by a leaf block, tagged by role.
pub(crate) enum Logic<D> {
    /// Produces the next value, or `None` at end-of-stream.
    Source(Box<dyn FnMut() -> Option<D> + Send>),
    /// Maps an input to an output, or to `None` to drop it.
    Transform(Box<dyn FnMut(D) -> Option<D> + Send>),
    /// Consumes an input for its side effects.
    Sink(Box<dyn FnMut(D) + Send>),
    /// Copies each input to every outport.
    Broadcast,
    /// Forwards inputs to the sole outport in arrival order.
    Merge,
}

impl<D> Logic<D> {
    pub(crate) fn role(&self) -> Role {
        match self {
            Logic::Source(_) => Role::Source,
            Logic::Transform(_) => Role::Transform,
            Logic::Sink(_) => Role::Sink,
            Logic::Broadcast => Role::Broadcast,
            Logic::Merge => Role::Merge,
        }
    }
}

/// A one-shot lifecycle hook, run outside the worker's channel loop.
pub type Hook = Box<dyn FnMut() -> Result<(), String> + Send>;

/// A leaf block: a named unit of computation with input and output ports.
///
/// Blocks are built with the role constructors [`Block::source`],
/// [`Block::source_fn`], [`Block::transform`] and [`Block::sink`], which
/// install a conventional port schema (`"in"` and `"out"`), and refined with
/// the `with_*` methods when a different schema is wanted.
///
/// # Examples
///
/// ```
/// use dissyslab::Block;
///
/// let source = Block::source("numbers", 0..10);
/// assert_eq!(source.outports(), ["out"]);
///
/// let double = Block::transform("double", |x: i32| Some(2 * x));
/// assert_eq!(double.inports(), ["in"]);
/// ```
pub struct Block<D> {
    pub(crate) name: String,
    pub(crate) inports: PortList,
    pub(crate) outports: PortList,
    pub(crate) default_inport: Option<String>,
    pub(crate) default_outport: Option<String>,
    pub(crate) logic: Logic<D>,
    pub(crate) startup: Option<Hook>,
    pub(crate) shutdown: Option<Hook>,
    pub(crate) synthetic: bool,
}

impl<D> Block<D> {
    fn with_logic(name: &str, logic: Logic<D>) -> Self {
        let (inports, default_inport): (PortList, _) = match logic.role() {
            Role::Source => (smallvec![], None),
            _ => (smallvec!["in".to_owned()], Some("in".to_owned())),
        };
        let (outports, default_outport): (PortList, _) = match logic.role() {
            Role::Sink => (smallvec![], None),
            _ => (smallvec!["out".to_owned()], Some("out".to_owned())),
        };
        Block {
            name: name.to_owned(),
            inports,
            outports,
            default_inport,
            default_outport,
            logic,
            startup: None,
            shutdown: None,
            synthetic: false,
        }
    }

    /// Creates a source block that drains an iterator.
    ///
    /// The iterator's exhaustion is the block's end-of-stream signal.
    pub fn source<I>(name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = D>,
        I::IntoIter: Send + 'static,
    {
        let mut iter = values.into_iter();
        Self::source_fn(name, move || iter.next())
    }

    /// Creates a source block from a pull function.
    ///
    /// The function is invoked repeatedly; returning `None` signals
    /// end-of-stream and ends the block's run.
    pub fn source_fn<F>(name: &str, logic: F) -> Self
    where
        F: FnMut() -> Option<D> + Send + 'static,
    {
        Self::with_logic(name, Logic::Source(Box::new(logic)))
    }

    /// Creates a transformer block.
    ///
    /// The function receives each input value and returns either the value
    /// to forward or `None`, the drop signal, to emit nothing for this
    /// input. Filtering is just dropping.
    pub fn transform<F>(name: &str, logic: F) -> Self
    where
        F: FnMut(D) -> Option<D> + Send + 'static,
    {
        Self::with_logic(name, Logic::Transform(Box::new(logic)))
    }

    /// Creates a sink block, invoked once per received value.
    pub fn sink<F>(name: &str, logic: F) -> Self
    where
        F: FnMut(D) + Send + 'static,
    {
        Self::with_logic(name, Logic::Sink(Box::new(logic)))
    }

    /// Creates a compiler-synthesized relay block.
    pub(crate) fn relay(name: String, logic: Logic<D>, inports: PortList, outports: PortList) -> Self {
        Block {
            name,
            inports,
            outports,
            default_inport: None,
            default_outport: None,
            logic,
            startup: None,
            shutdown: None,
            synthetic: true,
        }
    }

    /// Replaces the input port names.
    ///
    /// A previously declared default inport is kept only if it still names
    /// one of the new ports.
    pub fn with_inports<I, S>(mut self, ports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inports = ports.into_iter().map(Into::into).collect();
        if let Some(default) = &self.default_inport {
            if !self.inports.iter().any(|p| p == default) {
                self.default_inport = None;
            }
        }
        self
    }

    /// Replaces the output port names.
    ///
    /// A previously declared default outport is kept only if it still names
    /// one of the new ports.
    pub fn with_outports<I, S>(mut self, ports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outports = ports.into_iter().map(Into::into).collect();
        if let Some(default) = &self.default_outport {
            if !self.outports.iter().any(|p| p == default) {
                self.default_outport = None;
            }
        }
        self
    }

    /// Declares the port used when an edge names this block without a port.
    pub fn with_default_inport(mut self, port: &str) -> Self {
        self.default_inport = Some(port.to_owned());
        self
    }

    /// Declares the port used when an edge names this block without a port.
    pub fn with_default_outport(mut self, port: &str) -> Self {
        self.default_outport = Some(port.to_owned());
        self
    }

    /// Installs a startup hook, run once before any worker performs channel
    /// I/O. A failed startup aborts the execution before any run begins.
    pub fn with_startup<F>(mut self, hook: F) -> Self
    where
        F: FnMut() -> Result<(), String> + Send + 'static,
    {
        self.startup = Some(Box::new(hook));
        self
    }

    /// Installs a shutdown hook, run once after the block's run completes,
    /// even when the execution fails.
    pub fn with_shutdown<F>(mut self, hook: F) -> Self
    where
        F: FnMut() -> Result<(), String> + Send + 'static,
    {
        self.shutdown = Some(Box::new(hook));
        self
    }

    /// The block's name, unique within its enclosing graph.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The block's role.
    pub fn role(&self) -> Role {
        self.logic.role()
    }

    /// The declared input port names.
    pub fn inports(&self) -> &[String] {
        &self.inports
    }

    /// The declared output port names.
    pub fn outports(&self) -> &[String] {
        &self.outports
    }

    /// The default input port, if one is declared.
    pub fn default_inport(&self) -> Option<&str> {
        self.default_inport.as_deref()
    }

    /// The default output port, if one is declared.
    pub fn default_outport(&self) -> Option<&str> {
        self.default_outport.as_deref()
    }
}

impl<D> fmt::Debug for Block<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("name", &self.name)
            .field("role", &self.role())
            .field("inports", &self.inports)
            .field("outports", &self.outports)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_constructors_install_conventional_ports() {
        let source = Block::source("s", vec![1, 2, 3]);
        assert_eq!(source.role(), Role::Source);
        assert!(source.inports().is_empty());
        assert_eq!(source.outports(), ["out"]);
        assert_eq!(source.default_outport(), Some("out"));

        let sink = Block::sink("c", |_x: i32| {});
        assert_eq!(sink.role(), Role::Sink);
        assert_eq!(sink.inports(), ["in"]);
        assert!(sink.outports().is_empty());
    }

    #[test]
    fn replacing_ports_clears_stale_defaults() {
        let block = Block::transform("t", |x: i32| Some(x)).with_outports(["left", "right"]);
        assert_eq!(block.outports(), ["left", "right"]);
        assert_eq!(block.default_outport(), None);
        assert_eq!(block.default_inport(), Some("in"));

        let block = block.with_default_outport("left");
        assert_eq!(block.default_outport(), Some("left"));
    }
}
