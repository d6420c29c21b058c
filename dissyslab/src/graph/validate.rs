//! Structural validation of graph specifications and compiled plans.
//!
//! Validation runs twice. At specification time, [`validate`] walks the
//! graph recursively and gathers every violation it can find into a single
//! [`ValidateError`], so that a user fixes one round of problems rather than
//! one problem per round. Before execution, the compiler re-checks the
//! flattened plan (exactly-once channel bindings, no composite residue, no
//! orphan leaves) with the same violation vocabulary.

use std::collections::HashSet;
use std::fmt;

use itertools::Itertools;
use thiserror::Error;

use crate::block::{PortDirection, Role};
use crate::graph::{Child, Graph, EXTERNAL};

/// A single structural problem, with enough context to fix it.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Violation {
    /// Two children of one graph share a name.
    #[error("graph `{graph}` has {count} children named `{name}`; child names must be unique")]
    DuplicateName {
        /// The graph owning the children.
        graph: String,
        /// The shared name.
        name: String,
        /// How many children carry it.
        count: usize,
    },
    /// A child uses the reserved name `external`.
    #[error("child of graph `{graph}` uses the reserved name `{name}`, which refers to the graph boundary")]
    ReservedName {
        /// The graph owning the child.
        graph: String,
        /// The reserved name.
        name: String,
    },
    /// A child name contains `.`, which is reserved for path qualification.
    #[error("child `{name}` of graph `{graph}` contains `.`, which is reserved for path qualification")]
    DottedName {
        /// The graph owning the child.
        graph: String,
        /// The offending name.
        name: String,
    },
    /// A port name contains `.`.
    #[error("port `{port}` on `{block}` in graph `{graph}` contains `.`, which is reserved for path qualification")]
    DottedPortName {
        /// The graph owning the block.
        graph: String,
        /// The block declaring the port.
        block: String,
        /// The offending port name.
        port: String,
    },
    /// An external port is declared twice.
    #[error("graph `{graph}` declares external {direction} port `{port}` more than once")]
    DuplicateExternal {
        /// The declaring graph.
        graph: String,
        /// The duplicated port.
        port: String,
        /// Whether it is an inport or an outport.
        direction: PortDirection,
    },
    /// A connection references a child the graph does not contain.
    #[error("graph `{graph}` connects unknown child `{name}`; add it to the graph or fix the connection")]
    UnknownChild {
        /// The graph owning the connection.
        graph: String,
        /// The missing child name.
        name: String,
    },
    /// A connection references a port absent from a child's schema.
    #[error("graph `{graph}` connects unknown {direction} port `{port}` on `{block}`; available: [{available}]")]
    UnknownPort {
        /// The graph owning the connection.
        graph: String,
        /// The referenced child.
        block: String,
        /// The missing port.
        port: String,
        /// Which side of the connection it is.
        direction: PortDirection,
        /// The ports the child does declare.
        available: String,
    },
    /// A connection references an external port the graph does not declare.
    #[error("graph `{graph}` connects undeclared external {direction} port `{port}`; declare it on the graph first")]
    UnknownExternal {
        /// The graph owning the connection.
        graph: String,
        /// The missing external port.
        port: String,
        /// Whether an inport or an outport was expected.
        direction: PortDirection,
    },
    /// A declared port has no connection at all.
    #[error("{direction} port `{port}` on `{block}` in graph `{graph}` is never connected; wire it or remove it from the schema")]
    Unconnected {
        /// The graph owning the block.
        graph: String,
        /// The block declaring the port.
        block: String,
        /// The unconnected port.
        port: String,
        /// Whether it is an inport or an outport.
        direction: PortDirection,
    },
    /// A declared external port is not used by any boundary connection.
    #[error("external {direction} port `{port}` of graph `{graph}` is never used by a boundary connection; connect it via `external` inside the graph")]
    UnusedExternal {
        /// The declaring graph.
        graph: String,
        /// The unused port.
        port: String,
        /// Whether it is an inport or an outport.
        direction: PortDirection,
    },
    /// A transformer or sink declares several inports.
    #[error("{role} `{block}` in graph `{graph}` declares {count} inports; connect several producers to one inport instead and a merge is inserted automatically")]
    MultiInput {
        /// The graph owning the block.
        graph: String,
        /// The offending block.
        block: String,
        /// The block's role.
        role: Role,
        /// The number of declared inports.
        count: usize,
    },
    /// A block's port counts contradict its role.
    #[error("{role} `{block}` in graph `{graph}` declares {inports} inports and {outports} outports, which its role does not allow")]
    BadArity {
        /// The graph owning the block.
        graph: String,
        /// The offending block.
        block: String,
        /// The block's role.
        role: Role,
        /// The number of declared inports.
        inports: usize,
        /// The number of declared outports.
        outports: usize,
    },
    /// A root graph declares external ports.
    #[error("root graph `{graph}` declares external ports, but nothing encloses it to connect them")]
    RootExternal {
        /// The root graph.
        graph: String,
    },
    /// A boundary edge survived flattening.
    #[error("boundary port `{path}.{port}` was not collapsed during flattening; connect it on both sides of the composite")]
    Boundary {
        /// The composite's qualified path.
        path: String,
        /// The surviving external port.
        port: String,
    },
    /// A plan port is bound to a number of channels other than one.
    #[error("{direction} port `{port}` on `{path}` is bound to {count} channels; expected exactly one")]
    PortBound {
        /// The leaf's qualified path.
        path: String,
        /// The port in question.
        port: String,
        /// Whether it is an inport or an outport.
        direction: PortDirection,
        /// The number of channels bound to it.
        count: usize,
    },
    /// A leaf block ended up with no channels at all.
    #[error("leaf `{path}` is not connected to any channel")]
    Orphan {
        /// The leaf's qualified path.
        path: String,
    },
}

/// One or more structural violations, reported together.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidateError {
    /// Every violation found, in discovery order.
    pub violations: Vec<Violation>,
}

impl ValidateError {
    pub(crate) fn check(violations: Vec<Violation>) -> Result<(), ValidateError> {
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidateError { violations })
        }
    }
}

impl fmt::Display for ValidateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid graph specification ({} violation{})",
            self.violations.len(),
            if self.violations.len() == 1 { "" } else { "s" }
        )?;
        for violation in &self.violations {
            write!(f, "\n  - {violation}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidateError {}

/// Checks the structural invariants of a specification, recursively, and
/// reports every violation found in one error.
///
/// A graph that passes may still be rejected as a *root* graph (by
/// `compile` or `execute`) if it declares external ports, since a root has
/// no enclosing graph to connect them.
pub fn validate<D>(graph: &Graph<D>) -> Result<(), ValidateError> {
    let mut violations = Vec::new();
    check_graph(graph, &mut violations);
    ValidateError::check(violations)
}

pub(crate) fn check_graph<D>(graph: &Graph<D>, violations: &mut Vec<Violation>) {
    check_names(graph, violations);
    check_blocks(graph, violations);
    check_connections(graph, violations);
    check_coverage(graph, violations);

    for child in graph.children() {
        if let Child::Graph(nested) = child {
            check_graph(nested, violations);
        }
    }
}

fn check_names<D>(graph: &Graph<D>, violations: &mut Vec<Violation>) {
    let mut reported = HashSet::new();
    for child in graph.children() {
        let name = child.name();
        let count = graph.children().iter().filter(|c| c.name() == name).count();
        if count > 1 && reported.insert(name) {
            violations.push(Violation::DuplicateName {
                graph: graph.name().to_owned(),
                name: name.to_owned(),
                count,
            });
        }
        if name == EXTERNAL {
            violations.push(Violation::ReservedName {
                graph: graph.name().to_owned(),
                name: name.to_owned(),
            });
        }
        if name.contains('.') {
            violations.push(Violation::DottedName {
                graph: graph.name().to_owned(),
                name: name.to_owned(),
            });
        }
    }

    for (ports, direction) in [
        (graph.external_inports(), PortDirection::Input),
        (graph.external_outports(), PortDirection::Output),
    ] {
        let mut seen = HashSet::new();
        for port in ports {
            if !seen.insert(port.as_str()) {
                violations.push(Violation::DuplicateExternal {
                    graph: graph.name().to_owned(),
                    port: port.clone(),
                    direction,
                });
            }
        }
    }
}

fn check_blocks<D>(graph: &Graph<D>, violations: &mut Vec<Violation>) {
    for child in graph.children() {
        let Child::Block(block) = child else { continue };

        for port in block.inports().iter().chain(block.outports()) {
            if port.contains('.') {
                violations.push(Violation::DottedPortName {
                    graph: graph.name().to_owned(),
                    block: block.name().to_owned(),
                    port: port.clone(),
                });
            }
        }

        let (ins, outs) = (block.inports().len(), block.outports().len());
        let arity_ok = match block.role() {
            Role::Source => ins == 0 && outs >= 1,
            Role::Transform => ins >= 1 && outs >= 1,
            Role::Sink => ins >= 1 && outs == 0,
            Role::Broadcast => ins == 1 && outs >= 1,
            Role::Merge => ins >= 1 && outs == 1,
        };
        if !arity_ok {
            violations.push(Violation::BadArity {
                graph: graph.name().to_owned(),
                block: block.name().to_owned(),
                role: block.role(),
                inports: ins,
                outports: outs,
            });
        } else if matches!(block.role(), Role::Transform | Role::Sink) && ins > 1 {
            violations.push(Violation::MultiInput {
                graph: graph.name().to_owned(),
                block: block.name().to_owned(),
                role: block.role(),
                count: ins,
            });
        }
    }
}

fn check_connections<D>(graph: &Graph<D>, violations: &mut Vec<Violation>) {
    for connection in graph.connections() {
        check_endpoint(graph, &connection.from_block, &connection.from_port, PortDirection::Output, violations);
        check_endpoint(graph, &connection.to_block, &connection.to_port, PortDirection::Input, violations);
    }
}

fn check_endpoint<D>(
    graph: &Graph<D>,
    block: &str,
    port: &str,
    direction: PortDirection,
    violations: &mut Vec<Violation>,
) {
    if block == EXTERNAL {
        // An external *sender* endpoint is one of the graph's own inports
        // (values enter through it), and symmetrically for receivers.
        let declared = match direction {
            PortDirection::Output => graph.external_inports(),
            PortDirection::Input => graph.external_outports(),
        };
        if !declared.iter().any(|p| p == port) {
            violations.push(Violation::UnknownExternal {
                graph: graph.name().to_owned(),
                port: port.to_owned(),
                direction: match direction {
                    PortDirection::Output => PortDirection::Input,
                    PortDirection::Input => PortDirection::Output,
                },
            });
        }
        return;
    }
    let Some(child) = graph.child(block) else {
        violations.push(Violation::UnknownChild {
            graph: graph.name().to_owned(),
            name: block.to_owned(),
        });
        return;
    };
    let ports = match direction {
        PortDirection::Input => child.inports(),
        PortDirection::Output => child.outports(),
    };
    if !ports.iter().any(|p| p == port) {
        violations.push(Violation::UnknownPort {
            graph: graph.name().to_owned(),
            block: block.to_owned(),
            port: port.to_owned(),
            direction,
            available: ports.iter().join(", "),
        });
    }
}

/// Every declared port must take part in at least one connection. The
/// exactly-once form of this invariant holds only after the compiler has
/// inserted broadcasts and merges, and is re-checked on the plan.
fn check_coverage<D>(graph: &Graph<D>, violations: &mut Vec<Violation>) {
    for child in graph.children() {
        for port in child.inports() {
            let connected = graph
                .connections()
                .iter()
                .any(|c| c.to_block == child.name() && c.to_port == *port);
            if !connected {
                violations.push(Violation::Unconnected {
                    graph: graph.name().to_owned(),
                    block: child.name().to_owned(),
                    port: port.clone(),
                    direction: PortDirection::Input,
                });
            }
        }
        for port in child.outports() {
            let connected = graph
                .connections()
                .iter()
                .any(|c| c.from_block == child.name() && c.from_port == *port);
            if !connected {
                violations.push(Violation::Unconnected {
                    graph: graph.name().to_owned(),
                    block: child.name().to_owned(),
                    port: port.clone(),
                    direction: PortDirection::Output,
                });
            }
        }
    }

    for port in graph.external_inports() {
        let used = graph
            .connections()
            .iter()
            .any(|c| c.from_block == EXTERNAL && c.from_port == *port);
        if !used {
            violations.push(Violation::UnusedExternal {
                graph: graph.name().to_owned(),
                port: port.clone(),
                direction: PortDirection::Input,
            });
        }
    }
    for port in graph.external_outports() {
        let used = graph
            .connections()
            .iter()
            .any(|c| c.to_block == EXTERNAL && c.to_port == *port);
        if !used {
            violations.push(Violation::UnusedExternal {
                graph: graph.name().to_owned(),
                port: port.clone(),
                direction: PortDirection::Output,
            });
        }
    }
}
