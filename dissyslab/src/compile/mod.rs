//! Compiles validated specifications into executable plans.
//!
//! The pipeline is ordered and each step preserves observable semantics:
//! relay insertion restores the one-to-one discipline at every port,
//! flattening lifts nested graphs to qualified leaf paths, boundary
//! resolution splices away composite pass-throughs, and assembly allocates
//! one bounded channel per remaining edge and one worker descriptor per
//! leaf. The result is an arena of leaves and an integer-indexed edge list;
//! composites do not survive into the plan.

pub(crate) mod flatten;
pub(crate) mod relay;

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::block::{Block, PortDirection, Role};
use crate::execute::Config;
use crate::graph::validate::{self, ValidateError, Violation};
use crate::graph::Graph;

/// Identifies a leaf block in a compiled plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub(crate) usize);

impl BlockId {
    pub(crate) fn index(self) -> usize {
        self.0
    }
}

/// One allocated channel: a producing port, a consuming port, a capacity.
#[derive(Clone, Debug)]
pub(crate) struct PlanEdge {
    pub(crate) from_block: BlockId,
    pub(crate) from_port: String,
    pub(crate) to_block: BlockId,
    pub(crate) to_port: String,
    pub(crate) capacity: usize,
}

/// A leaf ready for execution.
pub(crate) struct Leaf<D> {
    pub(crate) path: String,
    pub(crate) block: Block<D>,
}

/// The compiled, flat form of a graph, ready to execute.
///
/// Plans are produced by [`compile`] or [`compile_with`] and consumed by
/// [`execute_plan`](crate::execute::execute_plan). For tooling,
/// [`Plan::describe`] reports the leaf paths, the channels with their
/// endpoints, and the relay blocks the compiler inserted.
pub struct Plan<D> {
    pub(crate) leaves: Vec<Leaf<D>>,
    pub(crate) edges: Vec<PlanEdge>,
    pub(crate) ids: HashMap<String, BlockId>,
}

impl<D> Plan<D> {
    /// Qualified paths of the leaf blocks, in plan order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.leaves.iter().map(|leaf| leaf.path.as_str())
    }

    /// The number of allocated channels.
    pub fn channels(&self) -> usize {
        self.edges.len()
    }

    /// Looks up a leaf block by qualified path.
    pub fn id(&self, path: &str) -> Option<BlockId> {
        self.ids.get(path).copied()
    }

    /// A serializable description of the plan, for tooling.
    pub fn describe(&self) -> PlanDescription {
        PlanDescription {
            blocks: self
                .leaves
                .iter()
                .map(|leaf| BlockDescription {
                    path: leaf.path.clone(),
                    role: leaf.block.role(),
                    inports: leaf.block.inports().to_vec(),
                    outports: leaf.block.outports().to_vec(),
                })
                .collect(),
            channels: self
                .edges
                .iter()
                .map(|edge| ChannelDescription {
                    from: PortAddress {
                        block: self.leaves[edge.from_block.index()].path.clone(),
                        port: edge.from_port.clone(),
                    },
                    to: PortAddress {
                        block: self.leaves[edge.to_block.index()].path.clone(),
                        port: edge.to_port.clone(),
                    },
                    capacity: edge.capacity,
                })
                .collect(),
            inserted: self
                .leaves
                .iter()
                .filter(|leaf| leaf.block.synthetic)
                .map(|leaf| leaf.path.clone())
                .collect(),
        }
    }
}

impl<D> fmt::Debug for Plan<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plan")
            .field("leaves", &self.paths().collect::<Vec<_>>())
            .field("channels", &self.edges.len())
            .finish()
    }
}

/// A serializable description of a compiled plan.
#[derive(Clone, Debug, Serialize)]
pub struct PlanDescription {
    /// Every leaf block, with its role and port schema.
    pub blocks: Vec<BlockDescription>,
    /// Every allocated channel.
    pub channels: Vec<ChannelDescription>,
    /// Qualified paths of relay blocks inserted by the compiler.
    pub inserted: Vec<String>,
}

/// One leaf block of a plan description.
#[derive(Clone, Debug, Serialize)]
pub struct BlockDescription {
    /// The leaf's qualified path.
    pub path: String,
    /// The role its run loop follows.
    pub role: Role,
    /// Its input port names.
    pub inports: Vec<String>,
    /// Its output port names.
    pub outports: Vec<String>,
}

/// One channel of a plan description.
#[derive(Clone, Debug, Serialize)]
pub struct ChannelDescription {
    /// The producing endpoint.
    pub from: PortAddress,
    /// The consuming endpoint.
    pub to: PortAddress,
    /// The channel's bounded capacity.
    pub capacity: usize,
}

/// A block-and-port pair addressing one end of a channel.
#[derive(Clone, Debug, Serialize)]
pub struct PortAddress {
    /// The qualified path of the leaf block.
    pub block: String,
    /// The port name on that block.
    pub port: String,
}

/// Compiles `graph` with the default configuration.
pub fn compile<D>(graph: Graph<D>) -> Result<Plan<D>, ValidateError> {
    compile_with(&Config::default(), graph)
}

/// Compiles `graph` into an executable plan, validating the specification
/// beforehand and the plan afterwards.
pub fn compile_with<D>(config: &Config, graph: Graph<D>) -> Result<Plan<D>, ValidateError> {
    validate::validate(&graph)?;
    if !graph.external_inports().is_empty() || !graph.external_outports().is_empty() {
        return Err(ValidateError {
            violations: vec![Violation::RootExternal {
                graph: graph.name().to_owned(),
            }],
        });
    }

    let mut graph = graph;
    relay::insert_relays(&mut graph);
    let mut flat = flatten::flatten(graph);
    flatten::resolve_boundaries(&mut flat)?;

    let plan = assemble(config, flat);
    validate_plan(&plan)?;
    tracing::debug!(
        leaves = plan.leaves.len(),
        channels = plan.edges.len(),
        "compiled plan"
    );
    Ok(plan)
}

fn assemble<D>(config: &Config, flat: flatten::FlatGraph<D>) -> Plan<D> {
    let mut ids = HashMap::new();
    let leaves: Vec<Leaf<D>> = flat
        .leaves
        .into_iter()
        .enumerate()
        .map(|(index, (path, block))| {
            ids.insert(path.clone(), BlockId(index));
            Leaf { path, block }
        })
        .collect();

    let edges = flat
        .edges
        .into_iter()
        .map(|edge| PlanEdge {
            from_block: *ids
                .get(&edge.from_block)
                .expect("resolved edge endpoints refer to leaves"),
            from_port: edge.from_port,
            to_block: *ids
                .get(&edge.to_block)
                .expect("resolved edge endpoints refer to leaves"),
            to_port: edge.to_port,
            capacity: config.capacity,
        })
        .collect();

    Plan { leaves, edges, ids }
}

/// Pre-execution validation: every declared port of every leaf is bound to
/// exactly one channel, and no leaf is left without channels entirely.
fn validate_plan<D>(plan: &Plan<D>) -> Result<(), ValidateError> {
    let mut violations = Vec::new();
    for (index, leaf) in plan.leaves.iter().enumerate() {
        let id = BlockId(index);
        for port in leaf.block.inports() {
            let count = plan
                .edges
                .iter()
                .filter(|e| e.to_block == id && e.to_port == *port)
                .count();
            if count != 1 {
                violations.push(Violation::PortBound {
                    path: leaf.path.clone(),
                    port: port.clone(),
                    direction: PortDirection::Input,
                    count,
                });
            }
        }
        for port in leaf.block.outports() {
            let count = plan
                .edges
                .iter()
                .filter(|e| e.from_block == id && e.from_port == *port)
                .count();
            if count != 1 {
                violations.push(Violation::PortBound {
                    path: leaf.path.clone(),
                    port: port.clone(),
                    direction: PortDirection::Output,
                    count,
                });
            }
        }
        let bound = plan
            .edges
            .iter()
            .any(|e| e.from_block == id || e.to_block == id);
        if !bound {
            violations.push(Violation::Orphan {
                path: leaf.path.clone(),
            });
        }
    }
    ValidateError::check(violations)
}
