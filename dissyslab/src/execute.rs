//! Executes compiled plans: startup, one worker thread per leaf, shutdown.
//!
//! The scheduler runs every startup hook before any worker performs channel
//! I/O, spawns one named thread per leaf block, and then blocks until every
//! worker has returned. There is no stop signal during normal execution;
//! termination is carried end-to-end by end-of-stream propagation from the
//! sources. When a worker fails, its channel endpoints are dropped as its
//! thread unwinds, peers observe end-of-stream or closed channels, and the
//! rest of the system drains. Shutdown hooks run afterwards in reverse
//! startup order, and their failures are reported separately so they never
//! mask a worker's failure.

use std::any::Any;
use std::fmt;
use std::thread;

use thiserror::Error;

use crate::block::{Data, Hook};
use crate::channels::{self, DEFAULT_CAPACITY};
use crate::compile::{compile_with, Plan};
use crate::graph::validate::ValidateError;
use crate::graph::Graph;
use crate::worker::{self, Bindings};

/// Configuration for compilation and execution.
#[derive(Clone, Debug)]
pub struct Config {
    /// The bounded capacity of every allocated channel.
    pub capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

/// A worker or hook that ended abnormally.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerFailure {
    /// The qualified path of the block.
    pub block: String,
    /// What went wrong, as reported by the panic payload or the hook.
    pub cause: String,
}

/// Aggregated failures from one execution.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FailureReport {
    /// Workers whose run failed; the primary causes.
    pub workers: Vec<WorkerFailure>,
    /// Shutdown hooks that failed; secondary, reported separately.
    pub shutdowns: Vec<WorkerFailure>,
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "execution failed ({} worker failures, {} shutdown failures)",
            self.workers.len(),
            self.shutdowns.len()
        )?;
        for failure in &self.workers {
            write!(f, "\n  worker `{}`: {}", failure.block, failure.cause)?;
        }
        for failure in &self.shutdowns {
            write!(f, "\n  shutdown `{}`: {}", failure.block, failure.cause)?;
        }
        Ok(())
    }
}

/// An error from [`execute`].
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// The specification or the compiled plan violated a structural
    /// invariant.
    #[error(transparent)]
    Invalid(#[from] ValidateError),
    /// A startup hook failed; no worker was started.
    #[error("block `{block}` failed during startup: {cause}")]
    Startup {
        /// The block whose hook failed.
        block: String,
        /// The hook's error.
        cause: String,
    },
    /// One or more workers or shutdown hooks failed.
    #[error("{0}")]
    Failed(FailureReport),
}

/// Compiles and runs `graph` with the default configuration, returning
/// once every block has terminated.
///
/// # Examples
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use dissyslab::{Block, GraphBuilder};
///
/// let results = Arc::new(Mutex::new(Vec::new()));
/// let collected = Arc::clone(&results);
///
/// let mut builder = GraphBuilder::new();
/// let source = builder.add(Block::source("greetings", ["hello", "world"].map(String::from))).unwrap();
/// let upper = builder.add(Block::transform("upper", |x: String| Some(x.to_uppercase()))).unwrap();
/// let sink = builder.add(Block::sink("collect", move |x| collected.lock().unwrap().push(x))).unwrap();
/// builder.add_edge(source, upper).unwrap();
/// builder.add_edge(upper, sink).unwrap();
///
/// dissyslab::execute(builder.build()).unwrap();
/// assert_eq!(*results.lock().unwrap(), ["HELLO", "WORLD"]);
/// ```
pub fn execute<D: Data>(graph: Graph<D>) -> Result<(), ExecuteError> {
    execute_with(Config::default(), graph)
}

/// Compiles and runs `graph` under `config`.
pub fn execute_with<D: Data>(config: Config, graph: Graph<D>) -> Result<(), ExecuteError> {
    let plan = compile_with(&config, graph)?;
    execute_plan(plan)
}

/// Runs an already-compiled plan to completion.
pub fn execute_plan<D: Data>(mut plan: Plan<D>) -> Result<(), ExecuteError> {
    // Startup hooks, in plan order. A failure aborts before any worker
    // starts; hooks of blocks already started are unwound via their
    // shutdown hooks, whose failures are logged rather than reported.
    let mut shutdowns: Vec<(String, Option<Hook>)> = Vec::new();
    for leaf in plan.leaves.iter_mut() {
        let shutdown = leaf.block.shutdown.take();
        if let Some(mut hook) = leaf.block.startup.take() {
            if let Err(cause) = hook() {
                unwind_startups(shutdowns);
                return Err(ExecuteError::Startup {
                    block: leaf.path.clone(),
                    cause,
                });
            }
        }
        shutdowns.push((leaf.path.clone(), shutdown));
    }

    // One bounded channel per plan edge, handed to the two endpoints.
    let mut bindings: Vec<Bindings<D>> = plan.leaves.iter().map(|_| Bindings::default()).collect();
    for edge in &plan.edges {
        let (sender, receiver) = channels::channel(edge.capacity);
        bindings[edge.from_block.index()]
            .outputs
            .push((edge.from_port.clone(), sender));
        bindings[edge.to_block.index()]
            .inputs
            .push((edge.to_port.clone(), receiver));
    }

    // One named thread per leaf. If a spawn fails, the leaf's endpoints are
    // dropped here, so its peers drain; the failure is reported with the
    // others.
    tracing::debug!(workers = plan.leaves.len(), "starting workers");
    let mut guards = Vec::new();
    let mut failures = Vec::new();
    for (leaf, binding) in plan.leaves.drain(..).zip(bindings) {
        let path = leaf.path;
        let logic = leaf.block.logic;
        let thread_path = path.clone();
        let spawned = thread::Builder::new()
            .name(path.clone())
            .spawn(move || worker::run(&thread_path, logic, binding));
        match spawned {
            Ok(handle) => guards.push((path, handle)),
            Err(error) => failures.push(WorkerFailure {
                block: path,
                cause: error.to_string(),
            }),
        }
    }

    // Wait for every worker, mapping panics to primary failures.
    for (path, handle) in guards {
        if let Err(payload) = handle.join() {
            let cause = panic_message(payload);
            tracing::error!(block = %path, cause = %cause, "worker failed");
            failures.push(WorkerFailure { block: path, cause });
        }
    }

    // Shutdown hooks, in reverse startup order, collected separately.
    let mut shutdown_failures = Vec::new();
    for (path, hook) in shutdowns.into_iter().rev() {
        if let Some(mut hook) = hook {
            if let Err(cause) = hook() {
                shutdown_failures.push(WorkerFailure { block: path, cause });
            }
        }
    }

    if failures.is_empty() && shutdown_failures.is_empty() {
        Ok(())
    } else {
        Err(ExecuteError::Failed(FailureReport {
            workers: failures,
            shutdowns: shutdown_failures,
        }))
    }
}

/// Runs the shutdown hooks of the blocks whose startup already succeeded,
/// newest first.
fn unwind_startups(shutdowns: Vec<(String, Option<Hook>)>) {
    for (path, hook) in shutdowns.into_iter().rev() {
        if let Some(mut hook) = hook {
            if let Err(cause) = hook() {
                tracing::warn!(block = %path, cause = %cause, "shutdown failed while unwinding startup");
            }
        }
    }
}

/// Renders a panic payload for reporting; `panic!` and `assert!` produce
/// `&str` or `String` payloads.
fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_owned()
    }
}
