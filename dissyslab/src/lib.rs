//! DisSysLab is a framework for building and running concurrent dataflow
//! applications: a directed graph of *blocks*, each hosting an ordinary
//! function, connected by bounded point-to-point *channels*.
//!
//! The code is organized so that the declarative and the executable halves
//! stay apart and meet only in the compiler.
//!
//! **Specification**: the [`graph`] module defines [`Graph`] — named
//! children (leaf [`Block`]s or nested graphs), 4-tuple connections, and
//! optional external boundary ports — along with [`GraphBuilder`], which
//! assembles a root graph from pairwise edges, and the validator, which
//! reports every structural violation in one error.
//!
//! **Compilation**: the [`compile`](mod@compile) module inserts broadcast and merge
//! relays where users wrote fan-out or fan-in directly, flattens nested
//! graphs to `.`-qualified leaf paths, collapses composite boundaries by
//! fixpoint, and allocates one bounded channel per remaining edge. The
//! resulting [`Plan`] references leaves only.
//!
//! **Execution**: the [`execute`](mod@execute) module runs one worker thread per leaf.
//! Values flow along channels; a full channel blocks its producer, which is
//! the sole backpressure mechanism. Termination is carried in-band: sources
//! emit an end-of-stream marker when exhausted, and every downstream block
//! drains and exits. Worker and shutdown failures are aggregated and
//! reported together.
//!
//! # Examples
//!
//! A three-stage pipeline: produce two words, uppercase them, collect them.
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use dissyslab::{Block, GraphBuilder};
//!
//! let results = Arc::new(Mutex::new(Vec::new()));
//! let collected = Arc::clone(&results);
//!
//! let mut builder = GraphBuilder::new();
//! let source = builder.add(Block::source("words", ["hello", "world"].map(String::from))).unwrap();
//! let upper = builder.add(Block::transform("upper", |x: String| Some(x.to_uppercase()))).unwrap();
//! let sink = builder.add(Block::sink("collect", move |x| collected.lock().unwrap().push(x))).unwrap();
//!
//! builder.add_edge(source, upper).unwrap();
//! builder.add_edge(upper, sink).unwrap();
//!
//! dissyslab::execute(builder.build()).unwrap();
//! assert_eq!(*results.lock().unwrap(), ["HELLO", "WORLD"]);
//! ```
//!
//! Transformers drop a value by returning `None`, which is the only way to
//! filter; sources signal end-of-stream by exhausting their iterator (or
//! returning `None` from a [`Block::source_fn`] closure).

#![forbid(missing_docs)]

pub mod block;
pub mod channels;
pub mod compile;
pub mod execute;
pub mod graph;
mod worker;

pub use block::{Block, Data, Hook, PortDirection, Role};
pub use channels::Message;
pub use compile::{compile, compile_with, BlockId, Plan, PlanDescription};
pub use execute::{execute, execute_plan, execute_with, Config, ExecuteError, FailureReport, WorkerFailure};
pub use graph::validate::{validate, ValidateError, Violation};
pub use graph::{BuildError, Child, Connection, Graph, GraphBuilder, NodeHandle, NodeRef, EXTERNAL};
