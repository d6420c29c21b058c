//! End-to-end executions of small graphs, checking delivered values,
//! ordering, termination, and failure reporting.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use dissyslab::{execute, Block, ExecuteError, GraphBuilder};

/// A shared store and a sink closure appending to it.
fn collector<D: Send + 'static>() -> (Arc<Mutex<Vec<D>>>, impl FnMut(D)) {
    let store = Arc::new(Mutex::new(Vec::new()));
    let sink_store = Arc::clone(&store);
    (store, move |value| sink_store.lock().unwrap().push(value))
}

#[test]
fn pipeline_uppercases_in_order() {
    let (results, push) = collector();

    let mut builder = GraphBuilder::new();
    let source = builder
        .add(Block::source("s", ["hello", "world"].map(String::from)))
        .unwrap();
    let upper = builder
        .add(Block::transform("u", |x: String| Some(x.to_uppercase())))
        .unwrap();
    let sink = builder.add(Block::sink("c", push)).unwrap();
    builder.add_edge(source, upper).unwrap();
    builder.add_edge(upper, sink).unwrap();

    execute(builder.build()).unwrap();
    assert_eq!(*results.lock().unwrap(), ["HELLO", "WORLD"]);
}

#[test]
fn the_drop_signal_filters() {
    let (results, push) = collector();

    let mut builder = GraphBuilder::new();
    let source = builder.add(Block::source("s", 1..=10)).unwrap();
    let evens = builder
        .add(Block::transform("f", |x: i32| if x % 2 == 0 { Some(x) } else { None }))
        .unwrap();
    let sink = builder.add(Block::sink("c", push)).unwrap();
    builder.add_edge(source, evens).unwrap();
    builder.add_edge(evens, sink).unwrap();

    execute(builder.build()).unwrap();
    assert_eq!(*results.lock().unwrap(), [2, 4, 6, 8, 10]);
}

#[test]
fn fanout_feeds_both_branches_in_source_order() {
    let (upper_results, push_upper) = collector();
    let (reversed_results, push_reversed) = collector();

    let mut builder = GraphBuilder::new();
    let source = builder
        .add(Block::source("s", ["one", "two", "three"].map(String::from)))
        .unwrap();
    let upper = builder
        .add(Block::transform("u", |x: String| Some(x.to_uppercase())))
        .unwrap();
    let reverse = builder
        .add(Block::transform("v", |x: String| Some(x.chars().rev().collect())))
        .unwrap();
    let upper_sink = builder.add(Block::sink("cu", push_upper)).unwrap();
    let reverse_sink = builder.add(Block::sink("cv", push_reversed)).unwrap();

    builder.add_edge(source, upper).unwrap();
    builder.add_edge(source, reverse).unwrap();
    builder.add_edge(upper, upper_sink).unwrap();
    builder.add_edge(reverse, reverse_sink).unwrap();

    execute(builder.build()).unwrap();
    assert_eq!(*upper_results.lock().unwrap(), ["ONE", "TWO", "THREE"]);
    assert_eq!(*reversed_results.lock().unwrap(), ["eno", "owt", "eerht"]);
}

#[test]
fn fanin_merges_with_per_source_order_preserved() {
    let (results, push) = collector();

    let mut builder = GraphBuilder::new();
    let first = builder
        .add(Block::source("s1", ["a", "b"].map(String::from)))
        .unwrap();
    let second = builder
        .add(Block::source("s2", ["x", "y"].map(String::from)))
        .unwrap();
    let sink = builder.add(Block::sink("c", push)).unwrap();
    builder.add_edge(first, sink).unwrap();
    builder.add_edge(second, sink).unwrap();

    execute(builder.build()).unwrap();

    let results = results.lock().unwrap();
    let mut sorted = results.clone();
    sorted.sort();
    assert_eq!(sorted, ["a", "b", "x", "y"]);

    let position = |needle: &str| results.iter().position(|x| x == needle).unwrap();
    assert!(position("a") < position("b"));
    assert!(position("x") < position("y"));
}

#[test]
fn a_nested_composite_behaves_like_the_flat_pipeline() {
    use dissyslab::{Graph, EXTERNAL};

    let (results, push) = collector();

    let mut inner = Graph::new("g");
    inner
        .add(Block::transform("t", |x: i32| Some(x * 10)))
        .connect(EXTERNAL, "in", "t", "in")
        .connect("t", "out", EXTERNAL, "out")
        .expose_inport("in")
        .expose_outport("out");

    let mut builder = GraphBuilder::new();
    let source = builder.add(Block::source("s", 1..=3)).unwrap();
    let composite = builder.add(inner).unwrap();
    let sink = builder.add(Block::sink("c", push)).unwrap();
    builder.add_edge(source, composite).unwrap();
    builder.add_edge(composite, sink).unwrap();

    execute(builder.build()).unwrap();
    assert_eq!(*results.lock().unwrap(), [10, 20, 30]);
}

#[test]
fn broadcast_delivers_a_long_stream_exactly_to_every_sink() {
    const ITEMS: u32 = 100_000;

    let stores: Vec<_> = (0..4).map(|_| Arc::new(Mutex::new(Vec::new()))).collect();

    let mut builder = GraphBuilder::new();
    let source = builder.add(Block::source("s", 0..ITEMS)).unwrap();
    for (index, store) in stores.iter().enumerate() {
        let store = Arc::clone(store);
        let sink = builder
            .add(Block::sink(&format!("c{index}"), move |x| store.lock().unwrap().push(x)))
            .unwrap();
        builder.add_edge(source, sink).unwrap();
    }

    execute(builder.build()).unwrap();
    for store in stores {
        let received = store.lock().unwrap();
        assert_eq!(received.len() as u32, ITEMS);
        assert!(received.iter().copied().eq(0..ITEMS));
    }
}

#[test]
fn a_failing_transformer_terminates_the_whole_graph() {
    let (results, push) = collector();

    let mut builder = GraphBuilder::new();
    let source = builder.add(Block::source("s", 1..=5)).unwrap();
    let faulty = builder
        .add(Block::transform("t", |x: i32| {
            assert!(x < 3, "refusing to process {x}");
            Some(x)
        }))
        .unwrap();
    let sink = builder.add(Block::sink("c", push)).unwrap();
    builder.add_edge(source, faulty).unwrap();
    builder.add_edge(faulty, sink).unwrap();

    let error = execute(builder.build()).unwrap_err();
    let ExecuteError::Failed(report) = error else {
        panic!("expected an aggregated failure");
    };
    assert_eq!(report.workers.len(), 1);
    assert_eq!(report.workers[0].block, "t");
    assert!(report.workers[0].cause.contains("refusing to process 3"));
    assert!(report.shutdowns.is_empty());

    // The sink saw at most the items forwarded before the failure, in order.
    let received = results.lock().unwrap();
    assert!(received.len() <= 2);
    assert!(received.iter().copied().eq(1..=received.len() as i32));
}

#[test]
fn startup_failure_aborts_before_any_run() {
    let (results, push) = collector();

    let mut builder = GraphBuilder::new();
    let source = builder.add(Block::source("s", 1..=3)).unwrap();
    let guarded = builder
        .add(
            Block::transform("t", |x: i32| Some(x))
                .with_startup(|| Err("no database".to_owned())),
        )
        .unwrap();
    let sink = builder.add(Block::sink("c", push)).unwrap();
    builder.add_edge(source, guarded).unwrap();
    builder.add_edge(guarded, sink).unwrap();

    let error = execute(builder.build()).unwrap_err();
    match error {
        ExecuteError::Startup { block, cause } => {
            assert_eq!(block, "t");
            assert_eq!(cause, "no database");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(results.lock().unwrap().is_empty());
}

#[test]
fn shutdown_runs_even_after_a_failed_run_and_errors_are_secondary() {
    let shutdown_ran = Arc::new(AtomicBool::new(false));
    let observed = Arc::clone(&shutdown_ran);

    let mut builder = GraphBuilder::new();
    let source = builder.add(Block::source("s", 1..=3)).unwrap();
    let faulty = builder
        .add(
            Block::transform("t", |_x: i32| panic!("broken"))
                .with_shutdown(move || {
                    observed.store(true, Ordering::SeqCst);
                    Err("flush failed".to_owned())
                }),
        )
        .unwrap();
    let sink = builder.add(Block::sink("c", |_x| {})).unwrap();
    builder.add_edge(source, faulty).unwrap();
    builder.add_edge(faulty, sink).unwrap();

    let error = execute(builder.build()).unwrap_err();
    let ExecuteError::Failed(report) = error else {
        panic!("expected an aggregated failure");
    };
    assert!(shutdown_ran.load(Ordering::SeqCst));
    assert_eq!(report.workers.len(), 1);
    assert_eq!(report.workers[0].block, "t");
    assert_eq!(report.shutdowns.len(), 1);
    assert_eq!(report.shutdowns[0].cause, "flush failed");
}

#[test]
fn shutdown_failures_alone_still_fail_the_execution() {
    let mut builder = GraphBuilder::new();
    let source = builder
        .add(
            Block::source("s", 1..=3).with_shutdown(|| Err("close failed".to_owned())),
        )
        .unwrap();
    let sink = builder.add(Block::sink("c", |_x: i32| {})).unwrap();
    builder.add_edge(source, sink).unwrap();

    let error = execute(builder.build()).unwrap_err();
    let ExecuteError::Failed(report) = error else {
        panic!("expected an aggregated failure");
    };
    assert!(report.workers.is_empty());
    assert_eq!(report.shutdowns.len(), 1);
    assert_eq!(report.shutdowns[0].block, "s");
}

#[test]
fn sources_from_pull_functions_signal_end_of_stream_with_none() {
    let (results, push) = collector();

    let mut remaining = 3u32;
    let mut builder = GraphBuilder::new();
    let source = builder
        .add(Block::source_fn("countdown", move || {
            if remaining == 0 {
                None
            } else {
                remaining -= 1;
                Some(remaining)
            }
        }))
        .unwrap();
    let sink = builder.add(Block::sink("c", push)).unwrap();
    builder.add_edge(source, sink).unwrap();

    execute(builder.build()).unwrap();
    assert_eq!(*results.lock().unwrap(), [2, 1, 0]);
}
