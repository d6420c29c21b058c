use dissyslab::{compile, execute_plan, Block, GraphBuilder};

fn main() {
    let mut builder = GraphBuilder::new();

    // One source feeding two branches; the compiler inserts the broadcast.
    let numbers = builder.add(Block::source("numbers", 0..10)).unwrap();
    let doubled = builder
        .add(Block::transform("doubled", |x: i32| Some(2 * x)))
        .unwrap();
    let odds = builder
        .add(Block::transform("odds", |x: i32| if x % 2 == 1 { Some(x) } else { None }))
        .unwrap();
    let left = builder
        .add(Block::sink("left", |x| println!("doubled: {x}")))
        .unwrap();
    let right = builder
        .add(Block::sink("right", |x| println!("odd: {x}")))
        .unwrap();

    builder.add_edge(numbers, doubled).unwrap();
    builder.add_edge(numbers, odds).unwrap();
    builder.add_edge(doubled, left).unwrap();
    builder.add_edge(odds, right).unwrap();

    let plan = compile(builder.build()).unwrap();
    println!("{}", serde_json::to_string_pretty(&plan.describe()).unwrap());

    execute_plan(plan).unwrap();
}
