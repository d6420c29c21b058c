use dissyslab::{execute, Block, GraphBuilder};

fn main() {
    let mut builder = GraphBuilder::new();

    let words = builder
        .add(Block::source("words", ["hello", "concurrent", "world"].map(String::from)))
        .unwrap();
    let upper = builder
        .add(Block::transform("upper", |x: String| Some(x.to_uppercase())))
        .unwrap();
    let printer = builder
        .add(Block::sink("printer", |x| println!("seen: {x}")))
        .unwrap();

    builder.add_edge(words, upper).unwrap();
    builder.add_edge(upper, printer).unwrap();

    execute(builder.build()).unwrap();
}
