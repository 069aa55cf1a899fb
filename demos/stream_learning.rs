//! Stream learning: file-backed training with a bounded pipeline.
//!
//! Demonstrates the streaming path end to end:
//!
//! 1. Generate a synthetic two-class training file (with some junk lines)
//! 2. Drive it through the engine with `learn_stream`, pass after pass
//! 3. Watch the squared error fall as the weights settle
//! 4. Snapshot the model and reload it into a fresh session
//! 5. Show the ring size bounding outstanding examples
//!
//! Key insight: the stream parses ahead into a bounded queue, so training
//! over an arbitrarily large file never holds more than `--ring_size`
//! unconsumed examples at once.
//!
//! Run: cargo run --example stream_learning --release

use rand::prelude::*;

use hopper::{Hopper, LineFileSource, MemorySource};

const TRAIN_PATH: &str = "/tmp/hopper_demo_train.txt";
const MODEL_PATH: &str = "/tmp/hopper_demo_model.json";

fn print_header(title: &str) {
    println!();
    println!("{}", "=".repeat(70));
    println!("  {}", title);
    println!("{}", "=".repeat(70));
}

/// Two separable classes: positives lean on `sunny`/`warm` tokens,
/// negatives on `storm`/`cold`. A few malformed lines are sprinkled in to
/// show the skip-and-continue behavior.
fn generate_training_file(rng: &mut StdRng, lines: usize) -> std::io::Result<Vec<f32>> {
    let mut labels = Vec::with_capacity(lines);
    let mut out = String::new();

    for i in 0..lines {
        if i % 40 == 37 {
            out.push_str("this line is not an example\n");
            continue;
        }
        let label = if rng.gen::<bool>() { 1.0 } else { -1.0 };
        let (a, b) = if label > 0.0 {
            ("sunny", "warm")
        } else {
            ("storm", "cold")
        };
        let noise = rng.gen_range(0..50);
        out.push_str(&format!("{} |w {} {} |x n{}\n", label, a, b, noise));
        labels.push(label);
    }

    std::fs::write(TRAIN_PATH, out)?;
    Ok(labels)
}

fn main() -> hopper::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let mut rng = StdRng::seed_from_u64(7);

    // =========================================================================
    // PHASE 1: TRAINING DATA
    // =========================================================================
    print_header("PHASE 1: Synthetic Training File");

    let labels = generate_training_file(&mut rng, 400)?;
    println!("  wrote {} ({} usable examples)", TRAIN_PATH, labels.len());

    // =========================================================================
    // PHASE 2: STREAMED TRAINING
    // =========================================================================
    print_header("PHASE 2: learn_stream, Pass After Pass");

    let mut session = Hopper::initialize("-b 18 -l 0.2 --ring_size 64")?;
    for pass in 1..=5 {
        // Driven by hand instead of learn_stream so error is measured
        // against the labels we generated.
        session.start_stream(LineFileSource::open(TRAIN_PATH)?)?;
        let mut squared_error = 0.0f32;
        let mut count = 0usize;
        while let Some(handle) = session.next_stream_example()? {
            let score = session.learn(handle)?;
            session.finish_example(handle)?;
            squared_error += (labels[count] - score).powi(2);
            count += 1;
        }
        let summary = session.end_stream()?;
        println!(
            "  pass {}  examples={}  skipped={}  mean squared error={:.4}",
            pass,
            summary.produced,
            summary.skipped,
            squared_error / count as f32
        );
    }

    // =========================================================================
    // PHASE 3: SNAPSHOT AND RELOAD
    // =========================================================================
    print_header("PHASE 3: Model Snapshot");

    session.engine().save(MODEL_PATH)?;
    println!("  saved {}", MODEL_PATH);

    let mut reloaded = Hopper::initialize(&format!("-b 18 -l 0.2 -i {}", MODEL_PATH))?;
    for line in ["|w sunny warm |x n3", "|w storm cold |x n3"] {
        let a = session.read_example(line)?;
        let b = reloaded.read_example(line)?;
        println!(
            "  {:<24} trained={:+.4}  reloaded={:+.4}",
            line,
            session.learn(a)?,
            reloaded.learn(b)?
        );
        session.finish_example(a)?;
        reloaded.finish_example(b)?;
    }

    // =========================================================================
    // PHASE 4: BACKPRESSURE
    // =========================================================================
    print_header("PHASE 4: Ring Size Bounds the Pipeline");

    let records: Vec<String> = (0..200).map(|i| format!("1 |s f{}", i)).collect();
    let mut bounded = Hopper::initialize("-b 18 --ring_size 8")?;
    bounded.start_stream(MemorySource::new(records))?;

    let mut max_outstanding = 0;
    while let Some(handle) = bounded.next_stream_example()? {
        max_outstanding = max_outstanding.max(bounded.live_examples());
        bounded.finish_example(handle)?;
    }
    bounded.end_stream()?;
    println!("  200 records, ring_size 8");
    println!("  max outstanding examples observed: {}", max_outstanding);

    bounded.finish()?;
    session.finish()?;
    reloaded.finish()?;

    std::fs::remove_file(TRAIN_PATH).ok();
    std::fs::remove_file(MODEL_PATH).ok();
    println!();
    println!("  sessions finished cleanly");
    Ok(())
}
