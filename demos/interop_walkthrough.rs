//! Interop walkthrough: one session, every boundary crossing.
//!
//! Demonstrates the full interchange surface:
//!
//! 1. Initialize a session from an engine option string
//! 2. Hash namespaces and features deterministically
//! 3. Read a text example, learn from it, release it
//! 4. Import/export pre-hashed feature spaces, structured and as bytes
//! 5. Trip every lifecycle guardrail on purpose
//!
//! Key insight: the caller never touches engine memory. Everything crossing
//! the boundary is copied, and every engine-owned record travels as an
//! opaque handle that fails loudly when misused.
//!
//! Run: cargo run --example interop_walkthrough

use hopper::{FeatureSpace, FeatureSpaceSet, Hopper, LearnerEngine};

fn print_header(title: &str) {
    println!();
    println!("{}", "=".repeat(70));
    println!("  {}", title);
    println!("{}", "=".repeat(70));
}

fn print_set(set: &FeatureSpaceSet) {
    for space in set {
        println!("  |{}  ({} features)", space.name, space.len());
        for feature in &space.features {
            println!("      index={:<10} value={}", feature.index, feature.value);
        }
    }
}

fn main() -> hopper::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    // =========================================================================
    // PHASE 1: SESSION SETUP
    // =========================================================================
    print_header("PHASE 1: Initialize (--hash all -q st --noconstant -b 18)");

    let mut session = Hopper::initialize("--hash all -q st --noconstant -b 18")?;
    let opts = session.options();
    println!("  engine:        {}", session.engine().describe());
    println!("  bits:          {} ({} weights)", opts.bits, opts.weight_count());
    println!("  hash mode:     {:?}", opts.hash_mode);
    println!("  quadratic:     {:?}", opts.quadratic);
    println!("  constant term: {}", if opts.noconstant { "off" } else { "on" });

    // =========================================================================
    // PHASE 2: DETERMINISTIC HASHING
    // =========================================================================
    print_header("PHASE 2: Hashing");

    let seed = session.hash_namespace("s");
    println!("  hash_namespace(\"s\")              = {}", seed);
    println!(
        "  hash_feature(\"p^the_man\", seed)  = {}",
        session.hash_feature("p^the_man", seed)
    );
    println!(
        "  hash_feature(\"p^the_man\", seed)  = {}  (same, always)",
        session.hash_feature("p^the_man", seed)
    );
    println!(
        "  hash_feature(\"p^the_man\", 0)     = {}  (default namespace differs)",
        session.hash_feature("p^the_man", 0)
    );

    // =========================================================================
    // PHASE 3: TEXT EXAMPLES
    // =========================================================================
    print_header("PHASE 3: Read, Learn, Release");

    let line = "1 |s p^the_man w^the w^man |t p^un_homme w^un w^homme";
    println!("  line: {:?}", line);
    let example = session.read_example(line)?;

    println!();
    print_set(&session.export_example(example)?);

    println!();
    for pass in 1..=3 {
        let score = session.learn(example)?;
        println!("  pass {}  prediction before update = {:+.4}", pass, score);
    }
    session.finish_example(example)?;
    println!("  released; live examples = {}", session.live_examples());

    // =========================================================================
    // PHASE 4: IMPORT / EXPORT
    // =========================================================================
    print_header("PHASE 4: Pre-hashed Interchange");

    let set = FeatureSpaceSet::from(vec![FeatureSpace::with_features('a', [(5, 1.1)])]);
    let imported = session.import_example(&set)?;

    let bytes = session.export_bytes(imported)?;
    print!("  wire form ({} bytes):", bytes.len());
    for b in &bytes {
        print!(" {:02x}", b);
    }
    println!();

    let copy = session.import_bytes(&bytes)?;
    println!(
        "  decode(encode(x)) == x: {}",
        session.export_example(copy)? == set
    );
    session.finish_example(imported)?;
    session.finish_example(copy)?;

    // =========================================================================
    // PHASE 5: GUARDRAILS
    // =========================================================================
    print_header("PHASE 5: Lifecycle Guardrails");

    let handle = session.read_example("|s once")?;
    session.attach_label(handle, 1.0)?;
    println!("  second label:     {:?}", session.attach_label(handle, 0.0).unwrap_err());
    session.finish_example(handle)?;
    println!("  second release:   {:?}", session.finish_example(handle).unwrap_err());

    let replacement = session.read_example("|s again")?;
    println!("  stale handle:     {:?}", session.learn(handle).unwrap_err());

    if let Err(err) = Hopper::initialize("-b 29") {
        println!("  engine declines:  {:?}", err);
    }

    session.finish_example(replacement)?;
    session.finish()?;
    println!();
    println!("  session finished cleanly");
    Ok(())
}
