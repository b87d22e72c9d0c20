//! demo - synthetic end-to-end run of the sorting pipeline

use anyhow::Result;
use clap::Parser;

use ecosort::config::SortdConfig;
use ecosort::export;
use ecosort::{
    BackendRegistry, ClassCatalog, Engine, InMemoryLogStore, SqliteLogStore, StubBackend,
};

const FRAME_WIDTH: u32 = 640;
const FRAME_HEIGHT: u32 = 480;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Number of synthetic frames to push through the pipeline.
    #[arg(long, default_value_t = 24)]
    frames: u64,
    /// Confidence threshold.
    #[arg(long, default_value_t = 0.75)]
    threshold: f32,
    /// Persist the run to this database instead of memory.
    #[arg(long)]
    db_path: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let catalog = ClassCatalog::new(SortdConfig::default_classes())?;
    let class_ids = catalog.class_ids();

    let store: Box<dyn ecosort::LogStore> = match &args.db_path {
        Some(db_path) => Box::new(SqliteLogStore::open(db_path)?),
        None => Box::new(InMemoryLogStore::new()),
    };
    let mut engine = Engine::with_store(catalog, args.threshold, store)?;

    let mut registry = BackendRegistry::new();
    registry.register(StubBackend::new(class_ids));

    let frame = vec![0u8; (FRAME_WIDTH * FRAME_HEIGHT * 3) as usize];

    println!(
        "pushing {} synthetic frames (threshold {:.2}, session {})",
        args.frames,
        args.threshold,
        engine.session_id()
    );

    for n in 0..args.frames {
        let detections = registry.detect(&frame, FRAME_WIDTH, FRAME_HEIGHT)?;
        let outcome = engine.classify_and_log(&detections, None)?;
        let decision = &outcome.sorting_decision;
        println!(
            "frame {:>3}: {} raw, {} kept -> {:?} ({:?})",
            n,
            detections.len(),
            outcome.detections.len(),
            decision.signal,
            decision.decision
        );
    }

    println!();
    print!("{}", export::render_statistics(&engine.statistics()?));
    Ok(())
}
