//! sortd - EcoSort classification daemon
//!
//! This daemon:
//! 1. Loads configuration (catalog, threshold, retention, API address)
//! 2. Opens the SQLite-backed detection log
//! 3. Serves the loopback classification API
//! 4. Optionally runs a stub-backend simulation loop that feeds synthetic
//!    frames through detect -> classify -> log
//! 5. Enforces log retention periodically

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ecosort::api::{ApiConfig, ApiServer};
use ecosort::config::SortdConfig;
use ecosort::{BackendRegistry, Engine, SortingSignal, StubBackend};

const SIM_WIDTH: u32 = 640;
const SIM_HEIGHT: u32 = 480;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = SortdConfig::load()?;
    let engine = Engine::open(&cfg)?;

    log::info!("sortd running. writing to {}", cfg.db_path);
    log::info!(
        "catalog: {} classes, default threshold {:.2}, session {}",
        engine.catalog().len(),
        engine.default_threshold(),
        engine.session_id()
    );

    let class_ids = engine.catalog().class_ids();
    let engine = Arc::new(Mutex::new(engine));

    let api_config = ApiConfig {
        addr: cfg.api_addr.clone(),
        backend_name: if cfg.simulate.enabled {
            "stub".to_string()
        } else {
            "external".to_string()
        },
    };
    let api_handle = ApiServer::new(api_config, engine.clone()).spawn()?;
    log::info!("classification api listening on {}", api_handle.addr);

    let running = Arc::new(AtomicBool::new(true));
    let running_handler = running.clone();
    ctrlc::set_handler(move || running_handler.store(false, Ordering::SeqCst))?;

    if cfg.simulate.enabled {
        log::info!("simulate loop enabled at {} fps", cfg.simulate.fps);
        run_simulation(&cfg, class_ids, engine, running)?;
    } else {
        idle_until_shutdown(&cfg, engine, running)?;
    }

    api_handle.stop()?;
    log::info!("sortd shutting down");
    Ok(())
}

fn lock_engine(engine: &Arc<Mutex<Engine>>) -> Result<std::sync::MutexGuard<'_, Engine>> {
    engine.lock().map_err(|_| anyhow!("engine lock poisoned"))
}

/// Synthetic conveyor loop: the stub backend stands in for the external
/// detector so the full pipeline keeps exercising without a camera.
fn run_simulation(
    cfg: &SortdConfig,
    class_ids: Vec<u32>,
    engine: Arc<Mutex<Engine>>,
    running: Arc<AtomicBool>,
) -> Result<()> {
    let mut registry = BackendRegistry::new();
    registry.register(StubBackend::new(class_ids));

    // The stub ignores pixel content; one blank frame is enough.
    let frame = vec![0u8; (SIM_WIDTH * SIM_HEIGHT * 3) as usize];
    let frame_interval = Duration::from_millis(1000 / u64::from(cfg.simulate.fps));

    let mut frames = 0u64;
    let mut logged = 0u64;
    let mut last_signal = SortingSignal::Idle;
    let mut last_prune = Instant::now();
    let mut last_health_log = Instant::now();

    while running.load(Ordering::SeqCst) {
        let detections = registry.detect(&frame, SIM_WIDTH, SIM_HEIGHT)?;
        frames += 1;

        let outcome = { lock_engine(&engine)?.classify_and_log(&detections, None) };
        match outcome {
            Ok(classification) => {
                last_signal = classification.sorting_decision.signal;
                logged += classification.detections.len() as u64;
                log::debug!(
                    "frame #{}: {} detection(s) -> {:?}",
                    frames,
                    classification.detections.len(),
                    last_signal
                );
            }
            Err(err) => log::warn!("frame rejected: {}", err),
        }

        if last_health_log.elapsed() >= Duration::from_secs(5) {
            log::info!(
                "simulate health frames={} logged={} last_signal={:?}",
                frames,
                logged,
                last_signal
            );
            last_health_log = Instant::now();
        }

        if last_prune.elapsed() > Duration::from_secs(10) {
            let removed = lock_engine(&engine)?.prune(cfg.retention)?;
            if removed > 0 {
                log::debug!("pruned {} expired log entries", removed);
            }
            last_prune = Instant::now();
        }

        std::thread::sleep(frame_interval);
    }
    Ok(())
}

fn idle_until_shutdown(
    cfg: &SortdConfig,
    engine: Arc<Mutex<Engine>>,
    running: Arc<AtomicBool>,
) -> Result<()> {
    let mut last_prune = Instant::now();
    while running.load(Ordering::SeqCst) {
        if last_prune.elapsed() > Duration::from_secs(10) {
            let removed = lock_engine(&engine)?.prune(cfg.retention)?;
            if removed > 0 {
                log::debug!("pruned {} expired log entries", removed);
            }
            last_prune = Instant::now();
        }
        std::thread::sleep(Duration::from_millis(200));
    }
    Ok(())
}
