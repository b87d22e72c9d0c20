//! Host and service status for the status endpoint.

use serde::Serialize;
use std::time::Instant;
use sysinfo::System;

#[derive(Clone, Debug, Serialize)]
pub struct RamStatus {
    pub total_mb: u64,
    pub used_mb: u64,
    pub percent: f32,
}

#[derive(Clone, Debug, Serialize)]
pub struct SystemStatus {
    pub health: String,
    pub backend: String,
    pub backend_ready: bool,
    pub cpu_percent: f32,
    pub ram: RamStatus,
    pub os: String,
    pub uptime_secs: u64,
}

pub struct SystemMonitor {
    sys: System,
    started: Instant,
    backend: String,
    backend_ready: bool,
}

impl SystemMonitor {
    pub fn new(backend: &str) -> Self {
        Self {
            sys: System::new_all(),
            started: Instant::now(),
            backend: backend.to_string(),
            backend_ready: true,
        }
    }

    pub fn set_backend_status(&mut self, backend: &str, ready: bool) {
        self.backend = backend.to_string();
        self.backend_ready = ready;
    }

    pub fn status(&mut self) -> SystemStatus {
        self.sys.refresh_memory();
        self.sys.refresh_cpu_usage();

        let total = self.sys.total_memory();
        let used = self.sys.used_memory();
        let percent = if total == 0 {
            0.0
        } else {
            (used as f32 / total as f32) * 100.0
        };

        SystemStatus {
            health: if self.backend_ready { "ok" } else { "degraded" }.to_string(),
            backend: self.backend.clone(),
            backend_ready: self.backend_ready,
            cpu_percent: self.sys.global_cpu_usage(),
            ram: RamStatus {
                total_mb: total / (1024 * 1024),
                used_mb: used / (1024 * 1024),
                percent,
            },
            os: System::name().unwrap_or_else(|| std::env::consts::OS.to_string()),
            uptime_secs: self.started.elapsed().as_secs(),
        }
    }
}
