use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::monitor::SystemMonitor;
use crate::storage::{LogEntry, LogFilter};
use crate::{Category, ClassifiedDetection, Detection, Engine, SortError, SortingDecision};

const MAX_REQUEST_BYTES: usize = 1 << 20;
const DEFAULT_LOG_LIMIT: usize = 100;
const MAX_LOG_LIMIT: usize = 1000;

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    /// Detector backend name reported by `/` and `/system/status`.
    pub backend_name: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8960".to_string(),
            backend_name: "external".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

/// Loopback HTTP server for the classification service.
///
/// The engine is shared with the rest of the daemon behind `Arc<Mutex<_>>`;
/// each request locks it for the duration of one handler.
pub struct ApiServer {
    cfg: ApiConfig,
    engine: Arc<Mutex<Engine>>,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, engine: Arc<Mutex<Engine>>) -> Self {
        Self { cfg, engine }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        if configured_addr.ip().is_loopback() && !addr.ip().is_loopback() {
            return Err(anyhow!(
                "api configured for loopback address '{}', but bound to non-loopback address '{}'",
                configured_addr,
                addr
            ));
        }
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let cfg = self.cfg.clone();
        let engine = self.engine;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, cfg, engine, shutdown_thread) {
                log::error!("classification api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(
    listener: TcpListener,
    cfg: ApiConfig,
    engine: Arc<Mutex<Engine>>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let mut monitor = SystemMonitor::new(&cfg.backend_name);
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, &cfg, &engine, &mut monitor) {
                    log::warn!("classification api request rejected: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

// -------------------- Wire shapes --------------------

#[derive(Debug, Deserialize)]
struct ClassifyRequest {
    detections: Vec<Detection>,
    #[serde(default)]
    threshold: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ClassifyResponse {
    success: bool,
    detections: Vec<ClassifiedDetection>,
    sorting_decision: SortingDecision,
}

#[derive(Debug, Serialize)]
struct LogsResponse {
    logs: Vec<LogEntry>,
    total_count: u64,
}

// -------------------- Routing --------------------

fn handle_connection(
    mut stream: TcpStream,
    cfg: &ApiConfig,
    engine: &Arc<Mutex<Engine>>,
    monitor: &mut SystemMonitor,
) -> Result<()> {
    let peer = stream.peer_addr()?;
    let local = stream.local_addr()?;
    if local.ip().is_loopback() && !peer.ip().is_loopback() {
        write_json_response(&mut stream, 403, r#"{"error":"forbidden"}"#)?;
        return Ok(());
    }

    let request = read_request(&mut stream)?;
    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/") => handle_service_info(&mut stream, cfg, engine),
        ("GET", "/health") => write_json_response(&mut stream, 200, r#"{"status":"ok"}"#),
        ("POST", "/classify") => handle_classify(&mut stream, engine, &request),
        ("GET", "/classes") => handle_classes(&mut stream, engine),
        ("GET", "/logs") => handle_logs(&mut stream, engine, &request),
        ("GET", "/logs/statistics") => handle_statistics(&mut stream, engine),
        ("GET", "/logs/export/csv") => handle_export_csv(&mut stream, engine),
        ("DELETE", "/logs") => handle_clear_logs(&mut stream, engine),
        ("GET", "/system/status") => handle_system_status(&mut stream, monitor),
        (
            _,
            "/" | "/health" | "/classify" | "/classes" | "/logs" | "/logs/statistics"
            | "/logs/export/csv" | "/system/status",
        ) => write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#),
        _ => write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#),
    }
}

fn lock_engine(engine: &Arc<Mutex<Engine>>) -> Result<std::sync::MutexGuard<'_, Engine>> {
    engine.lock().map_err(|_| anyhow!("engine lock poisoned"))
}

fn handle_service_info(
    stream: &mut TcpStream,
    cfg: &ApiConfig,
    engine: &Arc<Mutex<Engine>>,
) -> Result<()> {
    let (session_id, classes) = {
        let engine = lock_engine(engine)?;
        (engine.session_id(), engine.catalog().len())
    };
    let info = json!({
        "name": "ecosort",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "backend": cfg.backend_name,
        "session_id": session_id,
        "classes": classes,
        "endpoints": {
            "classify": "POST /classify",
            "classes": "GET /classes",
            "logs": "GET /logs",
            "statistics": "GET /logs/statistics",
            "export_csv": "GET /logs/export/csv",
            "clear_logs": "DELETE /logs",
            "system_status": "GET /system/status",
        },
    });
    write_response(stream, 200, "application/json", &serde_json::to_vec(&info)?)
}

fn handle_classify(
    stream: &mut TcpStream,
    engine: &Arc<Mutex<Engine>>,
    request: &HttpRequest,
) -> Result<()> {
    let classify: ClassifyRequest = match serde_json::from_slice(&request.body) {
        Ok(classify) => classify,
        Err(err) => {
            let body = json!({"error": "invalid_json", "detail": err.to_string()});
            write_response(stream, 400, "application/json", &serde_json::to_vec(&body)?)?;
            return Ok(());
        }
    };

    let outcome = {
        let mut engine = lock_engine(engine)?;
        engine.classify_and_log(&classify.detections, classify.threshold)
    };

    match outcome {
        Ok(classification) => {
            let response = ClassifyResponse {
                success: true,
                detections: classification.detections,
                sorting_decision: classification.sorting_decision,
            };
            write_response(
                stream,
                200,
                "application/json",
                &serde_json::to_vec(&response)?,
            )
        }
        Err(err) => match err.downcast_ref::<SortError>() {
            Some(sort_err) => {
                // Catalog misses are deployment bugs, not caller mistakes.
                let (status, kind) = if sort_err.is_configuration() {
                    (500, "configuration_error")
                } else {
                    (400, "invalid_input")
                };
                let body = json!({"error": kind, "detail": sort_err.to_string()});
                write_response(stream, status, "application/json", &serde_json::to_vec(&body)?)
            }
            None => {
                write_json_response(stream, 500, r#"{"error":"internal"}"#)?;
                Err(err)
            }
        },
    }
}

fn handle_classes(stream: &mut TcpStream, engine: &Arc<Mutex<Engine>>) -> Result<()> {
    let engine = lock_engine(engine)?;
    let catalog = engine.catalog();
    let body = json!({
        "classes": catalog.entries(),
        "organic": catalog.names_for(Category::Organic),
        "inorganic": catalog.names_for(Category::Inorganic),
        "default_threshold": engine.default_threshold(),
    });
    write_response(stream, 200, "application/json", &serde_json::to_vec(&body)?)
}

fn handle_logs(
    stream: &mut TcpStream,
    engine: &Arc<Mutex<Engine>>,
    request: &HttpRequest,
) -> Result<()> {
    let params = request.query_params();

    let limit = match params.get("limit") {
        None => DEFAULT_LOG_LIMIT,
        Some(raw) => match raw.parse::<usize>() {
            Ok(limit) if (1..=MAX_LOG_LIMIT).contains(&limit) => limit,
            _ => {
                let body = json!({
                    "error": "invalid_input",
                    "detail": format!("limit must be an integer in 1..={}", MAX_LOG_LIMIT),
                });
                write_response(stream, 400, "application/json", &serde_json::to_vec(&body)?)?;
                return Ok(());
            }
        },
    };

    let classes = params.get("class").map(|raw| split_csv(raw)).filter(|list| !list.is_empty());

    let category = match params.get("category") {
        None => None,
        Some(raw) => match raw.parse::<Category>() {
            Ok(category) => Some(category),
            Err(err) => {
                let body = json!({"error": "invalid_input", "detail": err.to_string()});
                write_response(stream, 400, "application/json", &serde_json::to_vec(&body)?)?;
                return Ok(());
            }
        },
    };

    let filter = LogFilter {
        limit: Some(limit),
        classes,
        category,
        ..LogFilter::default()
    };

    let engine = lock_engine(engine)?;
    let response = LogsResponse {
        logs: engine.logs(&filter)?,
        total_count: engine.log_count()?,
    };
    write_response(
        stream,
        200,
        "application/json",
        &serde_json::to_vec(&response)?,
    )
}

fn handle_statistics(stream: &mut TcpStream, engine: &Arc<Mutex<Engine>>) -> Result<()> {
    let stats = lock_engine(engine)?.statistics()?;
    write_response(stream, 200, "application/json", &serde_json::to_vec(&stats)?)
}

fn handle_export_csv(stream: &mut TcpStream, engine: &Arc<Mutex<Engine>>) -> Result<()> {
    let csv = lock_engine(engine)?.export_csv()?;
    write_response(stream, 200, "text/csv", csv.as_bytes())
}

fn handle_clear_logs(stream: &mut TcpStream, engine: &Arc<Mutex<Engine>>) -> Result<()> {
    let session_id = lock_engine(engine)?.clear_logs()?;
    let body = json!({"success": true, "session_id": session_id});
    write_response(stream, 200, "application/json", &serde_json::to_vec(&body)?)
}

fn handle_system_status(stream: &mut TcpStream, monitor: &mut SystemMonitor) -> Result<()> {
    let status = monitor.status();
    write_response(
        stream,
        200,
        "application/json",
        &serde_json::to_vec(&status)?,
    )
}

// -------------------- HTTP plumbing --------------------

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    let header_end = loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("truncated request"));
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&data[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }

    let mut body = data[header_end + 4..].to_vec();
    match headers.get("content-length") {
        Some(raw) => {
            let len: usize = raw
                .parse()
                .map_err(|_| anyhow!("invalid content-length"))?;
            if len > MAX_REQUEST_BYTES {
                return Err(anyhow!("request too large"));
            }
            while body.len() < len {
                let n = stream.read(&mut buf)?;
                if n == 0 {
                    return Err(anyhow!("truncated request body"));
                }
                body.extend_from_slice(&buf[..n]);
            }
            body.truncate(len);
        }
        // No declared length means no body.
        None => body.clear(),
    }

    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        raw_path: raw_path.to_string(),
        body,
    })
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        403 => "HTTP/1.1 403 Forbidden",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    raw_path: String,
    body: Vec<u8>,
}

impl HttpRequest {
    fn query_params(&self) -> HashMap<String, String> {
        let mut params = HashMap::new();
        if let Some(query) = self.raw_path.split('?').nth(1) {
            for pair in query.split('&') {
                if let Some((k, v)) = pair.split_once('=') {
                    params.insert(k.to_string(), v.to_string());
                }
            }
        }
        params
    }
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
