pub mod models;
pub mod services;
pub mod api;

use api::{analyze_text, compare_texts, humanize_batch, humanize_text, AppState};
use models::{HumanizeRequest, Mode, Strategy};

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;

static PROCESS_START: OnceLock<Instant> = OnceLock::new();
static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const USAGE: &str = "Usage:
  humanizeAI humanize (--text <text> | --file <path|->) [--strategy <name>] [--mode standard|ultra] [--variations <n>]
  humanizeAI batch --file <path|->            (one text per non-empty line, at most 10)
  humanizeAI analyze (--text <text> | --file <path|->)
  humanizeAI compare --original <text> --rewritten <text>

Strategies: weighted, diverse, mixed, best, cascade, style_transfer, adaptive
Results are printed as JSON on stdout; logs go to stderr and the log directory.";

fn startup_elapsed_ms() -> u128 {
    PROCESS_START
        .get()
        .map(|t| t.elapsed().as_millis())
        .unwrap_or(0)
}

fn env_flag(name: &str) -> bool {
    matches!(std::env::var(name).as_deref(), Ok("1") | Ok("true") | Ok("TRUE"))
}

/// Initialize logging system with timestamped log files
fn init_logging() {
    let disable_file_log = env_flag("HUMANIZEAI_DISABLE_FILE_LOG");
    let disable_cleanup = env_flag("HUMANIZEAI_DISABLE_LOG_CLEANUP");

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if disable_file_log {
        init_console_only_logging(env_filter);
        info!("File logging disabled via HUMANIZEAI_DISABLE_FILE_LOG");
        return;
    }

    let logs_dir = match std::env::var("HUMANIZEAI_LOG_DIR") {
        Ok(p) if !p.trim().is_empty() => PathBuf::from(p),
        _ => get_logs_dir(),
    };

    if let Err(e) = fs::create_dir_all(&logs_dir) {
        eprintln!("Failed to create logs directory: {}", e);
        init_console_only_logging(env_filter);
        info!("Falling back to console-only logging (log dir not writable)");
        return;
    }

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let log_filename = format!("humanizeAI_{}.log", timestamp);

    // One file per process; writes stay non-blocking.
    let file_appender = rolling::never(&logs_dir, &log_filename);
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(file_guard);

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true);

    #[cfg(debug_assertions)]
    {
        let console_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(console_layer)
            .init();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .init();
    }

    info!("=== HumanizeAI Started ===");
    info!("Log file: {}/{}", logs_dir.display(), log_filename);
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    if !disable_cleanup {
        std::thread::spawn(move || {
            cleanup_old_logs(&logs_dir, 30);
        });
    }
}

fn get_logs_dir() -> PathBuf {
    #[cfg(debug_assertions)]
    {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("logs")
    }

    #[cfg(not(debug_assertions))]
    {
        if let Some(data_dir) = dirs::data_local_dir() {
            return data_dir.join("humanizeAI").join("logs");
        }
        PathBuf::from("logs")
    }
}

fn cleanup_old_logs(logs_dir: &Path, keep: usize) {
    let mut entries: Vec<_> = match fs::read_dir(logs_dir) {
        Ok(rd) => rd.filter_map(|e| e.ok()).collect(),
        Err(_) => return,
    };

    entries.retain(|e| {
        let name = e.file_name().to_string_lossy().to_string();
        name.starts_with("humanizeAI_") && name.ends_with(".log")
    });

    if entries.len() <= keep {
        return;
    }

    entries.sort_by_key(|e| {
        e.metadata()
            .and_then(|m| m.modified())
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
    });

    let remove_count = entries.len().saturating_sub(keep);
    for entry in entries.into_iter().take(remove_count) {
        let _ = fs::remove_file(entry.path());
    }
}

fn init_console_only_logging(env_filter: EnvFilter) {
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(cfg!(debug_assertions))
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .init();
}

fn parse_arg_value(args: &[String], key: &str) -> Option<String> {
    args.iter()
        .position(|a| a == key)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

/// `--text` wins over `--file`; a file path of `-` reads stdin
fn read_input(args: &[String]) -> Result<String, String> {
    if let Some(text) = parse_arg_value(args, "--text") {
        return Ok(text);
    }
    match parse_arg_value(args, "--file").as_deref() {
        Some("-") => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| format!("read stdin failed: {}", e))?;
            Ok(buf)
        }
        Some(path) => fs::read_to_string(path).map_err(|e| format!("read file failed: {}", e)),
        None => Err("missing --text or --file".to_string()),
    }
}

fn build_request(args: &[String], text: String, default_strategy: Strategy) -> Result<HumanizeRequest, String> {
    let strategy = match parse_arg_value(args, "--strategy") {
        Some(name) => Strategy::from_str(&name).ok_or_else(|| format!("unknown strategy: {}", name))?,
        None => default_strategy,
    };
    let mode = match parse_arg_value(args, "--mode") {
        Some(name) => Mode::from_str(&name).ok_or_else(|| format!("unknown mode: {}", name))?,
        None => Mode::default(),
    };
    let max_variations = match parse_arg_value(args, "--variations") {
        Some(v) => v.parse().map_err(|_| format!("invalid --variations: {}", v))?,
        None => 3,
    };
    Ok(HumanizeRequest { text, strategy, mode, max_variations })
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value).map_err(|e| format!("serialize failed: {}", e))?;
    println!("{}", json);
    Ok(())
}

/// Cancel the token on Ctrl-C so in-flight back-end calls are dropped
fn cancel_on_ctrl_c(cancel: &CancellationToken) {
    let cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("[CLI] interrupted; cancelling request");
            cancel.cancel();
        }
    });
}

/// CLI front door
pub async fn run() -> Result<(), String> {
    PROCESS_START.get_or_init(Instant::now);

    let logging_t0 = Instant::now();
    init_logging();
    info!(startup_ms = startup_elapsed_ms(), logging_ms = logging_t0.elapsed().as_millis(), "logging.initialized");

    let args: Vec<String> = std::env::args().collect();
    let Some(command) = args.get(1).map(|s| s.as_str()) else {
        eprintln!("{}", USAGE);
        return Ok(());
    };
    if matches!(command, "-h" | "--help" | "help") {
        eprintln!("{}", USAGE);
        return Ok(());
    }

    let state = AppState::from_default_location()?;
    let default_strategy = state.store().load().map(|c| c.default_strategy).unwrap_or_default();
    let cancel = CancellationToken::new();
    info!("[CLI] command={}", command);

    let result = match command {
        "humanize" => {
            let request = build_request(&args, read_input(&args)?, default_strategy)?;
            cancel_on_ctrl_c(&cancel);
            print_json(&humanize_text(&state, request, &cancel).await?)
        }
        "batch" => {
            let input = read_input(&args)?;
            let requests = input
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(|line| build_request(&args, line.to_string(), default_strategy))
                .collect::<Result<Vec<_>, _>>()?;
            cancel_on_ctrl_c(&cancel);
            print_json(&humanize_batch(&state, requests, &cancel).await?)
        }
        "analyze" => print_json(&analyze_text(&state, &read_input(&args)?)?),
        "compare" => {
            let original = parse_arg_value(&args, "--original").ok_or("missing --original")?;
            let rewritten = parse_arg_value(&args, "--rewritten").ok_or("missing --rewritten")?;
            print_json(&compare_texts(&state, &original, &rewritten)?)
        }
        other => Err(format!("unknown command: {}\n\n{}", other, USAGE)),
    };

    info!(elapsed_ms = startup_elapsed_ms(), "=== HumanizeAI Exited ===");
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_build_request_from_args() {
        let a = args(&["humanizeAI", "humanize", "--strategy", "diverse", "--mode", "ultra", "--variations", "4"]);
        let request = build_request(&a, "hello".to_string(), Strategy::Adaptive).unwrap();
        assert_eq!(request.strategy, Strategy::Diverse);
        assert_eq!(request.mode, Mode::Ultra);
        assert_eq!(request.max_variations, 4);

        let request = build_request(&args(&["humanizeAI", "humanize"]), "hi".to_string(), Strategy::Best).unwrap();
        assert_eq!(request.strategy, Strategy::Best);
        assert_eq!(request.mode, Mode::Standard);
        assert_eq!(request.max_variations, 3);
    }

    #[test]
    fn test_build_request_rejects_bad_values() {
        assert!(build_request(&args(&["x", "--strategy", "nope"]), "t".to_string(), Strategy::Best).is_err());
        assert!(build_request(&args(&["x", "--variations", "many"]), "t".to_string(), Strategy::Best).is_err());
        let err = build_request(&args(&["x", "--mode", "ulta"]), "t".to_string(), Strategy::Best).unwrap_err();
        assert!(err.contains("unknown mode"));
    }

    #[test]
    fn test_read_input_prefers_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.txt");
        fs::write(&path, "from file").unwrap();
        let path = path.to_string_lossy().to_string();

        assert_eq!(read_input(&args(&["x", "--file", &path])).unwrap(), "from file");
        assert_eq!(read_input(&args(&["x", "--text", "inline", "--file", &path])).unwrap(), "inline");
        assert!(read_input(&args(&["x"])).is_err());
    }

    #[test]
    fn test_cleanup_keeps_newest_logs() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            fs::write(dir.path().join(format!("humanizeAI_2024010{}_000000.log", i)), "x").unwrap();
        }
        fs::write(dir.path().join("other.txt"), "keep").unwrap();

        cleanup_old_logs(dir.path(), 2);
        let remaining = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(remaining, 3);
    }
}
