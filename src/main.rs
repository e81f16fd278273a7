//! churnmap - per-file commit churn for remote git repositories
//!
//! # Usage
//! ```bash
//! churnmap                      # Start server on the default port
//! churnmap --port 9000 --open   # Start on a custom port and open browser
//! churnmap status               # Check if running
//! churnmap kill                 # Stop running instance
//! ```

use std::fs;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::Duration;

use axum::Router;
use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue, header};
use axum::middleware::{self, Next};
use axum::response::Response;
use clap::{Parser, Subcommand};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use churnmap::git::{GitCommandProvider, ResultCache};
use churnmap::routes::{self, AppState};

/// churnmap - report which files of a repository changed in more than one commit
#[derive(Parser)]
#[command(name = "churnmap")]
#[command(about = "Per-file commit churn server for remote git repositories", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Port to run the server on
    #[arg(short, long, default_value = "8282")]
    port: u16,

    /// Directory holding cached results
    #[arg(long, default_value = "./cache")]
    cache_dir: String,

    /// Directory of static assets served at /
    #[arg(long, default_value = "./static")]
    static_dir: String,

    /// Cache entries older than this many days are swept
    #[arg(long, default_value = "7")]
    max_age_days: u64,

    /// Seconds between cache sweeps
    #[arg(long, default_value = "3600")]
    sweep_interval_secs: u64,

    /// Open browser automatically after starting
    #[arg(short, long)]
    open: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check if churnmap is currently running
    Status,
    /// Stop the running churnmap instance
    Kill,
}

/// PID file info stored as JSON
#[derive(serde::Serialize, serde::Deserialize)]
struct PidInfo {
    pid: u32,
    port: u16,
    cache_dir: String,
}

fn get_pid_file_path() -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push("churnmap.pid");
    path
}

fn read_pid_info() -> Option<PidInfo> {
    let path = get_pid_file_path();
    let mut file = fs::File::open(&path).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    serde_json::from_str(&contents).ok()
}

fn write_pid_info(info: &PidInfo) -> anyhow::Result<()> {
    let path = get_pid_file_path();
    let mut file = fs::File::create(&path)?;
    file.write_all(serde_json::to_string(info)?.as_bytes())?;
    Ok(())
}

fn remove_pid_file() {
    let _ = fs::remove_file(get_pid_file_path());
}

#[cfg(unix)]
fn is_process_running(pid: u32) -> bool {
    // On Unix, sending signal 0 checks if process exists
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(windows)]
fn is_process_running(pid: u32) -> bool {
    use std::process::Command;
    // On Windows, check if process exists using tasklist
    Command::new("tasklist")
        .args(&["/FI", &format!("PID eq {}", pid), "/NH"])
        .output()
        .map(|output| {
            let output_str = String::from_utf8_lossy(&output.stdout);
            output_str.contains(&pid.to_string())
        })
        .unwrap_or(false)
}

#[cfg(unix)]
fn kill_process(pid: u32) -> bool {
    unsafe { libc::kill(pid as i32, libc::SIGTERM) == 0 }
}

#[cfg(windows)]
fn kill_process(pid: u32) -> bool {
    use std::process::Command;
    // On Windows, use taskkill
    Command::new("taskkill")
        .args(&["/PID", &pid.to_string(), "/F"])
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

fn handle_status() {
    match read_pid_info() {
        Some(info) => {
            if is_process_running(info.pid) {
                println!("✓ churnmap is running");
                println!("  PID:   {}", info.pid);
                println!("  Cache: {}", info.cache_dir);
                println!("  URL:   http://127.0.0.1:{}", info.port);
            } else {
                println!("✗ churnmap is not running (stale PID file)");
                remove_pid_file();
            }
        }
        None => {
            println!("✗ churnmap is not running");
        }
    }
}

fn handle_kill() {
    match read_pid_info() {
        Some(info) => {
            if is_process_running(info.pid) {
                if kill_process(info.pid) {
                    println!("✓ Stopped churnmap (PID {})", info.pid);
                    remove_pid_file();
                } else {
                    println!("✗ Failed to stop churnmap (PID {})", info.pid);
                }
            } else {
                println!("✗ churnmap is not running (stale PID file)");
                remove_pid_file();
            }
        }
        None => {
            println!("✗ churnmap is not running");
        }
    }
}

/// Disable client and proxy caching on static asset responses.
async fn no_cache(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate, proxy-revalidate, max-age=0"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    headers.insert(
        HeaderName::from_static("surrogate-control"),
        HeaderValue::from_static("no-store"),
    );
    response
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Handle subcommands
    match cli.command {
        Some(Commands::Status) => {
            handle_status();
            return Ok(());
        }
        Some(Commands::Kill) => {
            handle_kill();
            return Ok(());
        }
        None => {}
    }

    // Check if already running
    if let Some(info) = read_pid_info() {
        if is_process_running(info.pid) {
            eprintln!("✗ churnmap is already running (PID {})", info.pid);
            eprintln!("  URL:  http://127.0.0.1:{}", info.port);
            eprintln!();
            eprintln!("Run 'churnmap kill' to stop it first.");
            std::process::exit(1);
        } else {
            remove_pid_file();
        }
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "churnmap=info,warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Open the result cache
    let cache = match ResultCache::open(&cli.cache_dir) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("✗ Failed to open cache directory: {}", e);
            eprintln!("  Path: {}", cli.cache_dir);
            std::process::exit(1);
        }
    };

    let state = AppState::new(cache, GitCommandProvider);

    // Sweep expired entries now, then periodically in the background
    let max_age = Duration::from_secs(cli.max_age_days * 24 * 60 * 60);
    sweep_and_log(&state, max_age);
    {
        let state = state.clone();
        let interval = Duration::from_secs(cli.sweep_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick completes immediately
            loop {
                ticker.tick().await;
                sweep_and_log(&state, max_age);
            }
        });
    }

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Static assets at /, served without caching
    let static_files = Router::new()
        .fallback_service(ServeDir::new(&cli.static_dir))
        .layer(middleware::from_fn(no_cache));

    // Build the router with the API route and static file serving
    let app = Router::new()
        .merge(routes::create_router(state))
        .fallback_service(static_files)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Bind to the port
    let addr = format!("127.0.0.1:{}", cli.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("✗ Failed to bind to port {}: {}", cli.port, e);
            eprintln!("  Try a different port with --port <PORT>");
            std::process::exit(1);
        }
    };

    // Write PID file
    let pid_info = PidInfo {
        pid: std::process::id(),
        port: cli.port,
        cache_dir: cli.cache_dir.clone(),
    };
    write_pid_info(&pid_info)?;

    // Print startup message
    let url = format!("http://127.0.0.1:{}", cli.port);
    println!();
    println!("  ┌─────────────────────────────────────────────┐");
    println!("  │             churnmap  ·  server             │");
    println!("  └─────────────────────────────────────────────┘");
    println!();
    println!("  Cache:  {}", cli.cache_dir);
    println!("  Server: {}", url);
    println!();
    println!("  Commands:");
    println!("    churnmap status  - Check if running");
    println!("    churnmap kill    - Stop the server");
    println!();
    println!("  Press Ctrl+C to stop");
    println!();

    // Open browser if requested
    if cli.open {
        if let Err(e) = open::that(&url) {
            eprintln!("  Warning: Could not open browser: {}", e);
        }
    }

    // Set up graceful shutdown
    let shutdown = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        println!("\n  Shutting down...");
        remove_pid_file();
    };

    // Start the server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

fn sweep_and_log(state: &AppState, max_age: Duration) {
    match state.cache.sweep(max_age) {
        Ok(0) => {}
        Ok(n) => tracing::info!("cache sweep removed {n} expired entries"),
        Err(e) => tracing::warn!("cache sweep failed: {e}"),
    }
}
