//! `pseudogps-cli` – Pseudo-GPS command line interface
//!
//! This binary is the entry point for the overhead tracking rig.  It:
//!
//! 1. Checks for `~/.pseudogps/config.toml`; runs a **First-Run Wizard** when
//!    the file is absent.
//! 2. `pseudogps generate` renders printable marker PNGs for the table.
//! 3. `pseudogps track` starts the tracking loop and the station server.
//! 4. Intercepts **Ctrl-C** to publish a `Shutdown` event and exit safely.

mod config;

use colored::Colorize;
use tracing::warn;

use pseudogps_hal::sim::SimCamera;
use pseudogps_middleware::{EventBus, Topic};
use pseudogps_station::StationServer;
use pseudogps_tracker::{Calibration, FixPipeline, SmoothingParams, TrackerLoop};
use pseudogps_types::{Event, EventPayload, GpsError};
use pseudogps_vision::{DetectorParams, marker};

fn main() {
    // ── Structured logging ────────────────────────────────────────────────
    // Initialise tracing-subscriber using RUST_LOG (defaults to "info").
    // Set PSEUDOGPS_LOG_FORMAT=json to emit newline-delimited JSON logs for
    // log aggregators.  User-facing output still uses println! for UX.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    if std::env::var("PSEUDOGPS_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .compact()
            .init();
    }

    print_banner();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let result = match args.first().map(String::as_str) {
        Some("generate") => cmd_generate(&args[1..]),
        Some("track") => cmd_track(&args[1..]),
        Some("help") | None => {
            print_usage();
            Ok(())
        }
        Some(other) => {
            println!("{}: unknown command `{}`\n", "Error".red().bold(), other);
            print_usage();
            std::process::exit(2);
        }
    };

    if let Err(e) = result {
        println!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// generate
// ─────────────────────────────────────────────────────────────────────────────

/// `pseudogps generate [--count N] [--width PX] [--out DIR]`
fn cmd_generate(args: &[String]) -> Result<(), GpsError> {
    let count: u16 = flag_value(args, "--count")
        .map(|v| v.parse().map_err(|_| bad_flag("--count", &v)))
        .transpose()?
        .unwrap_or(10);
    let width: u32 = flag_value(args, "--width")
        .map(|v| v.parse().map_err(|_| bad_flag("--width", &v)))
        .transpose()?
        .unwrap_or(100);
    let out = flag_value(args, "--out").unwrap_or_else(|| "markers".to_string());

    println!(
        "  Generating {} marker(s) at {} px into {} …",
        count.to_string().bold(),
        width,
        out.bold()
    );
    let paths = marker::generate_batch(&out, count, width)?;
    for path in &paths {
        println!("    {} {}", "✓".green(), path.display());
    }
    println!(
        "\n  Done. Print each marker at {} and tape id 1 to the table as the origin.\n",
        "3.5 in / 88.9 mm".bold()
    );
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// track
// ─────────────────────────────────────────────────────────────────────────────

/// `pseudogps track --sim`
fn cmd_track(args: &[String]) -> Result<(), GpsError> {
    let sim = args.iter().any(|a| a == "--sim");
    if !sim {
        return Err(GpsError::Config(
            "no hardware camera driver is built into this binary; run with --sim".to_string(),
        ));
    }

    // ── Config / First-Run Wizard ─────────────────────────────────────────
    let mut cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => run_first_run_wizard(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };
    // PSEUDOGPS_* variables win whether the config came from disk, the
    // wizard, or the defaults.
    config::apply_env_overrides(&mut cfg);

    let bus = EventBus::default();

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let bus_ctrlc = bus.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        let _ = bus_ctrlc.publish_to(
            Topic::SystemAlerts,
            Event::now(
                "pseudogps-cli",
                EventPayload::Shutdown {
                    reason: "operator Ctrl-C".to_string(),
                },
            ),
        );
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    // ── Simulated table ───────────────────────────────────────────────────
    // The origin marker plus two robots, the same layout as the demo rig.
    let camera = SimCamera::new(cfg.frame_width, cfg.frame_height)
        .with_marker(cfg.origin_marker_id, 40, 40, cfg.marker_width_px as u32)
        .with_marker(7, 360, 140, cfg.marker_width_px as u32)
        .with_marker(9, 180, 300, cfg.marker_width_px as u32)
        .build();

    let pipeline = FixPipeline::new(
        DetectorParams::default(),
        Calibration::new(cfg.marker_size_mm, cfg.marker_width_px, cfg.calibration_factor),
        cfg.origin_marker_id,
        SmoothingParams {
            alpha_x: cfg.alpha_x,
            alpha_y: cfg.alpha_y,
        },
    );

    println!(
        "  Station page at {}",
        format!("http://localhost:{}", cfg.station_port).bold().cyan()
    );
    println!("  Press {} to stop.\n", "Ctrl-C".bold());

    // ── Run ───────────────────────────────────────────────────────────────
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| GpsError::Io(format!("failed to start async runtime: {e}")))?;
    runtime.block_on(async {
        let station = StationServer::new(bus.clone()).with_port(cfg.station_port);
        tokio::spawn(async move {
            if let Err(e) = station.run().await {
                warn!(error = %e, "station server failed");
            }
        });

        TrackerLoop::new(Box::new(camera), pipeline, bus.clone(), cfg.rate_hz)
            .run()
            .await;
    });

    println!("{}", "  ✓ Tracker stopped.".green());
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> config::Config {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║     Pseudo-GPS First-Run Wizard      ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up the rig.\n");

    let mut cfg = config::Config::default();

    // Origin marker
    let id_str = prompt_line(
        &format!("  Origin marker id taped to the table [{}]: ", cfg.origin_marker_id),
        &cfg.origin_marker_id.to_string(),
    );
    if let Ok(id) = id_str.trim().parse::<u16>() {
        cfg.origin_marker_id = id;
    }

    // Station port
    let port_str = prompt_line(
        &format!("  Station HTTP/WebSocket port [{}]: ", cfg.station_port),
        &cfg.station_port.to_string(),
    );
    if let Ok(p) = port_str.trim().parse::<u16>() {
        cfg.station_port = p;
    }

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   ___                  __        _______  ___"#.bold().cyan());
    println!("{}", r#"  / _ \___ ___ __ _____/ /__  ___/ ___/ _ \/ __/"#.bold().cyan());
    println!("{}", r#" / ___(_-</ -_) // / _  / _ \/___/ (_ / ___/\ \  "#.bold().cyan());
    println!("{}", r#"/_/  /___/\__/\_,_/\_,_/\___/    \___/_/  /___/  "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Pseudo-GPS".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Overhead camera localisation for table-top robots");
    println!();
}

fn print_usage() {
    println!("  {}", "Usage".bold());
    println!("    pseudogps generate [--count N] [--width PX] [--out DIR]");
    println!("        Render printable marker PNGs (ids 1..=N).");
    println!("    pseudogps track --sim");
    println!("        Run the tracking loop and station server on a simulated table.");
    println!("    pseudogps help");
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Return the value following `flag` in `args`, if present.
fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn bad_flag(flag: &str, value: &str) -> GpsError {
    GpsError::Config(format!("invalid value `{value}` for {flag}"))
}

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_value_finds_following_argument() {
        let args: Vec<String> = ["--count", "20", "--out", "prints"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(flag_value(&args, "--count").as_deref(), Some("20"));
        assert_eq!(flag_value(&args, "--out").as_deref(), Some("prints"));
        assert_eq!(flag_value(&args, "--width"), None);
    }

    #[test]
    fn flag_value_handles_trailing_flag() {
        let args: Vec<String> = vec!["--count".to_string()];
        assert_eq!(flag_value(&args, "--count"), None);
    }

    #[test]
    fn track_without_sim_reports_missing_driver() {
        // No hardware driver exists yet; the check fires before any config
        // or terminal interaction.
        let result = cmd_track(&[]);
        assert!(matches!(result, Err(GpsError::Config(_))));
    }

    #[test]
    fn generate_rejects_bad_count() {
        let args: Vec<String> = ["--count", "many"].iter().map(|s| s.to_string()).collect();
        assert!(matches!(cmd_generate(&args), Err(GpsError::Config(_))));
    }
}
