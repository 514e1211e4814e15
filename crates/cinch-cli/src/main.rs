//! `cinch-cli` – the `cinch` binary.
//!
//! 1. Initialises logging (and OTLP export when configured).
//! 2. Loads `~/.cinch/config.toml`, running a short first-run wizard when it
//!    is missing.
//! 3. Boots a device: kernel, settings authority, authorization resolver,
//!    bootstrap supervisor and the configured simulated plugins.
//! 4. Drops into the console until `/quit`, end of input or Ctrl-C.

mod config;
mod console;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use tracing::{error, warn};

use cinch_runtime::{Device, init_tracing};

fn main() {
    let _telemetry = init_tracing("cinch");

    print_banner();

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting the device down …".yellow().bold());
        shutdown_flag.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler");
    }

    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!("  Config loaded from {}", config::config_path().display().to_string().bold());
            cfg
        }
        Ok(None) => run_first_run_wizard(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };

    let device_config = cfg.device_config();
    println!(
        "  Wearer: {}   Entry: {}   Plugins: {}",
        device_config.wearer.as_deref().unwrap_or("<unknown>").bold(),
        device_config.supervisor.entry_context.bold(),
        device_config.plugins.len()
    );
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start the Tokio runtime");
            std::process::exit(1);
        }
    };
    runtime.block_on(async move {
        let device = Device::start(device_config);
        console::run(device, shutdown).await;
    });
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> config::Config {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║        Cinch First-Run Wizard        ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up a device.\n");

    let mut cfg = config::Config::default();

    let wearer = prompt_line("  Wearer identity (leave empty if unknown): ", "");
    if !wearer.is_empty() {
        cfg.wearer = Some(wearer);
    }

    let entry = prompt_line(
        &format!("  Entry component [{}]: ", cfg.bootstrap.entry_context),
        &cfg.bootstrap.entry_context,
    );
    if entry != cfg.bootstrap.entry_context {
        for plugin in cfg.plugins.iter_mut().filter(|p| p.context == cfg.bootstrap.entry_context) {
            plugin.context = entry.clone();
        }
        cfg.bootstrap.entry_context = entry;
    }

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    config::apply_env_overrides(&mut cfg);
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"        _            _    "#.bold().cyan());
    println!("{}", r#"   ___ (_)_ __   ___| |__ "#.bold().cyan());
    println!("{}", r#"  / __|| | '_ \ / __| '_ \"#.bold().cyan());
    println!("{}", r#" | (__ | | | | | (__| | | |"#.bold().cyan());
    println!("{}", r#"  \___||_|_| |_|\___|_| |_|"#.bold().cyan());
    println!();
    println!("  {} {}", "Cinch".bold(), format!("v{}", env!("CARGO_PKG_VERSION")).dimmed());
    println!("  Wearable device control plane");
    println!();
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
