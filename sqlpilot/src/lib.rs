// sqlpilot: terminal client for a natural-language-to-SQL backend
// Main library entry point

pub mod api;
pub mod config;
pub mod models;
pub mod render;
pub mod stream;
mod tui;
pub mod utils;

use config::AppConfig;
use log::{error, info};

/// Initialize logging system with dual format (JSON + human-readable)
pub fn init_logging(cfg: &AppConfig, with_stdout: bool) -> anyhow::Result<()> {
    let log_dir = utils::path_resolver::resolve_log_folder(cfg.log_dir.as_deref())?;

    let timestamp = chrono::Utc::now().format("%Y-%m-%d-%H%M%S");

    // JSON log file for structured parsing
    let json_log_file = log_dir.join(format!("sqlpilot-{}.log", timestamp));

    // Human-readable log file (.txt)
    let txt_log_file = log_dir.join(format!("sqlpilot-{}.txt", timestamp));

    // - JSON format to .log file
    // - Human-readable format to .txt file
    // - Optional: human-readable to stdout (disabled for TUI to avoid corrupting the terminal UI)
    let mut dispatch = fern::Dispatch::new().level(cfg.log_filter());

    if with_stdout {
        dispatch = dispatch.chain(
            fern::Dispatch::new()
                .format(move |out, message, record| {
                    let timestamp_local = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
                    let message_str = format!("{}", message);
                    let (phase, step, cleaned_message) =
                        utils::logging::parse_log_metadata(&message_str);
                    let cleaned_message = utils::logging::redact_secrets(&cleaned_message);
                    let txt_line = utils::logging::format_human_readable_log(
                        &timestamp_local.to_string(),
                        record.level(),
                        record.target(),
                        &cleaned_message,
                        phase.as_deref(),
                        step.as_deref(),
                    );
                    out.finish(format_args!("{}", txt_line));
                })
                .chain(std::io::stdout()),
        );
    }

    dispatch = dispatch
        .chain(
            fern::Dispatch::new()
                .format(move |out, message, record| {
                    let timestamp_utc = chrono::Utc::now().to_rfc3339();
                    let message_str = format!("{}", message);
                    let (phase, step, cleaned_message) =
                        utils::logging::parse_log_metadata(&message_str);
                    let cleaned_message = utils::logging::redact_secrets(&cleaned_message);
                    let json_line = utils::logging::format_json_log(
                        &timestamp_utc,
                        record.level(),
                        record.target(),
                        &cleaned_message,
                        phase.as_deref(),
                        step.as_deref(),
                    );
                    out.finish(format_args!("{}\n", json_line));
                })
                .chain(fern::log_file(json_log_file)?),
        )
        .chain(
            fern::Dispatch::new()
                .format(move |out, message, record| {
                    let timestamp_local = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
                    let message_str = format!("{}", message);
                    let (phase, step, cleaned_message) =
                        utils::logging::parse_log_metadata(&message_str);
                    let cleaned_message = utils::logging::redact_secrets(&cleaned_message);
                    let txt_line = utils::logging::format_human_readable_log(
                        &timestamp_local.to_string(),
                        record.level(),
                        record.target(),
                        &cleaned_message,
                        phase.as_deref(),
                        step.as_deref(),
                    );
                    out.finish(format_args!("{}\n", txt_line));
                })
                .chain(fern::log_file(txt_log_file)?),
        );

    dispatch
        .apply()
        .map_err(|e| anyhow::anyhow!("Failed to install logger: {}", e))?;

    info!(
        "[PHASE: initialization] Logging initialized, log directory: {:?}",
        log_dir
    );
    Ok(())
}

/// Interactive terminal client.
pub fn run_tui(cfg: &AppConfig) {
    // Initialize logging (no stdout to avoid corrupting the TUI)
    if let Err(e) = init_logging(cfg, false) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    info!(
        "[PHASE: initialization] sqlpilot starting at {} (backend {})",
        chrono::Utc::now(),
        utils::logging::mask_url_secrets(&cfg.backend_url)
    );

    if let Err(e) = tui::run(cfg) {
        error!("[PHASE: tui] [STEP: fatal] TUI exited with error: {:?}", e);
        eprintln!("sqlpilot error: {}", e);
        std::process::exit(1);
    }
}

/// Non-interactive TUI smoke mode (for automated checks).
/// Renders a single frame into memory and exits.
pub fn run_tui_smoke(cfg: &AppConfig, target: Option<String>) {
    // Initialize logging (no stdout to avoid corrupting the terminal)
    if let Err(e) = init_logging(cfg, false) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    info!(
        "[PHASE: initialization] TUI smoke starting at {}",
        chrono::Utc::now()
    );

    let target = target.as_deref().unwrap_or("select");
    if let Err(e) = tui::smoke(cfg, target) {
        error!(
            "[PHASE: tui] [STEP: smoke] TUI smoke exited with error: {:?}",
            e
        );
        eprintln!("sqlpilot error: {}", e);
        std::process::exit(1);
    }
}

/// Effective configuration as TOML.
pub fn print_config(cfg: &AppConfig) -> anyhow::Result<()> {
    print!("{}", cfg.to_toml()?);
    Ok(())
}
