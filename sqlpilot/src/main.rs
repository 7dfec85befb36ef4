use sqlpilot::config::AppConfig;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mut cfg = match AppConfig::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("sqlpilot: {}", e);
            std::process::exit(2);
        }
    };

    // One-off backend override: --backend-url=http://host:port
    if let Some(url) = args.iter().find_map(|a| a.strip_prefix("--backend-url=")) {
        cfg.backend_url = url.to_string();
        if let Err(e) = cfg.validate() {
            eprintln!("sqlpilot: {}", e);
            std::process::exit(2);
        }
    }

    // Print the effective configuration (defaults + file + env + flags) and exit.
    if args.iter().any(|a| a == "--print-config") {
        if let Err(e) = sqlpilot::print_config(&cfg) {
            eprintln!("sqlpilot: {}", e);
            std::process::exit(1);
        }
        return;
    }

    // Non-interactive TUI smoke test mode (for automated checks).
    // Renders a single frame for a specific step and exits 0.
    // Usage: --tui-smoke or --tui-smoke=select|connect|artifacts|chat
    if let Some(arg) = args
        .iter()
        .find(|a| a.as_str() == "--tui-smoke" || a.starts_with("--tui-smoke="))
    {
        let target = arg
            .split_once('=')
            .map(|(_, v)| v.to_string())
            .filter(|v| !v.trim().is_empty());
        sqlpilot::run_tui_smoke(&cfg, target);
        return;
    }

    sqlpilot::run_tui(&cfg);
}
