use anyhow::Result;
use chrono::Local;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use antigravity_quota::cli::{Args, Command, Parsed};
use antigravity_quota::client::{QuotaClient, get_user_status};
use antigravity_quota::config::Settings;
use antigravity_quota::discovery::connect;
use antigravity_quota::display::{
    print_change_log, print_discovery_error, print_history, print_quota, print_save_outcome,
};
use antigravity_quota::history::{HistoryTracker, JsonFileStore, write_raw_response};
use antigravity_quota::monitor::{FINAL_LOG_COUNT, Monitor, SignalTicker};
use antigravity_quota::ports::SystemInspector;

fn setup_logging(debug: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug {
            EnvFilter::new("antigravity_quota=debug")
        } else {
            EnvFilter::new("antigravity_quota=warn")
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn main() -> Result<ExitCode> {
    let args = match Args::parse() {
        Parsed::Run(args) => args,
        Parsed::Usage => return Ok(ExitCode::SUCCESS),
    };
    setup_logging(args.debug);

    let settings = Settings::from_args(&args);
    tracing::debug!(data_dir = %settings.data_dir.display(), "settings resolved");
    let tracker = HistoryTracker::new(JsonFileStore::in_dir(&settings.data_dir));

    match args.command {
        Some(Command::History { count }) => {
            print_history(&tracker.load(), count);
            Ok(ExitCode::SUCCESS)
        }
        Some(Command::Log { count }) => {
            print_change_log(&tracker.change_log(), count);
            Ok(ExitCode::SUCCESS)
        }
        Some(Command::Monitor { interval }) => {
            let interval = Args::monitor_interval(interval);
            println!("🔄 MONITOR MODE: checking every {interval}s (Ctrl+C to stop)");
            println!("   History is only recorded when quota changes\n");

            let inspector = SystemInspector;
            let client = QuotaClient::with_timeout(settings.timeout);
            let mut ticker = SignalTicker::new()?;
            let mut monitor = Monitor::new(
                &inspector,
                &client,
                &tracker,
                Duration::from_secs(interval),
            );
            monitor.run(&mut ticker);
            Ok(ExitCode::SUCCESS)
        }
        None => check_once(&settings, &tracker),
    }
}

fn check_once(settings: &Settings, tracker: &HistoryTracker<JsonFileStore>) -> Result<ExitCode> {
    println!("🔍 Looking for the Antigravity language server...");
    let client = QuotaClient::with_timeout(settings.timeout);
    let conn = match connect(&SystemInspector, &client) {
        Ok(conn) => conn,
        Err(e) => {
            print_discovery_error(&e);
            return Ok(ExitCode::FAILURE);
        }
    };
    println!(
        "✅ Connected: PID {}, port {} (extension port {})",
        conn.pid, conn.port, conn.extension_port
    );

    let Some(data) = get_user_status(&client, conn.port, &conn.csrf_token) else {
        eprintln!("❌ Could not fetch quota from port {}", conn.port);
        return Ok(ExitCode::FAILURE);
    };

    print_quota(&data);

    if settings.raw_dump {
        match write_raw_response(&settings.data_dir, &data, Local::now()) {
            Ok(path) => println!("💾 Raw response: {}", path.display()),
            Err(e) => {
                tracing::warn!(error = %e, "raw dump failed");
                eprintln!("⚠️  Could not write raw response: {e:#}");
            }
        }
    }

    match tracker.save(&data, false) {
        Ok(outcome) => print_save_outcome(&outcome),
        Err(e) => {
            tracing::warn!(error = %e, "history write failed");
            eprintln!("⚠️  Could not save history: {e:#}");
        }
    }
    print_change_log(&tracker.change_log(), FINAL_LOG_COUNT);

    Ok(ExitCode::SUCCESS)
}
