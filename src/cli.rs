use clap::{CommandFactory, Parser, Subcommand};
use std::convert::Infallible;

pub const DEFAULT_HISTORY_COUNT: usize = 20;
pub const DEFAULT_LOG_COUNT: usize = 50;
pub const DEFAULT_MONITOR_INTERVAL_SECS: u64 = 30;
pub const MIN_MONITOR_INTERVAL_SECS: u64 = 10;

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show the most recent history entries with inline deltas
    #[command(long_flag = "history")]
    History {
        #[arg(default_value_t = DEFAULT_HISTORY_COUNT, value_parser = count_or::<DEFAULT_HISTORY_COUNT>)]
        count: usize,
    },

    /// Show the change log rebuilt from history, last N changes per series
    #[command(short_flag = 'l', long_flag = "log")]
    Log {
        #[arg(default_value_t = DEFAULT_LOG_COUNT, value_parser = count_or::<DEFAULT_LOG_COUNT>)]
        count: usize,
    },

    /// Poll every N seconds and record only when quota changes (Ctrl+C to stop)
    #[command(short_flag = 'm', long_flag = "monitor")]
    Monitor {
        #[arg(
            default_value_t = DEFAULT_MONITOR_INTERVAL_SECS,
            value_parser = secs_or::<DEFAULT_MONITOR_INTERVAL_SECS>
        )]
        interval: u64,
    },
}

/// A count argument; anything that is not a plain number means the default.
fn count_or<const DEFAULT: usize>(s: &str) -> Result<usize, Infallible> {
    Ok(s.trim().parse().unwrap_or(DEFAULT))
}

fn secs_or<const DEFAULT: u64>(s: &str) -> Result<u64, Infallible> {
    Ok(s.trim().parse().unwrap_or(DEFAULT))
}

/// Check the remaining Antigravity quota of the running language server.
///
/// Without a subcommand: discover the server, fetch quota once, record it and
/// print the change log.
#[derive(Parser, Debug)]
#[command(name = "agquota", version)]
pub struct Args {
    /// Directory holding quota_history.json and raw response dumps
    #[arg(long, env = "AG_QUOTA_DATA_DIR", global = true)]
    pub data_dir: Option<String>,

    /// Do not write the raw API response to disk on a single check
    #[arg(long, env = "AG_QUOTA_NO_RAW", global = true)]
    pub no_raw: bool,

    /// HTTP timeout in seconds for calls to the language server
    #[arg(long = "timeout", env = "AG_QUOTA_TIMEOUT", default_value_t = 10, global = true)]
    pub timeout_secs: u64,

    /// Debug logging to stderr
    #[arg(long, env = "AG_QUOTA_DEBUG", global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// What to do after parsing
#[derive(Debug)]
pub enum Parsed {
    Run(Args),
    /// Unrecognized input; usage has been printed
    Usage,
}

impl Args {
    pub fn parse() -> Parsed {
        Self::parse_from_iter(std::env::args_os())
    }

    /// Parse `argv`. `--help`/`--version` exit as usual; any other parse error prints
    /// the error and usage instead of failing.
    pub fn parse_from_iter<I, T>(argv: I) -> Parsed
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        match <Args as Parser>::try_parse_from(argv) {
            Ok(args) => Parsed::Run(args),
            Err(e) => {
                use clap::error::ErrorKind;
                if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                    e.exit();
                }
                let _ = e.print();
                let _ = Args::command().print_help();
                println!();
                Parsed::Usage
            }
        }
    }

    /// Monitor interval with the 10 second floor applied
    pub fn monitor_interval(interval: u64) -> u64 {
        interval.max(MIN_MONITOR_INTERVAL_SECS)
    }
}
