//! Runtime settings resolved from CLI arguments and environment.

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::Args;

const APP_DIR_NAME: &str = "antigravity-quota";

#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub raw_dump: bool,
    pub timeout: Duration,
}

impl Settings {
    pub fn from_args(args: &Args) -> Self {
        Self {
            data_dir: resolve_data_dir(args.data_dir.as_deref()),
            raw_dump: !args.no_raw,
            timeout: Duration::from_secs(args.timeout_secs.max(1)),
        }
    }
}

/// Explicit directory if non-empty, else `<local data dir>/antigravity-quota`,
/// else the working directory.
pub fn resolve_data_dir(override_dir: Option<&str>) -> PathBuf {
    if let Some(dir) = override_dir.map(str::trim).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    directories::BaseDirs::new()
        .map(|b| b.data_local_dir().join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// `quota_raw_<YYYY-MM-DD_HHMMSS>.json` inside `dir`
pub fn raw_dump_path(dir: &Path, now: DateTime<Local>) -> PathBuf {
    dir.join(format!("quota_raw_{}.json", now.format("%Y-%m-%d_%H%M%S")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_explicit_data_dir_wins() {
        assert_eq!(resolve_data_dir(Some(" /tmp/q ")), PathBuf::from("/tmp/q"));
        assert_ne!(resolve_data_dir(Some("   ")), PathBuf::from(""));
    }

    #[test]
    fn test_raw_dump_name() {
        let now = Local.with_ymd_and_hms(2025, 6, 7, 8, 9, 10).unwrap();
        assert_eq!(
            raw_dump_path(Path::new("/data"), now),
            PathBuf::from("/data/quota_raw_2025-06-07_080910.json")
        );
    }
}
