use serial_test::serial;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

use antigravity_quota::cli::{Args, Command, Parsed};
use antigravity_quota::config::Settings;

fn parse(argv: &[&str]) -> Args {
    match Args::parse_from_iter(argv) {
        Parsed::Run(args) => args,
        Parsed::Usage => panic!("usage printed for {argv:?}"),
    }
}

fn clear_env() {
    for key in [
        "AG_QUOTA_DATA_DIR",
        "AG_QUOTA_NO_RAW",
        "AG_QUOTA_TIMEOUT",
        "AG_QUOTA_DEBUG",
    ] {
        unsafe { std::env::remove_var(key) };
    }
}

#[test]
#[serial]
fn env_vars_configure_settings() {
    clear_env();
    let dir = TempDir::new().unwrap();
    unsafe {
        std::env::set_var("AG_QUOTA_DATA_DIR", dir.path());
        std::env::set_var("AG_QUOTA_NO_RAW", "true");
        std::env::set_var("AG_QUOTA_TIMEOUT", "3");
    }

    let args = parse(&["agquota", "log", "5"]);
    assert_eq!(args.command, Some(Command::Log { count: 5 }));
    let settings = Settings::from_args(&args);
    assert_eq!(settings.data_dir, dir.path().to_path_buf());
    assert!(!settings.raw_dump);
    assert_eq!(settings.timeout, Duration::from_secs(3));

    clear_env();
}

#[test]
#[serial]
fn flags_override_env() {
    clear_env();
    unsafe { std::env::set_var("AG_QUOTA_DATA_DIR", "/from/env") };

    let args = parse(&["agquota", "--data-dir", "/from/flag", "--timeout", "0", "history"]);
    let settings = Settings::from_args(&args);
    assert_eq!(settings.data_dir, PathBuf::from("/from/flag"));
    assert_eq!(settings.timeout, Duration::from_secs(1));
    assert!(settings.raw_dump);

    clear_env();
}

#[test]
#[serial]
fn default_data_dir_is_app_specific() {
    clear_env();
    let settings = Settings::from_args(&parse(&["agquota"]));
    assert!(
        settings.data_dir.ends_with("antigravity-quota") || settings.data_dir == PathBuf::from(".")
    );
}
