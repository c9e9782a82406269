//! # Antigravity Quota
//!
//! Reads the remaining model quota and credits of a running Antigravity IDE by
//! talking to its local language server.
//!
//! ## Overview
//!
//! - Finds the language server process and its CSRF token from the process table
//! - Probes the process's listening ports for the one serving the Connect API
//! - Fetches `GetUserStatus` and reduces it to credits and per-model quota
//! - Keeps a capped JSON history, recording only when something changed
//! - Rebuilds a change log from that history, or polls in a monitor loop
//!
//! ## Features
//!
//! - `colors` (default): Enables terminal color output via owo-colors

/// HTTPS transport for the language server API
pub mod client;

/// Command-line argument parsing
pub mod cli;

/// Runtime settings and data paths
pub mod config;

/// Language server discovery and port probing
pub mod discovery;

/// Terminal rendering
pub mod display;

/// Discovery errors
pub mod error;

/// Response field extraction with defaults
pub mod extract;

/// History persistence, deltas and change log
pub mod history;

/// Data models for processes, quota and history
pub mod models;

/// Polling loop with reconnection
pub mod monitor;

/// Process table and listening port inspection
pub mod ports;

/// Formatting and time helpers
pub mod utils;
