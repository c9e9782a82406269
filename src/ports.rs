//! OS inspection: running processes and the TCP ports a process listens on.

use std::collections::BTreeSet;
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use sysinfo::System;

use crate::models::ProcessRecord;

/// Timeout for external port-listing commands
pub const PORT_LIST_TIMEOUT: Duration = Duration::from_secs(10);

/// The OS facilities discovery depends on.
pub trait ProcessInspector {
    /// All visible processes with their command lines. Empty on failure.
    fn processes(&self) -> Vec<ProcessRecord>;

    /// Distinct listening TCP ports of `pid`, ascending. Empty on failure.
    fn listening_ports(&self, pid: u32) -> Vec<u16>;
}

/// Native process table plus per-platform port listing
#[derive(Debug, Default)]
pub struct SystemInspector;

impl ProcessInspector for SystemInspector {
    fn processes(&self) -> Vec<ProcessRecord> {
        let sys = System::new_all();
        sys.processes()
            .iter()
            .map(|(pid, proc)| ProcessRecord {
                pid: pid.as_u32(),
                name: proc.name().to_string_lossy().into_owned(),
                cmdline: proc
                    .cmd()
                    .iter()
                    .map(|a| a.to_string_lossy())
                    .collect::<Vec<_>>()
                    .join(" "),
            })
            .collect()
    }

    fn listening_ports(&self, pid: u32) -> Vec<u16> {
        let ports = platform_listening_ports(pid);
        tracing::debug!(pid, ?ports, "listening ports");
        ports
    }
}

/// Keep ports in (0, 65535], dedupe and sort.
pub fn normalize_ports<I: IntoIterator<Item = u32>>(raw: I) -> Vec<u16> {
    raw.into_iter()
        .filter(|p| *p > 0 && *p <= u16::MAX as u32)
        .map(|p| p as u16)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(target_os = "linux")]
fn platform_listening_ports(pid: u32) -> Vec<u16> {
    let inodes = socket_inodes(pid);
    if inodes.is_empty() {
        return Vec::new();
    }
    let mut raw = Vec::new();
    for table in ["/proc/net/tcp", "/proc/net/tcp6"] {
        if let Ok(contents) = std::fs::read_to_string(table) {
            raw.extend(parse_proc_net_tcp(&contents, &inodes));
        }
    }
    normalize_ports(raw)
}

/// Socket inodes held open by `pid`, from `/proc/<pid>/fd` links like `socket:[1234]`.
#[cfg(target_os = "linux")]
fn socket_inodes(pid: u32) -> BTreeSet<u64> {
    let mut inodes = BTreeSet::new();
    let Ok(entries) = std::fs::read_dir(format!("/proc/{pid}/fd")) else {
        return inodes;
    };
    for entry in entries.flatten() {
        if let Ok(target) = std::fs::read_link(entry.path()) {
            let target = target.to_string_lossy();
            if let Some(inode) = target
                .strip_prefix("socket:[")
                .and_then(|s| s.strip_suffix(']'))
                .and_then(|s| s.parse::<u64>().ok())
            {
                inodes.insert(inode);
            }
        }
    }
    inodes
}

/// Local ports of LISTEN rows (state `0A`) whose inode is in `inodes`.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_proc_net_tcp(contents: &str, inodes: &BTreeSet<u64>) -> Vec<u32> {
    let mut ports = Vec::new();
    for line in contents.lines().skip(1) {
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.len() < 10 || cols[3] != "0A" {
            continue;
        }
        let Ok(inode) = cols[9].parse::<u64>() else {
            continue;
        };
        if !inodes.contains(&inode) {
            continue;
        }
        if let Some(port) = cols[1]
            .rsplit(':')
            .next()
            .and_then(|hex| u32::from_str_radix(hex, 16).ok())
        {
            ports.push(port);
        }
    }
    ports
}

#[cfg(target_os = "macos")]
fn platform_listening_ports(pid: u32) -> Vec<u16> {
    let pid_arg = pid.to_string();
    let mut cmd = Command::new("lsof");
    cmd.args(["-nP", "-a", "-p", &pid_arg, "-iTCP", "-sTCP:LISTEN", "-Fn"]);
    match run_with_timeout(cmd, PORT_LIST_TIMEOUT) {
        Some(out) => normalize_ports(parse_lsof_names(&out)),
        None => Vec::new(),
    }
}

/// `lsof -Fn` emits `n<addr>:<port>` lines, e.g. `n127.0.0.1:42100` or `n[::1]:42100`.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn parse_lsof_names(output: &str) -> Vec<u32> {
    output
        .lines()
        .filter_map(|l| l.strip_prefix('n'))
        .filter_map(|addr| addr.rsplit(':').next())
        .filter_map(|p| p.trim().parse::<u32>().ok())
        .collect()
}

#[cfg(windows)]
fn platform_listening_ports(pid: u32) -> Vec<u16> {
    let script = format!(
        "[Console]::OutputEncoding = [System.Text.Encoding]::UTF8; \
         $ports = Get-NetTCPConnection -State Listen -OwningProcess {pid} \
         -ErrorAction SilentlyContinue | Select-Object -ExpandProperty LocalPort; \
         if ($ports) {{ $ports | Sort-Object -Unique }}"
    );
    let mut cmd = Command::new("powershell");
    cmd.args(["-NoProfile", "-NonInteractive", "-Command", &script]);
    match run_with_timeout(cmd, PORT_LIST_TIMEOUT) {
        Some(out) => normalize_ports(parse_port_lines(&out)),
        None => Vec::new(),
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
fn platform_listening_ports(_pid: u32) -> Vec<u16> {
    Vec::new()
}

/// One port number per line; anything else is ignored.
#[cfg_attr(not(windows), allow(dead_code))]
fn parse_port_lines(output: &str) -> Vec<u32> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && l.chars().all(|c| c.is_ascii_digit()))
        .filter_map(|l| l.parse::<u32>().ok())
        .collect()
}

/// Run `cmd`, returning stdout when it exits successfully within `timeout`.
///
/// The child is killed on timeout. Output is read after exit, so this is only
/// suitable for commands with small output.
#[cfg_attr(target_os = "linux", allow(dead_code))]
fn run_with_timeout(mut cmd: Command, timeout: Duration) -> Option<String> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| tracing::debug!(error = %e, "failed to spawn port listing"))
        .ok()?;

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                tracing::warn!(?timeout, "port listing timed out");
                let _ = child.kill();
                let _ = child.wait();
                return None;
            }
            Ok(None) => thread::sleep(Duration::from_millis(50)),
            Err(_) => return None,
        }
    };
    if !status.success() {
        return None;
    }

    let mut out = String::new();
    child.stdout.take()?.read_to_string(&mut out).ok()?;
    Some(out)
}
