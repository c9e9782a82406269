//! Terminal rendering for quota, history and the change log.
//!
//! Every `render_*` function returns the text so it can be tested; the `print_*`
//! wrappers write it to stdout.

use chrono::{DateTime, Local, Utc};
use serde_json::Value;
use std::env;

#[cfg(feature = "colors")]
use owo_colors::OwoColorize;

use crate::error::DiscoveryError;
use crate::extract::{extract_models, extract_user_info, response_keys};
use crate::history::SaveOutcome;
use crate::models::{ChangeLog, HistoryEntry, ModelDelta};
use crate::utils::{
    format_number, format_optional_number, format_signed_number, format_signed_points,
    format_time_remaining, reset_clock, round1, short_timestamp, truncate_chars,
};

#[derive(Clone, Copy)]
enum Tone {
    Green,
    Yellow,
    Red,
    Cyan,
    Dim,
    Bold,
}

/// Colors on or off; off when `NO_COLOR` is set or the `colors` feature is disabled
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    enabled: bool,
}

impl Palette {
    pub fn detect() -> Self {
        Self {
            enabled: cfg!(feature = "colors") && env::var_os("NO_COLOR").is_none(),
        }
    }

    pub fn plain() -> Self {
        Self { enabled: false }
    }

    fn paint(&self, text: &str, tone: Tone) -> String {
        #[cfg(feature = "colors")]
        if self.enabled {
            return match tone {
                Tone::Green => text.green().to_string(),
                Tone::Yellow => text.yellow().to_string(),
                Tone::Red => text.red().to_string(),
                Tone::Cyan => text.bright_cyan().to_string(),
                Tone::Dim => text.bright_black().to_string(),
                Tone::Bold => text.bold().to_string(),
            };
        }
        let _ = tone;
        text.to_string()
    }

    /// Green for gains, red for losses
    fn signed(&self, text: &str, delta: f64) -> String {
        if delta > 0.0 {
            self.paint(text, Tone::Green)
        } else {
            self.paint(text, Tone::Red)
        }
    }
}

fn rule(width: usize) -> String {
    "─".repeat(width)
}

fn banner(width: usize) -> String {
    "=".repeat(width)
}

fn trend_icon(delta: f64) -> &'static str {
    if delta > 0.0 { "📈" } else { "📉" }
}

/// Status icon and percentage for a remaining fraction
fn quota_cell(fraction: Option<f64>, palette: Palette) -> String {
    let Some(frac) = fraction else {
        return "  N/A".to_string();
    };
    let pct = round1(frac * 100.0);
    let (icon, tone) = if pct >= 50.0 {
        ("🟢", Tone::Green)
    } else if pct >= 30.0 {
        ("🟡", Tone::Yellow)
    } else if pct > 0.0 {
        ("🔴", Tone::Red)
    } else {
        ("⛔", Tone::Red)
    };
    format!("{icon} {}", palette.paint(&format!("{pct:.1}%"), tone))
}

/// Quota table for a raw `GetUserStatus` response.
pub fn render_quota(data: &Value, now: DateTime<Local>, palette: Palette) -> String {
    let mut out = String::new();
    let user = extract_user_info(data);
    let models = extract_models(data);
    let now_utc = now.with_timezone(&Utc);

    out.push_str(&format!("\n{}\n", banner(70)));
    out.push_str(&format!("{}\n", palette.paint("🚀 ANTIGRAVITY QUOTA STATUS", Tone::Bold)));
    out.push_str(&format!("📅 {}\n", now.format("%Y-%m-%d %H:%M:%S")));
    out.push_str(&format!("{}\n", banner(70)));

    out.push_str(&format!("\n👤 User: {} ({})\n", user.name, user.email));
    out.push_str(&format!("⭐ Plan: {}\n", user.plan));
    out.push_str(&format!(
        "💳 Prompt Credits: {} / {}\n",
        format_optional_number(user.prompt_credits),
        format_optional_number(user.monthly_prompt_credits)
    ));
    out.push_str(&format!(
        "🌊 Flow Credits:   {} / {}\n",
        format_optional_number(user.flow_credits),
        format_optional_number(user.monthly_flow_credits)
    ));

    if models.is_empty() {
        out.push_str("\n⚠️  No models found in the response.\n");
        out.push_str(&format!("    Response keys: {:?}\n", response_keys(data)));
    } else {
        out.push_str(&format!("\n{}\n", rule(70)));
        out.push_str(&format!(
            "  {:<35} {:>10} {:>14} {:>10}\n",
            "Model", "Remaining", "Reset (UTC)", "Countdown"
        ));
        out.push_str(&format!("{}\n", rule(70)));
        for m in &models {
            let label = if m.is_recommended {
                format!("{} ⭐", m.label)
            } else {
                m.label.clone()
            };
            let (reset, countdown) = match m.reset_time.as_deref() {
                Some(r) => (reset_clock(r), format_time_remaining(r, now_utc)),
                None => (String::new(), String::new()),
            };
            out.push_str(&format!(
                "  {:<35} {:>10} {:>14} {:>10}\n",
                label,
                quota_cell(m.remaining_fraction, palette),
                reset,
                countdown
            ));
        }
    }

    out.push_str(&format!("\n{}\n", banner(70)));
    out
}

pub fn print_quota(data: &Value) {
    print!("{}", render_quota(data, Local::now(), Palette::detect()));
}

/// Outcome of a history save: deltas, or a first-entry note.
pub fn render_save_outcome(outcome: &SaveOutcome, palette: Palette) -> String {
    let mut out = String::new();
    match outcome {
        SaveOutcome::Unchanged => {
            out.push_str("  ⏸️  Quota unchanged, nothing recorded.\n");
        }
        SaveOutcome::Written { delta, total } => {
            match delta {
                Some(d) => {
                    out.push_str("\n  🔄 CHANGES SINCE LAST CHECK:\n");
                    if let Some(v) = d.prompt_credits {
                        out.push_str(&format!(
                            "     💳 Prompt Credits: {}\n",
                            palette.signed(&format_signed_number(v), v)
                        ));
                    }
                    if let Some(v) = d.flow_credits {
                        out.push_str(&format!(
                            "     🌊 Flow Credits:   {}\n",
                            palette.signed(&format_signed_number(v), v)
                        ));
                    }
                    for (label, change) in &d.models {
                        match change {
                            ModelDelta::New => {
                                out.push_str(&format!("     🆕 {label}: newly listed\n"));
                            }
                            ModelDelta::Points(v) => {
                                let text = format!("{}%", format_signed_points(*v));
                                out.push_str(&format!(
                                    "     {} {label}: {}\n",
                                    trend_icon(*v),
                                    palette.signed(&text, *v)
                                ));
                            }
                        }
                    }
                }
                None if *total <= 1 => {
                    out.push_str("  📝 First entry recorded\n");
                }
                None => {
                    out.push_str("  📝 Recorded (same as the previous entry)\n");
                }
            }
            out.push_str(&format!("  📊 History: {total} entries\n"));
        }
    }
    out
}

pub fn print_save_outcome(outcome: &SaveOutcome) {
    print!("{}", render_save_outcome(outcome, Palette::detect()));
}

/// The last `n` history entries with their stored deltas.
pub fn render_history(entries: &[HistoryEntry], n: usize, palette: Palette) -> String {
    let mut out = String::new();
    if entries.is_empty() {
        out.push_str("\n📭 No quota history yet. Run a check first.\n");
        return out;
    }

    let recent = &entries[entries.len().saturating_sub(n)..];
    out.push_str(&format!("\n{}\n", banner(80)));
    out.push_str(&format!(
        "📊 QUOTA HISTORY (latest {}/{} entries)\n",
        recent.len(),
        entries.len()
    ));
    out.push_str(&format!("{}\n", banner(80)));

    for entry in recent {
        let deltas = entry.deltas.clone().unwrap_or_default();
        let credit = |value: Option<f64>, delta: Option<f64>| {
            let mut s = format_optional_number(value);
            if let Some(d) = delta {
                s.push_str(&format!(" ({})", palette.signed(&format_signed_number(d), d)));
            }
            s
        };
        out.push_str(&format!(
            "\n  [{}] 💳 Prompt:{}  🌊 Flow:{}\n",
            short_timestamp(&entry.timestamp),
            credit(entry.prompt_credits, deltas.prompt_credits),
            credit(entry.flow_credits, deltas.flow_credits)
        ));

        let parts: Vec<String> = entry
            .models
            .iter()
            .filter_map(|m| {
                let frac = m.remaining?;
                let suffix = match deltas.models.get(&m.label) {
                    Some(ModelDelta::Points(d)) => {
                        palette.signed(&format!("({}%)", format_signed_points(*d)), *d)
                    }
                    Some(ModelDelta::New) => palette.paint("(NEW)", Tone::Cyan),
                    None => String::new(),
                };
                Some(format!(
                    "{}:{}%{}",
                    truncate_chars(&m.label, 15),
                    (frac * 100.0).round(),
                    suffix
                ))
            })
            .collect();

        for chunk in parts.chunks(3) {
            out.push_str(&format!("    {}\n", chunk.join(" | ")));
        }
    }

    out.push_str(&format!("\n{}\n", banner(80)));
    out
}

pub fn print_history(entries: &[HistoryEntry], n: usize) {
    print!("{}", render_history(entries, n, Palette::detect()));
}

/// Change log, keeping the last `n` credit changes and the last `n` per model.
pub fn render_change_log(log: &ChangeLog, n: usize, palette: Palette) -> String {
    let mut out = String::new();
    if log.checks < 2 {
        out.push_str("\n📭 At least two checks are needed for a change log.\n");
        return out;
    }

    out.push_str(&format!("\n{}\n", banner(75)));
    out.push_str(&format!("📜 CHANGE LOG (from {} checks)\n", log.checks));
    out.push_str(&format!("{}\n", banner(75)));

    if log.credits.is_empty() {
        out.push_str("\n  💰 Credits: no changes yet\n");
    } else {
        out.push_str(&format!("\n  {}\n", rule(70)));
        out.push_str("  💰 CREDITS:\n");
        out.push_str(&format!("  {}\n", rule(70)));
        let start = log.credits.len().saturating_sub(n);
        for c in &log.credits[start..] {
            out.push_str(&format!(
                "  {} [{}] {}: {} → {} ({})\n",
                trend_icon(c.delta),
                short_timestamp(&c.timestamp),
                c.kind.label(),
                format_number(c.before),
                format_number(c.after),
                palette.signed(&format_signed_number(c.delta), c.delta)
            ));
        }
    }

    if log.models.is_empty() {
        out.push_str("\n  🤖 Models: no changes yet\n");
    } else {
        out.push_str(&format!("\n  {}\n", rule(70)));
        out.push_str("  🤖 MODELS:\n");
        out.push_str(&format!("  {}\n", rule(70)));
        for (label, changes) in &log.models {
            let recent = &changes[changes.len().saturating_sub(n)..];
            let Some(last) = recent.last() else {
                continue;
            };
            let total = round1(recent.iter().map(|c| c.delta).sum::<f64>());
            out.push_str(&format!(
                "\n  ▸ {}  (now: {:.1}%, total change: {}%)\n",
                palette.paint(label, Tone::Bold),
                last.after,
                format_signed_points(total)
            ));
            for c in recent {
                out.push_str(&format!(
                    "    {} [{}] {:.1}% → {:.1}% ({})\n",
                    trend_icon(c.delta),
                    short_timestamp(&c.timestamp),
                    c.before,
                    c.after,
                    palette.signed(&format!("{}%", format_signed_points(c.delta)), c.delta)
                ));
            }
        }
    }

    out.push_str(&format!("\n{}\n", banner(75)));
    out
}

pub fn print_change_log(log: &ChangeLog, n: usize) {
    print!("{}", render_change_log(log, n, Palette::detect()));
}

/// Discovery failure with a hint about what to check.
pub fn render_discovery_error(err: &DiscoveryError, palette: Palette) -> String {
    let mut out = String::new();
    out.push_str(&format!("\n❌ {}\n", palette.paint(&err.to_string(), Tone::Red)));
    match err {
        DiscoveryError::NoProcess => {
            out.push_str("   Make sure that:\n");
            out.push_str("   1. the Antigravity IDE is open\n");
            out.push_str("   2. its language_server process is running\n");
        }
        DiscoveryError::NoListeningPorts { .. } | DiscoveryError::NoWorkingPort { .. } => {
            out.push_str(&format!(
                "   {}\n",
                palette.paint(
                    "The language server may still be starting; try again shortly.",
                    Tone::Dim
                )
            ));
        }
    }
    out
}

pub fn print_discovery_error(err: &DiscoveryError) {
    print!("{}", render_discovery_error(err, Palette::detect()));
}
