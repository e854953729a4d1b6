//! Operator-facing renderings for the `config`, `profiles` and `devices`
//! commands and the end-of-run summary.

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};

use crate::channel::adb::DeviceEntry;
use crate::config::ProjectConfig;
use crate::orchestrator::RunSummary;
use crate::profile::{Catalog, Profile};

fn push_kv(output: &mut String, key: &str, value: impl fmt::Display) {
    output.push_str(&format!("  {key:<20} {value}\n"));
}

fn config_source_label(config_path: Option<&Path>) -> String {
    config_path
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(defaults, no .stb-soak/config.toml found)".to_string())
}

fn catalog_source_label(config: &ProjectConfig) -> String {
    config
        .profiles
        .file
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(built-in)".to_string())
}

pub fn render_config_human(config: &ProjectConfig, config_path: Option<&Path>) -> String {
    let mut output = String::new();
    output.push_str("ADB\n");
    push_kv(&mut output, "program", &config.adb.program);
    push_kv(&mut output, "port", config.adb.port);
    push_kv(
        &mut output,
        "command_timeout",
        format!("{}s", config.adb.command_timeout_secs),
    );
    push_kv(
        &mut output,
        "connect_timeout",
        format!("{}s", config.adb.connect_timeout_secs),
    );
    push_kv(
        &mut output,
        "settings_timeout",
        format!("{}s", config.adb.settings_timeout_secs),
    );
    output.push('\n');

    let timing = &config.timing;
    output.push_str("Timing\n");
    push_kv(&mut output, "connect_settle", format!("{}s", timing.connect_settle_secs));
    push_kv(&mut output, "standby_poll", format!("{}s", timing.standby_poll_secs));
    push_kv(
        &mut output,
        "reconnect_backoff",
        format!("{}s", timing.reconnect_backoff_secs),
    );
    push_kv(
        &mut output,
        "reconnect_settle",
        format!("{}s", timing.reconnect_settle_secs),
    );
    push_kv(&mut output, "failure_pause", format!("{}s", timing.failure_pause_secs));
    push_kv(
        &mut output,
        "interference_settle",
        format!("{}s", timing.interference_settle_secs),
    );
    output.push('\n');

    output.push_str("Logs\n");
    push_kv(&mut output, "dir", config.logs.dir.display());
    output.push('\n');

    output.push_str("Session\n");
    if config.session.markers.is_empty() {
        push_kv(&mut output, "markers", "(none)");
    } else {
        push_kv(&mut output, "markers", config.session.markers.join(", "));
    }
    output.push('\n');

    output.push_str("Profiles\n");
    push_kv(&mut output, "catalog", catalog_source_label(config));
    output.push('\n');

    output.push_str("Source Path\n");
    push_kv(&mut output, "path", config_source_label(config_path));

    output
}

pub fn render_config_json(config: &ProjectConfig, config_path: Option<&Path>) -> Result<String> {
    let timing = &config.timing;
    let payload = serde_json::json!({
        "adb": {
            "program": &config.adb.program,
            "port": config.adb.port,
            "command_timeout_secs": config.adb.command_timeout_secs,
            "connect_timeout_secs": config.adb.connect_timeout_secs,
            "settings_timeout_secs": config.adb.settings_timeout_secs
        },
        "timing": {
            "connect_settle_secs": timing.connect_settle_secs,
            "standby_poll_secs": timing.standby_poll_secs,
            "reconnect_backoff_secs": timing.reconnect_backoff_secs,
            "reconnect_settle_secs": timing.reconnect_settle_secs,
            "failure_pause_secs": timing.failure_pause_secs,
            "interference_settle_secs": timing.interference_settle_secs
        },
        "logs": {
            "dir": config.logs.dir.display().to_string()
        },
        "session": {
            "markers": &config.session.markers
        },
        "profiles": {
            "file": config.profiles.file.as_ref().map(|p| p.display().to_string())
        },
        "source_path": config_source_label(config_path)
    });

    serde_json::to_string_pretty(&payload).context("failed to serialize config to JSON")
}

fn profile_line(profile: &Profile) -> String {
    let tests: Vec<&str> = profile.tests().map(|plan| plan.test.slug()).collect();
    format!("{} ({}): {}", profile.name, profile.title, tests.join(", "))
}

pub fn render_profiles_human(catalog: &Catalog) -> String {
    let mut output = String::new();
    for profile in catalog.profiles() {
        output.push_str(&profile.title);
        output.push('\n');
        push_kv(&mut output, "name", &profile.name);
        for plan in profile.tests() {
            push_kv(
                &mut output,
                plan.test.slug(),
                format!(
                    "{} steps, initializer {}, reinitializer {}{}",
                    plan.steps.len(),
                    plan.initializer.len(),
                    plan.reinitializer.len(),
                    if plan.check_standby {
                        ""
                    } else {
                        ", no standby check"
                    }
                ),
            );
        }
        output.push('\n');
    }
    output
}

pub fn render_profiles_json(catalog: &Catalog) -> Result<String> {
    let profiles: Vec<serde_json::Value> = catalog
        .profiles()
        .iter()
        .map(|profile| {
            let tests: Vec<serde_json::Value> = profile
                .tests()
                .map(|plan| {
                    serde_json::json!({
                        "test": plan.test.slug(),
                        "title": plan.test.title(),
                        "initializer": plan.initializer.iter().map(|s| s.describe()).collect::<Vec<_>>(),
                        "steps": plan.steps.len(),
                        "reinitializer": plan.reinitializer.iter().map(|s| s.describe()).collect::<Vec<_>>(),
                        "check_standby": plan.check_standby
                    })
                })
                .collect();
            serde_json::json!({
                "name": &profile.name,
                "title": &profile.title,
                "tests": tests
            })
        })
        .collect();

    serde_json::to_string_pretty(&profiles).context("failed to serialize profiles to JSON")
}

/// One line per profile, used as menu items.
pub fn profile_menu_items(catalog: &Catalog) -> Vec<String> {
    catalog.profiles().iter().map(profile_line).collect()
}

pub fn render_devices(devices: &[DeviceEntry]) -> String {
    if devices.is_empty() {
        return "No devices known to the ADB server\n".to_string();
    }
    let mut output = String::from("Devices\n");
    for device in devices {
        match device.host_port() {
            Some((host, port)) => push_kv(
                &mut output,
                &device.serial,
                format!("{} (host {host}, port {port})", device.status),
            ),
            None => push_kv(&mut output, &device.serial, &device.status),
        }
    }
    output
}

pub fn render_summary(summary: &RunSummary, transcript: &Path) -> String {
    let mut output = String::from("Run Summary\n");
    push_kv(&mut output, "loops_completed", summary.loops_completed);
    push_kv(&mut output, "reconnections", summary.reconnections);
    push_kv(&mut output, "elapsed", format!("{}s", summary.elapsed.as_secs()));
    if let Some(reason) = &summary.aborted {
        push_kv(&mut output, "aborted", reason);
    }
    push_kv(&mut output, "transcript", transcript.display());
    output
}
