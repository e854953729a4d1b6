//! Interactive operator menu.
//!
//! Walks the operator through profile, test, transcript label, device
//! address and duration. Invalid input is reported and asked again; nothing
//! here talks to the device except the informational device listing.

use anyhow::Result;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Input, Select};
use tracing::warn;

use crate::channel::DeviceAddress;
use crate::channel::adb::AdbChannel;
use crate::deadline::RunDuration;
use crate::input::{InputError, LogLabel, parse_address, parse_custom_secs};
use crate::orchestrator::RunRequest;
use crate::profile::{Catalog, Profile, TestPlan};
use crate::report;

pub const DURATION_CHOICES: [&str; 3] = ["12 hours", "24 hours", "Custom (seconds)"];
const CUSTOM_DURATION: usize = 2;

/// A fully validated run chosen from the menu.
#[derive(Debug, Clone)]
pub struct RunSelection {
    pub plan: TestPlan,
    pub request: RunRequest,
}

/// Map a duration menu index (and the custom text, for the last entry) to a
/// validated duration.
pub fn duration_choice(index: usize, custom: Option<&str>) -> Result<RunDuration, InputError> {
    match index {
        0 => Ok(RunDuration::TWELVE_HOURS),
        1 => Ok(RunDuration::TWENTY_FOUR_HOURS),
        _ => parse_custom_secs(custom.unwrap_or_default()),
    }
}

/// `None` when the operator chose to exit.
pub fn select_run(
    catalog: &Catalog,
    adb: &AdbChannel,
    default_port: u16,
) -> Result<Option<RunSelection>> {
    let theme = ColorfulTheme::default();
    loop {
        let Some(profile) = pick_profile(&theme, catalog)? else {
            return Ok(None);
        };
        let Some(plan) = pick_test(&theme, profile)? else {
            continue;
        };
        let label = prompt_label(&theme, plan)?;
        show_devices(adb);
        let address = prompt_address(&theme, default_port)?;
        let Some(duration) = pick_duration(&theme)? else {
            continue;
        };

        return Ok(Some(RunSelection {
            plan: plan.clone(),
            request: RunRequest {
                address,
                duration,
                label,
            },
        }));
    }
}

fn pick_profile<'c>(theme: &ColorfulTheme, catalog: &'c Catalog) -> Result<Option<&'c Profile>> {
    let mut items = report::profile_menu_items(catalog);
    items.push("Exit".to_string());
    let index = Select::with_theme(theme)
        .with_prompt("Select a profile")
        .items(&items)
        .default(0)
        .interact()?;
    Ok(catalog.profiles().get(index))
}

fn pick_test<'p>(theme: &ColorfulTheme, profile: &'p Profile) -> Result<Option<&'p TestPlan>> {
    let plans: Vec<&TestPlan> = profile.tests().collect();
    let mut items: Vec<String> = plans
        .iter()
        .map(|plan| format!("{} test", plan.test.title()))
        .collect();
    items.push("Back".to_string());
    let index = Select::with_theme(theme)
        .with_prompt(format!("{}: select a test", profile.title))
        .items(&items)
        .default(0)
        .interact()?;
    Ok(plans.get(index).copied())
}

fn prompt_label(theme: &ColorfulTheme, plan: &TestPlan) -> Result<LogLabel> {
    let default = plan.default_log_label();
    loop {
        let raw: String = Input::with_theme(theme)
            .with_prompt(format!("Transcript label (Enter for {default})"))
            .allow_empty(true)
            .interact_text()?;
        match LogLabel::parse(&raw, &default) {
            Ok(label) => return Ok(label),
            Err(e) => println!("{e}"),
        }
    }
}

fn show_devices(adb: &AdbChannel) {
    match adb.list_devices() {
        Ok(devices) => print!("{}", report::render_devices(&devices)),
        Err(e) => warn!(error = %e, "could not list devices"),
    }
}

fn prompt_address(theme: &ColorfulTheme, default_port: u16) -> Result<DeviceAddress> {
    loop {
        let raw: String = Input::with_theme(theme)
            .with_prompt(format!("Device address (host or host:port, default port {default_port})"))
            .interact_text()?;
        match parse_address(&raw, default_port) {
            Ok(address) => return Ok(address),
            Err(e) => println!("{e}"),
        }
    }
}

fn pick_duration(theme: &ColorfulTheme) -> Result<Option<RunDuration>> {
    let mut items = DURATION_CHOICES.to_vec();
    items.push("Back");
    loop {
        let index = Select::with_theme(theme)
            .with_prompt("Test duration")
            .items(&items)
            .default(0)
            .interact()?;
        if index >= DURATION_CHOICES.len() {
            return Ok(None);
        }
        let custom = if index == CUSTOM_DURATION {
            let raw: String = Input::with_theme(theme)
                .with_prompt("Duration in seconds (max 432000)")
                .allow_empty(true)
                .interact_text()?;
            Some(raw)
        } else {
            None
        };
        match duration_choice(index, custom.as_deref()) {
            Ok(duration) => return Ok(Some(duration)),
            Err(e) => println!("{e}"),
        }
    }
}
