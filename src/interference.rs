//! HDMI-CEC interference suppression.
//!
//! A connected TV can wake, sleep or switch the box over CEC in the middle
//! of a run. Before the loop starts a fixed batch of settings writes turns
//! CEC off through every mechanism Android 13 and 14 builds expose. Each
//! write is independent and best-effort.

use tracing::debug;

use crate::channel::{ConfigWrite, Session, SettingsNamespace};
use crate::error::RunError;
use crate::events::RunEvent;
use crate::orchestrator::RunContext;

fn setting(namespace: SettingsNamespace, key: &str, value: &str) -> ConfigWrite {
    ConfigWrite::Setting {
        namespace,
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// The writes applied, in order.
pub fn suppression_batch() -> Vec<ConfigWrite> {
    use SettingsNamespace::{Global, Secure, System};

    vec![
        setting(Global, "hdmi_control_enabled", "0"),
        setting(Global, "hdmi_volume_use_cec", "0"),
        setting(Secure, "hdmi_control_enabled", "0"),
        setting(Secure, "hdmi_volume_use_cec", "0"),
        setting(System, "hdmi_control_enabled", "0"),
        ConfigWrite::Property {
            key: "ro.hdmi.device_type".to_string(),
            value: "0".to_string(),
        },
        ConfigWrite::ServiceCommand {
            args: ["hdmi_control", "cec_setting", "--enabled", "false"]
                .map(String::from)
                .to_vec(),
        },
        setting(Global, "hdmi_cec_enabled", "0"),
        setting(Secure, "tv_input_hidden_inputs", "1"),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuppressionReport {
    pub applied: usize,
    pub total: usize,
}

/// Apply [`suppression_batch`], then wait `interference_settle`.
///
/// Individual failures are logged and never abort the run.
pub fn suppress_interference(
    ctx: RunContext<'_>,
    session: &Session,
) -> Result<SuppressionReport, RunError> {
    let batch = suppression_batch();
    ctx.record(RunEvent::InterferenceStarted)?;

    let mut applied = 0;
    for write in &batch {
        let ok = match ctx.channel.apply(session, write) {
            Ok(()) => true,
            Err(e) => {
                debug!(write = %write, error = %e, "interference write failed");
                false
            }
        };
        if ok {
            applied += 1;
        }
        ctx.record(RunEvent::InterferenceWrite {
            write: write.to_string(),
            applied: ok,
        })?;
    }

    let report = SuppressionReport {
        applied,
        total: batch.len(),
    };
    ctx.record(RunEvent::InterferenceSummary {
        applied: report.applied,
        total: report.total,
    })?;
    ctx.clock.sleep(ctx.timing.interference_settle());
    Ok(report)
}
