//! Error rendering for the terminal and for `--json` consumers.

use crate::cli::LAST_TIMING;
use crate::demo::control_error_name;

/// Explain a failure in operator terms: what happened, the likely causes,
/// and what to try.
pub fn humanize(err: &eyre::Report) -> String {
    use ptz_core::error::{BuildError, ControlError};

    // Typed errors carry the most context; match them before any string
    // sniffing.
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingLink => {
                "What happened: No link was provided to the console builder.\nLikely causes: The transport failed to open or was not wired into the builder.\nHow to fix: Open the link first and pass it via with_link(...).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. The ptz_config crate documents every field and its range."
            ),
        };
    }

    if let Some(ce) = err.downcast_ref::<ControlError>() {
        if matches!(ce, ControlError::LinkClosed) {
            return "What happened: The link to the camera closed.\nLikely causes: The remote endpoint exited, the network dropped, or the peer crashed mid-session.\nHow to fix: Check the camera endpoint and the transport, then start a new session.".to_string();
        }
        if let ControlError::Tracking(msg) = ce {
            return format!(
                "What happened: Visual tracking stopped ({msg}).\nLikely causes: The target was never discovered, or command dispatch failed mid-track.\nHow to fix: Run self-check, confirm the target name, then restart tracking."
            );
        }
        if let ControlError::State(msg) = ce {
            return format!(
                "What happened: {msg}.\nLikely causes: A phase deadline elapsed before the remote answered, or the run was interrupted.\nHow to fix: Raise the relevant timeout in the config, or retry with a latency closer to the real link."
            );
        }
        return format!(
            "What happened: {ce}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
        );
    }

    // Config and init failures arrive as bare reports; sniff the message
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("config file not found") || lower.contains("read config") {
        return "What happened: The config file could not be read.\nLikely causes: Wrong --config path, or the file is missing.\nHow to fix: Pass --config with a valid path, or drop the flag to run on built-in defaults.".to_string();
    }

    if lower.contains("must be") || lower.contains("invalid config") {
        return format!(
            "What happened: Configuration is invalid ({msg}).\nLikely causes: Out-of-range values in the TOML.\nHow to fix: Edit the TOML config and try again."
        );
    }

    if lower.contains("parse config") || lower.contains("toml") {
        return "What happened: The config file did not parse as TOML.\nLikely causes: A syntax error, or a field with the wrong type.\nHow to fix: Fix the reported line in the TOML and rerun.".to_string();
    }

    let cause = match err.source() {
        Some(src) => format!(" Cause: {src}."),
        None => String::new(),
    };
    format!(
        "What happened: An unexpected error occurred.{cause}\nHow to fix: Re-run with --log-level=debug and check the logs. Original: {msg}"
    )
}

/// Map ControlError (if present) to stable exit codes; other errors return 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    use ptz_core::error::ControlError;
    if let Some(ce) = err.downcast_ref::<ControlError>() {
        return match ce {
            ControlError::LinkClosed => 2,
            ControlError::Link(_) => 3,
            ControlError::Protocol(_) => 4,
            ControlError::Actuator(_) => 5,
            ControlError::Tracking(_) => 6,
            ControlError::State(_) => 7,
            ControlError::Config(_) => 1,
        };
    }
    1
}

/// One-line JSON error object for `--json` mode, with timing details
/// attached where they help diagnose the failure class.
pub fn format_error_json(err: &eyre::Report) -> String {
    use ptz_core::error::ControlError;
    use serde_json::json;

    if let Some(ce) = err.downcast_ref::<ControlError>() {
        let msg = humanize(err);
        let timing = LAST_TIMING.get();
        let reason_name = control_error_name(ce);

        let detail_obj = match ce {
            ControlError::LinkClosed => {
                timing.map(|t| json!({ "pending_ttl_ms": t.pending_ttl_ms }))
            }
            ControlError::State(_) => timing.map(|t| {
                json!({ "confirm_timeout_ms": t.confirm_timeout_ms, "stop_grace_ms": t.stop_grace_ms })
            }),
            _ => None,
        };

        let mut obj = json!({ "reason": reason_name, "message": msg });
        if let (Some(d), Some(map)) = (detail_obj, obj.as_object_mut()) {
            map.insert("details".into(), d);
        }
        return obj.to_string();
    }

    json!({ "reason": "Error", "message": humanize(err) }).to_string()
}
