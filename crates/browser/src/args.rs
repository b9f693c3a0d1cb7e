//! Launch-argument resolution.
//!
//! Merges the loose request options, engine-variant constraints, and the
//! compiled-in defaults into one immutable [`LaunchPlan`]. Precedence is
//! fixed: explicit process arguments beat top-level options, which beat
//! generated values.

use tempfile::TempDir;
use tracing::debug;

use crate::{
    error::SessionError,
    options::{IgnoreDefaultArgs, LaunchRequest},
    types::EngineVariant,
};

/// Baseline hardening/stability arguments, always prepended before
/// user-supplied arguments unless individually ignored.
pub(crate) const DEFAULT_ARGS: &[&str] =
    &["--no-sandbox", "--enable-logging", "--disable-dev-shm-usage"];

const USER_DATA_DIR_ARG: &str = "--user-data-dir";
const HEADLESS_ARG: &str = "--headless";
const DEBUG_PIPE_ARG: &str = "--remote-debugging-pipe";
const WINDOW_SIZE_ARG: &str = "--window-size=";

/// Fully resolved launch configuration. Immutable once built.
#[derive(Debug)]
pub(crate) struct LaunchPlan {
    pub argv: Vec<String>,
    pub debug_port: u16,
    pub headless: bool,
    pub engine: EngineVariant,
    /// Generated scratch profile directory, owned by the instance until
    /// teardown deletes it. None when the caller supplied a directory.
    pub temp_data_dir: Option<TempDir>,
    pub window_size: Option<(u32, u32)>,
}

/// Build the launch plan for one request, binding remote debugging to the
/// allocated port.
pub(crate) fn build_launch_plan(
    request: &LaunchRequest,
    port: u16,
) -> Result<LaunchPlan, SessionError> {
    let engine = request.engine;
    let mut argv: Vec<String> = Vec::new();

    match &request.ignore_default_args {
        IgnoreDefaultArgs::Keep => argv.extend(DEFAULT_ARGS.iter().map(|a| a.to_string())),
        IgnoreDefaultArgs::All => {},
        IgnoreDefaultArgs::Listed(skip) => argv.extend(
            DEFAULT_ARGS
                .iter()
                .filter(|a| !skip.iter().any(|s| s == *a))
                .map(|a| a.to_string()),
        ),
    }

    argv.extend(request.args.iter().cloned());
    argv.extend(request.passthrough_args());

    // The driver variant cannot run with an explicit profile directory or a
    // debugging pipe, and only supports headless operation.
    let headless = engine == EngineVariant::Driver
        || argv.iter().any(|a| is_headless_arg(a))
        || request.headless.unwrap_or(true);

    let mut temp_data_dir = None;
    match engine {
        EngineVariant::Chromium => {
            let has_dir_arg = argv.iter().any(|a| a.starts_with(USER_DATA_DIR_ARG));
            if !has_dir_arg {
                if let Some(dir) = &request.user_data_dir {
                    argv.push(format!("{USER_DATA_DIR_ARG}={dir}"));
                } else {
                    let dir = tempfile::Builder::new()
                        .prefix("corral-profile-")
                        .tempdir()
                        .map_err(|e| {
                            SessionError::LaunchFailed(format!(
                                "could not create profile directory: {e}"
                            ))
                        })?;
                    argv.push(format!("{USER_DATA_DIR_ARG}={}", dir.path().display()));
                    temp_data_dir = Some(dir);
                }
            }
        },
        EngineVariant::Driver => {
            argv.retain(|a| !a.starts_with(USER_DATA_DIR_ARG) && a != DEBUG_PIPE_ARG);
        },
    }

    argv.push(format!("--remote-debugging-port={port}"));
    if headless && !argv.iter().any(|a| is_headless_arg(a)) {
        argv.push(HEADLESS_ARG.to_string());
    }
    if headless && engine == EngineVariant::Chromium {
        argv.push(DEBUG_PIPE_ARG.to_string());
    }

    let window_size = argv.iter().find_map(|a| parse_window_size(a));

    debug!(?engine, port, headless, args = argv.len(), "launch plan built");

    Ok(LaunchPlan {
        argv,
        debug_port: port,
        headless,
        engine,
        temp_data_dir,
        window_size,
    })
}

fn is_headless_arg(arg: &str) -> bool {
    arg == HEADLESS_ARG || arg.starts_with("--headless=")
}

fn parse_window_size(arg: &str) -> Option<(u32, u32)> {
    let (width, height) = arg.strip_prefix(WINDOW_SIZE_ARG)?.split_once(',')?;
    Some((width.trim().parse().ok()?, height.trim().parse().ok()?))
}
