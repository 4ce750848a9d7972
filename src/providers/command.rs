use std::process::Stdio;

use log::{debug, info};
use tokio::process::Command;

use super::types::CommandOutcome;
use crate::error::Result;

/// Renders a command line for logs and error messages.
pub(super) fn render(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs a command to completion with inherited stdio and reports its exit status.
pub(super) async fn run(mut command: Command, rendered: String) -> Result<CommandOutcome> {
    info!("Running: {rendered}");

    let status = command
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await?;

    debug!("`{rendered}` exited with {status}");

    Ok(CommandOutcome {
        command: rendered,
        code: status.code(),
    })
}

/// Runs a command to completion and captures its standard output.
pub(super) async fn capture(mut command: Command, rendered: String) -> Result<(CommandOutcome, String)> {
    debug!("Capturing: {rendered}");

    let output = command
        .stdin(Stdio::null())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .output()
        .await?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();

    Ok((
        CommandOutcome {
            command: rendered,
            code: output.status.code(),
        },
        stdout,
    ))
}
