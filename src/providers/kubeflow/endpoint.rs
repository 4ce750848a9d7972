use log::info;
use tokio::process::Command;

use crate::error::{HarnessError, Result};
use crate::providers::command::{capture, render};

const INVERSE_PROXY_CONFIG_MAP: &str = "inverse-proxy-config";
const HOSTED_ENDPOINT_SUFFIX: &str = "googleusercontent.com";

/// Looks up the hosted Pipelines endpoint from the cluster's inverse proxy config map.
///
/// # Errors
///
/// Returns [`HarnessError::EndpointDiscovery`] if `kubectl` fails or its output
/// names no hosted endpoint.
pub async fn discover_endpoint(namespace: &str) -> Result<String> {
    let args: Vec<String> = ["describe", "configmap", INVERSE_PROXY_CONFIG_MAP, "-n", namespace]
        .iter()
        .map(ToString::to_string)
        .collect();
    let rendered = render("kubectl", &args);

    let mut command = Command::new("kubectl");
    command.args(&args);

    let (outcome, stdout) = capture(command, rendered)
        .await
        .map_err(|e| HarnessError::EndpointDiscovery(format!("failed to run kubectl: {e}")))?;

    if !outcome.success() {
        return Err(HarnessError::EndpointDiscovery(format!(
            "`{}` exited with {:?}",
            outcome.command, outcome.code
        )));
    }

    let endpoint = parse_endpoint(&stdout).ok_or_else(|| {
        HarnessError::EndpointDiscovery(format!(
            "no *.{HOSTED_ENDPOINT_SUFFIX} host in config map {INVERSE_PROXY_CONFIG_MAP}"
        ))
    })?;

    info!("Discovered endpoint: {endpoint}");
    Ok(endpoint)
}

fn parse_endpoint(describe_output: &str) -> Option<String> {
    describe_output
        .lines()
        .map(str::trim)
        .find(|line| line.ends_with(HOSTED_ENDPOINT_SUFFIX))
        .map(ToString::to_string)
}
