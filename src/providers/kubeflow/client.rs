use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::{Client, RequestBuilder, Response};
use url::Url;

use super::types::{ApiExperiment, ListExperimentsResponse, ListRunsResponse};
use crate::auth::Token;
use crate::error::{HarnessError, Result};
use crate::providers::types::RunRecord;
use crate::providers::RunStore;

const MAX_RETRIES: u32 = 5;
const RETRY_DELAY_SECONDS: u64 = 5;
const PAGE_SIZE: usize = 100;

/// Client for the Kubeflow Pipelines v1beta1 REST API.
///
/// State is never cached: every call goes to the service, which is the only
/// authority on run status.
pub struct KubeflowClient {
    client: Client,
    api_url: Url,
    token: Option<Token>,
    retry_delay: Duration,
}

impl KubeflowClient {
    /// Creates a client for `endpoint`.
    ///
    /// Hosted endpoints are usually given as a bare hostname; `https://` is
    /// assumed when no scheme is present.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is not a valid URL or the HTTP client
    /// cannot be built.
    pub fn new(endpoint: &str, token: Option<Token>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("kfp-lifecycle/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HarnessError::Config(format!("Failed to create HTTP client: {e}")))?;

        let mut base = if endpoint.contains("://") {
            endpoint.to_string()
        } else {
            format!("https://{endpoint}")
        };
        if !base.ends_with('/') {
            base.push('/');
        }

        let api_url = Url::parse(&base)
            .map_err(|e| HarnessError::Config(format!("Invalid endpoint URL: {e}")))?
            .join("apis/v1beta1/")
            .map_err(|e| HarnessError::Config(format!("Invalid API base URL: {e}")))?;

        Ok(Self {
            client,
            api_url,
            token,
            retry_delay: Duration::from_secs(RETRY_DELAY_SECONDS),
        })
    }

    #[cfg(test)]
    fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.api_url
            .join(path)
            .map_err(|e| HarnessError::Config(format!("Invalid API URL for {path}: {e}")))
    }

    fn auth_request(&self, request: RequestBuilder) -> RequestBuilder {
        if let Some(token) = &self.token {
            request.bearer_auth(token.as_str())
        } else {
            request
        }
    }

    /// Sends a request, retrying on network errors, rate limits and server errors.
    async fn send<F>(&self, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut retry_count = 0;
        loop {
            let request = self.auth_request(build(&self.client));

            let response = match request.send().await {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    if retry_count >= MAX_RETRIES {
                        return Err(e.into());
                    }
                    warn!(
                        "Network error ({e}), retrying in {:?} ({}/{MAX_RETRIES})...",
                        self.retry_delay,
                        retry_count + 1,
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    retry_count += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();

            if status == 429 || status.is_server_error() {
                if retry_count >= MAX_RETRIES {
                    return Err(HarnessError::ApiErrorAfterRetries {
                        status: status.as_u16(),
                        retries: MAX_RETRIES,
                    });
                }

                warn!(
                    "Pipelines API error (status {status}). Waiting {:?} before retry {}/{MAX_RETRIES}...",
                    self.retry_delay,
                    retry_count + 1,
                );

                tokio::time::sleep(self.retry_delay).await;
                retry_count += 1;
                continue;
            }

            if !status.is_success() {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unable to read error response".to_string());
                return Err(HarnessError::ApiError {
                    status: status.as_u16(),
                    message: error_text,
                });
            }

            return Ok(response);
        }
    }

    /// Finds the experiment with the given name, if it exists.
    pub async fn find_experiment(&self, name: &str) -> Result<Option<ApiExperiment>> {
        let url = self.url("experiments")?;
        let filter = serde_json::json!({
            "predicates": [{"key": "name", "op": "EQUALS", "string_value": name}]
        })
        .to_string();

        let response: ListExperimentsResponse = self
            .send(|client| {
                client
                    .get(url.clone())
                    .query(&[("filter", filter.as_str()), ("page_size", "1")])
            })
            .await?
            .json()
            .await?;

        Ok(response
            .experiments
            .into_iter()
            .find(|experiment| experiment.name == name))
    }

    /// Returns the experiment with the given name.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::ExperimentNotFound`] if no such experiment exists.
    pub async fn get_experiment(&self, name: &str) -> Result<ApiExperiment> {
        self.find_experiment(name)
            .await?
            .ok_or_else(|| HarnessError::ExperimentNotFound(name.to_string()))
    }

    /// Lists every run filed under an experiment, following pagination.
    pub async fn list_experiment_runs(&self, experiment_id: &str) -> Result<Vec<RunRecord>> {
        let url = self.url("runs")?;
        let page_size = PAGE_SIZE.to_string();
        let mut runs = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let response: ListRunsResponse = self
                .send(|client| {
                    let mut query = vec![
                        ("resource_reference_key.type", "EXPERIMENT"),
                        ("resource_reference_key.id", experiment_id),
                        ("page_size", page_size.as_str()),
                    ];
                    if let Some(token) = &page_token {
                        query.push(("page_token", token.as_str()));
                    }
                    client.get(url.clone()).query(&query)
                })
                .await?
                .json()
                .await?;

            runs.extend(response.runs.into_iter().map(RunRecord::from));

            match response.next_page_token.filter(|token| !token.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(runs)
    }
}

#[async_trait]
impl RunStore for KubeflowClient {
    /// Runs are found through the experiment named after the pipeline. An
    /// experiment that does not exist yet simply has no runs.
    async fn list_runs(&self, pipeline_name: &str) -> Result<Vec<RunRecord>> {
        match self.get_experiment(pipeline_name).await {
            Ok(experiment) => self.list_experiment_runs(&experiment.id).await,
            Err(HarnessError::ExperimentNotFound(_)) => {
                debug!("No experiment named {pipeline_name} yet");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn delete_run(&self, run_id: &str) -> Result<()> {
        let url = self.url(&format!("runs/{run_id}"))?;
        self.send(|client| client.delete(url.clone())).await?;
        info!("Deleted run {run_id}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::RunStatus;
    use mockito::Matcher;

    #[test]
    fn bare_hostname_gets_https_scheme() {
        let client = KubeflowClient::new("abc-dot-us-central2.pipelines.googleusercontent.com", None)
            .unwrap();
        assert_eq!(
            client.api_url.as_str(),
            "https://abc-dot-us-central2.pipelines.googleusercontent.com/apis/v1beta1/"
        );
    }

    #[test]
    fn explicit_scheme_and_path_are_kept() {
        let client = KubeflowClient::new("http://localhost:8080/pipeline", None).unwrap();
        assert_eq!(
            client.api_url.as_str(),
            "http://localhost:8080/pipeline/apis/v1beta1/"
        );
    }

    #[tokio::test]
    async fn list_runs_resolves_experiment_and_follows_pages() {
        let mut server = mockito::Server::new_async().await;

        let experiments = server
            .mock("GET", "/apis/v1beta1/experiments")
            .match_query(Matcher::Any)
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"experiments": [{"id": "exp-1", "name": "p-1"}], "total_size": 1}"#)
            .create_async()
            .await;

        let first_page = server
            .mock("GET", "/apis/v1beta1/runs")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("resource_reference_key.id".into(), "exp-1".into()),
                Matcher::UrlEncoded("resource_reference_key.type".into(), "EXPERIMENT".into()),
                // The first request carries no page token, so it ends at page_size.
                Matcher::Regex("page_size=100$".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"runs": [{"id": "r-1", "status": "Succeeded"}, {"id": "r-2"}],
                    "next_page_token": "tok"}"#,
            )
            .create_async()
            .await;

        let second_page = server
            .mock("GET", "/apis/v1beta1/runs")
            .match_query(Matcher::UrlEncoded("page_token".into(), "tok".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"runs": [{"id": "r-3", "status": "Failed"}]}"#)
            .create_async()
            .await;

        let client = KubeflowClient::new(&server.url(), Some(Token::from("secret"))).unwrap();
        let runs = client.list_runs("p-1").await.unwrap();

        assert_eq!(
            runs,
            vec![
                RunRecord::new("r-1", RunStatus::Succeeded),
                RunRecord::new("r-2", RunStatus::Pending),
                RunRecord::new("r-3", RunStatus::Failed),
            ]
        );
        experiments.assert_async().await;
        first_page.assert_async().await;
        second_page.assert_async().await;
    }

    #[tokio::test]
    async fn missing_experiment_means_no_runs() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/apis/v1beta1/experiments")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("{}")
            .create_async()
            .await;

        let client = KubeflowClient::new(&server.url(), None).unwrap();

        assert!(client.list_runs("p-1").await.unwrap().is_empty());
        assert!(matches!(
            client.get_experiment("p-1").await.unwrap_err(),
            HarnessError::ExperimentNotFound(name) if name == "p-1"
        ));
    }

    #[tokio::test]
    async fn delete_run_reports_client_errors() {
        let mut server = mockito::Server::new_async().await;
        let deleted = server
            .mock("DELETE", "/apis/v1beta1/runs/r-1")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;
        server
            .mock("DELETE", "/apis/v1beta1/runs/r-404")
            .with_status(404)
            .with_body("run not found")
            .create_async()
            .await;

        let client = KubeflowClient::new(&server.url(), None).unwrap();

        client.delete_run("r-1").await.unwrap();
        deleted.assert_async().await;

        match client.delete_run("r-404").await.unwrap_err() {
            HarnessError::ApiError { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "run not found");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn server_errors_are_retried_then_reported() {
        let mut server = mockito::Server::new_async().await;
        let unavailable = server
            .mock("GET", "/apis/v1beta1/experiments")
            .match_query(Matcher::Any)
            .with_status(503)
            .expect(MAX_RETRIES as usize + 1)
            .create_async()
            .await;

        let client = KubeflowClient::new(&server.url(), None)
            .unwrap()
            .with_retry_delay(Duration::ZERO);

        let err = client.list_runs("p-1").await.unwrap_err();
        assert!(matches!(
            err,
            HarnessError::ApiErrorAfterRetries { status: 503, retries: MAX_RETRIES }
        ));
        unavailable.assert_async().await;
    }
}
