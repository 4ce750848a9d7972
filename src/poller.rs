use std::time::Duration;

use log::{debug, info, warn};

use crate::config::PollingSettings;
use crate::error::{HarnessError, Result};
use crate::providers::{RunRecord, RunStatus, RunStore};

/// Decision taken from one snapshot of a pipeline's runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    Polling,
    Succeeded,
    Failed(RunRecord),
}

/// Classifies a snapshot of every run recorded for a pipeline.
///
/// A single failed run anywhere is fatal, even while others are still going.
/// Success needs every run to have succeeded; an empty snapshot has not.
pub fn evaluate(runs: &[RunRecord]) -> PollState {
    if let Some(run) = runs.iter().find(|run| run.status.is_failure()) {
        return PollState::Failed(run.clone());
    }

    if !runs.is_empty() && runs.iter().all(|run| run.status == RunStatus::Succeeded) {
        PollState::Succeeded
    } else {
        PollState::Polling
    }
}

/// Terminal result of waiting on a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Succeeded { runs: usize, polls: u32 },
    Failed { run: RunRecord, polls: u32 },
    TimedOut { polls: u32, waited: Duration },
}

impl PollOutcome {
    pub fn polls(&self) -> u32 {
        match self {
            Self::Succeeded { polls, .. }
            | Self::Failed { polls, .. }
            | Self::TimedOut { polls, .. } => *polls,
        }
    }

    /// Turns anything but success into the matching hard failure.
    pub fn check(self, pipeline_name: &str) -> Result<usize> {
        match self {
            Self::Succeeded { runs, .. } => Ok(runs),
            Self::Failed { run, .. } => Err(HarnessError::RunFailed {
                run_id: run.id,
                status: run.status,
            }),
            Self::TimedOut { polls, waited } => Err(HarnessError::PollTimeout {
                pipeline: pipeline_name.to_string(),
                polls,
                waited,
            }),
        }
    }
}

/// Waits for a pipeline's runs by sleeping and re-reading their state.
#[derive(Debug, Clone, Copy)]
pub struct RunPoller {
    interval: Duration,
    max_polls: u32,
}

impl RunPoller {
    pub fn new(interval: Duration, max_polls: u32) -> Self {
        Self {
            interval,
            max_polls,
        }
    }

    pub fn from_settings(settings: &PollingSettings) -> Self {
        Self::new(settings.interval(), settings.max_polls)
    }

    /// Total sleep across all polls, saturating for absurd settings.
    fn budget(&self) -> Duration {
        self.interval
            .checked_mul(self.max_polls)
            .unwrap_or(Duration::MAX)
    }

    /// Polls until every run succeeded, one run failed, or the budget is spent.
    ///
    /// Each poll sleeps one interval before fetching, so the first result is
    /// never older than the submission that preceded the call.
    ///
    /// # Errors
    ///
    /// Fails only if fetching the runs fails; terminal run states are reported
    /// through [`PollOutcome`].
    pub async fn wait(&self, store: &dyn RunStore, pipeline_name: &str) -> Result<PollOutcome> {
        info!(
            "Waiting for runs of {pipeline_name} (every {:?}, at most {} polls)",
            self.interval, self.max_polls
        );

        for poll in 1..=self.max_polls {
            tokio::time::sleep(self.interval).await;

            let runs = store.list_runs(pipeline_name).await?;
            match evaluate(&runs) {
                PollState::Succeeded => {
                    info!("All {} runs of {pipeline_name} succeeded", runs.len());
                    return Ok(PollOutcome::Succeeded {
                        runs: runs.len(),
                        polls: poll,
                    });
                }
                PollState::Failed(run) => {
                    warn!("Run {} of {pipeline_name} ended as {}", run.id, run.status);
                    return Ok(PollOutcome::Failed { run, polls: poll });
                }
                PollState::Polling => {
                    debug!(
                        "Poll {poll}/{}: {} runs, not all succeeded yet",
                        self.max_polls,
                        runs.len()
                    );
                }
            }
        }

        let waited = self.budget();
        warn!("Gave up on {pipeline_name} after {} polls", self.max_polls);
        Ok(PollOutcome::TimedOut {
            polls: self.max_polls,
            waited,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRunStore;

    fn run(id: &str, status: RunStatus) -> RunRecord {
        RunRecord::new(id, status)
    }

    mod evaluate {
        use super::*;

        #[test]
        fn empty_snapshot_keeps_polling() {
            assert_eq!(evaluate(&[]), PollState::Polling);
        }

        #[test]
        fn single_success_succeeds() {
            assert_eq!(
                evaluate(&[run("r-1", RunStatus::Succeeded)]),
                PollState::Succeeded
            );
        }

        #[test]
        fn success_with_running_keeps_polling() {
            let runs = [run("r-1", RunStatus::Succeeded), run("r-2", RunStatus::Running)];
            assert_eq!(evaluate(&runs), PollState::Polling);
        }

        #[test]
        fn skipped_is_not_success() {
            let runs = [run("r-1", RunStatus::Succeeded), run("r-2", RunStatus::Skipped)];
            assert_eq!(evaluate(&runs), PollState::Polling);
        }

        #[test]
        fn failure_alongside_success_fails() {
            let runs = [run("r-1", RunStatus::Succeeded), run("r-2", RunStatus::Failed)];
            assert_eq!(
                evaluate(&runs),
                PollState::Failed(run("r-2", RunStatus::Failed))
            );
        }

        #[test]
        fn failure_takes_precedence_over_pending_runs() {
            let runs = [
                run("r-1", RunStatus::Running),
                run("r-2", RunStatus::Error),
                run("r-3", RunStatus::Pending),
            ];
            assert_eq!(evaluate(&runs), PollState::Failed(run("r-2", RunStatus::Error)));
        }
    }

    mod wait {
        use super::*;

        fn poller(max_polls: u32) -> RunPoller {
            RunPoller::new(Duration::ZERO, max_polls)
        }

        #[tokio::test]
        async fn succeeds_once_all_runs_succeed() {
            let store = FakeRunStore::scripted(vec![
                vec![],
                vec![run("r-1", RunStatus::Running)],
                vec![run("r-1", RunStatus::Succeeded)],
            ]);

            let outcome = poller(10).wait(&store, "p").await.unwrap();

            assert_eq!(outcome, PollOutcome::Succeeded { runs: 1, polls: 3 });
            assert_eq!(store.list_calls(), 3);
        }

        #[tokio::test]
        async fn fails_immediately_on_failed_run() {
            let store = FakeRunStore::always(vec![
                run("r-1", RunStatus::Succeeded),
                run("r-2", RunStatus::Failed),
            ]);

            let outcome = poller(120).wait(&store, "p").await.unwrap();

            assert_eq!(
                outcome,
                PollOutcome::Failed {
                    run: run("r-2", RunStatus::Failed),
                    polls: 1
                }
            );
            assert_eq!(store.list_calls(), 1, "Should not wait out the budget");
        }

        #[tokio::test]
        async fn times_out_exactly_at_budget() {
            let store = FakeRunStore::always(vec![run("r-1", RunStatus::Running)]);

            let outcome = poller(4).wait(&store, "p").await.unwrap();

            assert!(matches!(outcome, PollOutcome::TimedOut { polls: 4, .. }));
            assert_eq!(store.list_calls(), 4);
        }

        #[tokio::test]
        async fn success_on_last_poll_is_not_a_timeout() {
            let store = FakeRunStore::scripted(vec![
                vec![run("r-1", RunStatus::Running)],
                vec![run("r-1", RunStatus::Running)],
                vec![run("r-1", RunStatus::Succeeded)],
            ]);

            let outcome = poller(3).wait(&store, "p").await.unwrap();
            assert_eq!(outcome, PollOutcome::Succeeded { runs: 1, polls: 3 });
        }

        #[tokio::test]
        async fn empty_run_set_waits_until_timeout() {
            let store = FakeRunStore::always(vec![]);

            let outcome = poller(5).wait(&store, "p").await.unwrap();

            assert!(matches!(outcome, PollOutcome::TimedOut { polls: 5, .. }));
            assert_eq!(store.list_calls(), 5);
        }

        #[tokio::test]
        async fn fetch_errors_propagate() {
            let store = FakeRunStore::always(vec![]);
            store.fail_listing();

            let result = poller(5).wait(&store, "p").await;
            assert!(result.is_err());
            assert_eq!(store.list_calls(), 1);
        }
    }

    mod budget {
        use super::*;

        #[test]
        fn is_interval_times_polls() {
            let poller = RunPoller::new(Duration::from_secs(60), 100);
            assert_eq!(poller.budget(), Duration::from_secs(6000));
        }

        #[test]
        fn saturates_instead_of_overflowing() {
            assert_eq!(RunPoller::new(Duration::MAX, 2).budget(), Duration::MAX);
            assert_eq!(
                RunPoller::new(Duration::from_secs(u64::MAX / 2), u32::MAX).budget(),
                Duration::MAX
            );
        }
    }

    mod check {
        use super::*;

        #[test]
        fn timeout_is_distinct_from_run_failure() {
            let timeout = PollOutcome::TimedOut {
                polls: 120,
                waited: Duration::from_secs(1200),
            }
            .check("p")
            .unwrap_err();
            assert!(matches!(timeout, HarnessError::PollTimeout { polls: 120, .. }));

            let failed = PollOutcome::Failed {
                run: run("r-9", RunStatus::Error),
                polls: 2,
            }
            .check("p")
            .unwrap_err();
            assert!(matches!(
                failed,
                HarnessError::RunFailed { ref run_id, status: RunStatus::Error } if run_id == "r-9"
            ));
        }
    }
}
