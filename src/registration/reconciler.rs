//! Provider registration reconciler
//!
//! Each round lists the subscription's providers, computes the required
//! namespaces that are not `Registered`, issues register calls for those not
//! already `Registering`, waits one poll interval and starts over. The run
//! ends when nothing is pending, the deadline elapses, the caller cancels,
//! or a call fails fatally.
//!
//! Register calls inside a round go out in batches of
//! [`ReconcilePolicy::concurrency`]. A batch always settles completely
//! before its results are looked at; a fatal error stops the run before the
//! next batch is issued. With the default concurrency of 1 the first
//! authorization failure short-circuits every remaining provider.
//!
//! A namespace whose register call exhausts its retries is not attempted
//! again. The run keeps polling until every other namespace has settled and
//! then reports the ones still pending.

use super::retry::{retry_call, RetryError, RetryPolicy};
use super::{pending_providers, state_of, ProviderApi, RegistrationState, RequiredProviderSet};
use crate::error::{ApiError, IncompleteCause, ReconcileError};
use futures::future::join_all;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Tuning for a reconciliation run
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcilePolicy {
    /// Per-call retry policy for transient failures
    pub retry: RetryPolicy,
    /// Wait between issuing registrations and re-querying status
    pub poll_interval: Duration,
    /// Register calls issued at once (minimum 1)
    pub concurrency: usize,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            poll_interval: Duration::from_secs(10),
            concurrency: 1,
        }
    }
}

/// What a successful run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Namespaces this run issued successful register calls for
    pub registered: Vec<String>,
    /// Status queries performed
    pub rounds: u32,
}

/// Drive every namespace in `required` to `Registered`.
///
/// `deadline` and `cancel` are checked around every network call and every
/// poll sleep. No state is cached between invocations.
#[tracing::instrument(skip_all, fields(required = required.len(), concurrency = policy.concurrency))]
pub async fn reconcile<A>(
    api: &A,
    required: &RequiredProviderSet,
    policy: &ReconcilePolicy,
    deadline: Instant,
    cancel: &CancellationToken,
) -> Result<ReconcileReport, ReconcileError>
where
    A: ProviderApi + ?Sized,
{
    let mut report = ReconcileReport::default();
    // nothing has been queried yet, so everything counts as pending
    let mut pending: Vec<String> = required.iter().map(str::to_string).collect();
    // namespaces whose register call hit the retry cap this run
    let mut capped: Vec<String> = Vec::new();

    loop {
        let listed = retry_call(&policy.retry, deadline, cancel, "list resource providers", || {
            api.list_resource_providers()
        })
        .await;
        report.rounds += 1;

        let current = match listed {
            Ok(current) => current,
            Err(err) => return Err(stop_error(err, None, pending)),
        };

        pending = pending_providers(required, &current);
        if pending.is_empty() {
            tracing::info!(
                "All {} required resource providers registered after {} round(s)",
                required.len(),
                report.rounds
            );
            return Ok(report);
        }
        if !capped.is_empty() && pending.iter().all(|ns| capped.contains(ns)) {
            tracing::warn!("Giving up on {} after retries were exhausted", pending.join(", "));
            return Err(ReconcileError::Incomplete {
                pending,
                cause: IncompleteCause::RetriesExhausted,
            });
        }

        let to_register: Vec<&str> = pending
            .iter()
            .map(String::as_str)
            .filter(|ns| !capped.iter().any(|c| c == ns))
            .filter(|ns| state_of(&current, ns) != Some(RegistrationState::Registering))
            .collect();

        tracing::info!(
            "Round {}: {} pending ({}), registering {}",
            report.rounds,
            pending.len(),
            pending.join(", "),
            to_register.len()
        );

        for batch in to_register.chunks(policy.concurrency.max(1)) {
            let results = join_all(batch.iter().map(|ns| {
                let what = format!("register {ns}");
                async move {
                    retry_call(&policy.retry, deadline, cancel, &what, || api.register_provider(ns))
                        .await
                }
            }))
            .await;

            let mut stop: Option<ReconcileError> = None;
            for (ns, result) in batch.iter().zip(results) {
                match result {
                    Ok(()) => {
                        tracing::debug!("Registration requested for {}", ns);
                        report.registered.push(ns.to_string());
                    }
                    Err(RetryError::Exhausted { .. }) => capped.push(ns.to_string()),
                    Err(err) => {
                        // keep the first failure in issue order
                        if stop.is_none() {
                            stop = Some(stop_error(err, Some(ns), pending.clone()));
                        }
                    }
                }
            }

            if let Some(err) = stop {
                tracing::error!("Stopping registration: {}", err);
                return Err(err);
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(ReconcileError::Cancelled { pending });
            }
            _ = tokio::time::sleep_until(deadline) => {
                return Err(ReconcileError::Incomplete {
                    pending,
                    cause: IncompleteCause::DeadlineElapsed,
                });
            }
            _ = tokio::time::sleep(policy.poll_interval) => {}
        }
    }
}

/// Convert a call failure into the error that ends the run.
fn stop_error(err: RetryError, namespace: Option<&str>, pending: Vec<String>) -> ReconcileError {
    match err {
        RetryError::Fatal(api_err) => ReconcileError::from_api(namespace, api_err),
        RetryError::Exhausted { .. } => ReconcileError::Incomplete {
            pending,
            cause: IncompleteCause::RetriesExhausted,
        },
        RetryError::DeadlineElapsed => ReconcileError::Incomplete {
            pending,
            cause: IncompleteCause::DeadlineElapsed,
        },
        RetryError::Cancelled => ReconcileError::Cancelled { pending },
    }
}

/// Ensure `required` is registered unless `skip` is set.
pub async fn ensure_registered<A>(
    api: &A,
    required: &RequiredProviderSet,
    policy: &ReconcilePolicy,
    timeout: Duration,
    cancel: &CancellationToken,
    skip: bool,
) -> Result<ReconcileReport, ReconcileError>
where
    A: ProviderApi + ?Sized,
{
    if skip || required.is_empty() {
        tracing::info!("Skipping resource provider registration");
        return Ok(ReconcileReport::default());
    }
    reconcile(api, required, policy, Instant::now() + timeout, cancel).await
}

/// Fetch the current status and report what would be registered.
pub async fn plan<A>(api: &A, required: &RequiredProviderSet) -> Result<Vec<String>, ApiError>
where
    A: ProviderApi + ?Sized,
{
    let current = api.list_resource_providers().await?;
    Ok(pending_providers(required, &current))
}
