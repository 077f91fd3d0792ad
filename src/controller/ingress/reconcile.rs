use crate::config::IngressConfig;
use crate::controller::clock::{Clock, SystemClock};
use crate::controller::ingress::deployment::determine_deployment_mode;
use crate::controller::services::{DefaultDomainService, DefaultPathService};
use crate::controller::store::{StoreError, Stores};
use crate::controller::strategies::{mark_not_ready, reasons, StrategyError, StrategyFactory};
use crate::crd::inference_service::{
    condition_types, Condition, ConditionStatus, InferenceService,
};
use kube::runtime::controller::Action;
use kube::ResourceExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Requeue interval after a successful pass
pub const DEFAULT_REQUEUE_SECONDS: u64 = 300;

/// Requeue interval after a failed pass
const ERROR_REQUEUE_SECONDS: u64 = 10;

/// Metric label used when no strategy was selected
const NO_STRATEGY: &str = "none";

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("InferenceService missing namespace")]
    MissingNamespace,

    #[error("Strategy reconciliation failed: {0}")]
    StrategyError(#[from] StrategyError),

    #[error("Status update failed: {0}")]
    StoreError(#[from] StoreError),
}

pub struct Context {
    pub stores: Stores,
    /// Base config; per-service annotations are applied on each pass
    pub ingress_config: IngressConfig,
    pub factory: StrategyFactory,
    pub clock: Arc<dyn Clock>,
    /// Namespace holding the serving domain ConfigMap
    pub system_namespace: String,
    pub requeue_after: Duration,
    /// When Some, records reconciliation counts and durations
    pub metrics: Option<crate::server::SharedMetrics>,
}

impl Context {
    pub fn new(
        stores: Stores,
        ingress_config: IngressConfig,
        system_namespace: String,
        requeue_after: Duration,
        metrics: Option<crate::server::SharedMetrics>,
    ) -> Self {
        Context {
            stores,
            ingress_config,
            factory: StrategyFactory::new(
                Arc::new(DefaultDomainService),
                Arc::new(DefaultPathService),
            ),
            clock: Arc::new(SystemClock),
            system_namespace,
            requeue_after,
            metrics,
        }
    }

    /// Context over in-memory stores with a frozen clock
    #[cfg(test)]
    pub fn new_mock(stores: Stores, ingress_config: IngressConfig) -> Self {
        Context {
            clock: Arc::new(crate::controller::clock::MockClock::fixed()),
            ..Self::new(
                stores,
                ingress_config,
                crate::config::DEFAULT_SYSTEM_NAMESPACE.to_string(),
                Duration::from_secs(DEFAULT_REQUEUE_SECONDS),
                None,
            )
        }
    }
}

/// Reconcile an InferenceService's ingress
///
/// 1. Works out the deployment mode and the effective config
/// 2. Short-circuits when ingress creation is disabled
/// 3. Hands the service to the strategy for its mode
/// 4. Merge-patches `url`, `address` and conditions when they changed
///
/// User-correctable failures are written to `IngressReady` before the error
/// is returned; transient store failures are only returned.
pub async fn reconcile(
    isvc: Arc<InferenceService>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let start_time = Instant::now();

    let namespace = isvc.namespace().ok_or(ReconcileError::MissingNamespace)?;
    let name = isvc.name_any();

    // Children go with the owner; nothing to write for a service being deleted
    if isvc.metadata.deletion_timestamp.is_some() {
        debug!(isvc = ?name, namespace = %namespace, "InferenceService is being deleted, skipping");
        return Ok(Action::await_change());
    }

    let mode = determine_deployment_mode(&isvc);
    let config = ctx.ingress_config.resolve(isvc.annotations());
    info!(isvc = ?name, namespace = %namespace, mode = %mode, "Reconciling InferenceService ingress");

    let mut desired = (*isvc).clone();

    let (strategy_name, result) = if config.disable_ingress_creation {
        debug!(isvc = ?name, "Ingress creation disabled");
        desired.set_condition(
            Condition::new(condition_types::INGRESS_READY, ConditionStatus::True)
                .with_reason(reasons::INGRESS_DISABLED)
                .with_message("Ingress creation is disabled, using external service for access"),
            &ctx.clock.now_rfc3339(),
        );
        (NO_STRATEGY, Ok(()))
    } else {
        match ctx.factory.create(mode, &config) {
            Ok(strategy) => {
                info!(isvc = ?name, strategy = strategy.name(), "Selected ingress strategy");
                (strategy.name(), strategy.reconcile(&mut desired, &ctx).await)
            }
            Err(e) => (NO_STRATEGY, Err(e)),
        }
    };

    let duration_secs = start_time.elapsed().as_secs_f64();

    if let Err(err) = result {
        // Only user-fixable errors reach the status; the rest are retried
        if let Some(reason) = err.user_reason() {
            warn!(isvc = ?name, reason = reason, error = %err, "Ingress reconcile failed");
            mark_not_ready(
                &mut desired,
                &ctx,
                ConditionStatus::False,
                reason,
                Some(err.to_string()),
            );
            patch_status_if_changed(&isvc, &desired, &ctx, &namespace).await?;
        }
        if let Some(ref metrics) = ctx.metrics {
            metrics.record_reconciliation_error(strategy_name, duration_secs);
        }
        return Err(err.into());
    }

    patch_status_if_changed(&isvc, &desired, &ctx, &namespace).await?;

    if let Some(ref metrics) = ctx.metrics {
        metrics.record_reconciliation_success(strategy_name, duration_secs);
    }

    Ok(Action::requeue(ctx.requeue_after))
}

/// Write `url`, `address` and conditions when any of them moved. Nulls in
/// the merge patch clear fields the strategy removed.
async fn patch_status_if_changed(
    current: &InferenceService,
    desired: &InferenceService,
    ctx: &Context,
    namespace: &str,
) -> Result<(), StoreError> {
    let before = current.status.clone().unwrap_or_default();
    let after = desired.status.clone().unwrap_or_default();
    if before.url == after.url
        && before.address == after.address
        && before.conditions == after.conditions
    {
        debug!(isvc = ?current.metadata.name, "Status unchanged, skipping update");
        return Ok(());
    }

    let patch = serde_json::json!({
        "conditions": after.conditions,
        "url": after.url,
        "address": after.address,
    });
    ctx.stores
        .inference_services
        .patch_status(namespace, &current.name_any(), &patch)
        .await?;
    info!(isvc = ?current.metadata.name, url = ?after.url, "InferenceService status updated");
    Ok(())
}

/// Error policy for the controller
///
/// Errors are expected to clear on retry, so they are logged with `warn!`
/// and the object is requeued after a short delay.
pub fn error_policy(
    isvc: Arc<InferenceService>,
    error: &ReconcileError,
    ctx: Arc<Context>,
) -> Action {
    warn!(isvc = ?isvc.metadata.name, error = %error, "Reconcile error (will retry)");

    // reconcile already counted strategy failures
    if !matches!(error, ReconcileError::StrategyError(_)) {
        if let Some(ref metrics) = ctx.metrics {
            metrics.record_reconciliation_error(NO_STRATEGY, 0.0);
        }
    }

    Action::requeue(Duration::from_secs(ERROR_REQUEUE_SECONDS))
}
