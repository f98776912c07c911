//! Periodic sweep over every pod in the cluster that deletes pods asking for the
//! CA bundle but not mounting it. Their controllers recreate them through the
//! webhook, standalone pods are just removed.

use std::sync::Arc;
use std::time::Duration;

use certinjector_common::compliance::{compliance, Compliance};
use certinjector_common::constants::CERTINJECTOR_COMPONENT;
use certinjector_common::errors::CertInjectorError;
use certinjector_common::metrics::InjectionMetrics;
use certinjector_common::traits::{Identified, MaybeNamespaced, Named};
use certinjector_macros::{ci_log, logger, with_dollar_sign};
use chrono::Utc;
use k8s_openapi::api::core::v1::{Event, EventSource, ObjectReference, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use rand::Rng;

use crate::cluster::ClusterApi;

logger!("Reconciler");

pub const AUDIT_EVENT_REASON: &str = "Deleting pod";
const EVENT_TYPE_NORMAL: &str = "Normal";

/// First delay used after a failed pass, doubled on every consecutive failure.
pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(5);

/// Object the audit event is recorded against: the pod's first owner if it has
/// one, the pod otherwise.
pub fn attribution_target(pod: &Pod) -> ObjectReference {
    let namespace = MaybeNamespaced::namespace(pod);
    match pod
        .metadata
        .owner_references
        .as_ref()
        .and_then(|os| os.first())
    {
        Some(owner) => ObjectReference {
            api_version: Some(owner.api_version.clone()),
            kind: Some(owner.kind.clone()),
            name: Some(owner.name.clone()),
            namespace,
            uid: Some(owner.uid.clone()),
            ..Default::default()
        },
        None => ObjectReference {
            api_version: Some(<Pod as k8s_openapi::Resource>::API_VERSION.to_string()),
            kind: Some(<Pod as k8s_openapi::Resource>::KIND.to_string()),
            name: Some(Named::name(pod)),
            namespace,
            uid: pod.metadata.uid.clone(),
            resource_version: pod.metadata.resource_version.clone(),
            ..Default::default()
        },
    }
}

fn audit_message(pod_name: &str) -> String {
    format!(
        "pod annotation on {:?} has not been applied by ca-injector mutatingadmissionwebhook",
        pod_name
    )
}

pub fn audit_event(pod: &Pod) -> Event {
    let target = attribution_target(pod);
    let now = Time(Utc::now());
    Event {
        metadata: ObjectMeta {
            generate_name: Some(format!(
                "{}.",
                target.name.clone().unwrap_or_else(|| Named::name(pod))
            )),
            namespace: target.namespace.clone(),
            ..Default::default()
        },
        involved_object: target,
        type_: Some(EVENT_TYPE_NORMAL.to_string()),
        reason: Some(AUDIT_EVENT_REASON.to_string()),
        message: Some(audit_message(&Named::name(pod))),
        first_timestamp: Some(now.clone()),
        last_timestamp: Some(now),
        count: Some(1),
        source: Some(EventSource {
            component: Some(CERTINJECTOR_COMPONENT.to_string()),
            ..Default::default()
        }),
        reporting_component: Some(CERTINJECTOR_COMPONENT.to_string()),
        ..Default::default()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Remediation {
    NotRequested,
    Compliant,
    Delete,
}

pub fn remediation(pod: &Pod) -> Remediation {
    match compliance(pod) {
        Compliance::NotRequested => Remediation::NotRequested,
        Compliance::Compliant(_) => Remediation::Compliant,
        Compliance::NonCompliant(_) => Remediation::Delete,
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub inspected: usize,
    pub deleted: usize,
    pub failed: usize,
}

#[derive(Clone, Copy, Debug)]
pub struct Schedule {
    pub initial_delay: Duration,
    pub interval: Duration,
}

impl Default for Schedule {
    fn default() -> Self {
        Schedule {
            initial_delay: Duration::from_secs(5),
            interval: Duration::from_secs(60),
        }
    }
}

impl Schedule {
    /// Delay before the next pass after `failures` consecutive failed passes.
    /// Never longer than the regular interval.
    pub fn retry_delay(&self, failures: u32) -> Duration {
        let factor = 2u32.saturating_pow(failures.saturating_sub(1));
        RETRY_BASE_DELAY.saturating_mul(factor).min(self.interval)
    }
}

fn with_jitter(delay: Duration) -> Duration {
    // 0.5x to 1.5x of the delay
    let jitter = rand::thread_rng().gen_range(0.5..1.5);
    Duration::from_secs_f64(delay.as_secs_f64() * jitter)
}

pub struct Reconciler<C: ClusterApi, M: InjectionMetrics> {
    cluster: Arc<C>,
    metrics: Arc<M>,
    schedule: Schedule,
}

impl<C: ClusterApi, M: InjectionMetrics> Reconciler<C, M> {
    pub fn new(cluster: Arc<C>, metrics: Arc<M>, schedule: Schedule) -> Self {
        Reconciler {
            cluster,
            metrics,
            schedule,
        }
    }

    /// Records the audit event for `pod` and deletes it when it asked for the
    /// CA bundle but does not mount it.
    pub async fn reconcile_pod(&self, pod: &Pod) -> Result<Remediation, CertInjectorError> {
        let namespace = MaybeNamespaced::namespace(pod).unwrap_or_default();
        let event = audit_event(pod);
        let event_namespace = event
            .involved_object
            .namespace
            .clone()
            .unwrap_or_else(|| namespace.clone());
        if let Err(e) = self.cluster.create_event(&event_namespace, event).await {
            warn!("Unable to record event for pod {}: {}", pod.object_id(), e);
        }
        let remediation = remediation(pod);
        if remediation == Remediation::Delete {
            let name = Named::name(pod);
            // Counts attempts, a failed delete is retried on the next pass
            self.metrics.pod_deleted(&namespace, &name);
            self.cluster.delete_pod(&namespace, &name).await?;
            info!(
                "Deleted pod {} since it is missing the injected CA bundle",
                pod.object_id()
            );
        }
        Ok(remediation)
    }

    /// Runs a single sweep over all the pods. Only a failure to list the pods
    /// fails the pass.
    pub async fn run_pass(&self) -> Result<PassSummary, CertInjectorError> {
        let pods = self.cluster.list_pods().await?;
        let mut summary = PassSummary::default();
        for pod in &pods {
            summary.inspected += 1;
            match self.reconcile_pod(pod).await {
                Ok(Remediation::Delete) => summary.deleted += 1,
                Ok(_) => {}
                Err(e) => {
                    error!("Unable to remediate pod {}: {}", pod.object_id(), e);
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    pub async fn run(self) {
        info!(
            "Starting reconciler, first pass in {:?} then every {:?}",
            self.schedule.initial_delay, self.schedule.interval
        );
        tokio::time::sleep(self.schedule.initial_delay).await;
        let mut failures = 0u32;
        loop {
            let delay = match self.run_pass().await {
                Ok(summary) => {
                    failures = 0;
                    debug!("Reconciler pass finished: {:?}", summary);
                    self.schedule.interval
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let delay = with_jitter(self.schedule.retry_delay(failures));
                    error!(
                        "Reconciler pass failed [{} in a row], retrying in {:?}: {}",
                        failures, delay, e
                    );
                    delay
                }
            };
            tokio::time::sleep(delay).await;
        }
    }
}
