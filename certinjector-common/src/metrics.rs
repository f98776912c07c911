//! Counters for pods mutated by the webhook and pods deleted by the reconciler.
//!
//! Both components get the counters injected through [`InjectionMetrics`], the
//! Prometheus implementation owns its own [`Registry`] so tests can create as
//! many as they need.

use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

use crate::{
    constants::{METRIC_PODS_DELETED, METRIC_PODS_MUTATED},
    errors::CertInjectorError,
};

const POD_LABELS: [&str; 2] = ["namespace", "name"];

pub trait InjectionMetrics: Send + Sync {
    fn pod_mutated(&self, namespace: &str, name: &str);
    fn pod_deleted(&self, namespace: &str, name: &str);
}

pub trait MetricsExporter: Send + Sync {
    fn encode_text(&self) -> Result<String, CertInjectorError>;
}

#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Registry,
    pods_mutated: IntCounterVec,
    pods_deleted: IntCounterVec,
}

impl PrometheusMetrics {
    pub fn new() -> Result<Self, CertInjectorError> {
        PrometheusMetrics::with_registry(Registry::new())
    }

    pub fn with_registry(registry: Registry) -> Result<Self, CertInjectorError> {
        let pods_mutated = IntCounterVec::new(
            Opts::new(
                METRIC_PODS_MUTATED,
                "The number of pods mutated by the certinjector webhook",
            ),
            &POD_LABELS,
        )?;
        registry.register(Box::new(pods_mutated.clone()))?;
        let pods_deleted = IntCounterVec::new(
            Opts::new(
                METRIC_PODS_DELETED,
                "The number of pods deleted by the certinjector reconciler",
            ),
            &POD_LABELS,
        )?;
        registry.register(Box::new(pods_deleted.clone()))?;
        Ok(PrometheusMetrics {
            registry,
            pods_mutated,
            pods_deleted,
        })
    }

    pub fn mutated_count(&self, namespace: &str, name: &str) -> u64 {
        self.pods_mutated
            .with_label_values(&[namespace, name])
            .get()
    }

    pub fn deleted_count(&self, namespace: &str, name: &str) -> u64 {
        self.pods_deleted
            .with_label_values(&[namespace, name])
            .get()
    }
}

impl InjectionMetrics for PrometheusMetrics {
    fn pod_mutated(&self, namespace: &str, name: &str) {
        self.pods_mutated
            .with_label_values(&[namespace, name])
            .inc();
    }

    fn pod_deleted(&self, namespace: &str, name: &str) {
        self.pods_deleted
            .with_label_values(&[namespace, name])
            .inc();
    }
}

impl MetricsExporter for PrometheusMetrics {
    fn encode_text(&self) -> Result<String, CertInjectorError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(CertInjectorError::from_error("Unable to encode metrics"))
    }
}
