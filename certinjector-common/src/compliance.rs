use k8s_openapi::api::core::v1::Pod;

use crate::{annotations::CERTINJECTOR_ANNOTATION_INJECT_SSL, kubernetes::volumes, traits::Annotated};

/// Secret name requested by the injection annotation, if any.
pub fn injection_secret<A: Annotated + ?Sized>(entity: &A) -> Option<&str> {
    entity
        .annotation(CERTINJECTOR_ANNOTATION_INJECT_SSL)
        .map(String::as_str)
        .filter(|s| !s.is_empty())
}

/// A pod is compliant when one of its volumes is sourced from `secret_name`.
/// Always computed from the pod as it is now, the mutation may never have been
/// applied.
pub fn is_compliant(pod: &Pod, secret_name: &str) -> bool {
    for volume in volumes(pod).into_iter().flatten() {
        let source = volume.secret.as_ref().and_then(|s| s.secret_name.as_deref());
        if source == Some(secret_name) {
            return true;
        }
    }
    false
}

#[derive(Debug, PartialEq, Eq)]
pub enum Compliance<'a> {
    /// The pod did not ask for injection.
    NotRequested,
    Compliant(&'a str),
    NonCompliant(&'a str),
}

pub fn compliance(pod: &Pod) -> Compliance<'_> {
    match injection_secret(pod) {
        None => Compliance::NotRequested,
        Some(secret) if is_compliant(pod, secret) => Compliance::Compliant(secret),
        Some(secret) => Compliance::NonCompliant(secret),
    }
}
