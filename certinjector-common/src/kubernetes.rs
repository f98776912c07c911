use std::collections::BTreeMap;

use certinjector_macros::{ci_log, logger, with_dollar_sign};
use http::Uri;
use k8s_openapi::api::core::v1::{Container, Pod, Volume};
use kube::{core::admission::AdmissionRequest, Client, Config, ResourceExt};

use crate::{
    errors::CertInjectorError,
    traits::{Annotated, MaybeNamespaced, Named, ObjectRequest},
};

pub const CERTINJECTOR_K8S_HOST_ENV: &str = "CERTINJECTOR_K8S_HOST";
pub const CERTINJECTOR_K8S_NO_VERIFY_ENV: &str = "CERTINJECTOR_K8S_NO_VERIFY";

logger!("Kubernetes");

pub async fn get_k8s_client() -> Result<Client, CertInjectorError> {
    let mut k8s_config = Config::infer()
        .await
        .map_err(CertInjectorError::from_error("Unable to infer Kubernetes config"))?;
    if let Ok(host) = std::env::var(CERTINJECTOR_K8S_HOST_ENV) {
        k8s_config.cluster_url = format!("https://{}", host).parse::<Uri>().map_err(
            CertInjectorError::from_error("Unable to parse CERTINJECTOR_K8S_HOST value"),
        )?;
    }
    k8s_config.accept_invalid_certs = std::env::var(CERTINJECTOR_K8S_NO_VERIFY_ENV)
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false);
    debug!("Kubernetes config: {:?}", k8s_config);
    Client::try_from(k8s_config).map_err(CertInjectorError::from)
}

pub fn containers(pod: &Pod) -> Option<&Vec<Container>> {
    pod.spec.as_ref().map(|s| &s.containers)
}

pub fn volumes(pod: &Pod) -> Option<&Vec<Volume>> {
    pod.spec.as_ref().and_then(|s| s.volumes.as_ref())
}

// Implement required traits for Pod

impl Named for Pod {
    fn name(&self) -> String {
        self.name_any()
    }
}

impl MaybeNamespaced for Pod {
    fn namespace(&self) -> Option<String> {
        ResourceExt::namespace(self)
    }
}

impl Annotated for Pod {
    fn annotations(&self) -> Option<&BTreeMap<String, String>> {
        Some(ResourceExt::annotations(self))
    }
}

// Implement required traits for AdmissionRequest<Pod>
// Pods created from a template may not have a name or namespace yet, in that
// case we use the ones in the request.

impl ObjectRequest<Pod> for AdmissionRequest<Pod> {
    fn object(&self) -> Option<&Pod> {
        self.object.as_ref()
    }
}

impl Named for AdmissionRequest<Pod> {
    fn name(&self) -> String {
        self.object
            .as_ref()
            .map(Named::name)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| self.name.clone())
    }
}

impl MaybeNamespaced for AdmissionRequest<Pod> {
    fn namespace(&self) -> Option<String> {
        self.object
            .as_ref()
            .and_then(MaybeNamespaced::namespace)
            .or_else(|| self.namespace.clone())
    }
}

impl Annotated for AdmissionRequest<Pod> {
    fn annotations(&self) -> Option<&BTreeMap<String, String>> {
        self.object.as_ref().and_then(Annotated::annotations)
    }
}
