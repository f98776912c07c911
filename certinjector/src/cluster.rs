use async_trait::async_trait;
use certinjector_common::errors::CertInjectorError;
use k8s_openapi::api::core::v1::{Event, Pod};
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::{Api, Client};

/// The calls the reconciler makes against the cluster. None of them are retried
/// here, callers decide what a failure means.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Lists the pods in all namespaces.
    async fn list_pods(&self) -> Result<Vec<Pod>, CertInjectorError>;

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), CertInjectorError>;

    async fn create_event(&self, namespace: &str, event: Event) -> Result<(), CertInjectorError>;
}

pub struct KubeClusterApi {
    client: Client,
}

impl KubeClusterApi {
    pub fn new(client: Client) -> Self {
        KubeClusterApi { client }
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn list_pods(&self) -> Result<Vec<Pod>, CertInjectorError> {
        let pods_api: Api<Pod> = Api::all(self.client.clone());
        pods_api
            .list(&ListParams::default())
            .await
            .map(|xs| xs.items)
            .map_err(CertInjectorError::from_error("Unable to list pods"))
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), CertInjectorError> {
        let pods_api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        pods_api
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(CertInjectorError::from_error("Unable to delete pod"))
            .map_err(|e| e.with_object(format!("{}/{}", namespace, name)))
    }

    async fn create_event(&self, namespace: &str, event: Event) -> Result<(), CertInjectorError> {
        let events_api: Api<Event> = Api::namespaced(self.client.clone(), namespace);
        events_api
            .create(&PostParams::default(), &event)
            .await
            .map(|_| ())
            .map_err(CertInjectorError::from_error("Unable to create event"))
    }
}
