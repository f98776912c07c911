use crate::errors::MutationError;
use certinjector_common::constants::{
    INJECTED_CA_FILE, INJECTED_MOUNT_PATH, INJECTED_VOLUME_NAME, NODE_EXTRA_CA_CERTS_ENV,
    SSL_CERT_FILE_ENV,
};
use certinjector_common::compliance::injection_secret;
use certinjector_common::errors::CertInjectorError;
use certinjector_common::kubernetes::{containers, volumes};
use certinjector_common::metrics::{InjectionMetrics, MetricsExporter};
use certinjector_common::traits::{Annotated, Identified, MaybeNamespaced, Named, ObjectRequest};
use certinjector_macros::{ci_log, logger, with_dollar_sign};
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Method, StatusCode};
use hyper::body::Bytes;
use hyper::{Body, Request, Response};
use json_patch::PatchOperation::Add;
use json_patch::{AddOperation, Patch, PatchOperation};
use k8s_openapi::api::core::v1::{EnvVar, Pod, SecretVolumeSource, Volume, VolumeMount};
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use serde_json::Value;
use std::str::from_utf8;
use std::sync::Arc;

logger!("Injector");

const PROMETHEUS_TEXT_FORMAT: &str = "text/plain; version=0.0.4";

macro_rules! admission_request {
    ($body:ident, $typ:tt) => {{
        serde_json::from_str::<AdmissionReview<$typ>>(&$body)
            .map_err(CertInjectorError::from_error(concat!(
                "Unable to parse AdmissionReview<",
                stringify!($typ),
                ">"
            )))
            .and_then(|review| {
                let request: Result<AdmissionRequest<$typ>, _> = review.try_into();
                request.map_err(CertInjectorError::from_error(concat!(
                    "Unable to parse AdmissionRequest<",
                    stringify!($typ),
                    ">"
                )))
            })
    }};
}

macro_rules! admission_response {
    ($body:ident, $response:ident => $expr:expr) => {{
        let admission_review = $response.into_review();
        let body = serde_json::to_string(&admission_review);
        let r: Result<Response<Body>, hyper::Error> = match body {
            Err(e) => Ok(response_with_status(
                StatusCode::UNPROCESSABLE_ENTITY,
                Body::from(e.to_string()),
            )),
            Ok($body) => Ok($expr),
        };
        r
    }};
}

macro_rules! allow_admission_response {
    (response => $response:ident) => {{
        $response.allowed = true;
        $response.result.code = 200;
        admission_response!(body, $response => {
            Response::new(Body::from(body))
        })
    }};
}

macro_rules! fail_admission_response {
    (response => $response:ident) => {{
        admission_response!(body, $response => {
            response_with_status(StatusCode::UNPROCESSABLE_ENTITY, Body::from(body))
        })
    }};
    (error => $e:ident) => {{
        let response = AdmissionResponse::invalid($e.to_string());
        fail_admission_response!(response => response)
    }};
}

macro_rules! env_var {
    (value :: $env_name:expr => $value:expr) => {{
        let mut env: EnvVar = Default::default();
        env.name = $env_name.to_string();
        env.value = Some($value.to_string());
        env
    }};
}

fn response_with_status(status: StatusCode, body: Body) -> Response<Body> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
}

/// Values added by the injection patch. Each one serializes to the JSON shape of
/// the Kubernetes object it represents.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchValue {
    EmptyArray,
    Volume(Volume),
    EnvVar(EnvVar),
    VolumeMount(VolumeMount),
}

impl PatchValue {
    fn to_value(&self) -> Result<Value, CertInjectorError> {
        let value = match self {
            PatchValue::EmptyArray => Ok(Value::Array(vec![])),
            PatchValue::Volume(v) => serde_json::to_value(v),
            PatchValue::EnvVar(e) => serde_json::to_value(e),
            PatchValue::VolumeMount(m) => serde_json::to_value(m),
        };
        value.map_err(CertInjectorError::from_error("Unable to serialize patch value"))
    }
}

fn add(path: String, value: PatchValue) -> Result<PatchOperation, CertInjectorError> {
    Ok(Add(AddOperation {
        path,
        value: value.to_value()?,
    }))
}

fn injected_volume(secret_name: &str) -> Volume {
    Volume {
        name: INJECTED_VOLUME_NAME.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(secret_name.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn injected_volume_mount() -> VolumeMount {
    VolumeMount {
        name: INJECTED_VOLUME_NAME.to_string(),
        mount_path: INJECTED_MOUNT_PATH.to_string(),
        read_only: Some(true),
        ..Default::default()
    }
}

fn injected_env_vars() -> Vec<EnvVar> {
    vec![
        env_var!(value :: SSL_CERT_FILE_ENV => INJECTED_CA_FILE),
        env_var!(value :: NODE_EXTRA_CA_CERTS_ENV => INJECTED_CA_FILE),
    ]
}

fn is_empty<T>(xs: Option<&Vec<T>>) -> bool {
    xs.map(|xs| xs.is_empty()).unwrap_or(true)
}

/// Operations that add the CA bundle volume to `pod` and mount it in every
/// container. Every list is initialized before the first append to it.
pub fn injection_patch(pod: &Pod, secret_name: &str) -> Result<Patch, CertInjectorError> {
    let mut operations = vec![];
    if is_empty(volumes(pod)) {
        operations.push(add("/spec/volumes".to_string(), PatchValue::EmptyArray)?);
    }
    operations.push(add(
        "/spec/volumes/-".to_string(),
        PatchValue::Volume(injected_volume(secret_name)),
    )?);
    for (i, container) in containers(pod).into_iter().flatten().enumerate() {
        if is_empty(container.env.as_ref()) {
            operations.push(add(
                format!("/spec/containers/{}/env", i),
                PatchValue::EmptyArray,
            )?);
        }
        for env in injected_env_vars() {
            operations.push(add(
                format!("/spec/containers/{}/env/-", i),
                PatchValue::EnvVar(env),
            )?);
        }
        if is_empty(container.volume_mounts.as_ref()) {
            operations.push(add(
                format!("/spec/containers/{}/volumeMounts", i),
                PatchValue::EmptyArray,
            )?);
        }
        operations.push(add(
            format!("/spec/containers/{}/volumeMounts/-", i),
            PatchValue::VolumeMount(injected_volume_mount()),
        )?);
    }
    Ok(Patch(operations))
}

#[derive(Debug)]
pub enum MutationDecision {
    Allow,
    Patch(Patch),
}

/// Decides what to do with a pod being admitted. Pods are never denied.
pub fn decide<R: ObjectRequest<Pod> + Annotated>(
    request: &R,
) -> Result<MutationDecision, CertInjectorError> {
    let pod = request
        .object()
        .ok_or_else(|| CertInjectorError::from("Admission request does not contain a Pod"))?;
    match injection_secret(request) {
        None => Ok(MutationDecision::Allow),
        Some(secret_name) => injection_patch(pod, secret_name).map(MutationDecision::Patch),
    }
}

fn patch_pod<M: InjectionMetrics + ?Sized>(
    request: &AdmissionRequest<Pod>,
    metrics: &M,
) -> Result<Box<AdmissionResponse>, MutationError> {
    let mut admission_response = Box::new(AdmissionResponse::from(request));
    let decision = decide(request).map_err(MutationError::from_admission_response(Box::clone(
        &admission_response,
    )))?;
    match decision {
        MutationDecision::Allow => {
            debug!("Pod {} was not annotated, allowing it", request.object_id());
            admission_response.result.message = "allowed".to_string();
            Ok(admission_response)
        }
        MutationDecision::Patch(patch) => {
            info!(
                "Patching pod {} with {} operations",
                request.object_id(),
                patch.0.len()
            );
            let mut patched = Box::clone(&admission_response)
                .with_patch(patch)
                .map_err(CertInjectorError::from_error("Error serializing JSONPatch"))
                .map_err(MutationError::from_admission_response(Box::clone(
                    &admission_response,
                )))?;
            patched.result.message = "modified".to_string();
            metrics.pod_mutated(&request.namespace().unwrap_or_default(), &request.name());
            Ok(Box::new(patched))
        }
    }
}

pub struct InjectorContext<M: InjectionMetrics + MetricsExporter> {
    pub metrics: Arc<M>,
}

pub async fn mutate<M: InjectionMetrics + MetricsExporter>(
    body: Bytes,
    injector_context: Arc<InjectorContext<M>>,
) -> Result<Box<AdmissionResponse>, MutationError> {
    let body = from_utf8(&body)
        .map(|s| s.to_string())
        .map_err(CertInjectorError::from_error("Unable to parse request body"))?;
    let admission_request = admission_request!(body, DynamicObject)?;
    match admission_request.resource.resource.as_str() {
        "pods" => {
            let pod_request = admission_request!(body, Pod).map_err(
                MutationError::from_admission_response(Box::new(AdmissionResponse::from(
                    &admission_request,
                ))),
            )?;
            patch_pod(&pod_request, injector_context.metrics.as_ref())
        }
        resource => {
            warn!("Ignoring admission request for resource {}", resource);
            Ok(Box::new(AdmissionResponse::from(&admission_request)))
        }
    }
}

pub async fn injector_handler<M: InjectionMetrics + MetricsExporter>(
    req: Request<Body>,
    injector_context: Arc<InjectorContext<M>>,
) -> Result<Response<Body>, hyper::Error> {
    match (req.method(), req.uri().path()) {
        (&Method::POST, "/mutate") => {
            let bs = hyper::body::to_bytes(req).await?;
            match mutate(bs, injector_context).await {
                Ok(mut response) => {
                    allow_admission_response!(response => response)
                }
                Err(MutationError::WithResponse(response, e)) => {
                    error!("Patch failed: {}", e);
                    fail_admission_response!(response => response)
                }
                Err(MutationError::WithoutResponse(e)) => {
                    error!("Patch failed: {}", e);
                    fail_admission_response!(error => e)
                }
            }
        }
        (&Method::GET, "/metrics") => match injector_context.metrics.encode_text() {
            Ok(text) => {
                let mut response = Response::new(Body::from(text));
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static(PROMETHEUS_TEXT_FORMAT));
                Ok(response)
            }
            Err(e) => {
                error!("Unable to export metrics: {}", e);
                Ok(response_with_status(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Body::from(e.to_string()),
                ))
            }
        },
        (&Method::GET, "/healthz") => Ok(Response::new(Body::from("ok"))),
        _ => Ok(response_with_status(StatusCode::NOT_FOUND, Body::empty())),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        decide, injection_patch, injector_handler, mutate, InjectorContext, MutationDecision,
    };
    use crate::errors::MutationError;
    use certinjector_common::annotations::CERTINJECTOR_ANNOTATION_INJECT_SSL;
    use certinjector_common::constants::{
        INJECTED_CA_FILE, INJECTED_VOLUME_NAME, NODE_EXTRA_CA_CERTS_ENV, SSL_CERT_FILE_ENV,
    };
    use certinjector_common::metrics::PrometheusMetrics;
    use certinjector_common::traits::{Annotated, ObjectRequest};
    use certinjector_test_macros::{pod, set_pod_field};
    use http::{Method, StatusCode};
    use hyper::body::Bytes;
    use hyper::{Body, Request};
    use json_patch::{Patch, PatchOperation};
    use k8s_openapi::api::core::v1::Pod;
    use serde_json::{json, Value};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    type TestResult = (bool, String, String);

    fn assert_tests(test_results: &[TestResult]) {
        let errors: Vec<String> = test_results
            .iter()
            .enumerate()
            .filter(|(_, (result, _, _))| !result)
            .map(|(c, (_, description, reason))| {
                format!("Test {} [#{}] failed, reason: {}", description, c, reason)
            })
            .collect();
        if !errors.is_empty() {
            panic!("Inject test failed:\n{}", errors.join("\n"));
        }
    }

    struct TestObjectRequest {
        pod: Pod,
    }

    impl TestObjectRequest {
        fn new(pod: Pod) -> Self {
            TestObjectRequest { pod }
        }
    }

    impl ObjectRequest<Pod> for TestObjectRequest {
        fn object(&self) -> Option<&Pod> {
            Some(&self.pod)
        }
    }

    impl Annotated for TestObjectRequest {
        fn annotations(&self) -> Option<&BTreeMap<String, String>> {
            Annotated::annotations(&self.pod)
        }
    }

    fn injection_annotation(secret: &str) -> Vec<(&str, &str)> {
        vec![(CERTINJECTOR_ANNOTATION_INJECT_SSL, secret)]
    }

    fn paths(patch: &Patch) -> Vec<String> {
        patch
            .0
            .iter()
            .map(|op| match op {
                PatchOperation::Add(op) => op.path.clone(),
                op => format!("unexpected {:?}", op),
            })
            .collect()
    }

    fn apply(pod: &Pod, patch: &Patch) -> Pod {
        let mut doc = serde_json::to_value(pod).expect("Unable to serialize pod");
        json_patch::patch(&mut doc, patch).expect("Unable to apply patch");
        serde_json::from_value(doc).expect("Unable to deserialize patched pod")
    }

    fn admission_review(pod: &Pod, name: &str, namespace: &str) -> Value {
        let pod_value = serde_json::to_value(pod).expect("Unable to parse test input");
        json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
                "kind": {"group": "", "version": "v1", "kind": "Pod"},
                "resource": {"group": "", "version": "v1", "resource": "pods"},
                "requestKind": {"group": "", "version": "v1", "kind": "Pod"},
                "requestResource": {"group": "", "version": "v1", "resource": "pods"},
                "name": name,
                "namespace": namespace,
                "operation": "CREATE",
                "userInfo": {
                    "username": "admin",
                    "uid": "014fbff9a07c",
                    "groups": ["system:authenticated"]
                },
                "object": pod_value
            }
        })
    }

    fn test_context() -> Arc<InjectorContext<PrometheusMetrics>> {
        Arc::new(InjectorContext {
            metrics: Arc::new(PrometheusMetrics::new().expect("Unable to create metrics")),
        })
    }

    fn patch_of(decision: MutationDecision) -> Option<Patch> {
        match decision {
            MutationDecision::Allow => None,
            MutationDecision::Patch(patch) => Some(patch),
        }
    }

    #[test]
    fn test_patch_value_shapes() {
        let pod = pod!(1, containers => vec!["app"]);
        let patch = injection_patch(&pod, "ca-secret").expect("Unable to build patch");
        let values: Vec<Value> = patch
            .0
            .iter()
            .filter_map(|op| match op {
                PatchOperation::Add(op) => Some(op.value.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(
            values,
            vec![
                json!([]),
                json!({"name": INJECTED_VOLUME_NAME, "secret": {"secretName": "ca-secret"}}),
                json!([]),
                json!({"name": SSL_CERT_FILE_ENV, "value": INJECTED_CA_FILE}),
                json!({"name": NODE_EXTRA_CA_CERTS_ENV, "value": INJECTED_CA_FILE}),
                json!([]),
                json!({"name": INJECTED_VOLUME_NAME, "mountPath": "/ssl", "readOnly": true}),
            ]
        );
    }

    #[test]
    fn test_unannotated_pods_are_allowed() {
        let pods = vec![
            pod!(1),
            pod!(2, containers => vec!["app", "proxy"]),
            pod!(3, containers => vec!["app"], volumes => vec!["data"]),
            pod!(4, containers => vec!["app"], annotations => vec![("other/annotation", "x")]),
            pod!(5, containers => vec!["app"], annotations => injection_annotation("")),
        ];
        let mut results: Vec<TestResult> = vec![];
        for pod in pods {
            let name = pod.metadata.name.clone().unwrap_or_default();
            match decide(&TestObjectRequest::new(pod)) {
                Ok(MutationDecision::Allow) => {
                    results.push((true, "Unannotated pod".to_string(), "Unknown".to_string()))
                }
                other => results.push((
                    false,
                    "Unannotated pod".to_string(),
                    format!("Pod {} expected to be allowed unchanged, got {:?}", name, other),
                )),
            }
        }
        assert_tests(&results);
    }

    #[test]
    fn test_patch_worker_with_two_containers() {
        let pod = pod!(1,
            containers => vec!["app", "proxy"],
            annotations => injection_annotation("ca-secret"));
        let patch = decide(&TestObjectRequest::new(pod.clone()))
            .map(patch_of)
            .expect("Unable to decide")
            .expect("Pod should be patched");
        assert_eq!(
            paths(&patch),
            vec![
                "/spec/volumes",
                "/spec/volumes/-",
                "/spec/containers/0/env",
                "/spec/containers/0/env/-",
                "/spec/containers/0/env/-",
                "/spec/containers/0/volumeMounts",
                "/spec/containers/0/volumeMounts/-",
                "/spec/containers/1/env",
                "/spec/containers/1/env/-",
                "/spec/containers/1/env/-",
                "/spec/containers/1/volumeMounts",
                "/spec/containers/1/volumeMounts/-",
            ]
        );
    }

    #[test]
    fn test_patch_completeness() {
        let pods = vec![
            pod!(1, containers => vec!["app"],
                 annotations => injection_annotation("ca-secret")),
            pod!(2, containers => vec!["app", "proxy", "metrics"],
                 volumes => vec!["data"],
                 annotations => injection_annotation("ca-secret")),
            pod!(3, containers => vec!["app", "proxy"],
                 container_env => (1, vec![("LOG_LEVEL", "debug")]),
                 container_mounts => (0, vec!["data"]),
                 volumes => vec!["data"],
                 annotations => injection_annotation("ca-secret")),
        ];
        let mut results: Vec<TestResult> = vec![];
        for pod in pods {
            let name = pod.metadata.name.clone().unwrap_or_default();
            let patch = injection_patch(&pod, "ca-secret").expect("Unable to build patch");
            let patched = apply(&pod, &patch);
            let spec = patched.spec.as_ref().expect("Patched pod has no spec");
            let n_volumes = pod
                .spec
                .as_ref()
                .and_then(|s| s.volumes.as_ref())
                .map(|vs| vs.len())
                .unwrap_or(0);
            let volumes = spec.volumes.clone().unwrap_or_default();
            let injected: Vec<_> = volumes
                .iter()
                .filter(|v| v.name == INJECTED_VOLUME_NAME)
                .collect();
            let volume_ok = volumes.len() == n_volumes + 1
                && injected.len() == 1
                && injected[0]
                    .secret
                    .as_ref()
                    .and_then(|s| s.secret_name.as_deref())
                    == Some("ca-secret");
            results.push((
                volume_ok,
                "Injected volume".to_string(),
                format!("Pod {} has volumes {:?}", name, volumes),
            ));
            let ca_envs = spec
                .containers
                .iter()
                .flat_map(|c| c.env.clone().unwrap_or_default())
                .filter(|e| e.value.as_deref() == Some(INJECTED_CA_FILE))
                .count();
            results.push((
                ca_envs == 2 * spec.containers.len(),
                "Injected environment".to_string(),
                format!(
                    "Pod {} has {} CA env vars for {} containers",
                    name,
                    ca_envs,
                    spec.containers.len()
                ),
            ));
            let mounts_ok = spec.containers.iter().all(|c| {
                c.volume_mounts
                    .clone()
                    .unwrap_or_default()
                    .iter()
                    .filter(|m| {
                        m.name == INJECTED_VOLUME_NAME
                            && m.mount_path == "/ssl"
                            && m.read_only == Some(true)
                    })
                    .count()
                    == 1
            });
            results.push((
                mounts_ok,
                "Injected volume mounts".to_string(),
                format!("Pod {} does not mount the CA bundle in every container", name),
            ));
        }
        assert_tests(&results);
    }

    #[test]
    fn test_conditional_array_initialization() {
        let pod = pod!(1,
            containers => vec!["app", "proxy"],
            container_env => (0, vec![("LOG_LEVEL", "debug")]),
            container_mounts => (1, vec!["data"]),
            volumes => vec!["data"],
            annotations => injection_annotation("ca-secret"));
        let patch = injection_patch(&pod, "ca-secret").expect("Unable to build patch");
        assert_eq!(
            paths(&patch),
            vec![
                "/spec/volumes/-",
                "/spec/containers/0/env/-",
                "/spec/containers/0/env/-",
                "/spec/containers/0/volumeMounts",
                "/spec/containers/0/volumeMounts/-",
                "/spec/containers/1/env",
                "/spec/containers/1/env/-",
                "/spec/containers/1/env/-",
                "/spec/containers/1/volumeMounts/-",
            ]
        );
        let patched = apply(&pod, &patch);
        let containers = patched.spec.expect("Patched pod has no spec").containers;
        assert_eq!(containers[0].env.as_ref().map(|e| e.len()), Some(3));
        assert_eq!(containers[1].volume_mounts.as_ref().map(|m| m.len()), Some(2));
    }

    #[test]
    fn test_empty_lists_are_initialized() {
        let mut pod = pod!(1,
            containers => vec!["app"],
            annotations => injection_annotation("ca-secret"));
        if let Some(spec) = pod.spec.as_mut() {
            spec.volumes = Some(vec![]);
            spec.containers[0].env = Some(vec![]);
            spec.containers[0].volume_mounts = Some(vec![]);
        }
        let patch = injection_patch(&pod, "ca-secret").expect("Unable to build patch");
        assert_eq!(patch.0.len(), 7);
    }

    #[test]
    fn test_pod_without_containers() {
        let pod = pod!(1, annotations => injection_annotation("ca-secret"));
        let patch = injection_patch(&pod, "ca-secret").expect("Unable to build patch");
        assert_eq!(paths(&patch), vec!["/spec/volumes", "/spec/volumes/-"]);
    }

    #[tokio::test]
    async fn test_mutate_patches_annotated_pod() {
        let context = test_context();
        let pod = pod!(1,
            containers => vec!["app", "proxy"],
            annotations => injection_annotation("ca-secret"));
        let body = admission_review(&pod, "worker-1", "ns1").to_string();
        let response = mutate(Bytes::from(body), Arc::clone(&context))
            .await
            .map_err(|e| format!("{:?}", e))
            .expect("Unable to mutate");
        assert!(response.allowed);
        assert_eq!(response.uid, "705ab4f5-6393-11e8-b7cc-42010a800002");
        assert_eq!(response.result.message.as_str(), "modified");
        assert!(response.patch.is_some());
        assert_eq!(context.metrics.mutated_count("ns1", "worker-1"), 1);
    }

    #[tokio::test]
    async fn test_mutate_unannotated_pod() {
        let context = test_context();
        let pod = pod!(1, containers => vec!["app"]);
        let body = admission_review(&pod, "worker-1", "ns1").to_string();
        let response = mutate(Bytes::from(body), Arc::clone(&context))
            .await
            .map_err(|e| format!("{:?}", e))
            .expect("Unable to mutate");
        assert!(response.allowed);
        assert!(response.patch.is_none());
        assert_eq!(response.result.message.as_str(), "allowed");
        assert_eq!(context.metrics.mutated_count("ns1", "worker-1"), 0);
    }

    #[tokio::test]
    async fn test_mutate_uses_generate_name_and_request_namespace() {
        let context = test_context();
        let mut pod = pod!(1,
            containers => vec!["app"],
            annotations => injection_annotation("ca-secret"));
        pod.metadata.name = None;
        pod.metadata.namespace = None;
        pod.metadata.generate_name = Some("worker-7d9f-".to_string());
        let body = admission_review(&pod, "", "default").to_string();
        mutate(Bytes::from(body), Arc::clone(&context))
            .await
            .map_err(|e| format!("{:?}", e))
            .expect("Unable to mutate");
        assert_eq!(context.metrics.mutated_count("default", "worker-7d9f-"), 1);
    }

    #[tokio::test]
    async fn test_mutate_decode_failure() {
        let context = test_context();
        let mut review = admission_review(&pod!(1), "worker-1", "ns1");
        review["request"]["object"]["spec"]["containers"] = json!("not-a-list");
        review["request"]["object"]["metadata"]["annotations"] =
            json!({ CERTINJECTOR_ANNOTATION_INJECT_SSL: "ca-secret" });
        match mutate(Bytes::from(review.to_string()), Arc::clone(&context)).await {
            Err(MutationError::WithResponse(response, _)) => {
                assert_eq!(response.uid, "705ab4f5-6393-11e8-b7cc-42010a800002");
                assert!(response.patch.is_none());
            }
            other => panic!("Expected decode error with response, got {:?}", other),
        }
        assert_eq!(context.metrics.mutated_count("ns1", "worker-1"), 0);

        match mutate(Bytes::from("{not json"), Arc::clone(&context)).await {
            Err(MutationError::WithoutResponse(_)) => {}
            other => panic!("Expected envelope error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_handler_responses() {
        let context = test_context();
        let pod = pod!(1,
            containers => vec!["app"],
            annotations => injection_annotation("ca-secret"));
        let request = Request::builder()
            .method(Method::POST)
            .uri("/mutate")
            .body(Body::from(admission_review(&pod, "worker-1", "ns1").to_string()))
            .expect("Unable to build request");
        let response = injector_handler(request, Arc::clone(&context))
            .await
            .expect("Handler failed");
        assert_eq!(response.status(), StatusCode::OK);
        let body = hyper::body::to_bytes(response.into_body())
            .await
            .expect("Unable to read body");
        let review: Value = serde_json::from_slice(&body).expect("Unable to parse response");
        assert_eq!(review["response"]["allowed"], json!(true));
        assert_eq!(review["response"]["patchType"], json!("JSONPatch"));
        assert_eq!(review["response"]["status"]["message"], json!("modified"));

        let request = Request::builder()
            .method(Method::POST)
            .uri("/mutate")
            .body(Body::from("{not json"))
            .expect("Unable to build request");
        let response = injector_handler(request, Arc::clone(&context))
            .await
            .expect("Handler failed");
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let request = Request::builder()
            .method(Method::GET)
            .uri("/metrics")
            .body(Body::empty())
            .expect("Unable to build request");
        let response = injector_handler(request, Arc::clone(&context))
            .await
            .expect("Handler failed");
        assert_eq!(response.status(), StatusCode::OK);
        let body = hyper::body::to_bytes(response.into_body())
            .await
            .expect("Unable to read body");
        let text = String::from_utf8(body.to_vec()).expect("Metrics are not utf8");
        assert!(text.contains(r#"certinjector_pods_mutated{name="worker-1",namespace="ns1"} 1"#));

        let request = Request::builder()
            .method(Method::GET)
            .uri("/healthz")
            .body(Body::empty())
            .expect("Unable to build request");
        let response = injector_handler(request, Arc::clone(&context))
            .await
            .expect("Handler failed");
        assert_eq!(response.status(), StatusCode::OK);

        let request = Request::builder()
            .method(Method::GET)
            .uri("/validate")
            .body(Body::empty())
            .expect("Unable to build request");
        let response = injector_handler(request, context)
            .await
            .expect("Handler failed");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
