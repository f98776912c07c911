/// Sets a field on a test `Pod`. Container level fields (`container_env`,
/// `container_mounts`) need the containers to be set first.
#[macro_export]
macro_rules! set_pod_field {
    ($pod:expr, containers => $cs:expr) => {
        let test_cs: Vec<k8s_openapi::api::core::v1::Container> = $cs
            .iter()
            .map(|x| k8s_openapi::api::core::v1::Container {
                name: x.to_string(),
                ..Default::default()
            })
            .collect();
        if let Some(spec) = $pod.spec.as_mut() {
            spec.containers = test_cs;
        }
    };
    ($pod:expr, container_env => $e:expr) => {
        let (i, es) = $e;
        let envs: Vec<k8s_openapi::api::core::v1::EnvVar> = es
            .iter()
            .map(|(k, v)| k8s_openapi::api::core::v1::EnvVar {
                name: k.to_string(),
                value: Some(v.to_string()),
                ..Default::default()
            })
            .collect();
        if let Some(c) = $pod
            .spec
            .as_mut()
            .and_then(|spec| spec.containers.get_mut(i))
        {
            c.env = Some(envs);
        }
    };
    ($pod:expr, container_mounts => $e:expr) => {
        let (i, ms) = $e;
        let mounts: Vec<k8s_openapi::api::core::v1::VolumeMount> = ms
            .iter()
            .map(|x| k8s_openapi::api::core::v1::VolumeMount {
                name: x.to_string(),
                mount_path: format!("/mnt/{}", x),
                ..Default::default()
            })
            .collect();
        if let Some(c) = $pod
            .spec
            .as_mut()
            .and_then(|spec| spec.containers.get_mut(i))
        {
            c.volume_mounts = Some(mounts);
        }
    };
    ($pod:expr, volumes => $vs:expr) => {
        let volumes: Vec<k8s_openapi::api::core::v1::Volume> = $vs
            .iter()
            .map(|x| k8s_openapi::api::core::v1::Volume {
                name: x.to_string(),
                empty_dir: Some(Default::default()),
                ..Default::default()
            })
            .collect();
        if let Some(spec) = $pod.spec.as_mut() {
            spec.volumes
                .get_or_insert_with(Vec::new)
                .extend(volumes);
        }
    };
    ($pod:expr, secret_volumes => $vs:expr) => {
        let volumes: Vec<k8s_openapi::api::core::v1::Volume> = $vs
            .iter()
            .map(|(name, secret)| k8s_openapi::api::core::v1::Volume {
                name: name.to_string(),
                secret: Some(k8s_openapi::api::core::v1::SecretVolumeSource {
                    secret_name: Some(secret.to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            })
            .collect();
        if let Some(spec) = $pod.spec.as_mut() {
            spec.volumes
                .get_or_insert_with(Vec::new)
                .extend(volumes);
        }
    };
    ($pod:expr, annotations => $as:expr) => {
        let mut bm = std::collections::BTreeMap::new();
        for (k, v) in $as {
            bm.insert(k.to_string(), v.to_string());
        }
        $pod.metadata.annotations = Some(bm);
    };
    ($pod:expr, owner => $e:expr) => {
        let (kind, name, uid) = $e;
        $pod.metadata.owner_references = Some(vec![
            k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference {
                api_version: "apps/v1".to_string(),
                kind: kind.to_string(),
                name: name.to_string(),
                uid: uid.to_string(),
                controller: Some(true),
                ..Default::default()
            },
        ]);
    };
}

/// Builds a test `Pod` named `worker-<n>` in namespace `ns<n>`, optionally setting
/// fields with `set_pod_field!`:
///
/// ```ignore
/// let pod = pod!(1,
///     containers => vec!["app", "proxy"],
///     annotations => vec![("microcumul.us/injectssl", "ca-secret")]);
/// ```
#[macro_export]
macro_rules! pod {
    ($n:expr) => {{
        let mut pod: k8s_openapi::api::core::v1::Pod = Default::default();
        pod.metadata.name = Some(format!("worker-{}", $n));
        pod.metadata.namespace = Some(format!("ns{}", $n));
        pod.metadata.uid = Some(format!("00000000-0000-0000-0000-{:012}", $n));
        pod.spec = Some(Default::default());
        pod
    }};
    ($n:expr, $($f:ident => $e:expr),+) => {{
        let mut pod = pod!($n);
        $(
            set_pod_field!(pod, $f => $e);
        )+
        pod
    }};
}
