use const_format::formatcp;

pub const INJECTED_VOLUME_NAME: &str = "microcumulus-injected-ssl";
pub const INJECTED_MOUNT_PATH: &str = "/ssl";
pub const CA_BUNDLE_KEY: &str = "ca.crt";
pub const INJECTED_CA_FILE: &str = formatcp!("{}/{}", INJECTED_MOUNT_PATH, CA_BUNDLE_KEY);
pub const SSL_CERT_FILE_ENV: &str = "SSL_CERT_FILE";
pub const NODE_EXTRA_CA_CERTS_ENV: &str = "NODE_EXTRA_CA_CERTS";

pub const CERTINJECTOR_COMPONENT: &str = "certinjector";
pub const CERTINJECTOR_LOG_CONFIG_FILE_ENV: &str = "CERTINJECTOR_LOG_CONFIG_FILE";
pub const CERTINJECTOR_LOG_CONFIG_FILE: &str = "/opt/certinjector/log4rs.yaml";

pub const METRIC_PODS_MUTATED: &str = "certinjector_pods_mutated";
pub const METRIC_PODS_DELETED: &str = "certinjector_pods_deleted";
