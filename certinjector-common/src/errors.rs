use std::fmt::Display;

#[derive(Debug)]
pub struct CertInjectorError {
    pub who: Option<String>,
    pub error: String,
}

impl CertInjectorError {
    pub fn new(error: String, who: Option<String>) -> Self {
        CertInjectorError { error, who }
    }

    pub fn from_string(error: String) -> Self {
        CertInjectorError { error, who: None }
    }

    pub fn from_error<E: Display>(prefix: &str) -> impl Fn(E) -> Self + '_ {
        move |e: E| CertInjectorError::from_string(format!("{}: {}", prefix, e))
    }

    /// Attaches the object the error is about, usually `namespace/name`.
    pub fn with_object(self, who: String) -> Self {
        CertInjectorError {
            error: self.error,
            who: Some(who),
        }
    }
}

impl Display for CertInjectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.who {
            Some(who) => write!(f, "CertInjector [{}] error: {}", who, self.error),
            None => write!(f, "CertInjector error: {}", self.error),
        }
    }
}

impl std::error::Error for CertInjectorError {}

impl From<&str> for CertInjectorError {
    fn from(error: &str) -> Self {
        CertInjectorError::from_string(error.to_string())
    }
}

impl From<String> for CertInjectorError {
    fn from(error: String) -> Self {
        CertInjectorError::from_string(error)
    }
}

impl From<serde_json::error::Error> for CertInjectorError {
    fn from(error: serde_json::error::Error) -> Self {
        CertInjectorError::from_string(error.to_string())
    }
}

impl From<kube::Error> for CertInjectorError {
    fn from(error: kube::Error) -> Self {
        CertInjectorError::from_string(format!("Kubernetes API error: {}", error))
    }
}

impl From<prometheus::Error> for CertInjectorError {
    fn from(error: prometheus::Error) -> Self {
        CertInjectorError::from_string(format!("Metrics error: {}", error))
    }
}
