use certinjector_common::errors::CertInjectorError;
use kube::core::admission::AdmissionResponse;

#[derive(Debug)]
pub enum MutationError {
    WithResponse(Box<AdmissionResponse>, CertInjectorError),
    WithoutResponse(CertInjectorError),
}

impl MutationError {
    pub fn from_admission_response(
        response: Box<AdmissionResponse>,
    ) -> impl FnOnce(CertInjectorError) -> Self {
        move |e: CertInjectorError| MutationError::WithResponse(response, e)
    }
}

impl From<CertInjectorError> for MutationError {
    fn from(e: CertInjectorError) -> Self {
        MutationError::WithoutResponse(e)
    }
}
