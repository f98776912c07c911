pub mod annotations;
pub mod compliance;
pub mod constants;
pub mod errors;
pub mod kubernetes;
pub mod metrics;
pub mod traits;
