use const_format::formatcp;

const DOMAIN_ANNOTATION: &str = "microcumul.us";

macro_rules! microcumulus_annotate {
    ($annotation:literal) => {{
        formatcp!("{}/{}", DOMAIN_ANNOTATION, $annotation)
    }};
}

/// Names the Secret holding the CA bundle to inject. Its presence (non empty)
/// is what makes a pod a candidate for injection.
pub const CERTINJECTOR_ANNOTATION_INJECT_SSL: &str = microcumulus_annotate!("injectssl");
