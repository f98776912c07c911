use std::collections::BTreeMap;

use kube::Resource;

pub trait Named {
    fn name(&self) -> String;
}

pub trait MaybeNamespaced {
    fn namespace(&self) -> Option<String>;
}

pub trait Annotated {
    fn annotations(&self) -> Option<&BTreeMap<String, String>>;

    fn annotation(&self, annotation: &str) -> Option<&String> {
        self.annotations().and_then(|m| m.get(annotation))
    }
}

pub trait ObjectRequest<O: Resource> {
    fn object(&self) -> Option<&O>;
}

/// `namespace/name` of an entity, used in logs and errors.
pub trait Identified: Named + MaybeNamespaced {
    fn object_id(&self) -> String {
        match MaybeNamespaced::namespace(self) {
            Some(ns) => format!("{}/{}", ns, Named::name(self)),
            None => Named::name(self),
        }
    }
}

impl<T: Named + MaybeNamespaced> Identified for T {}
