//! Custom Resource Definitions for the Child Resource Operator

mod my_child_resource;
mod my_resource;

pub use my_child_resource::*;
pub use my_resource::*;

use kube::CustomResourceExt;

/// API group shared by the parent and child resources
pub const API_GROUP: &str = "sample.k8s-controller.ad";

/// Generate all CRD YAML manifests
pub fn generate_crds() -> Result<Vec<String>, serde_yaml::Error> {
    Ok(vec![
        serde_yaml::to_string(&MyResource::crd())?,
        serde_yaml::to_string(&MyChildResource::crd())?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_both_crds() {
        let crds = generate_crds().unwrap();
        assert_eq!(crds.len(), 2);
        assert!(crds[0].contains("myresources.sample.k8s-controller.ad"));
        assert!(crds[1].contains("mychildresources.sample.k8s-controller.ad"));
    }

    #[test]
    fn child_crd_carries_schema_defaults() {
        let crd = serde_yaml::to_string(&MyChildResource::crd()).unwrap();
        assert!(crd.contains("ho-ho-ho"));
        assert!(crd.contains("status"));
    }
}
