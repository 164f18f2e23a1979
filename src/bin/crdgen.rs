//! CRD YAML Generator
//!
//! Generates Kubernetes CRD manifests for `ClusterBundle` and the legacy
//! `Bundle` schema.
//!
//! Usage: cargo run --bin crdgen > deploy/crds/all.yaml

use trust_manager::crd::generate_crds;

fn main() {
    for crd in generate_crds() {
        println!("---");
        print!("{}", crd);
    }
}
