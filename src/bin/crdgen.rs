//! # CRD Generator
//!
//! Prints the `HostedControlPlane` CustomResourceDefinition as YAML.
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/hostedcontrolplane.yaml
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use controlplane_operator::crd::HostedControlPlane;
use kube::core::CustomResourceExt;

fn main() {
    let crd = HostedControlPlane::crd();

    match serde_yaml::to_string(&crd) {
        Ok(yaml) => {
            println!("# This file is auto-generated by crdgen");
            println!("# DO NOT EDIT THIS FILE MANUALLY");
            println!("# Change the types in src/crd/ instead");
            println!("---");
            print!("{yaml}");
        }
        Err(e) => {
            eprintln!("Failed to serialize CRD to YAML: {e}");
            std::process::exit(1);
        }
    }
}
