//! # CRD Generator
//!
//! Generates the Kubernetes CustomResourceDefinition (CRD) YAML for the
//! `Instance` resource from its Rust type definition.
//!
//! ## Usage
//!
//! ```bash
//! # Generate CRD YAML
//! cargo run --bin crdgen > config/crd/instance.yaml
//!
//! # Generate and apply directly
//! cargo run --bin crdgen | kubectl apply -f -
//! ```
//!
//! The generated CRD includes:
//! - OpenAPI schema validation
//! - Printer columns for version, phase and reason
//! - Status subresource

use home_assistant_operator::crd::Instance;
use kube::CustomResourceExt;

fn main() {
    let crd = Instance::crd();

    match serde_yaml::to_string(&crd) {
        Ok(yaml) => {
            // Print header comments warning that this file should not be edited manually
            println!("# This file is auto-generated by crdgen");
            println!("# DO NOT EDIT THIS FILE MANUALLY");
            println!("# Change the types in src/crd/ and regenerate instead");
            println!("#");
            println!("---");
            print!("{yaml}");
        }
        Err(e) => {
            eprintln!("Failed to serialize CRD to YAML: {e}");
            std::process::exit(1);
        }
    }
}
