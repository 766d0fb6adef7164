//! Kubernetes test framework.
//!
//! [`Framework`] wraps a [`kube::Client`] with an API shaped after the
//! operations test scenarios need: listing and describing objects, running
//! commands inside pods, copying files, forwarding ports, applying manifests
//! and patching custom resources.

#![deny(missing_debug_implementations)]

pub mod access;
pub mod apply;
pub mod config_map;
pub mod copy;
pub mod custom_resource;
pub mod events;
pub mod exec;
mod framework;
pub mod patch;
pub mod port_forward;
pub mod resource;
pub mod util;
pub mod wait;
pub mod workload;

use snafu::Snafu;

pub use exec::ExecOutput;
pub use framework::Framework;
pub use resource::{OutputFormat, ResourceKind};

/// Errors produced while talking to the cluster.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Unable to read kube config {}: {}", path, source))]
    Kubeconfig {
        path: String,
        source: kube::config::KubeconfigError,
    },

    #[snafu(display("Unable to build Kubernetes client: {}", source))]
    BuildClient { source: kube::Error },

    #[snafu(display("Kubernetes API call failed while trying to {}: {}", action, source))]
    Api { action: String, source: kube::Error },

    #[snafu(display("Error obtaining {} information", kind))]
    NotFound { kind: String },

    #[snafu(display(
        "CRD definition {} not found. Check with kubectl get crd if it exists",
        name
    ))]
    CrdNotFound { name: String },

    #[snafu(display("Custom resource {} has no field {}", name, field))]
    MissingField { name: String, field: String },

    #[snafu(display("{}", source))]
    Patch { source: patch::PatchError },

    #[snafu(display("Patch not supported in path {} for PVC", path))]
    UnsupportedPvcPath { path: String },

    #[snafu(display("Invalid selector '{}': expected key=value pairs", selector))]
    InvalidSelector { selector: String },

    #[snafu(display("Invalid service account '{}': expected namespace:name", value))]
    InvalidServiceAccount { value: String },

    #[snafu(display("Unable to serialize object: {}", source))]
    SerializeYaml { source: serde_yaml::Error },

    #[snafu(display("Unable to serialize object: {}", source))]
    SerializeJson { source: serde_json::Error },

    #[snafu(display("Unable to parse manifest {}: {}", path, source))]
    ParseManifest {
        path: String,
        source: serde_yaml::Error,
    },

    #[snafu(display("Manifest {} has an invalid apiVersion or kind", path))]
    ManifestType { path: String },

    #[snafu(display("I/O error on {}: {}", path, source))]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("Exec in pod {} failed: {}", pod, message))]
    Exec { pod: String, message: String },

    #[snafu(display("{}", message))]
    ExitCode { message: String },

    #[snafu(display(
        "Expected failureReason is {} but status returned is null with code {}",
        expected,
        code
    ))]
    MissingFailureReason { expected: String, code: i32 },

    #[snafu(display("Expected failure reason {} but got {}", expected, actual))]
    FailureReasonMismatch { expected: String, actual: String },

    #[snafu(display("exec failed: {} (exit code {:?})", command, code))]
    Command { command: String, code: Option<i32> },

    #[snafu(display("Port forward {} failed: {}", id, message))]
    PortForward { id: String, message: String },

    #[snafu(display("{}: expected {} but found {}", what, expected, actual))]
    Mismatch {
        what: String,
        expected: String,
        actual: String,
    },

    #[snafu(display(
        "Container {} not found for deployment {} in namespace {}",
        container,
        deployment,
        namespace
    ))]
    ContainerNotFound {
        container: String,
        deployment: String,
        namespace: String,
    },

    #[snafu(display("Invalid environment variables '{}': expected KEY=VALUE pairs", value))]
    InvalidEnv { value: String },
}

/// Result alias used across the framework.
pub type Result<T, E = Error> = std::result::Result<T, E>;
