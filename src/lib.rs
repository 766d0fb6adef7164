//! Behaviour-driven step library for Kubernetes, Gosec, S3 and LDAP
//! environments.
//!
//! Scenarios are written in Gherkin and executed by the `bdt` binary. Each
//! step is a thin function in [`steps`] that expands placeholders through the
//! run's [`properties::PropertyStore`] and calls into one of the core
//! modules below.

#![deny(missing_debug_implementations)]

pub mod aws;
pub mod cli;
pub mod command;
pub mod config;
pub mod cookies;
pub mod gosec;
pub mod json;
pub mod keos;
pub mod ldap;
pub mod modify;
pub mod properties;
pub mod rest;
pub mod secrets;
pub mod steps;
pub mod trace;
pub mod version;

pub use k8s_test_framework as k8s;

pub type Error = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub fn get_version() -> String {
    let pkg_version = env!("CARGO_PKG_VERSION");
    let target = std::env::consts::ARCH;
    format!("{pkg_version} ({target})")
}
