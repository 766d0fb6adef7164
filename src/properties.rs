//! Key/value store passing values between the steps of a run.

use std::{collections::HashMap, sync::LazyLock};

use regex::{Captures, Regex};

/// Property holding the active topology.
pub const KEOS_ENV: &str = "isKeosEnv";

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([!$])\{([^{}]+)\}").expect("valid placeholder regex"));

#[derive(Clone, Debug, Default)]
pub struct PropertyStore {
    values: HashMap<String, String>,
}

impl PropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// The value of `key`, treating an empty value as absent.
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|value| !value.is_empty())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Whether the scenario targets a Keos cluster rather than DCOS.
    pub fn is_keos(&self) -> bool {
        self.get(KEOS_ENV) == Some("true")
    }

    /// Replace `!{NAME}` with the property `NAME` and `${NAME}` with the
    /// environment variable `NAME`. Unknown names are left as written.
    pub fn expand(&self, text: &str) -> String {
        self.expand_with(text, |name| std::env::var(name).ok())
    }

    fn expand_with(&self, text: &str, env: impl Fn(&str) -> Option<String>) -> String {
        PLACEHOLDER
            .replace_all(text, |captures: &Captures<'_>| {
                let name = &captures[2];
                let value = match &captures[1] {
                    "!" => self.get(name).map(str::to_owned),
                    _ => env(name),
                };
                value.unwrap_or_else(|| captures[0].to_owned())
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> PropertyStore {
        let mut props = PropertyStore::new();
        props.set("POD", "web-0");
        props.set("NS", "keos-core");
        props
    }

    #[test]
    fn set_get_remove() {
        let mut props = store();
        assert_eq!(props.get("POD"), Some("web-0"));
        assert!(props.contains("NS"));
        assert_eq!(props.remove("NS").as_deref(), Some("keos-core"));
        assert!(!props.contains("NS"));
        props.set("EMPTY", "");
        assert_eq!(props.non_empty("EMPTY"), None);
    }

    #[test]
    fn keos_flag() {
        let mut props = PropertyStore::new();
        assert!(!props.is_keos());
        props.set(KEOS_ENV, "true");
        assert!(props.is_keos());
        props.set(KEOS_ENV, "false");
        assert!(!props.is_keos());
    }

    #[test]
    fn expands_properties_and_env() {
        let props = store();
        let env = |name: &str| (name == "HOME_DIR").then(|| "/home/qa".to_owned());
        assert_eq!(
            props.expand_with("!{POD} in !{NS} from ${HOME_DIR}", env),
            "web-0 in keos-core from /home/qa"
        );
    }

    #[test]
    fn unknown_names_are_kept() {
        let props = store();
        assert_eq!(
            props.expand_with("!{MISSING}/${NOPE}/!{POD}", |_| None),
            "!{MISSING}/${NOPE}/web-0"
        );
    }

    #[test]
    fn single_pass() {
        let mut props = PropertyStore::new();
        props.set("A", "!{B}");
        props.set("B", "b");
        assert_eq!(props.expand_with("!{A}", |_| None), "!{B}");
    }
}
