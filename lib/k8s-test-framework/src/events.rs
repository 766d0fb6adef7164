//! Event lookup.

use k8s_openapi::api::core::v1::Event;
use kube::{Api, api::ListParams};
use snafu::ResultExt;

use crate::{ApiSnafu, Framework, Result};

/// What an event must look like to match.
#[derive(Clone, Debug, Default)]
pub struct EventFilter {
    /// Match events whose message does NOT contain `message`.
    pub negate: bool,
    pub message: String,
    pub kind: Option<String>,
    pub name: Option<String>,
    pub reason: Option<String>,
}

impl EventFilter {
    pub fn matches(&self, event: &Event) -> bool {
        let message = event.message.as_deref().unwrap_or_default();
        if message.contains(&self.message) == self.negate {
            return false;
        }
        let equals = |expected: &Option<String>, actual: Option<&str>| {
            expected.as_deref().is_none_or(|expected| Some(expected) == actual)
        };
        equals(&self.reason, event.reason.as_deref())
            && equals(&self.kind, event.involved_object.kind.as_deref())
            && equals(&self.name, event.involved_object.name.as_deref())
    }
}

impl Framework {
    /// Whether some event in `namespace` matches `filter`.
    pub async fn has_event(&self, namespace: &str, filter: &EventFilter) -> Result<bool> {
        let api: Api<Event> = Api::namespaced(self.client(), namespace);
        let events = api.list(&ListParams::default()).await.context(ApiSnafu {
            action: format!("list events in {namespace}"),
        })?;
        Ok(events.items.iter().any(|event| filter.matches(event)))
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::ObjectReference;

    use super::*;

    fn event(message: &str, reason: &str, kind: &str, name: &str) -> Event {
        Event {
            message: Some(message.into()),
            reason: Some(reason.into()),
            involved_object: ObjectReference {
                kind: Some(kind.into()),
                name: Some(name.into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn message_and_filters() {
        let e = event("Back-off pulling image", "BackOff", "Pod", "web-1");
        let mut filter = EventFilter {
            message: "pulling image".into(),
            ..Default::default()
        };
        assert!(filter.matches(&e));

        filter.reason = Some("BackOff".into());
        filter.kind = Some("Pod".into());
        assert!(filter.matches(&e));

        filter.name = Some("web-2".into());
        assert!(!filter.matches(&e));
    }

    #[test]
    fn negated_message() {
        let e = event("Started container", "Started", "Pod", "web-1");
        let filter = EventFilter {
            negate: true,
            message: "OOMKilled".into(),
            ..Default::default()
        };
        assert!(filter.matches(&e));
    }
}
