//! Local port forwarding to pods and services.

use std::str::FromStr;

use k8s_openapi::{
    api::core::v1::{Pod, Service},
    apimachinery::pkg::util::intstr::IntOrString,
};
use kube::{Api, api::ListParams};
use snafu::{OptionExt, ResultExt};
use tokio::{net::TcpListener, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{ApiSnafu, Framework, IoSnafu, NotFoundSnafu, PortForwardSnafu, Result};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// What a forward points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    Pod,
    Service,
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pod" => Ok(Self::Pod),
            "service" => Ok(Self::Service),
            other => Err(format!("cannot forward to {other}")),
        }
    }
}

/// Open forwards, in the order they were opened.
#[derive(Debug, Default)]
pub struct PortForwards {
    open: Vec<(String, JoinHandle<()>)>,
}

impl PortForwards {
    fn insert(&mut self, id: String, handle: JoinHandle<()>) {
        if let Some(position) = self.open.iter().position(|(open, _)| *open == id) {
            let (_, previous) = self.open.remove(position);
            previous.abort();
        }
        self.open.push((id, handle));
    }

    /// Stop the forward with `id`, or the most recently opened one.
    fn close(&mut self, id: Option<&str>) -> Option<String> {
        let position = match id {
            Some(id) => self.open.iter().position(|(open, _)| open == id)?,
            None => self.open.len().checked_sub(1)?,
        };
        let (id, handle) = self.open.remove(position);
        handle.abort();
        Some(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.open.iter().map(|(id, _)| id.as_str())
    }
}

impl Drop for PortForwards {
    fn drop(&mut self) {
        for (_, handle) in self.open.drain(..) {
            handle.abort();
        }
    }
}

/// The id used when the caller does not choose one.
pub fn default_id(name: &str, namespace: &str, container_port: u16, local_port: u16) -> String {
    format!("{name}_{namespace}_{container_port}_{local_port}")
}

async fn forward_connection(
    api: &Api<Pod>,
    pod: &str,
    port: u16,
    mut socket: tokio::net::TcpStream,
) -> Result<(), BoxError> {
    let mut forwarder = api.portforward(pod, &[port]).await?;
    let mut upstream = forwarder
        .take_stream(port)
        .ok_or("port forward stream unavailable")?;
    tokio::io::copy_bidirectional(&mut socket, &mut upstream).await?;
    drop(upstream);
    forwarder.join().await?;
    Ok(())
}

impl Framework {
    /// Resolve a service port to a running backing pod and its target port.
    async fn service_backend(&self, name: &str, namespace: &str, port: u16) -> Result<(String, u16)> {
        let services: Api<Service> = Api::namespaced(self.client(), namespace);
        let service = services.get(name).await.context(ApiSnafu {
            action: format!("get service {name}"),
        })?;
        let spec = service.spec.unwrap_or_default();

        let selector = spec
            .selector
            .unwrap_or_default()
            .into_iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(",");
        let pods: Api<Pod> = Api::namespaced(self.client(), namespace);
        let candidates = pods
            .list(&ListParams::default().labels(&selector))
            .await
            .context(ApiSnafu {
                action: format!("list pods behind service {name}"),
            })?;
        let pod = candidates
            .items
            .into_iter()
            .find(|pod| {
                pod.status.as_ref().and_then(|s| s.phase.as_deref()) == Some("Running")
            })
            .context(NotFoundSnafu {
                kind: format!("running pod for service {name}"),
            })?;

        let service_port = spec
            .ports
            .unwrap_or_default()
            .into_iter()
            .find(|p| p.port == i32::from(port));
        let target = match service_port.and_then(|p| p.target_port) {
            Some(IntOrString::Int(target)) => u16::try_from(target).unwrap_or(port),
            Some(IntOrString::String(port_name)) => pod
                .spec
                .iter()
                .flat_map(|spec| spec.containers.iter())
                .flat_map(|container| container.ports.iter().flatten())
                .find(|p| p.name.as_deref() == Some(port_name.as_str()))
                .and_then(|p| u16::try_from(p.container_port).ok())
                .unwrap_or(port),
            None => port,
        };

        let pod_name = pod.metadata.name.context(NotFoundSnafu {
            kind: format!("running pod for service {name}"),
        })?;
        Ok((pod_name, target))
    }

    /// Listen on `127.0.0.1:local_port` and forward every connection to
    /// `container_port` of the target. Returns the forward id.
    pub async fn forward_port(
        &mut self,
        target: Target,
        name: &str,
        namespace: Option<&str>,
        container_port: u16,
        local_port: u16,
        id: Option<&str>,
    ) -> Result<String> {
        let client = self.client();
        let namespace = namespace.unwrap_or_else(|| client.default_namespace()).to_owned();
        let id = id
            .map(str::to_owned)
            .unwrap_or_else(|| default_id(name, &namespace, container_port, local_port));

        let (pod, port) = match target {
            Target::Pod => (name.to_owned(), container_port),
            Target::Service => self.service_backend(name, &namespace, container_port).await?,
        };

        let address = format!("127.0.0.1:{local_port}");
        let listener = TcpListener::bind(&address)
            .await
            .context(IoSnafu { path: &address })?;
        let api: Api<Pod> = Api::namespaced(client, &namespace);

        let task_id = id.clone();
        let handle = tokio::spawn(async move {
            loop {
                let (socket, peer) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(error) => {
                        warn!(message = "Port forward listener failed.", id = %task_id, %error);
                        break;
                    }
                };
                debug!(message = "Forwarding connection.", id = %task_id, %peer);
                let api = api.clone();
                let pod = pod.clone();
                let task_id = task_id.clone();
                tokio::spawn(async move {
                    if let Err(error) = forward_connection(&api, &pod, port, socket).await {
                        warn!(message = "Forwarded connection failed.", id = %task_id, %error);
                    }
                });
            }
        });

        self.port_forwards.insert(id.clone(), handle);
        info!(message = "Port forward opened.", %id, %local_port, %container_port);
        Ok(id)
    }

    /// Close the forward with `id`, or the last one opened.
    pub fn close_port_forward(&mut self, id: Option<&str>) -> Result<()> {
        match self.port_forwards.close(id) {
            Some(id) => {
                info!(message = "Port forward closed.", %id);
                Ok(())
            }
            None => PortForwardSnafu {
                id: id.unwrap_or("<last>"),
                message: "no such port forward is open",
            }
            .fail(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_id_format() {
        assert_eq!(default_id("vault", "keos-core", 8200, 8201), "vault_keos-core_8200_8201");
    }

    #[tokio::test]
    async fn close_last_or_by_id() {
        let mut forwards = PortForwards::default();
        forwards.insert("a".into(), tokio::spawn(std::future::pending()));
        forwards.insert("b".into(), tokio::spawn(std::future::pending()));
        forwards.insert("c".into(), tokio::spawn(std::future::pending()));

        assert_eq!(forwards.close(Some("a")).as_deref(), Some("a"));
        assert_eq!(forwards.close(None).as_deref(), Some("c"));
        assert_eq!(forwards.ids().collect::<Vec<_>>(), vec!["b"]);
        assert_eq!(forwards.close(Some("missing")), None);
    }

    #[tokio::test]
    async fn reopening_an_id_replaces_it() {
        let mut forwards = PortForwards::default();
        forwards.insert("a".into(), tokio::spawn(std::future::pending()));
        forwards.insert("a".into(), tokio::spawn(std::future::pending()));
        assert_eq!(forwards.ids().collect::<Vec<_>>(), vec!["a"]);
    }
}
