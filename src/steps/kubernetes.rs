use std::{collections::BTreeMap, sync::Arc, time::Duration};

use cucumber::{gherkin::Step, given, then, when};
use snafu::OptionExt;
use tracing::{debug, info, warn};

use super::{AssertionSnafu, BdtWorld, InvalidArgumentSnafu, StepError, check, opt, parse};
use crate::{
    Result, json,
    k8s::{
        Framework, OutputFormat, ResourceKind,
        access::QuotaLimits,
        apply::CustomResourceDefinitionContext,
        events::EventFilter,
        exec::{self, ExecOutput},
        patch::FieldPatch,
        port_forward::Target,
        resource::ListFilter,
        wait,
        workload::{self, AppSelector, EnvEdit, PodPhase, RunPod},
    },
    keos::WorkspaceLoader,
    secrets,
};

const COPY_ATTEMPTS: usize = 5;
const COPY_CHECK_TIMEOUT: Duration = Duration::from_secs(15);

/// `k=v,k2=v2` labels of a new namespace.
fn parse_labels(labels: &str) -> Result<BTreeMap<String, String>, StepError> {
    labels
        .split(',')
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
            _ => InvalidArgumentSnafu {
                what: "label",
                value: pair,
            }
            .fail(),
        })
        .collect()
}

/// First two cells of each row as key/value pairs.
fn pairs(rows: &[Vec<String>]) -> Vec<(String, String)> {
    rows.iter()
        .filter_map(|row| match row.as_slice() {
            [key, value, ..] => Some((key.clone(), value.clone())),
            _ => None,
        })
        .collect()
}

fn first_column(rows: Vec<Vec<String>>) -> Vec<String> {
    rows.into_iter()
        .filter_map(|row| row.into_iter().next())
        .collect()
}

fn ready_state(state: &str) -> Option<bool> {
    opt(state).map(|state| state == "ready")
}

fn seconds(timeout: u64, interval: u64) -> (Duration, Duration) {
    (Duration::from_secs(timeout), Duration::from_secs(interval))
}

fn exit_status(value: &str) -> Result<i32, StepError> {
    opt(value).map_or(Ok(0), |value| parse("exit status", value))
}

#[given(regex = r"^I load Kubernetes configuration from workspace( forcefully)?$")]
#[when(regex = r"^I load Kubernetes configuration from workspace( forcefully)?$")]
#[then(regex = r"^I load Kubernetes configuration from workspace( forcefully)?$")]
async fn load_workspace(world: &mut BdtWorld, forcefully: String) -> Result<()> {
    if opt(&forcefully).is_none() && world.props.contains("CLUSTER_KUBE_CONFIG_PATH") {
        debug!(message = "Workspace already loaded.");
        return Ok(());
    }
    let settings = Arc::clone(&world.settings);
    if let Some(framework) = WorkspaceLoader::new(&settings, &mut world.props)
        .load()
        .await?
    {
        world.set_framework(framework);
    }
    Ok(())
}

#[given(regex = r"^I connect to Kubernetes cluster using config file located at '(.+?)'$")]
#[when(regex = r"^I connect to Kubernetes cluster using config file located at '(.+?)'$")]
#[then(regex = r"^I connect to Kubernetes cluster using config file located at '(.+?)'$")]
async fn connect(world: &mut BdtWorld, path: String) -> Result<()> {
    let path = world.expand(&path);
    let framework = Framework::connect(&path).await?;
    world.set_framework(framework);
    Ok(())
}

#[given(
    regex = r"^I get (pods|configmaps|serviceaccounts|replicasets|secrets|clusterroles|clusterrolebindings|statefulsets|roles|rolebindings|customresourcedefinitions|deployments|services|ingress|persistentVolumeClaims)(?: in namespace '(.+?)')? and save it in environment variable '(.+?)'$"
)]
#[when(
    regex = r"^I get (pods|configmaps|serviceaccounts|replicasets|secrets|clusterroles|clusterrolebindings|statefulsets|roles|rolebindings|customresourcedefinitions|deployments|services|ingress|persistentVolumeClaims)(?: in namespace '(.+?)')? and save it in environment variable '(.+?)'$"
)]
#[then(
    regex = r"^I get (pods|configmaps|serviceaccounts|replicasets|secrets|clusterroles|clusterrolebindings|statefulsets|roles|rolebindings|customresourcedefinitions|deployments|services|ingress|persistentVolumeClaims)(?: in namespace '(.+?)')? and save it in environment variable '(.+?)'$"
)]
async fn list(world: &mut BdtWorld, kind: String, namespace: String, variable: String) -> Result<()> {
    let kind: ResourceKind = parse("resource kind", &kind)?;
    let namespace = opt(&namespace).map(|namespace| world.expand(namespace));
    let names = world
        .framework()?
        .list_names(kind, namespace.as_deref(), &ListFilter::default())
        .await?;
    world.save(&names, Some(&variable), None).await?;
    Ok(())
}

#[given(regex = r"^I get all namespaces and save it in environment variable '(.+?)'$")]
#[when(regex = r"^I get all namespaces and save it in environment variable '(.+?)'$")]
#[then(regex = r"^I get all namespaces and save it in environment variable '(.+?)'$")]
async fn list_namespaces(world: &mut BdtWorld, variable: String) -> Result<()> {
    let names = world
        .framework()?
        .list_names(ResourceKind::Namespace, None, &ListFilter::default())
        .await?;
    world.save(&names, Some(&variable), None).await?;
    Ok(())
}

#[given(
    regex = r"^I check that there is( not)? an event that contains the message '(.+?)' in namespace '(.+?)'(?: with resource type '(.+?)')?(?: with resource name '(.+?)')?(?: with reason '(.+?)')?$"
)]
#[when(
    regex = r"^I check that there is( not)? an event that contains the message '(.+?)' in namespace '(.+?)'(?: with resource type '(.+?)')?(?: with resource name '(.+?)')?(?: with reason '(.+?)')?$"
)]
#[then(
    regex = r"^I check that there is( not)? an event that contains the message '(.+?)' in namespace '(.+?)'(?: with resource type '(.+?)')?(?: with resource name '(.+?)')?(?: with reason '(.+?)')?$"
)]
async fn check_event(
    world: &mut BdtWorld,
    not: String,
    message: String,
    namespace: String,
    kind: String,
    name: String,
    reason: String,
) -> Result<()> {
    let [message, namespace] = world.expand_all([message, namespace]);
    let filter = EventFilter {
        negate: opt(&not).is_some(),
        message,
        kind: opt(&kind).map(|kind| world.expand(kind)),
        name: opt(&name).map(|name| world.expand(name)),
        reason: opt(&reason).map(|reason| world.expand(reason)),
    };
    let found = world.framework()?.has_event(&namespace, &filter).await?;
    check(
        found,
        format!(
            "There is no event that contains the message {} in namespace {namespace}",
            filter.message
        ),
    )?;
    Ok(())
}

#[given(
    regex = r"^I describe (pod|service|deployment|configmap|replicaset|serviceaccount|secret|clusterrole|clusterrolebinding|statefulset|role|rolebinding|ingress|persistentVolumeClaims|job|resourcequota) with name '(.+?)'(?: in namespace '(.+?)')?(?: in '(yaml|json)' format)?(?: and save it in environment variable '(.*?)')?(?: and save it in file '(.*?)')?$"
)]
#[when(
    regex = r"^I describe (pod|service|deployment|configmap|replicaset|serviceaccount|secret|clusterrole|clusterrolebinding|statefulset|role|rolebinding|ingress|persistentVolumeClaims|job|resourcequota) with name '(.+?)'(?: in namespace '(.+?)')?(?: in '(yaml|json)' format)?(?: and save it in environment variable '(.*?)')?(?: and save it in file '(.*?)')?$"
)]
#[then(
    regex = r"^I describe (pod|service|deployment|configmap|replicaset|serviceaccount|secret|clusterrole|clusterrolebinding|statefulset|role|rolebinding|ingress|persistentVolumeClaims|job|resourcequota) with name '(.+?)'(?: in namespace '(.+?)')?(?: in '(yaml|json)' format)?(?: and save it in environment variable '(.*?)')?(?: and save it in file '(.*?)')?$"
)]
async fn describe(
    world: &mut BdtWorld,
    kind: String,
    name: String,
    namespace: String,
    format: String,
    variable: String,
    file: String,
) -> Result<()> {
    let kind: ResourceKind = parse("resource kind", &kind)?;
    let format: OutputFormat = opt(&format).map_or(Ok(OutputFormat::Yaml), |format| {
        parse("output format", format)
    })?;
    let name = world.expand(&name);
    let namespace = opt(&namespace).map(|namespace| world.expand(namespace));
    let description = world
        .framework()?
        .describe(kind, &name, namespace.as_deref(), format)
        .await?;
    debug!(message = "Described object.", %kind, %name, response = %description);
    world.save(&description, opt(&variable), opt(&file)).await?;
    Ok(())
}

#[given(
    regex = r"^I describe custom resource '(.+?)' with name '(.+?)' in namespace '(.+?)'(?: in '(yaml|json|enrichedJson)' format)?(?: and save it in file '(.*?)')?$"
)]
#[when(
    regex = r"^I describe custom resource '(.+?)' with name '(.+?)' in namespace '(.+?)'(?: in '(yaml|json|enrichedJson)' format)?(?: and save it in file '(.*?)')?$"
)]
#[then(
    regex = r"^I describe custom resource '(.+?)' with name '(.+?)' in namespace '(.+?)'(?: in '(yaml|json|enrichedJson)' format)?(?: and save it in file '(.*?)')?$"
)]
async fn describe_custom_resource(
    world: &mut BdtWorld,
    crd: String,
    name: String,
    namespace: String,
    format: String,
    file: String,
) -> Result<()> {
    let [crd, name, namespace] = world.expand_all([crd, name, namespace]);
    let resource = world
        .framework()?
        .describe_custom_resource(&crd, &name, &namespace)
        .await?;
    let description = match opt(&format).unwrap_or("yaml") {
        "json" => serde_json::to_string(&resource)?,
        "enrichedJson" => serde_json::to_string(&json::enriched(&resource))?,
        _ => serde_yaml::to_string(&resource)?,
    };
    debug!(message = "Described custom resource.", %crd, %name, response = %description);
    world.save(&description, None, opt(&file)).await?;
    Ok(())
}

#[given(
    regex = r"^I run pod with name '(.+?)', in namespace '(.+?)', with image '(.+?)'(?:, with image pull policy '(.+?)')?, restart policy '(.+?)', service account '(.+?)',(?: environment variables '(.+?)',)? command '(.+?)' and the following arguments:$"
)]
#[when(
    regex = r"^I run pod with name '(.+?)', in namespace '(.+?)', with image '(.+?)'(?:, with image pull policy '(.+?)')?, restart policy '(.+?)', service account '(.+?)',(?: environment variables '(.+?)',)? command '(.+?)' and the following arguments:$"
)]
#[then(
    regex = r"^I run pod with name '(.+?)', in namespace '(.+?)', with image '(.+?)'(?:, with image pull policy '(.+?)')?, restart policy '(.+?)', service account '(.+?)',(?: environment variables '(.+?)',)? command '(.+?)' and the following arguments:$"
)]
#[allow(clippy::too_many_arguments)]
async fn run_pod(
    world: &mut BdtWorld,
    name: String,
    namespace: String,
    image: String,
    pull_policy: String,
    restart_policy: String,
    service_account: String,
    env: String,
    command: String,
    step: &Step,
) -> Result<()> {
    let [name, namespace, image, restart_policy, service_account, command] =
        world.expand_all([name, namespace, image, restart_policy, service_account, command]);
    let env = match opt(&env) {
        Some(env) => workload::parse_env(&world.expand(env))?,
        None => BTreeMap::new(),
    };
    let pod = RunPod {
        name,
        namespace,
        image,
        image_pull_policy: opt(&pull_policy).map(|policy| world.expand(policy)),
        restart_policy,
        service_account,
        env,
        command,
        args: first_column(world.expanded_table(step)?),
    };
    world.framework()?.run_pod(&pod).await?;
    Ok(())
}

#[given(
    regex = r"^in less than '(\d+)' seconds, checking each '(\d+)' seconds, pod with name '(.+?)' in namespace '(.+?)' has '(running|failed|succeeded)' status(?: and '(ready|not ready)' state)?$"
)]
#[when(
    regex = r"^in less than '(\d+)' seconds, checking each '(\d+)' seconds, pod with name '(.+?)' in namespace '(.+?)' has '(running|failed|succeeded)' status(?: and '(ready|not ready)' state)?$"
)]
#[then(
    regex = r"^in less than '(\d+)' seconds, checking each '(\d+)' seconds, pod with name '(.+?)' in namespace '(.+?)' has '(running|failed|succeeded)' status(?: and '(ready|not ready)' state)?$"
)]
#[allow(clippy::too_many_arguments)]
async fn wait_for_pod(
    world: &mut BdtWorld,
    timeout: u64,
    interval: u64,
    name: String,
    namespace: String,
    phase: String,
    state: String,
) -> Result<()> {
    let [name, namespace] = world.expand_all([name, namespace]);
    let phase: PodPhase = parse("pod status", &phase)?;
    let ready = ready_state(&state);
    let framework = world.framework()?;
    let (name, namespace) = (name.as_str(), namespace.as_str());
    let (timeout, interval) = seconds(timeout, interval);
    wait::until(timeout, interval, || async move {
        workload::check_pod(&framework.pod(name, namespace).await?, phase, ready)
    })
    .await?;
    Ok(())
}

#[given(
    regex = r"^in less than '(\d+)' seconds, checking each '(\d+)' seconds, we have '(\d+)' pod/s with label filter '(.+?)' in namespace '(.+?)' having '(running|failed|succeeded)' status(?: and '(ready|not ready)' state)?$"
)]
#[when(
    regex = r"^in less than '(\d+)' seconds, checking each '(\d+)' seconds, we have '(\d+)' pod/s with label filter '(.+?)' in namespace '(.+?)' having '(running|failed|succeeded)' status(?: and '(ready|not ready)' state)?$"
)]
#[then(
    regex = r"^in less than '(\d+)' seconds, checking each '(\d+)' seconds, we have '(\d+)' pod/s with label filter '(.+?)' in namespace '(.+?)' having '(running|failed|succeeded)' status(?: and '(ready|not ready)' state)?$"
)]
#[allow(clippy::too_many_arguments)]
async fn wait_for_labelled_pods(
    world: &mut BdtWorld,
    timeout: u64,
    interval: u64,
    count: usize,
    labels: String,
    namespace: String,
    phase: String,
    state: String,
) -> Result<()> {
    let [labels, namespace] = world.expand_all([labels, namespace]);
    let phase: PodPhase = parse("pod status", &phase)?;
    let ready = ready_state(&state);
    let framework = world.framework()?;
    let (labels, namespace) = (labels.as_str(), namespace.as_str());
    let (timeout, interval) = seconds(timeout, interval);
    wait::until(timeout, interval, || async move {
        framework
            .check_pods_by_label(labels, namespace, count, phase, ready)
            .await
    })
    .await?;
    Ok(())
}

#[given(
    regex = r"^in less than '(\d+)' seconds, checking each '(\d+)' seconds, deployment with name '(.+?)' in namespace '(.+?)' has '(\d+)' replicas ready$"
)]
#[when(
    regex = r"^in less than '(\d+)' seconds, checking each '(\d+)' seconds, deployment with name '(.+?)' in namespace '(.+?)' has '(\d+)' replicas ready$"
)]
#[then(
    regex = r"^in less than '(\d+)' seconds, checking each '(\d+)' seconds, deployment with name '(.+?)' in namespace '(.+?)' has '(\d+)' replicas ready$"
)]
async fn wait_for_deployment(
    world: &mut BdtWorld,
    timeout: u64,
    interval: u64,
    name: String,
    namespace: String,
    expected: i32,
) -> Result<()> {
    let [name, namespace] = world.expand_all([name, namespace]);
    let framework = world.framework()?;
    let (name, namespace) = (name.as_str(), namespace.as_str());
    let (timeout, interval) = seconds(timeout, interval);
    wait::until(timeout, interval, || async move {
        let ready = framework.deployment_ready_replicas(name, namespace).await?;
        check(
            ready == expected,
            format!("# Ready Replicas of {name}: expected {expected} but found {ready}"),
        )?;
        Ok::<_, crate::Error>(())
    })
    .await?;
    Ok(())
}

#[given(
    regex = r"^in less than '(\d+)' seconds, checking each '(\d+)' seconds, statefulset with name '(.+?)' in namespace '(.+?)' has '(\d+)' replicas ready$"
)]
#[when(
    regex = r"^in less than '(\d+)' seconds, checking each '(\d+)' seconds, statefulset with name '(.+?)' in namespace '(.+?)' has '(\d+)' replicas ready$"
)]
#[then(
    regex = r"^in less than '(\d+)' seconds, checking each '(\d+)' seconds, statefulset with name '(.+?)' in namespace '(.+?)' has '(\d+)' replicas ready$"
)]
async fn wait_for_statefulset(
    world: &mut BdtWorld,
    timeout: u64,
    interval: u64,
    name: String,
    namespace: String,
    expected: i32,
) -> Result<()> {
    let [name, namespace] = world.expand_all([name, namespace]);
    let framework = world.framework()?;
    let (name, namespace) = (name.as_str(), namespace.as_str());
    let (timeout, interval) = seconds(timeout, interval);
    wait::until(timeout, interval, || async move {
        let ready = framework.statefulset_ready_replicas(name, namespace).await?;
        check(
            ready == expected,
            format!("# Ready Replicas of {name}: expected {expected} but found {ready}"),
        )?;
        Ok::<_, crate::Error>(())
    })
    .await?;
    Ok(())
}

#[given(
    regex = r"^in less than '(\d+)' seconds, checking each '(\d+)' seconds, custom resource '(.+?)' with name '(.+?)' in namespace '(.+?)' has '(\d+)' replicas ready$"
)]
#[when(
    regex = r"^in less than '(\d+)' seconds, checking each '(\d+)' seconds, custom resource '(.+?)' with name '(.+?)' in namespace '(.+?)' has '(\d+)' replicas ready$"
)]
#[then(
    regex = r"^in less than '(\d+)' seconds, checking each '(\d+)' seconds, custom resource '(.+?)' with name '(.+?)' in namespace '(.+?)' has '(\d+)' replicas ready$"
)]
#[allow(clippy::too_many_arguments)]
async fn wait_for_custom_resource(
    world: &mut BdtWorld,
    timeout: u64,
    interval: u64,
    crd: String,
    name: String,
    namespace: String,
    expected: i64,
) -> Result<()> {
    let [crd, name, namespace] = world.expand_all([crd, name, namespace]);
    let framework = world.framework()?;
    let (crd, name, namespace) = (crd.as_str(), name.as_str(), namespace.as_str());
    let (timeout, interval) = seconds(timeout, interval);
    wait::until(timeout, interval, || async move {
        let ready = framework
            .custom_resource_ready_replicas(crd, name, namespace)
            .await?;
        check(
            ready == expected,
            format!("# Ready Replicas of {crd} {name}: expected {expected} but found {ready}"),
        )?;
        Ok::<_, crate::Error>(())
    })
    .await?;
    Ok(())
}

#[given(
    regex = r"^in less than '(\d+)' seconds, checking each '(\d+)' seconds, custom resource '(.+?)' with name '(.+?)' in namespace '(.+?)' has '(.+?)' global status(?: and description '(.+?)')?$"
)]
#[when(
    regex = r"^in less than '(\d+)' seconds, checking each '(\d+)' seconds, custom resource '(.+?)' with name '(.+?)' in namespace '(.+?)' has '(.+?)' global status(?: and description '(.+?)')?$"
)]
#[then(
    regex = r"^in less than '(\d+)' seconds, checking each '(\d+)' seconds, custom resource '(.+?)' with name '(.+?)' in namespace '(.+?)' has '(.+?)' global status(?: and description '(.+?)')?$"
)]
#[allow(clippy::too_many_arguments)]
async fn wait_for_global_status(
    world: &mut BdtWorld,
    timeout: u64,
    interval: u64,
    crd: String,
    name: String,
    namespace: String,
    status: String,
    description: String,
) -> Result<()> {
    let [crd, name, namespace, status] = world.expand_all([crd, name, namespace, status]);
    let description = opt(&description).map(|description| world.expand(description));
    let framework = world.framework()?;
    let (crd, name, namespace) = (crd.as_str(), name.as_str(), namespace.as_str());
    let (expected_status, expected_description) = (status.as_str(), description.as_deref());
    let (timeout, interval) = seconds(timeout, interval);
    wait::until(timeout, interval, || async move {
        let (status, description) = framework
            .custom_resource_global_status(crd, name, namespace)
            .await?;
        check(
            status == expected_status,
            format!("# Global Status: expected {expected_status} but found {status}"),
        )?;
        if let Some(expected) = expected_description {
            check(
                description == expected,
                format!("# Global Status Description: expected {expected} but found {description}"),
            )?;
        }
        Ok::<_, crate::Error>(())
    })
    .await?;
    Ok(())
}

#[given(
    regex = r"^I create deployment with name '(.+?)', in namespace '(.+?)', with image '(.+?)'(?: and image pull policy '(.+?)')?$"
)]
#[when(
    regex = r"^I create deployment with name '(.+?)', in namespace '(.+?)', with image '(.+?)'(?: and image pull policy '(.+?)')?$"
)]
#[then(
    regex = r"^I create deployment with name '(.+?)', in namespace '(.+?)', with image '(.+?)'(?: and image pull policy '(.+?)')?$"
)]
async fn create_deployment(
    world: &mut BdtWorld,
    name: String,
    namespace: String,
    image: String,
    pull_policy: String,
) -> Result<()> {
    let [name, namespace, image] = world.expand_all([name, namespace, image]);
    let pull_policy = opt(&pull_policy).map(|policy| world.expand(policy));
    world
        .framework()?
        .create_deployment(&name, &namespace, &image, pull_policy.as_deref())
        .await?;
    Ok(())
}

#[given(regex = r"^I expose deployment with name '(.+?)', in namespace '(.+?)' in port '(\d+)'$")]
#[when(regex = r"^I expose deployment with name '(.+?)', in namespace '(.+?)' in port '(\d+)'$")]
#[then(regex = r"^I expose deployment with name '(.+?)', in namespace '(.+?)' in port '(\d+)'$")]
async fn expose_deployment(world: &mut BdtWorld, name: String, namespace: String, port: i32) -> Result<()> {
    let [name, namespace] = world.expand_all([name, namespace]);
    world
        .framework()?
        .expose_deployment(&name, Some(&name), "ClusterIP", &namespace, port, AppSelector::App)
        .await?;
    Ok(())
}

#[given(
    regex = r"^I expose deployment with name '(.+?)', in namespace '(.+?)' in port '(\d+)' with type '(ClusterIP|LoadBalancer)'(?: and service name '(.+?)')?( using CCT app selector)?$"
)]
#[when(
    regex = r"^I expose deployment with name '(.+?)', in namespace '(.+?)' in port '(\d+)' with type '(ClusterIP|LoadBalancer)'(?: and service name '(.+?)')?( using CCT app selector)?$"
)]
#[then(
    regex = r"^I expose deployment with name '(.+?)', in namespace '(.+?)' in port '(\d+)' with type '(ClusterIP|LoadBalancer)'(?: and service name '(.+?)')?( using CCT app selector)?$"
)]
#[allow(clippy::too_many_arguments)]
async fn expose_deployment_as(
    world: &mut BdtWorld,
    name: String,
    namespace: String,
    port: i32,
    service_type: String,
    service: String,
    cct_selector: String,
) -> Result<()> {
    let [name, namespace] = world.expand_all([name, namespace]);
    let service = opt(&service).map(|service| world.expand(service));
    let selector = if opt(&cct_selector).is_some() {
        AppSelector::Cct
    } else {
        AppSelector::App
    };
    world
        .framework()?
        .expose_deployment(
            &name,
            service.as_deref(),
            &service_type,
            &namespace,
            port,
            selector,
        )
        .await?;
    Ok(())
}

#[given(
    regex = r"^I get log from pod with name '(.+?)' in namespace '(.+?)'(?: and save it in environment variable '(.*?)')?(?: and save it in file '(.*?)')?$"
)]
#[when(
    regex = r"^I get log from pod with name '(.+?)' in namespace '(.+?)'(?: and save it in environment variable '(.*?)')?(?: and save it in file '(.*?)')?$"
)]
#[then(
    regex = r"^I get log from pod with name '(.+?)' in namespace '(.+?)'(?: and save it in environment variable '(.*?)')?(?: and save it in file '(.*?)')?$"
)]
async fn pod_log(
    world: &mut BdtWorld,
    name: String,
    namespace: String,
    variable: String,
    file: String,
) -> Result<()> {
    let [name, namespace] = world.expand_all([name, namespace]);
    let log = world.framework()?.pod_log(&name, &namespace).await?;
    world.save(&log, opt(&variable), opt(&file)).await?;
    Ok(())
}

/// Where the output of a command run in a pod is stored.
#[derive(Clone, Copy, Debug, Default)]
struct ExecTargets<'a> {
    stdout_variable: Option<&'a str>,
    stderr_variable: Option<&'a str>,
    stdout_file: Option<&'a str>,
    stderr_file: Option<&'a str>,
}

/// Pod, namespace and optional container, reason and timeout of a command.
struct ExecTarget<'a> {
    pod: &'a str,
    namespace: &'a str,
    container: &'a str,
    failure_reason: &'a str,
    timeout: &'a str,
}

async fn exec_and_save(
    world: &mut BdtWorld,
    target: ExecTarget<'_>,
    command: Vec<String>,
    targets: ExecTargets<'_>,
) -> Result<ExecOutput> {
    let [pod, namespace] = world.expand_all([target.pod.to_owned(), target.namespace.to_owned()]);
    let container = opt(target.container).map(|container| world.expand(container));
    let failure_reason = opt(target.failure_reason).map(|reason| world.expand(reason));
    let timeout = match opt(target.timeout) {
        Some(seconds) => Duration::from_secs(parse("timeout", seconds)?),
        None => world.settings.exec_timeout,
    };

    info!(message = "Executing command in pod.", %pod, %namespace, ?command);
    let output = world
        .framework()?
        .exec(&pod, &namespace, container.as_deref(), command, timeout)
        .await?;
    output.check(failure_reason.as_deref())?;

    world
        .save(&output.stdout, targets.stdout_variable, targets.stdout_file)
        .await?;
    world
        .save(&output.stderr, targets.stderr_variable, targets.stderr_file)
        .await?;
    Ok(output)
}

#[given(
    regex = r"^I execute '(.+?)' command in pod with name '(.+?)' in namespace '(.+?)'(?: in container '(.*?)')?(?: with failure reason '(.*?)')?(?: and save it in environment variable '(.+?)')?(?: and save stderr in environment variable '(.+?)')?(?: and save it in file '(.*?)')?(?: and save stderr in file '(.*?)')?(?: and set timeout with '(\d+)')?$"
)]
#[when(
    regex = r"^I execute '(.+?)' command in pod with name '(.+?)' in namespace '(.+?)'(?: in container '(.*?)')?(?: with failure reason '(.*?)')?(?: and save it in environment variable '(.+?)')?(?: and save stderr in environment variable '(.+?)')?(?: and save it in file '(.*?)')?(?: and save stderr in file '(.*?)')?(?: and set timeout with '(\d+)')?$"
)]
#[then(
    regex = r"^I execute '(.+?)' command in pod with name '(.+?)' in namespace '(.+?)'(?: in container '(.*?)')?(?: with failure reason '(.*?)')?(?: and save it in environment variable '(.+?)')?(?: and save stderr in environment variable '(.+?)')?(?: and save it in file '(.*?)')?(?: and save stderr in file '(.*?)')?(?: and set timeout with '(\d+)')?$"
)]
#[allow(clippy::too_many_arguments)]
async fn execute(
    world: &mut BdtWorld,
    command: String,
    pod: String,
    namespace: String,
    container: String,
    failure_reason: String,
    variable: String,
    stderr_variable: String,
    file: String,
    stderr_file: String,
    timeout: String,
) -> Result<()> {
    let command = exec::split_command(&world.expand(&command));
    let output = exec_and_save(
        world,
        ExecTarget {
            pod: &pod,
            namespace: &namespace,
            container: &container,
            failure_reason: &failure_reason,
            timeout: &timeout,
        },
        command,
        ExecTargets {
            stdout_variable: opt(&variable),
            stderr_variable: opt(&stderr_variable),
            stdout_file: opt(&file),
            stderr_file: opt(&stderr_file),
        },
    )
    .await?;
    if output.timed_out {
        warn!(message = "Command did not finish within the timeout.", %pod);
    }
    Ok(())
}

#[given(
    regex = r"^I execute the command defined in datatable in pod with name '(.+?)' in namespace '(.+?)'(?: in container '(.*?)')?(?: with failure reason '(.*?)')?(?: and save it in environment variable '(.+?)')?(?: and save stderr in environment variable '(.+?)')?(?: and save it in file '(.*?)')?(?: and save stderr in file '(.*?)')?(?: and set timeout with '(\d+)')?( and it doesn't return an exception if timeout is reached)?:$"
)]
#[when(
    regex = r"^I execute the command defined in datatable in pod with name '(.+?)' in namespace '(.+?)'(?: in container '(.*?)')?(?: with failure reason '(.*?)')?(?: and save it in environment variable '(.+?)')?(?: and save stderr in environment variable '(.+?)')?(?: and save it in file '(.*?)')?(?: and save stderr in file '(.*?)')?(?: and set timeout with '(\d+)')?( and it doesn't return an exception if timeout is reached)?:$"
)]
#[then(
    regex = r"^I execute the command defined in datatable in pod with name '(.+?)' in namespace '(.+?)'(?: in container '(.*?)')?(?: with failure reason '(.*?)')?(?: and save it in environment variable '(.+?)')?(?: and save stderr in environment variable '(.+?)')?(?: and save it in file '(.*?)')?(?: and save stderr in file '(.*?)')?(?: and set timeout with '(\d+)')?( and it doesn't return an exception if timeout is reached)?:$"
)]
#[allow(clippy::too_many_arguments)]
async fn execute_table(
    world: &mut BdtWorld,
    pod: String,
    namespace: String,
    container: String,
    failure_reason: String,
    variable: String,
    stderr_variable: String,
    file: String,
    stderr_file: String,
    timeout: String,
    tolerate_timeout: String,
    step: &Step,
) -> Result<()> {
    let command = world.expanded_table(step)?.into_iter().flatten().collect();
    let output = exec_and_save(
        world,
        ExecTarget {
            pod: &pod,
            namespace: &namespace,
            container: &container,
            failure_reason: &failure_reason,
            timeout: &timeout,
        },
        command,
        ExecTargets {
            stdout_variable: opt(&variable),
            stderr_variable: opt(&stderr_variable),
            stdout_file: opt(&file),
            stderr_file: opt(&stderr_file),
        },
    )
    .await?;
    check(
        !output.timed_out || opt(&tolerate_timeout).is_some(),
        "Latch could not terminate within specified time",
    )?;
    Ok(())
}

#[given(regex = r"^I apply configuration file located at '(.+?)' in namespace '(.+?)'$")]
#[when(regex = r"^I apply configuration file located at '(.+?)' in namespace '(.+?)'$")]
#[then(regex = r"^I apply configuration file located at '(.+?)' in namespace '(.+?)'$")]
async fn apply(world: &mut BdtWorld, file: String, namespace: String) -> Result<()> {
    let [file, namespace] = world.expand_all([file, namespace]);
    world.framework()?.apply_file(&file, &namespace).await?;
    Ok(())
}

#[given(
    regex = r"^I apply configuration file located at '(.+?)', in namespace '(.+?)', using the following CustomResourceDefinition: version '(.+?)', plural '(.+?)', kind '(.+?)', name '(.+?)', scope '(.+?)', group '(.+?)'(?:, and return an exception that contains '(.+?)')?$"
)]
#[when(
    regex = r"^I apply configuration file located at '(.+?)', in namespace '(.+?)', using the following CustomResourceDefinition: version '(.+?)', plural '(.+?)', kind '(.+?)', name '(.+?)', scope '(.+?)', group '(.+?)'(?:, and return an exception that contains '(.+?)')?$"
)]
#[then(
    regex = r"^I apply configuration file located at '(.+?)', in namespace '(.+?)', using the following CustomResourceDefinition: version '(.+?)', plural '(.+?)', kind '(.+?)', name '(.+?)', scope '(.+?)', group '(.+?)'(?:, and return an exception that contains '(.+?)')?$"
)]
#[allow(clippy::too_many_arguments)]
async fn apply_custom_resource(
    world: &mut BdtWorld,
    file: String,
    namespace: String,
    version: String,
    plural: String,
    kind: String,
    name: String,
    scope: String,
    group: String,
    expected_error: String,
) -> Result<()> {
    let [file, namespace, version, plural, kind, name, scope, group] =
        world.expand_all([file, namespace, version, plural, kind, name, scope, group]);
    let definition = CustomResourceDefinitionContext {
        version,
        plural,
        kind,
        name,
        scope,
        group,
    };
    let expected_error = opt(&expected_error).map(|message| world.expand(message));
    match world
        .framework()?
        .apply_custom_resource_file(&file, &namespace, &definition)
        .await
    {
        Ok(()) => Ok(()),
        Err(error) => match expected_error {
            Some(expected) => {
                let error = error.to_string();
                check(
                    error.contains(&expected),
                    format!("Expected an error containing '{expected}' but got: {error}"),
                )?;
                Ok(())
            }
            None => Err(error.into()),
        },
    }
}

#[given(regex = r"^I get custom resource '(.+?)' in namespace '(.+?)' and save it in environment variable '(.+?)'$")]
#[when(regex = r"^I get custom resource '(.+?)' in namespace '(.+?)' and save it in environment variable '(.+?)'$")]
#[then(regex = r"^I get custom resource '(.+?)' in namespace '(.+?)' and save it in environment variable '(.+?)'$")]
async fn list_custom_resources(
    world: &mut BdtWorld,
    crd: String,
    namespace: String,
    variable: String,
) -> Result<()> {
    let [crd, namespace] = world.expand_all([crd, namespace]);
    let names = world
        .framework()?
        .list_custom_resources(&crd, &namespace)
        .await?;
    world.save(&names, Some(&variable), None).await?;
    Ok(())
}

#[given(
    regex = r"^in less than '(\d+)' seconds, checking each '(\d+)' seconds, log of pod '(.+?)' in namespace '(.+?)' contains '(.+?)'$"
)]
#[when(
    regex = r"^in less than '(\d+)' seconds, checking each '(\d+)' seconds, log of pod '(.+?)' in namespace '(.+?)' contains '(.+?)'$"
)]
#[then(
    regex = r"^in less than '(\d+)' seconds, checking each '(\d+)' seconds, log of pod '(.+?)' in namespace '(.+?)' contains '(.+?)'$"
)]
async fn wait_for_log(
    world: &mut BdtWorld,
    timeout: u64,
    interval: u64,
    pod: String,
    namespace: String,
    expected: String,
) -> Result<()> {
    let [pod, namespace, expected] = world.expand_all([pod, namespace, expected]);
    let framework = world.framework()?;
    let (pod, namespace, expected) = (pod.as_str(), namespace.as_str(), expected.as_str());
    let (timeout, interval) = seconds(timeout, interval);
    wait::until(timeout, interval, || async move {
        let log = framework.pod_log(pod, namespace).await?;
        check(
            log.contains(expected),
            format!("'{expected}' not found in log of pod {pod}"),
        )?;
        Ok::<_, crate::Error>(())
    })
    .await?;
    Ok(())
}

#[given(
    regex = r"^I delete (pod|deployment|service|statefulset|job|ingress|configmap|secret|resourcequota|serviceaccount|role|rolebinding) with name '(.+?)' in namespace '(.+?)'$"
)]
#[when(
    regex = r"^I delete (pod|deployment|service|statefulset|job|ingress|configmap|secret|resourcequota|serviceaccount|role|rolebinding) with name '(.+?)' in namespace '(.+?)'$"
)]
#[then(
    regex = r"^I delete (pod|deployment|service|statefulset|job|ingress|configmap|secret|resourcequota|serviceaccount|role|rolebinding) with name '(.+?)' in namespace '(.+?)'$"
)]
async fn delete(world: &mut BdtWorld, kind: String, name: String, namespace: String) -> Result<()> {
    let kind: ResourceKind = parse("resource kind", &kind)?;
    let [name, namespace] = world.expand_all([name, namespace]);
    world.framework()?.delete(kind, &name, &namespace).await?;
    Ok(())
}

#[given(regex = r"^I delete persistentVolumeClaims with label filter '(.+?)' in namespace '(.+?)'$")]
#[when(regex = r"^I delete persistentVolumeClaims with label filter '(.+?)' in namespace '(.+?)'$")]
#[then(regex = r"^I delete persistentVolumeClaims with label filter '(.+?)' in namespace '(.+?)'$")]
async fn delete_volume_claims(world: &mut BdtWorld, labels: String, namespace: String) -> Result<()> {
    let [labels, namespace] = world.expand_all([labels, namespace]);
    world
        .framework()?
        .delete_by_label(ResourceKind::PersistentVolumeClaim, &labels, &namespace)
        .await?;
    Ok(())
}

#[given(regex = r"^I delete custom resource '(.+?)' with name '(.+?)' in namespace '(.+?)'$")]
#[when(regex = r"^I delete custom resource '(.+?)' with name '(.+?)' in namespace '(.+?)'$")]
#[then(regex = r"^I delete custom resource '(.+?)' with name '(.+?)' in namespace '(.+?)'$")]
async fn delete_custom_resource(
    world: &mut BdtWorld,
    crd: String,
    name: String,
    namespace: String,
) -> Result<()> {
    let [crd, name, namespace] = world.expand_all([crd, name, namespace]);
    world
        .framework()?
        .delete_custom_resource(&crd, &name, &namespace)
        .await?;
    Ok(())
}

#[given(regex = r"^I scale deployment '(.+?)' in namespace '(.+?)' to '(\d+)' instances")]
#[when(regex = r"^I scale deployment '(.+?)' in namespace '(.+?)' to '(\d+)' instances")]
#[then(regex = r"^I scale deployment '(.+?)' in namespace '(.+?)' to '(\d+)' instances")]
async fn scale(world: &mut BdtWorld, name: String, namespace: String, replicas: i32) -> Result<()> {
    let [name, namespace] = world.expand_all([name, namespace]);
    world
        .framework()?
        .scale_deployment(&name, &namespace, replicas)
        .await?;
    Ok(())
}

#[given(
    regex = r"^I get (pods|deployments|replicasets|services|statefulsets|configmaps|serviceacounts|roles|rolebindings) using the following label filter '(.+?)'(?: in namespace '(.+?)')?(?: and save it in environment variable '(.*?)')?(?: and save it in file '(.*?)')?$"
)]
#[when(
    regex = r"^I get (pods|deployments|replicasets|services|statefulsets|configmaps|serviceacounts|roles|rolebindings) using the following label filter '(.+?)'(?: in namespace '(.+?)')?(?: and save it in environment variable '(.*?)')?(?: and save it in file '(.*?)')?$"
)]
#[then(
    regex = r"^I get (pods|deployments|replicasets|services|statefulsets|configmaps|serviceacounts|roles|rolebindings) using the following label filter '(.+?)'(?: in namespace '(.+?)')?(?: and save it in environment variable '(.*?)')?(?: and save it in file '(.*?)')?$"
)]
async fn list_by_label(
    world: &mut BdtWorld,
    kind: String,
    labels: String,
    namespace: String,
    variable: String,
    file: String,
) -> Result<()> {
    let kind: ResourceKind = parse("resource kind", &kind)?;
    let filter = ListFilter {
        labels: Some(world.expand(&labels)),
        fields: None,
    };
    let namespace = opt(&namespace).map(|namespace| world.expand(namespace));
    let names = world
        .framework()?
        .list_names(kind, namespace.as_deref(), &filter)
        .await?;
    world.save(&names, opt(&variable), opt(&file)).await?;
    Ok(())
}

#[given(
    regex = r"^I get pods using the following field filter '(.+?)'(?: in namespace '(.+?)')? and save it in environment variable '(.+?)'$"
)]
#[when(
    regex = r"^I get pods using the following field filter '(.+?)'(?: in namespace '(.+?)')? and save it in environment variable '(.+?)'$"
)]
#[then(
    regex = r"^I get pods using the following field filter '(.+?)'(?: in namespace '(.+?)')? and save it in environment variable '(.+?)'$"
)]
async fn list_pods_by_field(
    world: &mut BdtWorld,
    fields: String,
    namespace: String,
    variable: String,
) -> Result<()> {
    let filter = ListFilter {
        labels: None,
        fields: Some(world.expand(&fields)),
    };
    let namespace = opt(&namespace).map(|namespace| world.expand(namespace));
    let names = world
        .framework()?
        .list_names(ResourceKind::Pod, namespace.as_deref(), &filter)
        .await?;
    world.save(&names, Some(&variable), None).await?;
    Ok(())
}

#[given(
    regex = r"^I forward containerPort '(\d+)' in localhostPort '(\d+)' for (pod|service) '(.+?)'(?: in namespace '(.+?)')?(?: with id '(.+?)')?$"
)]
#[when(
    regex = r"^I forward containerPort '(\d+)' in localhostPort '(\d+)' for (pod|service) '(.+?)'(?: in namespace '(.+?)')?(?: with id '(.+?)')?$"
)]
#[then(
    regex = r"^I forward containerPort '(\d+)' in localhostPort '(\d+)' for (pod|service) '(.+?)'(?: in namespace '(.+?)')?(?: with id '(.+?)')?$"
)]
#[allow(clippy::too_many_arguments)]
async fn forward_port(
    world: &mut BdtWorld,
    container_port: u16,
    local_port: u16,
    target: String,
    name: String,
    namespace: String,
    id: String,
) -> Result<()> {
    let target: Target = parse("port forward target", &target)?;
    let name = world.expand(&name);
    let namespace = opt(&namespace).map(|namespace| world.expand(namespace));
    let id = opt(&id).map(|id| world.expand(id));
    world
        .framework_mut()?
        .forward_port(
            target,
            &name,
            namespace.as_deref(),
            container_port,
            local_port,
            id.as_deref(),
        )
        .await?;
    Ok(())
}

#[given(regex = r"^I close port forward(?: with id '(.+?)')?$")]
#[when(regex = r"^I close port forward(?: with id '(.+?)')?$")]
#[then(regex = r"^I close port forward(?: with id '(.+?)')?$")]
async fn close_port_forward(world: &mut BdtWorld, id: String) -> Result<()> {
    let id = opt(&id).map(|id| world.expand(id));
    world.framework_mut()?.close_port_forward(id.as_deref())?;
    Ok(())
}

#[given(regex = r"^I set maxReplicas='(\d+)' in deployment with name '(.+?)' in namespace '(.+?)'$")]
#[when(regex = r"^I set maxReplicas='(\d+)' in deployment with name '(.+?)' in namespace '(.+?)'$")]
#[then(regex = r"^I set maxReplicas='(\d+)' in deployment with name '(.+?)' in namespace '(.+?)'$")]
async fn set_max_replicas(world: &mut BdtWorld, max: i32, name: String, namespace: String) -> Result<()> {
    let [name, namespace] = world.expand_all([name, namespace]);
    world
        .framework()?
        .update_autoscaler(&name, &namespace, None, max)
        .await?;
    Ok(())
}

#[given(
    regex = r"^I set minReplicas='(\d+)' and maxReplicas='(\d+)' in deployment with name '(.+?)' in namespace '(.+?)'$"
)]
#[when(
    regex = r"^I set minReplicas='(\d+)' and maxReplicas='(\d+)' in deployment with name '(.+?)' in namespace '(.+?)'$"
)]
#[then(
    regex = r"^I set minReplicas='(\d+)' and maxReplicas='(\d+)' in deployment with name '(.+?)' in namespace '(.+?)'$"
)]
async fn set_min_max_replicas(
    world: &mut BdtWorld,
    min: i32,
    max: i32,
    name: String,
    namespace: String,
) -> Result<()> {
    let [name, namespace] = world.expand_all([name, namespace]);
    world
        .framework()?
        .update_autoscaler(&name, &namespace, Some(min), max)
        .await?;
    Ok(())
}

#[given(
    regex = r"^I outbound copy '(.+?)' to '(.+?)' in pod '(.+?)' in namespace '(.+?)'(?: in container '(.*?)')?$"
)]
#[when(
    regex = r"^I outbound copy '(.+?)' to '(.+?)' in pod '(.+?)' in namespace '(.+?)'(?: in container '(.*?)')?$"
)]
#[then(
    regex = r"^I outbound copy '(.+?)' to '(.+?)' in pod '(.+?)' in namespace '(.+?)'(?: in container '(.*?)')?$"
)]
async fn copy_to_pod(
    world: &mut BdtWorld,
    local: String,
    remote: String,
    pod: String,
    namespace: String,
    container: String,
) -> Result<()> {
    let [local, remote, pod, namespace] = world.expand_all([local, remote, pod, namespace]);
    let container = opt(&container).map(|container| world.expand(container));
    world
        .framework()?
        .copy_to_pod(&pod, &namespace, container.as_deref(), &local, &remote)
        .await?;
    Ok(())
}

#[given(regex = r"^I inbound copy '(.+?)' to '(.+?)' in pod '(.+?)' in namespace '(.+?)'$")]
#[when(regex = r"^I inbound copy '(.+?)' to '(.+?)' in pod '(.+?)' in namespace '(.+?)'$")]
#[then(regex = r"^I inbound copy '(.+?)' to '(.+?)' in pod '(.+?)' in namespace '(.+?)'$")]
async fn copy_from_pod(
    world: &mut BdtWorld,
    remote: String,
    local: String,
    pod: String,
    namespace: String,
) -> Result<()> {
    let [remote, local, pod, namespace] = world.expand_all([remote, local, pod, namespace]);
    world
        .framework()?
        .copy_from_pod(&pod, &namespace, &remote, &local)
        .await?;
    Ok(())
}

/// Copy `local` into the pod and check the copy is not empty.
async fn copy_checked(
    framework: &Framework,
    pod: &str,
    namespace: &str,
    container: Option<&str>,
    local: &str,
    remote: &str,
) -> Result<()> {
    framework
        .copy_to_pod(pod, namespace, container, local, remote)
        .await?;
    let command = vec!["bash".to_owned(), "-ic".to_owned(), format!("[ -s {remote} ]")];
    framework
        .exec(pod, namespace, container, command, COPY_CHECK_TIMEOUT)
        .await?
        .check(None)?;
    Ok(())
}

#[given(
    regex = r"^I outbound copy '(.+?)' to '(.+?)' in pod '(.+?)' in namespace '(.+?)'(?: in container '(.*?)')? checking that the copied file is not empty$"
)]
#[when(
    regex = r"^I outbound copy '(.+?)' to '(.+?)' in pod '(.+?)' in namespace '(.+?)'(?: in container '(.*?)')? checking that the copied file is not empty$"
)]
#[then(
    regex = r"^I outbound copy '(.+?)' to '(.+?)' in pod '(.+?)' in namespace '(.+?)'(?: in container '(.*?)')? checking that the copied file is not empty$"
)]
async fn copy_to_pod_checked(
    world: &mut BdtWorld,
    local: String,
    remote: String,
    pod: String,
    namespace: String,
    container: String,
) -> Result<()> {
    let [local, remote, pod, namespace] = world.expand_all([local, remote, pod, namespace]);
    let container = opt(&container).map(|container| world.expand(container));
    let framework = world.framework()?;
    for attempt in 1..=COPY_ATTEMPTS {
        match copy_checked(framework, &pod, &namespace, container.as_deref(), &local, &remote).await {
            Ok(()) => return Ok(()),
            Err(error) => {
                warn!(message = "The outbound copy didn't work correctly, retrying.", %error, attempt);
            }
        }
    }
    Err(AssertionSnafu {
        message: format!("The file was not uploaded correctly after {COPY_ATTEMPTS} attempts"),
    }
    .build()
    .into())
}

#[given(regex = r"^I create namespace with name '(.+?)'(?: and labels '(.+?)')?$")]
#[when(regex = r"^I create namespace with name '(.+?)'(?: and labels '(.+?)')?$")]
#[then(regex = r"^I create namespace with name '(.+?)'(?: and labels '(.+?)')?$")]
async fn create_namespace(world: &mut BdtWorld, name: String, labels: String) -> Result<()> {
    let name = world.expand(&name);
    let labels = match opt(&labels) {
        Some(labels) => Some(parse_labels(&world.expand(labels))?),
        None => None,
    };
    world.framework()?.create_namespace(&name, labels).await?;
    Ok(())
}

#[given(regex = r"^I create service account with name '(.+?)' in namespace '(.+?)'$")]
#[when(regex = r"^I create service account with name '(.+?)' in namespace '(.+?)'$")]
#[then(regex = r"^I create service account with name '(.+?)' in namespace '(.+?)'$")]
async fn create_service_account(world: &mut BdtWorld, name: String, namespace: String) -> Result<()> {
    let [name, namespace] = world.expand_all([name, namespace]);
    world
        .framework()?
        .create_service_account(&name, &namespace)
        .await?;
    Ok(())
}

#[given(
    regex = r"^I create role with name '(.+?)' in namespace '(.+?)' with resources '(.+?)' and verbs '(.+?)'(?: and api groups '(.+?)')?$"
)]
#[when(
    regex = r"^I create role with name '(.+?)' in namespace '(.+?)' with resources '(.+?)' and verbs '(.+?)'(?: and api groups '(.+?)')?$"
)]
#[then(
    regex = r"^I create role with name '(.+?)' in namespace '(.+?)' with resources '(.+?)' and verbs '(.+?)'(?: and api groups '(.+?)')?$"
)]
async fn create_role(
    world: &mut BdtWorld,
    name: String,
    namespace: String,
    resources: String,
    verbs: String,
    api_groups: String,
) -> Result<()> {
    let [name, namespace, resources, verbs] = world.expand_all([name, namespace, resources, verbs]);
    let api_groups = opt(&api_groups).map(|groups| world.expand(groups));
    world
        .framework()?
        .create_role(&name, &namespace, &resources, &verbs, api_groups.as_deref())
        .await?;
    Ok(())
}

#[given(
    regex = r"^I create cluster role with name '(.+?)' with resources '(.+?)' and verbs '(.+?)'(?: and api groups '(.+?)')?$"
)]
#[when(
    regex = r"^I create cluster role with name '(.+?)' with resources '(.+?)' and verbs '(.+?)'(?: and api groups '(.+?)')?$"
)]
#[then(
    regex = r"^I create cluster role with name '(.+?)' with resources '(.+?)' and verbs '(.+?)'(?: and api groups '(.+?)')?$"
)]
async fn create_cluster_role(
    world: &mut BdtWorld,
    name: String,
    resources: String,
    verbs: String,
    api_groups: String,
) -> Result<()> {
    let [name, resources, verbs] = world.expand_all([name, resources, verbs]);
    let api_groups = opt(&api_groups).map(|groups| world.expand(groups));
    world
        .framework()?
        .create_cluster_role(&name, &resources, &verbs, api_groups.as_deref())
        .await?;
    Ok(())
}

#[given(regex = r"^I create role binding with name '(.+?)' with Role '(.+?)' and ServiceAccount '(.+?)'$")]
#[when(regex = r"^I create role binding with name '(.+?)' with Role '(.+?)' and ServiceAccount '(.+?)'$")]
#[then(regex = r"^I create role binding with name '(.+?)' with Role '(.+?)' and ServiceAccount '(.+?)'$")]
async fn create_role_binding(
    world: &mut BdtWorld,
    name: String,
    role: String,
    service_account: String,
) -> Result<()> {
    let [name, role, service_account] = world.expand_all([name, role, service_account]);
    world
        .framework()?
        .create_role_binding(&name, &role, &service_account)
        .await?;
    Ok(())
}

#[given(
    regex = r"^I create cluster role binding with name '(.+?)' with ClusterRole '(.+?)' and ServiceAccount '(.+?)'$"
)]
#[when(
    regex = r"^I create cluster role binding with name '(.+?)' with ClusterRole '(.+?)' and ServiceAccount '(.+?)'$"
)]
#[then(
    regex = r"^I create cluster role binding with name '(.+?)' with ClusterRole '(.+?)' and ServiceAccount '(.+?)'$"
)]
async fn create_cluster_role_binding(
    world: &mut BdtWorld,
    name: String,
    cluster_role: String,
    service_account: String,
) -> Result<()> {
    let [name, cluster_role, service_account] =
        world.expand_all([name, cluster_role, service_account]);
    world
        .framework()?
        .create_cluster_role_binding(&name, &cluster_role, &service_account)
        .await?;
    Ok(())
}

#[given(regex = r"^I create configmap with name '(.+?)' in namespace '(.+?)' with key '(.+?)' and value '(.+?)'$")]
#[when(regex = r"^I create configmap with name '(.+?)' in namespace '(.+?)' with key '(.+?)' and value '(.+?)'$")]
#[then(regex = r"^I create configmap with name '(.+?)' in namespace '(.+?)' with key '(.+?)' and value '(.+?)'$")]
async fn create_config_map(
    world: &mut BdtWorld,
    name: String,
    namespace: String,
    key: String,
    value: String,
) -> Result<()> {
    let [name, namespace, key, value] = world.expand_all([name, namespace, key, value]);
    world
        .framework()?
        .create_or_replace_config_map(&name, &namespace, BTreeMap::from([(key, value)]))
        .await?;
    Ok(())
}

#[given(
    regex = r"^I create configmap with name '(.+?)' in namespace '(.+?)' with key '(.+?)' and value defined in file '(.+?)'$"
)]
#[when(
    regex = r"^I create configmap with name '(.+?)' in namespace '(.+?)' with key '(.+?)' and value defined in file '(.+?)'$"
)]
#[then(
    regex = r"^I create configmap with name '(.+?)' in namespace '(.+?)' with key '(.+?)' and value defined in file '(.+?)'$"
)]
async fn create_config_map_from_file(
    world: &mut BdtWorld,
    name: String,
    namespace: String,
    key: String,
    file: String,
) -> Result<()> {
    let [name, namespace, key, file] = world.expand_all([name, namespace, key, file]);
    let value = world.read_resource(&file).await?;
    world
        .framework()?
        .create_or_replace_config_map(&name, &namespace, BTreeMap::from([(key, value)]))
        .await?;
    Ok(())
}

#[given(regex = r"^I create configmap with name '(.+?)' in namespace '(.+?)' and values:$")]
#[when(regex = r"^I create configmap with name '(.+?)' in namespace '(.+?)' and values:$")]
#[then(regex = r"^I create configmap with name '(.+?)' in namespace '(.+?)' and values:$")]
async fn create_config_map_from_table(
    world: &mut BdtWorld,
    name: String,
    namespace: String,
    step: &Step,
) -> Result<()> {
    let [name, namespace] = world.expand_all([name, namespace]);
    let values = pairs(&world.expanded_table(step)?).into_iter().collect();
    world
        .framework()?
        .create_or_replace_config_map(&name, &namespace, values)
        .await?;
    Ok(())
}

#[given(
    regex = r"^I add/modify variable '(.+?)' with value '(.+?)' in configmap with name '(.+?)' in namespace '(.+?)'$"
)]
#[when(
    regex = r"^I add/modify variable '(.+?)' with value '(.+?)' in configmap with name '(.+?)' in namespace '(.+?)'$"
)]
#[then(
    regex = r"^I add/modify variable '(.+?)' with value '(.+?)' in configmap with name '(.+?)' in namespace '(.+?)'$"
)]
async fn set_config_map_value(
    world: &mut BdtWorld,
    key: String,
    value: String,
    name: String,
    namespace: String,
) -> Result<()> {
    let [key, value, name, namespace] = world.expand_all([key, value, name, namespace]);
    world
        .framework()?
        .add_config_map_values(&name, &namespace, BTreeMap::from([(key, value)]))
        .await?;
    Ok(())
}

#[given(
    regex = r"^I add/modify variable '(.+?)' with value defined in file '(.+?)' in configmap with name '(.+?)' in namespace '(.+?)'$"
)]
#[when(
    regex = r"^I add/modify variable '(.+?)' with value defined in file '(.+?)' in configmap with name '(.+?)' in namespace '(.+?)'$"
)]
#[then(
    regex = r"^I add/modify variable '(.+?)' with value defined in file '(.+?)' in configmap with name '(.+?)' in namespace '(.+?)'$"
)]
async fn set_config_map_value_from_file(
    world: &mut BdtWorld,
    key: String,
    file: String,
    name: String,
    namespace: String,
) -> Result<()> {
    let [key, file, name, namespace] = world.expand_all([key, file, name, namespace]);
    let value = world.read_resource(&file).await?;
    world
        .framework()?
        .add_config_map_values(&name, &namespace, BTreeMap::from([(key, value)]))
        .await?;
    Ok(())
}

#[given(regex = r"^I add/modify variables in configmap with name '(.+?)' in namespace '(.+?)':$")]
#[when(regex = r"^I add/modify variables in configmap with name '(.+?)' in namespace '(.+?)':$")]
#[then(regex = r"^I add/modify variables in configmap with name '(.+?)' in namespace '(.+?)':$")]
async fn set_config_map_values(
    world: &mut BdtWorld,
    name: String,
    namespace: String,
    step: &Step,
) -> Result<()> {
    let [name, namespace] = world.expand_all([name, namespace]);
    let values = pairs(&world.expanded_table(step)?).into_iter().collect();
    world
        .framework()?
        .add_config_map_values(&name, &namespace, values)
        .await?;
    Ok(())
}

#[given(
    regex = r"^I update k8s deployment with id '(.+?)' in namespace '(.+?)' for container '(.+?)' with environment variables:$"
)]
#[when(
    regex = r"^I update k8s deployment with id '(.+?)' in namespace '(.+?)' for container '(.+?)' with environment variables:$"
)]
#[then(
    regex = r"^I update k8s deployment with id '(.+?)' in namespace '(.+?)' for container '(.+?)' with environment variables:$"
)]
async fn update_deployment_env(
    world: &mut BdtWorld,
    name: String,
    namespace: String,
    container: String,
    step: &Step,
) -> Result<()> {
    let [name, namespace, container] = world.expand_all([name, namespace, container]);
    let edits: Vec<EnvEdit> = world
        .expanded_table(step)?
        .iter()
        .filter_map(|row| EnvEdit::from_row(row))
        .collect();
    world
        .framework()?
        .update_deployment_env(&name, &namespace, &container, &edits)
        .await?;
    Ok(())
}

#[given(
    regex = r"^I get key '(.+?)' in configmap with name '(.+?)' in namespace '(.+?)'(?: and save it in environment variable '(.*?)')?(?: and save it in file '(.*?)')?$"
)]
#[when(
    regex = r"^I get key '(.+?)' in configmap with name '(.+?)' in namespace '(.+?)'(?: and save it in environment variable '(.*?)')?(?: and save it in file '(.*?)')?$"
)]
#[then(
    regex = r"^I get key '(.+?)' in configmap with name '(.+?)' in namespace '(.+?)'(?: and save it in environment variable '(.*?)')?(?: and save it in file '(.*?)')?$"
)]
async fn config_map_key(
    world: &mut BdtWorld,
    key: String,
    name: String,
    namespace: String,
    variable: String,
    file: String,
) -> Result<()> {
    let [key, name, namespace] = world.expand_all([key, name, namespace]);
    let value = world
        .framework()?
        .config_map_key(&name, &namespace, &key)
        .await?
        .context(AssertionSnafu {
            message: "Key doesn't exist in configmap",
        })?;
    world.save(&value, opt(&variable), opt(&file)).await?;
    Ok(())
}

#[given(
    regex = r"^I patch custom resource '(.+?)' with name '(.+?)' in namespace '(.+?)' with path '(.+?)' and value '(.+?)'(?: as '(.+?)')?(?: with exit status '(\d+)')?$"
)]
#[when(
    regex = r"^I patch custom resource '(.+?)' with name '(.+?)' in namespace '(.+?)' with path '(.+?)' and value '(.+?)'(?: as '(.+?)')?(?: with exit status '(\d+)')?$"
)]
#[then(
    regex = r"^I patch custom resource '(.+?)' with name '(.+?)' in namespace '(.+?)' with path '(.+?)' and value '(.+?)'(?: as '(.+?)')?(?: with exit status '(\d+)')?$"
)]
#[allow(clippy::too_many_arguments)]
async fn patch_custom_resource(
    world: &mut BdtWorld,
    crd: String,
    name: String,
    namespace: String,
    path: String,
    value: String,
    value_type: String,
    expected: String,
) -> Result<()> {
    let [crd, name, namespace, path, value] = world.expand_all([crd, name, namespace, path, value]);
    let expected = exit_status(&expected)?;
    let patch = FieldPatch::set(path, value, opt(&value_type));
    let status = world
        .framework()?
        .patch_custom_resource(&crd, &name, &namespace, &[patch])
        .await?;
    check(
        status == expected,
        format!("Expected exit status {expected} but got {status}"),
    )?;
    Ok(())
}

#[given(
    regex = r"^I patch custom resource '(.+?)' with name '(.+?)' in namespace '(.+?)'(?: with exit status '(\d+)')? with:$"
)]
#[when(
    regex = r"^I patch custom resource '(.+?)' with name '(.+?)' in namespace '(.+?)'(?: with exit status '(\d+)')? with:$"
)]
#[then(
    regex = r"^I patch custom resource '(.+?)' with name '(.+?)' in namespace '(.+?)'(?: with exit status '(\d+)')? with:$"
)]
async fn patch_custom_resource_fields(
    world: &mut BdtWorld,
    crd: String,
    name: String,
    namespace: String,
    expected: String,
    step: &Step,
) -> Result<()> {
    let [crd, name, namespace] = world.expand_all([crd, name, namespace]);
    let expected = exit_status(&expected)?;
    let patches = world
        .expanded_table(step)?
        .iter()
        .map(|row| FieldPatch::from_row(row))
        .collect::<Result<Vec<_>, _>>()?;
    let status = world
        .framework()?
        .patch_custom_resource(&crd, &name, &namespace, &patches)
        .await?;
    check(
        status == expected,
        format!("Expected exit status {expected} but got {status}"),
    )?;
    Ok(())
}

#[given(
    regex = r"^I patch persistentVolumeClaims with name '(.+?)' in namespace '(.+?)' with path '(.+?)' and value '(.+?)'(?: with exit status '(\d+)')?$"
)]
#[when(
    regex = r"^I patch persistentVolumeClaims with name '(.+?)' in namespace '(.+?)' with path '(.+?)' and value '(.+?)'(?: with exit status '(\d+)')?$"
)]
#[then(
    regex = r"^I patch persistentVolumeClaims with name '(.+?)' in namespace '(.+?)' with path '(.+?)' and value '(.+?)'(?: with exit status '(\d+)')?$"
)]
async fn patch_volume_claim(
    world: &mut BdtWorld,
    name: String,
    namespace: String,
    path: String,
    value: String,
    expected: String,
) -> Result<()> {
    let [name, namespace, path, value] = world.expand_all([name, namespace, path, value]);
    let expected = exit_status(&expected)?;
    let status = world
        .framework()?
        .patch_volume_claim(&name, &namespace, &path, &value)
        .await?;
    check(
        status == expected,
        format!("Expected exit status {expected} but got {status}"),
    )?;
    Ok(())
}

#[given(regex = r"^I create secret using keos-operator in path '(.+?)' with params:$")]
#[when(regex = r"^I create secret using keos-operator in path '(.+?)' with params:$")]
#[then(regex = r"^I create secret using keos-operator in path '(.+?)' with params:$")]
async fn create_operator_secret(world: &mut BdtWorld, path: String, step: &Step) -> Result<()> {
    let path = world.expand(&path);
    let params = pairs(&world.expanded_table(step)?);
    secrets::operator_write(world.framework()?, &path, &params).await?;
    Ok(())
}

#[given(regex = r"^I remove secret located in path '(.+?)' using keos-operator$")]
#[when(regex = r"^I remove secret located in path '(.+?)' using keos-operator$")]
#[then(regex = r"^I remove secret located in path '(.+?)' using keos-operator$")]
async fn remove_operator_secret(world: &mut BdtWorld, path: String) -> Result<()> {
    let path = world.expand(&path);
    secrets::operator_delete(world.framework()?, &path).await?;
    Ok(())
}

#[given(regex = r"^I create secret using Vault API in path '(.+?)' with params:$")]
#[when(regex = r"^I create secret using Vault API in path '(.+?)' with params:$")]
#[then(regex = r"^I create secret using Vault API in path '(.+?)' with params:$")]
async fn create_vault_secret(world: &mut BdtWorld, path: String, step: &Step) -> Result<()> {
    let path = world.expand(&path);
    let params = pairs(&world.expanded_table(step)?);
    let token = world.props.non_empty("VAULT_TOKEN").map(str::to_owned);
    secrets::vault_write(world.framework_mut()?, token.as_deref(), &path, &params).await?;
    Ok(())
}

#[given(regex = r"^I remove secret located in path '(.+?)' using Vault API$")]
#[when(regex = r"^I remove secret located in path '(.+?)' using Vault API$")]
#[then(regex = r"^I remove secret located in path '(.+?)' using Vault API$")]
async fn remove_vault_secret(world: &mut BdtWorld, path: String) -> Result<()> {
    let path = world.expand(&path);
    let token = world.props.non_empty("VAULT_TOKEN").map(str::to_owned);
    secrets::vault_delete(world.framework_mut()?, token.as_deref(), &path).await?;
    Ok(())
}

#[given(
    regex = r"^I create resourcequota with name '(.+?)', in namespace '(.+?)'(?:, with hard cpu '(.+?)')?(?:, with hard memory '(.+?)')?(?:, with hard pods '(.+?)')?$"
)]
#[when(
    regex = r"^I create resourcequota with name '(.+?)', in namespace '(.+?)'(?:, with hard cpu '(.+?)')?(?:, with hard memory '(.+?)')?(?:, with hard pods '(.+?)')?$"
)]
#[then(
    regex = r"^I create resourcequota with name '(.+?)', in namespace '(.+?)'(?:, with hard cpu '(.+?)')?(?:, with hard memory '(.+?)')?(?:, with hard pods '(.+?)')?$"
)]
async fn create_resource_quota(
    world: &mut BdtWorld,
    name: String,
    namespace: String,
    cpu: String,
    memory: String,
    pods: String,
) -> Result<()> {
    let [name, namespace] = world.expand_all([name, namespace]);
    let limits = QuotaLimits {
        cpu: opt(&cpu).map(|cpu| world.expand(cpu)),
        memory: opt(&memory).map(|memory| world.expand(memory)),
        pods: opt(&pods).map(|pods| world.expand(pods)),
    };
    world
        .framework()?
        .create_resource_quota(&name, &namespace, &limits)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|cell| (*cell).to_owned()).collect()
    }

    #[test]
    fn namespace_labels() {
        let labels = parse_labels("team=qa,tier=").unwrap();
        assert_eq!(labels.get("team").map(String::as_str), Some("qa"));
        assert_eq!(labels.get("tier").map(String::as_str), Some(""));
        assert!(matches!(
            parse_labels("team"),
            Err(StepError::InvalidArgument { what: "label", .. })
        ));
    }

    #[test]
    fn key_value_rows() {
        let rows = vec![row(&["user", "qa"]), row(&["lonely"]), row(&["pass", "1234", "extra"])];
        assert_eq!(
            pairs(&rows),
            vec![
                ("user".to_owned(), "qa".to_owned()),
                ("pass".to_owned(), "1234".to_owned()),
            ]
        );
    }

    #[test]
    fn arguments_from_first_column() {
        let rows = vec![row(&["-c", "ignored"]), row(&["sleep 10"]), vec![]];
        assert_eq!(first_column(rows), vec!["-c", "sleep 10"]);
    }

    #[test]
    fn optional_flags() {
        assert_eq!(ready_state(""), None);
        assert_eq!(ready_state("ready"), Some(true));
        assert_eq!(ready_state("not ready"), Some(false));
        assert_eq!(exit_status("").unwrap(), 0);
        assert_eq!(exit_status("1").unwrap(), 1);
        assert!(exit_status("one").is_err());
    }
}
