use cucumber::{gherkin::Step, given, then, when};
use snafu::OptionExt;
use tracing::{debug, info};

use super::{AssertionSnafu, BdtWorld, check, opt};
use crate::{
    Result, command,
    modify::{DataType, Modification},
    properties::KEOS_ENV,
    rest::{self, Login},
};

#[given(regex = r"^I save '(.+?)' in variable '(.+?)'$")]
#[when(regex = r"^I save '(.+?)' in variable '(.+?)'$")]
#[then(regex = r"^I save '(.+?)' in variable '(.+?)'$")]
async fn save_value(world: &mut BdtWorld, value: String, variable: String) -> Result<()> {
    let [value, variable] = world.expand_all([value, variable]);
    world.props.set(variable, value);
    Ok(())
}

#[given(regex = r"^I set (Keos|DCOS) environment$")]
#[when(regex = r"^I set (Keos|DCOS) environment$")]
#[then(regex = r"^I set (Keos|DCOS) environment$")]
async fn set_environment(world: &mut BdtWorld, environment: String) -> Result<()> {
    let keos = environment == "Keos";
    world.props.set(KEOS_ENV, keos.to_string());
    Ok(())
}

#[given(regex = r"^I( securely)? send requests to '(.+?)'$")]
#[when(regex = r"^I( securely)? send requests to '(.+?)'$")]
#[then(regex = r"^I( securely)? send requests to '(.+?)'$")]
async fn send_requests_to(world: &mut BdtWorld, securely: String, host: String) -> Result<()> {
    let host = world.expand(&host);
    let secure = opt(&securely).is_some();
    let rest = world.rest()?;
    rest.set_host(&host, secure)?;
    rest.clear_headers();
    Ok(())
}

#[given(
    regex = r"^I set sso token using host '(.+?)' with user '(.+?)' and password '(.+?)'(?: and tenant '(.+?)')?$"
)]
#[when(
    regex = r"^I set sso token using host '(.+?)' with user '(.+?)' and password '(.+?)'(?: and tenant '(.+?)')?$"
)]
#[then(
    regex = r"^I set sso token using host '(.+?)' with user '(.+?)' and password '(.+?)'(?: and tenant '(.+?)')?$"
)]
async fn set_sso_token(
    world: &mut BdtWorld,
    host: String,
    user: String,
    password: String,
    tenant: String,
) -> Result<()> {
    let [host, user, password] = world.expand_all([host, user, password]);
    let tenant = opt(&tenant).map(|tenant| world.expand(tenant));
    let login = Login { user, password };
    world
        .rest()?
        .sso_login(&host, &login, tenant.as_deref())
        .await?;
    Ok(())
}

#[given(
    regex = r"^I send a '(GET|POST|PUT|PATCH|DELETE)' request to '(.+?)'(?: based on '(.+?)')?(?: as '(json|string|gov)')?( with:)?$"
)]
#[when(
    regex = r"^I send a '(GET|POST|PUT|PATCH|DELETE)' request to '(.+?)'(?: based on '(.+?)')?(?: as '(json|string|gov)')?( with:)?$"
)]
#[then(
    regex = r"^I send a '(GET|POST|PUT|PATCH|DELETE)' request to '(.+?)'(?: based on '(.+?)')?(?: as '(json|string|gov)')?( with:)?$"
)]
async fn send_request(
    world: &mut BdtWorld,
    method: String,
    endpoint: String,
    file: String,
    data_type: String,
    _with: String,
    step: &Step,
) -> Result<()> {
    let method = rest::parse_method(&method)?;
    let endpoint = world.expand(&endpoint);
    let body = match opt(&file) {
        Some(file) => {
            let data_type = match opt(&data_type) {
                Some(data_type) => data_type.parse()?,
                None => DataType::default(),
            };
            let rows = match step.table {
                Some(_) => world.expanded_table(step)?,
                None => Vec::new(),
            };
            Some((
                world.settings.resource_path(world.expand(file)),
                data_type,
                Modification::from_rows(&rows)?,
            ))
        }
        None => None,
    };

    let rest = world.rest()?;
    let response = match body {
        Some((path, data_type, modifications)) => {
            rest.send_file(method, &endpoint, &path, data_type, &modifications, None)
                .await?
        }
        None => rest.send(method, &endpoint, None, None).await?,
    };
    debug!(message = "Response received.", status = response.status, body = %response.body);
    Ok(())
}

#[given(regex = r"^the service response status must be '(\d+)'$")]
#[when(regex = r"^the service response status must be '(\d+)'$")]
#[then(regex = r"^the service response status must be '(\d+)'$")]
async fn response_status(world: &mut BdtWorld, expected: u16) -> Result<()> {
    let response = world.rest()?.last().context(AssertionSnafu {
        message: "No request has been sent yet",
    })?;
    check(
        response.is(expected),
        format!(
            "Expected status code {expected} but got {}: {}",
            response.status, response.body
        ),
    )?;
    Ok(())
}

#[given(regex = r"^I run '(.+?)' locally(?: and save the value in environment variable '(.+?)')?$")]
#[when(regex = r"^I run '(.+?)' locally(?: and save the value in environment variable '(.+?)')?$")]
#[then(regex = r"^I run '(.+?)' locally(?: and save the value in environment variable '(.+?)')?$")]
async fn run_locally(world: &mut BdtWorld, command_line: String, variable: String) -> Result<()> {
    let command_line = world.expand(&command_line);
    let output = command::run(&command_line).await?.ensure_success()?;
    info!(message = "Local command finished.", command = %output.command);
    if let Some(variable) = opt(&variable) {
        let variable = world.expand(variable);
        world.props.set(variable, output.stdout.trim_end());
    }
    Ok(())
}

#[given(regex = r"^'(.+?)' contains '(.+?)'$")]
#[when(regex = r"^'(.+?)' contains '(.+?)'$")]
#[then(regex = r"^'(.+?)' contains '(.+?)'$")]
async fn contains(world: &mut BdtWorld, value: String, expected: String) -> Result<()> {
    let [value, expected] = world.expand_all([value, expected]);
    check(
        value.contains(&expected),
        format!("'{value}' does not contain '{expected}'"),
    )?;
    Ok(())
}

#[given(regex = r"^'(.+?)' is '(.+?)'$")]
#[when(regex = r"^'(.+?)' is '(.+?)'$")]
#[then(regex = r"^'(.+?)' is '(.+?)'$")]
async fn equals(world: &mut BdtWorld, value: String, expected: String) -> Result<()> {
    let [value, expected] = world.expand_all([value, expected]);
    check(value == expected, format!("Expected '{expected}' but got '{value}'"))?;
    Ok(())
}
