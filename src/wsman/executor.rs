//! `wsman` (openwsman CLI) subprocess executor.
//! The CLI owns the HTTP(S) transport and digest authentication; this module
//! only builds its command lines and maps its output onto WsmanResponse.

use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tracing::{debug, trace};

use crate::config::types::AmtConfig;
use crate::error::{AmtError, Result};
use crate::power::state::PowerState;

use super::uri::resource_uri;
use super::xml;
use super::{WsmanClient, WsmanResponse};

pub const AMT_HTTP_PORT: u16 = 16992;
pub const AMT_HTTPS_PORT: u16 = 16993;

const POWER_SERVICE: &str = "CIM_PowerManagementService";
const POWER_CHANGE_METHOD: &str = "RequestPowerStateChange";

/// `wsman` only takes the password as `-p <password>`.
pub const PASSWORD_VISIBILITY_NOTICE: &str =
    "The password is passed to wsman as '-p <password>' and is visible to other local users (e.g. in 'ps') while a request runs.";

/// Endpoint and credentials of one AMT controller.
#[derive(Debug, Clone)]
pub struct Session {
    pub hostname: String,
    pub port: u16,
    pub tls: bool,
    pub verify_tls: bool,
    pub username: String,
    pub password: String,
}

impl Session {
    pub fn from_config(config: &AmtConfig) -> Self {
        let endpoint = &config.endpoint;
        Self {
            hostname: endpoint.hostname.clone(),
            port: endpoint.effective_port(),
            tls: endpoint.tls,
            verify_tls: endpoint.verify_tls,
            username: config.credentials.username.clone(),
            password: config.credentials.password.clone(),
        }
    }

    /// `http://host:16992` or `https://host:16993`
    pub fn url(&self) -> String {
        format!(
            "http{}://{}:{}",
            if self.tls { "s" } else { "" },
            self.hostname,
            self.port
        )
    }
}

pub struct WsmanCli {
    session: Session,
    binary: PathBuf,
}

impl WsmanCli {
    pub fn new(session: Session, binary: impl Into<PathBuf>) -> Self {
        Self {
            session,
            binary: binary.into(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Build a wsman Command for one action against one class.
    pub fn build_wsman_command(&self, action: &str, class: &str) -> std::process::Command {
        let mut cmd = std::process::Command::new(&self.binary);
        cmd.arg(action).arg(resource_uri(class));
        cmd.args(self.connection_args());
        cmd
    }

    fn connection_args(&self) -> Vec<String> {
        let session = &self.session;
        let mut args = vec![
            "-b".to_string(),
            format!("{}/wsman", session.url()),
            "-u".to_string(),
            session.username.clone(),
            "-p".to_string(),
            session.password.clone(),
            "-y".to_string(),
            "digest".to_string(),
        ];
        if session.tls && !session.verify_tls {
            // skip peer and host verification (self-signed AMT certificates)
            args.push("-V".to_string());
            args.push("-v".to_string());
        }
        args
    }

    async fn run(&self, cmd: std::process::Command, action: &str, class: &str) -> Result<WsmanResponse> {
        debug!("Executing: wsman {} {} @ {}", action, class, self.session.url());

        // a cancelled or timed out request must not leave wsman running
        let mut command = tokio::process::Command::from(cmd);
        command.kill_on_drop(true);
        let output = command.output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        trace!("wsman {} {} stdout: {}", action, class, stdout);

        Ok(response_from_output(output.status.success(), stdout, stderr))
    }

    async fn exchange(&self, cmd: std::process::Command, action: &str, class: &str) -> Result<String> {
        self.run(cmd, action, class).await?.into_body()
    }
}

/// Map exit status and output onto an HTTP-equivalent status.
/// The CLI reports transport failures as `response code = <n>`.
pub fn response_from_output(success: bool, stdout: String, stderr: String) -> WsmanResponse {
    let reported = parse_response_code(&stderr).or_else(|| parse_response_code(&stdout));

    match (success, reported) {
        (true, None) => WsmanResponse { status: 200, body: stdout },
        (_, Some(status)) if status != 200 => {
            let body = if stdout.trim().is_empty() { stderr } else { stdout };
            WsmanResponse { status, body }
        }
        (true, Some(_)) => WsmanResponse { status: 200, body: stdout },
        (false, _) => {
            let body = if stderr.trim().is_empty() { stdout } else { stderr };
            WsmanResponse { status: 0, body: body.trim().to_string() }
        }
    }
}

fn parse_response_code(text: &str) -> Option<u16> {
    let at = text.find("response code")?;
    text[at + "response code".len()..]
        .trim_start_matches(|c: char| c.is_whitespace() || c == '=' || c == ':')
        .split(|c: char| !c.is_ascii_digit())
        .next()
        .and_then(|digits| digits.parse().ok())
}

fn single_document(body: &str, class: &str, element: &str) -> Result<Value> {
    xml::documents(body, element)
        .map_err(|e| AmtError::malformed(class, e))?
        .into_iter()
        .next()
        .ok_or_else(|| AmtError::malformed(class, format!("no {} element in response", element)))
}

/// Extract the `RequestPowerStateChange_OUTPUT` document from a response body.
pub fn power_state_change_output(body: &str) -> Result<Value> {
    single_document(body, POWER_SERVICE, &format!("{}_OUTPUT", POWER_CHANGE_METHOD))
}

/// Exclusively created temp file with a random name, removed on drop.
pub fn write_input_document(method: &'static str, contents: &str) -> Result<NamedTempFile> {
    let failed = |source: std::io::Error| AmtError::InputDocument { method, source };

    let mut file = tempfile::Builder::new()
        .prefix("amt-power-")
        .suffix(".xml")
        .tempfile()
        .map_err(failed)?;
    file.write_all(contents.as_bytes()).map_err(failed)?;
    file.flush().map_err(failed)?;
    Ok(file)
}

/// Input document for RequestPowerStateChange targeting the managed system.
pub fn power_state_change_input(state: PowerState) -> String {
    format!(
        r#"<p:RequestPowerStateChange_INPUT xmlns:p="{service}">
  <p:PowerState>{code}</p:PowerState>
  <p:ManagedElement xmlns:a="http://schemas.xmlsoap.org/ws/2004/08/addressing" xmlns:w="http://schemas.dmtf.org/wbem/wsman/1/wsman.xsd">
    <a:Address>http://schemas.xmlsoap.org/ws/2004/08/addressing/role/anonymous</a:Address>
    <a:ReferenceParameters>
      <w:ResourceURI>{system}</w:ResourceURI>
      <w:SelectorSet>
        <w:Selector Name="CreationClassName">CIM_ComputerSystem</w:Selector>
        <w:Selector Name="Name">ManagedSystem</w:Selector>
      </w:SelectorSet>
    </a:ReferenceParameters>
  </p:ManagedElement>
</p:RequestPowerStateChange_INPUT>
"#,
        service = resource_uri(POWER_SERVICE),
        code = state.code(),
        system = resource_uri("CIM_ComputerSystem"),
    )
}

fn scalar_arg(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl WsmanClient for WsmanCli {
    async fn get(&self, class: &str) -> Result<Value> {
        let cmd = self.build_wsman_command("get", class);
        let body = self.exchange(cmd, "get", class).await?;
        single_document(&body, class, class)
    }

    async fn exec(&self, class: &str, method: &str, args: &Map<String, Value>) -> Result<Value> {
        let mut cmd = self.build_wsman_command("invoke", class);
        cmd.args(["-a", method]);
        for (name, value) in args {
            cmd.arg("-k").arg(format!("{}={}", name, scalar_arg(value)));
        }
        let body = self.exchange(cmd, method, class).await?;
        single_document(&body, class, &format!("{}_OUTPUT", method))
    }

    async fn enumerate(&self, class: &str) -> Result<Vec<Value>> {
        let mut cmd = self.build_wsman_command("enumerate", class);
        cmd.args(["-o", "-m", "512"]);
        let body = self.exchange(cmd, "enumerate", class).await?;
        xml::documents(&body, class).map_err(|e| AmtError::malformed(class, e))
    }

    async fn request_power_state_change(&self, state: PowerState) -> Result<Value> {
        let input = write_input_document(POWER_CHANGE_METHOD, &power_state_change_input(state))?;

        let mut cmd = self.build_wsman_command("invoke", POWER_SERVICE);
        cmd.args(["-a", POWER_CHANGE_METHOD]);
        cmd.arg("-J").arg(input.path());

        let body = self.exchange(cmd, POWER_CHANGE_METHOD, POWER_SERVICE).await?;
        power_state_change_output(&body)
    }
}
