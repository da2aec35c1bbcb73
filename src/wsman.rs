//! WsmanClient trait definition and the `wsman` command-line implementation.

use async_trait::async_trait;
use serde_json::{Map, Value};

pub mod executor;
pub mod uri;
pub mod xml;

pub use executor::{Session, WsmanCli};

use crate::error::{AmtError, Result};
use crate::power::state::PowerState;

/// WS-Management operations used against the AMT controller.
/// Documents are JSON objects keyed by CIM property name.
#[async_trait]
pub trait WsmanClient: Send + Sync {
    /// Fetch the single instance of a CIM class
    async fn get(&self, class: &str) -> Result<Value>;

    /// Invoke a class method, returns the `<Method>_OUTPUT` document
    async fn exec(&self, class: &str, method: &str, args: &Map<String, Value>) -> Result<Value>;

    /// Enumerate all instances of a class
    async fn enumerate(&self, class: &str) -> Result<Vec<Value>>;

    /// CIM_PowerManagementService.RequestPowerStateChange on the managed system
    async fn request_power_state_change(&self, state: PowerState) -> Result<Value>;
}

/// Raw outcome of one WS-Management exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsmanResponse {
    pub status: u16,
    pub body: String,
}

impl WsmanResponse {
    /// Map the HTTP-equivalent status onto the error taxonomy.
    pub fn into_body(self) -> Result<String> {
        match self.status {
            200 => Ok(self.body),
            401 => Err(AmtError::Auth),
            status => Err(AmtError::Protocol {
                status,
                body: self.body,
            }),
        }
    }
}
