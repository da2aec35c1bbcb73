//! AMT service: typed power queries over a WsmanClient, and the PowerControl
//! implementation used by the toggle.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

pub mod inventory;

use crate::error::{AmtError, Result};
use crate::power::state::PowerState;
use crate::power::PowerControl;
use crate::wsman::WsmanClient;

pub use inventory::SystemInventory;

const POWER_SERVICE: &str = "CIM_AssociatedPowerManagementService";

pub struct Amt {
    client: Box<dyn WsmanClient>,
    url: String,
}

impl Amt {
    pub fn new(client: Box<dyn WsmanClient>, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Controller base URL, e.g. `http://host:16992`
    pub fn url(&self) -> &str {
        &self.url
    }

    pub(crate) fn client(&self) -> &dyn WsmanClient {
        self.client.as_ref()
    }

    pub async fn power_state(&self) -> Result<PowerState> {
        let service = self.client.get(POWER_SERVICE).await?;
        let value = service
            .get("PowerState")
            .ok_or_else(|| AmtError::malformed(POWER_SERVICE, "missing PowerState"))?;
        power_state_from(value)
            .ok_or_else(|| AmtError::malformed(POWER_SERVICE, format!("invalid PowerState {}", value)))
    }

    /// The controller reports a single state as a scalar; always returns a list.
    pub async fn available_power_states(&self) -> Result<Vec<PowerState>> {
        let service = self.client.get(POWER_SERVICE).await?;
        match service.get("AvailableRequestedPowerStates") {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| {
                    power_state_from(v).ok_or_else(|| {
                        AmtError::malformed(POWER_SERVICE, format!("invalid available state {}", v))
                    })
                })
                .collect(),
            Some(single) => power_state_from(single).map(|s| vec![s]).ok_or_else(|| {
                AmtError::malformed(POWER_SERVICE, format!("invalid available state {}", single))
            }),
        }
    }

    pub async fn set_power_state(&self, state: PowerState) -> Result<()> {
        let response = self.client.request_power_state_change(state).await?;
        debug!("RequestPowerStateChange({}) -> {}", state, response);

        // anything but an explicit 0, including no ReturnValue at all, is a refusal
        match response.get("ReturnValue").and_then(Value::as_i64) {
            Some(0) => Ok(()),
            _ => Err(AmtError::TransitionRejected {
                target: state,
                response: response.to_string(),
            }),
        }
    }
}

fn power_state_from(value: &Value) -> Option<PowerState> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|c| u16::try_from(c).ok()).map(PowerState),
        Value::String(s) => s.trim().parse::<u16>().ok().map(PowerState),
        _ => None,
    }
}

#[async_trait]
impl PowerControl for Amt {
    async fn current_power_state(&self) -> Result<PowerState> {
        self.power_state().await
    }

    async fn available_states(&self) -> Result<Vec<PowerState>> {
        self.available_power_states().await
    }

    async fn request_transition(&self, target: PowerState) -> Result<()> {
        self.set_power_state(target).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::{Map, Value};

    use crate::error::{AmtError, Result};
    use crate::power::state::PowerState;
    use crate::wsman::WsmanClient;

    /// Canned documents per class; classes not listed answer with a 400.
    #[derive(Default)]
    pub struct FakeWsman {
        pub gets: HashMap<String, Value>,
        pub execs: HashMap<String, Value>,
        pub enums: HashMap<String, Vec<Value>>,
        pub power_response: Option<Value>,
        pub deny_all: bool,
        pub requested: Mutex<Vec<PowerState>>,
    }

    impl FakeWsman {
        pub fn with_get(mut self, class: &str, doc: Value) -> Self {
            self.gets.insert(class.to_string(), doc);
            self
        }

        fn not_found(class: &str) -> AmtError {
            AmtError::Protocol {
                status: 400,
                body: format!("no canned response for {}", class),
            }
        }
    }

    #[async_trait]
    impl WsmanClient for FakeWsman {
        async fn get(&self, class: &str) -> Result<Value> {
            if self.deny_all {
                return Err(AmtError::Auth);
            }
            self.gets.get(class).cloned().ok_or_else(|| Self::not_found(class))
        }

        async fn exec(&self, class: &str, method: &str, _args: &Map<String, Value>) -> Result<Value> {
            let key = format!("{}.{}", class, method);
            self.execs.get(&key).cloned().ok_or_else(|| Self::not_found(&key))
        }

        async fn enumerate(&self, class: &str) -> Result<Vec<Value>> {
            self.enums.get(class).cloned().ok_or_else(|| Self::not_found(class))
        }

        async fn request_power_state_change(&self, state: PowerState) -> Result<Value> {
            self.requested.lock().unwrap().push(state);
            self.power_response
                .clone()
                .ok_or_else(|| Self::not_found("CIM_PowerManagementService"))
        }
    }
}
