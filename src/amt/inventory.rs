//! Firmware and hardware inventory read from CIM/AMT classes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{AmtError, Result};
use crate::power::state::PowerState;

use super::Amt;

const FW_CORE_VERSION_ID: &str = "AMT FW Core Version";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInventory {
    pub amt_url: String,
    pub system_id: String,
    pub time: DateTime<Utc>,
    pub version: String,
    pub provisioning_info: String,
    pub bios: String,
    pub chassis: String,
    pub motherboard: String,
    pub processor: String,
    pub power_state: PowerState,
    pub available_power_states: Vec<PowerState>,
}

impl Amt {
    /// Platform GUID in canonical form.
    pub async fn system_id(&self) -> Result<String> {
        let package = self.client().get("CIM_ComputerSystemPackage").await?;
        let guid = text_field(&package, "PlatformGUID");
        guid_to_string(&guid.to_lowercase())
            .ok_or_else(|| AmtError::malformed("CIM_ComputerSystemPackage", format!("invalid PlatformGUID '{}'", guid)))
    }

    pub async fn time(&self) -> Result<DateTime<Utc>> {
        const CLASS: &str = "AMT_TimeSynchronizationService";
        let response = self
            .client()
            .exec(CLASS, "GetLowAccuracyTimeSynch", &Map::new())
            .await?;
        let ta0 = response
            .get("Ta0")
            .and_then(Value::as_i64)
            .ok_or_else(|| AmtError::malformed(CLASS, "missing Ta0"))?;
        DateTime::from_timestamp(ta0, 0).ok_or_else(|| AmtError::malformed(CLASS, format!("Ta0 out of range: {}", ta0)))
    }

    /// Firmware core version, e.g. "11.8.50".
    pub async fn version(&self) -> Result<String> {
        const CLASS: &str = "CIM_SoftwareIdentity";
        let software = self.client().enumerate(CLASS).await?;
        software
            .iter()
            .find(|s| s.get("InstanceID").and_then(Value::as_str) == Some(FW_CORE_VERSION_ID))
            .map(|s| text_field(s, "VersionString"))
            .ok_or_else(|| AmtError::malformed(CLASS, format!("no '{}' instance", FW_CORE_VERSION_ID)))
    }

    /// e.g. "Post Admin Control Mode"
    pub async fn provisioning_info(&self) -> Result<String> {
        let service = self.client().get("AMT_SetupAndConfigurationService").await?;
        let state = service.get("ProvisioningState").and_then(Value::as_i64);
        let mode = service.get("ProvisioningMode").and_then(Value::as_i64);
        Ok(format!("{} {}", provisioning_state_label(state), provisioning_mode_label(mode)))
    }

    pub async fn bios(&self) -> Result<String> {
        let bios = self.client().get("CIM_BIOSElement").await?;
        let release = bios
            .pointer("/ReleaseDate/Datetime")
            .map(render)
            .unwrap_or_default();
        Ok(format!("{} {}", join_fields(&bios, &["Manufacturer", "Version"]), release))
    }

    pub async fn chassis(&self) -> Result<String> {
        let chassis = self.client().get("CIM_Chassis").await?;
        Ok(join_fields(&chassis, PHYSICAL_PACKAGE_FIELDS))
    }

    pub async fn motherboard(&self) -> Result<String> {
        let card = self.client().get("CIM_Card").await?;
        Ok(join_fields(&card, PHYSICAL_PACKAGE_FIELDS))
    }

    // CIM_Processor carries nothing useful here; CIM_Chip has the vendor strings
    pub async fn processor(&self) -> Result<String> {
        let chip = self.client().get("CIM_Chip").await?;
        Ok(join_fields(&chip, &["Manufacturer", "Version"]))
    }

    /// Every query, issued one after another.
    pub async fn inventory(&self) -> Result<SystemInventory> {
        Ok(SystemInventory {
            amt_url: self.url().to_string(),
            system_id: self.system_id().await?,
            time: self.time().await?,
            version: self.version().await?,
            provisioning_info: self.provisioning_info().await?,
            bios: self.bios().await?,
            chassis: self.chassis().await?,
            motherboard: self.motherboard().await?,
            processor: self.processor().await?,
            power_state: self.power_state().await?,
            available_power_states: self.available_power_states().await?,
        })
    }
}

const PHYSICAL_PACKAGE_FIELDS: &[&str] = &["Manufacturer", "Model", "Version", "SerialNumber", "Tag"];

/// AMT reports the platform GUID with the first three groups little-endian.
pub fn guid_to_string(g: &str) -> Option<String> {
    if g.len() != 32 || !g.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!(
        "{}{}{}{}-{}{}-{}{}-{}-{}",
        &g[6..8], &g[4..6], &g[2..4], &g[0..2],
        &g[10..12], &g[8..10],
        &g[14..16], &g[12..14],
        &g[16..20],
        &g[20..],
    ))
}

fn provisioning_state_label(state: Option<i64>) -> String {
    match state {
        Some(0) => "Pre".to_string(),
        Some(1) => "In".to_string(),
        Some(2) => "Post".to_string(),
        Some(n) => format!("#{}", n),
        None => "Unknown".to_string(),
    }
}

fn provisioning_mode_label(mode: Option<i64>) -> String {
    match mode {
        Some(1) => "Admin Control Mode".to_string(),
        Some(3) => "Client Control Mode".to_string(),
        Some(n) => format!("#{}", n),
        None => "Unknown".to_string(),
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn text_field(doc: &Value, name: &str) -> String {
    doc.get(name).map(render).unwrap_or_default()
}

fn join_fields(doc: &Value, names: &[&str]) -> String {
    names
        .iter()
        .map(|n| text_field(doc, n))
        .collect::<Vec<_>>()
        .join(" ")
}
