//! PowerControl trait definition; decision table and wait loop live in `toggle`.

use async_trait::async_trait;

pub mod state;
pub mod toggle;

use crate::error::Result;
use state::PowerState;

#[async_trait]
pub trait PowerControl: Send + Sync {
    /// Power state currently reported by the controller
    async fn current_power_state(&self) -> Result<PowerState>;

    /// States the controller accepts as transition targets right now
    async fn available_states(&self) -> Result<Vec<PowerState>>;

    /// Request one transition; fails if the controller returns a non-zero code
    async fn request_transition(&self, target: PowerState) -> Result<()>;
}
