use std::path::Path;

use crate::{cards::Slot, Res};

pub mod handlers;
pub mod sampling;
pub mod server;
pub mod simulator;

const CONFIG_FILE: &str = "simulator.json";

/// Game balance constants. These mirror the live game and are not derived
/// from anything.
#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Pack type rolls draw uniformly from `0..rare_roll_range`.
    pub rare_roll_range: u32,
    /// Rolls below this are rare packs. Zero disables rare packs entirely.
    pub rare_threshold: u32,
    /// Currency units spent per pack.
    pub cost_per_pack: u32,
    /// Real world price of one currency unit, in cents.
    pub cents_per_unit: f64,
    /// Pack points earned per pack.
    pub points_per_pack: u32,
    /// Sessions with no requests for this many seconds are discarded.
    pub session_idle_secs: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        SimulatorConfig {
            rare_roll_range: 100_000,
            rare_threshold: 5,
            cost_per_pack: 6,
            cents_per_unit: 19.8,
            points_per_pack: 5,
            session_idle_secs: 3600,
        }
    }
}

impl SimulatorConfig {
    /// Read overrides from the data directory, falling back to the defaults
    /// when no config file exists.
    pub async fn load(data: &Path) -> Res<Self> {
        let file = data.join(CONFIG_FILE);
        if !file.exists() {
            tracing::debug!("No simulator config at {}, using defaults.", file.display());
            return Ok(Self::default());
        }

        let raw = tokio::fs::read(&file).await.map_err(|e| e.to_string())?;
        let config: Self = serde_json::from_slice(&raw)
            .map_err(|e| format!("Invalid simulator config {}: {e}", file.display()))?;
        if config.rare_roll_range == 0 {
            return Err("rare_roll_range must be greater than zero.".to_string());
        }
        tracing::debug!("Loaded simulator config: {config:?}");
        Ok(config)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PackType {
    Regular,
    Rare,
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum SimulatorError {
    #[error("no candidates for slot {slot}")]
    EmptySlot { slot: Slot },

    #[error("candidates for slot {slot} all have zero weight")]
    ZeroWeight { slot: Slot },

    #[error("weights for slot {slot} are too large to sample")]
    WeightOverflow { slot: Slot },
}

#[cfg(test)]
mod test {
    use super::SimulatorConfig;

    #[test]
    fn test_partial_config() {
        let config: SimulatorConfig = serde_json::from_str(r#"{ "rare_threshold": 0 }"#).unwrap();
        assert_eq!(config.rare_threshold, 0);
        assert_eq!(config.rare_roll_range, 100_000);
        assert_eq!(config.cost_per_pack, 6);
        assert_eq!(config.points_per_pack, 5);
        assert_eq!(config.session_idle_secs, 3600);
    }

    #[tokio::test]
    async fn test_load_missing_config() {
        let dir = std::env::temp_dir().join(format!("tcgwiki-test-{}", uuid::Uuid::new_v4()));
        let config = SimulatorConfig::load(&dir).await.unwrap();
        assert_eq!(config, SimulatorConfig::default());
    }

    #[tokio::test]
    async fn test_load_config_file() {
        let dir = std::env::temp_dir().join(format!("tcgwiki-test-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("simulator.json"), r#"{ "cost_per_pack": 10 }"#)
            .await
            .unwrap();
        let config = SimulatorConfig::load(&dir).await.unwrap();
        assert_eq!(config.cost_per_pack, 10);

        tokio::fs::write(dir.join("simulator.json"), r#"{ "rare_roll_range": 0 }"#)
            .await
            .unwrap();
        assert!(SimulatorConfig::load(&dir).await.is_err());
        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}
