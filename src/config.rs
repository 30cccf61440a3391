//! Play-engine configuration
//!
//! Carried by the node's configuration file and handed to the coordinator at
//! construction. Nothing here changes while a block plays.

use serde::{Deserialize, Serialize};

use crate::resources::LimitParams;

/// How this node obtains the state carried by validated blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockSyncMethod {
    /// Replay every transaction of every block.
    #[default]
    Replay,
    /// State changes arrive as a shipped storage log; validated blocks skip
    /// transaction replay entirely.
    LogShipping,
}

/// Configuration of the block-play engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayConfig {
    pub block_sync_method: BlockSyncMethod,
    pub limits: LimitParams,
}

impl PlayConfig {
    /// Permissive configuration for tests.
    pub fn for_testing() -> Self {
        Self {
            block_sync_method: BlockSyncMethod::Replay,
            limits: LimitParams::for_testing(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_sync_method_is_replay() {
        assert_eq!(PlayConfig::default().block_sync_method, BlockSyncMethod::Replay);
    }
}
