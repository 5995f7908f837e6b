use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_TOPIC;
use crate::Error;
use crate::Result;

/// Change event transport settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChannelConfig {
    /// The single topic flag changes are fanned out on
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Per-subscriber buffer; a subscriber lagging further than this misses events
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            capacity: default_capacity(),
        }
    }
}

impl ChannelConfig {
    pub fn validate(&self) -> Result<()> {
        if self.topic.trim().is_empty() {
            return Err(Error::InvalidConfig("channel.topic cannot be empty".into()));
        }
        if self.capacity == 0 {
            return Err(Error::InvalidConfig("channel.capacity must be > 0".into()));
        }
        Ok(())
    }
}

fn default_topic() -> String {
    DEFAULT_TOPIC.to_string()
}

fn default_capacity() -> usize {
    1024
}
