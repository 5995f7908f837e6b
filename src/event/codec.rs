use bytes::Bytes;

use super::ChangeEvent;
use crate::ChannelError;

/// Encodes an event into its JSON wire form
pub fn encode_event(event: &ChangeEvent) -> Result<Bytes, ChannelError> {
    if event.flag_name.is_empty() {
        return Err(ChannelError::InvalidEvent("flagName cannot be empty".into()));
    }
    let buf = serde_json::to_vec(event)?;
    Ok(Bytes::from(buf))
}

/// Decodes a wire payload. Unknown fields are ignored; a missing or null
/// `enabled` decodes as `None`.
pub fn decode_event(payload: &[u8]) -> Result<ChangeEvent, ChannelError> {
    let event: ChangeEvent = serde_json::from_slice(payload)?;
    if event.flag_name.is_empty() {
        return Err(ChannelError::InvalidEvent("flagName cannot be empty".into()));
    }
    Ok(event)
}
