//! Status and control traffic over the host's single-slot ports.

use crate::attack::events::{AttackControl, StatusSnapshot};
use crate::host::AttackHost;
use crate::serialize::*;
use log::*;

pub fn publish_status(host: &mut dyn AttackHost, port: u32, status: &StatusSnapshot) -> Result<(), String> {
    let data = encode_to_string(status)?;

    host.write_port(port, data);

    Ok(())
}

/// Latest published snapshot, left in place for other readers.
pub fn read_status(host: &dyn AttackHost, port: u32) -> Result<Option<StatusSnapshot>, String> {
    match host.peek_port(port) {
        Some(data) => decode_from_string(&data).map(Some),
        None => Ok(None),
    }
}

pub fn send_control(host: &mut dyn AttackHost, port: u32, control: &AttackControl) -> Result<(), String> {
    let data = serde_json::to_string(control).map_err(|err| err.to_string())?;

    host.write_port(port, data);

    Ok(())
}

/// Takes the pending control message, if any. Malformed messages are
/// consumed and dropped.
pub fn poll_control(host: &mut dyn AttackHost, port: u32) -> Option<AttackControl> {
    let data = host.take_port(port)?;

    match serde_json::from_str(&data) {
        Ok(control) => Some(control),
        Err(err) => {
            warn!("Ignoring malformed control message on port {}: {} ({})", port, data, err);
            None
        }
    }
}
