use log::{info, warn};

use super::{normalize, types::Pid};
use crate::device::Obd2BaseDevice;

/// Replies that mean the ECU will not answer this PID
const NEGATIVE_MARKERS: [&str; 3] = ["NO DATA", "UNABLE", "?"];

/// Probe each PID once and keep the ones the ECU answers
///
/// Runs in registry order and preserves it. A PID whose request cannot be written, or whose
/// response cannot be read, is logged and left out; it does not stop detection of the rest.
pub fn detect_supported_pids<D: Obd2BaseDevice>(device: &mut D, registry: &[Pid]) -> Vec<Pid> {
    let mut supported = Vec::new();

    for pid in registry {
        if let Err(e) = device.send(&pid.request()) {
            warn!("Write failed for PID 0x{:02X} ({}): {}", pid.code, pid.name, e);
            continue;
        }
        let response = match device.receive() {
            Ok(response) => response,
            Err(e) => {
                warn!("Read failed for PID 0x{:02X} ({}): {}", pid.code, pid.name, e);
                continue;
            }
        };

        if is_supported_response(&response, pid.code) {
            info!("PID 0x{:02X} ({}) supported", pid.code, pid.name);
            supported.push(*pid);
        } else {
            info!(
                "PID 0x{:02X} ({}) not supported: {:?}",
                pid.code, pid.name, response
            );
        }
    }

    info!("{} of {} PIDs supported", supported.len(), registry.len());
    supported
}

/// Whether a probe response shows the ECU supports `code`
///
/// The "SEARCHING" status and its dots are dropped first. An empty response or one containing a
/// negative marker is unsupported even if it also contains the positive prefix; otherwise the
/// response must contain `41 <code>` (with or without the space) anywhere.
pub fn is_supported_response(response: &str, code: u8) -> bool {
    let response = normalize(response);
    if response.is_empty() || NEGATIVE_MARKERS.iter().any(|m| response.contains(m)) {
        return false;
    }

    response.contains(&format!("41{:02X}", code)) || response.contains(&format!("41 {:02X}", code))
}
