use log::{debug, warn};

use super::{
    normalize,
    types::{Pid, PidQueryResult, QueryFault},
};
use crate::device::Obd2BaseDevice;

/// Query every PID once, in order, producing one result per PID
///
/// Failures are recorded in the results and never end the round early.
pub fn query_pids<D: Obd2BaseDevice>(device: &mut D, pids: &[Pid]) -> Vec<PidQueryResult> {
    pids.iter().map(|pid| query_pid(device, *pid)).collect()
}

fn query_pid<D: Obd2BaseDevice>(device: &mut D, pid: Pid) -> PidQueryResult {
    if let Err(e) = device.send(&pid.request()) {
        warn!("Write failed for PID 0x{:02X} ({}): {}", pid.code, pid.name, e);
        return PidQueryResult::invalid(pid, String::new(), QueryFault::Write(e.to_string()));
    }

    let raw = match device.receive() {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Read failed for PID 0x{:02X} ({}): {}", pid.code, pid.name, e);
            return PidQueryResult::invalid(pid, String::new(), QueryFault::Read(e.to_string()));
        }
    };

    let response = normalize(&raw);
    if response.starts_with(&pid.response_prefix())
        || response.starts_with(&pid.spaced_response_prefix())
    {
        let value = pid.decode_response(&response);
        debug!("{}: {}{}", pid.name, value, pid.unit);
        PidQueryResult::valid(pid, raw, value)
    } else {
        let fault = if response.is_empty() {
            QueryFault::EmptyResponse
        } else {
            QueryFault::Unsupported
        };
        debug!("{}: {} ({:?})", pid.name, fault, raw);
        PidQueryResult::invalid(pid, raw, fault)
    }
}
