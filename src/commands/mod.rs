//! High level OBD-II interface: the PID registry, capability detection, polling and trouble codes

use crate::device::{clean_response, SEARCHING};

mod detect;
pub use detect::{detect_supported_pids, is_supported_response};

mod dtc;
pub use dtc::{parse_dtcs, read_trouble_codes, DtcTable, UNKNOWN_TROUBLE_CODE};
pub(crate) use dtc::{receive_trouble_codes, trouble_code_request};

mod query;
pub use query::query_pids;

pub mod registry;

mod types;
pub use types::{
    DecodedValue, Dtc, Pid, PidQueryResult, QueryFault, TroubleCode, SERVICE_CURRENT_DATA,
    SERVICE_STORED_DTCS,
};

/// Clean a response and drop the transient protocol-search status along with its trailing dots
pub(crate) fn normalize(response: &str) -> String {
    let mut text = clean_response(response);
    while let Some(start) = text.find(SEARCHING) {
        let end = start + SEARCHING.len();
        let dots = text[end..].bytes().take_while(|&b| b == b'.').count();
        text.replace_range(start..end + dots, "");
    }
    text.trim().to_owned()
}

/// The hex bytes that follow `prefix` in a response, ignoring spacing
///
/// Parsing stops at the first pair that is not hex. A response that does not start with
/// `prefix` has no payload.
pub(crate) fn payload_bytes(response: &str, prefix: &str) -> Vec<u8> {
    let compact: String = response.chars().filter(|c| !c.is_whitespace()).collect();
    let Some(payload) = compact.to_ascii_uppercase().strip_prefix(prefix).map(str::to_owned)
    else {
        return Vec::new();
    };

    payload
        .as_bytes()
        .chunks_exact(2)
        .map_while(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|s| u8::from_str_radix(s, 16).ok())
        })
        .collect()
}
