use log::{debug, error, info, warn};
use std::{thread, time};

use super::Transport;
use crate::{Error, Result};

/// Bit rates tried on each endpoint, fastest first
pub const DEFAULT_BAUD_RATES: [u32; 3] = [115_200, 38_400, 9_600];

/// Identification command: the ELM327 answers with its name and version
const IDENTIFY_COMMAND: &[u8] = b"ATI\r";

/// Substrings that mark a reply as coming from an OBD-II adapter
const ADAPTER_MARKERS: [&str; 4] = ["ELM", "OBD", "STN", "OK"];

/// Stop collecting a probe reply after this many bytes; a chatty non-adapter device never stops
const MAX_PROBE_REPLY: usize = 256;

/// A place an adapter may be attached, such as a serial port
pub trait Endpoint {
    fn name(&self) -> &str;
    fn open(&self, baud_rate: u32) -> super::Result<Box<dyn Transport>>;
}

/// An open transport that answered the identification probe like an adapter
pub struct Link {
    pub name: String,
    pub baud_rate: u32,
    pub transport: Box<dyn Transport>,
}

/// Finds the first endpoint with a compatible adapter
#[derive(Debug, Clone)]
pub struct Negotiator {
    baud_rates: Vec<u32>,
    probe_wait: time::Duration,
}

impl Default for Negotiator {
    fn default() -> Self {
        Negotiator::new(DEFAULT_BAUD_RATES.to_vec(), time::Duration::from_millis(400))
    }
}

impl Negotiator {
    pub fn new(baud_rates: Vec<u32>, probe_wait: time::Duration) -> Self {
        Negotiator {
            baud_rates,
            probe_wait,
        }
    }

    /// Probe each endpoint in order and return the first one identified as an adapter
    ///
    /// Each endpoint is opened at the first bit rate that succeeds. Endpoints that cannot be
    /// opened are skipped, and endpoints that open but do not identify are closed before moving
    /// on. Only the returned link is left open.
    pub fn negotiate(&self, endpoints: &[Box<dyn Endpoint>]) -> Result<Link> {
        for endpoint in endpoints {
            let name = endpoint.name();
            info!("Scanning endpoint {}", name);

            let Some((baud_rate, mut transport)) = self.open_any(endpoint.as_ref()) else {
                warn!(
                    "Could not open {} at any of {:?} baud",
                    name, self.baud_rates
                );
                continue;
            };

            match self.probe(transport.as_mut()) {
                Ok(reply) if is_adapter_response(&reply) => {
                    info!(
                        "Valid OBD-II adapter detected on {} at {} baud: {:?}",
                        name,
                        baud_rate,
                        String::from_utf8_lossy(&reply)
                    );
                    return Ok(Link {
                        name: name.to_owned(),
                        baud_rate,
                        transport,
                    });
                }
                Ok(reply) => info!(
                    "{} responded, but was not recognized as an OBD-II adapter: {:?}",
                    name,
                    String::from_utf8_lossy(&reply)
                ),
                Err(e) => warn!("Identification probe failed on {}: {}", name, e),
            }

            if let Err(e) = transport.close() {
                warn!("Failed to close {}: {}", name, e);
            }
        }

        error!("No OBD-II adapters detected");
        Err(Error::NoAdapterFound)
    }

    fn open_any(&self, endpoint: &dyn Endpoint) -> Option<(u32, Box<dyn Transport>)> {
        self.baud_rates
            .iter()
            .find_map(|&baud_rate| match endpoint.open(baud_rate) {
                Ok(transport) => {
                    debug!("Opened {} at {} baud", endpoint.name(), baud_rate);
                    Some((baud_rate, transport))
                }
                Err(e) => {
                    debug!(
                        "Could not open {} at {} baud: {}",
                        endpoint.name(),
                        baud_rate,
                        e
                    );
                    None
                }
            })
    }

    fn probe(&self, transport: &mut dyn Transport) -> super::Result<Vec<u8>> {
        transport.purge_buffers()?;
        transport.write_all(IDENTIFY_COMMAND)?;
        thread::sleep(self.probe_wait);

        let mut reply = Vec::new();
        let mut chunk = [0u8; 64];
        while reply.len() < MAX_PROBE_REPLY {
            let len = transport.read(&mut chunk)?;
            if len == 0 {
                break;
            }
            reply.extend_from_slice(&chunk[..len]);
        }
        Ok(reply)
    }
}

/// Whether an identification reply looks like it came from an OBD-II adapter
pub fn is_adapter_response(reply: &[u8]) -> bool {
    let reply = String::from_utf8_lossy(reply)
        .to_ascii_uppercase()
        .replace(&['\r', '\n'][..], "");
    let reply = reply.trim();

    ADAPTER_MARKERS.iter().any(|marker| reply.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::{MockEndpoint, MockTransport};

    fn negotiator() -> Negotiator {
        Negotiator::new(DEFAULT_BAUD_RATES.to_vec(), time::Duration::ZERO)
    }

    #[test]
    fn elm327_identification_is_an_adapter() {
        assert!(is_adapter_response(b"ELM327 v1.5"));
        assert!(is_adapter_response(b"\r\nelm327 v2.1\r\r>"));
        assert!(is_adapter_response(b"STN1110 r4.0"));
        assert!(is_adapter_response(b"OK"));
    }

    #[test]
    fn garbage_is_not_an_adapter() {
        assert!(!is_adapter_response(b"garbage\r\n"));
        assert!(!is_adapter_response(b""));
        assert!(!is_adapter_response(b"$GPGGA,123519,4807.038,N"));
    }

    #[test]
    fn first_compatible_endpoint_wins_and_others_are_closed() {
        let gps = MockEndpoint::answering("/dev/ttyS0", "garbage\r\n");
        let elm = MockEndpoint::answering("/dev/ttyUSB0", "ELM327 v1.5\r\r>");
        let later = MockEndpoint::answering("/dev/ttyUSB1", "ELM327 v1.5\r\r>");
        let (gps_io, elm_io, later_io) = (gps.transport(), elm.transport(), later.transport());
        let endpoints: Vec<Box<dyn Endpoint>> =
            vec![Box::new(gps), Box::new(elm), Box::new(later)];

        let link = negotiator().negotiate(&endpoints).unwrap();

        assert_eq!(link.name, "/dev/ttyUSB0");
        assert_eq!(link.baud_rate, 115_200);
        assert_eq!(gps_io.close_count(), 1);
        assert_eq!(elm_io.close_count(), 0);
        assert_eq!(elm_io.written(), vec!["ATI\r".to_owned()]);
        assert!(later_io.written().is_empty());
    }

    #[test]
    fn slower_baud_rate_is_kept_when_faster_ones_fail() {
        let transport = MockTransport::new().with_reply("ATI", "ELM327 v1.5\r\r>");
        let endpoint = MockEndpoint::new("COM3", &[9_600], transport);
        let endpoints: Vec<Box<dyn Endpoint>> = vec![Box::new(endpoint)];

        let link = negotiator().negotiate(&endpoints).unwrap();

        assert_eq!(link.baud_rate, 9_600);
    }

    #[test]
    fn unopenable_and_failing_endpoints_are_skipped() {
        let locked = MockEndpoint::new("/dev/ttyS1", &[], MockTransport::new());
        let broken = MockEndpoint::new(
            "/dev/ttyS2",
            &DEFAULT_BAUD_RATES,
            MockTransport::new().failing_writes(),
        );
        let broken_io = broken.transport();
        let elm = MockEndpoint::answering("/dev/ttyACM0", "ELM327 v1.5\r\r>");
        let endpoints: Vec<Box<dyn Endpoint>> =
            vec![Box::new(locked), Box::new(broken), Box::new(elm)];

        let link = negotiator().negotiate(&endpoints).unwrap();

        assert_eq!(link.name, "/dev/ttyACM0");
        assert_eq!(broken_io.close_count(), 1);
    }

    #[test]
    fn no_compatible_endpoint_fails() {
        let endpoints: Vec<Box<dyn Endpoint>> = vec![Box::new(MockEndpoint::answering(
            "/dev/ttyS0",
            "garbage\r\n",
        ))];

        assert!(matches!(
            negotiator().negotiate(&endpoints),
            Err(Error::NoAdapterFound)
        ));
        assert!(matches!(
            negotiator().negotiate(&[]),
            Err(Error::NoAdapterFound)
        ));
    }
}
