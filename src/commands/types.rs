use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::{collections::BTreeMap, fmt};

/// Service code for "show current data"
pub const SERVICE_CURRENT_DATA: u8 = 0x01;

/// Service code for "show stored diagnostic trouble codes"
pub const SERVICE_STORED_DTCS: u8 = 0x03;

/// A physical value decoded from an OBD-II response
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum DecodedValue {
    Number(f64),
    Text(String),
    /// Named fields, for PIDs that pack more than one quantity into their payload
    Structured(BTreeMap<String, String>),
}

impl DecodedValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for DecodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
            Self::Structured(fields) => {
                for (i, (key, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                Ok(())
            }
        }
    }
}

/// A service 01 parameter: its identity, metadata and decode formula
///
/// `decode` receives the payload bytes that follow the `41 <code>` echo. It must not fail: a
/// payload shorter than `byte_len` yields the PID's zero value.
#[derive(Clone, Copy)]
pub struct Pid {
    pub name: &'static str,
    pub code: u8,
    pub unit: &'static str,
    pub byte_len: usize,
    pub(crate) decode: fn(&[u8]) -> DecodedValue,
}

impl Pid {
    /// The request line for this PID, e.g. `010C`
    pub fn request(&self) -> String {
        format!("{:02X}{:02X}", SERVICE_CURRENT_DATA, self.code)
    }

    /// The positive-response prefix without a separating space, e.g. `410C`
    pub fn response_prefix(&self) -> String {
        format!("{:02X}{:02X}", SERVICE_CURRENT_DATA | 0x40, self.code)
    }

    /// The positive-response prefix as the adapter prints it with spaces on, e.g. `41 0C`
    pub fn spaced_response_prefix(&self) -> String {
        format!("{:02X} {:02X}", SERVICE_CURRENT_DATA | 0x40, self.code)
    }

    /// Decode payload bytes
    pub fn decode(&self, payload: &[u8]) -> DecodedValue {
        (self.decode)(payload)
    }

    /// Decode a cleaned response line such as `41 0C 1A F8` or `410C1AF8`
    pub fn decode_response(&self, response: &str) -> DecodedValue {
        self.decode(&super::payload_bytes(response, &self.response_prefix()))
    }
}

impl PartialEq for Pid {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

impl Eq for Pid {}

impl fmt::Debug for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pid")
            .field("name", &self.name)
            .field("code", &format_args!("{:#04X}", self.code))
            .field("unit", &self.unit)
            .field("byte_len", &self.byte_len)
            .finish()
    }
}

impl Serialize for Pid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Pid", 4)?;
        s.serialize_field("name", self.name)?;
        s.serialize_field("code", &self.code)?;
        s.serialize_field("unit", self.unit)?;
        s.serialize_field("byte_len", &self.byte_len)?;
        s.end()
    }
}

/// Why a PID query did not produce a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryFault {
    /// The request could not be written to the adapter
    Write(String),
    /// No complete response was read back
    Read(String),
    /// The adapter answered with nothing
    EmptyResponse,
    /// The answer was not a positive response for this PID
    Unsupported,
}

impl fmt::Display for QueryFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Write(e) => write!(f, "write failed: {}", e),
            Self::Read(e) => write!(f, "read failed: {}", e),
            Self::EmptyResponse => f.write_str("empty response"),
            Self::Unsupported => f.write_str("invalid or unsupported"),
        }
    }
}

/// The outcome of querying one PID once
///
/// Invalid results never carry a value and always carry error text.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PidQueryResult {
    pid: Pid,
    raw_response: String,
    valid: bool,
    value: Option<DecodedValue>,
    error: String,
    #[serde(skip)]
    fault: Option<QueryFault>,
}

impl PidQueryResult {
    pub fn valid(pid: Pid, raw_response: String, value: DecodedValue) -> Self {
        PidQueryResult {
            pid,
            raw_response,
            valid: true,
            value: Some(value),
            error: String::new(),
            fault: None,
        }
    }

    pub fn invalid(pid: Pid, raw_response: String, fault: QueryFault) -> Self {
        PidQueryResult {
            pid,
            raw_response,
            valid: false,
            value: None,
            error: fault.to_string(),
            fault: Some(fault),
        }
    }

    pub fn pid(&self) -> &Pid {
        &self.pid
    }

    pub fn raw_response(&self) -> &str {
        &self.raw_response
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn value(&self) -> Option<&DecodedValue> {
        self.value.as_ref()
    }

    pub fn error_text(&self) -> &str {
        &self.error
    }

    pub fn fault(&self) -> Option<&QueryFault> {
        self.fault.as_ref()
    }
}

/// An individual trouble code from an ECU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dtc {
    /// Powertrain, represented with `'P'`
    Powertrain(u16),
    /// Chassis, represented with `'C'`
    Chassis(u16),
    /// Body, represented with `'B'`
    Body(u16),
    /// Network, represented with `'U'` likely due to previously being the "unknown" category
    Network(u16),
}

impl Dtc {
    /// Decode the two bytes of a stored code; `00 00` is padding, not a code
    ///
    /// The top two bits of the first byte select the system, the remaining 14 bits are the four
    /// digits that follow the letter.
    pub fn from_bytes(b1: u8, b2: u8) -> Option<Dtc> {
        if b1 == 0 && b2 == 0 {
            return None;
        }
        let n = (u16::from(b1 & 0x3f) << 8) | u16::from(b2);
        Some(match b1 >> 6 {
            0 => Dtc::Powertrain(n),
            1 => Dtc::Chassis(n),
            2 => Dtc::Body(n),
            _ => Dtc::Network(n),
        })
    }
}

impl fmt::Display for Dtc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (c, n) = match self {
            Self::Powertrain(n) => ('P', n),
            Self::Chassis(n) => ('C', n),
            Self::Body(n) => ('B', n),
            Self::Network(n) => ('U', n),
        };
        f.write_fmt(format_args!("{}{:04X}", c, n))
    }
}

/// A stored trouble code with its human-readable description
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TroubleCode {
    pub code: String,
    pub description: String,
}
