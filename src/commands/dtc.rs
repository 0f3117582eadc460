use log::{debug, info, warn};
use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader, Read},
    path::Path,
};

use super::{
    normalize,
    types::{Dtc, TroubleCode, SERVICE_STORED_DTCS},
};
use crate::{device::Obd2BaseDevice, Error, Result};

/// Description given to codes missing from the lookup table
pub const UNKNOWN_TROUBLE_CODE: &str = "Unknown trouble code";

/// Human-readable descriptions of trouble codes, keyed by the code string (e.g. `P0301`)
#[derive(Debug, Default, Clone)]
pub struct DtcTable {
    descriptions: HashMap<String, String>,
}

impl DtcTable {
    /// Load a two column `code,description` table; fields may be quoted
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let table = Self::from_reader(File::open(path.as_ref())?)?;
        info!(
            "Loaded {} trouble code descriptions from {}",
            table.len(),
            path.as_ref().display()
        );
        Ok(table)
    }

    /// Like [load](Self::load), but a table that cannot be read is logged and replaced by an
    /// empty one
    pub fn load_or_empty<P: AsRef<Path>>(path: P) -> Self {
        Self::load(path.as_ref()).unwrap_or_else(|e| {
            warn!(
                "Could not load trouble code table {}: {}",
                path.as_ref().display(),
                e
            );
            Self::default()
        })
    }

    /// Rows with fewer than two fields are skipped
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut descriptions = HashMap::new();
        for line in BufReader::new(reader).lines() {
            let line = line?;
            let fields = split_record(&line);
            if let [code, description, ..] = fields.as_slice() {
                descriptions.insert(trim_field(code), trim_field(description));
            }
        }
        Ok(DtcTable { descriptions })
    }

    /// Exact-match lookup
    pub fn describe(&self, code: &str) -> &str {
        self.descriptions
            .get(code)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_TROUBLE_CODE)
    }

    pub fn len(&self) -> usize {
        self.descriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptions.is_empty()
    }
}

fn trim_field(field: &str) -> String {
    field.trim_matches(|c| c == '"' || c == ' ').to_owned()
}

/// Split one line on commas that are not inside double quotes; `""` inside quotes is a quote
fn split_record(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}

/// Parse a stored trouble code response such as `43 01 03 00 00`
///
/// The response must start with `43`. The rest is read as 4-hex-digit groups; a `0000` group
/// ends the list, and a trailing partial group is ignored.
pub fn parse_dtcs(response: &str) -> Result<Vec<Dtc>> {
    let prefix = format!("{:02X}", SERVICE_STORED_DTCS | 0x40);
    let response = normalize(response);
    if !response.starts_with(&prefix) || !response.is_ascii() {
        return Err(Error::UnexpectedResponse(response));
    }

    let compact: String = response.chars().filter(|c| !c.is_whitespace()).collect();
    let groups = compact[prefix.len()..].as_bytes().chunks_exact(4);

    let mut dtcs = Vec::new();
    for group in groups {
        // ascii was checked above
        let group = String::from_utf8_lossy(group);
        let b1 = u8::from_str_radix(&group[..2], 16)?;
        let b2 = u8::from_str_radix(&group[2..], 16)?;
        match Dtc::from_bytes(b1, b2) {
            Some(dtc) => dtcs.push(dtc),
            None => break,
        }
    }
    Ok(dtcs)
}

/// Request the stored trouble codes and describe each one from `table`
pub fn read_trouble_codes<D: Obd2BaseDevice>(
    device: &mut D,
    table: &DtcTable,
) -> Result<Vec<TroubleCode>> {
    device.send(&trouble_code_request())?;
    receive_trouble_codes(device, table)
}

/// The service 03 request line
pub(crate) fn trouble_code_request() -> String {
    format!("{:02X}", SERVICE_STORED_DTCS)
}

/// The read half of [read_trouble_codes], once the request has been sent
pub(crate) fn receive_trouble_codes<D: Obd2BaseDevice>(
    device: &mut D,
    table: &DtcTable,
) -> Result<Vec<TroubleCode>> {
    let response = device.receive()?;
    let codes: Vec<TroubleCode> = parse_dtcs(&response)?
        .into_iter()
        .map(|dtc| {
            let code = dtc.to_string();
            let description = table.describe(&code).to_owned();
            TroubleCode { code, description }
        })
        .collect();

    debug!("Read {} stored trouble codes", codes.len());
    Ok(codes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{mock::MockTransport, Elm327, Timing};
    use std::{io::Write, time::Duration};

    fn elm(mock: &MockTransport) -> Elm327<MockTransport> {
        Elm327::new(
            mock.clone(),
            Timing {
                command_spacing: Duration::ZERO,
                receive_timeout: Duration::from_millis(50),
            },
        )
    }

    fn table(text: &str) -> DtcTable {
        DtcTable::from_reader(text.as_bytes()).unwrap()
    }

    #[test]
    fn stored_codes_end_to_end() {
        let mock = MockTransport::new().with_reply("03", "43 01 03 00 00>");
        let mut device = elm(&mock);
        let table = table("P0103,Mass or Volume Air Flow Circuit High Input\n");

        let codes = read_trouble_codes(&mut device, &table).unwrap();

        assert_eq!(
            codes,
            vec![TroubleCode {
                code: "P0103".to_owned(),
                description: "Mass or Volume Air Flow Circuit High Input".to_owned(),
            }]
        );
        assert_eq!(mock.written(), vec!["03\r".to_owned()]);
    }

    #[test]
    fn groups_after_zero_group_are_ignored() {
        let dtcs = parse_dtcs("43 03 01 00 00 01 71").unwrap();
        assert_eq!(dtcs, vec![Dtc::Powertrain(0x0301)]);

        let dtcs = parse_dtcs("4303014123").unwrap();
        assert_eq!(dtcs, vec![Dtc::Powertrain(0x0301), Dtc::Chassis(0x0123)]);

        assert!(parse_dtcs("43").unwrap().is_empty());
        assert!(parse_dtcs("43 00 00").unwrap().is_empty());
    }

    #[test]
    fn response_without_prefix_is_an_error() {
        assert!(matches!(
            parse_dtcs("NO DATA"),
            Err(Error::UnexpectedResponse(r)) if r == "NO DATA"
        ));
        assert!(parse_dtcs("").is_err());
    }

    #[test]
    fn non_hex_group_is_an_error() {
        assert!(parse_dtcs("43 0G 01").is_err());
    }

    #[test]
    fn unknown_codes_get_sentinel_description() {
        let mock = MockTransport::new().with_reply("03", "43 41 23 00 00\r\r>");
        let mut device = elm(&mock);

        let codes = read_trouble_codes(&mut device, &DtcTable::default()).unwrap();

        assert_eq!(codes[0].code, "C0123");
        assert_eq!(codes[0].description, UNKNOWN_TROUBLE_CODE);
    }

    #[test]
    fn table_fields_may_be_quoted() {
        let table = table(
            "\"P0301\",\"Cylinder 1 Misfire Detected\"\n\
             P0420, \"Catalyst System Efficiency Below Threshold, Bank 1\"\n\
             incomplete\n",
        );

        assert_eq!(table.len(), 2);
        assert_eq!(table.describe("P0301"), "Cylinder 1 Misfire Detected");
        assert_eq!(
            table.describe("P0420"),
            "Catalyst System Efficiency Below Threshold, Bank 1"
        );
        assert_eq!(table.describe("p0301"), UNKNOWN_TROUBLE_CODE);
    }

    #[test]
    fn table_loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "P0171,System Too Lean (Bank 1)").unwrap();

        let table = DtcTable::load(file.path()).unwrap();

        assert_eq!(table.describe("P0171"), "System Too Lean (Bank 1)");
    }

    #[test]
    fn bundled_table_loads() {
        let table = DtcTable::load(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/data/obd_trouble_codes.csv"
        ))
        .unwrap();

        assert_eq!(table.describe("P0301"), "Cylinder 1 Misfire Detected");
        assert_eq!(
            table.describe("P0130"),
            "O2 Sensor Circuit Malfunction (Bank 1, Sensor 1)"
        );
    }

    #[test]
    fn missing_table_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.csv");

        assert!(DtcTable::load(&path).is_err());
        assert!(DtcTable::load_or_empty(&path).is_empty());
    }
}
