//! The service 01 PIDs the agent knows how to poll, in probing order
//!
//! `A` and `B` below are the first and second payload bytes after the `41 <code>` echo. Every
//! formula yields zero (or the PID's textual zero value) when the payload is too short.

use std::collections::BTreeMap;

use super::types::{DecodedValue, Pid};

/// Commanded secondary air status, indexed by `A`
const SECONDARY_AIR_STATUS: [&str; 4] = [
    "Upstream",
    "Downstream of catalytic converter",
    "From the outside atmosphere or off",
    "Pump commanded on for diagnostics",
];

pub static PIDS: &[Pid] = &[
    // reported by nearly every vehicle
    pid("Engine RPM", 0x0C, "rpm", 2, engine_rpm),
    pid("Vehicle Speed", 0x0D, "km/h", 1, single_byte),
    pid("Engine Coolant Temperature", 0x05, "°C", 1, temperature),
    pid("Calculated Engine Load", 0x04, "%", 1, percentage),
    pid("Throttle Position", 0x11, "%", 1, percentage),
    // commonly reported
    pid("Intake Manifold Pressure", 0x0B, "kPa", 1, single_byte),
    pid("Timing Advance", 0x0E, "° BTDC", 1, timing_advance),
    pid("Intake Air Temperature", 0x0F, "°C", 1, temperature),
    pid("MAF Air Flow Rate", 0x10, "g/s", 2, maf_air_flow),
    pid("Absolute Load Value", 0x43, "%", 2, absolute_load),
    pid("Fuel System Status", 0x03, "", 2, fuel_system_status),
    pid("Fuel Level", 0x2F, "%", 1, percentage),
    pid("Fuel Pressure", 0x0A, "kPa", 1, fuel_pressure),
    pid("O2 Sensor Voltage (Bank1 Sensor1)", 0x14, "V", 2, oxygen_sensor),
    pid("O2 Sensor Voltage (Bank1 Sensor2)", 0x15, "V", 2, oxygen_sensor),
    pid("Run Time Since Engine Start", 0x1F, "s", 2, double_byte),
    pid("Barometric Pressure", 0x33, "kPa", 1, single_byte),
    pid("Ambient Air Temperature", 0x46, "°C", 1, temperature),
    // less common
    pid("Commanded Secondary Air Status", 0x12, "", 1, secondary_air_status),
    pid("Oxygen Sensors Present", 0x13, "", 1, oxygen_sensors_present),
    pid("Catalyst Temperature Bank1 Sensor1", 0x3C, "°C", 2, catalyst_temperature),
    pid("Catalyst Temperature Bank2 Sensor1", 0x3D, "°C", 2, catalyst_temperature),
    pid("Control Module Voltage", 0x42, "V", 2, control_module_voltage),
    pid("Absolute Fuel Rail Pressure", 0x59, "kPa", 2, fuel_rail_pressure),
    pid("Relative Accelerator Pedal Position", 0x5A, "%", 1, percentage),
    pid("Hybrid Battery Pack Remaining Life", 0x5B, "%", 1, percentage),
    pid("Engine Oil Temperature", 0x5C, "°C", 1, temperature),
    pid("Fuel Injection Timing", 0x5D, "°", 2, injection_timing),
    pid("Engine Fuel Rate", 0x5E, "L/h", 2, fuel_rate),
];

/// Every registered PID, in probing order
pub fn all() -> &'static [Pid] {
    PIDS
}

/// Look up a registered PID by its code
pub fn find(code: u8) -> Option<&'static Pid> {
    PIDS.iter().find(|p| p.code == code)
}

const fn pid(
    name: &'static str,
    code: u8,
    unit: &'static str,
    byte_len: usize,
    decode: fn(&[u8]) -> DecodedValue,
) -> Pid {
    Pid {
        name,
        code,
        unit,
        byte_len,
        decode,
    }
}

fn a(data: &[u8]) -> Option<f64> {
    data.first().map(|&a| f64::from(a))
}

/// `256·A + B`
fn ab(data: &[u8]) -> Option<f64> {
    match data {
        [a, b, ..] => Some(f64::from(u16::from_be_bytes([*a, *b]))),
        _ => None,
    }
}

fn number(value: Option<f64>) -> DecodedValue {
    DecodedValue::Number(value.unwrap_or(0.0))
}

fn engine_rpm(data: &[u8]) -> DecodedValue {
    number(ab(data).map(|v| v / 4.0))
}

fn single_byte(data: &[u8]) -> DecodedValue {
    number(a(data))
}

fn double_byte(data: &[u8]) -> DecodedValue {
    number(ab(data))
}

fn temperature(data: &[u8]) -> DecodedValue {
    number(a(data).map(|v| v - 40.0))
}

fn percentage(data: &[u8]) -> DecodedValue {
    number(a(data).map(|v| v * 100.0 / 255.0))
}

fn timing_advance(data: &[u8]) -> DecodedValue {
    number(a(data).map(|v| v / 2.0 - 64.0))
}

fn maf_air_flow(data: &[u8]) -> DecodedValue {
    number(ab(data).map(|v| v / 100.0))
}

fn absolute_load(data: &[u8]) -> DecodedValue {
    number(ab(data).map(|v| v * 100.0 / 255.0))
}

fn fuel_pressure(data: &[u8]) -> DecodedValue {
    number(a(data).map(|v| v * 3.0))
}

fn catalyst_temperature(data: &[u8]) -> DecodedValue {
    number(ab(data).map(|v| v / 10.0 - 40.0))
}

fn control_module_voltage(data: &[u8]) -> DecodedValue {
    number(ab(data).map(|v| v / 1000.0))
}

fn fuel_rail_pressure(data: &[u8]) -> DecodedValue {
    number(ab(data).map(|v| v * 10.0))
}

fn injection_timing(data: &[u8]) -> DecodedValue {
    number(ab(data).map(|v| v / 128.0 - 210.0))
}

fn fuel_rate(data: &[u8]) -> DecodedValue {
    number(ab(data).map(|v| v / 20.0))
}

/// Fuel system 1 and 2 status bytes, as hex
fn fuel_system_status(data: &[u8]) -> DecodedValue {
    DecodedValue::Text(match data {
        [a, b, ..] => format!("{:02X} {:02X}", a, b),
        _ => "00 00".to_owned(),
    })
}

/// Voltage is `A/200`; short term fuel trim is `(B-128)·100/128`, where `0xFF` means the sensor
/// is not used in trim calculation
fn oxygen_sensor(data: &[u8]) -> DecodedValue {
    let (voltage, trim) = match data {
        [a, b, ..] => (
            f64::from(*a) / 200.0,
            (f64::from(*b) - 128.0) * 100.0 / 128.0,
        ),
        _ => (0.0, 0.0),
    };
    DecodedValue::Structured(BTreeMap::from([
        ("voltage".to_owned(), format!("{:.3}", voltage)),
        ("fuel_trim".to_owned(), format!("{:.1}", trim)),
    ]))
}

fn secondary_air_status(data: &[u8]) -> DecodedValue {
    DecodedValue::Text(match data.first() {
        Some(&a) => match SECONDARY_AIR_STATUS.get(usize::from(a)) {
            Some(status) => (*status).to_owned(),
            None => format!("Unknown ({})", a),
        },
        None => "Unknown".to_owned(),
    })
}

/// Sensor counts per bank: bank 1 in the high nibble, bank 2 in the low nibble
fn oxygen_sensors_present(data: &[u8]) -> DecodedValue {
    let a = data.first().copied().unwrap_or(0);
    DecodedValue::Structured(BTreeMap::from([
        ("bank1".to_owned(), (a >> 4).to_string()),
        ("bank2".to_owned(), (a & 0x0f).to_string()),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(code: u8, payload: &[u8]) -> DecodedValue {
        find(code).unwrap().decode(payload)
    }

    fn approx(value: DecodedValue, expected: f64) {
        let n = value.as_number().expect("numeric value");
        assert!((n - expected).abs() < 1e-9, "{} != {}", n, expected);
    }

    #[test]
    fn registry_codes_are_unique() {
        let mut codes: Vec<u8> = all().iter().map(|p| p.code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), all().len());
    }

    #[test]
    fn two_byte_formulas() {
        approx(decode(0x0C, &[0x1A, 0xF8]), 1726.0);
        approx(decode(0x10, &[0x01, 0x90]), 4.0);
        approx(decode(0x43, &[0x00, 0xFF]), 100.0);
        approx(decode(0x1F, &[0x01, 0x2C]), 300.0);
        approx(decode(0x3C, &[0x0F, 0xA0]), 360.0);
        approx(decode(0x42, &[0x30, 0xD4]), 12.5);
        approx(decode(0x59, &[0x00, 0x64]), 1000.0);
        approx(decode(0x5D, &[0x69, 0x00]), 0.0);
        approx(decode(0x5E, &[0x00, 0xC8]), 10.0);
    }

    #[test]
    fn single_byte_formulas() {
        approx(decode(0x0D, &[0x28]), 40.0);
        approx(decode(0x05, &[0x4F]), 39.0);
        approx(decode(0x46, &[0x00]), -40.0);
        approx(decode(0x04, &[0xFF]), 100.0);
        approx(decode(0x0A, &[0x64]), 300.0);
        approx(decode(0x0E, &[0x80]), 0.0);
        approx(decode(0x0E, &[0x00]), -64.0);
        approx(decode(0x33, &[0x65]), 101.0);
    }

    #[test]
    fn oxygen_sensor_reports_voltage_and_trim() {
        let value = decode(0x14, &[0x5A, 0x80]);
        let DecodedValue::Structured(fields) = value else {
            panic!("expected structured value");
        };
        assert_eq!(fields["voltage"], "0.450");
        assert_eq!(fields["fuel_trim"], "0.0");

        let DecodedValue::Structured(fields) = decode(0x15, &[0xC8, 0x00]) else {
            panic!("expected structured value");
        };
        assert_eq!(fields["voltage"], "1.000");
        assert_eq!(fields["fuel_trim"], "-100.0");
    }

    #[test]
    fn textual_pids() {
        assert_eq!(
            decode(0x03, &[0x02, 0x00]),
            DecodedValue::Text("02 00".to_owned())
        );
        assert_eq!(
            decode(0x12, &[0x01]),
            DecodedValue::Text("Downstream of catalytic converter".to_owned())
        );
        assert_eq!(
            decode(0x12, &[0x09]),
            DecodedValue::Text("Unknown (9)".to_owned())
        );
        assert_eq!(
            decode(0x13, &[0x31]),
            DecodedValue::Structured(BTreeMap::from([
                ("bank1".to_owned(), "3".to_owned()),
                ("bank2".to_owned(), "1".to_owned()),
            ]))
        );
    }

    #[test]
    fn short_payload_yields_zero_value_for_every_pid() {
        for pid in all() {
            for len in 0..pid.byte_len {
                let payload = vec![0x7F; len];
                match pid.decode(&payload) {
                    DecodedValue::Number(n) => assert_eq!(n, 0.0, "{:?}", pid),
                    DecodedValue::Text(t) => {
                        assert!(t == "00 00" || t == "Unknown", "{:?}: {}", pid, t)
                    }
                    DecodedValue::Structured(fields) => assert!(
                        fields.values().all(|v| v.parse::<f64>() == Ok(0.0)),
                        "{:?}: {:?}",
                        pid,
                        fields
                    ),
                }
            }
        }
    }

    #[test]
    fn decode_response_accepts_spaced_and_compact_text() {
        let rpm = find(0x0C).unwrap();
        assert_eq!(
            rpm.decode_response("41 0C 1A F8"),
            DecodedValue::Number(1726.0)
        );
        assert_eq!(rpm.decode_response("410C1AF8"), DecodedValue::Number(1726.0));
        assert_eq!(rpm.decode_response("NO DATA"), DecodedValue::Number(0.0));
    }
}
