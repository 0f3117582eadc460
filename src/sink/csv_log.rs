use chrono::{DateTime, Local, SecondsFormat, TimeZone};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use super::{Sink, SinkError};
use crate::commands::{PidQueryResult, TroubleCode};

/// Appends one line per record to a file named after the current day, e.g. `5-March-2024.csv`
///
/// Reading lines look like `2024-03-05T14:30:00+01:00,Engine RPM=1726,Vehicle Speed=40`; invalid
/// readings are left out. Trouble code lines use `DTC=<code> (<description>)` fields. A field
/// holding a comma, quote or line break is quoted, with inner quotes doubled.
#[derive(Debug, Clone)]
pub struct CsvLogSink {
    dir: PathBuf,
}

impl CsvLogSink {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        CsvLogSink {
            dir: dir.as_ref().to_owned(),
        }
    }

    /// The log file that lines written at `at` go to
    pub fn path_for<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> PathBuf
    where
        Tz::Offset: std::fmt::Display,
    {
        self.dir.join(at.format("%-d-%B-%Y.csv").to_string())
    }

    fn append<Tz: TimeZone>(&self, at: &DateTime<Tz>, line: &str) -> Result<(), SinkError>
    where
        Tz::Offset: std::fmt::Display,
    {
        fs::create_dir_all(&self.dir)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(at))?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

fn timestamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn field(text: String) -> String {
    if text.contains(&[',', '"', '\r', '\n'][..]) {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text
    }
}

/// `None` when no reading is valid
pub(crate) fn readings_line<Tz: TimeZone>(
    at: &DateTime<Tz>,
    readings: &[PidQueryResult],
) -> Option<String>
where
    Tz::Offset: std::fmt::Display,
{
    let fields: Vec<String> = readings
        .iter()
        .filter_map(|r| r.value().map(|v| field(format!("{}={}", r.pid().name, v))))
        .collect();
    if fields.is_empty() {
        return None;
    }
    Some(format!("{},{}", timestamp(at), fields.join(",")))
}

pub(crate) fn trouble_codes_line<Tz: TimeZone>(at: &DateTime<Tz>, codes: &[TroubleCode]) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let mut line = timestamp(at);
    for code in codes {
        line.push(',');
        line.push_str(&field(format!("DTC={} ({})", code.code, code.description)));
    }
    line
}

impl Sink for CsvLogSink {
    fn name(&self) -> &str {
        "csv log"
    }

    fn write_readings(&mut self, readings: &[PidQueryResult]) -> Result<(), SinkError> {
        let now = Local::now();
        match readings_line(&now, readings) {
            Some(line) => self.append(&now, &line),
            None => Ok(()),
        }
    }

    fn write_trouble_codes(&mut self, codes: &[TroubleCode]) -> Result<(), SinkError> {
        if codes.is_empty() {
            return Ok(());
        }
        let now = Local::now();
        self.append(&now, &trouble_codes_line(&now, codes))
    }
}
