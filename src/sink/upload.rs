use log::{debug, info};
use serde::Serialize;
use std::time::Duration;

use super::{Sink, SinkError};
use crate::commands::{PidQueryResult, TroubleCode};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// One named value in an upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadItem {
    pub data_type: String,
    pub data_val: String,
}

/// The JSON body posted to the ingest endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadBody {
    pub key: String,
    pub data: Vec<UploadItem>,
}

impl UploadBody {
    /// Valid readings only, as `name` / displayed value pairs
    pub fn from_readings(key: &str, readings: &[PidQueryResult]) -> Self {
        let data = readings
            .iter()
            .filter_map(|r| {
                r.value().map(|v| UploadItem {
                    data_type: r.pid().name.to_owned(),
                    data_val: v.to_string(),
                })
            })
            .collect();
        UploadBody {
            key: key.to_owned(),
            data,
        }
    }

    pub fn from_trouble_codes(key: &str, codes: &[TroubleCode]) -> Self {
        let data = codes
            .iter()
            .map(|c| UploadItem {
                data_type: "DTC".to_owned(),
                data_val: format!("{} ({})", c.code, c.description),
            })
            .collect();
        UploadBody {
            key: key.to_owned(),
            data,
        }
    }
}

/// Posts every record as JSON to a live-data endpoint, authenticated by a device key in the body
pub struct UploadSink {
    url: String,
    device_key: String,
    client: reqwest::blocking::Client,
}

impl UploadSink {
    pub fn new(url: &str, device_key: &str) -> Result<Self, SinkError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self::with_client(url, device_key, client))
    }

    pub(crate) fn with_client(
        url: &str,
        device_key: &str,
        client: reqwest::blocking::Client,
    ) -> Self {
        UploadSink {
            url: url.to_owned(),
            device_key: device_key.to_owned(),
            client,
        }
    }

    fn post(&self, body: &UploadBody) -> Result<(), SinkError> {
        if body.data.is_empty() {
            return Ok(());
        }
        debug!("Uploading {}", serde_json::to_string(body)?);
        let response = self
            .client
            .post(&self.url)
            .json(body)
            .send()?
            .error_for_status()?;
        info!("Upload status: {}", response.status());
        Ok(())
    }
}

impl Sink for UploadSink {
    fn name(&self) -> &str {
        "upload"
    }

    fn write_readings(&mut self, readings: &[PidQueryResult]) -> Result<(), SinkError> {
        self.post(&UploadBody::from_readings(&self.device_key, readings))
    }

    fn write_trouble_codes(&mut self, codes: &[TroubleCode]) -> Result<(), SinkError> {
        self.post(&UploadBody::from_trouble_codes(&self.device_key, codes))
    }
}
