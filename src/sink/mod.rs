//! Consumers of polling results, each fed from its own worker thread so a slow sink never holds
//! up the link

use log::{debug, warn};
use std::{
    io,
    sync::mpsc::{self, Sender},
    thread::{self, JoinHandle},
};

use crate::commands::{PidQueryResult, TroubleCode};

mod csv_log;
pub use csv_log::CsvLogSink;

mod upload;
pub use upload::{UploadBody, UploadItem, UploadSink};

#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("IO error: `{0}`")]
    Io(#[from] io::Error),
    #[error("HTTP error: `{0}`")]
    Http(#[from] reqwest::Error),
    #[error("JSON error: `{0}`")]
    Json(#[from] serde_json::Error),
}

/// A destination for readings and trouble codes
pub trait Sink {
    fn name(&self) -> &str;
    fn write_readings(&mut self, readings: &[PidQueryResult]) -> Result<(), SinkError>;
    fn write_trouble_codes(&mut self, codes: &[TroubleCode]) -> Result<(), SinkError>;
}

/// One unit of work for a sink
#[derive(Debug, Clone)]
pub enum Record {
    Readings(Vec<PidQueryResult>),
    TroubleCodes(Vec<TroubleCode>),
}

/// A sink running on its own thread behind an unbounded queue
///
/// Dropping the worker closes the queue and waits for the records already queued to be written.
pub struct SinkWorker {
    name: String,
    tx: Option<Sender<Record>>,
    handle: Option<JoinHandle<()>>,
}

impl SinkWorker {
    pub fn spawn<S: Sink + Send + 'static>(mut sink: S) -> io::Result<Self> {
        let name = sink.name().to_owned();
        let (tx, rx) = mpsc::channel::<Record>();

        let handle = thread::Builder::new()
            .name(format!("sink-{}", name))
            .spawn(move || {
                for record in rx {
                    let result = match &record {
                        Record::Readings(readings) => sink.write_readings(readings),
                        Record::TroubleCodes(codes) => sink.write_trouble_codes(codes),
                    };
                    if let Err(e) = result {
                        warn!("{} sink failed: {}", sink.name(), e);
                    }
                }
                debug!("{} sink stopped", sink.name());
            })?;

        Ok(SinkWorker {
            name,
            tx: Some(tx),
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue a record; never blocks
    pub fn submit(&self, record: Record) {
        if let Some(tx) = &self.tx {
            if tx.send(record).is_err() {
                warn!("{} sink is gone, dropping record", self.name);
            }
        }
    }

    /// Finish writing everything queued, then stop the thread
    pub fn shutdown(self) {
        drop(self)
    }
}

impl Drop for SinkWorker {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("{} sink thread panicked", self.name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{registry, DecodedValue};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Counting {
        readings: Arc<Mutex<usize>>,
        fail: bool,
    }

    impl Sink for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn write_readings(&mut self, _: &[PidQueryResult]) -> Result<(), SinkError> {
            *self.readings.lock().unwrap() += 1;
            if self.fail {
                return Err(SinkError::Io(io::Error::new(io::ErrorKind::Other, "full")));
            }
            Ok(())
        }

        fn write_trouble_codes(&mut self, _: &[TroubleCode]) -> Result<(), SinkError> {
            Ok(())
        }
    }

    fn readings() -> Vec<PidQueryResult> {
        let pid = *registry::find(0x0D).unwrap();
        vec![PidQueryResult::valid(
            pid,
            "41 0D 28".to_owned(),
            DecodedValue::Number(40.0),
        )]
    }

    #[test]
    fn shutdown_drains_the_queue() {
        let sink = Counting::default();
        let worker = SinkWorker::spawn(sink.clone()).unwrap();
        for _ in 0..10 {
            worker.submit(Record::Readings(readings()));
        }
        worker.shutdown();

        assert_eq!(*sink.readings.lock().unwrap(), 10);
    }

    #[test]
    fn sink_errors_do_not_stop_the_worker() {
        let sink = Counting {
            fail: true,
            ..Default::default()
        };
        let worker = SinkWorker::spawn(sink.clone()).unwrap();
        assert_eq!(worker.name(), "counting");
        worker.submit(Record::Readings(readings()));
        worker.submit(Record::Readings(readings()));
        drop(worker);

        assert_eq!(*sink.readings.lock().unwrap(), 2);
    }
}
