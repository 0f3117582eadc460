use log::{error, info, warn};
use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use obd2_agent::{
    commands::DtcTable,
    config::Config,
    device::{available_endpoints, Elm327, Endpoint, Negotiator},
    session::Session,
    sink::{CsvLogSink, SinkWorker, UploadSink},
    Error,
};

/// Read from the working directory when no path is given
const DEFAULT_CONFIG: &str = "obd2-agent.toml";

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Error> {
    let config = load_config()?;

    let negotiator = Negotiator::new(config.baud_rates.clone(), config.probe_wait());
    let link = negotiator.negotiate(&endpoints())?;
    info!("Using {} at {} baud", link.name, link.baud_rate);

    let mut device = Elm327::new(link.transport, config.timing());
    device.initialize();

    let table = DtcTable::load_or_empty(&config.dtc_table);
    let sinks = spawn_sinks(&config);

    let mut session = Session::new(device, table, config.session());
    let result = session.run(&sinks, config.max_rounds);

    for sink in sinks {
        sink.shutdown();
    }
    if let Err(e) = session.into_device().shutdown() {
        warn!("Closing the adapter failed: {}", e);
    }
    result
}

fn load_config() -> Result<Config, Error> {
    match std::env::args_os().nth(1) {
        Some(path) => Config::load(PathBuf::from(path)),
        None if Path::new(DEFAULT_CONFIG).exists() => Config::load(DEFAULT_CONFIG),
        None => {
            info!("No configuration file, using defaults");
            Ok(Config::default())
        }
    }
}

fn endpoints() -> Vec<Box<dyn Endpoint>> {
    let endpoints = available_endpoints()
        .into_iter()
        .map(|e| Box::new(e) as Box<dyn Endpoint>);

    #[cfg(feature = "ftdi_comm")]
    let endpoints = endpoints.chain(std::iter::once(
        Box::new(obd2_agent::device::FtdiEndpoint) as Box<dyn Endpoint>
    ));

    endpoints.collect()
}

fn spawn_sinks(config: &Config) -> Vec<SinkWorker> {
    let mut sinks = Vec::new();

    match SinkWorker::spawn(CsvLogSink::new(&config.log_dir)) {
        Ok(worker) => sinks.push(worker),
        Err(e) => warn!("Could not start the CSV log: {}", e),
    }

    if let Some(upload) = &config.upload {
        match UploadSink::new(&upload.url, &upload.device_key) {
            Ok(sink) => match SinkWorker::spawn(sink) {
                Ok(worker) => sinks.push(worker),
                Err(e) => warn!("Could not start uploads: {}", e),
            },
            Err(e) => warn!("Could not start uploads: {}", e),
        }
    }

    sinks
}
