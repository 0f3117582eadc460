//! Agent for collecting live data and stored trouble codes from a car through an ELM327 OBD-II
//! adapter
//!
//! # Usage
//! ```no_run
//! use obd2_agent::{
//!     commands::{query_pids, DtcTable},
//!     device::{available_endpoints, Elm327, Endpoint, Negotiator, Timing},
//!     session::{Session, SessionConfig},
//! };
//!
//! fn main() -> Result<(), obd2_agent::Error> {
//!     let endpoints: Vec<Box<dyn Endpoint>> = available_endpoints()
//!         .into_iter()
//!         .map(|e| Box::new(e) as Box<dyn Endpoint>)
//!         .collect();
//!     let link = Negotiator::default().negotiate(&endpoints)?;
//!     let mut device = Elm327::new(link.transport, Timing::default());
//!     device.initialize();
//!
//!     let mut session = Session::new(device, DtcTable::default(), SessionConfig::default());
//!     let round = session.poll_round()?;
//!     for reading in &round.readings {
//!         println!("{}: {:?}", reading.pid().name, reading.value());
//!     }
//!     session.into_device().shutdown()
//! }
//! ```

#![forbid(unsafe_code)]

pub mod commands;

pub mod config;

pub mod device;

mod error;
pub use error::{DeviceError, Error, Result};

pub mod session;

pub mod sink;
