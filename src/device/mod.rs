//! Adapter link: byte transports, link negotiation and the ELM327 command framer

mod elm327;
pub use elm327::{clean_response, Elm327, Timing, PROMPT, SEARCHING};

mod negotiate;
pub use negotiate::{is_adapter_response, Endpoint, Link, Negotiator, DEFAULT_BAUD_RATES};

#[cfg(feature = "serialport_comm")]
mod serialport_comm;
#[cfg(feature = "serialport_comm")]
pub use serialport_comm::{available_endpoints, SerialPort, SerialPortEndpoint};

#[cfg(feature = "ftdi_comm")]
mod ftdi_comm;
#[cfg(feature = "ftdi_comm")]
pub use ftdi_comm::{FtdiDevice, FtdiEndpoint};

#[cfg(test)]
pub(crate) mod mock;

type Result<T> = std::result::Result<T, Error>;

/// A byte-oriented, half-duplex link to an adapter
///
/// `read` may return fewer bytes than requested, and returns `Ok(0)` when nothing arrived within
/// the transport's internal timeout. Callers loop until their own completion condition is met.
pub trait Transport {
    fn write_all(&mut self, data: &[u8]) -> Result<()>;
    fn read(&mut self, data: &mut [u8]) -> Result<usize>;
    fn purge_buffers(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        (**self).write_all(data)
    }

    fn read(&mut self, data: &mut [u8]) -> Result<usize> {
        (**self).read(data)
    }

    fn purge_buffers(&mut self) -> Result<()> {
        (**self).purge_buffers()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// A command interpreter that answers one text command with one prompt-terminated response
///
/// Only one command may be in flight at a time: every [send](Self::send) must be followed by a
/// [receive](Self::receive) before the next command is sent.
pub trait Obd2BaseDevice {
    fn send(&mut self, cmd: &str) -> crate::Result<()>;
    fn receive(&mut self) -> crate::Result<String>;
    fn cmd(&mut self, cmd: &str) -> crate::Result<String> {
        self.send(cmd)?;
        self.receive()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[cfg(feature = "ftdi_comm")]
    #[error("FTDI error: `{0:?}`")]
    Ftdi(ftdi::Error),
    #[cfg(feature = "serialport_comm")]
    #[error("Serial port error: `{0:?}`")]
    Serialport(serialport::Error),
    #[error("IO error: `{0:?}`")]
    IO(std::io::Error),
    #[error("Communication error: `{0}`")]
    Communication(String),
}

#[cfg(feature = "ftdi_comm")]
impl From<ftdi::Error> for Error {
    fn from(e: ftdi::Error) -> Self {
        Error::Ftdi(e)
    }
}

#[cfg(feature = "serialport_comm")]
impl From<serialport::Error> for Error {
    fn from(e: serialport::Error) -> Self {
        Error::Serialport(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IO(e)
    }
}
