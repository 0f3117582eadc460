use super::{Endpoint, Error, Result, Transport};
use log::warn;
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

/// Internal read timeout; a read that times out reports zero bytes
const READ_TIMEOUT: Duration = Duration::from_millis(10);

/// Communicate with a serial device using the
/// serialport library
///
/// /dev/tty* or similar on unix-like systems
/// COM devices on Windows systems
pub struct SerialPort {
    device: Option<Box<dyn serialport::SerialPort>>,
}

impl SerialPort {
    /// Opens the port at `path` with 8N1 framing
    pub fn new(path: &str, baud_rate: u32) -> Result<Self> {
        let device = serialport::new(path, baud_rate)
            .timeout(READ_TIMEOUT)
            .parity(serialport::Parity::None)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .open()?;

        Ok(Self {
            device: Some(device),
        })
    }

    fn port(&mut self) -> Result<&mut Box<dyn serialport::SerialPort>> {
        self.device
            .as_mut()
            .ok_or_else(|| Error::Communication("serial port is closed".to_owned()))
    }
}

impl Transport for SerialPort {
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port()?;
        port.write_all(data)?;
        Ok(port.flush()?)
    }

    fn read(&mut self, data: &mut [u8]) -> Result<usize> {
        match self.port()?.read(data) {
            Ok(len) => Ok(len),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn purge_buffers(&mut self) -> Result<()> {
        Ok(self.port()?.clear(serialport::ClearBuffer::All)?)
    }

    fn close(&mut self) -> Result<()> {
        // the port is released when the handle drops
        match self.device.take() {
            Some(_) => Ok(()),
            None => Err(Error::Communication("serial port already closed".to_owned())),
        }
    }
}

/// A serial port that may have an adapter attached
#[derive(Debug, Clone)]
pub struct SerialPortEndpoint {
    path: String,
}

impl SerialPortEndpoint {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl Endpoint for SerialPortEndpoint {
    fn name(&self) -> &str {
        &self.path
    }

    fn open(&self, baud_rate: u32) -> Result<Box<dyn Transport>> {
        Ok(Box::new(SerialPort::new(&self.path, baud_rate)?))
    }
}

/// List the host's serial ports, USB adapters first
///
/// A failure to enumerate is logged and treated as "no ports".
pub fn available_endpoints() -> Vec<SerialPortEndpoint> {
    let mut names: Vec<String> = match serialport::available_ports() {
        Ok(ports) => ports.into_iter().map(|p| p.port_name).collect(),
        Err(e) => {
            warn!("Failed to list serial ports: {}", e);
            Vec::new()
        }
    };
    names.sort_by_key(|name| port_sort_key(name));
    names.dedup();

    names.into_iter().map(SerialPortEndpoint::new).collect()
}

/// ttyACM* first, then ttyUSB*, each in numeric order, then everything else by name
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    if let Some(rest) = basename.strip_prefix("ttyACM") {
        return (0, rest.parse().unwrap_or(usize::MAX), basename.to_owned());
    }
    if let Some(rest) = basename.strip_prefix("ttyUSB") {
        return (1, rest.parse().unwrap_or(usize::MAX), basename.to_owned());
    }
    (2, 0, basename.to_owned())
}
