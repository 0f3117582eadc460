use super::{Endpoint, Error, Result, Transport};
use std::io::{Read, Write};

/// USB IDs of the FT232R found in many ELM327 adapters
const FTDI_VID: u16 = 0x0403;
const FTDI_PID: u16 = 0x6001;

/// Communicate with a USB to Serial FTDI device
/// with the FTDI library
pub struct FtdiDevice {
    device: Option<ftdi::Device>,
}

impl FtdiDevice {
    /// Opens the first FT232R on the bus at the given baud rate
    pub fn new(baud_rate: u32) -> Result<Self> {
        let mut device = ftdi::find_by_vid_pid(FTDI_VID, FTDI_PID)
            .interface(ftdi::Interface::A)
            .open()?;

        device.set_baud_rate(baud_rate)?;
        device.configure(ftdi::Bits::Eight, ftdi::StopBits::One, ftdi::Parity::None)?;
        device.usb_reset()?;

        Ok(Self {
            device: Some(device),
        })
    }

    fn device(&mut self) -> Result<&mut ftdi::Device> {
        self.device
            .as_mut()
            .ok_or_else(|| Error::Communication("FTDI device is closed".to_owned()))
    }
}

impl Transport for FtdiDevice {
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        Ok(self.device()?.write_all(data)?)
    }

    fn read(&mut self, data: &mut [u8]) -> Result<usize> {
        Ok(self.device()?.read(data)?)
    }

    fn purge_buffers(&mut self) -> Result<()> {
        Ok(self.device()?.usb_purge_buffers()?)
    }

    fn close(&mut self) -> Result<()> {
        match self.device.take() {
            Some(_) => Ok(()),
            None => Err(Error::Communication("FTDI device already closed".to_owned())),
        }
    }
}

/// The first FT232R attached over USB
#[derive(Debug, Default, Clone, Copy)]
pub struct FtdiEndpoint;

impl Endpoint for FtdiEndpoint {
    fn name(&self) -> &str {
        "ftdi:0403:6001"
    }

    fn open(&self, baud_rate: u32) -> Result<Box<dyn Transport>> {
        Ok(Box::new(FtdiDevice::new(baud_rate)?))
    }
}
