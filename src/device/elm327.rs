use log::{debug, info, trace, warn};
use std::{thread, time};

use super::{Obd2BaseDevice, Transport};
use crate::{Error, Result};

/// The character the ELM327 prints once a response is complete and it is ready for a command
pub const PROMPT: u8 = b'>';

/// Status text printed while the adapter is still detecting the vehicle's bus protocol
pub const SEARCHING: &str = "SEARCHING";

/// Sleep between empty reads so a transport without a blocking timeout does not spin
const POLL_INTERVAL: time::Duration = time::Duration::from_millis(5);

/// Commands sent after negotiation: echo off, then automatic protocol selection
const INIT_COMMANDS: [&str; 2] = ["ATE0", "ATSP0"];

/// Pacing and deadline for the command/response cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Minimum time between the previous operation on the link and the next command
    pub command_spacing: time::Duration,

    /// Deadline for a complete, prompt-terminated response
    pub receive_timeout: time::Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            command_spacing: time::Duration::from_millis(300),
            receive_timeout: time::Duration::from_secs(5),
        }
    }
}

/// An ELM327 OBD-II adapter
///
/// Commands to the device itself are indicated by sending "AT" followed by the command, while
/// plain strings of hex data indicate OBD-II requests to be sent to the vehicle. The responses of
/// the vehicle are echoed back as hex characters. Capitalization and spaces are always ignored.
/// There is no length framing: a response is complete only once the prompt character (`>`) is
/// printed, so the read deadline is the only protection against a truncated link.
///
/// [Datasheet for v1.4b](https://www.elmelectronics.com/products/dsheets/).
pub struct Elm327<T: Transport> {
    device: T,
    timing: Timing,
    last_operation: Option<time::Instant>,
    last_command: String,
}

impl<T: Transport> Obd2BaseDevice for Elm327<T> {
    /// Send a command line, terminated with a carriage return
    ///
    /// Waits out the remainder of the command spacing first, then discards anything left in the
    /// transport's buffers so a late reply to an earlier command cannot be mistaken for this one.
    fn send(&mut self, cmd: &str) -> Result<()> {
        self.wait_for_spacing();
        self.device.purge_buffers()?;

        trace!("send: sending {:?}", cmd);
        let mut data = Vec::with_capacity(cmd.len() + 1);
        data.extend_from_slice(cmd.as_bytes());
        data.push(b'\r');
        self.device.write_all(&data)?;

        self.last_command = cmd.trim().to_ascii_uppercase();
        self.last_operation = Some(time::Instant::now());
        Ok(())
    }

    /// Read data until the ELM327's prompt character is printed
    ///
    /// The returned text is upper-cased, with line terminators, the prompt and any echo of the
    /// command removed. A transient "SEARCHING..." status does not end the read.
    fn receive(&mut self) -> Result<String> {
        let result = self.get_until_prompt();
        self.last_operation = Some(time::Instant::now());

        let response = strip_echo(clean_response(&result?), &self.last_command);
        debug!(
            "Sent command {:?} and got response {:?}",
            self.last_command, response
        );
        Ok(response)
    }
}

impl<T: Transport> Elm327<T> {
    /// Wrap a negotiated transport
    pub fn new(device: T, timing: Timing) -> Self {
        Elm327 {
            device,
            timing,
            last_operation: None,
            last_command: String::new(),
        }
    }

    /// Turn off command echo and select the vehicle protocol automatically
    ///
    /// Failures are logged only; an adapter that rejects these still answers OBD-II requests.
    pub fn initialize(&mut self) {
        for cmd in INIT_COMMANDS {
            match self.cmd(cmd) {
                Ok(response) => debug!("initialize: {} got response {:?}", cmd, response),
                Err(e) => warn!("initialize: {} failed: {}", cmd, e),
            }
        }
    }

    /// Reset the adapter, then close the transport
    ///
    /// The reset is best-effort. Consuming `self` makes this the only place the transport is
    /// closed.
    pub fn shutdown(mut self) -> Result<()> {
        info!("Performing IC reset");
        match self.cmd("ATZ") {
            Ok(response) => debug!("shutdown: reset got response {:?}", response),
            Err(e) => warn!("shutdown: reset failed: {}", e),
        }
        self.device.close()?;
        Ok(())
    }

    fn wait_for_spacing(&self) {
        if let Some(last) = self.last_operation {
            let elapsed = last.elapsed();
            if elapsed < self.timing.command_spacing {
                thread::sleep(self.timing.command_spacing - elapsed);
            }
        }
    }

    fn get_until_prompt(&mut self) -> Result<String> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 64];
        let start = time::Instant::now();

        loop {
            let len = self.device.read(&mut chunk)?;
            if len > 0 {
                trace!(
                    "get_until_prompt: values {:?}",
                    String::from_utf8_lossy(&chunk[..len])
                );
                buf.extend(chunk[..len].iter().filter(|&&b| b != b'\0'));

                if let Some(end) = buf.iter().position(|&b| b == PROMPT) {
                    buf.truncate(end);
                    return Ok(String::from_utf8_lossy(&buf).into_owned());
                }
            }

            if start.elapsed() >= self.timing.receive_timeout {
                let partial = String::from_utf8_lossy(&buf).into_owned();
                let context = if partial.to_ascii_uppercase().contains(SEARCHING) {
                    "searching for protocol"
                } else {
                    "waiting for prompt"
                };
                return Err(Error::Timeout { context, partial });
            }

            if len == 0 {
                thread::sleep(POLL_INTERVAL);
            }
        }
    }
}

/// Normalize raw adapter output: upper-case, drop line terminators and the prompt, trim
pub fn clean_response(raw: &str) -> String {
    raw.to_ascii_uppercase()
        .chars()
        .filter(|c| !matches!(c, '\r' | '\n' | '>'))
        .collect::<String>()
        .trim()
        .to_owned()
}

fn strip_echo(response: String, cmd: &str) -> String {
    match response.strip_prefix(cmd) {
        Some(rest) if !cmd.is_empty() => rest.trim_start().to_owned(),
        _ => response,
    }
}
