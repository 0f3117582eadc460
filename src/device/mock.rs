//! Scripted transports for running the protocol engine without an adapter.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use super::{Endpoint, Error, Result, Transport};

#[derive(Default)]
struct MockState {
    /// Canned replies keyed by the upper-cased command without its carriage return
    replies: HashMap<String, Vec<u8>>,
    default_reply: Vec<u8>,
    pending: VecDeque<u8>,
    written: Vec<String>,
    fail_writes: bool,
    fail_reads: bool,
    purges: usize,
    closes: usize,
}

/// Mock transport with per-command replies and write recording
///
/// Clones share state, so a test can keep a handle after moving one into a framer.
#[derive(Clone)]
pub(crate) struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Unknown commands are answered like the ELM327 does: `?`
    pub fn new() -> Self {
        let state = MockState {
            default_reply: b"?\r\r>".to_vec(),
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn with_reply(self, cmd: &str, reply: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .replies
            .insert(cmd.to_ascii_uppercase(), reply.as_bytes().to_vec());
        self
    }

    pub fn with_default_reply(self, reply: &str) -> Self {
        self.state.lock().unwrap().default_reply = reply.as_bytes().to_vec();
        self
    }

    pub fn failing_writes(self) -> Self {
        self.state.lock().unwrap().fail_writes = true;
        self
    }

    pub fn failing_reads(self) -> Self {
        self.state.lock().unwrap().fail_reads = true;
        self
    }

    pub fn written(&self) -> Vec<String> {
        self.state.lock().unwrap().written.clone()
    }

    pub fn purge_count(&self) -> usize {
        self.state.lock().unwrap().purges
    }

    pub fn close_count(&self) -> usize {
        self.state.lock().unwrap().closes
    }
}

impl Transport for MockTransport {
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(Error::Communication("write refused".to_owned()));
        }

        let text = String::from_utf8_lossy(data).into_owned();
        let cmd = text.trim().to_ascii_uppercase();
        state.written.push(text);

        let reply = state
            .replies
            .get(&cmd)
            .cloned()
            .unwrap_or_else(|| state.default_reply.clone());
        state.pending.extend(reply);
        Ok(())
    }

    fn read(&mut self, data: &mut [u8]) -> Result<usize> {
        let mut state = self.state.lock().unwrap();
        if state.fail_reads {
            return Err(Error::Communication("read refused".to_owned()));
        }

        let len = data.len().min(state.pending.len());
        for (slot, b) in data.iter_mut().zip(state.pending.drain(..len)) {
            *slot = b;
        }
        Ok(len)
    }

    fn purge_buffers(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.pending.clear();
        state.purges += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.state.lock().unwrap().closes += 1;
        Ok(())
    }
}

/// Mock endpoint that opens only at the listed baud rates
pub(crate) struct MockEndpoint {
    name: String,
    baud_rates: Vec<u32>,
    transport: MockTransport,
}

impl MockEndpoint {
    pub fn new(name: &str, baud_rates: &[u32], transport: MockTransport) -> Self {
        Self {
            name: name.to_owned(),
            baud_rates: baud_rates.to_vec(),
            transport,
        }
    }

    /// Adapter that answers the identification probe with `reply`
    pub fn answering(name: &str, reply: &str) -> Self {
        Self::new(
            name,
            &super::DEFAULT_BAUD_RATES,
            MockTransport::new().with_reply("ATI", reply),
        )
    }

    pub fn transport(&self) -> MockTransport {
        self.transport.clone()
    }
}

impl Endpoint for MockEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self, baud_rate: u32) -> Result<Box<dyn Transport>> {
        if self.baud_rates.contains(&baud_rate) {
            Ok(Box::new(self.transport.clone()))
        } else {
            Err(Error::Communication(format!(
                "{} cannot open at {} baud",
                self.name, baud_rate
            )))
        }
    }
}
