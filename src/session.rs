//! The polling loop: detect once, then query the supported PIDs round after round, checking the
//! stored trouble codes whenever the check interval has elapsed

use log::{debug, error, info, warn};
use std::time::{Duration, Instant};

use crate::{
    commands::{
        detect_supported_pids, query_pids, receive_trouble_codes, registry, trouble_code_request,
        DtcTable, Pid, PidQueryResult, QueryFault, TroubleCode,
    },
    device::Obd2BaseDevice,
    sink::{Record, SinkWorker},
    Error, Result,
};

/// Source of time for the loop, replaceable in tests
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Wall clock time and real sleeps
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration)
    }
}

/// What the session is doing with the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Detecting,
    Polling,
    CheckingTroubleCodes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Pause after every round
    pub round_delay: Duration,
    /// Minimum time between stored trouble code checks
    pub dtc_interval: Duration,
    /// Consecutive rounds in which no request could be written before the link counts as lost
    pub dead_link_rounds: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            round_delay: Duration::from_millis(300),
            dtc_interval: Duration::from_secs(90),
            dead_link_rounds: 5,
        }
    }
}

/// The output of one polling round
#[derive(Debug, Clone, PartialEq)]
pub struct Round {
    pub readings: Vec<PidQueryResult>,
    /// Present only when a trouble code check ran in this round and succeeded
    pub trouble_codes: Option<Vec<TroubleCode>>,
}

/// Owns the framed link for its whole lifetime, so every command/response cycle is serialized
pub struct Session<D: Obd2BaseDevice, C: Clock = SystemClock> {
    device: D,
    clock: C,
    config: SessionConfig,
    table: DtcTable,
    state: State,
    supported: Vec<Pid>,
    next_dtc_check: Option<Instant>,
    dead_rounds: u32,
}

impl<D: Obd2BaseDevice> Session<D> {
    pub fn new(device: D, table: DtcTable, config: SessionConfig) -> Self {
        Session::with_clock(device, table, config, SystemClock)
    }
}

impl<D: Obd2BaseDevice, C: Clock> Session<D, C> {
    pub fn with_clock(device: D, table: DtcTable, config: SessionConfig, clock: C) -> Self {
        Session {
            device,
            clock,
            config,
            table,
            state: State::Idle,
            supported: Vec::new(),
            next_dtc_check: None,
            dead_rounds: 0,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// The PIDs found by [detect](Self::detect), in registry order
    pub fn supported(&self) -> &[Pid] {
        &self.supported
    }

    /// Probe the whole registry and remember which PIDs the vehicle answers
    pub fn detect(&mut self) -> &[Pid] {
        self.state = State::Detecting;
        info!("Detecting supported PIDs");
        self.supported = detect_supported_pids(&mut self.device, registry::all());
        self.state = State::Polling;
        &self.supported
    }

    /// Run one round: query every supported PID, then check trouble codes if they are due
    ///
    /// Detects first if that has not happened yet. Whether the check is due is decided before the
    /// round starts; a failed check is logged and retried after another full interval. Fails
    /// with [Error::LinkLost] once `dead_link_rounds` rounds in a row could not write a single
    /// request, the trouble code request included. A round that sends nothing does not count.
    pub fn poll_round(&mut self) -> Result<Round> {
        if self.state == State::Idle {
            self.detect();
        }

        let check_due = self
            .next_dtc_check
            .map_or(true, |at| self.clock.now() >= at);

        self.state = State::Polling;
        let readings = query_pids(&mut self.device, &self.supported);
        let mut attempted = readings.len();
        let mut written = readings
            .iter()
            .filter(|r| !matches!(r.fault(), Some(QueryFault::Write(_))))
            .count();

        let trouble_codes = if check_due {
            let (codes, sent) = self.check_trouble_codes();
            attempted += 1;
            written += usize::from(sent);
            codes
        } else {
            None
        };
        self.track_link(attempted, written)?;

        self.clock.sleep(self.config.round_delay);
        Ok(Round {
            readings,
            trouble_codes,
        })
    }

    /// Poll until `max_rounds` rounds have run (forever if `None`), handing each round's results
    /// to every sink
    pub fn run(&mut self, sinks: &[SinkWorker], max_rounds: Option<u64>) -> Result<()> {
        if self.state == State::Idle {
            self.detect();
        }
        if self.supported.is_empty() {
            warn!("No supported PIDs detected; only trouble codes will be read");
        }

        let mut rounds = 0u64;
        while max_rounds.map_or(true, |max| rounds < max) {
            let round = self.poll_round()?;
            rounds += 1;
            debug!("Round {} produced {} readings", rounds, round.readings.len());

            for sink in sinks {
                sink.submit(Record::Readings(round.readings.clone()));
                if let Some(codes) = round.trouble_codes.as_ref().filter(|c| !c.is_empty()) {
                    sink.submit(Record::TroubleCodes(codes.clone()));
                }
            }
        }
        Ok(())
    }

    /// Give the link back, e.g. to shut the adapter down
    pub fn into_device(self) -> D {
        self.device
    }

    /// The codes if the check succeeded, and whether the request was written at all
    fn check_trouble_codes(&mut self) -> (Option<Vec<TroubleCode>>, bool) {
        self.state = State::CheckingTroubleCodes;
        let sent = self.device.send(&trouble_code_request());
        let written = sent.is_ok();
        let result = sent.and_then(|()| receive_trouble_codes(&mut self.device, &self.table));
        self.next_dtc_check = Some(self.clock.now() + self.config.dtc_interval);
        self.state = State::Polling;

        let codes = match result {
            Ok(codes) => {
                if codes.is_empty() {
                    info!("No stored trouble codes");
                }
                for code in &codes {
                    warn!("Trouble code {}: {}", code.code, code.description);
                }
                Some(codes)
            }
            Err(e) => {
                warn!("Reading trouble codes failed: {}", e);
                None
            }
        };
        (codes, written)
    }

    fn track_link(&mut self, attempted: usize, written: usize) -> Result<()> {
        if attempted == 0 {
            return Ok(());
        }
        if written > 0 {
            self.dead_rounds = 0;
            return Ok(());
        }

        self.dead_rounds += 1;
        warn!(
            "No request could be written this round ({} of {})",
            self.dead_rounds, self.config.dead_link_rounds
        );
        if self.dead_rounds >= self.config.dead_link_rounds {
            error!("Link to the adapter lost");
            return Err(Error::LinkLost(self.dead_rounds));
        }
        Ok(())
    }
}
