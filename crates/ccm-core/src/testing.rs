//! Test doubles shared by the unit tests

use core::future::poll_fn;
use core::task::Poll;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::string::String;
use std::vec::Vec;

use atat::AtatCmd;
use embedded_hal_async::delay::DelayNs;
use embedded_io_async::{ErrorKind, ErrorType, Read, Write};
// Links the host time driver that atat's timeouts run on
use embassy_time as _;

use crate::client::{AtClient, REPLY_CAPACITY, Reply};
use crate::command::{CONNECTED_REPLY, CcmCommand, Connect};
use crate::error::CcmError;

pub use embassy_futures::block_on;

/// Everything the code under test did, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Sent {
        text: String,
        timeout_ms: u32,
        expected: Option<&'static str>,
    },
    WifiCheck,
    AwsCheck,
    Delay(u32),
}

pub type EventLog = Rc<RefCell<Vec<Event>>>;

pub fn new_log() -> EventLog {
    Rc::new(RefCell::new(Vec::new()))
}

/// Command lines sent so far, terminators stripped
pub fn sent_commands(log: &EventLog) -> Vec<String> {
    log.borrow()
        .iter()
        .filter_map(|event| match event {
            Event::Sent { text, .. } => Some(text.trim_end().into()),
            _ => None,
        })
        .collect()
}

/// Status answers that repeat their last entry once the script runs out
struct Script {
    queue: VecDeque<Result<bool, CcmError>>,
    last: Result<bool, CcmError>,
}

impl Script {
    fn constant(value: bool) -> Self {
        Self {
            queue: VecDeque::new(),
            last: Ok(value),
        }
    }

    fn of(values: &[bool]) -> Self {
        Self {
            queue: values.iter().copied().map(Ok).collect(),
            last: Ok(values.last().copied().unwrap_or(false)),
        }
    }

    fn next(&mut self) -> Result<bool, CcmError> {
        self.queue.pop_front().unwrap_or(self.last)
    }
}

/// [`AtClient`] that records every call and answers from a script.
///
/// Unchecked commands get `OK`, `AT+CONNECT` gets the connected token
/// unless [`ScriptedClient::connect_replies`] says otherwise.
pub struct ScriptedClient {
    log: EventLog,
    wifi: Script,
    aws: Script,
    connect: VecDeque<Result<&'static str, CcmError>>,
    failures: Vec<(&'static str, CcmError)>,
    replies: Vec<(&'static str, &'static str)>,
}

impl ScriptedClient {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            wifi: Script::constant(false),
            aws: Script::constant(false),
            connect: VecDeque::new(),
            failures: Vec::new(),
            replies: Vec::new(),
        }
    }

    pub fn wifi(mut self, values: &[bool]) -> Self {
        self.wifi = Script::of(values);
        self
    }

    pub fn wifi_error(mut self, err: CcmError) -> Self {
        self.wifi.last = Err(err);
        self
    }

    pub fn aws(mut self, values: &[bool]) -> Self {
        self.aws = Script::of(values);
        self
    }

    pub fn connect_replies(mut self, replies: &[Result<&'static str, CcmError>]) -> Self {
        self.connect = replies.iter().copied().collect();
        self
    }

    /// Answer every command with `label` with `line`.
    pub fn replying(mut self, label: &'static str, line: &'static str) -> Self {
        self.replies.push((label, line));
        self
    }

    /// Make every command with `label` fail with `err`.
    pub fn failing(mut self, label: &'static str, err: CcmError) -> Self {
        self.failures.push((label, err));
        self
    }
}

impl AtClient for ScriptedClient {
    async fn send<C: CcmCommand>(&mut self, command: &C) -> Result<Reply, CcmError> {
        let mut buf = vec![0u8; C::MAX_LEN];
        let len = command.write(&mut buf);
        self.log.borrow_mut().push(Event::Sent {
            text: String::from_utf8_lossy(&buf[..len]).into_owned(),
            timeout_ms: C::MAX_TIMEOUT_MS,
            expected: C::EXPECTED,
        });

        if let Some((_, err)) = self.failures.iter().find(|(l, _)| *l == C::LABEL) {
            return Err(*err);
        }

        let line = if C::LABEL == Connect::LABEL {
            self.connect.pop_front().unwrap_or(Ok(CONNECTED_REPLY))?
        } else if let Some((_, line)) = self.replies.iter().find(|(l, _)| *l == C::LABEL) {
            *line
        } else {
            "OK\r\n"
        };

        let line = heapless::String::<REPLY_CAPACITY>::try_from(line)
            .map_err(|_| CcmError::InvalidReply)?;
        Ok(Reply::new(line, C::EXPECTED))
    }

    async fn is_wifi_connected(&mut self) -> Result<bool, CcmError> {
        self.log.borrow_mut().push(Event::WifiCheck);
        self.wifi.next()
    }

    async fn is_aws_connected(&mut self) -> Result<bool, CcmError> {
        self.log.borrow_mut().push(Event::AwsCheck);
        self.aws.next()
    }
}

/// [`DelayNs`] that returns immediately, optionally logging each sleep.
#[derive(Default)]
pub struct InstantDelay {
    log: Option<EventLog>,
    total_ms: u64,
}

impl InstantDelay {
    pub fn recording(log: EventLog) -> Self {
        Self {
            log: Some(log),
            total_ms: 0,
        }
    }

    pub fn total_ms(&self) -> u64 {
        self.total_ms
    }

    fn record(&mut self, ms: u32) {
        self.total_ms += u64::from(ms);
        if let Some(log) = &self.log {
            log.borrow_mut().push(Event::Delay(ms));
        }
    }
}

impl DelayNs for InstantDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.record(ns / 1_000_000);
    }

    async fn delay_us(&mut self, us: u32) {
        self.record(us / 1_000);
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.record(ms);
    }
}

/// In-memory serial link with a scripted module on the far end.
///
/// Every command line written releases the next scripted reply into the
/// receive side; [`FakeLink::silent`] scripts no reply at all. Reads pend
/// while nothing is buffered. Clones share the same link.
#[derive(Clone, Default)]
pub struct FakeLink {
    state: Rc<RefCell<LinkState>>,
}

#[derive(Default)]
struct LinkState {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    replies: VecDeque<Option<String>>,
    broken: bool,
}

impl FakeLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the next command with `text`.
    pub fn reply(self, text: &str) -> Self {
        self.state.borrow_mut().replies.push_back(Some(text.into()));
        self
    }

    /// Leave the next command unanswered.
    pub fn silent(self) -> Self {
        self.state.borrow_mut().replies.push_back(None);
        self
    }

    /// Fail every write.
    pub fn broken(self) -> Self {
        self.state.borrow_mut().broken = true;
        self
    }

    /// Bytes the module sends without being asked.
    pub fn inject(&self, text: &str) {
        self.state.borrow_mut().rx.extend(text.bytes());
    }

    pub fn written(&self) -> String {
        String::from_utf8_lossy(&self.state.borrow().tx).into_owned()
    }

    pub fn split(&self) -> (FakeRx, FakeTx) {
        (
            FakeRx {
                state: self.state.clone(),
            },
            FakeTx {
                state: self.state.clone(),
            },
        )
    }
}

pub struct FakeRx {
    state: Rc<RefCell<LinkState>>,
}

pub struct FakeTx {
    state: Rc<RefCell<LinkState>>,
}

impl ErrorType for FakeRx {
    type Error = ErrorKind;
}

impl ErrorType for FakeTx {
    type Error = ErrorKind;
}

impl Read for FakeRx {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        poll_fn(|_| {
            let mut state = self.state.borrow_mut();
            if state.rx.is_empty() {
                return Poll::Pending;
            }

            let n = buf.len().min(state.rx.len());
            for (slot, byte) in buf.iter_mut().zip(state.rx.drain(..n)) {
                *slot = byte;
            }
            Poll::Ready(Ok(n))
        })
        .await
    }
}

impl Write for FakeTx {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let mut state = self.state.borrow_mut();
        if state.broken {
            return Err(ErrorKind::BrokenPipe);
        }

        for &byte in buf {
            state.tx.push(byte);
            if byte == b'\n' {
                if let Some(Some(reply)) = state.replies.pop_front() {
                    state.rx.extend(reply.bytes());
                }
            }
        }
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
