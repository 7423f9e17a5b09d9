//! In-memory stand-in for the CCM
//!
//! Parses the command lines the host writes and queues the replies a real
//! module would send back. Just enough state is tracked to walk every
//! branch of the onboarding sequence: Wi-Fi association, app pairing,
//! the cloud session and the cloud-sync redirect.

use core::convert::Infallible;
use core::future::poll_fn;
use core::task::Poll;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::str::FromStr;

use embedded_io_async::{ErrorType, Read, Write};
use log::{debug, info};

const THING_NAME: &str = "ccm-sim-0001";

const CERTIFICATE: &str = "-----BEGIN CERTIFICATE-----\r\n\
MIIBszCCAVmgAwIBAgIUsimulatedccmhelloworld0001\r\n\
MAoGCCqGSM49BAMCMBQxEjAQBgNVBAMMCWNjbS1zaW0wHhcN\r\n\
-----END CERTIFICATE-----";

/// Starting state of the simulated module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scenario {
    /// Out of the box: no Wi-Fi, no cloud session
    #[default]
    Fresh,
    /// Wi-Fi associated from a previous run, cloud not connected
    WifiReady,
    /// Already connected to the cloud
    Provisioned,
    /// Rejects the first `AT+CONNECT` with an error reply
    FlakyConnect,
    /// Rejects every `AT+CONNECT`
    RejectsConnect,
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "fresh" => Ok(Self::Fresh),
            "wifi-ready" => Ok(Self::WifiReady),
            "provisioned" => Ok(Self::Provisioned),
            "flaky-connect" => Ok(Self::FlakyConnect),
            "rejects-connect" => Ok(Self::RejectsConnect),
            other => Err(format!("unknown scenario `{other}`")),
        }
    }
}

/// Simulated module behind a split serial link.
///
/// Clones share one module, so a handle kept by the caller can inspect it
/// after the link halves have been handed to the client.
#[derive(Clone)]
pub struct SimulatedModule {
    state: Rc<RefCell<ModuleState>>,
}

impl SimulatedModule {
    /// Polls the app pairing and the redirect each take to complete
    pub const SETTLE_POLLS: u32 = 3;

    pub fn new(scenario: Scenario) -> Self {
        Self {
            state: Rc::new(RefCell::new(ModuleState::new(scenario))),
        }
    }

    /// Receive and transmit halves, as seen from the host.
    pub fn serial(&self) -> (ModuleRx, ModuleTx) {
        (
            ModuleRx {
                state: self.state.clone(),
            },
            ModuleTx {
                state: self.state.clone(),
            },
        )
    }

    /// Messages published so far as `(topic, payload)`
    pub fn published(&self) -> Vec<(String, String)> {
        self.state.borrow().published.clone()
    }

    pub fn is_cloud_connected(&self) -> bool {
        self.state.borrow().cloud_connected
    }
}

struct ModuleState {
    wifi_connected: bool,
    cloud_connected: bool,
    ssid: Option<String>,
    endpoint: String,
    topic: Option<String>,
    /// PING checks left until app pairing finishes, when pairing
    pairing_polls: Option<u32>,
    /// `AT+CONNECT?` checks left until the redirect lands, when syncing
    redirect_polls: Option<u32>,
    /// `AT+CONNECT` attempts still to reject; `None` rejects forever
    rejections: Option<u32>,
    published: Vec<(String, String)>,
    line: Vec<u8>,
    rx: VecDeque<u8>,
}

impl ModuleState {
    fn new(scenario: Scenario) -> Self {
        let mut module = Self {
            wifi_connected: false,
            cloud_connected: false,
            ssid: None,
            endpoint: String::new(),
            topic: None,
            pairing_polls: None,
            redirect_polls: None,
            rejections: Some(0),
            published: Vec::new(),
            line: Vec::new(),
            rx: VecDeque::new(),
        };

        match scenario {
            Scenario::Fresh => {}
            Scenario::WifiReady => module.wifi_connected = true,
            Scenario::Provisioned => {
                module.wifi_connected = true;
                module.cloud_connected = true;
            }
            Scenario::FlakyConnect => module.rejections = Some(1),
            Scenario::RejectsConnect => module.rejections = None,
        }

        module
    }

    fn reply(&mut self, text: &str) {
        debug!("[module] {}", text);
        self.rx.extend(text.bytes());
        self.rx.extend(b"\r\n");
    }

    fn handle_line(&mut self, line: &str) {
        let line = line.trim_end_matches('\r');

        if let Some(value) = line.strip_prefix("AT+CONF SSID=") {
            self.ssid = Some(value.to_owned());
            self.reply("OK");
        } else if line.starts_with("AT+CONF Passphrase=") {
            self.reply("OK");
        } else if let Some(value) = line.strip_prefix("AT+CONF Endpoint=") {
            self.endpoint = value.to_owned();
            self.reply("OK");
        } else if let Some(value) = line.strip_prefix("AT+CONF Topic1=") {
            self.topic = Some(value.to_owned());
            self.reply("OK");
        } else if line == "AT+CONF? ThingName" {
            self.reply(&format!("OK {THING_NAME}"));
        } else if line == "AT+CONF? Certificate pem" {
            self.reply(&format!("OK {CERTIFICATE}"));
        } else if line == "AT+DISCONNECT" {
            self.wifi_connected = false;
            self.cloud_connected = false;
            self.reply("OK");
        } else if line == "AT+CONFMODE" {
            self.pairing_polls = Some(SimulatedModule::SETTLE_POLLS);
            info!("[module] waiting for the companion app to pair");
            self.reply("OK CONFMODE");
        } else if line == "AT+CONNECT" {
            self.connect();
        } else if line == "AT+CONNECT?" {
            self.connect_status();
        } else if line.starts_with("AT+DIAG PING ") {
            self.ping();
        } else if line == "AT+CLOUD_SYNC" {
            self.redirect_polls = Some(SimulatedModule::SETTLE_POLLS);
            self.reply("OK");
        } else if let Some(payload) = line.strip_prefix("AT+SEND1 ") {
            self.send(payload);
        } else {
            self.reply("ERR3 INVALID COMMAND");
        }
    }

    fn connect(&mut self) {
        match self.rejections {
            None => return self.reply("ERR14 INVALID ENDPOINT"),
            Some(n) if n > 0 => {
                self.rejections = Some(n - 1);
                return self.reply("ERR14 INVALID ENDPOINT");
            }
            Some(_) => {}
        }

        if !self.wifi_connected && self.ssid.is_some() {
            self.wifi_connected = true;
        }

        if self.wifi_connected {
            self.cloud_connected = true;
            self.reply("OK 1 CONNECTED");
        } else {
            self.reply("ERR10 NO WIFI");
        }
    }

    fn connect_status(&mut self) {
        if let Some(left) = self.redirect_polls {
            if left == 0 {
                self.redirect_polls = None;
                self.cloud_connected = true;
                info!("[module] redirected to the final endpoint");
            } else {
                self.redirect_polls = Some(left - 1);
                self.cloud_connected = false;
            }
        }

        if self.cloud_connected {
            self.reply("OK 1 CONNECTED");
        } else {
            self.reply("OK 0 DISCONNECTED");
        }
    }

    fn ping(&mut self) {
        if let Some(left) = self.pairing_polls {
            if left == 0 {
                self.pairing_polls = None;
                self.wifi_connected = true;
                info!("[module] companion app paired");
            } else {
                self.pairing_polls = Some(left - 1);
            }
        }

        if self.wifi_connected {
            self.reply("OK 12");
        } else {
            self.reply("ERR12 NETWORK UNREACHABLE");
        }
    }

    fn send(&mut self, payload: &str) {
        match (&self.topic, self.cloud_connected) {
            (Some(topic), true) => {
                info!("[module] published {:?} to {}", payload, topic);
                self.published.push((topic.clone(), payload.to_owned()));
                self.reply("OK");
            }
            (None, _) => self.reply("ERR8 TOPIC NOT CONFIGURED"),
            (_, false) => self.reply("ERR9 NOT CONNECTED"),
        }
    }
}

/// Bytes the module sends to the host
pub struct ModuleRx {
    state: Rc<RefCell<ModuleState>>,
}

/// Bytes the host sends to the module
pub struct ModuleTx {
    state: Rc<RefCell<ModuleState>>,
}

impl ErrorType for ModuleRx {
    type Error = Infallible;
}

impl ErrorType for ModuleTx {
    type Error = Infallible;
}

impl Read for ModuleRx {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        // Pends while nothing is queued, like a module that has not answered
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

impl Write for ModuleTx {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let mut state = self.state.borrow_mut();
        for &byte in buf {
            if byte == b'\n' {
                let line = String::from_utf8_lossy(&state.line).into_owned();
                state.line.clear();
                state.handle_line(&line);
            } else {
                state.line.push(byte);
            }
        }
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
