//! Command/status interface to the module and its serial implementation
//!
//! [`AtClient`] is the seam the sequencer talks through. [`SerialAtClient`]
//! implements it on top of an `atat` client, so the same code drives the
//! ESP32-S3 UART and the simulator's in-memory link.
//!
//! The serial side is split the way `atat` wants it: [`AtResources`] holds
//! the buffers and the response slot, [`ReplyIngress`] owns the receive
//! half and feeds [`ReplyDigester`], and [`SerialAtClient`] owns the
//! transmit half. The ingress has to be polled while commands are in
//! flight; [`ReplyIngress::run_with`] does that for one future.

use atat::asynch::{AtatClient, Client};
use atat::{AtatIngress, Config, Ingress, InternalError, ResponseSlot, UrcChannel};
use embassy_futures::select::{Either, select};
use embassy_futures::yield_now;
use embedded_io_async::{Read, Write};
use log::{debug, warn};

use crate::command::{COMMAND_CAPACITY, CcmCommand, ConnectStatus, Ping};
use crate::config::Host;
use crate::digest::{NoUrc, ReplyDigester};
use crate::error::{CcmError, ModuleError};

/// Capacity of one reply, sized for a PEM certificate
pub const REPLY_CAPACITY: usize = 2048;

/// Receive buffer of the ingress: one full reply plus whatever follows it
pub const INGRESS_CAPACITY: usize = 2 * REPLY_CAPACITY;

/// How a reply compared against the command's expected prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The reply started with the expected prefix
    Success,
    /// The reply arrived but was an `ERR` report or started differently
    Failure,
    /// The command had no expected prefix; the caller decides
    Unchecked,
}

/// One reply from the module, line terminators included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    status: Status,
    line: heapless::String<REPLY_CAPACITY>,
}

impl atat::AtatResp for Reply {}

impl Reply {
    /// Classify `line` against an optional expected prefix.
    ///
    /// An `ERR<n>` report never counts as success, whatever text follows
    /// the code.
    pub fn new(line: heapless::String<REPLY_CAPACITY>, expected: Option<&str>) -> Self {
        let status = match expected {
            None => Status::Unchecked,
            Some(_) if ModuleError::parse(&line).is_some() => Status::Failure,
            Some(token) if line.trim_start().starts_with(token) => Status::Success,
            Some(_) => Status::Failure,
        };

        Self { status, line }
    }

    /// Build a reply from what the digester handed to the response slot.
    pub fn from_response(
        resp: Result<&[u8], InternalError>,
        expected: Option<&str>,
    ) -> Result<Self, atat::Error> {
        let bytes = resp.map_err(|_| atat::Error::InvalidResponse)?;
        let text = core::str::from_utf8(bytes).map_err(|_| atat::Error::Parse)?;
        let line = heapless::String::try_from(text).map_err(|_| atat::Error::Parse)?;

        Ok(Self::new(line, expected))
    }

    pub const fn status(&self) -> Status {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    pub fn as_str(&self) -> &str {
        &self.line
    }

    /// Reply text without the final line terminator
    pub fn text(&self) -> &str {
        self.line.trim_end_matches(['\r', '\n'])
    }

    /// The module's `ERR<code>` report, if this is one
    pub fn module_error(&self) -> Option<ModuleError<'_>> {
        ModuleError::parse(&self.line)
    }
}

/// The command/status API the onboarding sequence relies on.
pub trait AtClient {
    /// Send one command and wait for its reply.
    ///
    /// Returns [`CcmError::Timeout`] when nothing arrives within the
    /// command's timeout. A reply that misses the expected prefix is not an
    /// error: it comes back with [`Status::Failure`].
    fn send<C: CcmCommand>(&mut self, command: &C)
    -> impl Future<Output = Result<Reply, CcmError>>;

    /// Point-in-time Wi-Fi status.
    fn is_wifi_connected(&mut self) -> impl Future<Output = Result<bool, CcmError>>;

    /// Point-in-time cloud (MQTT) status.
    fn is_aws_connected(&mut self) -> impl Future<Output = Result<bool, CcmError>>;
}

/// Buffers and the response slot shared by [`ReplyIngress`] and
/// [`SerialAtClient`].
///
/// Large enough that the firmware keeps it in a `StaticCell` rather than
/// on the task stack.
pub struct AtResources {
    res_slot: ResponseSlot<REPLY_CAPACITY>,
    urc_channel: UrcChannel<NoUrc, 1, 1>,
    ingress_buf: [u8; INGRESS_CAPACITY],
    cmd_buf: [u8; COMMAND_CAPACITY],
}

impl Default for AtResources {
    fn default() -> Self {
        Self::new()
    }
}

impl AtResources {
    pub fn new() -> Self {
        Self {
            res_slot: ResponseSlot::new(),
            urc_channel: UrcChannel::new(),
            ingress_buf: [0; INGRESS_CAPACITY],
            cmd_buf: [0; COMMAND_CAPACITY],
        }
    }

    /// Wire the two halves of a serial link to the module.
    ///
    /// `ping_host` is the target of the Wi-Fi status check.
    pub fn split<R, W>(
        &mut self,
        reader: R,
        writer: W,
        ping_host: Host,
    ) -> (ReplyIngress<'_, R>, SerialAtClient<'_, W>)
    where
        R: Read,
        W: Write,
    {
        let Self {
            res_slot,
            urc_channel,
            ingress_buf,
            cmd_buf,
        } = self;
        let res_slot: &ResponseSlot<REPLY_CAPACITY> = res_slot;

        let ingress = ReplyIngress {
            reader,
            buf: ingress_buf,
            res_slot,
            urc_channel,
        };
        let client = SerialAtClient {
            client: Client::new(writer, res_slot, cmd_buf, Config::default()),
            ping_host,
        };

        (ingress, client)
    }
}

/// Receive half of the link: reads bytes and digests them into replies.
pub struct ReplyIngress<'a, R> {
    reader: R,
    buf: &'a mut [u8; INGRESS_CAPACITY],
    res_slot: &'a ResponseSlot<REPLY_CAPACITY>,
    urc_channel: &'a UrcChannel<NoUrc, 1, 1>,
}

impl<'a, R: Read> ReplyIngress<'a, R> {
    /// Digest incoming bytes forever.
    pub async fn run(self) -> ! {
        let mut ingress = Ingress::new(
            ReplyDigester::new(),
            self.buf,
            self.res_slot,
            self.urc_channel,
        );
        ingress.read_from(self.reader).await
    }

    /// Run `fut` to completion while digesting replies for it.
    pub async fn run_with<F: Future>(self, fut: F) -> F::Output {
        match select(self.run(), fut).await {
            Either::First(never) => never,
            Either::Second(output) => output,
        }
    }
}

/// [`AtClient`] over the transmit half of a serial link.
pub struct SerialAtClient<'a, W: Write> {
    client: Client<'a, W, REPLY_CAPACITY>,
    ping_host: Host,
}

impl<W: Write> SerialAtClient<'_, W> {
    /// Send a status check and report whether its prefix matched.
    ///
    /// A check that times out counts as "not connected" so that polling
    /// keeps going; link failures still propagate.
    async fn check<C: CcmCommand>(&mut self, command: &C) -> Result<bool, CcmError> {
        match self.send(command).await {
            Ok(reply) => Ok(reply.is_success()),
            Err(CcmError::Timeout { command: label }) => {
                debug!("{} timed out, treating as disconnected", label);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

impl<W: Write> AtClient for SerialAtClient<'_, W> {
    async fn send<C: CcmCommand>(&mut self, command: &C) -> Result<Reply, CcmError> {
        // Let the ingress digest anything that arrived since the last
        // command; atat clears the response slot before writing.
        yield_now().await;

        debug!("-> {}", C::LABEL);
        let reply = self
            .client
            .send(command)
            .await
            .map_err(|e| CcmError::from_atat(e, C::LABEL))?;
        debug!("<- {}", reply.text());

        if let Some(err) = reply.module_error() {
            warn!("{} rejected by module: {}", C::LABEL, err);
        }

        Ok(reply)
    }

    async fn is_wifi_connected(&mut self) -> Result<bool, CcmError> {
        let host = self.ping_host.clone();
        self.check(&Ping { host: &host }).await
    }

    async fn is_aws_connected(&mut self) -> Result<bool, CcmError> {
        self.check(&ConnectStatus).await
    }
}
