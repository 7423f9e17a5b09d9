//! Onboarding-and-publish sequence
//!
//! Walks the module from power-up to a published "Hello World!":
//!
//! 1. Optionally drop the current Wi-Fi association (`AT+DISCONNECT`).
//! 2. Unless the module already reports a cloud session, run the selected
//!    [`CloudFlow`]:
//!    - **AwsDirect**: read the identity and certificate, set the
//!      endpoint, onboard Wi-Fi if needed, then `AT+CONNECT`.
//!    - **CloudSync**: onboard Wi-Fi if needed, `AT+CONNECT` to the
//!      staging endpoint, `AT+CLOUD_SYNC`, then wait for the redirect.
//! 3. Bind topic slot 1 and publish.
//!
//! Only `AT+CONNECT` is checked. Every other command is fire and forget:
//! a timeout or a rejected reply is logged and the sequence moves on, but
//! a dead serial link still stops it.

use embedded_hal_async::delay::DelayNs;
use log::{debug, info, warn};

use crate::client::{AtClient, Reply};
use crate::command::{self, CcmCommand};
use crate::config::{CcmConfig, CloudFlow, WifiOnboarding};
use crate::error::CcmError;
use crate::handler::{ConnectFailure, ErrorDecision, ErrorHandler};
use crate::wait::{self, CancelToken, Condition};

/// What a completed run did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub flow: CloudFlow,
    /// The module was already connected, so the connect flow was skipped
    pub already_connected: bool,
    /// Wi-Fi onboarding ran
    pub onboarded: bool,
    /// Number of `AT+CONNECT` commands sent
    pub connect_attempts: u8,
    /// `AT+SEND1` got a reply that was not an `ERR` report
    pub published: bool,
}

impl RunReport {
    const fn new(flow: CloudFlow) -> Self {
        Self {
            flow,
            already_connected: false,
            onboarded: false,
            connect_attempts: 0,
            published: false,
        }
    }
}

/// Drives one onboarding-and-publish run.
///
/// Owns the client, a delay and the connect error handler for the
/// duration of the run; get them back with [`Sequencer::into_parts`].
pub struct Sequencer<'a, C, D, H> {
    client: C,
    delay: D,
    handler: H,
    config: &'a CcmConfig,
    cancel: CancelToken<'a>,
}

impl<'a, C, D, H> Sequencer<'a, C, D, H>
where
    C: AtClient,
    D: DelayNs,
    H: ErrorHandler,
{
    pub fn new(client: C, delay: D, handler: H, config: &'a CcmConfig) -> Self {
        Self {
            client,
            delay,
            handler,
            config,
            cancel: CancelToken::never(),
        }
    }

    /// Let `cancel` abort the status waits.
    pub fn with_cancel(mut self, cancel: CancelToken<'a>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn into_parts(self) -> (C, D, H) {
        (self.client, self.delay, self.handler)
    }

    /// Run the whole sequence once.
    pub async fn run(&mut self) -> Result<RunReport, CcmError> {
        let config = self.config;
        let mut report = RunReport::new(config.flow);

        if config.modify_ssid_after_connected {
            info!("Dropping current Wi-Fi association");
            self.fire(&command::Disconnect).await?;
        }

        if self.client.is_aws_connected().await? {
            info!("Module already connected to the cloud, skipping onboarding");
            report.already_connected = true;
        } else {
            match config.flow {
                CloudFlow::AwsDirect => self.aws_direct(&mut report).await?,
                CloudFlow::CloudSync => self.cloud_sync(&mut report).await?,
            }
        }

        report.published = self.publish().await?;

        Ok(report)
    }

    async fn aws_direct(&mut self, report: &mut RunReport) -> Result<(), CcmError> {
        let config = self.config;

        if let Some(reply) = self.fire(&command::ThingName).await? {
            info!("Thing name: {}", reply.text());
        }
        if let Some(reply) = self.fire(&command::Certificate).await? {
            debug!("Device certificate: {}", reply.text());
        }

        let endpoint = config.credentials.endpoint.as_str();
        info!("Setting endpoint {}", endpoint);
        self.fire(&command::SetEndpoint { endpoint }).await?;

        self.onboard_if_needed(report).await?;
        self.connect(report).await
    }

    async fn cloud_sync(&mut self, report: &mut RunReport) -> Result<(), CcmError> {
        self.onboard_if_needed(report).await?;
        self.connect(report).await?;

        self.fire(&command::CloudSync).await?;

        info!(
            "The connection automatically switches to the new endpoint after {} seconds",
            command::MAX_CONNECT_DELAY_MS / 1000
        );
        self.delay.delay_ms(command::MAX_CONNECT_DELAY_MS).await;

        wait::wait_until(
            &mut self.client,
            &mut self.delay,
            Condition::CloudConnected,
            &self.config.cloud_wait,
            &self.cancel,
        )
        .await?;
        info!("Connected to the redirected endpoint");

        Ok(())
    }

    async fn onboard_if_needed(&mut self, report: &mut RunReport) -> Result<(), CcmError> {
        if self.client.is_wifi_connected().await? {
            info!("Wi-Fi already connected");
            return Ok(());
        }

        report.onboarded = true;
        let config = self.config;

        match config.onboarding {
            WifiOnboarding::AppAssisted => {
                self.fire(&command::EnterOnboardingMode).await?;

                info!("Open the onboarding app on your mobile device and choose your Wi-Fi SSID.");
                info!("The program continues after successfully connecting to the Wi-Fi SSID.");

                wait::wait_until(
                    &mut self.client,
                    &mut self.delay,
                    Condition::WifiConnected,
                    &config.wifi_wait,
                    &self.cancel,
                )
                .await?;
                info!("Wi-Fi connected");
            }
            WifiOnboarding::Credentials => {
                let credentials = &config.credentials;
                info!("Configuring Wi-Fi SSID {}", credentials.ssid);

                // The connect command downstream is the real check
                self.fire(&command::SetSsid {
                    ssid: &credentials.ssid,
                })
                .await?;
                self.fire(&command::SetPassphrase {
                    passphrase: &credentials.passphrase,
                })
                .await?;
            }
        }

        Ok(())
    }

    /// Send `AT+CONNECT` and apply the error policy until it succeeds,
    /// the handler says to continue, or the handler aborts.
    async fn connect(&mut self, report: &mut RunReport) -> Result<(), CcmError> {
        loop {
            report.connect_attempts = report.connect_attempts.saturating_add(1);
            info!("Connecting (attempt {})", report.connect_attempts);

            let reply = match self.client.send(&command::Connect).await {
                Ok(reply) if reply.is_success() => {
                    info!("Connected");
                    return Ok(());
                }
                Ok(reply) => Some(reply),
                Err(e) if e.is_link_error() => return Err(e),
                Err(e) => {
                    warn!("AT+CONNECT: {}", e);
                    None
                }
            };

            let failure = ConnectFailure {
                attempt: report.connect_attempts,
                reply,
            };

            match self.handler.on_connect_failure(&failure) {
                ErrorDecision::Abort => {
                    return Err(CcmError::Aborted {
                        attempts: report.connect_attempts,
                    });
                }
                ErrorDecision::Retry => continue,
                ErrorDecision::Continue => return Ok(()),
            }
        }
    }

    /// Bind the topic and publish; `Ok(false)` when the module did not
    /// confirm the send.
    async fn publish(&mut self) -> Result<bool, CcmError> {
        self.fire(&command::SetTopic).await?;

        let Some(reply) = self.fire(&command::PublishHello).await? else {
            warn!(
                "No reply to {}, message may not be published",
                command::PublishHello::LABEL
            );
            return Ok(false);
        };

        if let Some(err) = reply.module_error() {
            warn!("Publishing to topic {} failed: {}", command::TOPIC, err);
            return Ok(false);
        }

        info!(
            "Published \"{}\" to topic {}",
            command::MESSAGE,
            command::TOPIC
        );
        Ok(true)
    }

    /// Send a command whose outcome does not gate the sequence.
    async fn fire<X: CcmCommand>(&mut self, command: &X) -> Result<Option<Reply>, CcmError> {
        match self.client.send(command).await {
            Ok(reply) => Ok(Some(reply)),
            Err(e) if e.is_link_error() => Err(e),
            Err(e) => {
                warn!("{}: {}, continuing", X::LABEL, e);
                Ok(None)
            }
        }
    }
}
