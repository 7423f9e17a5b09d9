//! Hardware-independent core library for ccm-hello
//!
//! This crate holds everything needed to drive an AIROC CCM (connectivity
//! co-module) through its AT command set: the command catalogue, the
//! `atat`-based client with its reply digester, bounded status polling,
//! the connect error policy and the onboarding-and-publish sequencer.
//!
//! It is `no_std` and allocation-free so it compiles for the ESP32-S3
//! firmware as well as for the desktop simulator and host tests.

#![cfg_attr(not(test), no_std)]

pub mod client;
pub mod command;
pub mod config;
pub mod digest;
pub mod error;
pub mod handler;
pub mod sequencer;
pub mod wait;

#[cfg(test)]
mod testing;

pub use atat;
pub use client::{AtClient, AtResources, Reply, ReplyIngress, SerialAtClient, Status};
pub use command::CcmCommand;
pub use config::{CcmConfig, CloudFlow, WifiOnboarding};
pub use error::{CcmError, ModuleError};
pub use handler::{ConnectFailure, ErrorDecision, ErrorHandler};
pub use sequencer::{RunReport, Sequencer};
pub use wait::{CancelSignal, CancelToken};
