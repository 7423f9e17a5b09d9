//! ESP32-S3 specific modules for ccm-hello
//!
//! This crate contains the code that cannot compile on desktop targets:
//! the UART wiring to the CCM and the settings baked in at build time.

#![no_std]

pub mod board;
pub mod secrets;
