//! UART link to the CCM
//!
//! The module hangs off Port C of the M5Stack CoreS3 (GPIO17 TX, GPIO18
//! RX) and talks 8N1 at 115200 baud. The port is split so the reply
//! ingress can own the receive half while the client owns the transmit
//! half.

use embedded_io_async::{ErrorKind, ErrorType, Read, Write};
use esp_hal::Async;
use esp_hal::gpio::interconnect::{PeripheralInput, PeripheralOutput};
use esp_hal::peripherals::UART1;
use esp_hal::uart::{Config, ConfigError, Uart, UartRx, UartTx};
use log::warn;
use thiserror_no_std::Error;

pub const CCM_BAUD_RATE: u32 = 115_200;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UartError {
    #[error("UART receive error")]
    Receive,
    #[error("UART transmit error")]
    Transmit,
}

impl embedded_io_async::Error for UartError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Receive => ErrorKind::InvalidData,
            Self::Transmit => ErrorKind::Other,
        }
    }
}

/// Receive half of the CCM UART.
pub struct CcmRx {
    rx: UartRx<'static, Async>,
}

/// Transmit half of the CCM UART.
pub struct CcmTx {
    tx: UartTx<'static, Async>,
}

/// Configure UART1 for the module and split it.
pub fn ccm_uart(
    uart: UART1<'static>,
    tx: impl PeripheralOutput<'static>,
    rx: impl PeripheralInput<'static>,
) -> Result<(CcmRx, CcmTx), ConfigError> {
    let config = Config::default().with_baudrate(CCM_BAUD_RATE);
    let (rx, tx) = Uart::new(uart, config)?
        .with_tx(tx)
        .with_rx(rx)
        .into_async()
        .split();

    Ok((CcmRx { rx }, CcmTx { tx }))
}

impl ErrorType for CcmRx {
    type Error = UartError;
}

impl ErrorType for CcmTx {
    type Error = UartError;
}

impl Read for CcmRx {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.rx.read_async(buf).await.map_err(|e| {
            warn!("UART rx: {:?}", e);
            UartError::Receive
        })
    }
}

impl Write for CcmTx {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.tx.write_async(buf).await.map_err(|e| {
            warn!("UART tx: {:?}", e);
            UartError::Transmit
        })
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        self.tx.flush_async().await.map_err(|e| {
            warn!("UART flush: {:?}", e);
            UartError::Transmit
        })
    }
}
