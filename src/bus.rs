//! Routes physical addresses to RAM or an MMIO device; raises faults for
//! anything else. Widths are always one of {8, 16, 32} bits.

use std::io::Write;

use thiserror::Error;

use crate::memory::Memory;
use crate::mmio::{
    Clock, RxFifo, UartTx, MMIO_CLOCK_NSEC, MMIO_CLOCK_SEC, MMIO_CONSOLE_UART_RX,
    MMIO_CONSOLE_UART_RX_STATUS, MMIO_CONSOLE_UART_TX, MMIO_DEBUG_UART_TX, MMIO_TIMER_MS,
};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BusFault {
    #[error("load access fault at {0:#010x}")]
    LoadAccessFault(u32),
    #[error("store access fault at {0:#010x}")]
    StoreAccessFault(u32),
    #[error("load address misaligned at {0:#010x}")]
    LoadMisaligned(u32),
    #[error("store address misaligned at {0:#010x}")]
    StoreMisaligned(u32),
}

pub struct Bus {
    pub memory: Memory,
    debug_uart: UartTx<Box<dyn Write + Send>>,
    console_uart_tx: UartTx<Box<dyn Write + Send>>,
    pub rx_fifo: RxFifo,
    clock: Clock,
}

fn width_bytes(width: u32) -> u32 {
    width / 8
}

impl Bus {
    pub fn new(
        memory: Memory,
        debug_out: Box<dyn Write + Send>,
        console_out: Box<dyn Write + Send>,
        rx_fifo: RxFifo,
    ) -> Self {
        Self {
            memory,
            debug_uart: UartTx::new(debug_out),
            console_uart_tx: UartTx::new(console_out),
            rx_fifo,
            clock: Clock::new(),
        }
    }

    /// Advances time-dependent device state. Currently a no-op: the clock and
    /// timer are sampled lazily on read.
    pub fn tick(&mut self) {}

    pub fn load(&mut self, addr: u32, width: u32) -> Result<u32, BusFault> {
        let wb = width_bytes(width);
        if wb != 1 && addr % wb != 0 {
            return Err(BusFault::LoadMisaligned(addr));
        }
        if self.memory.contains_range(addr, wb) {
            return Ok(self.memory.read(addr, wb));
        }
        match (addr, width) {
            (MMIO_TIMER_MS, 32) => Ok(self.clock.millis_since_start()),
            (MMIO_CLOCK_SEC, 32) => Ok(self.clock.unix_seconds()),
            (MMIO_CLOCK_NSEC, 32) => Ok(self.clock.nanos_within_second()),
            (MMIO_CONSOLE_UART_RX, 8) => Ok(self.rx_fifo.pop().unwrap_or(0xFF) as u32),
            (MMIO_CONSOLE_UART_RX_STATUS, 8) => {
                Ok(if self.rx_fifo.has_data() { 0x01 } else { 0x00 })
            }
            _ => Err(BusFault::LoadAccessFault(addr)),
        }
    }

    pub fn store(&mut self, addr: u32, width: u32, value: u32) -> Result<(), BusFault> {
        let wb = width_bytes(width);
        if wb != 1 && addr % wb != 0 {
            return Err(BusFault::StoreMisaligned(addr));
        }
        if self.memory.contains_range(addr, wb) {
            self.memory.write(addr, wb, value);
            return Ok(());
        }
        match (addr, width) {
            (MMIO_DEBUG_UART_TX, 8) => {
                self.debug_uart.write_byte(value as u8);
                Ok(())
            }
            (MMIO_CONSOLE_UART_TX, 8) => {
                self.console_uart_tx.write_byte(value as u8);
                Ok(())
            }
            _ => Err(BusFault::StoreAccessFault(addr)),
        }
    }
}
