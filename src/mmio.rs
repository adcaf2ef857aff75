//! Memory-mapped device set: debug/console UARTs, millisecond timer, wall
//! clock. All registers are sampled lazily from host clocks or a shared RX
//! FIFO; no background thread is required.

use std::io::Write;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

pub const MMIO_DEBUG_UART_TX: u32 = 0x1000_0000;
pub const MMIO_TIMER_MS: u32 = 0x1000_0004;
pub const MMIO_CLOCK_SEC: u32 = 0x1000_0008;
pub const MMIO_CLOCK_NSEC: u32 = 0x1000_000C;
pub const MMIO_CONSOLE_UART_TX: u32 = 0x1000_1000;
pub const MMIO_CONSOLE_UART_RX: u32 = 0x1000_1004;
pub const MMIO_CONSOLE_UART_RX_STATUS: u32 = 0x1000_1008;

/// Shared producer/consumer FIFO feeding the console UART RX register. A
/// host-side input pump enqueues bytes at any time; the CPU thread dequeues
/// under the lock and blocks on the condvar until a byte is available.
#[derive(Clone)]
pub struct RxFifo {
    inner: Arc<(Mutex<std::collections::VecDeque<u8>>, Condvar)>,
}

impl RxFifo {
    pub fn new() -> Self {
        Self {
            inner: Arc::new((Mutex::new(std::collections::VecDeque::new()), Condvar::new())),
        }
    }

    pub fn push(&self, byte: u8) {
        let (lock, cvar) = &*self.inner;
        let mut q = lock.lock().unwrap();
        q.push_back(byte);
        cvar.notify_one();
    }

    pub fn has_data(&self) -> bool {
        let (lock, _) = &*self.inner;
        !lock.lock().unwrap().is_empty()
    }

    /// Destructive dequeue used by the RX data register read: returns `None`
    /// (an unspecified byte, here surfaced as `0xFF`) if the FIFO was empty;
    /// the status register is the only authoritative signal.
    pub fn pop(&self) -> Option<u8> {
        let (lock, _) = &*self.inner;
        lock.lock().unwrap().pop_front()
    }

    /// Blocks until at least one byte is available, then returns it. Used by
    /// the `read(fd=0, …)` syscall path, which blocks for the first byte and
    /// then drains non-blockingly.
    pub fn blocking_pop(&self) -> u8 {
        let (lock, cvar) = &*self.inner;
        let mut q = lock.lock().unwrap();
        while q.is_empty() {
            q = cvar.wait(q).unwrap();
        }
        q.pop_front().unwrap()
    }
}

impl Default for RxFifo {
    fn default() -> Self {
        Self::new()
    }
}

/// Write-only one-byte-per-write UART that flushes directly to a host
/// stream. Coalesces nothing; the driver is responsible for the stream's
/// buffering policy.
pub struct UartTx<W: Write> {
    out: W,
}

impl<W: Write> UartTx<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn write_byte(&mut self, byte: u8) {
        let _ = self.out.write_all(&[byte]);
        let _ = self.out.flush();
    }
}

/// Millisecond timer + wall clock, both sampled on read. `start` anchors the
/// monotonic millisecond counter so repeated reads are non-decreasing within
/// a run.
pub struct Clock {
    start: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }

    pub fn millis_since_start(&self) -> u32 {
        self.start.elapsed().as_millis() as u32
    }

    pub fn unix_seconds(&self) -> u32 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0)
    }

    /// Nanoseconds within the current second, 0..999_999_999. `gettimeofday`
    /// in the guest firmware truncates this by 1000 to get microseconds;
    /// callers must not round.
    pub fn nanos_within_second(&self) -> u32 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
