//! PyRV32: a user-facing RV32IM bare-metal emulator. This module wires
//! together the CPU, bus, and VFS into the boot/run sequence the binary
//! entry point (`src/main.rs`) drives.

pub mod bus;
pub mod config;
pub mod cpu;
pub mod decode;
pub mod elf;
pub mod error;
pub mod memory;
pub mod mmio;
pub mod stack;
pub mod syscall;
pub mod vfs;

use std::fs::File;
use std::io::Write;

use log::info;

use bus::Bus;
use config::{Config, StreamTarget, RAM_BASE};
use cpu::{Cpu, Trap};
use error::EmuError;
use memory::Memory;
use mmio::RxFifo;
use vfs::{sandbox::Sandbox, Vfs};

/// Outcome of driving the CPU to completion: a clean `EBREAK`/`exit` halt
/// with its guest-supplied status, or a fatal trap the default policy
/// chose not to recover from.
pub enum RunOutcome {
    Halted(u8),
    Trapped(Trap),
}

pub struct Emulator {
    pub cpu: Cpu,
    pub bus: Bus,
    pub vfs: Vfs,
    rx_pump_stdin: bool,
}

fn open_stream_for_write(target: &StreamTarget, fallback: Box<dyn Write + Send>) -> Result<Box<dyn Write + Send>, EmuError> {
    match target {
        StreamTarget::Tty => Ok(fallback),
        StreamTarget::File(path) => Ok(Box::new(File::create(path)?)),
    }
}

impl Emulator {
    /// Loads `config.program` into a fresh RAM image, wires up the MMIO
    /// devices against the configured streams, and prepares the initial
    /// stack. Returns before the first instruction executes; any failure
    /// here is a host/emulator failure.
    pub fn boot(config: &Config) -> Result<Self, EmuError> {
        let image = std::fs::read(&config.program)?;
        let mut memory = Memory::new(RAM_BASE, config.ram_size);
        let loaded = elf::load(&image, &mut memory).map_err(EmuError::Elf)?;
        info!("loaded {} ({} bytes RAM)", config.program.display(), config.ram_size);

        let stack_top = RAM_BASE + config.ram_size;
        let mut argv = vec![config
            .program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "prog".to_string())];
        argv.extend(config.program_args.iter().cloned());
        let envp: Vec<String> = std::env::vars().map(|(k, v)| format!("{k}={v}")).collect();
        let sp = stack::build(&mut memory, stack_top, &argv, &envp);

        let stdout: Box<dyn Write + Send> = open_stream_for_write(&config.stdout, Box::new(std::io::stdout()))?;
        let stderr: Box<dyn Write + Send> = open_stream_for_write(&config.stderr, Box::new(std::io::stderr()))?;
        let rx_fifo = RxFifo::new();
        let bus = Bus::new(memory, stderr, stdout, rx_fifo.clone());

        let rx_pump_stdin = matches!(config.stdin, StreamTarget::Tty);
        if !rx_pump_stdin {
            if let StreamTarget::File(path) = &config.stdin {
                let bytes = std::fs::read(path)?;
                for b in bytes {
                    rx_fifo.push(b);
                }
            }
        }

        let sandbox = Sandbox::new(config.sandbox_root.clone(), &config.guest_cwd);
        let vfs = Vfs::new(sandbox);

        let cpu = Cpu::new(loaded.entry, sp);
        Ok(Self { cpu, bus, vfs, rx_pump_stdin })
    }

    /// Drives the CPU until `EBREAK`/`exit` or a fatal trap. Pumps host
    /// stdin into the RX FIFO lazily (only spawned if `--stdin --tty` was
    /// requested); `read(0, …)` otherwise blocks on whatever was pre-loaded
    /// at boot.
    pub fn run(&mut self) -> RunOutcome {
        if self.rx_pump_stdin {
            spawn_stdin_pump(self.bus.rx_fifo.clone());
        }
        loop {
            if self.cpu.halted {
                return RunOutcome::Halted(0);
            }
            self.bus.tick();
            match self.cpu.step(&mut self.bus) {
                Ok(()) => continue,
                Err(Trap::EcallFromU { .. }) => {
                    match syscall::dispatch(&mut self.cpu, &mut self.bus, &mut self.vfs) {
                        syscall::Outcome::Continue => continue,
                        syscall::Outcome::Exit(status) => return RunOutcome::Halted(status),
                    }
                }
                Err(Trap::Breakpoint { .. }) => {
                    let status = (self.cpu.reg(10) & 0xFF) as u8;
                    return RunOutcome::Halted(status);
                }
                Err(trap) => return RunOutcome::Trapped(trap),
            }
        }
    }

    /// Requests a halt before the next fetch, observed at the top of the
    /// next `step()` call. Exposed for host-driven cancellation; unused by
    /// the single-shot CLI driver today.
    pub fn request_halt(&mut self) {
        self.cpu.halted = true;
    }
}

fn spawn_stdin_pump(fifo: RxFifo) {
    std::thread::spawn(move || {
        use std::io::Read;
        let mut stdin = std::io::stdin();
        let mut byte = [0u8; 1];
        loop {
            match stdin.read(&mut byte) {
                Ok(0) | Err(_) => break,
                Ok(_) => fifo.push(byte[0]),
            }
        }
    });
}
