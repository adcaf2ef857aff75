//! CLI entry point: parses flags, boots the emulator, drives it to
//! completion, and maps the outcome onto the process exit code.

use anyhow::Context;
use log::{error, info};

use pyrv32::config::Config;
use pyrv32::{Emulator, RunOutcome};

fn setup_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

/// Parses argv and boots the guest image. The only fallible step before the
/// CPU starts running; any failure here converts to `anyhow::Error` at this
/// boundary and maps to exit code 2.
fn boot(args: impl Iterator<Item = String>) -> anyhow::Result<Emulator> {
    let config = Config::parse(args).context("parsing command line")?;
    let emulator = Emulator::boot(&config).context("booting guest image")?;
    Ok(emulator)
}

/// Up to 16 bytes below `sp`, for the fatal-trap diagnostic. Returns `None`
/// if `sp` doesn't currently point into mapped RAM.
fn stack_preview(emulator: &Emulator, sp: u32) -> Option<Vec<u8>> {
    if !emulator.bus.memory.contains_range(sp, 16) {
        return None;
    }
    Some(emulator.bus.memory.dump(sp, 16).to_vec())
}

fn main() {
    setup_logging();

    let mut emulator = match boot(std::env::args().skip(1)) {
        Ok(e) => e,
        Err(e) => {
            error!("fatal: {e:#}");
            eprintln!("pyrv32: {e:#}");
            std::process::exit(2);
        }
    };

    match emulator.run() {
        RunOutcome::Halted(status) => {
            info!("guest halted with status {status}");
            std::process::exit(status as i32);
        }
        RunOutcome::Trapped(trap) => {
            error!("fatal trap: {trap} (pc={:#010x})", trap.pc());
            let sp = emulator.cpu.reg(2);
            match trap.mtval() {
                Some(mtval) => eprintln!("pyrv32: fatal trap: {trap} (mtval={mtval:#010x})"),
                None => eprintln!("pyrv32: fatal trap: {trap}"),
            }
            match stack_preview(&emulator, sp) {
                Some(bytes) => eprintln!("pyrv32: stack at sp={sp:#010x}: {bytes:02x?}"),
                None => eprintln!("pyrv32: stack at sp={sp:#010x}: <unmapped>"),
            }
            std::process::exit(1);
        }
    }
}
