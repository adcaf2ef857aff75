//! Table-driven ECALL shim: reads `a7`/`a0..a5`, dispatches to the VFS or
//! the UART devices, and writes the marshalled result back into `a0`.

use log::{debug, trace, warn};

use crate::bus::Bus;
use crate::cpu::Cpu;
use crate::error::Errno;
use crate::mmio::{MMIO_CONSOLE_UART_TX, MMIO_DEBUG_UART_TX};
use crate::vfs::{stat::STAT_BUF_LEN, Vfs};

const AT_FDCWD: i32 = -100;

const SYS_GETCWD: u32 = 17;
const SYS_UNLINKAT: u32 = 35;
const SYS_LINKAT: u32 = 37;
const SYS_RENAMEAT: u32 = 38;
const SYS_FACCESSAT: u32 = 48;
const SYS_CHDIR: u32 = 49;
const SYS_OPENAT: u32 = 56;
const SYS_CLOSE: u32 = 57;
const SYS_LSEEK: u32 = 62;
const SYS_READ: u32 = 63;
const SYS_WRITE: u32 = 64;
const SYS_FSTATAT: u32 = 79;
const SYS_FSTAT: u32 = 80;
const SYS_EXIT: u32 = 93;

const AT_REMOVEDIR: i32 = 0x200;

pub enum Outcome {
    Continue,
    Exit(u8),
}

fn read_cstring(bus: &Bus, mut addr: u32) -> Result<String, Errno> {
    let mut bytes = Vec::new();
    loop {
        if !bus.memory.contains_range(addr, 1) {
            return Err(Errno::EINVAL);
        }
        let b = bus.memory.read(addr, 1) as u8;
        if b == 0 {
            break;
        }
        bytes.push(b);
        addr += 1;
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn read_bytes(bus: &Bus, addr: u32, len: u32) -> Result<Vec<u8>, Errno> {
    if !bus.memory.contains_range(addr, len) {
        return Err(Errno::EINVAL);
    }
    Ok(bus.memory.dump(addr, len).to_vec())
}

fn write_bytes(bus: &mut Bus, addr: u32, data: &[u8]) -> Result<(), Errno> {
    if !bus.memory.contains_range(addr, data.len() as u32) {
        return Err(Errno::EINVAL);
    }
    for (i, b) in data.iter().enumerate() {
        bus.memory.write(addr + i as u32, 1, *b as u32);
    }
    Ok(())
}

fn check_at_fdcwd(dirfd: i32) -> Result<(), Errno> {
    if dirfd == AT_FDCWD {
        Ok(())
    } else {
        Err(Errno::EINVAL)
    }
}

/// Dispatches a single ECALL. `cpu.pc` already points past the `ecall`
/// instruction (the CPU advanced it before raising `EcallFromU`).
pub fn dispatch(cpu: &mut Cpu, bus: &mut Bus, vfs: &mut Vfs) -> Outcome {
    let num = cpu.reg(17); // a7
    let a0 = cpu.reg(10);
    let a1 = cpu.reg(11);
    let a2 = cpu.reg(12);
    let a3 = cpu.reg(13);
    trace!("ecall a7={num} a0={a0:#x} a1={a1:#x} a2={a2:#x} a3={a3:#x}");

    let result = handle(num, a0, a1, a2, a3, bus, vfs);
    match result {
        Ok(Dispatched::Value(v)) => {
            cpu.set_reg(10, v as u32);
            Outcome::Continue
        }
        Ok(Dispatched::Exit(status)) => Outcome::Exit(status),
        Err(errno) => {
            debug!("ecall a7={num} failed: {errno:?}");
            cpu.set_reg(10, errno.to_negated() as u32);
            Outcome::Continue
        }
    }
}

enum Dispatched {
    Value(i64),
    Exit(u8),
}

fn handle(
    num: u32,
    a0: u32,
    a1: u32,
    a2: u32,
    a3: u32,
    bus: &mut Bus,
    vfs: &mut Vfs,
) -> Result<Dispatched, Errno> {
    match num {
        SYS_GETCWD => {
            let cwd = vfs.getcwd();
            let mut bytes = cwd.as_bytes().to_vec();
            bytes.push(0);
            if bytes.len() as u32 > a1 {
                return Err(Errno::ERANGE);
            }
            write_bytes(bus, a0, &bytes)?;
            Ok(Dispatched::Value(a0 as i64))
        }
        SYS_UNLINKAT => {
            check_at_fdcwd(a0 as i32)?;
            let path = read_cstring(bus, a1)?;
            vfs.unlinkat(&path, (a2 as i32 & AT_REMOVEDIR) != 0)?;
            Ok(Dispatched::Value(0))
        }
        SYS_LINKAT => {
            check_at_fdcwd(a0 as i32)?;
            let old = read_cstring(bus, a1)?;
            check_at_fdcwd(a2 as i32)?;
            let new = read_cstring(bus, a3)?;
            vfs.linkat(&old, &new)?;
            Ok(Dispatched::Value(0))
        }
        SYS_RENAMEAT => {
            check_at_fdcwd(a0 as i32)?;
            let old = read_cstring(bus, a1)?;
            check_at_fdcwd(a2 as i32)?;
            let new = read_cstring(bus, a3)?;
            vfs.renameat(&old, &new)?;
            Ok(Dispatched::Value(0))
        }
        SYS_FACCESSAT => {
            check_at_fdcwd(a0 as i32)?;
            let path = read_cstring(bus, a1)?;
            vfs.faccessat(&path, a2 as i32)?;
            Ok(Dispatched::Value(0))
        }
        SYS_CHDIR => {
            let path = read_cstring(bus, a0)?;
            vfs.chdir(&path)?;
            Ok(Dispatched::Value(0))
        }
        SYS_OPENAT => {
            check_at_fdcwd(a0 as i32)?;
            let path = read_cstring(bus, a1)?;
            let fd = vfs.open(&path, a2 as i32, a3)?;
            Ok(Dispatched::Value(fd as i64))
        }
        SYS_CLOSE => {
            vfs.close(a0 as i32)?;
            Ok(Dispatched::Value(0))
        }
        SYS_LSEEK => {
            let pos = vfs.lseek(a0 as i32, a1 as i32 as i64, a2 as i32)?;
            Ok(Dispatched::Value(pos as i64))
        }
        SYS_READ => {
            let fd = a0 as i32;
            let len = a2;
            if fd == 0 {
                let mut out = Vec::with_capacity(len as usize);
                if len > 0 {
                    out.push(bus.rx_fifo.blocking_pop());
                    while (out.len() as u32) < len {
                        match bus.rx_fifo.pop() {
                            Some(b) => out.push(b),
                            None => break,
                        }
                    }
                }
                write_bytes(bus, a1, &out)?;
                Ok(Dispatched::Value(out.len() as i64))
            } else {
                let data = vfs.read(fd, len as usize)?;
                write_bytes(bus, a1, &data)?;
                Ok(Dispatched::Value(data.len() as i64))
            }
        }
        SYS_WRITE => {
            let fd = a0 as i32;
            let data = read_bytes(bus, a1, a2)?;
            match fd {
                1 => {
                    for b in &data {
                        bus.store(MMIO_CONSOLE_UART_TX, 8, *b as u32).map_err(|_| Errno::EINVAL)?;
                    }
                    Ok(Dispatched::Value(data.len() as i64))
                }
                2 => {
                    for b in &data {
                        bus.store(MMIO_DEBUG_UART_TX, 8, *b as u32).map_err(|_| Errno::EINVAL)?;
                    }
                    Ok(Dispatched::Value(data.len() as i64))
                }
                _ => {
                    let n = vfs.write(fd, &data)?;
                    Ok(Dispatched::Value(n as i64))
                }
            }
        }
        SYS_FSTATAT => {
            check_at_fdcwd(a0 as i32)?;
            let path = read_cstring(bus, a1)?;
            let info = vfs.fstatat(&path)?;
            let bytes = info.to_bytes();
            debug_assert_eq!(bytes.len(), STAT_BUF_LEN);
            write_bytes(bus, a2, &bytes)?;
            Ok(Dispatched::Value(0))
        }
        SYS_FSTAT => {
            let info = vfs.fstat(a0 as i32)?;
            write_bytes(bus, a1, &info.to_bytes())?;
            Ok(Dispatched::Value(0))
        }
        SYS_EXIT => {
            warn!("guest exit({a0})");
            Ok(Dispatched::Exit((a0 & 0xFF) as u8))
        }
        other => {
            warn!("unsupported syscall number {other}");
            Err(Errno::ENOSYS)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::Cpu;
    use crate::memory::Memory;
    use crate::mmio::RxFifo;
    use crate::vfs::sandbox::Sandbox;

    fn setup() -> (Cpu, Bus, Vfs, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let bus = Bus::new(
            Memory::new(0x8000_0000, 0x1000),
            Box::new(std::io::sink()),
            Box::new(std::io::sink()),
            RxFifo::new(),
        );
        let vfs = Vfs::new(Sandbox::new(dir.path().to_path_buf(), "/"));
        (Cpu::new(0x8000_0000, 0x8000_0ff0), bus, vfs, dir)
    }

    #[test]
    fn exit_syscall_sets_low_byte_of_status() {
        let (mut cpu, mut bus, mut vfs, _dir) = setup();
        cpu.set_reg(17, 93); // a7 = SYS_EXIT
        cpu.set_reg(10, 256 + 7); // a0, low byte should be 7
        match dispatch(&mut cpu, &mut bus, &mut vfs) {
            Outcome::Exit(status) => assert_eq!(status, 7),
            Outcome::Continue => panic!("expected Exit"),
        }
    }

    #[test]
    fn unknown_syscall_returns_negated_enosys() {
        let (mut cpu, mut bus, mut vfs, _dir) = setup();
        cpu.set_reg(17, 9999);
        match dispatch(&mut cpu, &mut bus, &mut vfs) {
            Outcome::Continue => assert_eq!(cpu.reg(10) as i32, Errno::ENOSYS.to_negated() as i32),
            Outcome::Exit(_) => panic!("unknown syscall must not exit"),
        }
    }

    #[test]
    fn openat_requires_at_fdcwd() {
        let (mut cpu, mut bus, mut vfs, _dir) = setup();
        // Write a NUL-terminated path string into RAM for a1 to point at.
        bus.memory.write(0x8000_0100, 1, b'/' as u32);
        bus.memory.write(0x8000_0101, 1, 0);
        cpu.set_reg(17, 56); // SYS_OPENAT
        cpu.set_reg(10, 1); // dirfd != AT_FDCWD
        cpu.set_reg(11, 0x8000_0100);
        dispatch(&mut cpu, &mut bus, &mut vfs);
        assert_eq!(cpu.reg(10) as i32, Errno::EINVAL.to_negated() as i32);
    }
}
