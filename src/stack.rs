//! Builds the initial guest stack: `argc`, `argv[]`, `NULL`, `envp[]`,
//! `NULL`, `auxv` (AT_NULL-terminated), followed by the string bytes
//! themselves.

use crate::memory::Memory;

const AT_NULL: u32 = 0;
const AT_PAGESZ: u32 = 6;
const PAGE_SIZE: u32 = 4096;

/// Writes the stack below `top` and returns the resulting `sp`, 16-byte
/// aligned as RISC-V calling convention expects at `_start`.
pub fn build(memory: &mut Memory, top: u32, argv: &[String], envp: &[String]) -> u32 {
    // Lay strings out first, growing down from `top`.
    let mut cursor = top;
    let mut argv_ptrs = Vec::with_capacity(argv.len());
    let mut envp_ptrs = Vec::with_capacity(envp.len());

    for s in argv {
        cursor -= s.len() as u32 + 1;
        write_cstr(memory, cursor, s);
        argv_ptrs.push(cursor);
    }
    for s in envp {
        cursor -= s.len() as u32 + 1;
        write_cstr(memory, cursor, s);
        envp_ptrs.push(cursor);
    }

    // Reserve room for argc + argv ptrs + NULL + envp ptrs + NULL + auxv (2 entries + AT_NULL).
    let words = 1 + argv_ptrs.len() + 1 + envp_ptrs.len() + 1 + (2 * 2) + 2;
    cursor -= (words as u32) * 4;
    cursor &= !0xF; // 16-byte align

    let mut w = cursor;
    write_u32(memory, w, argv_ptrs.len() as u32);
    w += 4;
    for p in &argv_ptrs {
        write_u32(memory, w, *p);
        w += 4;
    }
    write_u32(memory, w, 0);
    w += 4;
    for p in &envp_ptrs {
        write_u32(memory, w, *p);
        w += 4;
    }
    write_u32(memory, w, 0);
    w += 4;
    write_u32(memory, w, AT_PAGESZ);
    w += 4;
    write_u32(memory, w, PAGE_SIZE);
    w += 4;
    write_u32(memory, w, AT_NULL);
    w += 4;
    write_u32(memory, w, 0);

    cursor
}

fn write_cstr(memory: &mut Memory, addr: u32, s: &str) {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    memory.load_segment(addr, &bytes, bytes.len() as u32);
}

fn write_u32(memory: &mut Memory, addr: u32, value: u32) {
    memory.write(addr, 4, value);
}
