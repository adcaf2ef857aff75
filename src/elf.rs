//! ELF32 loader: parses `PT_LOAD` segments into RAM, records the entry PC,
//! and leaves stack/argv/envp construction to [`crate::stack`].

use thiserror::Error;

use crate::memory::Memory;

const EI_CLASS: usize = 4;
const EI_DATA: usize = 5;
const ELFCLASS32: u8 = 1;
const ELFDATA2LSB: u8 = 1;
const ET_EXEC: u16 = 2;
const EM_RISCV: u16 = 243;
const PT_LOAD: u32 = 1;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ElfError {
    #[error("file too short to contain an ELF header")]
    Truncated,
    #[error("not an ELF file (bad magic)")]
    BadMagic,
    #[error("not a 32-bit ELF file")]
    NotElf32,
    #[error("not a little-endian ELF file")]
    NotLittleEndian,
    #[error("not an executable ELF file (e_type != ET_EXEC)")]
    NotExecutable,
    #[error("not a RISC-V ELF file (e_machine != EM_RISCV)")]
    NotRiscV,
    #[error("PT_LOAD segment [{vaddr:#010x}, {end:#010x}) does not fit in RAM")]
    SegmentOutOfBounds { vaddr: u32, end: u32 },
}

pub struct LoadedElf {
    pub entry: u32,
}

fn read_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes(buf[off..off + 2].try_into().unwrap())
}

fn read_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes(buf[off..off + 4].try_into().unwrap())
}

/// Bounds-checked sub-slice: `Truncated` instead of a panic for any
/// offset/length an untrusted image can claim.
fn slice(image: &[u8], start: usize, len: usize) -> Result<&[u8], ElfError> {
    let end = start.checked_add(len).ok_or(ElfError::Truncated)?;
    image.get(start..end).ok_or(ElfError::Truncated)
}

/// Parses `image` as a 32-bit little-endian `ET_EXEC` RISC-V ELF and copies
/// every `PT_LOAD` segment into `memory`. Non-`PT_LOAD` segments are ignored.
pub fn load(image: &[u8], memory: &mut Memory) -> Result<LoadedElf, ElfError> {
    if image.len() < 52 {
        return Err(ElfError::Truncated);
    }
    if &image[0..4] != b"\x7fELF" {
        return Err(ElfError::BadMagic);
    }
    if image[EI_CLASS] != ELFCLASS32 {
        return Err(ElfError::NotElf32);
    }
    if image[EI_DATA] != ELFDATA2LSB {
        return Err(ElfError::NotLittleEndian);
    }

    let e_type = read_u16(image, 16);
    let e_machine = read_u16(image, 18);
    let e_entry = read_u32(image, 24);
    let e_phoff = read_u32(image, 28) as usize;
    let e_phentsize = read_u16(image, 42) as usize;
    let e_phnum = read_u16(image, 44) as usize;

    if e_type != ET_EXEC {
        return Err(ElfError::NotExecutable);
    }
    if e_machine != EM_RISCV {
        return Err(ElfError::NotRiscV);
    }

    let ph_table_len = e_phnum.checked_mul(e_phentsize).ok_or(ElfError::Truncated)?;
    slice(image, e_phoff, ph_table_len)?;

    for i in 0..e_phnum {
        let ph = slice(image, e_phoff + i * e_phentsize, e_phentsize)?;
        let p_type = read_u32(ph, 0);
        if p_type != PT_LOAD {
            continue;
        }
        let p_offset = read_u32(ph, 4) as usize;
        let p_vaddr = read_u32(ph, 8);
        let p_filesz = read_u32(ph, 16);
        let p_memsz = read_u32(ph, 20);

        let end = p_vaddr
            .checked_add(p_memsz)
            .ok_or(ElfError::SegmentOutOfBounds { vaddr: p_vaddr, end: u32::MAX })?;
        if !memory.contains_range(p_vaddr, p_memsz) {
            return Err(ElfError::SegmentOutOfBounds { vaddr: p_vaddr, end });
        }

        let data = slice(image, p_offset, p_filesz as usize)?;
        memory.load_segment(p_vaddr, data, p_memsz);
    }

    Ok(LoadedElf { entry: e_entry })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_elf(e_type: u16, e_machine: u16, class: u8, data: u8, segments: &[(u32, Vec<u8>, u32)]) -> Vec<u8> {
        let ehsize = 52usize;
        let phentsize = 32usize;
        let mut phdrs = Vec::new();
        let mut body = Vec::new();
        let mut file_off = ehsize + phentsize * segments.len();
        for (vaddr, bytes, memsz) in segments {
            let mut ph = vec![0u8; phentsize];
            ph[0..4].copy_from_slice(&1u32.to_le_bytes()); // PT_LOAD
            ph[4..8].copy_from_slice(&(file_off as u32).to_le_bytes());
            ph[8..12].copy_from_slice(&vaddr.to_le_bytes());
            ph[16..20].copy_from_slice(&(bytes.len() as u32).to_le_bytes());
            ph[20..24].copy_from_slice(&memsz.to_le_bytes());
            phdrs.extend_from_slice(&ph);
            body.extend_from_slice(bytes);
            file_off += bytes.len();
        }

        let mut header = vec![0u8; ehsize];
        header[0..4].copy_from_slice(b"\x7fELF");
        header[4] = class;
        header[5] = data;
        header[16..18].copy_from_slice(&e_type.to_le_bytes());
        header[18..20].copy_from_slice(&e_machine.to_le_bytes());
        header[24..28].copy_from_slice(&0x8000_0000u32.to_le_bytes()); // e_entry
        header[28..32].copy_from_slice(&(ehsize as u32).to_le_bytes()); // e_phoff
        header[42..44].copy_from_slice(&(phentsize as u16).to_le_bytes());
        header[44..46].copy_from_slice(&(segments.len() as u16).to_le_bytes());

        let mut out = header;
        out.extend_from_slice(&phdrs);
        out.extend_from_slice(&body);
        out
    }

    #[test]
    fn rejects_bad_magic() {
        let mut mem = Memory::new(0x8000_0000, 0x1000);
        assert_eq!(load(b"not an elf", &mut mem), Err(ElfError::BadMagic));
    }

    #[test]
    fn rejects_wrong_machine() {
        let image = minimal_elf(ET_EXEC, 0, ELFCLASS32, ELFDATA2LSB, &[]);
        let mut mem = Memory::new(0x8000_0000, 0x1000);
        assert_eq!(load(&image, &mut mem), Err(ElfError::NotRiscV));
    }

    #[test]
    fn loads_segment_and_zero_fills_bss() {
        let image = minimal_elf(
            ET_EXEC,
            EM_RISCV,
            ELFCLASS32,
            ELFDATA2LSB,
            &[(0x8000_0000, vec![1, 2, 3, 4], 8)],
        );
        let mut mem = Memory::new(0x8000_0000, 0x1000);
        let loaded = load(&image, &mut mem).unwrap();
        assert_eq!(loaded.entry, 0x8000_0000);
        assert_eq!(mem.dump(0x8000_0000, 8), &[1, 2, 3, 4, 0, 0, 0, 0]);
    }

    #[test]
    fn segment_outside_ram_is_rejected() {
        let image = minimal_elf(
            ET_EXEC,
            EM_RISCV,
            ELFCLASS32,
            ELFDATA2LSB,
            &[(0x0000_0000, vec![1], 1)],
        );
        let mut mem = Memory::new(0x8000_0000, 0x1000);
        assert!(matches!(load(&image, &mut mem), Err(ElfError::SegmentOutOfBounds { .. })));
    }

    #[test]
    fn program_header_table_beyond_file_end_is_truncated_not_a_panic() {
        let mut image = minimal_elf(ET_EXEC, EM_RISCV, ELFCLASS32, ELFDATA2LSB, &[]);
        // Claim one program header but never back it with any bytes.
        image[44..46].copy_from_slice(&1u16.to_le_bytes()); // e_phnum = 1
        let mut mem = Memory::new(0x8000_0000, 0x1000);
        assert_eq!(load(&image, &mut mem), Err(ElfError::Truncated));
    }

    #[test]
    fn segment_file_offset_beyond_file_end_is_truncated_not_a_panic() {
        let mut image = minimal_elf(
            ET_EXEC,
            EM_RISCV,
            ELFCLASS32,
            ELFDATA2LSB,
            &[(0x8000_0000, vec![1, 2, 3, 4], 4)],
        );
        // Point p_offset past the end of the file, leaving p_filesz intact.
        let phdr_off = 52usize;
        image[phdr_off + 4..phdr_off + 8].copy_from_slice(&(image.len() as u32 + 100).to_le_bytes());
        let mut mem = Memory::new(0x8000_0000, 0x1000);
        assert_eq!(load(&image, &mut mem), Err(ElfError::Truncated));
    }
}
