//! ELF64 executable emission.
//!
//! The output image is as small as ELF allows: a 64-byte header, one RWX
//! LOAD program header, then the code buffer followed by any buffered data.
//! There are no sections, no symbol table, and no relocations; the entry
//! point is the first byte after the headers. Globals live at
//! [`GLOBAL_BASE`](super::symbols::GLOBAL_BASE) and above, inside the
//! segment's memsz but beyond its filesz, so the kernel zero-fills them.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use super::symbols::GLOBAL_BASE;

// ── ELF identification ───────────────────────────────────────────────────────

pub const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
pub const ELFCLASS64: u8 = 2;
pub const ELFDATA2LSB: u8 = 1;
pub const EV_CURRENT: u8 = 1;

pub const ET_EXEC: u16 = 2;
pub const EM_X86_64: u16 = 62;

pub const PT_LOAD: u32 = 1;
pub const PF_X: u32 = 0x1;
pub const PF_W: u32 = 0x2;
pub const PF_R: u32 = 0x4;

/// Size of ELF64 header in bytes.
pub const ELF64_EHDR_SIZE: usize = 64;
/// Size of ELF64 program header in bytes.
pub const ELF64_PHDR_SIZE: usize = 56;

/// File base virtual address of the image.
pub const BASE_VADDR: u64 = 0x400000;
/// Offset of the first code byte; also the entry point relative to the base.
pub const HEADER_SIZE: usize = ELF64_EHDR_SIZE + ELF64_PHDR_SIZE;

/// Build the complete executable image in memory.
pub fn build_image(code: &[u8], data: &[u8], global_bytes: u64) -> Vec<u8> {
    let total = code.len() + data.len();
    let entry = BASE_VADDR + HEADER_SIZE as u64;
    let file_size = (HEADER_SIZE + total) as u64;
    // memsz must cover the zero-filled global window at GLOBAL_BASE and
    // above, with a page minimum and headroom past the last global.
    let global_size = if global_bytes > 0 { global_bytes } else { 0x1000 };
    let mem_size = GLOBAL_BASE - BASE_VADDR + global_size + 0x10000;

    let mut image = Vec::with_capacity(HEADER_SIZE + total);

    // ELF64 header.
    image.extend_from_slice(&ELF_MAGIC);
    image.push(ELFCLASS64);
    image.push(ELFDATA2LSB);
    image.push(EV_CURRENT);
    image.resize(16, 0); // OS/ABI, ABI version, ident padding
    image.extend_from_slice(&ET_EXEC.to_le_bytes());
    image.extend_from_slice(&EM_X86_64.to_le_bytes());
    image.extend_from_slice(&(EV_CURRENT as u32).to_le_bytes());
    image.extend_from_slice(&entry.to_le_bytes());
    image.extend_from_slice(&(ELF64_EHDR_SIZE as u64).to_le_bytes()); // phoff
    image.extend_from_slice(&0u64.to_le_bytes()); // shoff
    image.extend_from_slice(&0u32.to_le_bytes()); // flags
    image.extend_from_slice(&(ELF64_EHDR_SIZE as u16).to_le_bytes());
    image.extend_from_slice(&(ELF64_PHDR_SIZE as u16).to_le_bytes());
    image.extend_from_slice(&1u16.to_le_bytes()); // phnum
    image.extend_from_slice(&0u16.to_le_bytes()); // shentsize
    image.extend_from_slice(&0u16.to_le_bytes()); // shnum
    image.extend_from_slice(&0u16.to_le_bytes()); // shstrndx
    debug_assert_eq!(image.len(), ELF64_EHDR_SIZE);

    // Single LOAD program header covering headers, code, data, and the
    // global window, mapped readable, writable, and executable.
    image.extend_from_slice(&PT_LOAD.to_le_bytes());
    image.extend_from_slice(&(PF_R | PF_W | PF_X).to_le_bytes());
    image.extend_from_slice(&0u64.to_le_bytes()); // offset
    image.extend_from_slice(&BASE_VADDR.to_le_bytes()); // vaddr
    image.extend_from_slice(&BASE_VADDR.to_le_bytes()); // paddr
    image.extend_from_slice(&file_size.to_le_bytes());
    image.extend_from_slice(&mem_size.to_le_bytes());
    image.extend_from_slice(&0x1000u64.to_le_bytes()); // align
    debug_assert_eq!(image.len(), HEADER_SIZE);

    image.extend_from_slice(code);
    image.extend_from_slice(data);
    image
}

/// Write the executable image to `path` and mark it 0755.
pub fn write_executable(
    path: &Path,
    code: &[u8],
    data: &[u8],
    global_bytes: u64,
) -> io::Result<()> {
    fs::write(path, build_image(code, data, global_bytes))?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

/// Write only the raw code-buffer bytes, with no ELF wrapping.
pub fn write_raw(path: &Path, code: &[u8]) -> io::Result<()> {
    fs::write(path, code)
}
