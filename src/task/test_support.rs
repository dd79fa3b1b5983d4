//! Hand-built minimal ELF64/RISC-V images for exercising `spawn_from_image`
//! without a real toolchain-produced binary on hand.

use alloc::vec::Vec;

pub fn build_minimal_elf(entry_vaddr: u64, code: &[u8]) -> Vec<u8> {
    const EHDR_SIZE: u64 = 64;
    const PHDR_SIZE: u64 = 56;
    let data_offset = EHDR_SIZE + PHDR_SIZE;

    let mut out = Vec::new();

    // e_ident
    out.extend_from_slice(&[0x7f, b'E', b'L', b'F', 2, 1, 1, 0]);
    out.extend_from_slice(&[0u8; 8]);

    out.extend_from_slice(&2u16.to_le_bytes()); // e_type = ET_EXEC
    out.extend_from_slice(&0xF3u16.to_le_bytes()); // e_machine = EM_RISCV
    out.extend_from_slice(&1u32.to_le_bytes()); // e_version
    out.extend_from_slice(&entry_vaddr.to_le_bytes()); // e_entry
    out.extend_from_slice(&EHDR_SIZE.to_le_bytes()); // e_phoff
    out.extend_from_slice(&0u64.to_le_bytes()); // e_shoff
    out.extend_from_slice(&0u32.to_le_bytes()); // e_flags
    out.extend_from_slice(&(EHDR_SIZE as u16).to_le_bytes()); // e_ehsize
    out.extend_from_slice(&(PHDR_SIZE as u16).to_le_bytes()); // e_phentsize
    out.extend_from_slice(&1u16.to_le_bytes()); // e_phnum
    out.extend_from_slice(&0u16.to_le_bytes()); // e_shentsize
    out.extend_from_slice(&0u16.to_le_bytes()); // e_shnum
    out.extend_from_slice(&0u16.to_le_bytes()); // e_shstrndx

    assert_eq!(out.len() as u64, EHDR_SIZE);

    // Single PT_LOAD program header, R+W+X so the test doesn't also
    // need a writable segment for its stack setup.
    out.extend_from_slice(&1u32.to_le_bytes()); // p_type = PT_LOAD
    out.extend_from_slice(&7u32.to_le_bytes()); // p_flags = RWX
    out.extend_from_slice(&data_offset.to_le_bytes()); // p_offset
    out.extend_from_slice(&entry_vaddr.to_le_bytes()); // p_vaddr
    out.extend_from_slice(&entry_vaddr.to_le_bytes()); // p_paddr
    out.extend_from_slice(&(code.len() as u64).to_le_bytes()); // p_filesz
    out.extend_from_slice(&4096u64.to_le_bytes()); // p_memsz
    out.extend_from_slice(&4096u64.to_le_bytes()); // p_align

    assert_eq!(out.len() as u64, data_offset);
    out.extend_from_slice(code);
    out
}
