//! Image loader: detects MZ/EXE vs flat COM, builds the PSP, applies EXE
//! relocations and sets up initial CPU state. Grounded on
//! `msdos_improved.c`'s `load_program()` (the byte math below is a direct
//! port of its EXE/COM branches) and `dustbox::machine::Machine::load_exe`/
//! `load_com` for the "what goes in which register at entry" idiom.

use crate::cpu::Cpu;
use crate::error::EmulatorError;
use crate::format::exe::{parse_relocations, DosExeHeader};
use crate::memory::Memory;
use crate::psp;
use crate::register::{Flags, Reg16, Segment};

/// Segment EXE images are relocated to.
const EXE_LOAD_SEGMENT: u16 = 0x2010;
/// Maximum COM image size: a 64 KiB segment minus the 256-byte PSP.
const MAX_COM_SIZE: usize = 0x1_0000 - 0x100;

pub fn load(path: &str, mem: &mut Memory, cpu: &mut Cpu) -> Result<(), EmulatorError> {
    let data = std::fs::read(path).map_err(|e| EmulatorError::OpenFailed(path.to_string(), e))?;

    psp::zero_environment(mem);
    psp::write(mem, psp::PSP_SEGMENT);

    if data.len() >= 2 && &data[0..2] == b"MZ" {
        load_exe(&data, mem, cpu)
    } else {
        load_com(&data, mem, cpu)
    }
}

fn load_exe(data: &[u8], mem: &mut Memory, cpu: &mut Cpu) -> Result<(), EmulatorError> {
    let header = DosExeHeader::parse(data).map_err(EmulatorError::BadExeGeometry)?;

    let header_bytes = header.header_bytes();
    if header_bytes > data.len() {
        return Err(EmulatorError::BadExeGeometry(format!(
            "header_paragraphs*16 ({}) exceeds image size ({})",
            header_bytes,
            data.len()
        )));
    }

    let image_bytes = header.image_bytes();
    if image_bytes < header_bytes || image_bytes > data.len() {
        return Err(EmulatorError::BadExeGeometry(format!(
            "computed image size {} is inconsistent with file size {}",
            image_bytes,
            data.len()
        )));
    }
    let code_bytes = image_bytes - header_bytes;
    let code = &data[header_bytes..header_bytes + code_bytes];
    mem.write(EXE_LOAD_SEGMENT, 0x0000, code);

    let relocations = parse_relocations(data, &header).map_err(EmulatorError::BadExeGeometry)?;
    for reloc in relocations {
        let target_offset = reloc.segment.wrapping_mul(16).wrapping_add(reloc.offset);
        let value = mem.read_u16(EXE_LOAD_SEGMENT, target_offset);
        mem.write_u16(EXE_LOAD_SEGMENT, target_offset, value.wrapping_add(EXE_LOAD_SEGMENT));
    }

    cpu.regs.set_segment(Segment::CS, EXE_LOAD_SEGMENT.wrapping_add(header.cs as u16));
    cpu.regs.ip = header.ip;
    cpu.regs.set_segment(Segment::SS, EXE_LOAD_SEGMENT.wrapping_add(header.ss as u16));
    cpu.regs.set_r16(Reg16::SP, header.sp);
    cpu.regs.set_segment(Segment::DS, psp::PSP_SEGMENT);
    cpu.regs.set_segment(Segment::ES, psp::PSP_SEGMENT);
    cpu.regs.set_r16(Reg16::AX, 0);
    cpu.regs.flags = Flags::new(0x0200);

    Ok(())
}

fn load_com(data: &[u8], mem: &mut Memory, cpu: &mut Cpu) -> Result<(), EmulatorError> {
    if data.len() > MAX_COM_SIZE {
        return Err(EmulatorError::ComTooLarge(data.len()));
    }

    mem.write(psp::PSP_SEGMENT, 0x0100, data);

    cpu.regs.set_segment(Segment::CS, psp::PSP_SEGMENT);
    cpu.regs.set_segment(Segment::DS, psp::PSP_SEGMENT);
    cpu.regs.set_segment(Segment::ES, psp::PSP_SEGMENT);
    cpu.regs.set_segment(Segment::SS, psp::PSP_SEGMENT);
    cpu.regs.ip = 0x0100;
    cpu.regs.set_r16(Reg16::SP, 0xFFFE);
    cpu.regs.set_r16(Reg16::AX, 0);
    cpu.regs.flags = Flags::new(0x0200);

    Ok(())
}

#[cfg(test)]
#[path = "./loader_test.rs"]
mod loader_test;
