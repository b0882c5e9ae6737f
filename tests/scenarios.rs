//! End-to-end scenarios exercising the loader, CPU and DOS layer together,
//! mirroring the runnable examples this emulator's narrower DOS personality
//! is built around (a program that prints, reads a line behind a prompt
//! gate, touches a file via FCBs, and terminates).

use racterbox::cpu::Cpu;
use racterbox::dos::Dos;
use racterbox::fcb;
use racterbox::host_io::HostIo;
use racterbox::memory::Memory;
use racterbox::psp;
use racterbox::register::{Reg16, Reg8, Segment};
use racterbox::Emulator;

use std::io::Write;

fn temp_path(name: &str) -> std::path::PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("racterbox-scenario-{}-{}", std::process::id(), name));
    path
}

fn write_com(name: &str, code: &[u8]) -> std::path::PathBuf {
    let path = temp_path(name);
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(code).unwrap();
    path
}

/// Scenario 2: EXE hello via AH=09 + AH=4C.
#[test]
fn exe_hello_prints_and_exits() {
    let mut header = vec![0u8; 32];
    header[0] = b'M';
    header[1] = b'Z';
    let code_len = 12u16;
    let pages = 1u16;
    let last_page = (32 + code_len) % 512;
    header[2..4].copy_from_slice(&last_page.to_le_bytes());
    header[4..6].copy_from_slice(&pages.to_le_bytes());
    header[6..8].copy_from_slice(&0u16.to_le_bytes()); // relocations
    header[8..10].copy_from_slice(&2u16.to_le_bytes()); // header_paragraphs
    header[14..16].copy_from_slice(&0i16.to_le_bytes()); // ss
    header[16..18].copy_from_slice(&0xFFFEu16.to_le_bytes()); // sp
    header[20..22].copy_from_slice(&0u16.to_le_bytes()); // ip
    header[22..24].copy_from_slice(&0i16.to_le_bytes()); // cs
    header[24..26].copy_from_slice(&28u16.to_le_bytes()); // reloc table offset

    // AH=09 write "HI$", then AH=4C exit. DS is fixed to the PSP segment at
    // EXE entry, so the string can't live inline in the code
    // segment without a MOV-to-segreg instruction this opcode subset
    // doesn't implement — it's poked into PSP-relative scratch space below
    // instead, and DX just needs to point at it.
    const SCRATCH_OFFSET: u16 = 0x0200;
    let code: [u8; 12] = [
        0xB4, 0x09, 0xBA, (SCRATCH_OFFSET & 0xFF) as u8, (SCRATCH_OFFSET >> 8) as u8, 0xCD, 0x21, 0xB8, 0x00, 0x4C,
        0xCD, 0x21,
    ];

    let mut data = header;
    data.extend_from_slice(&code);
    let path = temp_path("exe-hello");
    std::fs::File::create(&path).unwrap().write_all(&data).unwrap();

    let mut emu = Emulator::new(false).unwrap();
    emu.load(path.to_str().unwrap()).unwrap();
    emu.mem.write(psp::PSP_SEGMENT, SCRATCH_OFFSET, b"HI$");
    assert!(emu.run());

    std::fs::remove_file(&path).ok();
}

/// Scenario 3: the `\r\n>` prompt-detection heuristic tracks program output
/// independently of input reads — it is the main loop's throttling that
/// consults it, not the read selectors themselves (those always attempt a
/// read regardless, so piped input waiting before a prompt is never lost).
#[test]
fn prompt_gate_tracks_output_regardless_of_input_reads() {
    let mut cpu = Cpu::new();
    let mut mem = Memory::new();
    let mut io = HostIo::new();
    let mut dos = Dos::new(false);
    let mut run = true;

    cpu.regs.set_segment(Segment::DS, psp::PSP_SEGMENT);

    // AH=01 behaves the same before and after the gate opens: with no real
    // stdin data available in this test, it reports AL=0 either way.
    for _ in 0..4 {
        cpu.regs.set_r8(Reg8::AH, 0x01);
        dos.int21(&mut cpu, &mut mem, &mut io, &mut run);
        assert_eq!(cpu.regs.get_r8(Reg8::AL), 0);
    }
    assert!(!io.input_enabled);

    // Writing the prompt sequence opens the gate...
    cpu.regs.set_r8(Reg8::AH, 0x02);
    for &b in b"\r\n>" {
        cpu.regs.set_r8(Reg8::DL, b);
        dos.int21(&mut cpu, &mut mem, &mut io, &mut run);
    }
    assert!(io.input_enabled);

    // ...and a bare `\r` written via AH=02 afterwards closes it again.
    cpu.regs.set_r8(Reg8::AH, 0x02);
    cpu.regs.set_r8(Reg8::DL, b'\r');
    dos.int21(&mut cpu, &mut mem, &mut io, &mut run);
    assert!(!io.input_enabled);

    // But an AH=01 echo of a guest-typed `\r` must not be able to trip the
    // same close, since it writes through a raw (non-feeding) path.
    cpu.regs.set_r8(Reg8::AH, 0x02);
    for &b in b"\r\n>" {
        cpu.regs.set_r8(Reg8::DL, b);
        dos.int21(&mut cpu, &mut mem, &mut io, &mut run);
    }
    assert!(io.input_enabled);
    io.write_byte_raw(b'\r');
    assert!(io.input_enabled);
}

/// Scenario 4: FCB round trip — create, write a record, close, reopen, read
/// the record back.
#[test]
fn fcb_round_trip_create_write_close_reopen_read() {
    let mut cpu = Cpu::new();
    let mut mem = Memory::new();
    let mut io = HostIo::new();
    let mut dos = Dos::new(false);
    let mut run = true;

    let dir = std::env::temp_dir().join(format!("racterbox-scenario-fcb-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let original_cwd = std::env::current_dir().unwrap();
    std::env::set_current_dir(&dir).unwrap();

    cpu.regs.set_segment(Segment::DS, psp::PSP_SEGMENT);
    cpu.regs.set_segment(Segment::SS, psp::PSP_SEGMENT);

    let fcb_off = 0x0300u16;
    mem.write_u8(psp::PSP_SEGMENT, fcb_off, 0);
    mem.write(psp::PSP_SEGMENT, fcb_off + 1, b"ROUND   DAT");
    cpu.regs.set_r16(Reg16::DX, fcb_off);

    // create
    cpu.regs.set_r8(Reg8::AH, 0x16);
    dos.int21(&mut cpu, &mut mem, &mut io, &mut run);
    assert_eq!(cpu.regs.get_r8(Reg8::AL), 0);

    // DTA holds the record to write
    let dta_off = 0x0080u16;
    cpu.regs.set_segment(Segment::DS, psp::PSP_SEGMENT);
    cpu.regs.set_r16(Reg16::DX, dta_off);
    cpu.regs.set_r8(Reg8::AH, 0x1A);
    dos.int21(&mut cpu, &mut mem, &mut io, &mut run);

    let mut record = [b' '; 128];
    record[..5].copy_from_slice(b"HELLO");
    mem.write(psp::PSP_SEGMENT, dta_off, &record);

    cpu.regs.set_r16(Reg16::DX, fcb_off);
    dos.sequential_write(&mut cpu, &mut mem);
    assert_eq!(cpu.regs.get_r8(Reg8::AL), 0);
    assert_eq!(fcb::current_record(&mem, fcb::FcbPointer { segment: psp::PSP_SEGMENT, offset: fcb_off }), 1);

    // close
    cpu.regs.set_r8(Reg8::AH, 0x10);
    dos.int21(&mut cpu, &mut mem, &mut io, &mut run);
    assert_eq!(cpu.regs.get_r8(Reg8::AL), 0);

    // reopen: record number resets to 0
    cpu.regs.set_r8(Reg8::AH, 0x0F);
    dos.int21(&mut cpu, &mut mem, &mut io, &mut run);
    assert_eq!(cpu.regs.get_r8(Reg8::AL), 0);
    assert_eq!(fcb::current_record(&mem, fcb::FcbPointer { segment: psp::PSP_SEGMENT, offset: fcb_off }), 0);

    // re-set the DTA (a fresh FCB open doesn't disturb it, but clear the
    // buffer to prove the read actually repopulates it)
    mem.write(psp::PSP_SEGMENT, dta_off, &[0u8; 128]);

    cpu.regs.set_r8(Reg8::AH, 0x14);
    dos.int21(&mut cpu, &mut mem, &mut io, &mut run);
    assert_eq!(cpu.regs.get_r8(Reg8::AL), 0);
    let readback = mem.read(psp::PSP_SEGMENT, dta_off, 128);
    assert_eq!(&readback[..5], b"HELLO");

    std::env::set_current_dir(&original_cwd).unwrap();
}
