//! Top-level driver: owns the whole guest state and runs the fetch/execute
//! loop with the liveness watchdog. Adapted from
//! `dustbox::machine::Machine`, collapsed from its component-list/GPU/PIC
//! topology to the single `Memory` + `Cpu` + `Dos` + `HostIo` quartet this
//! emulator's narrower personality needs.

use crate::cpu::{Cpu, StepOutcome};
use crate::dos::Dos;
use crate::error::EmulatorError;
use crate::host_io::HostIo;
use crate::loader;
use crate::memory::Memory;
use crate::register::{Reg8, Segment};

/// Instructions the watchdog tolerates as "unrecognized but probably just
/// idling" before it starts scanning for a way out.
const WATCHDOG_THRESHOLD: u32 = 10_000;
/// How far forward the watchdog scans for a recovery point.
const WATCHDOG_SCAN_WINDOW: u16 = 100;
/// Iteration count past which the main loop starts yielding the host CPU,
/// so a stuck (but not yet watchdog-triggering) guest doesn't spin a host
/// core at 100%.
const THROTTLE_THRESHOLD: u32 = 100;

/// AH selectors that read a console character. When one of these runs
/// while the prompt-detection gate is still closed, the guest is almost
/// certainly polling for input ahead of the program's next prompt, so the
/// main loop throttles itself rather than spinning the host CPU on it.
const INPUT_SELECTORS: [u8; 4] = [0x01, 0x06, 0x07, 0x08];

pub struct Emulator {
    pub mem: Memory,
    pub cpu: Cpu,
    pub dos: Dos,
    pub io: HostIo,
    pub debug: bool,
    run: bool,
}

impl Emulator {
    pub fn new(debug: bool) -> Result<Self, EmulatorError> {
        let mem = Memory::try_new().map_err(|_| EmulatorError::AllocFailed)?;
        Ok(Emulator {
            mem,
            cpu: Cpu::new(),
            dos: Dos::new(debug),
            io: HostIo::new(),
            debug,
            run: true,
        })
    }

    pub fn load(&mut self, path: &str) -> Result<(), EmulatorError> {
        loader::load(path, &mut self.mem, &mut self.cpu)
    }

    fn trace_step(&self) {
        if self.debug {
            eprintln!(
                "[{:04X}:{:04X}] ax={:04X} bx={:04X} cx={:04X} dx={:04X} flags={:04X}",
                self.cpu.regs.get_segment(Segment::CS),
                self.cpu.regs.ip,
                self.cpu.regs.get_r16(crate::register::Reg16::AX),
                self.cpu.regs.get_r16(crate::register::Reg16::BX),
                self.cpu.regs.get_r16(crate::register::Reg16::CX),
                self.cpu.regs.get_r16(crate::register::Reg16::DX),
                self.cpu.regs.flags.word(),
            );
        }
    }

    /// Runs until the guest exits (INT 20h or AH=4C) or the watchdog gives
    /// up. Returns `true` on a clean guest exit.
    pub fn run(&mut self) -> bool {
        let mut cycles_without_io = 0u32;

        while self.run {
            self.trace_step();
            match self.cpu.step(&mut self.mem) {
                StepOutcome::Executed => {
                    cycles_without_io = 0;
                }
                StepOutcome::Interrupt(0x20) => {
                    self.run = false;
                    cycles_without_io = 0;
                }
                StepOutcome::Interrupt(0x21) => {
                    self.dos.int21(&mut self.cpu, &mut self.mem, &mut self.io, &mut self.run);
                    cycles_without_io = 0;
                    self.throttle_if_awaiting_prompt();
                }
                StepOutcome::Interrupt(other) => {
                    if self.debug {
                        eprintln!("[int{:02X}] unrecognized interrupt, ignored", other);
                    }
                    cycles_without_io = 0;
                }
                StepOutcome::Unrecognized => {
                    cycles_without_io += 1;
                }
            }

            if cycles_without_io > WATCHDOG_THRESHOLD {
                if self.scan_for_int21() {
                    cycles_without_io = 0;
                } else {
                    eprintln!("racterbox: program appears stuck, terminating");
                    return false;
                }
            } else if cycles_without_io > THROTTLE_THRESHOLD {
                std::thread::sleep(std::time::Duration::from_millis(1));
            }
        }

        true
    }

    /// Sleeps briefly if the instruction just dispatched was a console-read
    /// selector (including one AH=0C redispatched into, since that leaves
    /// AH holding the sub-function) and the prompt-detection gate is still
    /// closed, so a guest busy-polling for input before its next prompt
    /// doesn't spin the host CPU at 100%.
    fn throttle_if_awaiting_prompt(&self) {
        let ah = self.cpu.regs.get_r8(Reg8::AH);
        if !self.io.input_enabled && INPUT_SELECTORS.contains(&ah) {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
    }

    /// Scans forward from CS:IP for the next `CD 21` byte pair within
    /// `WATCHDOG_SCAN_WINDOW` bytes and, if found, resumes execution there.
    /// This is a best-effort liveness recovery, not a decoder: it looks for
    /// the raw bytes, not a validated instruction boundary.
    fn scan_for_int21(&mut self) -> bool {
        let cs = self.cpu.regs.get_segment(Segment::CS);
        let window = self.mem.read(cs, self.cpu.regs.ip, WATCHDOG_SCAN_WINDOW as usize + 1);
        for i in 0..window.len().saturating_sub(1) {
            if window[i] == 0xCD && window[i + 1] == 0x21 {
                self.cpu.regs.ip = self.cpu.regs.ip.wrapping_add(i as u16);
                return true;
            }
        }
        false
    }
}
