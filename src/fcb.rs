//! File Control Block handling: composing DOS 8.3 filenames from an
//! in-guest FCB, and the fixed 16-slot handle table that maps a FCB's guest
//! address to an open host file. Grounded directly on
//! `msdos_improved.c`'s `mkfilename()`, `find_fcb()` and `open_file()` —
//! `dustbox::dos::DOS` has no FCB support at all (it keys host handles by a
//! DOS handle number in a `HashMap`, not by FCB identity), so there is no
//! existing file to adapt for this part and it is built from the C source
//! directly.

use std::fs::{File, OpenOptions};
use std::io;

use crate::memory::Memory;

/// Identifies a guest-side FCB by its (segment, offset) address. Two FCBs
/// are "the same" exactly when this pair matches.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FcbPointer {
    pub segment: u16,
    pub offset: u16,
}

/// Drive code DOS reports in an opened FCB. `msdos_improved.c` always
/// reports drive 3 regardless of the host filesystem; racterbox matches
/// this rather than trying to simulate drive letters.
const REPORTED_DRIVE: u8 = 3;
const DEFAULT_RECORD_SIZE: u16 = 128;

/// Reads the 8-byte name and 3-byte extension out of an unopened FCB and
/// composes `"NAME.EXT"`, trimming trailing spaces. Ports
/// `mkfilename()`'s exact rule: no dot is emitted when the extension is
/// empty.
pub fn compose_filename(mem: &Memory, fcb: FcbPointer) -> String {
    let name_bytes = mem.read(fcb.segment, fcb.offset + 1, 8);
    let ext_bytes = mem.read(fcb.segment, fcb.offset + 9, 3);

    let name: String = name_bytes
        .iter()
        .take_while(|&&b| b != b' ')
        .map(|&b| b as char)
        .collect();
    let ext: String = ext_bytes
        .iter()
        .take_while(|&&b| b != b' ')
        .map(|&b| b as char)
        .collect();

    if ext.is_empty() {
        name
    } else {
        format!("{}.{}", name, ext)
    }
}

/// One occupied slot in the handle table: which guest FCB owns it, and the
/// host file backing it.
pub struct FcbHandle {
    pub fcb: FcbPointer,
    pub file: File,
}

/// Fixed 16-slot table. A slot's identity is the guest FCB
/// pointer that created it.
pub struct FcbTable {
    slots: [Option<FcbHandle>; 16],
}

impl FcbTable {
    pub fn new() -> Self {
        FcbTable {
            slots: Default::default(),
        }
    }

    fn find_index(&self, fcb: FcbPointer) -> Option<usize> {
        self.slots.iter().position(|s| matches!(s, Some(h) if h.fcb == fcb))
    }

    fn first_empty(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.is_none())
    }

    pub fn get(&self, fcb: FcbPointer) -> Option<&FcbHandle> {
        self.find_index(fcb).and_then(|i| self.slots[i].as_ref())
    }

    pub fn get_mut(&mut self, fcb: FcbPointer) -> Option<&mut FcbHandle> {
        let idx = self.find_index(fcb)?;
        self.slots[idx].as_mut()
    }

    /// Opens (or creates) the host file named by `fcb`'s NAME.EXT fields
    /// and stores it under a slot keyed by `fcb`'s address. Mirrors
    /// `open_file()`: on open, an existing slot for this FCB is reused if
    /// present, read/write is tried first and falls back to read-only; on
    /// create, a fresh/truncated file always replaces any existing slot.
    pub fn open(&mut self, mem: &Memory, fcb: FcbPointer, create: bool) -> io::Result<()> {
        let filename = compose_filename(mem, fcb);

        let file = if create {
            OpenOptions::new().read(true).write(true).create(true).truncate(true).open(&filename)?
        } else {
            match OpenOptions::new().read(true).write(true).open(&filename) {
                Ok(f) => f,
                Err(_) => File::open(&filename)?,
            }
        };

        let slot = if let Some(idx) = self.find_index(fcb) {
            idx
        } else {
            self.first_empty().ok_or_else(|| io::Error::new(io::ErrorKind::Other, "no free FCB slot"))?
        };
        self.slots[slot] = Some(FcbHandle { fcb, file });
        Ok(())
    }

    /// Closes and frees the slot for `fcb`. Returns `true` if one existed.
    pub fn close(&mut self, fcb: FcbPointer) -> bool {
        match self.find_index(fcb) {
            Some(idx) => {
                self.slots[idx] = None;
                true
            }
            None => false,
        }
    }
}

pub const REPORTED_DRIVE_BYTE: u8 = REPORTED_DRIVE;
pub const DEFAULT_RECORD_SIZE_BYTES: u16 = DEFAULT_RECORD_SIZE;

/// Field offsets within a guest FCB, ported field-for-field from
/// `msdos_improved.c`'s `fcb__s` (drive/name/ext/cblock/recsize/size/
/// date/time/rsvp0/crecnum/relrec). The guest-allocated FCB block itself
/// is the conventional 37-byte extended form; only the offsets
/// below are ever touched.
pub mod offset {
    pub const DRIVE: u16 = 0;
    pub const NAME: u16 = 1;
    pub const EXT: u16 = 9;
    pub const CURRENT_BLOCK: u16 = 12;
    pub const RECORD_SIZE: u16 = 14;
    pub const FILE_SIZE: u16 = 16;
    pub const CURRENT_RECORD: u16 = 26;
}

/// Fills in the fields DOS sets on a successful FCB open/create (AH=0F/
/// 0x16): block 0, the fixed 128-byte record size, record number 0, and
/// the reported drive/file size.
pub fn set_opened_fields(mem: &mut Memory, fcb: FcbPointer, file_size: u32) {
    mem.write_u8(fcb.segment, fcb.offset + offset::DRIVE, REPORTED_DRIVE);
    mem.write_u16(fcb.segment, fcb.offset + offset::CURRENT_BLOCK, 0);
    mem.write_u16(fcb.segment, fcb.offset + offset::RECORD_SIZE, DEFAULT_RECORD_SIZE);
    mem.write_u32(fcb.segment, fcb.offset + offset::FILE_SIZE, file_size);
    mem.write_u8(fcb.segment, fcb.offset + offset::CURRENT_RECORD, 0);
}

pub fn record_size(mem: &Memory, fcb: FcbPointer) -> u16 {
    mem.read_u16(fcb.segment, fcb.offset + offset::RECORD_SIZE)
}

pub fn current_record(mem: &Memory, fcb: FcbPointer) -> u8 {
    mem.read_u8(fcb.segment, fcb.offset + offset::CURRENT_RECORD)
}

pub fn set_current_record(mem: &mut Memory, fcb: FcbPointer, value: u8) {
    mem.write_u8(fcb.segment, fcb.offset + offset::CURRENT_RECORD, value);
}
