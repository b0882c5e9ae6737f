//! Host-level startup failures. Guest-observable DOS errors never reach
//! here; they are reported in-band (AL=0xFF / AL=0x01) by `crate::dos`.

quick_error! {
    #[derive(Debug)]
    pub enum EmulatorError {
        OpenFailed(path: String, err: std::io::Error) {
            display("could not open image '{}': {}", path, err)
        }
        BadExeGeometry(detail: String) {
            display("malformed EXE header: {}", detail)
        }
        ComTooLarge(size: usize) {
            display("COM image too large: {} bytes (max 65280)", size)
        }
        AllocFailed {
            display("could not allocate guest memory")
        }
    }
}

/// Exit codes returned by the `racterbox` binary.
pub mod exit_code {
    pub const OK: i32 = 0;
    pub const MISSING_ARGUMENT: i32 = 2;
    pub const ALLOC_FAILURE: i32 = 3;
    pub const LOAD_FAILURE: i32 = 4;
}
