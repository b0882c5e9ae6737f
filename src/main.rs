//! CLI entry point: `racterbox <image-path> [-d]`. Adapted from
//! `frontend/src/bin/frontend-main.rs`'s `App::new(...).arg(Arg::with_name
//! (...))` builder idiom, stripped of every SDL2/video argument this
//! emulator has no use for.

use clap::{App, Arg};

use racterbox::error::exit_code;
use racterbox::Emulator;

fn main() {
    let matches = App::new("racterbox")
        .version("0.0.1")
        .about("Minimal 16-bit real-mode x86 + MS-DOS emulator for a single conversational text program")
        .arg(
            // Left non-required so a missing argument falls through to our
            // own exit_code::MISSING_ARGUMENT below rather than clap's
            // own default exit status.
            Arg::with_name("INPUT")
                .help("Path to the COM or EXE image to run")
                .index(1),
        )
        .arg(
            Arg::with_name("DEBUG")
                .help("Enables verbose per-instruction tracing to stderr")
                .short("d")
                .long("debug"),
        )
        .get_matches();

    let path = match matches.value_of("INPUT") {
        Some(p) => p,
        None => {
            eprintln!("racterbox: missing image path");
            std::process::exit(exit_code::MISSING_ARGUMENT);
        }
    };
    let debug = matches.is_present("DEBUG");

    racterbox::host_io::set_stdin_nonblocking();

    let mut emulator = match Emulator::new(debug) {
        Ok(e) => e,
        Err(err) => {
            eprintln!("racterbox: {}", err);
            std::process::exit(exit_code::ALLOC_FAILURE);
        }
    };

    if let Err(err) = emulator.load(path) {
        eprintln!("racterbox: {}", err);
        std::process::exit(exit_code::LOAD_FAILURE);
    }

    // Watchdog termination is logged to stderr by `Emulator::run` itself but
    // still exits 0.
    emulator.run();
    std::process::exit(exit_code::OK);
}
