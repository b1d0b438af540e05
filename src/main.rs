//! A minimal harness, not a full front-end: parses just enough of argv to
//! boot a `Dreamcast`, then drives the root loop with `NullExecutor` since
//! this crate does not ship an SH-4 instruction decoder. A real front end
//! (GUI, audio, JIT) wires its own `Sh4Executor` and calls the library
//! directly instead of running this binary.

use std::time::Duration;

use washdc_core::dreamcast::{BootConfig, BootMode, NullExecutor};
use washdc_core::{Dreamcast, WashResult};

const CYCLES_PER_TICK: u64 = 200_000;

fn parse_args() -> BootConfig {
    let mut config = BootConfig::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-b" | "--bios" => config.bios_path = args.next(),
            "-f" | "--flash" => config.flash_path = args.next(),
            "-u" | "--direct" => {
                config.boot_mode = BootMode::Direct;
                config.ip_bin_path = args.next();
            }
            "-t" | "--trace" => {
                config.enable_trace = true;
                config.trace_path = args.next();
            }
            "-g" | "--gdb" => config.enable_debugger = true,
            other => log::warn!("ignoring unrecognized argument {:?}", other),
        }
    }
    config
}

fn run() -> WashResult<()> {
    let config = parse_args();
    log::info!("booting in {:?} mode", config.boot_mode);
    let mut dc = Dreamcast::new(&config)?;
    let mut exec = NullExecutor;

    loop {
        dc.run_until(dc.now() + CYCLES_PER_TICK, &mut exec);
        for op in dc.drain_gfx_ops() {
            log::trace!("gfx-il: {:?}", op);
        }
        if config.headless && dc.now() > CYCLES_PER_TICK * 10 {
            break;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    Ok(())
}

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
