//! washdc-core: the scheduler, tiered memory map, SH-4 execution model and
//! PowerVR2 display pipeline of a Sega Dreamcast system emulator, with the
//! host-facing concerns (GUI, audio, JIT backend, GDB wire server) left to
//! an embedder.

pub mod config;
pub mod debug;
pub mod dreamcast;
pub mod error;
pub mod gfx_il;
pub mod hostfile;
pub mod memory;
pub mod pvr2;
pub mod scheduler;
pub mod sh4;
pub mod trace;

pub use dreamcast::{BootConfig, BootMode, Dreamcast, JitMode, NullExecutor, Sh4Executor};
pub use error::{ErrorKind, WashError, WashResult};
pub use scheduler::CycleStamp;
