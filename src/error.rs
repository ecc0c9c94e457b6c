use std::path::PathBuf;
use thiserror::Error;

/// Everything that can stop the VM core short of a normal `HALT`.
#[derive(Debug, Error)]
pub enum VmError {
    #[error("failed to load image {path:?}")]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("image {path:?} ends mid-word (odd number of trailing bytes)")]
    ImageTooShort { path: PathBuf },

    #[error("undefined opcode {opcode:#04x} executed at pc={pc:#06x}")]
    UndefinedOpcode { opcode: u8, pc: u16 },

    #[error("program counter overflowed past 0xffff")]
    PcOverflow,

    #[error("interrupted by signal")]
    Interrupted,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
