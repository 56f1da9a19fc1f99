//! Typed error hierarchy for every stage of the VM: loading, linking, and execution.
//!
//! Each stage gets its own `thiserror`-derived enum rather than one grab-bag type, mirroring how
//! errors surface in the reference implementation: a malformed chunk is a different kind of problem
//! than a failed import, which is different again from a divide-by-zero trap during execution.

use thiserror::Error;

/// Errors raised while parsing object bytes into chunks (the Object Reader).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("unrecognized object format")]
    UnknownFormat,

    #[error("unexpected end of data at offset {offset} (needed {needed} more bytes)")]
    UnexpectedEof { offset: usize, needed: usize },

    #[error("a string at offset {offset} in {chunk} chunk is not NUL-terminated")]
    UnterminatedString { chunk: &'static str, offset: usize },

    #[error("library name at offset {offset} is not NUL-terminated")]
    UnterminatedLibraryName { offset: usize },

    #[error("chunk size {size} is not a multiple of the expected record size {record_size}")]
    MisalignedChunk { size: usize, record_size: usize },

    #[error("script {number} not found")]
    ScriptNotFound { number: i32 },

    #[error("function index {index} out of range (table size {size})")]
    FunctionIndexOutOfRange { index: usize, size: usize },

    #[error("chunk at offset {offset} declares size {size}, overrunning the {data_len}-byte object")]
    ChunkOverrun { offset: usize, size: usize, data_len: usize },
}

/// Errors raised while resolving cross-module imports (the Linker).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("module `{importer}` importing an unknown module (`{imported}`)")]
    UnknownModule { importer: String, imported: String },

    #[error("failed to import `{name}` variable")]
    VariableNotFound { name: String },

    #[error("failed to import `{name}` function")]
    FunctionNotFound { name: String },
}

/// Fatal errors raised during interpretation; these unwind the run loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    #[error("division by zero in script {script}")]
    DivideByZero { script: i32 },

    #[error("modulo by zero in script {script}")]
    ModuloByZero { script: i32 },

    #[error("attempting to pop() empty stack")]
    StackUnderflow,

    #[error("invalid function index {index}")]
    InvalidFunctionIndex { index: i32 },

    #[error("invalid map variable index {index}")]
    InvalidMapVarIndex { index: i32 },

    #[error("unknown opcode {opcode:#04x}")]
    UnknownOpcode { opcode: u16 },

    #[error("RETURN from an empty call stack")]
    ReturnFromEmptyCallStack,

    #[error("compound map-array assignment is not implemented")]
    MapArrayCompoundUnimplemented,

    #[error("print directive not implemented: {name}")]
    PrintNotImplemented { name: &'static str },

    #[error("instruction pointer {ip} out of bounds for module of size {size}")]
    IpOutOfBounds { ip: usize, size: usize },

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Link(#[from] LinkError),
}

impl VmError {
    /// Log-correlation category for structured log fields.
    pub fn category(&self) -> &'static str {
        match self {
            VmError::DivideByZero { .. } | VmError::ModuloByZero { .. } => "arithmetic",
            VmError::StackUnderflow => "stack",
            VmError::InvalidFunctionIndex { .. } | VmError::ReturnFromEmptyCallStack => "call",
            VmError::InvalidMapVarIndex { .. } => "variable",
            VmError::UnknownOpcode { .. } => "opcode",
            VmError::MapArrayCompoundUnimplemented | VmError::PrintNotImplemented { .. } => {
                "unimplemented"
            }
            VmError::IpOutOfBounds { .. } => "bounds",
            VmError::Load(_) => "load",
            VmError::Link(_) => "link",
        }
    }
}

/// Errors out of the `clap`/config layer.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("no object file specified")]
    MissingObjectFile,

    #[error("failed to read `{path}`: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors reading/parsing the optional TOML config overlay.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file `{path}`: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "config")]
    #[error("failed to parse config file `{path}`: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

pub type LoadResult<T> = std::result::Result<T, LoadError>;
pub type LinkResult<T> = std::result::Result<T, LinkError>;
pub type VmResult<T> = std::result::Result<T, VmError>;
pub type Result<T, E = VmError> = std::result::Result<T, E>;
