//! Standalone virtual machine for compiled ACS (Action Code Script) object modules: object
//! loading, cross-module linking, cooperative scheduling, and stack-based interpretation.

pub mod builtin;
pub mod call_frame;
pub mod chunk;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod instance;
pub mod interpreter;
pub mod linker;
pub mod loader;
pub mod module;
pub mod object;
pub mod op_code;
pub mod scheduler;
pub mod script_builder;
pub mod vm;

pub use error::{CliError, ConfigError, LinkError, LoadError, VmError};
pub use module::Module;
pub use vm::Vm;

use std::time::Duration;

/// Loads and links every `(name, bytes)` module pair into a fresh [`Vm`], ready for [`run`].
pub fn build_vm(
    named_objects: Vec<(String, Vec<u8>)>,
    tic_duration: Duration,
    verbose: bool,
) -> Result<Vm, VmError> {
    let mut modules = Vec::with_capacity(named_objects.len());
    for (index, (name, bytes)) in named_objects.into_iter().enumerate() {
        modules.push(loader::load_module(name, bytes, index)?);
    }
    linker::link_modules(&mut modules)?;
    Ok(Vm::new(modules, tic_duration, verbose))
}

/// Boots every OPEN script and runs the VM to completion.
pub fn run(vm: &mut Vm) -> Result<(), VmError> {
    scheduler::boot(vm);
    scheduler::run(vm)
}
