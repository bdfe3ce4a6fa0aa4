pub mod config;
pub mod opt;
pub mod print;
pub mod probe;
pub mod verify;

use anyhow::{Context, Result};
use llvmc_runtime::llvm::Module;
use std::fs;
use std::path::Path;

/// Print `module` to `output`, or to stdout when there is none
pub(crate) fn emit(module: &Module<'_>, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => module
            .print_to_file(path)
            .with_context(|| format!("Failed to write {}", path.display())),
        None => {
            print!("{}", module.print_to_string()?);
            Ok(())
        }
    }
}

/// Fail early with a readable message instead of a native one
pub(crate) fn ensure_readable(file: &Path) -> Result<()> {
    fs::metadata(file)
        .map(|_| ())
        .with_context(|| format!("Failed to read IR file: {}", file.display()))
}
