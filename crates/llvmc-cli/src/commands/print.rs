//! Print command - parse an IR file and print it back

use crate::session::Session;
use anyhow::Result;
use llvmc_runtime::llvm::AsContext;
use std::path::Path;

pub fn run(session: &Session, file: &Path, output: Option<&Path>) -> Result<()> {
    super::ensure_readable(file)?;
    let llvm = session.runtime()?;
    let context = llvm.create_context()?;
    let module = context.parse_ir_file(file)?;
    super::emit(&module, output)
}
