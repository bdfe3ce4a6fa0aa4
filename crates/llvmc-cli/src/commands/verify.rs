//! Verify command - parse an IR file and run the module verifier

use crate::session::Session;
use anyhow::{bail, Result};
use llvmc_runtime::llvm::{AsContext, NativeError};
use std::path::Path;

pub fn run(session: &Session, file: &Path) -> Result<()> {
    super::ensure_readable(file)?;
    let llvm = session.runtime()?;
    let context = llvm.create_context()?;
    let module = context.parse_ir_file(file)?;

    match module.verify() {
        Ok(()) => {
            println!("{}: module is valid", file.display());
            Ok(())
        }
        Err(NativeError::Failed { message, .. }) => {
            // Verbatim: the verifier's text is the diagnostic
            eprint!("{}", message.unwrap_or_default());
            bail!("{}: verification failed", file.display())
        }
        Err(other) => Err(other.into()),
    }
}
