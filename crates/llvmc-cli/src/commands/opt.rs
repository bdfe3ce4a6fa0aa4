//! Opt command - run a new pass manager pipeline over an IR file

use crate::session::Session;
use anyhow::{Context as _, Result};
use llvmc_runtime::llvm::{AsContext, PassOptions};
use std::path::PathBuf;

pub struct OptArgs {
    pub file: PathBuf,
    /// Overrides `passes.pipeline`
    pub passes: Option<String>,
    pub output: Option<PathBuf>,
    pub verify_each: bool,
}

pub fn run(session: &Session, args: OptArgs) -> Result<()> {
    super::ensure_readable(&args.file)?;
    let llvm = session.runtime()?;
    let options = pass_options(llvm.options().passes.clone(), &args);

    let context = llvm.create_context()?;
    let module = context.parse_ir_file(&args.file)?;
    log::info!("running '{}' on {}", options.pipeline, args.file.display());
    module
        .run_passes(&options)
        .with_context(|| format!("Pipeline '{}' failed", options.pipeline))?;
    super::emit(&module, args.output.as_deref())
}

fn pass_options(mut options: PassOptions, args: &OptArgs) -> PassOptions {
    if let Some(pipeline) = &args.passes {
        options.pipeline = pipeline.clone();
    }
    options.verify_each |= args.verify_each;
    options
}
