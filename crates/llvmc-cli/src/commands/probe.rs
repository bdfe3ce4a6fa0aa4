//! Probe command - bind the library and report what was found

use crate::session::Session;
use anyhow::Result;

pub fn run(session: &Session, json: bool) -> Result<()> {
    let llvm = session.probe_runtime()?;
    let info = llvm.info();
    let native_target = llvm.initialize_native_target().is_ok();

    if json {
        let report = serde_json::json!({
            "library": info,
            "native_target": native_target,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    match &info.path {
        Some(path) => println!("library:       {}", path.display()),
        None => println!("library:       (in-process stub)"),
    }
    println!("version:       {}", info.version);
    println!("symbols:       {}", info.symbols);
    println!(
        "native target: {}",
        if native_target { "available" } else { "unavailable" }
    );
    Ok(())
}
