//! Config command - print the effective configuration

use crate::session::Session;
use anyhow::Result;

pub fn run(session: &Session) -> Result<()> {
    for source in &session.loaded.sources {
        println!("# from {}", source.display());
    }
    if session.args.library.is_some() {
        println!("# library.path from --library");
    }
    print!("{}", session.config().to_toml()?);
    Ok(())
}
