//! Build script generating manual pages from the CLI definition.

use std::{fs, path::Path, path::PathBuf};

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli.rs"]
mod cli;

fn render(cmd: clap::Command, out: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut buf: Vec<u8> = Vec::new();
    Man::new(cmd).render(&mut buf)?;
    fs::write(out, buf)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=src/cli.rs");

    let out_dir = PathBuf::from("target/generated-man");
    fs::create_dir_all(&out_dir)?;

    let cmd = cli::Cli::command();
    for sub in cmd.get_subcommands() {
        let name = format!("wsbridge-{}", sub.get_name());
        render(sub.clone().name(name.clone()), &out_dir.join(format!("{name}.1")))?;
    }
    render(cmd, &out_dir.join("wsbridge.1"))?;

    Ok(())
}
