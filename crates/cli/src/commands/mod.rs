use anyhow::Context;
use clap::Subcommand;
use murk_core::cfg_ir::Module;
use std::fs;
use std::path::Path;

pub mod cfg;
pub mod obfuscate;
pub mod run;

#[derive(Subcommand)]
pub enum Cmd {
    /// Obfuscate every function of a module
    Obfuscate(obfuscate::ObfuscateArgs),

    /// Write function CFGs as Graphviz to stdout or a file
    Cfg(cfg::CfgArgs),

    /// Run one function through the reference interpreter
    Run(run::RunArgs),
}

pub trait Command {
    fn execute(self) -> anyhow::Result<()>;
}

impl Command for Cmd {
    fn execute(self) -> anyhow::Result<()> {
        match self {
            Cmd::Obfuscate(args) => args.execute(),
            Cmd::Cfg(args) => args.execute(),
            Cmd::Run(args) => args.execute(),
        }
    }
}

/// Reads a JSON-serialized module and checks its structure.
pub fn load_module(path: &Path) -> anyhow::Result<Module> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let module: Module = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a valid module", path.display()))?;
    module
        .verify()
        .map_err(|(function, e)| anyhow::anyhow!("function {function} is malformed: {e}"))?;
    Ok(module)
}

/// Writes `contents` to `output`, or to stdout when no path is given.
pub fn write_output(output: Option<&Path>, contents: &str) -> anyhow::Result<()> {
    match output {
        Some(path) => fs::write(path, contents)
            .with_context(|| format!("failed to write {}", path.display())),
        None => {
            println!("{contents}");
            Ok(())
        }
    }
}
