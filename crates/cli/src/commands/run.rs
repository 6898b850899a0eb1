use anyhow::anyhow;
use clap::Args;
use murk_verification::execute;
use std::path::PathBuf;

#[derive(Args)]
pub struct RunArgs {
    /// Module JSON file
    pub input: PathBuf,
    /// Function to call
    #[arg(short, long)]
    function: String,
    /// Block budget before the run is abandoned
    #[arg(long, default_value_t = 1_000_000)]
    fuel: u64,
    /// Arguments, one per parameter
    #[arg(allow_negative_numbers = true)]
    args: Vec<i64>,
}

impl super::Command for RunArgs {
    fn execute(self) -> anyhow::Result<()> {
        let module = super::load_module(&self.input)?;
        let func = module
            .function(&self.function)
            .ok_or_else(|| anyhow!("no function named {}", self.function))?;
        let outcome = execute(func, &module.globals, &self.args, self.fuel)?;
        tracing::info!("{} returned after {} blocks", func.name, outcome.steps);

        match outcome.ret {
            Some(value) => println!("return {value}"),
            None => println!("return"),
        }
        for ((_, global), value) in module.globals.iter().zip(&outcome.globals) {
            println!("{} = {}", global.name, value);
        }
        Ok(())
    }
}
