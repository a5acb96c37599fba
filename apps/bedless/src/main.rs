//! `bedless`: 命令行 CT 床板去除工具.

use anyhow::Result;
use clap::Parser;
use simple_logger::SimpleLogger;

mod args;
mod runner;

fn main() -> Result<()> {
    let args = args::Args::parse();
    SimpleLogger::new().with_level(args.log_level()).init()?;
    runner::run(&args)
}
