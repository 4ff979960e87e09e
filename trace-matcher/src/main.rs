mod cli;
mod config;
mod error;
mod io;
mod output;
mod run;

use clap::Parser;
use log::error;

use cli::CliArgs;

fn main() {
    env_logger::init();

    let args = CliArgs::parse();
    if let Err(e) = run::command_line_runner(&args) {
        error!("{e}");
        std::process::exit(1);
    }
}
