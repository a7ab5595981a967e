//! shellrun controller CLI - turn assembly or shellcode into running processes

mod cli;
mod commands;
mod input;
mod logging;
mod runner;

use clap::Parser;
use cli::{Cli, Commands};
use console::style;
use runner::{RunConfig, run_shellcode};
use shellrun::Cleanup;

fn main() {
    let cli = Cli::parse();

    logging::init_logger(cli.verbose);

    let config = match cli.context_config() {
        Ok(config) => config,
        Err(e) => fail(e.into()),
    };

    let result = match cli.command {
        Commands::Asm { text } => commands::assemble(&text, &config, cli.json),
        Commands::Elf { input, output } => commands::write_elf(&input, &output, &config, cli.json),
        Commands::Check => commands::check_toolchains(cli.json),
        Commands::Run {
            input,
            wait,
            keep: _,
            cleanup,
            staging_dir,
            args,
        } => {
            let run = RunConfig {
                input,
                context: config,
                wait,
                cleanup: if cleanup { Cleanup::OnDrop } else { Cleanup::Keep },
                staging_dir,
                args,
                json: cli.json,
            };
            match run_shellcode(run) {
                Ok(code) => std::process::exit(code),
                Err(e) => Err(e),
            }
        }
    };

    if let Err(e) = result {
        fail(e);
    }
}

fn fail(e: Box<dyn std::error::Error>) -> ! {
    eprintln!("{} {}", style("error:").red().bold(), e);
    std::process::exit(1);
}
