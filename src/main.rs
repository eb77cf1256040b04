use anyhow::Result;
use clap::Parser;

mod blocklist;
mod cli;
mod commands;
mod config;
mod discovery;
mod error;
mod filter;
mod notify;
mod platform;
mod policy;
mod registry;
mod service;
mod state;
mod store;
mod worker;

use cli::Args;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    commands::run_command(args)
}
