use anyhow::Result;
use clap::{Arg, Command};

use pgmon::{commands, ui};

fn main() -> Result<()> {
    pgmon::init_logging();

    let matches = Command::new("pgmon")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Samples CPU, memory, disk, network and GPU usage of a process group")
        .disable_version_flag(true)
        .arg(
            Arg::new("version")
                .short('v')
                .short_alias('V')
                .long("version")
                .help("Print version information")
                .action(clap::ArgAction::SetTrue),
        )
        .subcommand(commands::watch::command())
        .subcommand(commands::config::command())
        .get_matches();

    if matches.get_flag("version") {
        println!("pgmon {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let result = match matches.subcommand() {
        Some(("watch", sub_matches)) => commands::watch(sub_matches),
        Some(("config", sub_matches)) => commands::config(sub_matches),
        _ => {
            println!("Use 'pgmon --help' for more information.");
            Ok(())
        }
    };

    if let Err(e) = result {
        ui::error(&format!("Error: {:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
