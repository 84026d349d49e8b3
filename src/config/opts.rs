use std::path::PathBuf;
use structopt::StructOpt;
use structopt::clap::ErrorKind;

/// Command-line options for the task daemon.
///
/// Examples:
/// - Run with a specific config file:
///   cargo run -- --config config.toml
/// - Inspect the durable task store and exit:
///   cargo run -- --config config.toml --list-tasks
/// - Show version:
///   cargo run -- --version
#[derive(StructOpt, Debug)]
pub struct Opts {
    #[structopt(short = "v", long = "version")]
    pub version: bool,

    #[structopt(short, long, help = "Enable debug mode (verbose logging)")]
    pub debug: bool,

    #[structopt(
        short = "c",
        long = "config",
        required_unless = "version",
        help = "Path to the configuration file."
    )]
    pub config: Option<PathBuf>,

    #[structopt(name = "list-tasks", long = "list-tasks", help = "Print the persisted tasks and exit")]
    pub list_tasks: bool,

    #[structopt(
        long = "purge",
        conflicts_with = "list-tasks",
        help = "Remove every persisted task and exit"
    )]
    pub purge: bool,
}

impl Opts {
    /// Parse CLI arguments. If parsing fails, print the error and the full help, then exit.
    pub fn from_args() -> Self {
        let app = Opts::clap();
        match app.get_matches_safe() {
            Ok(m) => Opts::from_clap(&m),
            Err(e) => {
                let kind = e.kind;
                eprintln!("{}", e);
                let mut app = Opts::clap();
                eprintln!();
                let _ = app.print_long_help();
                eprintln!();
                std::process::exit(match kind {
                    ErrorKind::HelpDisplayed | ErrorKind::VersionDisplayed => 0,
                    _ => 2,
                });
            }
        }
    }
}
