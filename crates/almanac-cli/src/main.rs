use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use almanac_etl::Config;

mod commands;
mod logging;

#[derive(Debug, Parser)]
#[command(name = "almanac", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log at debug level regardless of the configured level
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Harvest arts-related "On This Day" facts for one day
    ///
    /// Fetches the Wikipedia "On This Day" feed for the requested buckets,
    /// then asks Wikidata which of the referenced entities are works,
    /// organizations or people in the arts:
    ///
    /// - music (songs, albums, bands, musicians)
    /// - film_tv (films, series, studios, actors, directors)
    /// - books (literary works, publishers, writers)
    /// - performance (paintings, plays, dance, venues, visual artists)
    /// - awards (arts awards and ceremonies)
    ///
    /// Each entity becomes at most one record, even when several buckets
    /// mention it. If Wikidata classifies nothing at all, page titles and
    /// descriptions are matched against keyword lists instead.
    ///
    /// Output: one JSON array (or CSV table) written to
    /// <out-dir>/<MM-DD>.json, or to standard output with --stdout.
    ///
    /// Wikimedia asks automated clients to identify themselves. Set
    /// user_agent_contact in the config file or ALMANAC_USER_AGENT_CONTACT.
    Harvest(commands::harvest::HarvestArgs),

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, clap::Subcommand)]
enum ConfigAction {
    /// Show the effective configuration (file, environment and defaults)
    Show,
    /// Print the config file path
    Path,
    /// Print an example config file
    Example,
    /// Create the config file with commented defaults
    Init,
    /// Print one setting, or the raw config file when no key is given
    Get {
        /// Setting name, e.g. max_batch_size or logging.level
        key: Option<String>,
    },
    /// Change one setting in the config file
    Set {
        /// Setting name, e.g. backend or logging.level
        key: String,
        /// New value
        value: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Harvest(args) => {
            let config = Config::load()?;
            logging::init(&config.logging, cli.debug)?;
            commands::run_harvest(config, &args).await
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config::show_config(),
            ConfigAction::Path => commands::config::show_path(),
            ConfigAction::Example => commands::config::show_example(),
            ConfigAction::Init => commands::config::init_config(),
            ConfigAction::Get { key } => commands::config::get_config(key.as_deref()),
            ConfigAction::Set { key, value } => commands::config::set_config(&key, &value),
        },
    }
}
