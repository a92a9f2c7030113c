use clap::{
    CommandFactory, Parser, Subcommand,
    builder::{
        Styles,
        styling::{AnsiColor, Effects},
    },
};
use clap_complete::{Shell, generate};

use spotiplayer::{cli, config, error, spotify::transport::ControlParams};

fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::White.on_default() | Effects::BOLD)
        .usage(AnsiColor::White.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightBlue.on_default())
        .placeholder(AnsiColor::BrightGreen.on_default())
}

#[derive(Parser, Debug, Clone)]
#[clap(
  version = env!("CARGO_PKG_VERSION"),
  name=env!("CARGO_PKG_NAME"),
  bin_name=env!("CARGO_PKG_NAME"),
  author=env!("CARGO_PKG_AUTHORS"),
  about=env!("CARGO_PKG_DESCRIPTION"),
  styles=styles(),
)]
struct Cli {
    /// Print diagnostic output
    #[clap(long, short, global = true)]
    verbose: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Authorize with Spotify API
    Auth,

    /// Follow the current track and player state live
    Watch,

    /// Show what is playing right now
    Status,

    /// Control playback on the active device
    Control(ControlOptions),

    /// Read or change the config file
    Config(ConfigOptions),

    /// Get shell completions
    Completions(CompletionsOption),
}

#[derive(Parser, Debug, Clone)]
pub struct ControlOptions {
    /// One of play, pause, next, previous, seek, volume, shuffle, repeat
    pub action: String,

    /// Target position for `seek`, in milliseconds
    #[clap(long)]
    pub position_ms: Option<u64>,

    /// Volume for `volume`, 0 to 100
    #[clap(long)]
    pub volume: Option<u64>,

    /// State for `shuffle` (true/false) or `repeat` (off/track/context)
    #[clap(long)]
    pub state: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct ConfigOptions {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Print a value by dotted key, or the whole config
    Get { key: Option<String> },

    /// Set a value by dotted key; the value is parsed as JSON when possible
    Set { key: String, value: String },

    /// Print the config file location
    Path,

    /// Restore defaults, keeping client credentials and the refresh token
    Reset,
}

#[derive(Parser, Debug, Clone)]
pub struct CompletionsOption {
    shell: Shell,
}

#[tokio::main]
async fn main() {
    if let Err(e) = config::load_env().await {
        error!("Cannot load environment. Err: {}", e);
    }

    let cli = Cli::parse();
    if cli.verbose {
        spotiplayer::set_verbose(true);
    }

    match cli.command {
        Command::Auth => cli::auth().await,
        Command::Watch => cli::watch().await,
        Command::Status => cli::status().await,
        Command::Control(opt) => {
            let params = ControlParams {
                position_ms: opt.position_ms,
                volume_percent: opt.volume,
                state: opt.state,
            };
            cli::control(&opt.action, params).await
        }
        Command::Config(opt) => match opt.command {
            ConfigSubcommand::Get { key } => cli::config_get(key).await,
            ConfigSubcommand::Set { key, value } => cli::config_set(key, value).await,
            ConfigSubcommand::Path => cli::config_path().await,
            ConfigSubcommand::Reset => cli::config_reset().await,
        },
        Command::Completions(opt) => {
            let mut cmd = Cli::command_for_update();
            let name = cmd.get_name().to_string();
            generate(opt.shell, &mut cmd, name, &mut std::io::stdout())
        }
    }
}
