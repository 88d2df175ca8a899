use clap::{Parser, Subcommand};
use edgeship::cli::run::WatchTarget;
use edgeship::config::load_or_default;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "edgeship")]
#[command(about = "Ships CloudFront access logs to CloudWatch Logs", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// AWS region, overrides the config file.
    #[arg(long, global = true, env = "AWS_REGION")]
    region: Option<String>,

    /// Log level used when RUST_LOG is unset.
    #[arg(
        long,
        short = 'v',
        global = true,
        default_value = "info",
        value_parser = ["trace", "debug", "info", "warn", "error"]
    )]
    verbosity: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover tagged distributions and ship the logs of all of them
    #[command(alias = "discover-watch")]
    Run,
    /// Print the distributions tagged for log shipping as JSON
    Discover,
    /// Ship the logs of one distribution
    Watch {
        #[arg(long, short = 'd')]
        distribution: String,
        /// Log group, derived from the log object key when omitted
        #[arg(long, short = 'g')]
        group: Option<String>,
        /// Log stream, defaults to <stream_prefix>-<distribution>
        #[arg(long, short = 's')]
        stream: Option<String>,
    },
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    Version,
}

#[derive(Subcommand)]
enum ConfigAction {
    Init {
        #[arg(long)]
        stdout: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("edgeship={}", cli.verbosity).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match &cli.command {
        Some(Commands::Version) => {
            println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init { stdout } => {
                edgeship::cli::config::init(*stdout)?;
                return Ok(());
            }
        },
        _ => {}
    }

    let mut config = load_or_default(cli.config.as_deref())?;
    if let Some(region) = cli.region {
        config.aws.region = region;
    }

    match cli.command {
        Some(Commands::Discover) => edgeship::cli::discover::discover(&config).await?,
        Some(Commands::Watch {
            distribution,
            group,
            stream,
        }) => {
            let target = WatchTarget {
                distribution,
                group,
                stream,
            };
            edgeship::cli::run::watch_distribution(&config, target).await?
        }
        _ => edgeship::cli::run::discover_watch(&config).await?,
    }

    Ok(())
}
