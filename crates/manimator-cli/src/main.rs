use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;

use manimator_core::sandbox::docker::DockerRuntime;
use manimator_core::{ManimatorConfig, RenderPipeline};

#[derive(Parser, Debug)]
#[clap(
    name = "manimator",
    version = "0.1.0",
    about = "Render sandboxed animation snippets from the command line"
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    #[clap(long, short, help = "Path to a TOML configuration file")]
    config: Option<PathBuf>,

    #[clap(long, short, help = "Log level, overrides the config file setting")]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a message-shaped render request through the sandbox
    Render {
        #[clap(help = "File containing the message text, or - for stdin")]
        input: String,

        #[clap(long, short, default_value = ".", help = "Where attachments are written")]
        out_dir: PathBuf,
    },
    /// Look up the documentation location of a library symbol
    Probe {
        #[clap(help = "Symbol to look up, e.g. Square or Square.rotate")]
        symbol: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ManimatorConfig::from_file(path)
            .await
            .with_context(|| format!("loading {}", path.display()))?,
        None => ManimatorConfig::default(),
    };

    let log_level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    let log_level_filter = log_level.parse().unwrap_or(LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(log_level_filter)
        .init();

    let runtime =
        DockerRuntime::new(&config.sandbox).context("connecting to the Docker daemon")?;
    let pipeline = RenderPipeline::new(runtime, config.sandbox.clone());

    match cli.command {
        Commands::Render { input, out_dir } => {
            let text = read_input(&input)?;
            let response = pipeline
                .render_message(&text)
                .await
                .context("render failed")?;
            println!("{}", response.reply.content);
            for attachment in &response.reply.attachments {
                let path = out_dir.join(&attachment.filename);
                std::fs::write(&path, &attachment.bytes)
                    .with_context(|| format!("writing {}", path.display()))?;
                log::info!("wrote {}", path.display());
            }
        }
        Commands::Probe { symbol } => {
            let reply = pipeline
                .lookup_symbol(&symbol)
                .await
                .context("probe failed")?;
            println!("{}", reply.content);
        }
    }

    Ok(())
}

fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("reading stdin")?;
        Ok(text)
    } else {
        std::fs::read_to_string(input).with_context(|| format!("reading {input}"))
    }
}
