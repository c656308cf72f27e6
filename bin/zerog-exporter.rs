use std::{collections::HashMap, path::PathBuf};

use clap::Parser;
use dirs::home_dir;
use eyre::Result;
use figment::{providers::Serialized, value::Value};

use zerog_exporter::{config::Config, runner::Runner, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::new(&cli.config_path(), cli.as_provider())?;

    let _guard = telemetry::init(cli.verbose, &config.logging)?;
    tracing::info!(target: "exporter", "monitoring {} chain(s)", config.chains.len());

    let runner = Runner::from_config(config);
    if cli.once {
        for observation in runner.run_once().await? {
            println!("{observation}");
        }
        return Ok(());
    }

    runner.run().await
}

#[derive(Parser)]
#[clap(version, about = "Prometheus exporter for 0G chain validators")]
pub struct Cli {
    /// Config file, YAML or TOML
    #[clap(short, long)]
    config: Option<PathBuf>,
    /// Address the metrics endpoint binds to
    #[clap(short, long)]
    listen_address: Option<String>,
    /// Seconds between scrapes
    #[clap(short, long)]
    metrics_interval: Option<u64>,
    /// Log at debug level
    #[clap(short, long)]
    verbose: bool,
    /// Scrape once, print the metrics and exit
    #[clap(long)]
    once: bool,
}

impl Cli {
    /// The `--config` path, else `./config.yml`, else `~/.zerog-exporter/config.yml`.
    pub fn config_path(&self) -> PathBuf {
        if let Some(path) = &self.config {
            return path.clone();
        }

        let local = PathBuf::from("config.yml");
        if local.exists() {
            return local;
        }

        home_dir()
            .map(|home| home.join(".zerog-exporter/config.yml"))
            .unwrap_or(local)
    }

    pub fn as_provider(&self) -> Serialized<HashMap<&str, Value>> {
        let mut user_dict = HashMap::new();

        if let Some(listen_address) = &self.listen_address {
            user_dict.insert("listen_address", Value::from(listen_address.clone()));
        }

        if let Some(metrics_interval) = self.metrics_interval {
            user_dict.insert("metrics_interval", Value::from(metrics_interval));
        }

        Serialized::from(user_dict, "default".to_string())
    }
}
