use std::sync::Arc;

use eyre::{Result, WrapErr};
use futures::future::join_all;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::{
    collector::{Collector, ScrapeReport},
    config::Config,
    cosmos::RpcClient,
    ethereum::{EthereumClient, JwtSecret},
    telemetry::{self, MemorySink, MetricSink, Observation, PrometheusSink},
};

/// Drives the collectors of every configured chain.
pub struct Runner {
    config: Config,
}

impl Runner {
    /// Creates a runner for `config`.
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Serves metrics and scrapes every chain each metrics interval until ctrl-c.
    pub async fn run(&self) -> Result<()> {
        telemetry::init_metrics(&self.config.listen_address)?;
        tracing::info!(target: "exporter::runner", "serving metrics on {}", self.config.listen_address);

        let sink: Arc<dyn MetricSink> = Arc::new(PrometheusSink::default());
        let mut collectors = self.collectors(sink)?;
        let mut shutdown = self.shutdown_on_ctrlc()?;

        let mut interval = tokio::time::interval(self.config.metrics_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let reports = join_all(collectors.iter_mut().map(|c| c.scrape())).await;
                    log_reports(&reports);
                }
                _ = shutdown.changed() => break,
            }
        }

        tracing::info!(target: "exporter::runner", "stopped");
        Ok(())
    }

    /// Scrapes every chain once into memory and returns the observations.
    pub async fn run_once(&self) -> Result<Vec<Observation>> {
        let sink = Arc::new(MemorySink::new());
        let mut collectors = self.collectors(sink.clone())?;

        let reports = join_all(collectors.iter_mut().map(|c| c.scrape())).await;
        log_reports(&reports);

        Ok(sink.observations())
    }

    /// Builds one collector per configured chain.
    pub fn collectors(&self, sink: Arc<dyn MetricSink>) -> Result<Vec<Collector<RpcClient>>> {
        let timeout = self.config.scrape_timeout();

        let jwt = match self.config.ethereum.as_ref().and_then(|e| e.jwt_secret.as_ref()) {
            Some(secret) => Some(JwtSecret::from_hex(secret).wrap_err("invalid ethereum jwt secret")?),
            None => None,
        };

        self.config
            .chains
            .iter()
            .map(|chain| -> Result<Collector<RpcClient>> {
                let source = RpcClient::new(&chain.rpc, timeout)?;
                let mut collector =
                    Collector::new(chain, &self.config.block_tracking, source, sink.clone())
                        .with_deadline(timeout);

                if let Some(ethereum) = &self.config.ethereum {
                    let client = EthereumClient::new(&ethereum.rpc_url, jwt.clone(), timeout)?;
                    collector = collector.with_ethereum(client, ethereum.clone());
                }

                tracing::debug!(target: "exporter::runner", chain_id = %chain.chain_id, name = %chain.name, "collector ready");
                Ok(collector)
            })
            .collect()
    }

    fn shutdown_on_ctrlc(&self) -> Result<watch::Receiver<bool>> {
        let (shutdown_sender, shutdown_recv) = watch::channel(false);
        ctrlc::set_handler(move || {
            tracing::info!(target: "exporter::runner", "shutting down");
            let _ = shutdown_sender.send(true);
        })
        .wrap_err("could not register shutdown handler")?;

        Ok(shutdown_recv)
    }
}

fn log_reports(reports: &[ScrapeReport]) {
    for report in reports {
        if report.is_complete() {
            tracing::info!(target: "exporter::runner", chain_id = %report.chain_id, "scraped in {:?}", report.elapsed);
        } else {
            tracing::warn!(
                target: "exporter::runner",
                chain_id = %report.chain_id,
                cosmos = %report.cosmos,
                ethereum = %report.ethereum,
                "partial scrape in {:?}",
                report.elapsed
            );
        }
    }
}
