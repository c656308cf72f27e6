use std::collections::{hash_map::Entry, HashMap};
use std::fmt;
use std::sync::{Mutex, PoisonError};

use eyre::{Result, WrapErr};
use prometheus_exporter::prometheus::{self, GaugeVec, Opts, Registry};

use super::metrics::Metric;

/// Label names and values of an observation
pub type Labels = Vec<(&'static str, String)>;

/// A single metric value.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Metric the value belongs to
    pub metric: Metric,
    /// Value
    pub value: f64,
    /// Labels, in registration order
    pub labels: Labels,
}

impl Observation {
    /// Creates a new observation.
    pub fn new(metric: Metric, value: f64, labels: Labels) -> Self {
        Self {
            metric,
            value,
            labels,
        }
    }

    /// Returns the value of label `name`.
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.metric.name)?;
        if !self.labels.is_empty() {
            let labels = self
                .labels
                .iter()
                .map(|(key, value)| format!("{key}=\"{value}\""))
                .collect::<Vec<_>>()
                .join(",");
            write!(f, "{{{labels}}}")?;
        }
        write!(f, " {}", self.value)
    }
}

/// Label naming the chain a series belongs to.
pub const CHAIN_LABEL: &str = "chain_id";

/// Receives observations from concurrent collection paths.
pub trait MetricSink: Send + Sync {
    /// Records an observation, replacing the previous value of the same series.
    fn submit(&self, observation: Observation) -> Result<()>;

    /// Ends a scrape of `chain_id`: series of that chain not submitted since
    /// the previous call are dropped.
    fn expire(&self, _chain_id: &str) -> Result<()> {
        Ok(())
    }
}

/// Sets Prometheus gauges.
///
/// A `GaugeVec` is registered the first time a metric is submitted and its
/// label names are fixed from then on. Series not refreshed between two
/// [MetricSink::expire] calls for their chain are removed.
#[derive(Debug)]
pub struct PrometheusSink {
    registry: Registry,
    families: Mutex<HashMap<&'static str, Family>>,
}

#[derive(Debug)]
struct Family {
    gauge: GaugeVec,
    label_names: Vec<&'static str>,
    /// Label values of every live series, with whether it was set since the last expiry
    series: HashMap<Vec<String>, bool>,
}

impl Family {
    fn new(metric: Metric, label_names: Vec<&'static str>, registry: &Registry) -> Result<Self> {
        let gauge = GaugeVec::new(Opts::new(metric.name, metric.help), &label_names)?;
        registry
            .register(Box::new(gauge.clone()))
            .wrap_err_with(|| format!("failed to register {}", metric.name))?;

        Ok(Self {
            gauge,
            label_names,
            series: HashMap::new(),
        })
    }

    fn expire(&mut self, chain_id: &str) -> Result<()> {
        let index = match self.label_names.iter().position(|name| *name == CHAIN_LABEL) {
            Some(index) => index,
            None => return Ok(()),
        };

        let mut stale = Vec::new();
        for (values, fresh) in self.series.iter_mut() {
            if values[index] != chain_id {
                continue;
            }
            if *fresh {
                *fresh = false;
            } else {
                stale.push(values.clone());
            }
        }

        for values in stale {
            self.series.remove(&values);
            let values: Vec<&str> = values.iter().map(String::as_str).collect();
            self.gauge.remove_label_values(&values)?;
        }

        Ok(())
    }
}

impl PrometheusSink {
    /// Creates a sink registering its gauges in `registry`.
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            families: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the registry the gauges live in.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for PrometheusSink {
    /// Uses the registry served by the metrics server.
    fn default() -> Self {
        Self::new(prometheus::default_registry().clone())
    }
}

impl MetricSink for PrometheusSink {
    fn submit(&self, observation: Observation) -> Result<()> {
        let Observation {
            metric,
            value,
            labels,
        } = observation;
        let (names, values): (Vec<&'static str>, Vec<String>) = labels.into_iter().unzip();

        let mut families = self.families.lock().unwrap_or_else(PoisonError::into_inner);
        let family = match families.entry(metric.name) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(Family::new(metric, names.clone(), &self.registry)?),
        };

        if family.label_names != names {
            eyre::bail!(
                "{} registered with labels {:?}, got {:?}",
                metric.name,
                family.label_names,
                names
            );
        }

        let label_values: Vec<&str> = values.iter().map(String::as_str).collect();
        family.gauge.get_metric_with_label_values(&label_values)?.set(value);
        family.series.insert(values, true);
        Ok(())
    }

    fn expire(&self, chain_id: &str) -> Result<()> {
        let mut families = self.families.lock().unwrap_or_else(PoisonError::into_inner);
        for family in families.values_mut() {
            family.expire(chain_id)?;
        }
        Ok(())
    }
}

/// Keeps every observation in submission order.
#[derive(Debug, Default)]
pub struct MemorySink {
    observations: Mutex<Vec<Observation>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded observations.
    pub fn observations(&self) -> Vec<Observation> {
        self.observations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the last value recorded for `name` whose labels include `labels`.
    pub fn get(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        self.observations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find(|obs| {
                obs.metric.name == name
                    && labels
                        .iter()
                        .all(|(key, value)| obs.label(key) == Some(*value))
            })
            .map(|obs| obs.value)
    }

    /// Whether any value was recorded for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name, &[]).is_some()
    }

    /// Number of recorded observations.
    pub fn len(&self) -> usize {
        self.observations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MetricSink for MemorySink {
    fn submit(&self, observation: Observation) -> Result<()> {
        self.observations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observation);
        Ok(())
    }
}
