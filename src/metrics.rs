//! Statistics snapshots and their export formats

use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Counters of one (provider, namespace) pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HandleStats {
    /// Handles currently leased out
    pub used: usize,

    /// Idle handles waiting in the free list
    pub free: usize,
}

/// Read-only snapshot of every provider's namespaces, as returned by
/// [`Registry::stat_all`](crate::Registry::stat_all).
///
/// # Examples
///
/// ```
/// use raphf::{FnOps, Registry};
///
/// let registry = Registry::default();
/// registry.provide("db", FnOps::<u32>::new().with_create(|_| Some(1))).unwrap();
/// let lease = registry.concede::<FnOps<u32>>("db", "primary").unwrap();
/// let _handle = lease.acquire(&()).unwrap();
///
/// let stats = registry.stat_all().unwrap();
/// assert_eq!(stats.get("db", "primary").unwrap().used, 1);
/// assert_eq!(stats.total_used(), 1);
/// assert!(stats.to_string().contains("primary"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct PoolStats {
    providers: BTreeMap<String, BTreeMap<String, HandleStats>>,
}

impl PoolStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, provider: &str, namespaces: BTreeMap<String, HandleStats>) {
        self.providers.insert(provider.to_owned(), namespaces);
    }

    /// Counters of one namespace of one provider
    pub fn get(&self, provider: &str, ident: &str) -> Option<HandleStats> {
        self.providers.get(provider)?.get(ident).copied()
    }

    /// All namespaces of one provider
    pub fn provider(&self, provider: &str) -> Option<&BTreeMap<String, HandleStats>> {
        self.providers.get(provider)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, HandleStats>)> {
        self.providers
            .iter()
            .map(|(name, namespaces)| (name.as_str(), namespaces))
    }

    /// Number of providers in the snapshot
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn total_used(&self) -> usize {
        self.entries().map(|(_, _, stats)| stats.used).sum()
    }

    pub fn total_free(&self) -> usize {
        self.entries().map(|(_, _, stats)| stats.free).sum()
    }

    /// Export as a flat map keyed `provider/ident/used` and `provider/ident/free`
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        for (provider, ident, stats) in self.entries() {
            metrics.insert(format!("{provider}/{ident}/used"), stats.used.to_string());
            metrics.insert(format!("{provider}/{ident}/free"), stats.free.to_string());
        }
        metrics
    }

    pub fn into_inner(self) -> BTreeMap<String, BTreeMap<String, HandleStats>> {
        self.providers
    }

    fn entries(&self) -> impl Iterator<Item = (&str, &str, HandleStats)> {
        self.providers.iter().flat_map(|(provider, namespaces)| {
            namespaces
                .iter()
                .map(move |(ident, stats)| (provider.as_str(), ident.as_str(), *stats))
        })
    }
}

/// Renders a table with one row per (provider, namespace) pair
impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let provider_width = self
            .entries()
            .map(|(provider, _, _)| provider.len())
            .chain(std::iter::once("Provider".len()))
            .max()
            .unwrap_or_default();
        let ident_width = self
            .entries()
            .map(|(_, ident, _)| ident.len())
            .chain(std::iter::once("Ident".len()))
            .max()
            .unwrap_or_default();

        writeln!(
            f,
            "{:<provider_width$}  {:<ident_width$}  {:>6}  {:>6}",
            "Provider", "Ident", "Used", "Free"
        )?;
        for (provider, ident, stats) in self.entries() {
            writeln!(
                f,
                "{:<provider_width$}  {:<ident_width$}  {:>6}  {:>6}",
                provider, ident, stats.used, stats.free
            )?;
        }
        Ok(())
    }
}

/// Metrics exporter for Prometheus format
#[cfg(feature = "metrics")]
pub struct MetricsExporter;

#[cfg(feature = "metrics")]
impl MetricsExporter {
    /// Export a snapshot in Prometheus exposition format.
    ///
    /// Each namespace becomes a `raphf_handles_used` and a
    /// `raphf_handles_free` gauge labelled with `provider` and `namespace`;
    /// `tags` are added to every sample as constant labels.
    ///
    /// # Examples
    ///
    /// ```
    /// use raphf::{FnOps, MetricsExporter, Registry};
    /// use std::collections::HashMap;
    ///
    /// let registry = Registry::default();
    /// registry.provide("curl", FnOps::<u8>::new().with_create(|_| Some(0))).unwrap();
    /// let lease = registry.concede::<FnOps<u8>>("curl", "php.net:80").unwrap();
    /// let handle = lease.acquire(&()).unwrap();
    /// lease.release(handle);
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "api".to_string());
    ///
    /// let output = MetricsExporter::export_prometheus(&registry.stat_all().unwrap(), Some(&tags)).unwrap();
    /// assert!(output.contains("raphf_handles_free"));
    /// assert!(output.contains("service=\"api\""));
    /// ```
    pub fn export_prometheus(
        stats: &PoolStats,
        tags: Option<&HashMap<String, String>>,
    ) -> crate::PoolResult<String> {
        use prometheus::{Encoder, IntGaugeVec, Registry, TextEncoder};

        let registry = Registry::new();
        let used = IntGaugeVec::new(
            Self::opts("raphf_handles_used", "Handles currently leased out", tags),
            &["provider", "namespace"],
        )
        .map_err(Self::export_error)?;
        let free = IntGaugeVec::new(
            Self::opts("raphf_handles_free", "Idle handles available for reuse", tags),
            &["provider", "namespace"],
        )
        .map_err(Self::export_error)?;
        registry
            .register(Box::new(used.clone()))
            .map_err(Self::export_error)?;
        registry
            .register(Box::new(free.clone()))
            .map_err(Self::export_error)?;

        for (provider, ident, stats) in stats.entries() {
            used.with_label_values(&[provider, ident])
                .set(i64::try_from(stats.used).unwrap_or(i64::MAX));
            free.with_label_values(&[provider, ident])
                .set(i64::try_from(stats.free).unwrap_or(i64::MAX));
        }

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .map_err(Self::export_error)?;
        String::from_utf8(buffer).map_err(|e| crate::PoolError::MetricsExport(e.to_string()))
    }

    fn opts(name: &str, help: &str, tags: Option<&HashMap<String, String>>) -> prometheus::Opts {
        let opts = prometheus::Opts::new(name, help);
        match tags {
            Some(tags) => opts.const_labels(tags.clone()),
            None => opts,
        }
    }

    fn export_error(err: prometheus::Error) -> crate::PoolError {
        crate::PoolError::MetricsExport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PoolStats {
        let mut stats = PoolStats::new();
        let mut db = BTreeMap::new();
        db.insert("primary".to_string(), HandleStats { used: 2, free: 1 });
        db.insert("replica".to_string(), HandleStats { used: 0, free: 3 });
        stats.insert("db", db);

        let mut http = BTreeMap::new();
        http.insert("php.net:80".to_string(), HandleStats { used: 1, free: 0 });
        stats.insert("http", http);
        stats
    }

    #[test]
    fn test_lookup_and_totals() {
        let stats = sample();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats.get("db", "replica"), Some(HandleStats { used: 0, free: 3 }));
        assert_eq!(stats.get("db", "missing"), None);
        assert_eq!(stats.get("missing", "primary"), None);
        assert_eq!(stats.total_used(), 3);
        assert_eq!(stats.total_free(), 4);
        assert_eq!(stats.provider("http").unwrap().len(), 1);
    }

    #[test]
    fn test_flat_export() {
        let metrics = sample().export();
        assert_eq!(metrics.len(), 6);
        assert_eq!(metrics["db/primary/used"], "2");
        assert_eq!(metrics["http/php.net:80/free"], "0");
    }

    #[test]
    fn test_info_table() {
        let table = sample().to_string();
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Provider"));
        assert!(lines[1].starts_with("db"));
        assert!(lines[1].contains("primary"));
        assert!(lines[3].contains("php.net:80"));
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn test_prometheus_export() {
        let output = MetricsExporter::export_prometheus(&sample(), None).unwrap();
        assert!(output.contains("# TYPE raphf_handles_used gauge"));
        assert!(output.contains("raphf_handles_free{namespace=\"replica\",provider=\"db\"} 3"));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serializes_as_nested_map() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["db"]["primary"]["used"], 2);
        assert_eq!(json["http"]["php.net:80"]["free"], 0);
    }
}
