//! In-memory fleet registry of node status reports.

use crate::reconcile::{ServiceView, EXPIRED};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Status report pushed by a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStatusReport {
    pub node: String,
    /// Report timestamp, seconds since epoch
    pub date: i64,
    /// Reporting cadence claimed by the node, in seconds
    pub period: u64,
    pub services: Vec<ServiceView>,
}

/// Latest report of every node, keyed by node identifier.
#[derive(Default)]
pub struct FleetRegistry {
    reports: RwLock<HashMap<String, NodeStatusReport>>,
}

impl FleetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `report` for `node`, replacing any previous one.
    pub async fn ingest(&self, node: &str, report: NodeStatusReport) {
        let mut reports = self.reports.write().await;
        reports.insert(node.to_string(), report);
    }

    /// Snapshot of every report.
    pub async fn read_all(&self) -> HashMap<String, NodeStatusReport> {
        self.reports.read().await.clone()
    }

    /// Mark every service of reports older than `ttl` as expired.
    ///
    /// Reports are never removed and their `date` is left untouched, so only
    /// a fresh ingestion clears the mark. Returns the number of stale reports.
    pub async fn sweep(&self, now: i64, ttl: Duration) -> usize {
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let mut reports = self.reports.write().await;
        let mut stale = 0;

        for report in reports.values_mut() {
            // Dates come from agents; a saturated age still counts as stale.
            let age = now.saturating_sub(report.date);
            if age <= ttl_secs {
                continue;
            }

            stale += 1;
            let full_status = format!("No data reporting since {}", format_age(age));
            for service in &mut report.services {
                service.status = EXPIRED.to_string();
                service.full_status = full_status.clone();
            }
        }

        stale
    }

    /// Start the background sweep task.
    pub fn start_sweeper(self: &Arc<Self>, period: Duration, ttl: Duration) {
        let registry = self.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                let stale = registry.sweep(Utc::now().timestamp(), ttl).await;
                if stale > 0 {
                    tracing::debug!("Sweeper: {} node report(s) expired", stale);
                }
            }
        });
    }
}

/// Render an age in seconds as `1h2m3s`.
fn format_age(secs: i64) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h{}m{}s", h, m, s)
    } else if m > 0 {
        format!("{}m{}s", m, s)
    } else {
        format!("{}s", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(name: &str, status: &str) -> ServiceView {
        ServiceView {
            image: "nginx".to_string(),
            name: name.to_string(),
            status: status.to_string(),
            full_status: format!("{} 3 days", status),
            definition: None,
        }
    }

    fn report(node: &str, date: i64, services: Vec<ServiceView>) -> NodeStatusReport {
        NodeStatusReport {
            node: node.to_string(),
            date,
            period: 10,
            services,
        }
    }

    #[tokio::test]
    async fn test_ingest_replaces_wholesale() {
        let registry = FleetRegistry::new();
        let r1 = report("node1", 100, vec![view("web", "Up"), view("db", "Up")]);
        let r2 = report("node1", 110, vec![view("cache", "Exited")]);

        registry.ingest("node1", r1).await;
        registry.ingest("node1", r2.clone()).await;

        let all = registry.read_all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all["node1"], r2);
    }

    #[tokio::test]
    async fn test_sweep_marks_stale_reports_only() {
        let registry = FleetRegistry::new();
        registry
            .ingest("old", report("old", 1_000, vec![view("web", "Up"), view("db", "Up")]))
            .await;
        registry
            .ingest("fresh", report("fresh", 1_080, vec![view("web", "Up")]))
            .await;

        let stale = registry.sweep(1_100, Duration::from_secs(30)).await;
        assert_eq!(stale, 1);

        let all = registry.read_all().await;
        let old = &all["old"];
        assert_eq!(old.date, 1_000);
        assert!(old.services.iter().all(|s| s.status == EXPIRED));
        assert_eq!(old.services[0].full_status, "No data reporting since 1m40s");
        assert_eq!(old.services[0].name, "web");

        assert_eq!(all["fresh"], report("fresh", 1_080, vec![view("web", "Up")]));
    }

    #[tokio::test]
    async fn test_sweep_at_exact_ttl_keeps_report() {
        let registry = FleetRegistry::new();
        registry.ingest("node1", report("node1", 1_000, vec![view("web", "Up")])).await;

        assert_eq!(registry.sweep(1_030, Duration::from_secs(30)).await, 0);
        assert_eq!(registry.read_all().await["node1"].services[0].status, "Up");
    }

    #[tokio::test]
    async fn test_fresh_ingest_clears_expiry() {
        let registry = FleetRegistry::new();
        registry.ingest("node1", report("node1", 1_000, vec![view("web", "Up")])).await;
        registry.sweep(2_000, Duration::from_secs(30)).await;
        assert_eq!(registry.read_all().await["node1"].services[0].status, EXPIRED);

        registry.ingest("node1", report("node1", 2_000, vec![view("web", "Up")])).await;
        assert_eq!(registry.read_all().await["node1"].services[0].status, "Up");
    }

    #[tokio::test]
    async fn test_sweep_survives_extreme_dates() {
        let registry = FleetRegistry::new();
        registry.ingest("past", report("past", i64::MIN, vec![view("web", "Up")])).await;
        registry.ingest("future", report("future", i64::MAX, vec![view("web", "Up")])).await;

        let now = Utc::now().timestamp();
        assert_eq!(registry.sweep(now, Duration::from_secs(30)).await, 1);
        assert_eq!(registry.sweep(now, Duration::MAX).await, 0);

        let all = registry.read_all().await;
        assert_eq!(all["past"].services[0].status, EXPIRED);
        assert_eq!(all["past"].date, i64::MIN);
        assert_eq!(all["future"].services[0].status, "Up");
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_expires_stale_reports() {
        let registry = Arc::new(FleetRegistry::new());
        let now = Utc::now().timestamp();
        registry.ingest("old", report("old", now - 120, vec![view("web", "Up")])).await;
        registry.ingest("fresh", report("fresh", now, vec![view("web", "Up")])).await;

        registry.start_sweeper(Duration::from_secs(30), Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(1)).await;

        let all = registry.read_all().await;
        assert_eq!(all["old"].services[0].status, EXPIRED);
        assert_eq!(all["fresh"].services[0].status, "Up");

        // The loop keeps running: a report that turns stale is caught on a later tick.
        registry
            .ingest("late", report("late", Utc::now().timestamp() - 300, vec![view("db", "Up")]))
            .await;
        tokio::time::advance(Duration::from_secs(30)).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let all = registry.read_all().await;
        assert_eq!(all["late"].services[0].status, EXPIRED);
        assert_eq!(all["fresh"].services[0].status, "Up");
    }

    #[test]
    fn test_format_age() {
        assert_eq!(format_age(42), "42s");
        assert_eq!(format_age(100), "1m40s");
        assert_eq!(format_age(3_725), "1h2m5s");
    }
}
