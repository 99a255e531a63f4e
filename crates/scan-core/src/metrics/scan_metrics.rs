use prometheus::{HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry};

/// Scan-domain Prometheus metrics: admission outcomes, lifecycle durations,
/// license/quota rejections, and registry/webhook health (§4.4, §4.5, §4.1, §4.9).
#[derive(Debug, Clone)]
pub struct ScanMetrics {
    // Admission
    pub scans_submitted_total: IntCounterVec,
    pub scans_admitted_total: IntCounterVec,
    pub scans_rejected_total: IntCounterVec,

    // Lifecycle
    pub scan_duration_seconds: HistogramVec,
    pub scans_completed_total: IntCounterVec,
    pub scans_failed_total: IntCounterVec,
    pub scans_timed_out_total: IntCounterVec,
    pub scans_cancelled_total: IntCounterVec,

    // Worker pool / queue depth
    pub active_workers: IntGaugeVec,
    pub queue_depth: IntGaugeVec,

    // Findings / compliance
    pub findings_total: IntCounterVec,
    pub compliance_score: prometheus::GaugeVec,

    // License & quota
    pub quota_used: prometheus::GaugeVec,

    // Registry (C1)
    pub registry_reloads_total: IntCounterVec,

    // External interfaces (C9)
    pub webhook_deliveries_total: IntCounterVec,
}

impl ScanMetrics {
    pub fn new(namespace: &str) -> Result<Self, prometheus::Error> {
        let scans_submitted_total = IntCounterVec::new(
            Opts::new(
                format!("{}_scans_submitted_total", namespace),
                "Total number of scan submissions received",
            ),
            &["tenant_id", "scan_type"],
        )?;

        let scans_admitted_total = IntCounterVec::new(
            Opts::new(
                format!("{}_scans_admitted_total", namespace),
                "Total number of scan submissions admitted to the queue",
            ),
            &["tenant_id", "scan_type"],
        )?;

        let scans_rejected_total = IntCounterVec::new(
            Opts::new(
                format!("{}_scans_rejected_total", namespace),
                "Total number of scan submissions rejected at admission",
            ),
            &["tenant_id", "scan_type", "reason"],
        )?;

        let scan_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                format!("{}_scan_duration_seconds", namespace),
                "Wall-clock time from Admitted to a terminal state",
            )
            .buckets(vec![
                0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0,
            ]),
            &["scan_type", "outcome"],
        )?;

        let scans_completed_total = IntCounterVec::new(
            Opts::new(
                format!("{}_scans_completed_total", namespace),
                "Total number of scans that reached Succeeded",
            ),
            &["tenant_id", "scan_type"],
        )?;

        let scans_failed_total = IntCounterVec::new(
            Opts::new(
                format!("{}_scans_failed_total", namespace),
                "Total number of scans that reached Failed",
            ),
            &["tenant_id", "scan_type"],
        )?;

        let scans_timed_out_total = IntCounterVec::new(
            Opts::new(
                format!("{}_scans_timed_out_total", namespace),
                "Total number of scans that reached TimedOut",
            ),
            &["tenant_id", "scan_type"],
        )?;

        let scans_cancelled_total = IntCounterVec::new(
            Opts::new(
                format!("{}_scans_cancelled_total", namespace),
                "Total number of scans that reached Cancelled",
            ),
            &["tenant_id", "scan_type"],
        )?;

        let active_workers = IntGaugeVec::new(
            Opts::new(
                format!("{}_active_workers", namespace),
                "Number of workers currently processing a job, by scan type",
            ),
            &["scan_type"],
        )?;

        let queue_depth = IntGaugeVec::new(
            Opts::new(
                format!("{}_queue_depth", namespace),
                "Number of jobs currently sitting in the admission queue",
            ),
            &["scan_type"],
        )?;

        let findings_total = IntCounterVec::new(
            Opts::new(
                format!("{}_findings_total", namespace),
                "Total number of findings emitted, by severity",
            ),
            &["tenant_id", "scan_type", "severity"],
        )?;

        let compliance_score = prometheus::GaugeVec::new(
            Opts::new(
                format!("{}_compliance_score", namespace),
                "Most recent overall compliance score per tenant (0-100)",
            ),
            &["tenant_id"],
        )?;

        let quota_used = prometheus::GaugeVec::new(
            Opts::new(
                format!("{}_quota_used", namespace),
                "Current quota counter value for the tenant's active period",
            ),
            &["tenant_id", "quota_kind"],
        )?;

        let registry_reloads_total = IntCounterVec::new(
            Opts::new(
                format!("{}_registry_reloads_total", namespace),
                "Total number of pattern/rule registry reload attempts",
            ),
            &["outcome"],
        )?;

        let webhook_deliveries_total = IntCounterVec::new(
            Opts::new(
                format!("{}_webhook_deliveries_total", namespace),
                "Total number of outbound webhook delivery attempts",
            ),
            &["outcome"],
        )?;

        Ok(Self {
            scans_submitted_total,
            scans_admitted_total,
            scans_rejected_total,
            scan_duration_seconds,
            scans_completed_total,
            scans_failed_total,
            scans_timed_out_total,
            scans_cancelled_total,
            active_workers,
            queue_depth,
            findings_total,
            compliance_score,
            quota_used,
            registry_reloads_total,
            webhook_deliveries_total,
        })
    }

    pub fn register_all(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.scans_submitted_total.clone()))?;
        registry.register(Box::new(self.scans_admitted_total.clone()))?;
        registry.register(Box::new(self.scans_rejected_total.clone()))?;
        registry.register(Box::new(self.scan_duration_seconds.clone()))?;
        registry.register(Box::new(self.scans_completed_total.clone()))?;
        registry.register(Box::new(self.scans_failed_total.clone()))?;
        registry.register(Box::new(self.scans_timed_out_total.clone()))?;
        registry.register(Box::new(self.scans_cancelled_total.clone()))?;
        registry.register(Box::new(self.active_workers.clone()))?;
        registry.register(Box::new(self.queue_depth.clone()))?;
        registry.register(Box::new(self.findings_total.clone()))?;
        registry.register(Box::new(self.compliance_score.clone()))?;
        registry.register(Box::new(self.quota_used.clone()))?;
        registry.register(Box::new(self.registry_reloads_total.clone()))?;
        registry.register(Box::new(self.webhook_deliveries_total.clone()))?;

        Ok(())
    }
}
