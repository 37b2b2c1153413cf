use crate::{
    progress::{Estimate, ProgressSnapshot},
    report::Report,
};
use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

/// Receives live progress. Updates may race across chunks; each one carries
/// the latest aggregate, so treat them as "latest wins".
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn started(&self, _estimate: &Estimate) -> Result<()> {
        Ok(())
    }

    async fn push(&self, snapshot: &ProgressSnapshot) -> Result<()>;
}

/// Publishes the final report wherever the caller wants it.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn publish(&self, report: &Report) -> Result<()>;
}

/// Writes progress lines to the log.
#[derive(Debug, Default)]
pub struct LogProgressSink;

#[async_trait]
impl ProgressSink for LogProgressSink {
    async fn started(&self, estimate: &Estimate) -> Result<()> {
        info!("broadcast starting: {}", estimate.render());
        Ok(())
    }

    async fn push(&self, snapshot: &ProgressSnapshot) -> Result<()> {
        info!("{}", snapshot.render());
        Ok(())
    }
}

/// Writes the rendered report to the log.
#[derive(Debug, Default)]
pub struct LogReportSink;

#[async_trait]
impl ReportSink for LogReportSink {
    async fn publish(&self, report: &Report) -> Result<()> {
        for line in report.render_text().lines() {
            info!("{line}");
        }
        Ok(())
    }
}
