use crate::{
    config::Config,
    job::BroadcastJob,
    result::JobResult,
    util::{format_duration, format_number, progress_bar},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub job_id: String,
    pub created_at: String,
    pub message_preview: String,
    pub total_members: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Share of recipients reached, rounded down.
    pub success_rate: u64,
    pub elapsed_ms: u64,
    /// Recipients per second over the whole job, rounded.
    pub average_throughput: u64,
    pub workers: Vec<String>,
    pub failure_breakdown: BTreeMap<String, u64>,
    pub failures: FailureListing,
}

/// The part of the failed-recipient list that fits in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FailureListing {
    None,
    Pages {
        pages: Vec<Vec<String>>,
        total_pages: usize,
        /// Failures on pages past the inline limit.
        additional: usize,
    },
    /// Too many to page through; only the head is shown and the full list
    /// goes to the log.
    Truncated { shown: Vec<String>, total: usize },
}

impl FailureListing {
    pub fn omits_any(&self) -> bool {
        match self {
            Self::None => false,
            Self::Pages { additional, .. } => *additional > 0,
            Self::Truncated { .. } => true,
        }
    }
}

pub struct ReportBuilder {
    max_per_page: usize,
    max_pages: usize,
    preview_len: usize,
    workers: Vec<String>,
}

impl ReportBuilder {
    pub fn new(cfg: &Config, workers: Vec<String>) -> Self {
        Self {
            max_per_page: cfg.report.max_per_page.max(1),
            max_pages: cfg.report.max_pages.max(1),
            preview_len: cfg.broadcast.preview_len,
            workers,
        }
    }

    /// Reads `result` only; the same inputs always give the same report.
    pub fn build(&self, job: &BroadcastJob, result: &JobResult) -> Report {
        let elapsed = result.elapsed();
        let secs = elapsed.as_secs_f64();
        let average_throughput = if secs > 0.0 {
            (result.total_members as f64 / secs).round() as u64
        } else {
            0
        };
        let success_rate = if result.total_members > 0 {
            result.success_count * 100 / result.total_members
        } else {
            0
        };

        let mut failure_breakdown = BTreeMap::new();
        for f in &result.failed_recipients {
            *failure_breakdown
                .entry(f.reason.category().to_string())
                .or_insert(0) += 1;
        }

        let labels: Vec<String> = result
            .failed_recipients
            .iter()
            .map(|f| f.recipient.label())
            .collect();

        Report {
            job_id: job.job_id.clone(),
            created_at: job.created_at.clone(),
            message_preview: job.preview(self.preview_len),
            total_members: result.total_members,
            success_count: result.success_count,
            failure_count: result.failure_count,
            success_rate,
            elapsed_ms: elapsed.as_millis() as u64,
            average_throughput,
            workers: self.workers.clone(),
            failure_breakdown,
            failures: self.listing(labels),
        }
    }

    fn listing(&self, labels: Vec<String>) -> FailureListing {
        if labels.is_empty() {
            return FailureListing::None;
        }

        let total = labels.len();
        if total > self.max_per_page * self.max_pages {
            return FailureListing::Truncated {
                shown: labels.into_iter().take(self.max_per_page).collect(),
                total,
            };
        }

        let pages: Vec<Vec<String>> = labels
            .chunks(self.max_per_page)
            .map(<[String]>::to_vec)
            .collect();
        let total_pages = pages.len();
        let pages: Vec<Vec<String>> = pages.into_iter().take(self.max_pages).collect();
        let shown: usize = pages.iter().map(Vec::len).sum();

        FailureListing::Pages {
            pages,
            total_pages,
            additional: total - shown,
        }
    }
}

impl Report {
    pub fn render_text(&self) -> String {
        let mut out = Vec::new();

        out.push(format!(
            "Broadcast report for {} members.",
            format_number(self.total_members)
        ));
        out.push(format!("Message: {}", self.message_preview));
        out.push(format!(
            "{} {}% delivered",
            progress_bar(self.success_rate),
            self.success_rate
        ));
        out.push(format!(
            "Total: {} | Successful: {} | Failed: {}",
            format_number(self.total_members),
            format_number(self.success_count),
            format_number(self.failure_count)
        ));
        out.push(format!(
            "Total time: {} | Average speed: ~{} members/sec",
            format_duration(std::time::Duration::from_millis(self.elapsed_ms)),
            self.average_throughput
        ));

        if !self.failure_breakdown.is_empty() {
            let parts: Vec<String> = self
                .failure_breakdown
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            out.push(format!("Failure reasons: {}", parts.join(", ")));
        }

        match &self.failures {
            FailureListing::None => {}
            FailureListing::Pages {
                pages,
                total_pages,
                additional,
            } => {
                for (i, page) in pages.iter().enumerate() {
                    if i == 0 {
                        out.push(format!("Failed members: {}", page.join(", ")));
                    } else {
                        out.push(format!(
                            "Failed members (continued) ({}/{}): {}",
                            i + 1,
                            total_pages,
                            page.join(", ")
                        ));
                    }
                }
                if *additional > 0 {
                    out.push(format!(
                        "... and {additional} more. Check the logs for the full list."
                    ));
                }
            }
            FailureListing::Truncated { shown, total } => {
                out.push(format!(
                    "Too many failed members ({total}) to display. First {}: {}",
                    shown.len(),
                    shown.join(", ")
                ));
                out.push("Check the logs for the complete list of failed members.".to_string());
            }
        }

        if !self.workers.is_empty() {
            out.push(format!("Workers: {}", self.workers.join(" | ")));
        }

        out.join("\n")
    }
}
