//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying plans, run
//! reports, and persisted state in text or JSON.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::planner::ProvisioningPlan;
use crate::request::ValidationResult;
use crate::state::{
    NodeStatus, ProvisioningResult, RollbackOutcome, RunOutcome, RunState,
};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    format: OutputFormat,
}

/// Plan step row for table display.
#[derive(Tabled)]
struct PlanStepRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "After")]
    after: String,
}

/// Run report row for table display.
#[derive(Tabled)]
struct ReportRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "External ID")]
    external_id: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a provisioning plan.
    #[must_use]
    pub fn format_plan(&self, plan: &ProvisioningPlan, detailed: bool) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&plan.steps).unwrap_or_default()
            }
            OutputFormat::Text => Self::format_plan_text(plan, detailed),
        }
    }

    fn format_plan_text(plan: &ProvisioningPlan, detailed: bool) -> String {
        let mut output = String::new();
        let _ = writeln!(
            output,
            "{} {} resources will be provisioned (request {}):\n",
            "Plan:".bold(),
            plan.len(),
            &plan.request_hash[..12.min(plan.request_hash.len())]
        );

        let rows: Vec<PlanStepRow> = plan
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| PlanStepRow {
                index: index + 1,
                resource: step.id.to_string(),
                kind: step.kind.to_string(),
                after: step
                    .depends_on
                    .iter()
                    .map(|d| d.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
            .collect();
        let _ = writeln!(output, "{}", Table::new(rows));

        if detailed {
            let _ = writeln!(output);
            for step in &plan.steps {
                let _ = writeln!(output, "{}:", step.id.to_string().bold());
                for (key, value) in &step.params {
                    let _ = writeln!(output, "  {key}: {value}");
                }
            }
        }

        output
    }

    /// Formats the result of a provisioning run.
    #[must_use]
    pub fn format_result(&self, result: &ProvisioningResult) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(result).unwrap_or_default(),
            OutputFormat::Text => Self::format_result_text(result),
        }
    }

    fn format_result_text(result: &ProvisioningResult) -> String {
        let mut output = String::new();

        match &result.outcome {
            RunOutcome::Provisioned { resolved } => {
                let _ = writeln!(
                    output,
                    "{} Provisioned {} resources (run {}).\n",
                    "✓".green(),
                    resolved.len(),
                    result.run_id
                );
            }
            RunOutcome::Failed {
                failed_node,
                error,
                rollback,
            } => {
                let _ = writeln!(
                    output,
                    "{} Provisioning failed at {} (run {}).",
                    "✗".red(),
                    failed_node.to_string().bold(),
                    result.run_id
                );
                let _ = writeln!(output, "  {error}\n");
                let _ = writeln!(output, "{}", Self::format_rollback_text(rollback));
            }
        }

        let rows: Vec<ReportRow> = result
            .report
            .iter()
            .map(|line| ReportRow {
                resource: line.logical_id.to_string(),
                kind: line.kind.to_string(),
                status: format_status(line.status),
                external_id: line
                    .external_id
                    .as_ref()
                    .map_or_else(|| String::from("-"), ToString::to_string),
            })
            .collect();
        let _ = writeln!(output, "{}", Table::new(rows));

        output
    }

    /// Formats a standalone rollback outcome.
    #[must_use]
    pub fn format_rollback(&self, outcome: &RollbackOutcome) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(outcome).unwrap_or_default(),
            OutputFormat::Text => Self::format_rollback_text(outcome),
        }
    }

    fn format_rollback_text(outcome: &RollbackOutcome) -> String {
        match outcome {
            RollbackOutcome::NothingToRollBack => {
                format!("{} Nothing to roll back.", "✓".green())
            }
            RollbackOutcome::FullyRolledBack { deleted } => {
                format!(
                    "{} Rolled back {} resources: {}.",
                    "✓".green(),
                    deleted.len(),
                    deleted
                        .iter()
                        .map(|d| d.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            }
            RollbackOutcome::PartiallyRolledBack { deleted, failed } => {
                format!(
                    "{} Partial rollback: {} deleted, {} left behind ({}). Manual reconciliation required.",
                    "!".yellow(),
                    deleted.len(),
                    failed.len(),
                    failed
                        .iter()
                        .map(|d| d.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            }
        }
    }

    /// Formats persisted run state.
    #[must_use]
    pub fn format_run_state(&self, state: &RunState) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(state).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::new();
                let _ = writeln!(output, "Run:      {}", state.run_id);
                let _ = writeln!(output, "Request:  {}", state.request_hash);
                let _ = writeln!(output, "Status:   {:?}", state.status);
                let _ = writeln!(output, "Started:  {}", state.started_at);
                if let Some(finished) = state.finished_at {
                    let _ = writeln!(output, "Finished: {finished}");
                }
                let _ = writeln!(output);

                let rows: Vec<ReportRow> = state
                    .nodes
                    .iter()
                    .map(|(id, record)| ReportRow {
                        resource: id.to_string(),
                        kind: record.kind.to_string(),
                        status: format_status(record.status),
                        external_id: record
                            .external_id
                            .as_ref()
                            .map_or_else(|| String::from("-"), ToString::to_string),
                    })
                    .collect();
                let _ = writeln!(output, "{}", Table::new(rows));
                output
            }
        }
    }

    /// Formats a validation result.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(result).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::new();
                if result.is_valid() {
                    let _ = writeln!(output, "{} Request is valid.", "✓".green());
                } else {
                    let _ = writeln!(output, "{} Request is invalid:", "✗".red());
                    for error in &result.errors {
                        let _ = writeln!(output, "  {} {error}", "error:".red());
                    }
                }
                if show_warnings {
                    for warning in &result.warnings {
                        let _ = writeln!(output, "  {} {warning}", "warning:".yellow());
                    }
                } else if !result.warnings.is_empty() {
                    let _ = writeln!(
                        output,
                        "  ({} warnings suppressed; use --warnings to show)",
                        result.warnings.len()
                    );
                }
                output
            }
        }
    }
}

fn format_status(status: NodeStatus) -> String {
    match status {
        NodeStatus::Pending => "pending".dimmed().to_string(),
        NodeStatus::Created => "created".green().to_string(),
        NodeStatus::SkippedAlreadyExists => "skipped (exists)".yellow().to_string(),
        NodeStatus::Failed => "failed".red().to_string(),
        NodeStatus::RolledBack => "rolled back".cyan().to_string(),
        NodeStatus::RollbackFailed => "rollback failed".red().bold().to_string(),
    }
}
