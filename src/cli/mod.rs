pub mod adjustments;
pub mod backup;
pub mod batch;
pub mod demo;
pub mod init;
pub mod reconcile;
pub mod report;
pub mod rules;
pub mod status;
pub mod thresholds;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "bursar",
    about = "Accounts-receivable reconciliation CLI for legacy school payment records."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set up Bursar: choose a data directory and initialize the database.
    Init {
        /// Path for Bursar data (default: ~/Documents/bursar)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
        /// Institution name shown in status output
        #[arg(long)]
        institution: Option<String>,
    },
    /// Reconcile a single payment by ID.
    Reconcile {
        /// Payment ID
        payment_id: i64,
    },
    /// Run and inspect reconciliation batches.
    Batch {
        #[command(subcommand)]
        command: BatchCommands,
    },
    /// Manage matching rules.
    Rules {
        #[command(subcommand)]
        command: RulesCommands,
    },
    /// Manage materiality thresholds.
    Thresholds {
        #[command(subcommand)]
        command: ThresholdsCommands,
    },
    /// Review audit adjustments.
    Adjustments {
        #[command(subcommand)]
        command: AdjustmentsCommands,
    },
    /// Generate reports.
    Report {
        #[command(subcommand)]
        command: ReportCommands,
    },
    /// Load sample data (students, enrollments, payments, rules) to explore Bursar.
    Demo,
    /// Back up the database.
    Backup {
        /// Output path (default: <data_dir>/backups/bursar-YYYYMMDD-HHMMSS.db)
        #[arg(long)]
        output: Option<String>,
    },
    /// Show current database and summary statistics.
    Status,
}

#[derive(Subcommand)]
pub enum BatchCommands {
    /// Start a reconciliation batch over eligible payments.
    Run {
        /// Batch type: initial, refinement, manual, scheduled
        #[arg(long = "type", default_value = "manual")]
        batch_type: String,
        /// Batch name
        #[arg(long)]
        name: Option<String>,
        /// Earliest received date: YYYY-MM-DD
        #[arg(long = "from")]
        from_date: Option<String>,
        /// Latest received date: YYYY-MM-DD
        #[arg(long = "to")]
        to_date: Option<String>,
        /// Maximum payments to process this run
        #[arg(long)]
        limit: Option<usize>,
    },
    /// List past batches.
    List,
    /// Resume a batch that stopped mid-run.
    Resume {
        /// Batch ID (shown in `bursar batch list`)
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum RulesCommands {
    /// Add a matching rule.
    Add {
        /// Rule name
        name: String,
        /// Rule type: amount_tolerance, date_range, pattern, student_history, course_combination
        #[arg(long = "type")]
        rule_type: String,
        /// Rule parameters as JSON, e.g. '{"pattern": "installment"}'
        #[arg(long, default_value = "{}")]
        parameters: String,
        /// Minimum score the rule's condition must reach to apply
        #[arg(long = "confidence-threshold", default_value = "60")]
        confidence_threshold: i64,
        /// Rule priority (lower evaluates first)
        #[arg(long, default_value = "100")]
        priority: i64,
    },
    /// List active matching rules.
    List,
    /// Delete (deactivate) a rule by ID.
    Delete {
        /// Rule ID (shown in `bursar rules list`)
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum ThresholdsCommands {
    /// Add a materiality threshold.
    Add {
        /// Context: individual_payment, student_account, batch_total, period_aggregate, error_category
        #[arg(long, default_value = "individual_payment")]
        context: String,
        /// Absolute variance limit
        #[arg(long = "absolute")]
        absolute_limit: f64,
        /// Percentage variance limit
        #[arg(long = "percentage")]
        percentage_limit: Option<f64>,
        /// Effective date: YYYY-MM-DD (default: today)
        #[arg(long = "effective")]
        effective_date: Option<String>,
    },
    /// List thresholds, current first within each context.
    List,
}

#[derive(Subcommand)]
pub enum AdjustmentsCommands {
    /// List audit adjustments.
    List {
        /// Only adjustments awaiting approval
        #[arg(long)]
        pending: bool,
    },
    /// Approve an adjustment that exceeded a materiality threshold.
    Approve {
        /// Adjustment ID (shown in `bursar adjustments list`)
        id: i64,
        /// Name or initials of the approver
        #[arg(long = "by")]
        approver: String,
    },
}

#[derive(Subcommand)]
pub enum ReportCommands {
    /// Variance summary grouped by adjustment type.
    Variance {
        /// Restrict to adjustments created on this day: YYYY-MM-DD
        #[arg(long)]
        date: Option<String>,
    },
    /// Payments still awaiting reconciliation.
    Unreconciled,
}
