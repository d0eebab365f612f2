mod adjustments;
mod batch;
mod cli;
mod confidence;
mod db;
mod engine;
mod error;
mod fmt;
mod lookups;
mod models;
mod reports;
mod rules;
mod scholarship;
mod settings;
mod thresholds;

use clap::Parser;

use cli::{
    AdjustmentsCommands, BatchCommands, Cli, Commands, ReportCommands, RulesCommands,
    ThresholdsCommands,
};

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { data_dir, institution } => cli::init::run(data_dir, institution),
        Commands::Reconcile { payment_id } => cli::reconcile::run(payment_id),
        Commands::Batch { command } => match command {
            BatchCommands::Run {
                batch_type,
                name,
                from_date,
                to_date,
                limit,
            } => cli::batch::run(&batch_type, name, from_date, to_date, limit),
            BatchCommands::List => cli::batch::list(),
            BatchCommands::Resume { id } => cli::batch::resume(id),
        },
        Commands::Rules { command } => match command {
            RulesCommands::Add {
                name,
                rule_type,
                parameters,
                confidence_threshold,
                priority,
            } => cli::rules::add(&name, &rule_type, &parameters, confidence_threshold, priority),
            RulesCommands::List => cli::rules::list(),
            RulesCommands::Delete { id } => cli::rules::delete(id),
        },
        Commands::Thresholds { command } => match command {
            ThresholdsCommands::Add {
                context,
                absolute_limit,
                percentage_limit,
                effective_date,
            } => cli::thresholds::add(&context, absolute_limit, percentage_limit, effective_date),
            ThresholdsCommands::List => cli::thresholds::list(),
        },
        Commands::Adjustments { command } => match command {
            AdjustmentsCommands::List { pending } => cli::adjustments::list(pending),
            AdjustmentsCommands::Approve { id, approver } => cli::adjustments::approve(id, &approver),
        },
        Commands::Report { command } => match command {
            ReportCommands::Variance { date } => cli::report::variance(date),
            ReportCommands::Unreconciled => cli::report::unreconciled(),
        },
        Commands::Demo => cli::demo::run(),
        Commands::Backup { output } => cli::backup::run(output),
        Commands::Status => cli::status::run(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
