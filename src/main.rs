use std::process::ExitCode;

use crate::{
    clock::SystemClock,
    configuration::Configuration,
    configuration_handler::{Command, ConfigurationHandler},
    notification::{test_message, EmailNotifier, Notifier},
    runner::run_reservation,
    scheduler::{hold, schedule},
    types::RunReport,
    webdriver::WebDriverLauncher,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod browser;
mod clock;
mod configuration;
mod configuration_handler;
mod error;
mod locators;
mod notification;
mod outcome;
mod reservation;
mod runner;
mod scheduler;
mod target_date;
#[cfg(test)]
mod testutils;
mod types;
mod webdriver;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let configuration = ConfigurationHandler::parse_arguments();
    if !configuration.json() {
        println!("###################");
        println!("# Gym Reservation #");
        println!("###################");
    }

    let command = configuration.command();
    if command != Command::TestEmail {
        if let Err(err) = configuration.credentials() {
            error!(%err, "Cannot start without credentials");
            return ExitCode::FAILURE;
        }
    }

    let notifier = match EmailNotifier::new(&configuration.email()) {
        Ok(notifier) => notifier,
        Err(err) => {
            error!(?err, "Failed to set up email notifications");
            return ExitCode::FAILURE;
        }
    };
    let clock = SystemClock {
        timezone: configuration.timezone(),
    };
    let launcher = WebDriverLauncher::new(configuration.webdriver_settings());

    match command {
        Command::Run => {
            let report = run_reservation(&configuration, &clock, &launcher, &notifier, None).await;
            finish(&configuration, &report)
        }
        Command::Hold => {
            let report = hold(&configuration, &clock, &launcher, &notifier).await;
            finish(&configuration, &report)
        }
        Command::Schedule => match schedule(&configuration, &clock, &launcher, &notifier).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                error!(?err, "Scheduler stopped");
                ExitCode::FAILURE
            }
        },
        Command::TestEmail => match notifier.notify(&test_message()).await {
            Ok(()) => {
                info!("Test email handed to the notifier");
                ExitCode::SUCCESS
            }
            Err(err) => {
                error!(?err, "Failed to send test email");
                ExitCode::FAILURE
            }
        },
    }
}

fn finish(configuration: &ConfigurationHandler, report: &RunReport) -> ExitCode {
    if configuration.json() {
        match serde_json::to_string_pretty(report) {
            Ok(json) => println!("{json}"),
            Err(err) => error!(?err, "Failed to serialize run report"),
        }
    } else {
        println!("Target date: {}", report.target_date);
        for (slot, result) in &report.results {
            let status = match result.success {
                true => "SUCCESS",
                false => "FAILED",
            };
            println!("  {} {status}: {}", slot.spaced(), result.message);
        }
        if let Some(error) = &report.error {
            println!("Error: {error}");
        }
        println!(
            "Outcome: {:?} ({}/{} slots, {:.1} seconds)",
            report.outcome,
            report.successful_slots(),
            report.results.len(),
            report.duration_secs
        );
    }

    match report.outcome.is_success() {
        true => ExitCode::SUCCESS,
        false => ExitCode::FAILURE,
    }
}
