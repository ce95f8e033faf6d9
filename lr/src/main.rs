//! lr - loop progress reporting CLI
//!
//! Sends one-off messages, tracks line-oriented streams, and runs demo loops.

use std::io::{self, BufRead};
use std::thread::sleep;
use std::time::Duration;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use rand::Rng;
use regex::Regex;
use tracing::{debug, info};

use loopreport::cli::{Cli, Command, Scenario};
use loopreport::config::Config;
use loopreport::{MessageId, Reporter, SessionConfig};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    // stderr keeps warnings visible next to the monitored process without polluting stdout
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .try_init()
        .map_err(|e| eyre::eyre!("Failed to install log subscriber: {}", e))?;

    debug!("Logging initialized (level: {:?})", level);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    if let Some(chat_id) = cli.chat_id {
        config.telegram.chat_id = Some(chat_id);
    }

    let reporter = Reporter::from_config(&config)?;
    info!("lr starting");

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Send { text, reply_to } => cmd_send(&reporter, &text, reply_to),
        Command::Edit { message_id, text } => cmd_edit(&reporter, message_id, &text),
        Command::Track {
            total,
            name,
            update_interval,
            warn_interval,
            warn_pattern,
            quiet,
        } => {
            let mut session_config = reporter.session_defaults().clone();
            session_config.name = name;
            if let Some(secs) = update_interval {
                session_config.min_update_interval = Duration::from_secs(secs);
            }
            if let Some(secs) = warn_interval {
                session_config.min_warn_interval = Duration::from_secs(secs);
            }
            cmd_track(&reporter, total, session_config, warn_pattern.as_deref(), quiet)
        }
        Command::Demo {
            scenario,
            iterations,
            seconds,
        } => cmd_demo(&reporter, scenario, iterations, Duration::from_secs(seconds)),
    }
}

/// Send a one-off message
fn cmd_send(reporter: &Reporter, text: &str, reply_to: Option<i64>) -> Result<()> {
    debug!(?reply_to, "cmd_send: called");
    let sent = match reply_to {
        Some(id) => reporter.reply(text, MessageId(id)),
        None => reporter.send_message(text),
    };
    match sent {
        Some(id) => println!("{} Sent message {}", "✓".green(), id.to_string().cyan()),
        None => println!("{} Message could not be sent", "✗".yellow()),
    }
    Ok(())
}

/// Edit an existing message
fn cmd_edit(reporter: &Reporter, message_id: i64, text: &str) -> Result<()> {
    debug!(message_id, "cmd_edit: called");
    if reporter.edit_message(MessageId(message_id), text) {
        println!("{} Edited message {}", "✓".green(), message_id.to_string().cyan());
    } else {
        println!("{} Message could not be edited", "✗".yellow());
    }
    Ok(())
}

/// Count stdin lines as loop iterations
fn cmd_track(
    reporter: &Reporter,
    total: u64,
    config: SessionConfig,
    warn_pattern: Option<&str>,
    quiet: bool,
) -> Result<()> {
    debug!(total, ?warn_pattern, quiet, "cmd_track: called");
    let pattern = warn_pattern
        .map(Regex::new)
        .transpose()
        .context("Invalid --warn-pattern")?;

    let mut session = reporter.report_loop_with(total, config);
    session.run(|scope| -> Result<()> {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = line.context("Failed to read stdin")?;
            if !quiet {
                println!("{}", line);
            }
            if pattern.as_ref().is_some_and(|p| p.is_match(&line)) {
                scope.warn(&line)?;
            }
            scope.update(1)?;
        }
        Ok(())
    })
}

/// Run one of the demo scenarios
fn cmd_demo(reporter: &Reporter, scenario: Scenario, iterations: Option<u64>, run_time: Duration) -> Result<()> {
    debug!(?scenario, ?iterations, ?run_time, "cmd_demo: called");
    match scenario {
        Scenario::Normal => demo_normal(reporter, iterations.unwrap_or(999), run_time),
        Scenario::Error => demo_error(reporter, iterations.unwrap_or(999), run_time),
        Scenario::Warnings => demo_warnings(reporter, iterations.unwrap_or(999), run_time),
        Scenario::Subloop => demo_subloop(reporter, iterations.unwrap_or(9), run_time),
    }
}

/// Share of `run_time` for one of `iterations` steps
fn per_iteration(run_time: Duration, iterations: u64) -> Duration {
    run_time.div_f64(iterations.max(1) as f64)
}

fn demo_config(reporter: &Reporter, name: &str) -> SessionConfig {
    reporter
        .session_defaults()
        .clone()
        .with_name(name)
        .with_update_interval(Duration::from_secs(20))
}

fn demo_normal(reporter: &Reporter, iterations: u64, run_time: Duration) -> Result<()> {
    reporter.send_message("Send whatever message you like. 😃");
    reporter.send_message(
        "✅ Messages sent this way are safe: if they cannot be delivered (e.g. the connection is down) \
         you only get a warning in the log, your program keeps running.",
    );
    reporter.send_message(
        "⚠️ Nothing rate-limits one-off messages, so do not send them once per iteration. \
         Inside a reported loop use warnings instead, they are collected and sent in batches.",
    );

    let step = per_iteration(run_time, iterations);
    let mut session = reporter.report_loop_with(iterations, demo_config(reporter, "A loop in which everything works fine"));
    session.run(|scope| -> Result<()> {
        for _ in 0..iterations {
            sleep(step);
            scope.update(1)?;
        }
        Ok(())
    })?;
    println!("{} Loop finished", "✓".green());
    Ok(())
}

fn demo_error(reporter: &Reporter, iterations: u64, run_time: Duration) -> Result<()> {
    reporter.send_message("Let's now see what happens when an error occurs within a loop that is being reported.");

    let step = per_iteration(run_time, iterations);
    let fail_at = iterations / 10;
    let mut session = reporter.report_loop_with(iterations, demo_config(reporter, "A loop with an error"));
    session.run(|scope| -> Result<()> {
        for n in 0..iterations {
            sleep(step);
            if n == fail_at {
                eyre::bail!("Oh no!! An error!!!");
            }
            scope.update(1)?;
        }
        Ok(())
    })
}

fn demo_warnings(reporter: &Reporter, iterations: u64, run_time: Duration) -> Result<()> {
    let step = per_iteration(run_time, iterations);
    let mut rng = rand::rng();
    let mut session = reporter.report_loop_with(iterations, demo_config(reporter, "Testing warnings"));
    session.run(|scope| -> Result<()> {
        for k in 0..iterations {
            sleep(step);
            if k == iterations / 9 || k == iterations / 9 + 1 {
                scope.warn("This warning should be notified two times, maybe in two different messages.")?;
            }
            if k > iterations * 2 / 9 && k < iterations / 3 {
                scope.warn("A very repetitive warning! You will not be spammed, they are collected in a few messages.")?;
            }
            if k == iterations * 4 / 9 {
                scope.warn("Now I will report many different warnings at the same time.")?;
                scope.warn("All these warnings will be collected in one message.")?;
                scope.warn("This is the last warning, I promise.")?;
            }
            // Randomly pretend the device gets too hot
            if rng.random::<f64>() < 2.0 / iterations as f64 {
                scope.warn("The temperature is too high!")?;
            }
            scope.update(1)?;
        }
        Ok(())
    })?;
    println!("{} Loop finished", "✓".green());
    Ok(())
}

fn demo_subloop(reporter: &Reporter, iterations: u64, run_time: Duration) -> Result<()> {
    let subloop_time = per_iteration(run_time, iterations);
    let mut rng = rand::rng();
    let mut session = reporter.report_loop_with(iterations, demo_config(reporter, "Main loop"));
    session.run(|scope| -> Result<()> {
        for n1 in 0..iterations {
            let n_sub: u64 = rng.random_range(111..222);
            let step = per_iteration(subloop_time, n_sub);
            let mut child = scope.subloop(n_sub, demo_config(reporter, &format!("Subloop number {}", n1)))?;
            child.run(|sub| -> Result<()> {
                for n2 in 0..n_sub {
                    sleep(step);
                    if n2 == n_sub / 2 {
                        sub.warn(format!("n2 = {}! *This is important*.", n2))?;
                    }
                    sub.update(1)?;
                }
                Ok(())
            })?;
            scope.update(1)?;
        }
        Ok(())
    })?;
    println!("{} Loop finished", "✓".green());
    Ok(())
}
