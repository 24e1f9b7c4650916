use assignmail::engine::{self, Engine};
use assignmail::ledger::JsonlLedger;
use assignmail::store::{ConfigRuleStore, JsonAssignmentStore, JsonMailbox};
use assignmail::Config;
use clap::{Arg, ArgAction, Command};
use log::LevelFilter;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[tokio::main]
async fn main() {
    let matches = Command::new("assignmail")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Inbound-email workflow automation for PMO assignment tracking")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("/etc/assignmail.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Validate the rule configuration and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("run-once")
                .long("run-once")
                .help("Run a single processing pass and exit (manual trigger)")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Increase log verbosity (-v debug, -vv trace)")
                .action(ArgAction::Count),
        )
        .get_matches();

    let level = match matches.get_count("verbose") {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    if let Some(path) = matches.get_one::<String>("generate-config") {
        match Config::default().to_file(path) {
            Ok(()) => {
                println!("Generated default configuration: {path}");
                return;
            }
            Err(e) => {
                eprintln!("Failed to generate configuration: {e}");
                process::exit(1);
            }
        }
    }

    let config_path = matches
        .get_one::<String>("config")
        .expect("has a default")
        .clone();
    let config = match Config::from_file(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration from {config_path}: {e}");
            process::exit(1);
        }
    };

    if matches.get_flag("test-config") {
        let problems = config.validate();
        println!("Configuration: {config_path}");
        println!("Rules: {}", config.rules.len());
        if problems.is_empty() {
            println!("Configuration is valid");
            return;
        }
        for (rule_id, problem) in &problems {
            println!("  rule '{rule_id}': {problem}");
        }
        process::exit(1);
    }

    let mailbox = Arc::new(JsonMailbox::new(&config.mailbox_path));
    let rule_store = Arc::new(ConfigRuleStore::new(&config_path));
    let assignment_store = Arc::new(JsonAssignmentStore::new(&config.assignments_path));
    let ledger = Arc::new(JsonlLedger::new(&config.ledger_path));
    let engine = Engine::new(
        mailbox,
        rule_store,
        assignment_store,
        ledger,
        config.required_fields.clone(),
    );

    if matches.get_flag("run-once") {
        match engine.run_once().await {
            Ok(summary) => println!("{summary}"),
            Err(e) => {
                eprintln!("Run aborted: {e}");
                process::exit(1);
            }
        }
        return;
    }

    let shutdown = Arc::new(Notify::new());
    {
        let shutdown = shutdown.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            log::info!("interrupt received");
            shutdown.notify_one();
        }) {
            log::warn!("failed to install shutdown handler: {e}");
        }
    }

    log::info!(
        "polling mailbox every {}s (config: {config_path})",
        config.poll_interval_secs
    );
    let interval = Duration::from_secs(config.poll_interval_secs.max(1));
    engine::run_scheduled(&engine, interval, &shutdown).await;
}
