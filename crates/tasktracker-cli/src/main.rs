//! `tasktracker` binary: scripted session demo and config inspection

mod demo;

use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::time::Duration;
use tasktracker_session::SessionConfig;
use tasktracker_store::MemoryStoreConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn cli() -> Command {
    Command::new("tasktracker")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Session-scoped task tracker against an in-memory store")
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .global(true)
                .default_value("info")
                .help("Log filter used when RUST_LOG is unset"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Session config file (TOML)"),
        )
        .subcommand(
            Command::new("demo")
                .about("Sign in, resolve projects, add tasks, sign out")
                .arg(
                    Arg::new("user")
                        .long("user")
                        .default_value("demo-user")
                        .help("Principal id to sign in as"),
                )
                .arg(
                    Arg::new("open-latency-ms")
                        .long("open-latency-ms")
                        .default_value("150")
                        .value_parser(value_parser!(u64))
                        .help("Simulated store open latency"),
                )
                .arg(
                    Arg::new("provision-after-ms")
                        .long("provision-after-ms")
                        .default_value("500")
                        .value_parser(value_parser!(u64))
                        .help("Delay before the membership record is provisioned"),
                )
                .arg(
                    Arg::new("task")
                        .long("task")
                        .action(ArgAction::Append)
                        .help("Task title to create (repeatable)"),
                ),
        )
        .subcommand(Command::new("config").about("Print the effective configuration as JSON"))
}

fn init_logging(matches: &ArgMatches) {
    let level = matches
        .get_one::<String>("log-level")
        .map_or("info", String::as_str);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if matches.get_flag("log-json") {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().flatten_event(true))
            .init();
    } else {
        tracing_subscriber::registry().with(env_filter).with(fmt::layer()).init();
    }
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<SessionConfig> {
    match matches.get_one::<PathBuf>("config") {
        Some(path) => SessionConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display())),
        None => Ok(SessionConfig::default()),
    }
}

fn millis(args: &ArgMatches, name: &str) -> Duration {
    Duration::from_millis(args.get_one::<u64>(name).copied().unwrap_or_default())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_logging(&matches);
    let config = load_config(&matches)?;

    match matches.subcommand() {
        Some(("demo", args)) => {
            let options = demo::DemoOptions {
                user: args
                    .get_one::<String>("user")
                    .cloned()
                    .unwrap_or_else(|| "demo-user".to_string()),
                store: MemoryStoreConfig::new()
                    .with_open_latency(millis(args, "open-latency-ms")),
                provision_after: millis(args, "provision-after-ms"),
                tasks: args
                    .get_many::<String>("task")
                    .map(|titles| titles.cloned().collect())
                    .unwrap_or_else(|| vec!["Buy groceries".into(), "Book flights".into()]),
                config,
            };

            let report = demo::run(options).await?;
            println!();
            println!("{report}");
        }
        Some(("config", _)) => {
            let effective = serde_json::json!({
                "session": config,
                "store": MemoryStoreConfig::default(),
            });
            println!("{}", serde_json::to_string_pretty(&effective)?);
        }
        _ => {
            cli().print_help()?;
            println!();
        }
    }

    Ok(())
}
