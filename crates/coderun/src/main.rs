use std::io::Read;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use coderun::setup::{open_session, relay_state};
use coderun_config::{ResolvedConfig, set_global_config};
use eyre::{Result, eyre};
use tracing_subscriber::prelude::*;

fn init_tracing() {
    let filter = tracing_subscriber::filter::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new("info"));

    // Script output owns stdout
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();
    tracing_subscriber::registry()
        .with(
            fmt_layer
                .with_timer(tracing_subscriber::fmt::time::SystemTime)
                .with_filter(filter),
        )
        .init();
}

fn cli() -> Command {
    let index = || {
        Arg::new("index")
            .required(true)
            .value_parser(value_parser!(usize))
            .help("Template position in the gallery")
    };

    Command::new("crun")
        .about("Edit and run table snippets")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("project")
                .long("project")
                .global(true)
                .value_parser(value_parser!(Utf8PathBuf))
                .help("Project root (default: discover .config/coderun.yaml upwards)"),
        )
        .subcommand(Command::new("templates").about("List the template gallery"))
        .subcommand(
            Command::new("show")
                .about("Print a template's current text")
                .arg(index()),
        )
        .subcommand(
            Command::new("edit")
                .about("Replace a template's text from a file or stdin")
                .arg(index())
                .arg(
                    Arg::new("source")
                        .default_value("-")
                        .value_parser(value_parser!(Utf8PathBuf))
                        .help("File to read, or - for stdin"),
                ),
        )
        .subcommand(
            Command::new("reset")
                .about("Restore a template's original text")
                .arg(index()),
        )
        .subcommand(
            Command::new("run")
                .about("Run a template, or a file")
                .arg(
                    Arg::new("index")
                        .value_parser(value_parser!(usize))
                        .conflicts_with("file")
                        .help("Template position in the gallery (default: 0)"),
                )
                .arg(
                    Arg::new("file")
                        .long("file")
                        .value_parser(value_parser!(Utf8PathBuf))
                        .help("Run this file instead of a template"),
                ),
        )
        .subcommand(
            Command::new("serve")
                .about("Serve the relay and the runner assets")
                .arg(
                    Arg::new("bind")
                        .long("bind")
                        .value_parser(value_parser!(SocketAddr))
                        .help("Listen address (default: relay.bind)"),
                )
                .arg(
                    Arg::new("quiet")
                        .long("quiet")
                        .action(ArgAction::SetTrue)
                        .help("Do not print the listen address"),
                ),
        )
}

fn load_config(matches: &ArgMatches) -> Result<&'static ResolvedConfig> {
    let config = match matches.get_one::<Utf8PathBuf>("project") {
        Some(root) => ResolvedConfig::discover_from(root)?,
        None => ResolvedConfig::discover()?,
    };
    tracing::debug!(root = %config.root, "configuration loaded");
    set_global_config(config)?;
    coderun_config::global_config().ok_or_else(|| eyre!("configuration not initialized"))
}

fn read_source(path: &Utf8PathBuf) -> Result<String> {
    if path == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        Ok(text)
    } else {
        Ok(fs_err::read_to_string(path)?)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    init_tracing();

    let matches = cli().get_matches();
    let config = load_config(&matches)?;

    match matches.subcommand() {
        Some(("templates", _)) => {
            let session = open_session(config).await?;
            let gallery = session.workbench().gallery();
            for (index, template) in gallery.list_templates().iter().enumerate() {
                let mark = if gallery.select(index)?.dirty { "*" } else { " " };
                println!("{index:>2} {mark} {}", template.title);
            }
        }
        Some(("show", args)) => {
            let mut session = open_session(config).await?;
            let index = *args.get_one::<usize>("index").ok_or_else(|| eyre!("index required"))?;
            let snapshot = session.select(index)?;
            print!("{}", snapshot.text);
            if !snapshot.text.ends_with('\n') {
                println!();
            }
        }
        Some(("edit", args)) => {
            let mut session = open_session(config).await?;
            let index = *args.get_one::<usize>("index").ok_or_else(|| eyre!("index required"))?;
            let source = args
                .get_one::<Utf8PathBuf>("source")
                .ok_or_else(|| eyre!("source required"))?;
            let text = read_source(source)?;
            session.select(index)?;
            let snapshot = session.edit(&text)?;
            tracing::info!(index, dirty = snapshot.dirty, "template updated");
        }
        Some(("reset", args)) => {
            let mut session = open_session(config).await?;
            let index = *args.get_one::<usize>("index").ok_or_else(|| eyre!("index required"))?;
            session.select(index)?;
            session.reset()?;
            tracing::info!(index, "template restored");
        }
        Some(("run", args)) => {
            let mut session = open_session(config).await?;
            let output = match args.get_one::<Utf8PathBuf>("file") {
                Some(path) => session.runner().run(read_source(path)?).await,
                None => {
                    let index = args.get_one::<usize>("index").copied().unwrap_or(0);
                    session.select(index)?;
                    session.run().await
                }
            };
            print!("{}", output.logs);
            if let Some(error) = output.error {
                eprintln!("{error}");
                return Ok(ExitCode::FAILURE);
            }
        }
        Some(("serve", args)) => {
            let bind = args
                .get_one::<SocketAddr>("bind")
                .copied()
                .unwrap_or(config.relay.bind);
            let state = Arc::new(relay_state(config)?);
            let listener = tokio::net::TcpListener::bind(bind).await?;
            if !args.get_flag("quiet") {
                println!("relay: http://{}", listener.local_addr()?);
            }
            coderun_relay::serve(listener, state, shutdown_signal()).await?;
        }
        Some((other, _)) => return Err(eyre!("unknown command: {other}")),
        None => return Err(eyre!("no command given")),
    }

    Ok(ExitCode::SUCCESS)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_well_formed() {
        cli().debug_assert();
    }

    #[test]
    fn run_accepts_index_or_file() {
        let m = cli().try_get_matches_from(["crun", "run", "3"]).unwrap();
        let (_, run) = m.subcommand().unwrap();
        assert_eq!(run.get_one::<usize>("index"), Some(&3));

        let m = cli()
            .try_get_matches_from(["crun", "--project", "/tmp/p", "run", "--file", "a.rhai"])
            .unwrap();
        assert_eq!(
            m.get_one::<Utf8PathBuf>("project").map(|p| p.as_str()),
            Some("/tmp/p")
        );

        assert!(
            cli()
                .try_get_matches_from(["crun", "run", "1", "--file", "a.rhai"])
                .is_err()
        );
    }

    #[test]
    fn edit_defaults_to_stdin() {
        let m = cli().try_get_matches_from(["crun", "edit", "2"]).unwrap();
        let (_, edit) = m.subcommand().unwrap();
        assert_eq!(
            edit.get_one::<Utf8PathBuf>("source").map(|p| p.as_str()),
            Some("-")
        );
    }
}
