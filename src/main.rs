use clap::{App, AppSettings, Arg, SubCommand};
use scriptorium::build::build_site;
use scriptorium::config::Config;
use std::error::Error;
use std::path::Path;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() {
    let matches = App::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .global(true)
                .help("Log debug output (overridden by RUST_LOG)"),
        )
        .subcommand(
            SubCommand::with_name("build")
                .about("Builds the site")
                .arg(
                    Arg::with_name("project")
                        .short("p")
                        .long("project")
                        .takes_value(true)
                        .default_value(".")
                        .help("A directory in (or below) the project"),
                )
                .arg(
                    Arg::with_name("output")
                        .short("o")
                        .long("output")
                        .takes_value(true)
                        .default_value("_site")
                        .help("The output directory; deleted and recreated"),
                ),
        )
        .get_matches();

    init_tracing(matches.is_present("verbose"));

    if let ("build", Some(build)) = matches.subcommand() {
        let project = build.value_of("project").unwrap_or(".");
        let output = build.value_of("output").unwrap_or("_site");
        if let Err(err) = run(Path::new(project), Path::new(output)) {
            // Error messages already embed their causes.
            error!("{}", err);
            std::process::exit(1);
        }
    }
}

fn run(project: &Path, output: &Path) -> Result<(), Box<dyn Error>> {
    let project = std::fs::canonicalize(project)?;
    let config = Config::from_directory(&project, output)?;
    build_site(config)?;
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .compact()
        .init();
}
