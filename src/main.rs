use anyhow::Result;
use clap::{App, Arg};
use diarchive::build::build_archive;
use diarchive::config::Config;
use diarchive::logging::{initialize_logging, report};
use std::path::{Path, PathBuf};
use tracing::info;

fn main() {
    if let Err(err) = run() {
        report(&err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let matches = App::new("diarchive")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Builds a static HTML archive from tDiary data")
        .arg(
            Arg::with_name("conf")
                .short("c")
                .long("conf")
                .value_name("DIR")
                .takes_value(true)
                .help("Where to start looking for diarchive.yaml [default: .]"),
        )
        .arg(
            Arg::with_name("data-dir")
                .short("d")
                .long("data-dir")
                .value_name("DIR")
                .takes_value(true)
                .help("The tDiary data directory, overriding the configuration"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Logs every page written or skipped"),
        )
        .arg(
            Arg::with_name("OUTPUT_DIR")
                .index(1)
                .help("Where to write the archive [default: output next to diarchive.yaml]"),
        )
        .get_matches();

    initialize_logging(matches.is_present("verbose"))?;

    let conf_directory = match matches.value_of("conf") {
        Some(dir) => PathBuf::from(dir),
        None => std::env::current_dir()?,
    };
    let config = Config::from_directory(
        &conf_directory,
        matches.value_of("OUTPUT_DIR").map(Path::new),
        matches.value_of("data-dir").map(Path::new),
    )?;
    let report = build_archive(&config)?;
    info!(output = %config.output_directory.display(), "{}", report);
    Ok(())
}
