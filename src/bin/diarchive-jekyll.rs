use anyhow::Result;
use clap::{App, Arg};
use diarchive::jekyll::export;
use diarchive::logging::{initialize_logging, report};
use std::path::Path;
use tracing::info;

fn main() {
    if let Err(err) = run() {
        report(&err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let matches = App::new("diarchive-jekyll")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Exports tDiary data as Jekyll posts")
        .arg(
            Arg::with_name("data-dir")
                .long("data-dir")
                .value_name("DIR")
                .default_value("data")
                .help("The directory that has tDiary data"),
        )
        .arg(
            Arg::with_name("output-dir")
                .long("output-dir")
                .value_name("DIR")
                .default_value("jekyll")
                .help("The directory that holds exported posts"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Logs every post written"),
        )
        .get_matches();

    initialize_logging(matches.is_present("verbose"))?;

    let data_directory = Path::new(matches.value_of("data-dir").unwrap_or("data"));
    let output_directory = Path::new(matches.value_of("output-dir").unwrap_or("jekyll"));
    let written = export(data_directory, output_directory)?;
    info!(output = %output_directory.display(), "{} posts exported", written);
    Ok(())
}
