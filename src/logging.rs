//! Logging setup and error reporting shared by the binaries.

use anyhow::Result;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Installs a subscriber that writes to stderr: `INFO` and up, or `DEBUG` and
/// up when `verbose` is set.
pub fn initialize_logging(verbose: bool) -> Result<()> {
    let level = match verbose {
        true => Level::DEBUG,
        false => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Prints `err` and its causes to stderr.
pub fn report(err: &anyhow::Error) {
    eprintln!("Error: {}", err);
    for cause in err.chain().skip(1) {
        eprintln!("  caused by: {}", cause);
    }
}
