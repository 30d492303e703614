use log::*;

pub use log::LevelFilter::*;

/// Routes all records at `verbosity` to stdout, and warnings and above to
/// stderr as well.
pub fn setup_logging(verbosity: LevelFilter) {
    let result = fern::Dispatch::new()
        .level(verbosity)
        .format(|out, message, record| out.finish(format_args!("({}) {}: {}", record.level(), record.target(), message)))
        .chain(std::io::stdout())
        .chain(
            fern::Dispatch::new()
                .level(LevelFilter::Warn)
                .format(|out, message, _record| out.finish(format_args!("[notify] {}", message)))
                .chain(std::io::stderr()),
        )
        .apply();

    if let Err(err) = result {
        warn!("Logging already initialized: {}", err);
    }
}
