//! Log4rs setup: console + rolling-free file appender, gated by the
//! configured [`log::LevelFilter`].
//!
//! Grounded on the teacher's `utils/logging.rs`: same pattern encoder, same
//! appender pair, same `additive(false)` module logger plus a `Root` fallback.

use log::LevelFilter;
use log4rs::{
    append::{console::ConsoleAppender, file::FileAppender},
    config::{Appender, Logger, Root},
    encode::pattern::PatternEncoder,
    init_config, Config,
};

const LOGGING_PATTERN: &str = "[{d} {h({l})} {M}] {m}{n}";

/// Log file path relative to the working directory.
pub const LOG_FILE_NAME: &str = "data/gateway.log";

/// Module path the gate logger narrows down to; everything else falls
/// through to the `Root` logger at [`LevelFilter::Warn`].
const GATEWAY_MODULE: &str = "sfs_lobby_gateway";

/// Initializes the global logger. Does nothing if `level` is
/// [`LevelFilter::Off`], matching the teacher's "don't init at all" escape
/// hatch for a fully silenced server.
pub fn setup(level: LevelFilter) {
    if level == LevelFilter::Off {
        return;
    }

    let pattern = Box::new(PatternEncoder::new(LOGGING_PATTERN));
    let console = Box::new(ConsoleAppender::builder().encoder(pattern.clone()).build());
    let file = Box::new(
        FileAppender::builder()
            .encoder(pattern)
            .build(LOG_FILE_NAME)
            .expect("unable to create logging file appender"),
    );

    const APPENDERS: [&str; 2] = ["stdout", "file"];

    let config = Config::builder()
        .appender(Appender::builder().build("stdout", console))
        .appender(Appender::builder().build("file", file))
        .logger(
            Logger::builder()
                .appenders(APPENDERS)
                .additive(false)
                .build(GATEWAY_MODULE, level),
        )
        .build(Root::builder().appenders(APPENDERS).build(LevelFilter::Warn))
        .expect("failed to create logging config");

    init_config(config).expect("unable to initialize logger");
}
