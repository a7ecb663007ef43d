use env_logger::Env;
use log::{info, LevelFilter};

pub const ENGINE_NAMESPACE: &str = "speed_monitor::engine";
pub const ALERTS_NAMESPACE: &str = "speed_monitor::alerts";
pub const STORE_NAMESPACE: &str = "speed_monitor::store";
pub const SPEECH_NAMESPACE: &str = "speed_monitor::speech";
pub const COMMANDS_NAMESPACE: &str = "speed_monitor::commands";

/// Component targets that log at debug level regardless of `RUST_LOG`.
pub const NAMESPACES: [&str; 5] = [
    ENGINE_NAMESPACE,
    ALERTS_NAMESPACE,
    STORE_NAMESPACE,
    SPEECH_NAMESPACE,
    COMMANDS_NAMESPACE,
];

fn builder() -> env_logger::Builder {
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    builder
        .format_timestamp_millis()
        .format_module_path(true)
        .format_target(true);
    for namespace in NAMESPACES {
        builder.filter(Some(namespace), LevelFilter::Debug);
    }
    builder
}

/// `RUST_LOG` wins over the `info` default for everything outside [`NAMESPACES`].
pub fn init_logging() {
    builder().init();
    info!("Logging ready, component targets at debug");
}

#[macro_export]
macro_rules! engine_log {
    ($($arg:tt)*) => {
        log::log!(target: $crate::logging::ENGINE_NAMESPACE, $($arg)*)
    };
}

#[macro_export]
macro_rules! alerts_log {
    ($($arg:tt)*) => {
        log::log!(target: $crate::logging::ALERTS_NAMESPACE, $($arg)*)
    };
}

#[macro_export]
macro_rules! store_log {
    ($($arg:tt)*) => {
        log::log!(target: $crate::logging::STORE_NAMESPACE, $($arg)*)
    };
}

#[macro_export]
macro_rules! speech_log {
    ($($arg:tt)*) => {
        log::log!(target: $crate::logging::SPEECH_NAMESPACE, $($arg)*)
    };
}

#[macro_export]
macro_rules! commands_log {
    ($($arg:tt)*) => {
        log::log!(target: $crate::logging::COMMANDS_NAMESPACE, $($arg)*)
    };
}
