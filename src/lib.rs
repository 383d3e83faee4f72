/*!
`sprout`: administration portal for a small childcare center.

Role-gated web pages (admin/teacher/parent) over a Postgres database:
enrollment records, daily attendance/activity logs, contact-form messages,
password reset, and CSV exports.
*/
pub mod auth;
pub mod config;
pub mod export;
pub mod inter;
pub mod mail;
pub mod page;
pub mod session;
pub mod store;
pub mod user;

use time::{format_description::FormatItem, macros::format_description};

/// Date format used everywhere a date faces the user (en-NZ day-first).
pub static DATE_FMT: &[FormatItem] = format_description!("[day]/[month]/[year]");

/// Timestamp format for exported/displayed timestamps.
pub static DATETIME_FMT: &[FormatItem] =
    format_description!("[day]/[month]/[year] [hour]:[minute]");

/// Format of date values arriving from HTML form inputs.
pub static FORM_DATE_FMT: &[FormatItem] = format_description!("[year]-[month]-[day]");

pub fn log_level_from_env() -> simplelog::LevelFilter {
    use simplelog::LevelFilter;

    let mut level_string = match std::env::var("LOG_LEVEL") {
        Err(_) => { return LevelFilter::Warn; },
        Ok(s) => s,
    };

    level_string.make_ascii_lowercase();
    match level_string.as_str() {
        "max" => LevelFilter::max(),
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Warn,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub fn ensure_logging() {
        use simplelog::{ColorChoice, TermLogger, TerminalMode};
        let log_cfg = simplelog::ConfigBuilder::new()
            .add_filter_allow_str("sprout")
            .build();
        let res = TermLogger::init(
            log_level_from_env(),
            log_cfg,
            TerminalMode::Stdout,
            ColorChoice::Auto
        );

        match res {
            Ok(_) => { log::info!("Test logging started."); },
            Err(_) => { log::info!("Test logging already started."); },
        }
    }
}
