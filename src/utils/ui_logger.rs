use log::{error, info, warn};

/// log target for user facing lines; the terminal logger filters it out
/// because `ui_log` already printed the line itself
pub const UI_TARGET: &str = "ui";

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum LogCategory {
    Info,
    Warning,
    Error,
}

/// `ui_log` - show a line to the user and record it in the log file
pub fn ui_log(cat: LogCategory, s: &str) {
    match cat {
        LogCategory::Info => {
            println!("{s}");
            info!(target: UI_TARGET, "{s}");
        }
        LogCategory::Warning => {
            eprintln!("{s}");
            warn!(target: UI_TARGET, "{s}");
        }
        LogCategory::Error => {
            eprintln!("{s}");
            error!(target: UI_TARGET, "{s}");
        }
    }
}
