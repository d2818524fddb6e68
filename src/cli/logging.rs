// IntelliPest 🌿 AGPL-3.0 License

//! Console output helpers for the CLI.
//!
//! The library itself never prints; these macros exist for the binary
//! and honor a process-wide verbosity flag set once from the parsed
//! arguments.

use std::sync::atomic::{AtomicBool, Ordering};

static VERBOSE: AtomicBool = AtomicBool::new(true);

/// Set the process-wide verbosity flag.
pub fn set_verbose(verbose: bool) {
    VERBOSE.store(verbose, Ordering::Relaxed);
}

/// Whether verbose output is currently enabled.
pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

/// Plain informational line, always printed.
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        println!("{}", format!($($arg)*));
    }
}

/// Yellow warning to stderr.
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        use colored::Colorize;
        eprintln!("{} {}", "Warning:".yellow().bold(), format!($($arg)*));
    }
}

/// Red error to stderr.
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        use colored::Colorize;
        eprintln!("{} {}", "Error:".red().bold(), format!($($arg)*));
    }
}

/// Green check mark for a completed step.
#[macro_export]
macro_rules! success {
    ($($arg:tt)*) => {
        use colored::Colorize;
        println!("{} {}", "✓".green().bold(), format!($($arg)*));
    }
}

/// Line printed only when verbose output is enabled.
#[macro_export]
macro_rules! verbose {
    ($($arg:tt)*) => {
        if $crate::cli::logging::is_verbose() {
            println!("{}", format!($($arg)*));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_flag_round_trip() {
        set_verbose(false);
        assert!(!is_verbose());

        set_verbose(true);
        assert!(is_verbose());
    }
}
