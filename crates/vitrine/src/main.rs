//! Vitrine.
//!
//! Vitrine is the asset service behind an interactive 3D product
//! configurator. This binary wraps the service in a small command line tool,
//! currently used to warm the asset cache up and validate asset sources.

mod cli;

fn main() {
    match cli::execute() {
        Ok(()) => std::process::exit(0),
        Err(error) => {
            vitrine_assets::logging::ensure_log_error(&error);
            std::process::exit(1);
        }
    }
}
