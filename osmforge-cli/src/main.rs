//! Entry point for the command-line interface.
#![forbid(unsafe_code)]

fn main() {
    if let Err(err) = osmforge_cli::run() {
        eprintln!("osmforge: {err}");
        std::process::exit(1);
    }
}
