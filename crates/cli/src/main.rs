use std::process::ExitCode;

fn main() -> ExitCode {
    storerank_cli::run()
}
