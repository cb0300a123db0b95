use std::process::ExitCode;

fn main() -> ExitCode {
    charstats_cli::run()
}
