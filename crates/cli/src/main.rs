use std::process::ExitCode;

fn main() -> ExitCode {
    curator_cli::run()
}
