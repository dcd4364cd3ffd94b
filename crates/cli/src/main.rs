use std::process::ExitCode;

fn main() -> ExitCode {
    rfpflow_cli::run()
}
