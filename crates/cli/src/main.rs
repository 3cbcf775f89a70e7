use std::process::ExitCode;

fn main() -> ExitCode {
    collaborator_cli::run()
}
