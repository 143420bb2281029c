use std::process::ExitCode;

fn main() -> ExitCode {
    match scenegate::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("scenegate: {}", e);
            ExitCode::FAILURE
        }
    }
}
