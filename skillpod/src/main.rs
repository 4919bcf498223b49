use std::process::ExitCode;

fn main() -> ExitCode {
    match skillpod::run_cli() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        }
    }
}
