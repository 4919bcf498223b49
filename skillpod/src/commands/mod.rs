pub mod environment;
pub mod exec;
pub mod files;
pub mod skills;

use anyhow::Result;
use serde::Serialize;
use std::process::ExitCode;

/// Pretty JSON on stdout.
pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Process exit code for a command exit status. Codes outside 0..=255 map to 1.
pub(crate) fn exit_code(code: i32) -> ExitCode {
    match u8::try_from(code) {
        Ok(code) => ExitCode::from(code),
        Err(_) => ExitCode::FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_out_of_range_is_failure() {
        assert_eq!(exit_code(3), ExitCode::from(3));
        assert_eq!(exit_code(0), ExitCode::SUCCESS);
        assert_eq!(exit_code(-1), ExitCode::FAILURE);
        assert_eq!(exit_code(300), ExitCode::FAILURE);
    }
}
