//! chkregf - check the structural integrity of a registry hive file.
//!
//! Exit codes: 0 clean, 1 structural errors, 2 file not openable,
//! 3 out of memory at startup.

use regf_check::{CheckError, Checker, HiveFile};
use std::env;
use std::io::{self, ErrorKind};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut args = env::args().skip(1);
    let path = match (args.next(), args.next()) {
        (Some(path), None) => path,
        _ => {
            println!("Usage: chkregf REGFILE");
            return ExitCode::from(1);
        }
    };

    let hive = match HiveFile::open(&path) {
        Ok(hive) => hive,
        Err(CheckError::Io(err)) if err.kind() == ErrorKind::OutOfMemory => {
            println!("Memory allocation error");
            return ExitCode::from(3);
        }
        Err(_) => {
            println!("Error: file not found");
            return ExitCode::from(2);
        }
    };

    let stdout = io::stdout();
    let mut checker = Checker::new(&hive, stdout.lock());

    if checker.run() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}
