mod cli;

use dsvc_core::{CoreError, DsvcErrorExt};

pub fn main() -> ! {
    env_logger::builder().parse_env("DSVC_LOG").init();
    match cli::run(std::env::args_os()) {
        Ok(()) => std::process::exit(0),
        Err(err) => {
            eprintln!("error: {}", err);
            if let Ok(core_err) = err.try_into_core_error() {
                if let Some(hint) = core_err.hint() {
                    eprint!("{}", hint);
                }
                std::process::exit(exit_code_for(&core_err));
            }
            std::process::exit(1)
        }
    }
}

/// distinct exit codes for the error kinds a script driving this CLI might
/// want to branch on, beyond the generic 1 (spec §7: conflicts in particular
/// are routine, not exceptional, and worth a distinct code).
fn exit_code_for(err: &CoreError) -> i32 {
    match err {
        CoreError::Conflict(..) => 2,
        CoreError::NotFound(..) | CoreError::NoCommit(..) => 3,
        _ => 1,
    }
}
