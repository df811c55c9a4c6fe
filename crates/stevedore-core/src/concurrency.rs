use crate::CoreError;
use stevedore_runtime::CancelToken;

/// Route Ctrl-C to `token`. A second Ctrl-C while the first is still being
/// honoured exits the process immediately.
///
/// Only one handler can be installed per process.
pub fn install_signal_handler(token: CancelToken) -> Result<(), CoreError> {
    ctrlc::set_handler(move || {
        if token.is_cancelled() {
            std::process::exit(130);
        }
        token.cancel();
        eprintln!("\ncancellation requested, stopping the engine...");
    })?;
    Ok(())
}
