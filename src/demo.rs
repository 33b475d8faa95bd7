//! Fake device log generator for `--test-mode`.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const FAKE_DEVICE_TARGET: &str = "fake_device.1";

const MODULE_NAMES: [&str; 5] = ["APP", "RADIO", "BAT", "USB", "CPU"];
const BAR_SIZE: usize = 10;
const FILLER: &str = " Lorem ipsum dolor sit amet, consectetur adipiscing elit.";

/// Moving `=` marker inside a fixed-width bar.
fn progress_bar(count: u64) -> String {
    let position = usize::try_from(count % BAR_SIZE as u64).unwrap_or(0);
    if position == 0 {
        format!("{}=", " ".repeat(BAR_SIZE - 1))
    } else {
        format!(
            "{}={}",
            " ".repeat(position - 1),
            " ".repeat(BAR_SIZE - position)
        )
    }
}

/// Message text and module name for line number `count`.
#[must_use]
pub fn fake_log_line(count: u64) -> (String, &'static str) {
    let mut line = format!("Log message [{}] # {count}", progress_bar(count));
    if count % 10 == 0 {
        line.push_str(&FILLER.repeat(8));
    }
    let module = MODULE_NAMES[usize::try_from(count % MODULE_NAMES.len() as u64).unwrap_or(0)];
    (line, module)
}

/// Emit one fake device line per `interval` until `cancel` fires.
pub fn spawn_fake_device_logger(interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut count: u64 = 0;
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(interval) => {}
            }
            let (message, module) = fake_log_line(count);
            tracing::info!(target: FAKE_DEVICE_TARGET, module, "{message}");
            count += 1;
        }
        tracing::debug!("fake device logger stopped");
    })
}
