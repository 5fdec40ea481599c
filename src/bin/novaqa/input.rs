use crossbeam_channel::Sender;
use std::io::{self, BufRead};
use std::thread;
use tracing::debug;

/// Forward each stdin line; the thread ends on EOF or when the receiver goes away.
pub(crate) fn spawn_input_thread(tx: Sender<String>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    debug!(%err, "stdin read error");
                    break;
                }
            };
            if tx.send(line).is_err() {
                return;
            }
        }
    })
}
