use std::sync::mpsc::{channel, Receiver};
use std::time::Duration;

use reporter::ReportError;

/// A completion callback paired with the receiving end of its outcome.
pub fn completion() -> (
    impl FnOnce(Result<(), ReportError>) + Send + 'static,
    Receiver<Result<(), String>>,
) {
    let (tx, rx) = channel();
    let callback = move |result: Result<(), ReportError>| {
        tx.send(result.map_err(|e| e.to_string()))
            .expect("test receiver dropped");
    };
    (callback, rx)
}

pub fn outcome(rx: &Receiver<Result<(), String>>) -> Result<(), String> {
    rx.recv_timeout(Duration::from_secs(5))
        .expect("callback was not invoked")
}
