//! Background queue plumbing: a single sender thread owns all posts to the
//! autograde queue, and a single listener thread consumes the report queue
//! and persists reports by submission id. The channel itself is not
//! thread-safe, so each direction is confined to its own thread.

use nbgrade_queue::Channel;
use nbgrade_util::file_util;
use serde_json::Value;
use std::{
    path::{Path, PathBuf},
    sync::mpsc,
    time::Duration,
};

const OPEN_RETRY_FOR: Duration = Duration::from_secs(60);

/// Spawns the queue sender. Posts that fail are logged and dropped.
pub fn spawn_queue_sender(spec: String, queue: String) -> mpsc::Sender<Vec<u8>> {
    let (tx, rx) = mpsc::channel::<Vec<u8>>();
    std::thread::spawn(move || {
        let mut channel = match Channel::open_with_backoff(&spec, OPEN_RETRY_FOR) {
            Ok(channel) => channel,
            Err(err) => {
                log::error!("error opening queue {spec:?}: {err}");
                return;
            }
        };
        for message in rx {
            log::debug!("posting {} bytes to queue {queue:?}", message.len());
            if let Err(err) = channel.post(&queue, &message) {
                log::error!("error posting to queue {queue:?}: {err}");
            }
        }
    });
    tx
}

/// Spawns the report listener: every message from the report queue is
/// persisted as `<upload_dir>/<submission_id>.txt`.
pub fn spawn_report_listener(spec: String, queue: String, upload_dir: PathBuf) {
    std::thread::spawn(move || {
        let mut channel = match Channel::open_with_backoff(&spec, OPEN_RETRY_FOR) {
            Ok(channel) => channel,
            Err(err) => {
                log::error!("error opening queue {spec:?}: {err}");
                return;
            }
        };
        log::info!("listening for reports on queue {queue:?}");
        loop {
            match channel.receive(&queue) {
                Ok(message) => persist_report(&upload_dir, &message),
                Err(err) => {
                    log::error!("error receiving from queue {queue:?}: {err}");
                    std::thread::sleep(Duration::from_secs(1));
                }
            }
        }
    });
}

// Messages lacking a recognizable submission id are logged and discarded.
pub(crate) fn persist_report(upload_dir: &Path, message: &[u8]) {
    log::debug!("received {} byte report", message.len());
    let data: Value = match serde_json::from_slice(message) {
        Ok(data) => data,
        Err(err) => {
            log::error!("error parsing report message: {err}");
            return;
        }
    };
    let Some(submission_id) = data.get("submission_id").and_then(Value::as_str) else {
        log::error!("report message did not have submission_id");
        return;
    };
    let path = upload_dir.join(format!("{submission_id}.txt"));
    if let Err(err) = file_util::write_to_file_with_mode(message, &path, 0o775) {
        log::error!("error writing report: {err}");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;

    #[test]
    fn persists_report_by_submission_id() {
        let temp = tempfile::tempdir().unwrap();
        let message = br#"{"submission_id": "abc", "e1": {"report": "<p>ok</p>"}}"#;
        persist_report(temp.path(), message);
        let written = std::fs::read(temp.path().join("abc.txt")).unwrap();
        assert_eq!(written, message);
    }

    #[test]
    fn discards_unidentifiable_messages() {
        let temp = tempfile::tempdir().unwrap();
        persist_report(temp.path(), b"not json");
        persist_report(temp.path(), b"{\"no_id\": true}");
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }
}
