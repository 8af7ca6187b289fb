//! Spinner driven by operation progress events

use std::time::Duration;

use backupctl_core::{ProgressCallback, ProgressEvent};
use indicatif::{ProgressBar, ProgressStyle};

/// Last path segment of an operation or resource name
fn short(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Spinner line for an event
fn message(event: &ProgressEvent) -> String {
    match event {
        ProgressEvent::Started { operation } => format!("Operation {} started", short(operation)),
        ProgressEvent::Polling {
            operation,
            progress_percent,
            ..
        } => match progress_percent {
            Some(percent) => format!("Operation {}: {}% complete", short(operation), percent),
            None => format!("Operation {}: running", short(operation)),
        },
        ProgressEvent::CancelRequested { operation } => {
            format!("Cancelling operation {}", short(operation))
        }
        ProgressEvent::Completed { operation } => {
            format!("\u{2713} Operation {} done", short(operation))
        }
        ProgressEvent::Cancelled { operation } => {
            format!("\u{2298} Operation {} cancelled", short(operation))
        }
        ProgressEvent::Failed { operation, error } => {
            format!("\u{2717} Operation {} failed: {}", short(operation), error)
        }
        ProgressEvent::TimedOut { operation, waited } => format!(
            "\u{2717} Gave up on operation {} after {}s",
            short(operation),
            waited.as_secs()
        ),
    }
}

fn is_final(event: &ProgressEvent) -> bool {
    matches!(
        event,
        ProgressEvent::Completed { .. }
            | ProgressEvent::Cancelled { .. }
            | ProgressEvent::Failed { .. }
            | ProgressEvent::TimedOut { .. }
    )
}

/// Spinner on stderr plus the callback that feeds it.
///
/// indicatif hides the spinner when stderr is not a terminal, so piped
/// output stays clean.
pub fn spinner(initial: &str) -> (ProgressBar, ProgressCallback) {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) =
        ProgressStyle::default_spinner().template("{spinner:.green} {msg} [{elapsed_precise}]")
    {
        pb.set_style(style);
    }
    pb.set_message(initial.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));

    let pb_clone = pb.clone();
    let callback: ProgressCallback = Box::new(move |event: ProgressEvent| {
        let msg = message(&event);
        if is_final(&event) {
            pb_clone.finish_with_message(msg);
        } else {
            pb_clone.set_message(msg);
        }
    });
    (pb, callback)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OP: &str = "projects/p/instances/i/backups/b1/operations/op1";

    #[test]
    fn test_polling_message_shows_percent() {
        let event = ProgressEvent::Polling {
            operation: OP.to_string(),
            progress_percent: Some(42),
            elapsed: Duration::from_secs(10),
        };
        assert_eq!(message(&event), "Operation op1: 42% complete");
        assert!(!is_final(&event));
    }

    #[test]
    fn test_terminal_events_finish_spinner() {
        let failed = ProgressEvent::Failed {
            operation: OP.to_string(),
            error: "code 9: boom".to_string(),
        };
        assert!(is_final(&failed));
        assert!(message(&failed).ends_with("failed: code 9: boom"));

        let timed_out = ProgressEvent::TimedOut {
            operation: OP.to_string(),
            waited: Duration::from_secs(2100),
        };
        assert!(message(&timed_out).contains("2100s"));
    }

    #[test]
    fn test_callback_updates_hidden_spinner() {
        let (pb, callback) = spinner("Waiting");
        callback(ProgressEvent::Started {
            operation: OP.to_string(),
        });
        assert_eq!(pb.message(), "Operation op1 started");
        callback(ProgressEvent::Completed {
            operation: OP.to_string(),
        });
        assert!(pb.is_finished());
    }
}
