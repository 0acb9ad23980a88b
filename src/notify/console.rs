//! Console progress sink: writes human-readable lines to stderr.

use parking_lot::Mutex;

use super::{Notifier, ProgressEvent, Stage};

/// Writes progress events to stderr. When `show_progress_bar` is set,
/// events with a meaningful `total` (CHUNKING/CONTEXT/EMBEDDING) render
/// as a `[current/total]` counter overwriting the same line rather than
/// a log line each; every other stage always gets its own line.
pub struct ConsoleNotifier {
    show_progress_bar: bool,
    last_line_len: Mutex<usize>,
}

impl ConsoleNotifier {
    #[must_use]
    pub fn new(show_progress_bar: bool) -> Self {
        Self {
            show_progress_bar,
            last_line_len: Mutex::new(0),
        }
    }

    fn print_progress(&self, line: &str) {
        if self.show_progress_bar {
            let mut last_len = self.last_line_len.lock();
            eprint!("\r{:width$}\r{line}", "", width = *last_len);
            *last_len = line.len();
        } else {
            eprintln!("{line}");
        }
    }
}

#[async_trait::async_trait]
impl Notifier for ConsoleNotifier {
    async fn notify(&self, event: ProgressEvent) {
        match event.stage {
            Stage::Context | Stage::Embedding | Stage::Chunking if event.total > 0 => {
                self.print_progress(&format!(
                    "[{}] {} ({}/{})",
                    event.stage, event.message, event.current, event.total
                ));
            }
            Stage::Error => {
                let detail = event.error.as_deref().unwrap_or(&event.message);
                eprintln!("[ERROR] {detail}");
            }
            _ => {
                eprintln!("[{}] {}", event.stage, event.message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notify_does_not_panic_for_any_event() {
        let notifier = ConsoleNotifier::new(true);
        notifier
            .notify(ProgressEvent::new(Stage::Loading, "indexing a.md", 0, 1).with_file_path("a.md"))
            .await;
        notifier
            .notify(ProgressEvent::new(Stage::Embedding, "embedding", 1, 3))
            .await;
        notifier
            .notify(ProgressEvent::new(Stage::Error, "boom", 0, 0).with_error("daemon unreachable"))
            .await;
    }
}
