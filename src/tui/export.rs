use crate::orchestrator;
use crate::store::RunStore;
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

// Global clipboard manager channel - initialized once on first use
static CLIPBOARD_SENDER: OnceLock<std_mpsc::Sender<String>> = OnceLock::new();

/// Export the store's current run as a JSON report into `dir`.
/// Returns the path of the exported file.
pub fn export_report(dir: &Path, api_url: &str, store: &RunStore) -> Result<PathBuf> {
    let report = store.read_with(|state| orchestrator::build_report(api_url, state, Instant::now()));
    let path = dir.join(orchestrator::default_export_path(&report));
    orchestrator::export_json(&path, &report)?;
    Ok(path)
}

/// Initialize the clipboard manager thread if not already initialized.
/// The thread keeps each clipboard instance alive long enough for clipboard
/// managers on Linux to read the contents.
fn init_clipboard_manager() -> Result<&'static std_mpsc::Sender<String>> {
    CLIPBOARD_SENDER.get_or_init(|| {
        let (tx, rx) = std_mpsc::channel::<String>();

        std::thread::spawn(move || {
            use arboard::Clipboard;

            for text in rx {
                if let Ok(mut clipboard) = Clipboard::new() {
                    if clipboard.set_text(&text).is_ok() {
                        std::thread::sleep(Duration::from_secs(2));
                    }
                }
            }
        });

        tx
    });

    CLIPBOARD_SENDER
        .get()
        .ok_or_else(|| anyhow::anyhow!("Failed to initialize clipboard manager"))
}

/// Queue `text` for the clipboard without blocking the UI thread.
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    let sender = init_clipboard_manager()?;
    sender
        .send(text.to_string())
        .map_err(|_| anyhow::anyhow!("Clipboard manager channel closed"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RunConfiguration, RunId, RunReport};

    #[test]
    fn export_writes_report_named_after_run() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = RunStore::with_configuration(RunConfiguration::new("r", "t", "l"));
        let epoch = store.start_run();
        store.attach_run(epoch, RunId::new("abc"));

        let path = export_report(dir.path(), "http://agent", &store).expect("export");
        assert_eq!(path, dir.path().join("healing-run-abc.json"));
        let report: RunReport =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("parse");
        assert_eq!(report.status_label, "RUNNING");
        assert_eq!(report.api_url, "http://agent");
    }
}
