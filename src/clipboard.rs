use anyhow::{Context, Result};
use arboard::Clipboard;
use tracing::{debug, warn};

/// Copies generated output to the system clipboard.
pub struct OutputClipboard {
    clipboard: Clipboard,
}

impl OutputClipboard {
    pub fn new() -> Result<Self> {
        let clipboard = Clipboard::new().context("Failed to initialize clipboard")?;
        Ok(Self { clipboard })
    }

    pub fn copy(&mut self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            debug!("Nothing to copy (empty output)");
            return Ok(());
        }

        self.clipboard
            .set_text(text)
            .context("Failed to copy output to clipboard")?;
        debug!("Copied {} characters to clipboard", text.chars().count());
        Ok(())
    }
}

/// Best-effort copy: clipboard trouble is logged, never fatal.
pub fn copy_output(text: &str) -> bool {
    match OutputClipboard::new().and_then(|mut clipboard| clipboard.copy(text)) {
        Ok(()) => true,
        Err(err) => {
            warn!("Clipboard unavailable: {:#}", err);
            false
        }
    }
}
