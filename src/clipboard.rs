use anyhow::{anyhow, Result};

pub trait ClipboardSink {
    fn set_text(&mut self, text: &str) -> Result<()>;
}

pub struct SystemClipboard {
    inner: arboard::Clipboard,
}

impl SystemClipboard {
    pub fn new() -> Result<Self> {
        let inner =
            arboard::Clipboard::new().map_err(|err| anyhow!("create clipboard context: {}", err))?;
        Ok(Self { inner })
    }
}

impl ClipboardSink for SystemClipboard {
    fn set_text(&mut self, text: &str) -> Result<()> {
        self.inner
            .set_text(text.to_string())
            .map_err(|err| anyhow!("copy to clipboard: {}", err))
    }
}

/// Hands the clipboard projection to `sink` exactly as derived.
pub fn copy_text(sink: &mut dyn ClipboardSink, clipboard_text: &str) -> Result<()> {
    sink.set_text(clipboard_text)?;
    tracing::debug!(chars = clipboard_text.chars().count(), "copied reply to clipboard");
    Ok(())
}
