//! Notification sinks: where texts and files are delivered.

pub mod directory;
pub mod telegram;

use crate::config::{DeliveryConfig, DeliveryMode};
use crate::error::{RelayError, Result};

/// A channel accepting short texts and named files.
///
/// The destination (chat, directory) is bound when the sink is built.
pub trait NotificationSink {
    /// Deliver a short text message.
    fn send_text(&mut self, text: &str) -> Result<()>;

    /// Deliver a file with an optional caption.
    fn send_file(&mut self, file_name: &str, bytes: &[u8], caption: Option<&str>) -> Result<()>;
}

impl<S: NotificationSink + ?Sized> NotificationSink for Box<S> {
    fn send_text(&mut self, text: &str) -> Result<()> {
        (**self).send_text(text)
    }

    fn send_file(&mut self, file_name: &str, bytes: &[u8], caption: Option<&str>) -> Result<()> {
        (**self).send_file(file_name, bytes, caption)
    }
}

/// Build the sink selected in the configuration.
pub fn open_sink(config: &DeliveryConfig) -> Result<Box<dyn NotificationSink>> {
    match config.mode {
        DeliveryMode::Telegram => Ok(Box::new(
            telegram::TelegramSink::new(&config.token, &config.chat_id)?
                .with_api_url(&config.api_url),
        )),
        DeliveryMode::Directory => {
            let dir = config.output_dir.clone().ok_or_else(|| {
                RelayError::Config("delivery.output_dir is required for directory mode".into())
            })?;
            Ok(Box::new(directory::DirectorySink::create(dir)?))
        }
    }
}
