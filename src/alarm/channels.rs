//! Capabilities the alarm talks to. Every one of them may be missing on a given platform, so all
//! calls are fallible and their errors are only ever logged by the dispatcher.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use tracing::info;

use crate::{board::Board, model::settings::CustomAudio};

use super::{
    audio::{BeepPattern, Chime},
    AlarmNotification,
};

#[cfg_attr(test, mockall::automock)]
pub trait AudioOutput: Send + Sync {
    /// Starts looping `clip` until [AudioOutput::stop]. Fails when the clip can't be decoded or
    /// played, in which case the caller falls back to the beep.
    fn play_clip(&self, clip: &CustomAudio, volume: f32) -> Result<()>;

    /// Plays one round of the synthesized pattern.
    fn play_beep(&self, pattern: &BeepPattern, volume: f32) -> Result<()>;

    /// Plays `chime` once, alongside whatever is already playing.
    fn play_chime(&self, chime: &Chime, volume: f32) -> Result<()>;

    fn stop(&self) -> Result<()>;
}

#[cfg_attr(test, mockall::automock)]
pub trait Vibrator: Send + Sync {
    /// Alternating on/off durations in milliseconds.
    fn vibrate(&self, pattern: &[u32]) -> Result<()>;
}

#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    /// Desktop notification.
    fn show(&self, notification: &AlarmNotification) -> Result<()>;

    /// Hands the notification to the background channel so it can be re-delivered while the
    /// foreground is not visible.
    fn push(&self, notification: &AlarmNotification) -> Result<()>;
}

#[cfg_attr(test, mockall::automock)]
pub trait VoiceAnnouncer: Send + Sync {
    fn speak(&self, text: &str) -> Result<()>;
}

#[cfg_attr(test, mockall::automock)]
pub trait WakeLock: Send + Sync {
    fn acquire(&self) -> Result<()>;

    fn release(&self) -> Result<()>;
}

/// The rendering layer. It is told to redraw after every state change and owns the alarm overlay.
#[cfg_attr(test, mockall::automock)]
pub trait Presenter: Send + Sync {
    fn render(&self, board: &Board, now: DateTime<Utc>);

    fn show_alarm(&self, message: &str) -> Result<()>;

    fn hide_alarm(&self) -> Result<()>;

    /// Short, transient message for the user.
    fn notice(&self, message: &str);
}

/// Stand-in for a capability the platform doesn't have.
pub struct Unsupported(pub &'static str);

impl Vibrator for Unsupported {
    fn vibrate(&self, _pattern: &[u32]) -> Result<()> {
        Err(anyhow!("{} is not supported", self.0))
    }
}

impl WakeLock for Unsupported {
    fn acquire(&self) -> Result<()> {
        Err(anyhow!("{} is not supported", self.0))
    }

    fn release(&self) -> Result<()> {
        Ok(())
    }
}

/// Notifier and announcer that only write to the log.
pub struct LogOnly;

impl Notifier for LogOnly {
    fn show(&self, notification: &AlarmNotification) -> Result<()> {
        info!(tag = notification.tag, "{}: {}", notification.title, notification.body);
        Ok(())
    }

    fn push(&self, notification: &AlarmNotification) -> Result<()> {
        info!(
            tag = notification.tag,
            timestamp = %notification.timestamp,
            "Background alarm {}",
            notification.body
        );
        Ok(())
    }
}

impl VoiceAnnouncer for LogOnly {
    fn speak(&self, text: &str) -> Result<()> {
        info!("Announcing: {text}");
        Ok(())
    }
}

/// Every output of an alarm. Only the presenter's overlay and the audio are considered
/// mandatory; the rest degrade silently.
#[derive(Clone)]
pub struct AlarmChannels {
    pub presenter: Arc<dyn Presenter>,
    pub audio: Arc<dyn AudioOutput>,
    pub vibrator: Arc<dyn Vibrator>,
    pub notifier: Arc<dyn Notifier>,
    pub voice: Arc<dyn VoiceAnnouncer>,
}

impl AlarmChannels {
    pub fn new(presenter: Arc<dyn Presenter>, audio: Arc<dyn AudioOutput>) -> Self {
        Self {
            presenter,
            audio,
            vibrator: Arc::new(Unsupported("vibration")),
            notifier: Arc::new(LogOnly),
            voice: Arc::new(LogOnly),
        }
    }

    pub fn with_vibrator(self, vibrator: Arc<dyn Vibrator>) -> Self {
        Self { vibrator, ..self }
    }

    pub fn with_notifier(self, notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier, ..self }
    }

    pub fn with_voice(self, voice: Arc<dyn VoiceAnnouncer>) -> Self {
        Self { voice, ..self }
    }
}
