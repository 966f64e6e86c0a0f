//! Fan-out of a completed timer to every channel the platform offers. Only one alarm plays at a
//! time; alarms that fire while another is playing wait in a queue until the playing one is
//! acknowledged with [AlarmDispatcher::stop].

pub mod audio;
pub mod channels;
pub mod wake_lock;

use std::{collections::VecDeque, sync::Arc, time::Duration};

use audio::{BeepPattern, Chime};
use channels::AlarmChannels;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    model::{kanban::TaskId, settings::CustomAudio, settings::Settings},
    utils::clock::Clock,
};

pub const ALARM_TAG: &str = "zen-tasks-alarm";

/// On/off milliseconds used both for the notification and for direct vibration.
pub const VIBRATION_PATTERN: [u32; 9] = [500, 200, 500, 200, 1000, 200, 500, 200, 500];

pub const BEEP_REPEAT: Duration = Duration::from_millis(1500);
pub const VIBRATION_REPEAT: Duration = Duration::from_secs(3);

/// A timer that reached its deadline.
#[derive(Debug, Clone, PartialEq)]
pub struct AlarmRequest {
    pub task_id: TaskId,
    pub title: String,
    pub triggered_at: DateTime<Utc>,
}

impl AlarmRequest {
    pub fn new(task_id: TaskId, title: String, triggered_at: DateTime<Utc>) -> Self {
        Self {
            task_id,
            title,
            triggered_at,
        }
    }

    /// Text of the overlay.
    pub fn message(&self) -> String {
        format!("Time is up for \"{}\"", self.title)
    }

    pub fn announcement(&self) -> String {
        format!("The task {} has completed its time", self.title)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmNotification {
    pub title: String,
    pub body: String,
    pub tag: &'static str,
    pub require_interaction: bool,
    pub vibrate: Vec<u32>,
    pub timestamp: DateTime<Utc>,
}

impl From<&AlarmRequest> for AlarmNotification {
    fn from(request: &AlarmRequest) -> Self {
        Self {
            title: "Time completed!".into(),
            body: format!("The task \"{}\" has completed its estimated time", request.title),
            tag: ALARM_TAG,
            require_interaction: true,
            vibrate: VIBRATION_PATTERN.to_vec(),
            timestamp: request.triggered_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Nothing was playing, the alarm is now active.
    Started,
    /// Another alarm is playing; this one plays once the current one is stopped.
    Queued,
    /// The task is already playing or waiting, nothing changed.
    AlreadyQueued,
}

struct ActiveAlarm {
    request: AlarmRequest,
    /// Cancels the beep and vibration repeaters of this alarm.
    repeat: CancellationToken,
}

pub struct AlarmDispatcher {
    channels: AlarmChannels,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
    active: Option<ActiveAlarm>,
    queue: VecDeque<AlarmRequest>,
    volume: f32,
    custom_audio: Option<CustomAudio>,
    notifications_enabled: bool,
    beep: BeepPattern,
}

impl AlarmDispatcher {
    pub fn new(channels: AlarmChannels, clock: Arc<dyn Clock>, shutdown: CancellationToken) -> Self {
        let defaults = Settings::default();
        Self {
            channels,
            clock,
            shutdown,
            active: None,
            queue: VecDeque::new(),
            volume: defaults.audio_volume,
            custom_audio: defaults.custom_audio,
            notifications_enabled: defaults.notifications_enabled,
            beep: BeepPattern::ALARM,
        }
    }

    pub fn apply_settings(&mut self, settings: &Settings) {
        self.volume = settings.audio_volume;
        self.custom_audio = settings.custom_audio.clone();
        self.notifications_enabled = settings.notifications_enabled;
    }

    pub fn is_playing(&self) -> bool {
        self.active.is_some()
    }

    pub fn current(&self) -> Option<&AlarmRequest> {
        self.active.as_ref().map(|v| &v.request)
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Requires a tokio runtime, the repeaters are spawned tasks.
    pub fn trigger(&mut self, request: AlarmRequest) -> TriggerOutcome {
        let Some(active) = &self.active else {
            self.start(request);
            return TriggerOutcome::Started;
        };

        if active.request.task_id == request.task_id
            || self.queue.iter().any(|v| v.task_id == request.task_id)
        {
            debug!("Alarm for task {} is already pending", request.task_id);
            return TriggerOutcome::AlreadyQueued;
        }
        info!(
            "Alarm for task {} queued behind task {}",
            request.task_id, active.request.task_id
        );
        self.queue.push_back(request);
        TriggerOutcome::Queued
    }

    /// Acknowledges the playing alarm and starts the next queued one. Safe to call when nothing
    /// is playing.
    pub fn stop(&mut self) -> Option<AlarmRequest> {
        let active = self.active.take()?;
        active.repeat.cancel();
        if let Err(e) = self.channels.audio.stop() {
            warn!("Failed to stop alarm audio {e:?}");
        }
        if let Err(e) = self.channels.presenter.hide_alarm() {
            warn!("Failed to hide alarm overlay {e:?}");
        }
        info!("Alarm for task {} stopped", active.request.task_id);

        if let Some(next) = self.queue.pop_front() {
            self.start(next);
        }
        Some(active.request)
    }

    /// Same as [AlarmDispatcher::stop]. The returned request is what the caller announces again
    /// once the snooze delay passes.
    pub fn snooze(&mut self) -> Option<AlarmRequest> {
        let request = self.stop()?;
        info!("Alarm for task {} snoozed", request.task_id);
        Some(request)
    }

    /// Completion sound, played once per batch of completed timers before their alarms.
    pub fn chime(&self) {
        if let Err(e) = self.channels.audio.play_chime(&Chime::COMPLETION, self.volume) {
            debug!("Failed to play the completion chime {e:?}");
        }
    }

    /// Silences everything and forgets the queue.
    pub fn shutdown(&mut self) {
        self.queue.clear();
        self.stop();
    }

    fn start(&mut self, request: AlarmRequest) {
        info!("Alarm for task {} started", request.task_id);
        let channels = &self.channels;

        if let Err(e) = channels.presenter.show_alarm(&request.message()) {
            warn!("Failed to show alarm overlay {e:?}");
        }

        let beeping = match &self.custom_audio {
            Some(clip) => match channels.audio.play_clip(clip, self.volume) {
                Ok(()) => false,
                Err(e) => {
                    warn!("Custom alarm audio failed {e:?}");
                    channels
                        .presenter
                        .notice("Custom alarm audio could not be played, using the default tone");
                    true
                }
            },
            None => true,
        };
        if beeping {
            if let Err(e) = channels.audio.play_beep(&self.beep, self.volume) {
                warn!("Failed to play alarm tone {e:?}");
            }
        }

        if self.notifications_enabled {
            let notification = AlarmNotification::from(&request);
            if let Err(e) = channels.notifier.show(&notification) {
                debug!("Notification unavailable {e:?}");
            }
            if let Err(e) = channels.notifier.push(&notification) {
                debug!("Background notification unavailable {e:?}");
            }
        }

        if let Err(e) = channels.voice.speak(&request.announcement()) {
            debug!("Voice announcement unavailable {e:?}");
        }

        if let Err(e) = channels.vibrator.vibrate(&VIBRATION_PATTERN) {
            debug!("Vibration unavailable {e:?}");
        }

        let repeat = self.shutdown.child_token();
        if beeping {
            let audio = channels.audio.clone();
            let (beep, volume) = (self.beep, self.volume);
            spawn_repeating(repeat.clone(), self.clock.clone(), BEEP_REPEAT, move || {
                if let Err(e) = audio.play_beep(&beep, volume) {
                    debug!("Failed to repeat alarm tone {e:?}");
                }
            });
        }
        let vibrator = channels.vibrator.clone();
        spawn_repeating(repeat.clone(), self.clock.clone(), VIBRATION_REPEAT, move || {
            if let Err(e) = vibrator.vibrate(&VIBRATION_PATTERN) {
                debug!("Vibration unavailable {e:?}");
            }
        });

        self.active = Some(ActiveAlarm { request, repeat });
    }
}

/// Calls `action` every `period` until `token` is cancelled. The first call happens one period
/// after spawning.
fn spawn_repeating(
    token: CancellationToken,
    clock: Arc<dyn Clock>,
    period: Duration,
    action: impl Fn() + Send + 'static,
) {
    tokio::spawn(async move {
        let mut next = clock.instant();
        loop {
            next += period;
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = clock.sleep_until(next) => action(),
            }
        }
    });
}
