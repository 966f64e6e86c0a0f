//! Alarm sound. [GenericAudio] plays through `rodio` when the `audio` feature is enabled and
//! falls back to the terminal bell otherwise.

use std::{io::Write, time::Duration};

use anyhow::{anyhow, Result};
use tracing::warn;

use crate::model::settings::CustomAudio;

use super::channels::AudioOutput;

/// One round of the synthesized alarm: short square wave pulses separated by silence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeepPattern {
    pub frequency: f32,
    pub pulses: u32,
    pub pulse: Duration,
    pub spacing: Duration,
    /// Amplitude at full volume.
    pub peak: f32,
}

impl BeepPattern {
    pub const ALARM: BeepPattern = BeepPattern {
        frequency: 880.,
        pulses: 3,
        pulse: Duration::from_millis(300),
        spacing: Duration::from_millis(400),
        peak: 0.3,
    };

    pub fn amplitude(&self, volume: f32) -> f32 {
        volume.clamp(0., 1.) * self.peak
    }

    /// Time from the first pulse starting to the last one ending.
    pub fn length(&self) -> Duration {
        match self.pulses {
            0 => Duration::ZERO,
            n => self.spacing * (n - 1) + self.pulse,
        }
    }
}

/// Short two note "ding" played when a finished task starts its deletion countdown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Chime {
    pub from: f32,
    pub to: f32,
    /// Time spent on the first note.
    pub glide: Duration,
    pub length: Duration,
    pub peak: f32,
}

impl Chime {
    /// C5 then E5.
    pub const COMPLETION: Chime = Chime {
        from: 523.25,
        to: 659.25,
        glide: Duration::from_millis(100),
        length: Duration::from_millis(500),
        peak: 0.3,
    };

    pub fn amplitude(&self, volume: f32) -> f32 {
        volume.clamp(0., 1.) * self.peak
    }
}

/// Writes BEL characters. Has no way of playing a clip, so custom audio always falls back to it.
pub struct TerminalBell;

impl AudioOutput for TerminalBell {
    fn play_clip(&self, _clip: &CustomAudio, _volume: f32) -> Result<()> {
        Err(anyhow!("Clip playback requires the audio feature"))
    }

    fn play_beep(&self, pattern: &BeepPattern, volume: f32) -> Result<()> {
        if pattern.amplitude(volume) <= 0. {
            return Ok(());
        }
        let mut stderr = std::io::stderr().lock();
        stderr.write_all(&b"\x07".repeat(pattern.pulses as usize))?;
        stderr.flush()?;
        Ok(())
    }

    fn play_chime(&self, chime: &Chime, volume: f32) -> Result<()> {
        if chime.amplitude(volume) <= 0. {
            return Ok(());
        }
        let mut stderr = std::io::stderr().lock();
        stderr.write_all(b"\x07")?;
        stderr.flush()?;
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        Ok(())
    }
}

/// Serves as the cross-compatible audio output.
pub struct GenericAudio {
    inner: Box<dyn AudioOutput>,
}

impl GenericAudio {
    pub fn new() -> Self {
        cfg_if::cfg_if! {
            if #[cfg(feature = "audio")] {
                match rodio_output::RodioAudio::new() {
                    Ok(audio) => Self { inner: Box::new(audio) },
                    Err(e) => {
                        warn!("No audio device available, using the terminal bell {e:?}");
                        Self { inner: Box::new(TerminalBell) }
                    }
                }
            } else {
                warn!("Built without the audio feature, using the terminal bell");
                Self { inner: Box::new(TerminalBell) }
            }
        }
    }
}

impl Default for GenericAudio {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for GenericAudio {
    fn play_clip(&self, clip: &CustomAudio, volume: f32) -> Result<()> {
        self.inner.play_clip(clip, volume)
    }

    fn play_beep(&self, pattern: &BeepPattern, volume: f32) -> Result<()> {
        self.inner.play_beep(pattern, volume)
    }

    fn play_chime(&self, chime: &Chime, volume: f32) -> Result<()> {
        self.inner.play_chime(chime, volume)
    }

    fn stop(&self) -> Result<()> {
        self.inner.stop()
    }
}

#[cfg(feature = "audio")]
mod rodio_output {
    use std::{io::Cursor, sync::mpsc, thread, time::Duration};

    use anyhow::{anyhow, Result};
    use rodio::{
        source::{SineWave, Zero},
        Decoder, OutputStream, Sink, Source,
    };
    use tracing::{debug, warn};

    use crate::{alarm::channels::AudioOutput, model::settings::CustomAudio};

    use super::{BeepPattern, Chime};

    const SAMPLE_RATE: u32 = 48_000;

    enum AudioCommand {
        Clip(Vec<u8>, f32),
        Beep(BeepPattern, f32),
        Chime(Chime, f32),
        Stop,
    }

    /// The output stream can't leave the thread that opened it, so a dedicated thread owns it and
    /// receives commands.
    pub struct RodioAudio {
        commands: mpsc::Sender<AudioCommand>,
    }

    impl RodioAudio {
        pub fn new() -> Result<Self> {
            let (commands, receiver) = mpsc::channel::<AudioCommand>();
            let (ready_sender, ready) = mpsc::channel::<Result<()>>();

            thread::Builder::new()
                .name("alarm-audio".into())
                .spawn(move || {
                    let (_stream, handle) = match OutputStream::try_default() {
                        Ok(v) => {
                            let _ = ready_sender.send(Ok(()));
                            v
                        }
                        Err(e) => {
                            let _ = ready_sender.send(Err(e.into()));
                            return;
                        }
                    };

                    let mut sink: Option<Sink> = None;
                    // Separate so the chime doesn't cut a playing alarm.
                    let mut chime_sink: Option<Sink> = None;
                    while let Ok(command) = receiver.recv() {
                        if let AudioCommand::Chime(chime, volume) = command {
                            match Sink::try_new(&handle) {
                                Ok(new_sink) => {
                                    append_chime(&new_sink, &chime, chime.amplitude(volume));
                                    chime_sink = Some(new_sink);
                                }
                                Err(e) => warn!("Failed to open an audio sink {e:?}"),
                            }
                            continue;
                        }
                        if let Some(previous) = sink.take() {
                            previous.stop();
                        }
                        if let AudioCommand::Stop = command {
                            continue;
                        }
                        let new_sink = match Sink::try_new(&handle) {
                            Ok(v) => v,
                            Err(e) => {
                                warn!("Failed to open an audio sink {e:?}");
                                continue;
                            }
                        };
                        match command {
                            AudioCommand::Stop | AudioCommand::Chime(..) => {}
                            AudioCommand::Clip(bytes, volume) => {
                                match Decoder::new(Cursor::new(bytes)) {
                                    Ok(source) => {
                                        new_sink.set_volume(volume);
                                        new_sink.append(source.repeat_infinite());
                                    }
                                    Err(e) => warn!("Failed to decode alarm clip {e:?}"),
                                }
                            }
                            AudioCommand::Beep(pattern, volume) => {
                                append_pattern(&new_sink, &pattern, pattern.amplitude(volume))
                            }
                        }
                        sink = Some(new_sink);
                    }
                    debug!("Audio thread finished");
                })?;

            ready
                .recv()
                .map_err(|_| anyhow!("Audio thread exited before opening a stream"))??;
            Ok(Self { commands })
        }

        fn send(&self, command: AudioCommand) -> Result<()> {
            self.commands
                .send(command)
                .map_err(|_| anyhow!("Audio thread is not running"))
        }
    }

    impl AudioOutput for RodioAudio {
        fn play_clip(&self, clip: &CustomAudio, volume: f32) -> Result<()> {
            let bytes = clip.decode()?;
            // Decoded here as well so a broken clip is reported to the caller.
            Decoder::new(Cursor::new(bytes.clone()))?;
            self.send(AudioCommand::Clip(bytes, volume))
        }

        fn play_beep(&self, pattern: &BeepPattern, volume: f32) -> Result<()> {
            self.send(AudioCommand::Beep(*pattern, volume))
        }

        fn play_chime(&self, chime: &Chime, volume: f32) -> Result<()> {
            self.send(AudioCommand::Chime(*chime, volume))
        }

        fn stop(&self) -> Result<()> {
            self.send(AudioCommand::Stop)
        }
    }

    fn append_pattern(sink: &Sink, pattern: &BeepPattern, amplitude: f32) {
        for i in 0..pattern.pulses {
            if i > 0 {
                let gap = pattern.spacing.saturating_sub(pattern.pulse);
                sink.append(Zero::<f32>::new(1, SAMPLE_RATE).take_duration(gap));
            }
            sink.append(
                SquareWave::new(pattern.frequency)
                    .take_duration(pattern.pulse)
                    .amplify(amplitude),
            );
        }
    }

    fn append_chime(sink: &Sink, chime: &Chime, amplitude: f32) {
        sink.append(
            SineWave::new(chime.from)
                .take_duration(chime.glide)
                .amplify(amplitude),
        );
        sink.append(
            SineWave::new(chime.to)
                .take_duration(chime.length.saturating_sub(chime.glide))
                .amplify(amplitude),
        );
    }

    struct SquareWave {
        frequency: f32,
        index: u64,
    }

    impl SquareWave {
        fn new(frequency: f32) -> Self {
            Self {
                frequency,
                index: 0,
            }
        }
    }

    impl Iterator for SquareWave {
        type Item = f32;

        fn next(&mut self) -> Option<f32> {
            let phase = (self.index as f64 * self.frequency as f64 / SAMPLE_RATE as f64).fract();
            self.index += 1;
            Some(if phase < 0.5 { 1. } else { -1. })
        }
    }

    impl Source for SquareWave {
        fn current_frame_len(&self) -> Option<usize> {
            None
        }

        fn channels(&self) -> u16 {
            1
        }

        fn sample_rate(&self) -> u32 {
            SAMPLE_RATE
        }

        fn total_duration(&self) -> Option<Duration> {
            None
        }
    }
}
