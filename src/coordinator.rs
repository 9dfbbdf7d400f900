use crate::detector::{DetectorHandle, BUFFER_SIZE, SAMPLE_RATE};
use crate::engine::TuningStateEngine;
use crate::preferences::Preferences;
use crate::types::*;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, info, trace, warn};
use std::path::PathBuf;
use std::time::Duration;

/// The coordinator is the single writer of tuner state.
///
/// It receives `InputEvent`s (detector frames, user commands, background
/// start results) on one channel, applies them to the engine strictly in
/// arrival order, and publishes a `TunerState` snapshot to every consumer
/// after each one. The loss-of-signal timer is driven from the same loop by
/// waiting on the channel no longer than the engine's pending deadline, so a
/// timer can never fire after it was cancelled.
///
/// # Detector lifecycle
///
/// Start and stop run on background threads through `DetectorHandle`. At
/// most one start is in flight (`pending_start`); a stop abandons it and a
/// late successful completion is answered with another stop. Permission
/// gates both directions: granting it while idle starts the detector,
/// revoking it while running or starting stops it.
pub struct Coordinator {
    input_rx: Receiver<InputEvent>,
    state_txs: Vec<Sender<TunerState>>,
    engine: TuningStateEngine,
    detector: Option<DetectorHandle>,
    clock: SessionClock,
    /// Generation of the start currently in flight
    pending_start: Option<u64>,
    prefs_path: Option<PathBuf>,
    shutdown: bool,
}

impl Coordinator {
    pub fn new(
        input_rx: Receiver<InputEvent>,
        state_txs: Vec<Sender<TunerState>>,
        detector: Option<DetectorHandle>,
        clock: SessionClock,
    ) -> Self {
        Self {
            input_rx,
            state_txs,
            engine: TuningStateEngine::new(),
            detector,
            clock,
            pending_start: None,
            prefs_path: None,
            shutdown: false,
        }
    }

    /// Apply the startup mode (normally the saved default).
    pub fn with_default_mode(mut self, mode_name: &str) -> Self {
        self.engine.select_mode(mode_name);
        self
    }

    pub fn with_reference_frequency(mut self, hz: f32) -> Self {
        self.engine.set_reference_frequency(hz);
        self
    }

    /// File that `SaveDefaultMode` writes to.
    pub fn with_preferences(mut self, path: PathBuf) -> Self {
        self.prefs_path = Some(path);
        self
    }

    pub fn state(&self) -> &TunerState {
        self.engine.state()
    }

    /// Run until a `Shutdown` command arrives or every sender is dropped.
    pub fn run(&mut self) {
        info!(
            "Coordinator running (mode: {}, A4: {:.1} Hz)",
            self.engine.state().mode_name,
            self.engine.state().reference_hz
        );
        self.publish();

        let mut event_count: u64 = 0;

        while !self.shutdown {
            let next = match self.engine.next_deadline_ms() {
                Some(deadline) => {
                    let wait = deadline.saturating_sub(self.clock.now_ms());
                    self.input_rx.recv_timeout(Duration::from_millis(wait))
                }
                None => self.input_rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match next {
                Ok(event) => {
                    self.handle(event);
                    event_count += 1;
                    if event_count % 1000 == 0 {
                        debug!("Coordinator: {} events processed", event_count);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if !self.engine.on_tick(self.clock.now_ms()) {
                        continue;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
            self.publish();
        }

        if let Some(detector) = &self.detector {
            detector.stop_now();
        }
        info!("Coordinator shutting down after {} events", event_count);
    }

    fn handle(&mut self, event: InputEvent) {
        match event {
            InputEvent::Detection(detection) => {
                // Frames still queued behind a stop
                if !self.engine.state().is_recording && self.pending_start.is_none() {
                    trace!("Dropping detection while stopped: {:?}", detection);
                    return;
                }
                trace!("{:?}", detection);
                self.engine.on_detection(&detection);
            }
            InputEvent::Command(command) => self.handle_command(command),
            InputEvent::StartCompleted { generation, started } => {
                self.on_start_completed(generation, started)
            }
        }
    }

    fn handle_command(&mut self, command: TunerCommand) {
        debug!("Command: {:?}", command);
        match command {
            TunerCommand::SelectMode(name) => {
                self.engine.select_mode(&name);
            }
            TunerCommand::SetTargetPitch(pitch) => {
                self.engine.set_target_pitch(pitch);
            }
            TunerCommand::SetReferenceFrequency(hz) => {
                if let Some(applied) = self.engine.set_reference_frequency(hz) {
                    // A start in flight picks up the new value when it completes
                    if self.engine.state().is_recording && self.pending_start.is_none() {
                        if let Some(detector) = &self.detector {
                            detector.set_reference_frequency(applied);
                        }
                    }
                }
            }
            TunerCommand::ToggleCentsDisplay => self.engine.toggle_cents_display(),
            TunerCommand::PermissionChanged(granted) => self.on_permission(granted),
            TunerCommand::RequestStart => self.start(),
            TunerCommand::RequestStop => self.stop(),
            TunerCommand::SaveDefaultMode(name) => self.save_default_mode(name),
            TunerCommand::Shutdown => self.shutdown = true,
        }
    }

    fn on_permission(&mut self, granted: bool) {
        self.engine.set_permission(granted);
        let busy = self.engine.state().is_recording || self.pending_start.is_some();
        if granted && !busy {
            self.start();
        } else if !granted && busy {
            self.stop();
        }
    }

    fn start(&mut self) {
        if self.pending_start.is_some() || self.engine.state().is_recording {
            warn!("Start ignored: already starting or running");
            return;
        }
        if !self.engine.state().has_permission {
            warn!("Start refused: no microphone permission");
            self.engine.set_recording(false);
            return;
        }
        let Some(detector) = &self.detector else {
            warn!("Start ignored: no detector attached");
            return;
        };
        info!("Requesting detector start...");
        let reference = self.engine.state().reference_hz;
        self.pending_start = Some(detector.spawn_start(SAMPLE_RATE, BUFFER_SIZE, reference));
    }

    fn on_start_completed(&mut self, generation: u64, started: bool) {
        if self.pending_start != Some(generation) {
            debug!("Stale start completion (generation {})", generation);
            if started {
                if let Some(detector) = &self.detector {
                    detector.spawn_stop();
                }
            }
            return;
        }
        self.pending_start = None;

        if started {
            info!("Detector started");
            self.engine.set_recording(true);
            if let Some(detector) = &self.detector {
                // The reference may have moved while the start was in flight
                detector.set_reference_frequency(self.engine.state().reference_hz);
            }
        } else {
            warn!("Detector failed to start");
            self.engine.set_recording(false);
        }
    }

    fn stop(&mut self) {
        if self.pending_start.take().is_some() {
            warn!("Cancelling pending start during stop request");
        }
        if let Some(detector) = &self.detector {
            // Also sent when idle, in case the detector is in a half-started state
            detector.spawn_stop();
        }
        if !self.engine.state().is_recording {
            debug!("Stop: detector was not recording");
            return;
        }
        info!("Stopping detector...");
        self.engine.on_stopped();
    }

    fn save_default_mode(&self, name: String) {
        let Some(path) = &self.prefs_path else {
            warn!("No preferences file configured, default mode not saved");
            return;
        };
        let prefs = Preferences {
            default_mode: Some(name),
        };
        if let Err(e) = prefs.save(path) {
            warn!("Failed to save preferences to {:?}: {}", path, e);
        }
    }

    /// Push the current snapshot to every consumer without blocking: a full
    /// channel drops this snapshot, the next one supersedes it anyway.
    fn publish(&mut self) {
        let snapshot = self.engine.snapshot();
        self.state_txs.retain(|tx| match tx.try_send(snapshot.clone()) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        });
    }
}

/// Cloneable command interface for the presentation layer.
#[derive(Clone)]
pub struct TunerHandle {
    tx: Sender<InputEvent>,
}

impl TunerHandle {
    pub fn new(tx: Sender<InputEvent>) -> Self {
        Self { tx }
    }

    fn send(&self, command: TunerCommand) {
        if self.tx.send(InputEvent::Command(command)).is_err() {
            debug!("Tuner is gone, command dropped");
        }
    }

    pub fn select_mode(&self, name: &str) {
        self.send(TunerCommand::SelectMode(name.to_string()));
    }

    pub fn set_target_pitch(&self, pitch: Option<Pitch>) {
        self.send(TunerCommand::SetTargetPitch(pitch));
    }

    pub fn set_reference_frequency(&self, hz: f32) {
        self.send(TunerCommand::SetReferenceFrequency(hz));
    }

    pub fn toggle_cents_display(&self) {
        self.send(TunerCommand::ToggleCentsDisplay);
    }

    pub fn notify_permission_granted(&self, granted: bool) {
        self.send(TunerCommand::PermissionChanged(granted));
    }

    pub fn request_start(&self) {
        self.send(TunerCommand::RequestStart);
    }

    pub fn request_stop(&self) {
        self.send(TunerCommand::RequestStop);
    }

    pub fn save_default_mode(&self, name: &str) {
        self.send(TunerCommand::SaveDefaultMode(name.to_string()));
    }

    pub fn shutdown(&self) {
        self.send(TunerCommand::Shutdown);
    }
}
