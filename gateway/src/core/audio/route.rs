//! Audio session configuration and output route policy.
//!
//! Voice chat sessions default to the earpiece on phones, which is far too
//! quiet for a tutoring app held at arm's length. The policy:
//!
//! - any external output (headphones, Bluetooth, AirPlay, car, HDMI, USB,
//!   line out) wins: clear the override so audio follows the user's choice;
//! - otherwise, if the built-in receiver is active, force the loudspeaker;
//! - otherwise leave the route alone.
//!
//! The policy is applied at activation and again after every route change for
//! as long as the [`RouteObserver`] is alive.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::AudioResult;

/// Physical output currently carrying audio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputPort {
    BuiltInReceiver,
    BuiltInSpeaker,
    Headphones,
    BluetoothA2dp,
    BluetoothHfp,
    BluetoothLe,
    AirPlay,
    CarAudio,
    Hdmi,
    UsbAudio,
    LineOut,
}

impl OutputPort {
    pub fn is_external(&self) -> bool {
        !matches!(self, OutputPort::BuiltInReceiver | OutputPort::BuiltInSpeaker)
    }
}

/// Output override requested from the audio session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputOverride {
    None,
    Speaker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCategory {
    PlayAndRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    VoiceChat,
}

/// Settings applied to the shared audio session before a live session starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSessionConfig {
    pub category: SessionCategory,
    pub mode: SessionMode,
    pub default_to_speaker: bool,
    pub allow_bluetooth_hfp: bool,
    pub preferred_io_buffer: Duration,
}

impl Default for AudioSessionConfig {
    fn default() -> Self {
        Self {
            category: SessionCategory::PlayAndRecord,
            mode: SessionMode::VoiceChat,
            default_to_speaker: true,
            allow_bluetooth_hfp: true,
            preferred_io_buffer: Duration::from_millis(20),
        }
    }
}

/// Platform audio session (a process-wide singleton on mobile platforms)
pub trait AudioSession: Send + Sync {
    fn configure(&self, config: &AudioSessionConfig) -> AudioResult<()>;
    fn set_active(&self, active: bool) -> AudioResult<()>;
    fn current_outputs(&self) -> Vec<OutputPort>;
    fn override_output(&self, route: OutputOverride) -> AudioResult<()>;
    /// Notifications fired after each route change
    fn route_changes(&self) -> broadcast::Receiver<()>;
}

/// Decide which override, if any, the current outputs call for
pub fn decide_override(outputs: &[OutputPort]) -> Option<OutputOverride> {
    if outputs.iter().any(OutputPort::is_external) {
        Some(OutputOverride::None)
    } else if outputs.contains(&OutputPort::BuiltInReceiver) {
        Some(OutputOverride::Speaker)
    } else {
        None
    }
}

pub struct RoutePolicy;

impl RoutePolicy {
    /// Evaluate the current route once. Override failures are ignored.
    pub fn apply(session: &dyn AudioSession) {
        let outputs = session.current_outputs();
        if let Some(route) = decide_override(&outputs) {
            if let Err(e) = session.override_output(route) {
                tracing::debug!("Ignoring output override failure: {e}");
            } else {
                tracing::trace!(?outputs, ?route, "Applied output route policy");
            }
        }
    }

    /// Configure and activate the session, apply the policy, and keep
    /// re-applying it on route changes until the returned observer is dropped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn activate(session: Arc<dyn AudioSession>) -> AudioResult<RouteObserver> {
        session.configure(&AudioSessionConfig::default())?;
        session.set_active(true)?;
        Self::apply(session.as_ref());

        let mut changes = session.route_changes();
        let observed = session.clone();
        let task = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        RoutePolicy::apply(observed.as_ref());
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(RouteObserver {
            session,
            task: Some(task),
        })
    }
}

/// Scoped route-change subscription; dropping it stops the policy
pub struct RouteObserver {
    session: Arc<dyn AudioSession>,
    task: Option<JoinHandle<()>>,
}

impl RouteObserver {
    /// Stop observing, optionally deactivating the audio session.
    pub fn release(mut self, deactivate: bool) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if deactivate && let Err(e) = self.session.set_active(false) {
            tracing::debug!("Ignoring audio session deactivation failure: {e}");
        }
    }
}

impl Drop for RouteObserver {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Process-local audio session for hosts without a platform session.
///
/// Reports a single built-in speaker by default. Outputs can be replaced and
/// route changes announced, which is how desktop hosts (and tests) feed
/// device hot-plug events into the policy.
pub struct InMemoryAudioSession {
    outputs: Mutex<Vec<OutputPort>>,
    overrides: Mutex<Vec<OutputOverride>>,
    active: Mutex<bool>,
    changes: broadcast::Sender<()>,
}

impl Default for InMemoryAudioSession {
    fn default() -> Self {
        Self::with_outputs(vec![OutputPort::BuiltInSpeaker])
    }
}

impl InMemoryAudioSession {
    pub fn with_outputs(outputs: Vec<OutputPort>) -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            outputs: Mutex::new(outputs),
            overrides: Mutex::new(Vec::new()),
            active: Mutex::new(false),
            changes,
        }
    }

    /// Replace the active outputs and announce a route change
    pub fn change_route(&self, outputs: Vec<OutputPort>) {
        *self.outputs.lock() = outputs;
        let _ = self.changes.send(());
    }

    /// Overrides requested so far, oldest first
    pub fn overrides(&self) -> Vec<OutputOverride> {
        self.overrides.lock().clone()
    }

    pub fn is_active(&self) -> bool {
        *self.active.lock()
    }
}

impl AudioSession for InMemoryAudioSession {
    fn configure(&self, _config: &AudioSessionConfig) -> AudioResult<()> {
        Ok(())
    }

    fn set_active(&self, active: bool) -> AudioResult<()> {
        *self.active.lock() = active;
        Ok(())
    }

    fn current_outputs(&self) -> Vec<OutputPort> {
        self.outputs.lock().clone()
    }

    fn override_output(&self, route: OutputOverride) -> AudioResult<()> {
        self.overrides.lock().push(route);
        Ok(())
    }

    fn route_changes(&self) -> broadcast::Receiver<()> {
        self.changes.subscribe()
    }
}
