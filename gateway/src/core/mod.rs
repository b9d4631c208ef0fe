pub mod audio;
pub mod instructions;
pub mod realtime;
pub mod session;
pub mod topic;

// Re-export commonly used types for convenience
pub use realtime::{
    ClientContext, EventSink, LiveClient, ModelPreferences, ProviderCredentials,
    ProviderPreference, RealtimeClientFactory, RealtimeError, RealtimeModelPreference,
    RealtimeResult, SessionClient, SessionEvent, get_supported_realtime_providers,
};

pub use session::{
    CountingStayAwake, SessionModel, StayAwake, StayAwakeLease, TranscriptEntry, TranscriptRole,
};

pub use topic::{LearnerContext, Topic};
