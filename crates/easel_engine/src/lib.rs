//! Easel engine: async submission, polling and cancellation against the
//! image-generation backend.
mod abort;
mod cancel;
mod channel;
mod client;
mod config;
mod engine;
mod error;
mod notify;
mod poll;
mod registry;
mod submit;
mod transport;

pub use abort::{with_deadline, AbortReason, AbortSignal};
pub use cancel::CancelOutcome;
pub use channel::{CancellationChannel, FileSlotStore, MemorySlotStore, SlotStore};
pub use client::{RequestClient, RetryPolicy};
pub use config::{EngineConfig, DEFAULT_BASE_URL};
pub use engine::{EngineBuilder, GenerationEngine, DEFAULT_STAMINA_TOTAL};
pub use error::{ChannelError, EngineError, RequestError};
pub use notify::{
    ChannelEventSink, EngineEvent, EventSink, LogNotifier, NoProgress, Notice, NoticeLevel,
    Notifier, NullEventSink, ProgressReporter,
};
pub use poll::JobPoller;
pub use registry::{Registration, RequestRegistry};
pub use transport::{ReqwestTransport, Transport, TransportSettings};

/// Backend endpoint paths.
pub mod endpoints {
    pub const GENERATE: &str = "/generate";
    pub const JOB_RESULT: &str = "/jobResult";
    pub const CANCEL_TASK: &str = "/cancelTask";
    pub const GET_STAMINA: &str = "/get_stamina";
    pub const TEST_API_KEY: &str = "/test_api_key";
}
