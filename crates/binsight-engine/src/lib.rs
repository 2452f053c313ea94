//! Capture-to-result pipeline: transport encoding, request construction,
//! the vision-model gateway, the detection lifecycle and the fire-and-forget
//! history sink. Pure domain rules live in `binsight-contracts`.

pub mod encode;
pub mod error;
pub mod gateway;
pub mod history;
pub mod lifecycle;
pub mod request;

pub use error::DetectError;
pub use gateway::{DryrunGateway, GatewayConfig, OpenAiCompatGateway, VisionGateway};
pub use history::{HistoryRecord, HistorySink, HttpHistorySink, NullHistorySink};
pub use lifecycle::{CaptureInput, DetectionSession, DetectionState, SessionConfig, StartOutcome};
pub use request::{CaptureHints, ClassificationRequest};
