//! Client-side state synchronization for the system dashboard: the wire
//! codec, the state store it feeds, and the bounded buffers behind both.

pub mod handshake;
pub mod page;
pub mod responses;
pub mod series;
pub mod status;
pub mod store;
pub mod wire;

pub use handshake::{Handshake, DEFAULT_HANDSHAKE_GRACE};
pub use page::{PageField, PageKind, PageState};
pub use responses::{ResponseEntry, ResponseKind, ResponseLog, ResponseLogMode};
pub use series::{MetricSeries, Sample, SeriesSet, DEFAULT_SERIES_CAPACITY};
pub use status::ModuleStatus;
pub use store::{Module, Outcome, StateStore, StoreConfig, StoreSnapshot};
pub use wire::{
    Codec, DecodeError, Envelope, FrameError, InboundMsg, Request, RequestStyle, ResponseFormat,
    DEFAULT_MAX_FRAME_BYTES,
};
