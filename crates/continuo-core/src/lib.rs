//! continuo-core: Domain types for the continuo MIDI bridge

mod bar_buffer;
mod error;
mod event;
mod grid;
mod prompt;
mod response;
mod schedule;

pub use bar_buffer::BarBuffer;
pub use error::{CoreError, Result};
pub use event::{Event, PulsedEvent, ALL_NOTES_OFF};
pub use grid::{GridConfig, SamplingConfig, PPQN};
pub use prompt::encode_prompt;
pub use response::{plan_playback, PlaybackPlan};
pub use schedule::ScheduledQueue;
