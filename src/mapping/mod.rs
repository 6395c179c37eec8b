//! Mapping subsystem: turns HID input events into serial and CAN output
//!
//! Pipeline stages in evaluation order:
//!
//! 1. [`extractor`] - raw value of the observed input
//! 2. [`condition`] - firing decision, `Changed` baseline
//! 3. [`transform`] - fixed-point scale and offset
//! 4. [`rate_limit`] - per-rule cooldown
//! 5. [`formatter`] - payload bytes per output format
//! 6. `output::Dispatcher` - transport send with a bounded timeout
//!
//! [`engine::MappingEngine`] drives the stages and owns the [`store::MappingTable`].
//!
//! # Architecture
//!
//! ```text
//! InputEvent ──► [snapshot] ──► extract ─► evaluate ─► transform ─► limit ─► format ─► send
//!                    ▲                                                                  │
//!                    └──────────────── write back runtime state ◄───────────────────────┘
//! ```

pub mod condition;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod formatter;
pub mod import;
pub mod mapping_types;
pub mod rate_limit;
pub mod stats;
pub mod store;
pub mod transform;

pub use engine::{EventOutcome, MappingEngine};
pub use error::MappingError;
pub use mapping_types::{
    CanConfig, Condition, ConditionKind, FlowControl, InputType, MappingRule, OutputConfig,
    OutputFormat, OutputType, Parity, SerialConfig,
};
pub use rate_limit::RateLimiter;
pub use stats::StatsSnapshot;
