pub mod captions;
pub mod config;
pub mod controller;
pub mod controls;
pub mod error;
pub mod interactive;
pub mod media;
pub mod practice;
pub mod scheduler;
pub mod source;

pub use captions::{filter_segments, load_captions, Segment};
pub use config::Config;
pub use controller::Controller;
pub use error::{Result, ShadowError, SourceError};
pub use practice::{print_summary, run_practice, PracticeConfig, PracticeResult, PracticeStats};
pub use scheduler::{Phase, Projection, Settings};
