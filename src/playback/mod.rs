pub mod player;
pub mod scheduler;

pub use player::{PlayerProgress, SeekablePlayer, MAX_RATE, MIN_RATE};
pub use scheduler::{PlaybackScheduler, ScheduledSource};
