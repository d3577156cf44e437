pub mod events;
pub mod progress;


pub use events::{ChannelReporter, EventSink, JsonLineReporter, NullReporter, ProgressUpdate, WipeEvent};
pub use progress::ProgressThrottle;
