pub mod errors;
pub mod events;

pub use errors::{ConfigError, ErrorCode, VocaError};
pub use events::{EventBus, NamedEvent, Subscription};

pub type Result<T> = std::result::Result<T, VocaError>;
