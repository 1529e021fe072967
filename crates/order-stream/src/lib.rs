pub mod entry;
pub mod error;
pub mod memory;
pub mod redis_streams;
pub mod stream;

pub use entry::{EntryId, EntryRange, PendingEntry, StreamEntry};
pub use error::{Result, StreamError};
pub use memory::InMemoryOrderStream;
pub use redis_streams::RedisOrderStream;
pub use stream::{GroupStart, OrderStream, OrderStreamExt};
