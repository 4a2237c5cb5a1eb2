pub mod cache;
pub mod entity;
pub mod traits;
pub mod value;

pub use cache::CachedEntities;
pub use entity::{Channel, EntityId, Member, Role};
pub use traits::{BufferSink, EntityResolver, ReplySink};
pub use value::{Arguments, Value};
