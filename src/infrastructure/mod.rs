pub mod bus;
pub mod store;

pub use bus::{Delivery, InMemoryBus, MessageBus};
pub use store::{MemoryStore, StatusStore};
