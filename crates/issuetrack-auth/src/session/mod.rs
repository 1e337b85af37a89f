//! Session state: the model, the store that owns it, where it is
//! persisted, and the flows that create and destroy it.

pub mod manager;
pub mod model;
pub mod persistence;
pub mod store;

pub use manager::SessionManager;
pub use model::{Session, UserProfile};
pub use persistence::{
    FileSessionPersistence, MemorySessionPersistence, PersistedCredentials, SessionPersistence,
};
pub use store::SessionStore;
