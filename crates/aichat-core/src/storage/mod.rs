pub mod error;
pub mod mutation;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use mutation::{Mutation, SessionSnapshot};
pub use store::{Store, StoreLocation};
