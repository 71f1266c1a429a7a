pub mod sqlite;

pub use sqlite::{StoreError, UserStore};
