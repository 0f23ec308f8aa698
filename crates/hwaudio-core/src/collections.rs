pub use dashmap::{self, DashMap};
