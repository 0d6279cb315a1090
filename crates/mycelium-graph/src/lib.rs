pub mod graph;
pub mod health;
pub mod mutation;
pub mod versions;

pub use graph::*;
pub use health::{compute_health, update_health, SYNC_AGE_HORIZON_DAYS};
pub use mutation::*;
pub use versions::*;
