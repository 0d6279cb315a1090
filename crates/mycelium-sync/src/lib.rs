pub mod content;
pub mod merge;
pub mod priority;
pub mod scheduler;
pub mod timer;

pub use content::{FsContentStore, MemoryContentStore};
pub use merge::{MergeResolver, MergeStrategy, ROADMAP_END, ROADMAP_START};
pub use priority::{build_queue, score, PriorityBreakdown, QueueEntry};
pub use scheduler::SyncScheduler;
pub use timer::SchedulerHandle;
