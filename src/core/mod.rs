//! 核心编排层：错误分类、会话协调、并发任务汇合、优雅关闭

pub mod coordinator;
pub mod error;
pub mod shutdown;
pub mod task_scheduler;

pub use coordinator::{ConversationCoordinator, StartedConversation};
pub use error::ChatError;
pub use shutdown::{
    run_with_graceful_shutdown, ShutdownCleanup, ShutdownCoordinator, ShutdownManager,
    ShutdownReason,
};
pub use task_scheduler::{join_all_settled, join_settled};
