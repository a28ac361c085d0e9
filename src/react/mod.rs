//! 对话编排：有界工具调用回复循环与标题生成

pub mod loop_;
pub mod title;

pub use loop_::{react_loop, seed_turns, LoopPhase, ReactResult, ReactSession, DEFAULT_MAX_ITERATIONS};
pub use title::{generate_title, sanitize_title, title_turns};
