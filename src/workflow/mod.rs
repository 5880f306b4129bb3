pub mod story_ctx;
pub mod story_flow;

pub use story_ctx::StoryCtx;
pub use story_flow::StoryFlow;
