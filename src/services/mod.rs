pub mod document_service;
pub mod image_service;
pub mod story_service;

pub use document_service::{DocumentAssembler, IllustratedPage, LayoutSettings};
pub use image_service::IllustrationService;
pub use story_service::StoryGenerator;
