pub mod prediction;
pub mod story;

pub use prediction::{PredictionJob, PredictionStatus, PredictionUrls};
pub use story::{Credentials, GeneratedDocument, StoryPage, StoryText};
