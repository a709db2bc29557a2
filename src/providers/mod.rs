pub mod narrative;
pub mod stability;

pub use narrative::NarrativeClient;
pub use stability::StabilityClient;
