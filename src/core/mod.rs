pub mod prompt;
mod router;

pub use prompt::{FilePromptStore, MemoryPromptStore, PromptInjector, PromptOverrideStore};
pub use router::Router;
