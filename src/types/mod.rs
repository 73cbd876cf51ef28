// Public modules
pub mod generate_content;
pub mod message;
pub mod model;
pub mod turn;

// Re-exports
pub use generate_content::{
    ApiErrorBody, Candidate, GenerateContentRequest, GenerateContentResponse, GenerationConfig,
    SYSTEM_INSTRUCTION, SystemInstruction, ThinkingConfig,
};
pub use message::{Message, Role};
pub use model::{ModelVariant, THINKING_BUDGET};
pub use turn::{Part, Turn, seed_history};
