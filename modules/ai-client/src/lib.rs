pub mod claude;
pub mod error;
pub mod limits;
pub mod openai;
pub mod router;
pub mod traits;
pub mod types;
pub mod util;

pub use claude::Claude;
pub use error::AiError;
pub use limits::{RequestLimiter, RequestLimits};
pub use openai::{strict_schema, OpenAi, StructuredOutput};
pub use router::LlmRouter;
pub use traits::Completion;
pub use types::{ClientKind, LlmOutput, LlmSettings, PromptContext, ResponseFormat, StructuredTool};
pub use util::{parse_json_object, strip_code_blocks, truncate_to_char_boundary};
