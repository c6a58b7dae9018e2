pub mod anthropic;
pub mod traits;
pub mod types;

pub use anthropic::AnthropicGenerator;
pub use traits::Generator;
pub use types::{ByteStream, GenerationRequest, ProviderError, StreamRecord};
