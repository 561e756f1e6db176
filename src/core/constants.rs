//! Shared constants used across the application

/// Prefix of an event line that carries a payload.
pub const DATA_PREFIX: &str = "data:";

/// Lines starting with this marker are stream comments (keep-alives).
pub const COMMENT_PREFIX: char = ':';

/// Payload value that ends a response stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Number of grapheme clusters kept when deriving a conversation title.
pub const TITLE_MAX_GRAPHEMES: usize = 30;

/// Appended to a title that was cut short.
pub const TITLE_ELLIPSIS: &str = "...";

/// Title for a conversation started with attachments and no text ("image analysis").
pub const ATTACHMENT_ONLY_TITLE: &str = "चित्र विश्लेषण";

/// Text part sent alongside images when the user typed nothing ("analyze this image").
pub const IMAGE_FALLBACK_PROMPT: &str = "इस चित्र का विश्लेषण करें";

/// Completion endpoint used when none is configured.
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Model requested when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Image-capable model requested by image generation when none is configured.
pub const DEFAULT_IMAGE_MODEL: &str = "google/gemini-2.5-flash-image";

/// Prepended to the user's description in an image generation request.
pub const IMAGE_REQUEST_PREFIX: &str = "Generate an image: ";

/// Assistant text stored with a generated image when the model sent none ("here is your image").
pub const IMAGE_READY_MESSAGE: &str = "यहाँ आपकी image है!";

/// File name given to a generated image attachment.
pub const GENERATED_IMAGE_NAME: &str = "generated-image.png";
