//! Models offered to the user

/// Model used when the user has not picked one
pub const DEFAULT_MODEL: &str = "Llama-3.1-8b-instant";

/// Selectable chat models, in menu order
pub const KNOWN_MODELS: &[&str] = &[
    "Llama-3.3-70b-versatile",
    "Llama-3.1-8b-instant",
    "Mixtral-8x7b-32768",
    "Llama3-70b-8192",
    "Llama3-8b-8192",
    "Qwen2.5-Coder-32B-Instruct",
    "gpt-4o-mini",
    "gpt-4o",
    "gemma2-9b-it",
    "gemini-1.5-flash",
    "gemini-1.5-flash-8b",
    "gemini-1.5-pro",
];

const RATE_LIMITED_NOTICE: &str =
    "This model is rate limited and can be used only for light tasks.";

/// Advisory shown when a model is selected, if any
pub fn model_notice(model: &str) -> Option<&'static str> {
    match model {
        "gemini-1.5-pro" => Some(RATE_LIMITED_NOTICE),
        _ => None,
    }
}

pub fn is_known(model: &str) -> bool {
    KNOWN_MODELS.contains(&model)
}
