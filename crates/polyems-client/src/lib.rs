//! polyems-client — talks to the gateway on behalf of one chat session
//!
//! A request goes to the primary route first and, if that fails, once to the
//! backup route with the same payload. Successful exchanges are kept in a
//! small persisted history that the next request draws its context from.

pub mod catalog;
pub mod error;
pub mod fallback;
pub mod history;
pub mod session;
pub mod transport;

pub use catalog::{DEFAULT_MODEL, KNOWN_MODELS, model_notice};
pub use error::{ClientError, HistoryError};
pub use fallback::{DOUBLE_FAILURE_MESSAGE, FallbackController, Outcome};
pub use history::{
    DEFAULT_HISTORY_LIMIT, HistoryEntry, HistoryManager, HistoryStorage, JsonFileStorage,
    MemoryStorage,
};
pub use session::{ChatSession, Speaker, TranscriptEntry};
pub use transport::{ChatTransport, HttpTransport};
