pub mod app;
pub mod clipboard;
pub mod config;
pub mod extract;
pub mod generation;
pub mod history;
pub mod logging;
pub mod params;
pub mod prompt;
pub mod storage;

pub use app::{AppState, PendingGeneration, ScriptEngine, SubmitError};
pub use config::{Config, ConfigManager};
pub use generation::{GeminiClient, GenerationError, TextGenerator};
pub use history::{HistoryItem, HistoryStore};
pub use params::{ScriptParams, ScriptType};
