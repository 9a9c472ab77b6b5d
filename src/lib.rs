#![allow(dead_code)]

pub mod capture;
pub mod check;
pub mod cli;
pub mod config;
pub mod context;
pub mod coro;
pub mod engine;
pub mod export;
pub mod filter;
pub mod host;
pub mod inputs;
pub mod query;
pub mod settings;
pub mod utils;
pub mod watchdog;

pub use config::{EngineIo, ExportFormat};
pub use context::{GuiCtx, TestCtx};
pub use engine::Engine;
pub use host::headless::HeadlessHost;
pub use query::{ItemInfo, ItemList};
pub use test::{Test, TestGroup, TestId, TestStatus, VerboseLevel};
