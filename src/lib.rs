pub mod config;
pub mod devtools;
pub mod error;
pub mod export;
pub mod hooks;
pub mod model;
pub mod sanitize;
pub mod store;
pub mod value;

pub use config::DevtoolsConfig;
pub use devtools::DevTools;
pub use error::{DevtoolsError, Result};
pub use export::checkpoint::{ExportCheckpoint, IncrementalExportData};
pub use export::{Envelope, ExportData, ExportOptions, ImportOptions, ImportSummary};
pub use hooks::{
    ComponentHook, ComponentInfo, ErrorSink, EventHook, HookBus, HookFault, HookId, Instrumentor,
    PerformanceHook, StateHook,
};
pub use model::{
    CommandRecord, ComponentPerformance, ComponentSnapshot, ComponentStatus, ComponentTree,
    EventRecord, RefSnapshot, StateChange,
};
pub use sanitize::{PreviewReport, SanitizeOptions, SanitizeStats, Sanitizer};
pub use store::Store;
pub use value::CapturedValue;
