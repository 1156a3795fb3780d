//! The collector: one store, one hook bus, and the adapters between them.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::DevtoolsConfig;
use crate::error::Result;
use crate::export::checkpoint::ExportCheckpoint;
use crate::export::{ExportOptions, ImportSummary};
use crate::hooks::{HookBus, HookId, Instrumentor};
use crate::sanitize::{PreviewReport, SanitizeOutcome, Sanitizer};
use crate::store::{Store, StoreHooks};

#[derive(Debug, Clone, Copy)]
struct AttachedHooks {
    component: HookId,
    state: HookId,
    event: HookId,
    performance: HookId,
}

pub struct DevTools {
    store: Arc<Store>,
    bus: Arc<HookBus>,
    sanitizer: Arc<Sanitizer>,
    config: DevtoolsConfig,
    attached: Mutex<Option<AttachedHooks>>,
}

impl Default for DevTools {
    fn default() -> Self {
        let config = DevtoolsConfig::default();
        Self::from_parts(Sanitizer::with_default_rules(), config)
    }
}

impl DevTools {
    /// Build a collector from `config` and attach it to its bus.
    pub fn new(config: DevtoolsConfig) -> Result<Self> {
        config.validate()?;
        let sanitizer = config.build_sanitizer()?;
        Ok(Self::from_parts(sanitizer, config))
    }

    fn from_parts(sanitizer: Sanitizer, config: DevtoolsConfig) -> Self {
        let devtools = Self {
            store: Arc::new(Store::new(config.log_capacities())),
            bus: Arc::new(HookBus::new()),
            sanitizer: Arc::new(sanitizer),
            config,
            attached: Mutex::new(None),
        };
        devtools.attach();
        devtools
    }

    /// Register the store adapters on every hook category. Returns `false`
    /// if they were already attached.
    pub fn attach(&self) -> bool {
        let mut attached = self.attached.lock();
        if attached.is_some() {
            return false;
        }
        let hooks = Arc::new(StoreHooks::new(self.store.clone()));
        *attached = Some(AttachedHooks {
            component: self.bus.add_component_hook(hooks.clone()),
            state: self.bus.add_state_hook(hooks.clone()),
            event: self.bus.add_event_hook(hooks.clone()),
            performance: self.bus.add_performance_hook(hooks),
        });
        tracing::debug!("devtools attached to hook bus");
        true
    }

    /// Stop recording. Stored data is kept.
    pub fn detach(&self) -> bool {
        let Some(hooks) = self.attached.lock().take() else {
            return false;
        };
        self.bus.remove_component_hook(hooks.component);
        self.bus.remove_state_hook(hooks.state);
        self.bus.remove_event_hook(hooks.event);
        self.bus.remove_performance_hook(hooks.performance);
        tracing::debug!("devtools detached from hook bus");
        true
    }

    pub fn is_attached(&self) -> bool {
        self.attached.lock().is_some()
    }

    /// A handle for the host framework to report through.
    pub fn instrumentor(&self) -> Instrumentor {
        Instrumentor::new(self.bus.clone())
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn bus(&self) -> &Arc<HookBus> {
        &self.bus
    }

    pub fn sanitizer(&self) -> &Arc<Sanitizer> {
        &self.sanitizer
    }

    pub fn config(&self) -> &DevtoolsConfig {
        &self.config
    }

    pub fn export_options(&self, sanitize: bool) -> ExportOptions {
        self.config
            .export_options(sanitize.then(|| self.sanitizer.clone()))
    }

    pub fn export_full_to_path(&self, path: &Path, sanitize: bool) -> Result<ExportCheckpoint> {
        self.store
            .export_full_to_path(path, &self.export_options(sanitize))
    }

    pub fn export_incremental_to_path(
        &self,
        path: &Path,
        checkpoint: Option<&ExportCheckpoint>,
        sanitize: bool,
    ) -> Result<ExportCheckpoint> {
        self.store
            .export_incremental_to_path(path, checkpoint, &self.export_options(sanitize))
    }

    pub fn import_from_path(&self, path: &Path) -> Result<ImportSummary> {
        self.store
            .import_from_path(path, &self.config.import_options())
    }

    pub fn import_delta_from_path(&self, path: &Path) -> Result<ImportSummary> {
        self.store
            .import_delta_from_path(path, &self.config.import_options())
    }

    /// What a sanitized full export would redact right now.
    pub fn preview_redactions(&self) -> PreviewReport {
        let (data, _) = self.store.build_export(&self.export_options(false));
        match self
            .sanitizer
            .sanitize_with_options(&data, self.config.sanitize_options(true))
        {
            SanitizeOutcome::Preview(report) => report,
            SanitizeOutcome::Sanitized(_) => PreviewReport::default(),
        }
    }
}

impl Drop for DevTools {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for DevTools {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevTools")
            .field("store", &self.store)
            .field("attached", &self.is_attached())
            .field("sanitizer", &self.sanitizer)
            .finish()
    }
}
