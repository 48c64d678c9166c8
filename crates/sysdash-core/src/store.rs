use crate::page::{PageKind, PageState};
use crate::responses::{ResponseEntry, ResponseKind, ResponseLog, ResponseLogMode};
use crate::series::{MetricSeries, Sample, SeriesSet, DEFAULT_SERIES_CAPACITY};
use crate::status::ModuleStatus;
use crate::wire::{CachedResponse, CountersPayload, InboundMsg, ModulePayload, Request};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Capacity of every metric series and of merged page sequences.
    pub series_capacity: usize,
    pub response_mode: ResponseLogMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            series_capacity: DEFAULT_SERIES_CAPACITY,
            response_mode: ResponseLogMode::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub name: String,
    pub status: ModuleStatus,
    pub commands: BTreeSet<String>,
    pub metrics: SeriesSet,
}

impl Module {
    fn new(name: &str, capacity: usize) -> Self {
        Self {
            name: name.to_string(),
            status: ModuleStatus::default(),
            commands: BTreeSet::new(),
            metrics: SeriesSet::new(capacity),
        }
    }
}

/// What applying a message did, and what the caller owes the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Unchanged,
    Changed,
    Reply(Request),
    PasswordRequested,
}

fn changed_if(flag: bool) -> Outcome {
    if flag {
        Outcome::Changed
    } else {
        Outcome::Unchanged
    }
}

/// Client-side mirror of the dashboard state. Owned by a single task;
/// every mutation goes through `apply` or one of the narrow mutators.
#[derive(Debug, Clone)]
pub struct StateStore {
    config: StoreConfig,
    modules: BTreeMap<String, Module>,
    heap: MetricSeries,
    goroutines: MetricSeries,
    responses: ResponseLog,
    page: PageState,
}

impl StateStore {
    pub fn new(config: StoreConfig, location: &str) -> Self {
        Self {
            config,
            modules: BTreeMap::new(),
            heap: MetricSeries::new(config.series_capacity),
            goroutines: MetricSeries::new(config.series_capacity),
            responses: ResponseLog::new(config.response_mode),
            page: PageState::new(location),
        }
    }

    pub fn config(&self) -> StoreConfig {
        self.config
    }

    pub fn apply(&mut self, msg: InboundMsg, now: DateTime<Utc>) -> Outcome {
        match msg {
            InboundMsg::Error(text) => {
                self.push_response(&text, ResponseKind::Error, now);
                Outcome::Changed
            }
            InboundMsg::ResponseMessage(text) => {
                self.push_response(&text, ResponseKind::Notice, now);
                Outcome::Changed
            }
            InboundMsg::CachedResponse(cached) => {
                self.push_cached_response(cached, now);
                Outcome::Changed
            }
            InboundMsg::HeapStatus(value) => {
                self.heap.push(now, value);
                Outcome::Changed
            }
            InboundMsg::GoroutineCount(value) => {
                self.goroutines.push(now, value);
                Outcome::Changed
            }
            InboundMsg::AddModule(payload) => {
                self.upsert_module(payload, now);
                Outcome::Changed
            }
            InboundMsg::RemoveModule(name) => changed_if(self.remove_module(&name)),
            InboundMsg::StatusUpdate(payload) => {
                changed_if(self.set_status(&payload.name, payload.status))
            }
            InboundMsg::ModuleCommands(payload) => {
                self.set_commands(&payload.name, payload.commands);
                Outcome::Changed
            }
            InboundMsg::MetricsUpdate(payload) => {
                changed_if(self.record_metrics(&payload.name, &payload.metrics, now))
            }
            InboundMsg::Counters(payload) => changed_if(self.record_counters(&payload, now)),
            InboundMsg::ChangePage(payload) => {
                self.page.change(payload.kind, payload.data);
                Outcome::Changed
            }
            InboundMsg::UpdatePageReplace(payload) => {
                let applied = self.page.replace(&payload.name, payload.data);
                if !applied {
                    debug!("store_stale_page_replace: {}", payload.name);
                }
                changed_if(applied)
            }
            InboundMsg::UpdatePageMerge(payload) => {
                let applied =
                    self.page
                        .merge(&payload.name, payload.data, self.config.series_capacity);
                if !applied {
                    debug!("store_stale_page_merge: {}", payload.name);
                }
                changed_if(applied)
            }
            InboundMsg::ResponseMessageCache(items) => {
                let entries = items
                    .into_iter()
                    .map(|cached| cached.into_entry(now))
                    .collect();
                self.responses.load_cache(entries, now);
                Outcome::Changed
            }
            InboundMsg::DeleteCachedResponse(id) => changed_if(self.delete_response(&id)),
            InboundMsg::PasswordRequest => Outcome::PasswordRequested,
            InboundMsg::RequestPageChange => Outcome::Reply(self.resubscribe_request()),
            InboundMsg::Heartbeat => Outcome::Unchanged,
        }
    }

    /// Creates or resets a module. Its series start over, seeded with one
    /// sample per metric given.
    pub fn upsert_module(&mut self, payload: ModulePayload, now: DateTime<Utc>) {
        let mut module = Module::new(&payload.name, self.config.series_capacity);
        module.status = payload.status;
        module.commands = payload.commands;
        for (key, value) in &payload.metrics {
            module.metrics.push(key, now, *value);
        }
        self.modules.insert(payload.name, module);
    }

    pub fn remove_module(&mut self, name: &str) -> bool {
        let removed = self.modules.remove(name).is_some();
        if removed && self.page.selection() == Some(name) {
            self.page.select(None);
        }
        removed
    }

    pub fn set_status(&mut self, name: &str, status: ModuleStatus) -> bool {
        let Some(module) = self.modules.get_mut(name) else {
            debug!("store_status_unknown_module: {name}");
            return false;
        };
        if module.status == status {
            return false;
        }
        module.status = status;
        true
    }

    pub fn set_commands(&mut self, name: &str, commands: BTreeSet<String>) {
        let capacity = self.config.series_capacity;
        self.modules
            .entry(name.to_string())
            .or_insert_with(|| Module::new(name, capacity))
            .commands = commands;
    }

    pub fn record_metrics(
        &mut self,
        name: &str,
        metrics: &BTreeMap<String, f64>,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(module) = self.modules.get_mut(name) else {
            debug!("store_metrics_unknown_module: {name}");
            return false;
        };
        for (key, value) in metrics {
            module.metrics.push(key, now, *value);
        }
        !metrics.is_empty()
    }

    /// Counter fields land in series keyed `<group>/<field>`.
    pub fn record_counters(&mut self, counters: &CountersPayload, now: DateTime<Utc>) -> bool {
        let Some(module) = self.modules.get_mut(&counters.name) else {
            debug!("store_counters_unknown_module: {}", counters.name);
            return false;
        };
        for (field, value) in &counters.fields {
            let key = format!("{}/{}", counters.group, field);
            module.metrics.push(&key, now, *value);
        }
        !counters.fields.is_empty()
    }

    pub fn push_response(&mut self, text: &str, kind: ResponseKind, now: DateTime<Utc>) -> String {
        let page = Some(self.page.location().to_string());
        self.responses.push(text, kind, page, now)
    }

    fn push_cached_response(&mut self, cached: CachedResponse, now: DateTime<Utc>) {
        let entry = cached.into_entry(now);
        let page = entry
            .page
            .clone()
            .or_else(|| Some(self.page.location().to_string()));
        // Server timestamps are kept only where nothing expires from them.
        let stamp = if self.responses.mode().is_persistent() {
            entry.timestamp
        } else {
            now
        };
        self.responses
            .push_with_id(&entry.id, &entry.text, entry.kind, page, stamp);
    }

    pub fn delete_response(&mut self, id: &str) -> bool {
        self.responses.delete(id)
    }

    pub fn expire_responses(&mut self, now: DateTime<Utc>) -> usize {
        self.responses.expire(now)
    }

    pub fn next_response_deadline(&self) -> Option<DateTime<Utc>> {
        self.responses.next_deadline()
    }

    /// Forgets everything the server replays after a (re)connect: modules,
    /// the process-wide series, page contents and a persistent response log.
    /// The requested location and ephemeral notices are kept.
    pub fn reset_for_resubscribe(&mut self) {
        self.modules.clear();
        self.heap.clear();
        self.goroutines.clear();
        self.page.change(PageKind::None, serde_json::Map::new());
        if self.responses.mode().is_persistent() {
            self.responses.clear();
        }
    }

    /// Records `location` as the page to show and returns the request that
    /// asks the server for it.
    pub fn navigate(&mut self, location: &str) -> Request {
        self.page.set_location(location);
        self.resubscribe_request()
    }

    /// The handshake replayed after every (re)connect.
    pub fn resubscribe_request(&self) -> Request {
        Request::ChangePage {
            location: self.page.location().to_string(),
        }
    }

    pub fn select(&mut self, name: Option<String>) {
        self.page.select(name);
    }

    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    pub fn heap(&self) -> &MetricSeries {
        &self.heap
    }

    pub fn goroutines(&self) -> &MetricSeries {
        &self.goroutines
    }

    pub fn responses(&self) -> &ResponseLog {
        &self.responses
    }

    pub fn page(&self) -> &PageState {
        &self.page
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            modules: self
                .modules
                .values()
                .map(|module| ModuleSnapshot {
                    name: module.name.clone(),
                    status: module.status,
                    commands: module.commands.iter().cloned().collect(),
                    metrics: module.metrics.snapshot(),
                })
                .collect(),
            heap: self.heap.snapshot(),
            goroutines: self.goroutines.snapshot(),
            responses: self.responses.snapshot(),
            page: PageSnapshot {
                kind: self.page.kind(),
                identity: self.page.identity().to_string(),
                location: self.page.location().to_string(),
                selection: self.page.selection().map(str::to_string),
                data: self.page.to_value(),
            },
        }
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(StoreConfig::default(), crate::page::DEFAULT_LOCATION)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleSnapshot {
    pub name: String,
    pub status: ModuleStatus,
    pub commands: Vec<String>,
    pub metrics: BTreeMap<String, Vec<Sample>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageSnapshot {
    #[serde(serialize_with = "serialize_page_kind")]
    pub kind: PageKind,
    pub identity: String,
    pub location: String,
    pub selection: Option<String>,
    pub data: Value,
}

fn serialize_page_kind<S>(kind: &PageKind, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u8(kind.code())
}

/// Owned, read-only copy of the store for rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreSnapshot {
    pub modules: Vec<ModuleSnapshot>,
    pub heap: Vec<Sample>,
    pub goroutines: Vec<Sample>,
    pub responses: Vec<ResponseEntry>,
    pub page: PageSnapshot,
}

impl StoreSnapshot {
    pub fn module(&self, name: &str) -> Option<&ModuleSnapshot> {
        self.modules.iter().find(|module| module.name == name)
    }
}
