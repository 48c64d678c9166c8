use crate::page::PageKind;
use crate::responses::{ResponseEntry, ResponseKind};
use crate::status::ModuleStatus;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

pub const DEFAULT_MAX_FRAME_BYTES: usize = 256 * 1024;

pub mod topics {
    pub const ERROR: &str = "error";
    pub const RESPONSE_MESSAGE: &str = "responseMessage";
    pub const HEAP_STATUS: &str = "heapStatus";
    pub const GOROUTINE_COUNT: &str = "goroutineCount";
    pub const ADD_MODULE: &str = "addModule";
    pub const ADD_NODE: &str = "addNode";
    pub const REMOVE_MODULE: &str = "removeModule";
    pub const REMOVE_NODE: &str = "removeNode";
    pub const STATUS_UPDATE: &str = "statusUpdate";
    pub const NODE_STATUS: &str = "nodeStatus";
    pub const NODE_COMMANDS: &str = "nodeCommands";
    pub const METRICS_UPDATE: &str = "metricsUpdate";
    pub const CHANGE_PAGE: &str = "changePage";
    pub const UPDATE_PAGE_REPLACE: &str = "updatePageReplace";
    pub const UPDATE_PAGE_MERGE: &str = "updatePageMerge";
    pub const GET_RESPONSE_MESSAGE_CACHE: &str = "getResponseMessageCache";
    pub const DELETE_CACHED_RESPONSE_MESSAGE: &str = "deleteCachedResponseMessage";
    pub const PASSWORD: &str = "password";
    pub const REQUEST_PAGE_CHANGE: &str = "requestPageChange";
    pub const HEARTBEAT: &str = "heartbeat";

    pub const START: &str = "start";
    pub const STOP: &str = "stop";
    pub const RESET: &str = "reset";
    pub const COMMAND: &str = "command";
    pub const GC: &str = "gc";
    pub const CLOSE: &str = "close";
    pub const PAGE_REQUEST: &str = "pageRequest";

    pub const COUNTERS_PREFIX: &str = "node";
    pub const COUNTERS_SUFFIX: &str = "Counters";
    pub const COUNTERS_PATTERN: &str = "node*Counters";
}

/// The `{topic, payload}` frame used in both directions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub topic: String,
    #[serde(default, deserialize_with = "deserialize_payload")]
    pub payload: String,
}

impl Envelope {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Payloads are strings on the wire, but some servers inline the JSON value
/// instead of encoding it. Both forms normalize to the string form.
fn deserialize_payload<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    })
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,
    #[error("frame exceeds max size ({size} > {max})")]
    TooLarge { size: usize, max: usize },
    #[error("invalid json: {0}")]
    Json(String),
}

pub fn decode_frame(text: &str, max_frame_bytes: usize) -> Result<Envelope, FrameError> {
    if text.len() > max_frame_bytes {
        return Err(FrameError::TooLarge {
            size: text.len(),
            max: max_frame_bytes,
        });
    }
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(FrameError::Empty);
    }
    serde_json::from_str(trimmed).map_err(|err| FrameError::Json(err.to_string()))
}

pub fn encode_frame(envelope: &Envelope, max_frame_bytes: usize) -> Result<String, FrameError> {
    let encoded =
        serde_json::to_string(envelope).map_err(|err| FrameError::Json(err.to_string()))?;
    if encoded.len() > max_frame_bytes {
        return Err(FrameError::TooLarge {
            size: encoded.len(),
            max: max_frame_bytes,
        });
    }
    Ok(encoded)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unknown topic: {0}")]
    UnknownTopic(String),
    #[error("invalid payload for {topic}: {reason}")]
    Payload { topic: String, reason: String },
    #[error("invalid number for {topic}: {value:?}")]
    Number { topic: String, value: String },
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Whether `responseMessage` carries bare text or a cached-response object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    #[default]
    Text,
    Structured,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicContract {
    pub topic: &'static str,
    pub structured: bool,
}

const fn entry(topic: &'static str, structured: bool) -> TopicContract {
    TopicContract { topic, structured }
}

/// Inbound topics with a fixed payload contract. `responseMessage` is
/// listed as text; `Codec` overrides it for structured deployments.
/// `node*Counters` topics are matched by pattern and are always structured.
pub const INBOUND_TOPICS: &[TopicContract] = &[
    entry(topics::ERROR, false),
    entry(topics::RESPONSE_MESSAGE, false),
    entry(topics::HEAP_STATUS, false),
    entry(topics::GOROUTINE_COUNT, false),
    entry(topics::ADD_MODULE, true),
    entry(topics::ADD_NODE, true),
    entry(topics::REMOVE_MODULE, false),
    entry(topics::REMOVE_NODE, false),
    entry(topics::STATUS_UPDATE, true),
    entry(topics::NODE_STATUS, true),
    entry(topics::NODE_COMMANDS, true),
    entry(topics::METRICS_UPDATE, true),
    entry(topics::CHANGE_PAGE, true),
    entry(topics::UPDATE_PAGE_REPLACE, true),
    entry(topics::UPDATE_PAGE_MERGE, true),
    entry(topics::GET_RESPONSE_MESSAGE_CACHE, true),
    entry(topics::DELETE_CACHED_RESPONSE_MESSAGE, false),
    entry(topics::PASSWORD, false),
    entry(topics::REQUEST_PAGE_CHANGE, false),
    entry(topics::HEARTBEAT, false),
];

pub const OUTBOUND_TOPICS: &[&str] = &[
    topics::HEARTBEAT,
    topics::START,
    topics::STOP,
    topics::RESET,
    topics::COMMAND,
    topics::GC,
    topics::CLOSE,
    topics::CHANGE_PAGE,
    topics::PASSWORD,
    topics::PAGE_REQUEST,
    topics::DELETE_CACHED_RESPONSE_MESSAGE,
];

/// Series group for a `node<Group>Counters` topic, first letter lowered:
/// `nodeSystemgeClientCounters` -> `systemgeClient`.
pub fn counters_group(topic: &str) -> Option<String> {
    let inner = topic
        .strip_prefix(topics::COUNTERS_PREFIX)?
        .strip_suffix(topics::COUNTERS_SUFFIX)?;
    let mut chars = inner.chars();
    let first = chars.next()?;
    if !first.is_ascii_uppercase() {
        return None;
    }
    let mut group = String::with_capacity(inner.len());
    group.push(first.to_ascii_lowercase());
    group.push_str(chars.as_str());
    Some(group)
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModulePayload {
    pub name: String,
    #[serde(default)]
    pub status: ModuleStatus,
    #[serde(default, deserialize_with = "deserialize_commands")]
    pub commands: BTreeSet<String>,
    #[serde(default, deserialize_with = "deserialize_metric_map")]
    pub metrics: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusPayload {
    pub name: String,
    pub status: ModuleStatus,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommandsPayload {
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_commands")]
    pub commands: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetricsPayload {
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_metric_map")]
    pub metrics: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CountersPayload {
    pub group: String,
    pub name: String,
    pub fields: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChangePagePayload {
    #[serde(rename = "type")]
    pub kind: PageKind,
    #[serde(default, deserialize_with = "deserialize_page_data")]
    pub data: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PageUpdatePayload {
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_page_data")]
    pub data: Map<String, Value>,
}

/// A response message held in the server-side cache.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CachedResponse {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, alias = "text")]
    pub message: String,
}

impl CachedResponse {
    pub fn into_entry(self, received_at: DateTime<Utc>) -> ResponseEntry {
        ResponseEntry {
            id: self.id,
            page: self.page,
            timestamp: self.timestamp.unwrap_or(received_at),
            text: crate::responses::normalize_text(&self.message),
            kind: ResponseKind::Notice,
            expires_at: None,
        }
    }
}

/// Every inbound message the client understands, decoded from its envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMsg {
    Error(String),
    ResponseMessage(String),
    CachedResponse(CachedResponse),
    HeapStatus(f64),
    GoroutineCount(f64),
    AddModule(ModulePayload),
    RemoveModule(String),
    StatusUpdate(StatusPayload),
    ModuleCommands(CommandsPayload),
    MetricsUpdate(MetricsPayload),
    Counters(CountersPayload),
    ChangePage(ChangePagePayload),
    UpdatePageReplace(PageUpdatePayload),
    UpdatePageMerge(PageUpdatePayload),
    ResponseMessageCache(Vec<CachedResponse>),
    DeleteCachedResponse(String),
    PasswordRequest,
    RequestPageChange,
    Heartbeat,
}

impl InboundMsg {
    pub fn kind(&self) -> &'static str {
        match self {
            InboundMsg::Error(_) => "error",
            InboundMsg::ResponseMessage(_) => "response_message",
            InboundMsg::CachedResponse(_) => "cached_response",
            InboundMsg::HeapStatus(_) => "heap_status",
            InboundMsg::GoroutineCount(_) => "goroutine_count",
            InboundMsg::AddModule(_) => "add_module",
            InboundMsg::RemoveModule(_) => "remove_module",
            InboundMsg::StatusUpdate(_) => "status_update",
            InboundMsg::ModuleCommands(_) => "module_commands",
            InboundMsg::MetricsUpdate(_) => "metrics_update",
            InboundMsg::Counters(_) => "counters",
            InboundMsg::ChangePage(_) => "change_page",
            InboundMsg::UpdatePageReplace(_) => "update_page_replace",
            InboundMsg::UpdatePageMerge(_) => "update_page_merge",
            InboundMsg::ResponseMessageCache(_) => "response_message_cache",
            InboundMsg::DeleteCachedResponse(_) => "delete_cached_response",
            InboundMsg::PasswordRequest => "password_request",
            InboundMsg::RequestPageChange => "request_page_change",
            InboundMsg::Heartbeat => "heartbeat",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Codec {
    pub response_format: ResponseFormat,
}

impl Codec {
    pub fn new(response_format: ResponseFormat) -> Self {
        Self { response_format }
    }

    /// Payload contract for `topic`, or `None` when the topic is unknown.
    pub fn topic_contract(&self, topic: &str) -> Option<TopicContract> {
        if topic == topics::RESPONSE_MESSAGE {
            return Some(entry(
                topics::RESPONSE_MESSAGE,
                self.response_format == ResponseFormat::Structured,
            ));
        }
        if let Some(found) = INBOUND_TOPICS.iter().find(|entry| entry.topic == topic) {
            return Some(*found);
        }
        counters_group(topic).map(|_| entry(topics::COUNTERS_PATTERN, true))
    }

    pub fn decode_frame(&self, text: &str, max_frame_bytes: usize) -> Result<InboundMsg, DecodeError> {
        let envelope = decode_frame(text, max_frame_bytes)?;
        self.decode(&envelope)
    }

    pub fn decode(&self, envelope: &Envelope) -> Result<InboundMsg, DecodeError> {
        let topic = envelope.topic.as_str();
        let payload = envelope.payload.as_str();
        let contract = self
            .topic_contract(topic)
            .ok_or_else(|| DecodeError::UnknownTopic(topic.to_string()))?;

        if contract.topic == topics::COUNTERS_PATTERN {
            return decode_counters(topic, payload);
        }

        let msg = match topic {
            topics::ERROR => InboundMsg::Error(payload.to_string()),
            topics::RESPONSE_MESSAGE if contract.structured => {
                InboundMsg::CachedResponse(parse_structured(topic, payload)?)
            }
            topics::RESPONSE_MESSAGE => InboundMsg::ResponseMessage(payload.to_string()),
            topics::HEAP_STATUS => InboundMsg::HeapStatus(parse_number(topic, payload)?),
            topics::GOROUTINE_COUNT => InboundMsg::GoroutineCount(parse_number(topic, payload)?),
            topics::ADD_MODULE | topics::ADD_NODE => {
                InboundMsg::AddModule(parse_structured(topic, payload)?)
            }
            topics::REMOVE_MODULE | topics::REMOVE_NODE => {
                InboundMsg::RemoveModule(parse_name(topic, payload)?)
            }
            topics::STATUS_UPDATE | topics::NODE_STATUS => {
                InboundMsg::StatusUpdate(parse_structured(topic, payload)?)
            }
            topics::NODE_COMMANDS => InboundMsg::ModuleCommands(parse_structured(topic, payload)?),
            topics::METRICS_UPDATE => InboundMsg::MetricsUpdate(parse_structured(topic, payload)?),
            topics::CHANGE_PAGE => InboundMsg::ChangePage(parse_structured(topic, payload)?),
            topics::UPDATE_PAGE_REPLACE => {
                InboundMsg::UpdatePageReplace(parse_structured(topic, payload)?)
            }
            topics::UPDATE_PAGE_MERGE => {
                InboundMsg::UpdatePageMerge(parse_structured(topic, payload)?)
            }
            topics::GET_RESPONSE_MESSAGE_CACHE => {
                InboundMsg::ResponseMessageCache(parse_cache(topic, payload)?)
            }
            topics::DELETE_CACHED_RESPONSE_MESSAGE => {
                InboundMsg::DeleteCachedResponse(payload.trim().to_string())
            }
            topics::PASSWORD => InboundMsg::PasswordRequest,
            topics::REQUEST_PAGE_CHANGE => InboundMsg::RequestPageChange,
            topics::HEARTBEAT => InboundMsg::Heartbeat,
            other => return Err(DecodeError::UnknownTopic(other.to_string())),
        };
        Ok(msg)
    }
}

fn payload_error(topic: &str, reason: impl ToString) -> DecodeError {
    DecodeError::Payload {
        topic: topic.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_structured<T: serde::de::DeserializeOwned>(
    topic: &str,
    payload: &str,
) -> Result<T, DecodeError> {
    serde_json::from_str(payload).map_err(|err| payload_error(topic, err))
}

fn parse_number(topic: &str, payload: &str) -> Result<f64, DecodeError> {
    let cleaned = payload.trim().trim_matches('"');
    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(DecodeError::Number {
            topic: topic.to_string(),
            value: payload.to_string(),
        }),
    }
}

/// Removal carries the bare module name; `{"name": ..}` is accepted too.
fn parse_name(topic: &str, payload: &str) -> Result<String, DecodeError> {
    let trimmed = payload.trim();
    if trimmed.starts_with('{') {
        let value: Value = serde_json::from_str(trimmed).map_err(|err| payload_error(topic, err))?;
        return value
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| payload_error(topic, "missing name"));
    }
    if trimmed.is_empty() {
        return Err(payload_error(topic, "empty module name"));
    }
    Ok(trimmed.to_string())
}

fn parse_cache(topic: &str, payload: &str) -> Result<Vec<CachedResponse>, DecodeError> {
    if payload.trim().is_empty() {
        return Ok(Vec::new());
    }
    let value: Value = serde_json::from_str(payload).map_err(|err| payload_error(topic, err))?;
    let items = match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        Value::Object(map) => map.into_iter().map(|(_, item)| item).collect(),
        other => return Err(payload_error(topic, format!("expected list, got {other}"))),
    };
    items
        .into_iter()
        .map(|item| serde_json::from_value(item).map_err(|err| payload_error(topic, err)))
        .collect()
}

fn decode_counters(topic: &str, payload: &str) -> Result<InboundMsg, DecodeError> {
    let group = counters_group(topic).ok_or_else(|| DecodeError::UnknownTopic(topic.to_string()))?;
    let value: Value = serde_json::from_str(payload).map_err(|err| payload_error(topic, err))?;
    let Value::Object(map) = value else {
        return Err(payload_error(topic, "expected object"));
    };
    let name = map
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| payload_error(topic, "missing name"))?;
    let fields = map
        .iter()
        .filter(|(key, _)| key.as_str() != "name")
        .filter_map(|(key, value)| numeric(value).map(|n| (key.clone(), n)))
        .collect();
    Ok(InboundMsg::Counters(CountersPayload {
        group,
        name,
        fields,
    }))
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

/// Commands arrive as a list of names or as a `{name: enabled}` object.
fn deserialize_commands<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Null => Ok(BTreeSet::new()),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                other => Err(serde::de::Error::custom(format!(
                    "expected command name, got {other}"
                ))),
            })
            .collect(),
        Value::Object(map) => Ok(map
            .into_iter()
            .filter(|(_, enabled)| enabled.as_bool().unwrap_or(true))
            .map(|(name, _)| name)
            .collect()),
        other => Err(serde::de::Error::custom(format!(
            "expected command list, got {other}"
        ))),
    }
}

/// Non-numeric metric values are skipped rather than failing the message.
fn deserialize_metric_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Null => Ok(BTreeMap::new()),
        Value::Object(map) => Ok(map
            .iter()
            .filter_map(|(key, value)| numeric(value).map(|n| (key.clone(), n)))
            .collect()),
        other => Err(serde::de::Error::custom(format!(
            "expected metric object, got {other}"
        ))),
    }
}

/// Page data is usually a JSON document encoded as a string inside the
/// already string-encoded payload.
fn deserialize_page_data<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let value = match value {
        Value::String(s) if s.trim().is_empty() => Value::Null,
        Value::String(s) => serde_json::from_str(&s).map_err(serde::de::Error::custom)?,
        other => other,
    };
    match value {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map),
        other => Err(serde::de::Error::custom(format!(
            "expected page data object, got {other}"
        ))),
    }
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(serde::de::Error::custom("expected string or number for id")),
    }
}

/// RFC 3339 text or epoch milliseconds.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|ts| Some(ts.with_timezone(&Utc)))
            .map_err(serde::de::Error::custom),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {n}"))),
        other => Err(serde::de::Error::custom(format!(
            "expected timestamp, got {other}"
        ))),
    }
}

/// How page-scoped actions are addressed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestStyle {
    /// Wrapped in a `pageRequest` envelope that the server routes to the
    /// page the client is on.
    #[default]
    PageScoped,
    Direct,
}

#[derive(Serialize)]
struct CommandRequestPayload<'a> {
    name: &'a str,
    command: &'a str,
    args: &'a [String],
}

/// Everything the client can ask of the server.
#[derive(Clone, PartialEq, Eq)]
pub enum Request {
    Heartbeat,
    Start { name: String },
    Stop { name: String },
    Reset { name: String },
    Command {
        name: String,
        command: String,
        args: Vec<String>,
    },
    Gc,
    Close,
    ChangePage { location: String },
    Password { secret: String },
    DeleteCachedResponse { id: String },
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Request::Password { .. } => f.write_str("Password { .. }"),
            Request::Heartbeat => f.write_str("Heartbeat"),
            Request::Start { name } => write!(f, "Start({name})"),
            Request::Stop { name } => write!(f, "Stop({name})"),
            Request::Reset { name } => write!(f, "Reset({name})"),
            Request::Command {
                name,
                command,
                args,
            } => write!(f, "Command({name}, {command}, {args:?})"),
            Request::Gc => f.write_str("Gc"),
            Request::Close => f.write_str("Close"),
            Request::ChangePage { location } => write!(f, "ChangePage({location})"),
            Request::DeleteCachedResponse { id } => write!(f, "DeleteCachedResponse({id})"),
        }
    }
}

impl Request {
    /// Builds a command request from free-form operator input; arguments
    /// are whitespace separated and blank input yields no arguments.
    pub fn command(name: &str, command: &str, input: &str) -> Self {
        Request::Command {
            name: name.to_string(),
            command: command.to_string(),
            args: input.split_whitespace().map(str::to_string).collect(),
        }
    }

    pub fn topic(&self) -> &'static str {
        match self {
            Request::Heartbeat => topics::HEARTBEAT,
            Request::Start { .. } => topics::START,
            Request::Stop { .. } => topics::STOP,
            Request::Reset { .. } => topics::RESET,
            Request::Command { .. } => topics::COMMAND,
            Request::Gc => topics::GC,
            Request::Close => topics::CLOSE,
            Request::ChangePage { .. } => topics::CHANGE_PAGE,
            Request::Password { .. } => topics::PASSWORD,
            Request::DeleteCachedResponse { .. } => topics::DELETE_CACHED_RESPONSE_MESSAGE,
        }
    }

    pub fn is_page_scoped(&self) -> bool {
        !matches!(
            self,
            Request::Heartbeat | Request::ChangePage { .. } | Request::Password { .. }
        )
    }

    fn payload(&self) -> Result<String, FrameError> {
        Ok(match self {
            Request::Heartbeat | Request::Gc | Request::Close => String::new(),
            Request::Start { name } | Request::Stop { name } | Request::Reset { name } => {
                name.clone()
            }
            Request::Command {
                name,
                command,
                args,
            } => serde_json::to_string(&CommandRequestPayload {
                name,
                command,
                args,
            })
            .map_err(|err| FrameError::Json(err.to_string()))?,
            Request::ChangePage { location } => location.clone(),
            Request::Password { secret } => secret.clone(),
            Request::DeleteCachedResponse { id } => id.clone(),
        })
    }

    pub fn to_envelope(&self, style: RequestStyle) -> Result<Envelope, FrameError> {
        let inner = Envelope::new(self.topic(), self.payload()?);
        if style == RequestStyle::Direct || !self.is_page_scoped() {
            return Ok(inner);
        }
        let wrapped =
            serde_json::to_string(&inner).map_err(|err| FrameError::Json(err.to_string()))?;
        Ok(Envelope::new(topics::PAGE_REQUEST, wrapped))
    }

    pub fn encode(&self, style: RequestStyle, max_frame_bytes: usize) -> Result<String, FrameError> {
        encode_frame(&self.to_envelope(style)?, max_frame_bytes)
    }
}
