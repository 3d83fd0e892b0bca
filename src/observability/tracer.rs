//! In-process distributed tracer.
//!
//! # Responsibilities
//! - Mint trace contexts and spans with parent/child linkage
//! - Hold live spans for tag/log/status mutation, seal them on finish
//! - Group retained spans by trace id for inspection and export
//!
//! # Retention
//! ```text
//! start_span:
//!     → append to trace (evict oldest of that trace beyond max_spans_per_trace)
//!     → total > high_water_spans ?
//!         → evict globally oldest spans until total <= low_water_spans
//! ```
//!
//! # Design Decisions
//! - One lock around the whole store; every operation is a short map update
//! - Finished spans are immutable; mutating them is a no-op that returns false
//! - Contexts are plain values, safe to clone into headers and tasks

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Instant;
use uuid::Uuid;

use crate::config::TracingConfig;
use crate::health::state::epoch_millis;

/// Identity of a span as seen by its children and by downstream services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    pub baggage: BTreeMap<String, String>,
}

impl TraceContext {
    pub fn root(trace_id: impl Into<String>, span_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            span_id: span_id.into(),
            parent_span_id: None,
            baggage: BTreeMap::new(),
        }
    }

    pub fn with_baggage(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.baggage.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpanStatus {
    #[default]
    Ok,
    Error,
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpanLog {
    /// Epoch milliseconds.
    pub timestamp: u64,
    pub level: String,
    pub message: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Span {
    pub trace_id: String,
    pub span_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    pub operation_name: String,
    pub service_name: String,
    /// Epoch milliseconds.
    pub start_time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub tags: BTreeMap<String, Value>,
    pub logs: Vec<SpanLog>,
    pub status: SpanStatus,
    #[serde(skip)]
    started: Option<Instant>,
}

impl Span {
    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }

    pub fn context(&self) -> TraceContext {
        TraceContext {
            trace_id: self.trace_id.clone(),
            span_id: self.span_id.clone(),
            parent_span_id: self.parent_span_id.clone(),
            baggage: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Default)]
struct SpanStore {
    spans: HashMap<String, Span>,
    traces: HashMap<String, VecDeque<String>>,
    /// Span ids in creation order; may hold ids already evicted per trace.
    order: VecDeque<String>,
}

impl SpanStore {
    fn insert(&mut self, span: Span, config: &TracingConfig) {
        let trace_id = span.trace_id.clone();
        let span_id = span.span_id.clone();
        self.spans.insert(span_id.clone(), span);
        self.order.push_back(span_id.clone());

        let trace = self.traces.entry(trace_id).or_default();
        trace.push_back(span_id);
        while trace.len() > config.max_spans_per_trace.max(1) {
            if let Some(oldest) = trace.pop_front() {
                self.spans.remove(&oldest);
            }
        }

        if self.spans.len() > config.high_water_spans {
            self.evict_to(config.low_water_spans);
        }
        if self.order.len() > self.spans.len().saturating_mul(2).max(64) {
            let spans = &self.spans;
            self.order.retain(|id| spans.contains_key(id));
        }
    }

    fn evict_to(&mut self, target: usize) {
        let before = self.spans.len();
        while self.spans.len() > target {
            let Some(id) = self.order.pop_front() else {
                break;
            };
            let Some(span) = self.spans.remove(&id) else {
                continue;
            };
            if let Some(trace) = self.traces.get_mut(&span.trace_id) {
                if trace.front() == Some(&id) {
                    trace.pop_front();
                } else {
                    trace.retain(|s| s != &id);
                }
                if trace.is_empty() {
                    self.traces.remove(&span.trace_id);
                }
            }
        }
        tracing::debug!(evicted = before - self.spans.len(), retained = self.spans.len(), "Evicted old spans");
    }
}

/// Span factory and bounded span store.
#[derive(Debug)]
pub struct DistributedTracer {
    config: TracingConfig,
    store: Mutex<SpanStore>,
}

impl Default for DistributedTracer {
    fn default() -> Self {
        Self::new(TracingConfig::default())
    }
}

impl DistributedTracer {
    pub fn new(config: TracingConfig) -> Self {
        Self {
            config,
            store: Mutex::new(SpanStore::default()),
        }
    }

    fn new_id() -> String {
        Uuid::new_v4().simple().to_string()
    }

    /// A fresh root context, not yet backed by a span.
    pub fn create_trace_context(&self) -> TraceContext {
        TraceContext::root(Self::new_id(), Self::new_id())
    }

    /// Open a span. With a parent, the span joins the parent's trace and records
    /// the parent's span id; otherwise a new trace is started.
    pub fn start_span(&self, operation: &str, service: &str, parent: Option<&TraceContext>) -> (Span, TraceContext) {
        let span_id = Self::new_id();
        let (trace_id, parent_span_id, baggage) = match parent {
            Some(p) => (p.trace_id.clone(), Some(p.span_id.clone()), p.baggage.clone()),
            None => (Self::new_id(), None, BTreeMap::new()),
        };

        let span = Span {
            trace_id: trace_id.clone(),
            span_id: span_id.clone(),
            parent_span_id: parent_span_id.clone(),
            operation_name: operation.to_string(),
            service_name: service.to_string(),
            start_time: epoch_millis(),
            end_time: None,
            duration_ms: None,
            tags: BTreeMap::new(),
            logs: Vec::new(),
            status: SpanStatus::Ok,
            started: Some(Instant::now()),
        };
        let context = TraceContext {
            trace_id,
            span_id,
            parent_span_id,
            baggage,
        };

        self.store.lock().insert(span.clone(), &self.config);
        (span, context)
    }

    fn with_live_span(&self, span_id: &str, f: impl FnOnce(&mut Span)) -> bool {
        let mut store = self.store.lock();
        match store.spans.get_mut(span_id) {
            Some(span) if !span.is_finished() => {
                f(span);
                true
            }
            _ => false,
        }
    }

    pub fn add_tag(&self, span_id: &str, key: &str, value: impl Into<Value>) -> bool {
        let value = value.into();
        self.with_live_span(span_id, |span| {
            span.tags.insert(key.to_string(), value);
        })
    }

    pub fn add_log(&self, span_id: &str, level: &str, message: &str, fields: BTreeMap<String, Value>) -> bool {
        self.with_live_span(span_id, |span| {
            span.logs.push(SpanLog {
                timestamp: epoch_millis(),
                level: level.to_string(),
                message: message.to_string(),
                fields,
            });
        })
    }

    pub fn set_status(&self, span_id: &str, status: SpanStatus) -> bool {
        self.with_live_span(span_id, |span| span.status = status)
    }

    /// Seal a span. Returns the finished span, or `None` if it is unknown,
    /// evicted or already finished.
    pub fn finish_span(&self, span_id: &str, extra_tags: BTreeMap<String, Value>) -> Option<Span> {
        let mut store = self.store.lock();
        let span = store.spans.get_mut(span_id)?;
        if span.is_finished() {
            return None;
        }
        let now = epoch_millis();
        span.end_time = Some(now);
        span.duration_ms = Some(match span.started.take() {
            Some(started) => started.elapsed().as_millis() as u64,
            None => now.saturating_sub(span.start_time),
        });
        span.tags.extend(extra_tags);
        Some(span.clone())
    }

    pub fn get_span(&self, span_id: &str) -> Option<Span> {
        self.store.lock().spans.get(span_id).cloned()
    }

    /// Retained spans of a trace in creation order; empty if unknown.
    pub fn get_trace(&self, trace_id: &str) -> Vec<Span> {
        let store = self.store.lock();
        store
            .traces
            .get(trace_id)
            .map(|ids| ids.iter().filter_map(|id| store.spans.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    /// Every retained trace keyed by trace id.
    pub fn all_traces(&self) -> HashMap<String, Vec<Span>> {
        let store = self.store.lock();
        store
            .traces
            .iter()
            .map(|(trace_id, ids)| {
                let spans = ids.iter().filter_map(|id| store.spans.get(id).cloned()).collect();
                (trace_id.clone(), spans)
            })
            .collect()
    }

    pub fn span_count(&self) -> usize {
        self.store.lock().spans.len()
    }

    pub fn trace_count(&self) -> usize {
        self.store.lock().traces.len()
    }
}
