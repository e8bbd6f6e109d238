//! An in-memory [`EventProviderApi`] for driving the pipeline without a real
//! ETW trace file. Exercised by this crate's own unit tests and available
//! to integration tests and downstream consumers that want to script a
//! conversion end-to-end.

use crate::error::PipelineError;
use crate::provider::{
    EventCallbacks, EventInfo, EventProviderApi, EventRecord, GetEventInfoResult, PropertyInfo,
    PropertyPath, TraceHandle,
};
use std::collections::HashMap;
use std::path::Path;

/// One scripted event: the record handed to the per-event callback plus the
/// schema (and per-property byte values) `get_event_info`/`get_property*`
/// will report for it.
pub struct ScriptedEvent {
    pub record: EventRecord,
    pub info: Option<EventInfo>,
    /// Property name -> one byte blob per array element.
    pub property_values: HashMap<String, Vec<Vec<u8>>>,
}

/// A scripted provider: one "buffer" of scripted events, replayed verbatim
/// by `process_trace`.
#[derive(Default)]
pub struct MockProviderApi {
    events: Vec<ScriptedEvent>,
}

impl MockProviderApi {
    pub fn new() -> Self {
        return Self { events: Vec::new() };
    }

    pub fn push_event(&mut self, event: ScriptedEvent) {
        self.events.push(event);
    }

    fn info_for(&self, record: &EventRecord) -> Option<&EventInfo> {
        return self
            .events
            .iter()
            .find(|e| std::ptr::eq(&e.record, record))
            .and_then(|e| e.info.as_ref());
    }

    fn values_for(&self, record: &EventRecord) -> Option<&HashMap<String, Vec<Vec<u8>>>> {
        return self
            .events
            .iter()
            .find(|e| std::ptr::eq(&e.record, record))
            .map(|e| &e.property_values);
    }
}

impl EventProviderApi for MockProviderApi {
    fn open_trace(&mut self, _path: &Path) -> Result<TraceHandle, PipelineError> {
        return Ok(TraceHandle(1));
    }

    fn process_trace(
        &mut self,
        _handles: &[TraceHandle],
        callbacks: &mut dyn EventCallbacks,
    ) -> Result<(), PipelineError> {
        callbacks.on_buffer(0);
        for event in &self.events {
            callbacks.on_event(&event.record, self);
        }
        return Ok(());
    }

    fn close_trace(&mut self, _handle: TraceHandle) {}

    fn get_event_info(&self, record: &EventRecord, _out_buf: &mut Vec<u8>) -> GetEventInfoResult {
        return match self.info_for(record) {
            Some(info) => GetEventInfoResult::Success(info.clone()),
            None => GetEventInfoResult::Error,
        };
    }

    fn get_property_size(&self, record: &EventRecord, path: &PropertyPath) -> Option<u32> {
        let values = self.values_for(record)?;
        let per_element = values.get(path.name)?;
        return per_element.get(path.index as usize).map(|v| v.len() as u32);
    }

    fn get_property(&self, record: &EventRecord, path: &PropertyPath, out_buf: &mut [u8]) -> bool {
        let values = match self.values_for(record) {
            Some(v) => v,
            None => return false,
        };
        let per_element = match values.get(path.name) {
            Some(v) => v,
            None => return false,
        };
        let value = match per_element.get(path.index as usize) {
            Some(v) => v,
            None => return false,
        };
        if out_buf.len() < value.len() {
            return false;
        }
        out_buf[..value.len()].copy_from_slice(value);
        return true;
    }
}

/// Convenience constructor for a property schema entry, to keep scripted
/// test events terse.
pub fn property(
    name: &str,
    in_type: crate::provider::InType,
    out_type: crate::provider::OutType,
    count: u16,
) -> PropertyInfo {
    return PropertyInfo {
        name: name.to_string(),
        in_type,
        out_type,
        count,
        flags: 0,
    };
}
