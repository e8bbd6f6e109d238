//! The pipeline driver (spec §2 item 10, §5): the single object that owns
//! the layout dictionary, the packet assembler, and the dissector/observer
//! registries, and drives one end-to-end conversion of a set of input trace
//! files into an output stream.

use crate::assembler::PacketAssembler;
use crate::dissector::DissectorRegistry;
use crate::encoder::{self, EncodedEvent};
use crate::error::PipelineError;
use crate::guid::RESERVED_TRACE_UUID;
use crate::layout::{EventLayout, LayoutDictionary};
use crate::metadata::write_metadata;
use crate::observer::{ObserverRegistry, Observer, PacketSink};
use crate::packet::PacketBuffer;
use crate::provider::{EventCallbacks, EventProviderApi, EventRecord};
use std::path::Path;

/// The output-directory / stream-writer external collaborator (spec §1):
/// the pipeline core never touches the filesystem directly. A CTF stream is
/// opened by name, written to as an append-only byte sink, and closed; the
/// metadata document is written the same way under the name `"metadata"`.
pub trait StreamSink {
    fn open_stream(&mut self, name: &str) -> Result<(), PipelineError>;
    fn write(&mut self, bytes: &[u8]) -> Result<(), PipelineError>;
    fn close_stream(&mut self) -> Result<(), PipelineError>;
}

/// Drives one conversion: decodes every event from every input file, batches
/// the results into fixed-size CTF packets, and writes the packets plus the
/// final metadata document to a [`StreamSink`].
pub struct PipelineDriver {
    dictionary: LayoutDictionary,
    assembler: PacketAssembler,
    dissectors: DissectorRegistry,
    observers: ObserverRegistry,
    event_info_scratch: Vec<u8>,
    property_scratch: Vec<u8>,
    pending_error: Option<PipelineError>,
}

impl PipelineDriver {
    /// `max_packet_bytes` is the CTF packet size (spec §4.6); the dissector
    /// and observer registries start pre-loaded with the bundled plugins
    /// (Chrome dissector, symbol-enrichment observer). Use
    /// [`PipelineDriver::register_dissector`]/[`PipelineDriver::register_observer`]
    /// to add more before calling [`PipelineDriver::convert`].
    pub fn new(max_packet_bytes: usize) -> Self {
        return Self {
            dictionary: LayoutDictionary::new(),
            assembler: PacketAssembler::new(max_packet_bytes),
            dissectors: DissectorRegistry::with_builtins(),
            observers: ObserverRegistry::with_builtins(),
            event_info_scratch: Vec::new(),
            property_scratch: Vec::new(),
            pending_error: None,
        };
    }

    pub fn register_dissector(&mut self, dissector: Box<dyn crate::dissector::Dissector>) {
        self.dissectors.register(dissector);
    }

    pub fn register_observer(&mut self, observer: Box<dyn Observer>) {
        self.observers.register(observer);
    }

    pub fn layout_count(&self) -> usize {
        return self.dictionary.len();
    }

    /// Converts every event in `files` into packets on `sink`, splitting
    /// into a new stream per ETW buffer when `split_buffer` is set, then
    /// writes the trailing `metadata` stream. Checks every input file exists
    /// up front, before opening any traces or touching `sink` (spec §6:
    /// missing input files are a fatal pre-flight error).
    pub fn convert(
        &mut self,
        provider: &mut dyn EventProviderApi,
        files: &[&Path],
        sink: &mut dyn StreamSink,
        split_buffer: bool,
    ) -> Result<(), PipelineError> {
        for file in files {
            if !file.exists() {
                log::error!("input file not found: {}", file.display());
                return Err(PipelineError::MissingInputFile(file.to_path_buf()));
            }
        }

        let mut handles = Vec::with_capacity(files.len());
        for file in files {
            log::info!("opening trace {}", file.display());
            handles.push(provider.open_trace(file).map_err(|e| {
                log::error!("failed opening trace {}: {e}", file.display());
                e
            })?);
        }

        self.pending_error = None;
        sink.open_stream("stream")?;

        {
            let mut session = ConversionSession {
                driver: self,
                sink,
                split_buffer,
            };
            let result = provider.process_trace(&handles, &mut session);
            if let Err(e) = result {
                log::error!("process_trace failed: {e}");
                for handle in handles {
                    provider.close_trace(handle);
                }
                return Err(e);
            }
        }

        if let Some(err) = self.pending_error.take() {
            log::error!("stream write failed: {err}");
            for handle in handles {
                provider.close_trace(handle);
            }
            return Err(err);
        }

        self.flush(sink)?;
        sink.close_stream()?;
        log::info!("wrote {} layout(s) across {} file(s)", self.dictionary.len(), files.len());

        sink.open_stream("metadata")?;
        let text = self.metadata();
        sink.write(text.as_bytes())?;
        sink.close_stream()?;

        for handle in handles {
            provider.close_trace(handle);
        }

        return Ok(());
    }

    fn process_record(&mut self, record: &EventRecord, provider: &dyn EventProviderApi) {
        self.observers.on_begin_process_event(record);

        if let Some(encoded) = encoder::encode_event(
            record,
            provider,
            &mut self.event_info_scratch,
            &mut self.property_scratch,
            &self.dissectors,
            &mut self.observers,
        ) {
            let EncodedEvent { mut buffer, id_offset, layout } = encoded;
            let id = self.dictionary.get_id_for(layout);
            buffer.update_u32(id_offset, id as u32);
            self.assembler.push(buffer);
        }

        // `on_end_process_event` takes the driver itself as a `PacketSink`,
        // so the registry can't stay borrowed out of `self` while we hand
        // `self` to it; swap it out for the call and put it back after.
        let mut observers = std::mem::take(&mut self.observers);
        observers.on_end_process_event(record, self);
        self.observers = observers;
    }

    fn drain_ready(&mut self, sink: &mut dyn StreamSink) -> Result<(), PipelineError> {
        while self.assembler.is_full_ready() {
            let packet = self.assembler.build_packet();
            sink.write(packet.raw())?;
        }
        return Ok(());
    }

    fn flush(&mut self, sink: &mut dyn StreamSink) -> Result<(), PipelineError> {
        while !self.assembler.is_empty() {
            let packet = self.assembler.build_packet();
            sink.write(packet.raw())?;
        }
        return Ok(());
    }

    /// Renders the metadata document for everything decoded so far.
    pub fn metadata(&self) -> String {
        return write_metadata(&self.dictionary, &RESERVED_TRACE_UUID);
    }
}

impl PacketSink for PipelineDriver {
    fn get_id_for_layout(&mut self, layout: EventLayout) -> u64 {
        return self.dictionary.get_id_for(layout);
    }

    fn add_packet_to_sending_queue(&mut self, packet: PacketBuffer) {
        self.assembler.push(packet);
    }
}

/// Bridges the provider's per-event callbacks to the driver for the
/// duration of one `process_trace` call, additionally tracking the
/// `--split-buffer` stream-naming convention and surfacing I/O failures
/// (which `EventCallbacks` has no return channel for) via
/// `driver.pending_error`.
struct ConversionSession<'d, 's> {
    driver: &'d mut PipelineDriver,
    sink: &'s mut dyn StreamSink,
    split_buffer: bool,
}

impl EventCallbacks for ConversionSession<'_, '_> {
    fn on_buffer(&mut self, read_count: u64) {
        if !self.split_buffer {
            return;
        }
        if let Err(e) = self.run_buffer_split(read_count) {
            self.driver.pending_error.get_or_insert(e);
        }
    }

    fn on_event(&mut self, record: &EventRecord, provider: &dyn EventProviderApi) {
        if self.driver.pending_error.is_some() {
            return;
        }
        self.driver.process_record(record, provider);
        if let Err(e) = self.driver.drain_ready(self.sink) {
            self.driver.pending_error.get_or_insert(e);
        }
    }
}

impl ConversionSession<'_, '_> {
    fn run_buffer_split(&mut self, read_count: u64) -> Result<(), PipelineError> {
        self.driver.flush(self.sink)?;
        self.sink.close_stream()?;
        self.sink.open_stream(&format!("stream{}", read_count))?;
        return Ok(());
    }
}
