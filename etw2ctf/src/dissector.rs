//! The dissector registry (spec §4.7): pluggable payload decoders tried in
//! registration order when the generic scalar/property path fails.

use crate::guid::Guid;
use crate::layout::EventLayout;
use crate::packet::PacketBuffer;

pub mod chrome;

/// A named payload decoder matched internally (typically by provider UUID).
/// `decode` returns `true` having fully populated `buf`/`layout`, or `false`
/// having left both exactly as they were on entry.
pub trait Dissector {
    fn name(&self) -> &str;

    fn decode(
        &self,
        guid: Guid,
        opcode: u8,
        payload: &[u8],
        buf: &mut PacketBuffer,
        layout: &mut EventLayout,
    ) -> bool;
}

/// Dissectors dispatched in registration order; the first one that reports
/// success wins.
#[derive(Default)]
pub struct DissectorRegistry {
    dissectors: Vec<Box<dyn Dissector>>,
}

impl DissectorRegistry {
    pub fn new() -> Self {
        return Self {
            dissectors: Vec::new(),
        };
    }

    /// Registry pre-loaded with the bundled dissectors (currently: Chrome).
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(chrome::ChromeDissector));
        return registry;
    }

    pub fn register(&mut self, dissector: Box<dyn Dissector>) {
        self.dissectors.push(dissector);
    }

    /// Tries each registered dissector in order; returns `true` on the
    /// first success, leaving `buf`/`layout` populated by that dissector.
    pub fn decode(
        &self,
        guid: Guid,
        opcode: u8,
        payload: &[u8],
        buf: &mut PacketBuffer,
        layout: &mut EventLayout,
    ) -> bool {
        for d in &self.dissectors {
            if d.decode(guid, opcode, payload, buf, layout) {
                return true;
            }
        }
        return false;
    }
}
