//! Capability table: function exports with generation-checked handles
//!
//! A context exports a callable value and receives back an opaque
//! [`ExternalFunction`] handle embedding (index, generation). Handles are
//! safe to transmit inside message payloads; a lookup succeeds only while
//! the generation stored at the index still matches, so a handle can never
//! dangle even if slots are invalidated or reused later.

use crate::engine::EngineValue;
use crate::handle::ThreadHandle;

/// Opaque, revocation-safe handle to a function exported by a context
#[derive(Debug, Clone)]
pub struct ExternalFunction {
    index: u32,
    export_id: u64,
    owner: ThreadHandle,
    recv: Option<ThreadHandle>,
}

impl ExternalFunction {
    /// Slot index in the owning context's export table
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Generation id recorded when the slot was filled
    pub fn export_id(&self) -> u64 {
        self.export_id
    }

    /// The context that owns the exported function
    pub fn owner(&self) -> &ThreadHandle {
        &self.owner
    }

    /// Optional receiving context this handle was minted for
    pub fn recv(&self) -> Option<&ThreadHandle> {
        self.recv.as_ref()
    }
}

impl PartialEq for ExternalFunction {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
            && self.export_id == other.export_id
            && self.owner.id() == other.owner.id()
    }
}

struct ExportEntry {
    value: EngineValue,
    export_id: u64,
}

/// Append-only table of exported callables with per-slot generation ids
pub struct FunctionExports {
    entries: Vec<ExportEntry>,
    next_export_id: u64,
}

impl FunctionExports {
    /// Create an empty export table
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_export_id: 0,
        }
    }

    /// Append a callable value, returning its capability handle
    pub fn add(
        &mut self,
        value: EngineValue,
        owner: ThreadHandle,
        recv: Option<ThreadHandle>,
    ) -> ExternalFunction {
        let index = self.entries.len() as u32;
        self.next_export_id += 1;
        let export_id = self.next_export_id;
        self.entries.push(ExportEntry { value, export_id });
        ExternalFunction {
            index,
            export_id,
            owner,
            recv,
        }
    }

    /// Look up an exported value by (index, generation)
    ///
    /// Returns `None` when the index is out of bounds or the stored
    /// generation no longer matches — callers treat both as
    /// "capability revoked/unknown", not as an error.
    pub fn get(&self, index: u32, export_id: u64) -> Option<EngineValue> {
        let entry = self.entries.get(index as usize)?;
        if entry.export_id != export_id {
            return None;
        }
        Some(entry.value)
    }

    /// Number of slots ever filled
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all entries (teardown)
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for FunctionExports {
    fn default() -> Self {
        Self::new()
    }
}
