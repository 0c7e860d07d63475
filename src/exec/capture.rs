// src/exec/capture.rs

/// Append-only in-memory copy of a unit's output, returned to RPC callers
/// that need the output right away (manual runs, dependency steps).
///
/// Seeded content (e.g. logs handed off by dependencies) is always kept;
/// execution output is only recorded when exporting is enabled.
#[derive(Debug, Clone, Default)]
pub struct OutputCapture {
    export: bool,
    buf: Vec<u8>,
}

impl OutputCapture {
    pub fn new(export: bool) -> Self {
        Self {
            export,
            buf: Vec::new(),
        }
    }

    pub fn set_export(&mut self, export: bool) {
        self.export = export;
    }

    pub fn is_exporting(&self) -> bool {
        self.export
    }

    pub fn seed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn record(&mut self, bytes: &[u8]) {
        if self.export {
            self.buf.extend_from_slice(bytes);
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}
