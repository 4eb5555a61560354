//! Engine configuration: back-end selection, byte order of low-level
//! immediates, linear-memory placement, and stack limits.

/// Which bytecode form the compiler emits and the interpreters execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Structured opcodes with size prefixes, executed by recursive descent.
    High,
    /// Flat instruction stream with absolute jumps, executed by a threaded
    /// dispatcher.
    Low,
}

impl Default for Backend {
    fn default() -> Self {
        Backend::High
    }
}

/// Byte order for integer immediates in the low-level instruction stream.
/// Linear memory access is always little-endian per the Wasm spec; this
/// setting never applies there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Big,
    Little,
    Native,
}

impl Default for ByteOrder {
    fn default() -> Self {
        ByteOrder::Native
    }
}

impl ByteOrder {
    /// Collapse `Native` to the concrete order of the current target.
    pub fn resolved(self) -> ByteOrder {
        match self {
            ByteOrder::Native => {
                if cfg!(target_endian = "big") {
                    ByteOrder::Big
                } else {
                    ByteOrder::Little
                }
            }
            other => other,
        }
    }

    pub fn write_u32(self, out: &mut Vec<u8>, v: u32) {
        match self.resolved() {
            ByteOrder::Big => out.extend_from_slice(&v.to_be_bytes()),
            _ => out.extend_from_slice(&v.to_le_bytes()),
        }
    }

    pub fn write_u64(self, out: &mut Vec<u8>, v: u64) {
        match self.resolved() {
            ByteOrder::Big => out.extend_from_slice(&v.to_be_bytes()),
            _ => out.extend_from_slice(&v.to_le_bytes()),
        }
    }

    /// Overwrite 4 bytes at `at` in place (used by the fixup pass).
    pub fn patch_u32(self, buf: &mut [u8], at: usize, v: u32) {
        let bytes = match self.resolved() {
            ByteOrder::Big => v.to_be_bytes(),
            _ => v.to_le_bytes(),
        };
        buf[at..at + 4].copy_from_slice(&bytes);
    }

    pub fn read_u32(self, buf: &[u8], at: usize) -> Option<u32> {
        let b: [u8; 4] = buf.get(at..at + 4)?.try_into().ok()?;
        Some(match self.resolved() {
            ByteOrder::Big => u32::from_be_bytes(b),
            _ => u32::from_le_bytes(b),
        })
    }

    pub fn read_u64(self, buf: &[u8], at: usize) -> Option<u64> {
        let b: [u8; 8] = buf.get(at..at + 8)?.try_into().ok()?;
        Some(match self.resolved() {
            ByteOrder::Big => u64::from_be_bytes(b),
            _ => u64::from_le_bytes(b),
        })
    }
}

/// The form a module's bodies were compiled in. Stamped into the `Module`
/// so interpreters always read immediates the way the compiler wrote them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeFormat {
    pub backend: Backend,
    pub byte_order: ByteOrder,
}

impl CodeFormat {
    /// Format selected by a configuration. The high-level form fixes its
    /// byte order to big-endian; only the low-level form is configurable.
    pub fn from_config(cfg: &EngineConfig) -> Self {
        match cfg.backend {
            Backend::High => CodeFormat {
                backend: Backend::High,
                byte_order: ByteOrder::Big,
            },
            Backend::Low => CodeFormat {
                backend: Backend::Low,
                byte_order: cfg.low_byte_order.resolved(),
            },
        }
    }
}

/// Runtime stack limits. Exceeding either traps with stack exhaustion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackLimits {
    /// Maximum number of 64-bit operand slots.
    pub operand_slots: usize,
    /// Maximum call depth.
    pub call_depth: usize,
}

impl Default for StackLimits {
    fn default() -> Self {
        Self {
            operand_slots: 64 * 1024,
            call_depth: 1024,
        }
    }
}

/// Engine-wide configuration. Shared by every compilation and
/// instantiation performed through one `Engine`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub backend: Backend,
    /// Byte order of integer immediates emitted by the low-level compiler.
    pub low_byte_order: ByteOrder,
    /// When true (default), linear memories grow their buffer on demand.
    /// When false, capacity for the declared maximum is reserved up front
    /// so `memory.grow` never moves the buffer.
    pub data_on_heap: bool,
    pub stack: StackLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self {
            backend: Backend::default(),
            low_byte_order: ByteOrder::default(),
            data_on_heap: true,
            stack: StackLimits::default(),
        }
    }

    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn low_byte_order(mut self, order: ByteOrder) -> Self {
        self.low_byte_order = order;
        self
    }

    pub fn data_on_heap(mut self, on_heap: bool) -> Self {
        self.data_on_heap = on_heap;
        self
    }

    pub fn stack_limits(mut self, limits: StackLimits) -> Self {
        self.stack = limits;
        self
    }
}
