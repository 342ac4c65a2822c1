//! The contract by which opcodes in the extension range reach handlers.

use crate::error::ExtensionError;
use crate::memory::PacketMemory;
use crate::protocol::ProtocolInfo;
use crate::registers::{ErrorFlags, RegisterFile};
use crate::verifier::EXTENSION_OPCODE_BASE;

use std::collections::HashMap;

pub mod checksum;

mod builtin;

pub use builtin::BuiltinChecks;

/// Configuration map handed to extensions at registration time.
///
/// The VM itself keeps no global state; anything an extension needs to
/// know arrives through here.
pub type ExtensionConfig = HashMap<String, String>;

/// What an extension sees while registering.
pub struct RegistrationCtx<'a> {
    claims: &'a mut HashMap<u8, usize>,
    extension: usize,
    config: &'a ExtensionConfig,
}

impl RegistrationCtx<'_> {
    /// Claims an opcode byte for the registering extension.
    ///
    /// Claims below [`EXTENSION_OPCODE_BASE`], claims of bytes the core
    /// instruction table owns (`ld len`, `txa`, the high ALU opcodes),
    /// and overlaps with already claimed opcodes are all refused.
    pub fn register_opcode(&mut self, opcode: u8) -> Result<(), ExtensionError> {
        let core_owned = bpf_asm::Opcode::try_from(opcode)
            .map_or(false, |op| !op.is_extension());
        if opcode < EXTENSION_OPCODE_BASE || core_owned {
            return Err(ExtensionError::ReservedOpcode { opcode });
        }
        if self.claims.contains_key(&opcode) {
            return Err(ExtensionError::DuplicateOpcode { opcode });
        }
        self.claims.insert(opcode, self.extension);
        Ok(())
    }

    /// Configuration value for `key`, if the caller supplied one.
    pub fn config(&self, key: &str) -> Option<&str> {
        self.config.get(key).map(String::as_str)
    }
}

/// What an extension sees while executing.
///
/// The packet is read-only; registers and protocol metadata are writable.
pub struct ExtensionCtx<'a> {
    memory: &'a PacketMemory,
    registers: &'a mut RegisterFile,
    layers: &'a mut [ProtocolInfo],
}

impl<'a> ExtensionCtx<'a> {
    pub(crate) fn new(
        memory: &'a PacketMemory,
        registers: &'a mut RegisterFile,
        layers: &'a mut [ProtocolInfo],
    ) -> Self {
        Self {
            memory,
            registers,
            layers,
        }
    }

    /// Read-only packet memory.
    pub fn memory(&self) -> &PacketMemory {
        self.memory
    }

    /// Register file.
    pub fn registers(&self) -> &RegisterFile {
        self.registers
    }

    /// Mutable register file.
    pub fn registers_mut(&mut self) -> &mut RegisterFile {
        self.registers
    }

    /// Protocol metadata for `layer`.
    pub fn layer(&self, layer: usize) -> Option<&ProtocolInfo> {
        self.layers.get(layer)
    }

    /// Mutable protocol metadata for `layer`.
    pub fn layer_mut(&mut self, layer: usize) -> Option<&mut ProtocolInfo> {
        self.layers.get_mut(layer)
    }

    /// Raises error bits in the status register.
    pub fn set_error(&mut self, flags: ErrorFlags) {
        self.registers.set_error(flags);
    }
}

/// An opcode handler family.
///
/// Implementations claim opcodes during [`Extension::initialize`] and are
/// consulted whenever the interpreter meets one of them.
pub trait Extension {
    /// Human-readable name, used in error reports.
    fn name(&self) -> &str;

    /// Version string, purely informational.
    fn version(&self) -> &str;

    /// Claims opcodes and reads configuration.
    fn initialize(&mut self, ctx: &mut RegistrationCtx<'_>) -> Result<(), ExtensionError>;

    /// Executes one instruction.
    ///
    /// Returns `Ok(true)` when the opcode was handled, `Ok(false)` when it
    /// is not this extension's opcode after all.
    fn execute(
        &mut self,
        opcode: u8,
        imm: u32,
        dst: u8,
        src: u8,
        ctx: &mut ExtensionCtx<'_>,
    ) -> Result<bool, ExtensionError>;

    /// Releases whatever `initialize` acquired.
    fn cleanup(&mut self) {}
}

/// The closed-at-runtime `opcode -> handler` table.
///
/// Configured at VM construction and read-only during execution.
#[derive(Default)]
pub struct ExtensionRegistry {
    extensions: Vec<Box<dyn Extension>>,
    by_opcode: HashMap<u8, usize>,
    config: ExtensionConfig,
}

impl ExtensionRegistry {
    /// Creates an empty registry with the given configuration map.
    pub fn new(config: ExtensionConfig) -> Self {
        Self {
            extensions: Vec::new(),
            by_opcode: HashMap::new(),
            config,
        }
    }

    /// Registers an extension, running its `initialize`.
    ///
    /// A failed registration leaves the table as it was: claims made
    /// before the failure are rolled back.
    pub fn register(
        &mut self,
        mut extension: Box<dyn Extension>,
    ) -> Result<(), ExtensionError> {
        let index = self.extensions.len();
        let mut ctx = RegistrationCtx {
            claims: &mut self.by_opcode,
            extension: index,
            config: &self.config,
        };
        if let Err(err) = extension.initialize(&mut ctx) {
            self.by_opcode.retain(|_, claimant| *claimant != index);
            return Err(err);
        }
        tracing::debug!(
            name = extension.name(),
            version = extension.version(),
            "extension registered"
        );
        self.extensions.push(extension);
        Ok(())
    }

    /// Dispatches one instruction to the handler claiming its opcode.
    ///
    /// Returns `Ok(false)` when no handler claims the opcode or the
    /// claiming handler disowns it.
    pub(crate) fn dispatch(
        &mut self,
        opcode: u8,
        imm: u32,
        dst: u8,
        src: u8,
        ctx: &mut ExtensionCtx<'_>,
    ) -> Result<bool, ExtensionError> {
        match self.by_opcode.get(&opcode) {
            Some(&index) => self.extensions[index].execute(opcode, imm, dst, src, ctx),
            None => Ok(false),
        }
    }

    /// Runs `cleanup` on every extension, in registration order.
    pub fn cleanup(&mut self) {
        for extension in &mut self.extensions {
            extension.cleanup();
        }
    }

    /// Names and versions of the registered extensions.
    pub fn registered(&self) -> impl Iterator<Item = (&str, &str)> {
        self.extensions.iter().map(|e| (e.name(), e.version()))
    }
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("extensions", &self.extensions.len())
            .field("opcodes", &self.by_opcode.keys())
            .finish()
    }
}
