//! The immutable program container.

use crate::error::ValidationError;
use crate::verifier;

use bpf_asm::{parse_program, text, Instruction, ParseError};

/// An ordered instruction sequence plus its validation status.
///
/// Instructions never change after construction. Validation runs exactly
/// once, before the first execution; afterwards the program may be shared
/// freely, including across threads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Program {
    instructions: Vec<Instruction>,
    validated: bool,
    error: Option<String>,
}

impl Program {
    /// Wraps a sequence of decoded instructions.
    pub fn from_instructions<I>(instructions: I) -> Self
    where
        I: IntoIterator<Item = Instruction>,
    {
        Self {
            instructions: instructions.into_iter().collect(),
            validated: false,
            error: None,
        }
    }

    /// Decodes a packed 64-bit big-endian instruction stream.
    ///
    /// The length must be a whole number of instructions; there is no
    /// header or padding to skip.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ValidationError> {
        if bytes.len() % Instruction::LEN != 0 {
            return Err(ValidationError::MalformedImage { len: bytes.len() });
        }
        Ok(Self::from_instructions(
            bytes
                .chunks_exact(Instruction::LEN)
                .map(|chunk| Instruction::from(<[u8; Instruction::LEN]>::try_from(chunk).expect("chunk size fixed"))),
        ))
    }

    /// Imports a classic 32-bit-toolchain image, widening each record.
    pub fn from_classic_bytes(bytes: &[u8]) -> Result<Self, ValidationError> {
        if bytes.len() % Instruction::CLASSIC_LEN != 0 {
            return Err(ValidationError::MalformedImage { len: bytes.len() });
        }
        Ok(Self::from_instructions(
            bytes
                .chunks_exact(Instruction::CLASSIC_LEN)
                .map(|chunk| {
                    Instruction::from_classic(
                        <&[u8; Instruction::CLASSIC_LEN]>::try_from(chunk)
                            .expect("chunk size fixed"),
                    )
                }),
        ))
    }

    /// Parses either textual form, auto-detecting which.
    pub fn from_text(input: &str) -> Result<Self, ParseError> {
        Ok(Self::from_instructions(parse_program(input)?))
    }

    /// The instruction sequence.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Number of instructions.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// `true` for a program with no instructions.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Whether validation has run and passed.
    pub const fn is_validated(&self) -> bool {
        self.validated
    }

    /// Why validation failed, if it did.
    pub fn validation_error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Runs the static verifier and records the outcome.
    pub fn validate(&mut self) -> Result<(), ValidationError> {
        match verifier::check(&self.instructions) {
            Ok(()) => {
                self.validated = true;
                self.error = None;
                tracing::debug!(len = self.instructions.len(), "program validated");
                Ok(())
            }
            Err(err) => {
                self.validated = false;
                self.error = Some(err.to_string());
                tracing::debug!(%err, "program rejected");
                Err(err)
            }
        }
    }

    /// Packs the program into its binary image.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.instructions.iter().copied().collect()
    }

    /// Disassembles into the `-d` form.
    pub fn dump(&self) -> String {
        text::dump_program(&self.instructions)
    }

    /// Disassembles into the `-dd` form.
    pub fn dump_hex(&self) -> String {
        text::dump_program_hex(&self.instructions)
    }

    #[cfg(test)]
    pub(crate) fn validated_unchecked(instructions: Vec<Instruction>) -> Self {
        Self {
            instructions,
            validated: true,
            error: None,
        }
    }
}
