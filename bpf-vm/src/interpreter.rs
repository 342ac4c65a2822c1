//! [`Interpreter`] implementation: opcode dispatch against a context.

use crate::consts::{SCRATCH_SLOT_COUNT, STEP_BUDGET, VALUE_MASK};
use crate::context::ExecutionContext;
use crate::error::{ExecutionError, ExtensionError, ValidationError};
use crate::extension::{
    BuiltinChecks, Extension, ExtensionConfig, ExtensionCtx, ExtensionRegistry,
};
use crate::program::Program;
use crate::registers::ErrorFlags;
use crate::tracer::TraceRecord;

use bpf_asm::{Instruction, Opcode};

/// The classic BPF interpreter.
///
/// Holds the loaded program and the extension handler table. Both are
/// configured up front and read-only during execution; per-packet state
/// lives in the [`ExecutionContext`] the caller passes in, so one program
/// may run in any number of contexts at once.
pub struct Interpreter {
    program: Option<Program>,
    extensions: ExtensionRegistry,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// Creates an interpreter with the built-in check opcodes registered.
    pub fn new() -> Self {
        Self::with_config(ExtensionConfig::default())
    }

    /// Creates an interpreter, handing `config` to every extension that
    /// registers later.
    pub fn with_config(config: ExtensionConfig) -> Self {
        let mut extensions = ExtensionRegistry::new(config);
        extensions
            .register(Box::<BuiltinChecks>::default())
            .expect("the built-in opcodes are unclaimed in a fresh registry");
        Self {
            program: None,
            extensions,
        }
    }

    /// Registers an extension handler family.
    pub fn register_extension(
        &mut self,
        extension: Box<dyn Extension>,
    ) -> Result<(), ExtensionError> {
        self.extensions.register(extension)
    }

    /// The extension handler table.
    pub fn extensions(&self) -> &ExtensionRegistry {
        &self.extensions
    }

    /// Validates `program` and makes it the loaded program.
    pub fn load_program(&mut self, mut program: Program) -> Result<(), ValidationError> {
        program.validate()?;
        self.program = Some(program);
        Ok(())
    }

    /// The loaded program, if any.
    pub fn program(&self) -> Option<&Program> {
        self.program.as_ref()
    }

    /// Runs the loaded program against the packet in `ctx`.
    pub fn execute(&mut self, ctx: &mut ExecutionContext) -> Result<u32, ExecutionError> {
        let program = self.program.as_ref().ok_or(ExecutionError::NoProgramLoaded)?;
        run(program, &mut self.extensions, ctx)
    }

    /// Runs a caller-owned validated program against the packet in `ctx`.
    ///
    /// This is the entry point for sharing one program across threads:
    /// every thread brings its own interpreter and context and borrows
    /// the same immutable program.
    pub fn execute_program(
        &mut self,
        program: &Program,
        ctx: &mut ExecutionContext,
    ) -> Result<u32, ExecutionError> {
        if !program.is_validated() {
            return Err(ExecutionError::NoProgramLoaded);
        }
        run(program, &mut self.extensions, ctx)
    }
}

fn run(
    program: &Program,
    extensions: &mut ExtensionRegistry,
    ctx: &mut ExecutionContext,
) -> Result<u32, ExecutionError> {
    let instructions = program.instructions();
    ctx.begin_execution();

    let mut steps: u64 = 0;
    loop {
        let pc = ctx.pc();
        if pc >= instructions.len() {
            return Err(ExecutionError::NoTerminatingReturn { pc });
        }
        if steps >= STEP_BUDGET {
            return Err(ExecutionError::Timeout { steps });
        }
        steps += 1;

        let insn = instructions[pc];
        ctx.set_pc(pc + 1);
        tracing::trace!(pc, opcode = insn.op(), "dispatch");

        step(insn, pc, extensions, ctx)?;

        if ctx.tracer().is_enabled() {
            let record = TraceRecord {
                pc,
                instruction: insn,
                a: ctx.registers().a(),
                x: ctx.registers().x(),
                terminated: ctx.is_terminated(),
            };
            ctx.tracer_mut().record(record);
        }

        if ctx.is_terminated() {
            return Ok(ctx.result());
        }
    }
}

fn step(
    insn: Instruction,
    pc: usize,
    extensions: &mut ExtensionRegistry,
    ctx: &mut ExecutionContext,
) -> Result<(), ExecutionError> {
    use Opcode::*;

    let opcode = match insn.opcode() {
        Ok(opcode) if !opcode.is_extension() => opcode,
        // Table extensions and handler-registered bytes take the same path.
        _ => return dispatch_extension(insn, pc, extensions, ctx),
    };

    let k = insn.imm();
    match opcode {
        LdImm => ctx.registers_mut().set_a(k as u64),
        LdxImm => ctx.registers_mut().set_x(k as u64),
        LdAbsW => {
            let v = packet_load(ctx, k as u64, 4);
            ctx.registers_mut().set_a(v);
        }
        LdAbsH => {
            let v = packet_load(ctx, k as u64, 2);
            ctx.registers_mut().set_a(v);
        }
        LdAbsB => {
            let v = packet_load(ctx, k as u64, 1);
            ctx.registers_mut().set_a(v);
        }
        LdIndW => {
            let offset = masked(ctx.registers().x()) + k as u64;
            let v = packet_load(ctx, offset, 4);
            ctx.registers_mut().set_a(v);
        }
        LdIndH => {
            let offset = masked(ctx.registers().x()) + k as u64;
            let v = packet_load(ctx, offset, 2);
            ctx.registers_mut().set_a(v);
        }
        LdIndB => {
            let offset = masked(ctx.registers().x()) + k as u64;
            let v = packet_load(ctx, offset, 1);
            ctx.registers_mut().set_a(v);
        }
        LdLen => {
            let len = ctx.memory().len() as u64;
            ctx.registers_mut().set_a(len);
        }
        LdxLen => {
            let len = ctx.memory().len() as u64;
            ctx.registers_mut().set_x(len);
        }
        LdMsh => {
            let v = (packet_load(ctx, k as u64, 1) & 0x0F) << 2;
            ctx.registers_mut().set_a(v);
        }
        LdxMsh => {
            let v = (packet_load(ctx, k as u64, 1) & 0x0F) << 2;
            ctx.registers_mut().set_x(v);
        }
        LdMem => {
            let slot = scratch_slot(pc, k)?;
            let v = ctx.registers().scratch(slot);
            ctx.registers_mut().set_a(v);
        }
        LdxMem => {
            let slot = scratch_slot(pc, k)?;
            let v = ctx.registers().scratch(slot);
            ctx.registers_mut().set_x(v);
        }

        St => {
            let slot = scratch_slot(pc, k)?;
            let a = ctx.registers().a();
            ctx.registers_mut().set_scratch(slot, a);
        }
        Stx => {
            let slot = scratch_slot(pc, k)?;
            let x = ctx.registers().x();
            ctx.registers_mut().set_scratch(slot, x);
        }

        AddK | AddX => alu(ctx, opcode, k, |a, b| a.wrapping_add(b)),
        SubK | SubX => alu(ctx, opcode, k, |a, b| a.wrapping_sub(b)),
        MulK | MulX => alu(ctx, opcode, k, |a, b| a.wrapping_mul(b)),
        DivK | DivX => alu(ctx, opcode, k, div32),
        ModK | ModX => alu(ctx, opcode, k, rem32),
        OrK | OrX => alu(ctx, opcode, k, |a, b| a | b),
        AndK | AndX => alu(ctx, opcode, k, |a, b| a & b),
        XorK | XorX => alu(ctx, opcode, k, |a, b| a ^ b),
        LshK | LshX => alu(ctx, opcode, k, |a, b| a << (b & 0x1F)),
        RshK | RshX => alu(ctx, opcode, k, |a, b| a >> (b & 0x1F)),
        Neg => {
            let a = ctx.registers().a() as u32;
            ctx.registers_mut().set_a(a.wrapping_neg() as u64);
        }

        Ja => {
            let target = pc as i64 + 1 + insn.offset() as i64;
            let target = usize::try_from(target).map_err(|_| {
                ExecutionError::InterpreterInvariant {
                    pc,
                    message: "jump target before the program start",
                }
            })?;
            ctx.set_pc(target);
        }
        JeqK | JgtK | JgeK | JsetK | JeqX | JgtX | JgeX | JsetX => {
            let a = masked(ctx.registers().a());
            let b = if opcode.compares_index_register() {
                masked(ctx.registers().x())
            } else {
                k as u64
            };
            let taken = match opcode {
                JeqK | JeqX => a == b,
                JgtK | JgtX => a > b,
                JgeK | JgeX => a >= b,
                _ => a & b != 0,
            };
            branch(ctx, pc, insn, taken);
        }

        RetK => {
            ctx.set_result(k);
            ctx.set_terminated(true);
        }
        RetA => {
            let a = masked(ctx.registers().a()) as u32;
            ctx.set_result(a);
            ctx.set_terminated(true);
        }

        Tax => {
            let a = ctx.registers().a();
            ctx.registers_mut().set_x(a);
        }
        Txa => {
            let x = ctx.registers().x();
            ctx.registers_mut().set_a(x);
        }

        ChkCrc | ChkL3Csum | ChkL4Csum | ChkTrunc | ChkFrameLen | ChkProtoLoc => {
            unreachable!("extension opcodes are dispatched above")
        }
    }

    Ok(())
}

fn dispatch_extension(
    insn: Instruction,
    pc: usize,
    extensions: &mut ExtensionRegistry,
    ctx: &mut ExecutionContext,
) -> Result<(), ExecutionError> {
    let (memory, registers, layers) = ctx.extension_views();
    let mut view = ExtensionCtx::new(memory, registers, layers);
    match extensions.dispatch(insn.op(), insn.imm(), insn.dst(), insn.src(), &mut view) {
        Ok(true) => Ok(()),
        Ok(false) => Err(ExecutionError::UnknownOpcode {
            opcode: insn.op(),
            pc,
        }),
        Err(source) => Err(ExecutionError::Extension { pc, source }),
    }
}

/// Reads `size` packet bytes at `offset` into a register value.
///
/// A failed load is silent at the program level: the value is zero and
/// the truncation bit is raised in the error register.
fn packet_load(ctx: &mut ExecutionContext, offset: u64, size: usize) -> u64 {
    let read = match size {
        1 => ctx.memory().read_u8(offset).map(u64::from),
        2 => ctx.memory().read_u16(offset).map(u64::from),
        _ => ctx.memory().read_u32(offset).map(u64::from),
    };
    match read {
        Ok(value) => value,
        Err(_) => {
            ctx.registers_mut().set_error(ErrorFlags::TRUNCATED);
            0
        }
    }
}

/// Applies `f` to `A` and the second operand, masking the result to 32 bits.
///
/// ALU opcodes keep the immediate/register distinction in bit 3: the `X`
/// variants are the `K` variants plus `0x08`.
fn alu(ctx: &mut ExecutionContext, opcode: Opcode, k: u32, f: impl FnOnce(u64, u64) -> u64) {
    let regs = ctx.registers_mut();
    let b = if u8::from(opcode) & 0x08 != 0 {
        masked(regs.x())
    } else {
        k as u64
    };
    let a = masked(regs.a());
    regs.set_a(f(a, b) & VALUE_MASK);
}

fn div32(a: u64, b: u64) -> u64 {
    if b == 0 {
        0
    } else {
        a / b
    }
}

fn rem32(a: u64, b: u64) -> u64 {
    if b == 0 {
        0
    } else {
        a % b
    }
}

fn masked(value: u64) -> u64 {
    value & VALUE_MASK
}

fn branch(ctx: &mut ExecutionContext, pc: usize, insn: Instruction, taken: bool) {
    let offset = if taken { insn.jt() } else { insn.jf() };
    ctx.set_pc(pc + 1 + offset as usize);
}

fn scratch_slot(pc: usize, k: u32) -> Result<usize, ExecutionError> {
    let slot = k as usize;
    if slot < SCRATCH_SLOT_COUNT {
        Ok(slot)
    } else {
        Err(ExecutionError::InterpreterInvariant {
            pc,
            message: "scratch slot out of range",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bpf_asm::op;

    fn context_with_packet(bytes: &[u8]) -> ExecutionContext {
        let mut ctx = ExecutionContext::new();
        ctx.load_packet(bytes).unwrap();
        ctx
    }

    #[test]
    fn executing_without_a_program_fails() {
        let mut vm = Interpreter::new();
        let mut ctx = context_with_packet(&[0; 14]);
        assert_eq!(vm.execute(&mut ctx), Err(ExecutionError::NoProgramLoaded));
    }

    #[test]
    fn unvalidated_programs_are_refused() {
        let mut vm = Interpreter::new();
        let program = Program::from_instructions([op::ret_k(0)]);
        let mut ctx = context_with_packet(&[0; 14]);
        assert_eq!(
            vm.execute_program(&program, &mut ctx),
            Err(ExecutionError::NoProgramLoaded)
        );
    }

    #[test]
    fn the_step_budget_catches_verifier_escapes() {
        // A backward jump can only exist if validation was bypassed.
        let program = Program::validated_unchecked(vec![op::ja(-1), op::ret_k(0)]);
        let mut vm = Interpreter::new();
        let mut ctx = context_with_packet(&[0; 14]);
        assert_eq!(
            vm.execute_program(&program, &mut ctx),
            Err(ExecutionError::Timeout { steps: STEP_BUDGET })
        );
    }

    #[test]
    fn unclaimed_extension_opcodes_fail_cleanly() {
        let program = Program::validated_unchecked(vec![
            Instruction::from_parts(0x99, 0, 0, 0),
            op::ret_k(0),
        ]);
        let mut vm = Interpreter::new();
        let mut ctx = context_with_packet(&[0; 14]);
        assert_eq!(
            vm.execute_program(&program, &mut ctx),
            Err(ExecutionError::UnknownOpcode {
                opcode: 0x99,
                pc: 0
            })
        );
    }

    #[test]
    fn tracing_records_each_dispatched_instruction() {
        let mut vm = Interpreter::new();
        vm.load_program(Program::from_instructions([
            op::ld_imm(5),
            op::tax(),
            op::ret_a(),
        ]))
        .unwrap();

        let mut ctx = context_with_packet(&[0; 14]);
        ctx.tracer_mut().enable();
        assert_eq!(vm.execute(&mut ctx), Ok(5));

        let records = ctx.tracer().records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].x, 5);
        assert!(records[2].terminated);
    }

    #[test]
    fn ja_minus_one_wrapping_before_the_start_is_an_invariant_breach() {
        let program = Program::validated_unchecked(vec![op::ja(-2), op::ret_k(0)]);
        let mut vm = Interpreter::new();
        let mut ctx = context_with_packet(&[0; 14]);
        assert_eq!(
            vm.execute_program(&program, &mut ctx),
            Err(ExecutionError::InterpreterInvariant {
                pc: 0,
                message: "jump target before the program start",
            })
        );
    }
}
