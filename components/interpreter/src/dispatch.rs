//! Dispatch loop for bytecode execution
//!
//! [`Dispatcher::step`] executes exactly one instruction of the current
//! frame. The program counter only moves when the instruction reports
//! [`Flow::Advance`]; control transfers set it themselves. Conditions raised
//! by an instruction come back as a [`Fault`] and are turned into exception
//! objects and handler searches by [`Dispatcher::run`].

use std::sync::Arc;

use arrayvec::ArrayVec;
use bytecode_system::Opcode;
use core_types::{
    float_to_word, join_double, join_long, split_double, split_long, word_to_float,
    ExceptionKind, ObjectRef, ResolutionError, VerificationError, VmError, VmResult, Word,
};
use memory_manager::ObjectError;
use tracing::{debug, trace};

use crate::context::ThreadContext;
use crate::convert;
use crate::runtime::Runtime;

/// How an instruction left the program counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    /// Move past the instruction by this many bytes
    Advance(u32),
    /// The instruction already set the program counter or changed frames
    Transferred,
    /// The run's outermost frame returned
    Finished,
    /// Monitor contention; retry the same instruction later
    Blocked,
}

/// Abnormal completion of an instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Fault {
    /// Raise a catchable condition of this kind
    Throw(ExceptionKind),
    /// Raise this exception object
    ThrowObject(ObjectRef),
    /// Stop the thread
    Fatal(VmError),
}

impl From<VmError> for Fault {
    fn from(err: VmError) -> Self {
        Fault::Fatal(err)
    }
}

impl From<VerificationError> for Fault {
    fn from(err: VerificationError) -> Self {
        Fault::Fatal(err.into())
    }
}

impl From<ObjectError> for Fault {
    fn from(err: ObjectError) -> Self {
        match err {
            ObjectError::Alloc(_) => Fault::Throw(ExceptionKind::OutOfMemory),
            ObjectError::Vm(err) => Fault::Fatal(err),
        }
    }
}

pub(crate) type Step = Result<Flow, Fault>;

/// How a run of the dispatch loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RunOutcome {
    /// The outermost frame returned these words
    Returned(Vec<Word>),
    /// This exception escaped the outermost frame
    Threw(ObjectRef),
    /// Instruction quota used up
    Yielded,
    /// Waiting for a monitor
    Blocked,
}

/// Operand reader for the instruction at `at`
pub(crate) struct Operands<'c> {
    code: &'c [u8],
    at: usize,
}

impl<'c> Operands<'c> {
    pub(crate) fn new(code: &'c [u8], at: usize) -> Self {
        Self { code, at }
    }

    /// Byte `n` positions after the opcode
    pub(crate) fn byte(&self, n: usize) -> Result<u8, VerificationError> {
        self.code
            .get(self.at + n)
            .copied()
            .ok_or(VerificationError::CodeOverrun((self.at + n) as u32))
    }

    pub(crate) fn u8(&self) -> Result<u8, VerificationError> {
        self.byte(1)
    }

    pub(crate) fn u16(&self) -> Result<u16, VerificationError> {
        self.u16_at(1)
    }

    pub(crate) fn u16_at(&self, n: usize) -> Result<u16, VerificationError> {
        Ok(u16::from_be_bytes([self.byte(n)?, self.byte(n + 1)?]))
    }

    pub(crate) fn i16(&self) -> Result<i16, VerificationError> {
        Ok(self.u16()? as i16)
    }

    pub(crate) fn i32_at(&self, n: usize) -> Result<i32, VerificationError> {
        Ok(i32::from_be_bytes([
            self.byte(n)?,
            self.byte(n + 1)?,
            self.byte(n + 2)?,
            self.byte(n + 3)?,
        ]))
    }

    /// Distance from the opcode to the first 4-byte aligned position after it
    ///
    /// Alignment is relative to the start of the code array.
    pub(crate) fn switch_base(&self) -> usize {
        ((self.at + 4) & !3) - self.at
    }
}

/// Executes bytecode of one thread against the shared runtime
pub(crate) struct Dispatcher<'a> {
    pub rt: &'a mut Runtime,
    pub thread: &'a mut ThreadContext,
}

impl<'a> Dispatcher<'a> {
    pub fn new(rt: &'a mut Runtime, thread: &'a mut ThreadContext) -> Self {
        Self { rt, thread }
    }

    /// Execute until the frames above the thread's boundary are gone, the
    /// thread blocks, or `quota` instructions have run
    pub fn run(&mut self, quota: Option<u32>) -> VmResult<RunOutcome> {
        let mut executed: u32 = 0;
        loop {
            if self.rt.halted {
                return Err(VmError::Halted);
            }
            if self.thread.depth() <= self.thread.boundary {
                let words = self.thread.result.take().unwrap_or_default();
                return Ok(RunOutcome::Returned(words));
            }
            if quota.is_some_and(|limit| executed >= limit) {
                return Ok(RunOutcome::Yielded);
            }
            executed += 1;

            match self.step() {
                Ok(Flow::Advance(length)) => {
                    if let Some(frame) = self.thread.frame_mut() {
                        frame.pc.offset += length;
                    }
                }
                Ok(Flow::Transferred) => {}
                Ok(Flow::Finished) => {
                    let words = self.thread.result.take().unwrap_or_default();
                    return Ok(RunOutcome::Returned(words));
                }
                Ok(Flow::Blocked) => return Ok(RunOutcome::Blocked),
                Err(fault) => {
                    if let Some(escaped) = self.handle_fault(fault)? {
                        return Ok(RunOutcome::Threw(escaped));
                    }
                }
            }
        }
    }

    /// Materialize and dispatch a fault; `Some` if it escaped the run
    fn handle_fault(&mut self, fault: Fault) -> VmResult<Option<ObjectRef>> {
        let exception = match fault {
            Fault::Fatal(err) => return Err(err),
            Fault::Throw(kind) => {
                debug!(thread = self.thread.id.0, exception = kind.class_name(), "raising");
                self.materialize(kind)?
            }
            Fault::ThrowObject(object) => object,
        };
        self.unwind(exception)
    }

    /// Execute one instruction of the current frame
    pub fn step(&mut self) -> Step {
        let frame = self.thread.frame().ok_or(VerificationError::StackUnderflow)?;
        let pc = frame.pc;
        let descriptor = Arc::clone(&frame.descriptor);
        let method = descriptor
            .method(pc.method)
            .ok_or(VmError::InvalidClass(pc.class.index()))?;
        let Some(code) = method.code_at(pc.code_attr) else {
            return Err(VmError::from(ResolutionError::MissingCode {
                class: descriptor.name.clone(),
                name: method.name.clone(),
                descriptor: method.descriptor.clone(),
            })
            .into());
        };
        let at = pc.offset as usize;
        let byte = *code
            .code
            .get(at)
            .ok_or(VerificationError::CodeOverrun(pc.offset))?;
        let opcode = Opcode::try_from(byte).map_err(|opcode| VerificationError::IllegalOpcode {
            opcode,
            offset: pc.offset,
        })?;
        let ops = Operands::new(&code.code, at);
        let code_len = code.code.len();
        trace!(offset = pc.offset, op = opcode.mnemonic(), "step");

        match opcode {
            Opcode::Nop => Ok(Flow::Advance(1)),

            // Constants
            Opcode::AconstNull => self.push_then(&[0], 1),
            Opcode::IconstM1
            | Opcode::Iconst0
            | Opcode::Iconst1
            | Opcode::Iconst2
            | Opcode::Iconst3
            | Opcode::Iconst4
            | Opcode::Iconst5 => {
                let value = byte as i32 - Opcode::Iconst0 as i32;
                self.push_then(&[value as Word], 1)
            }
            Opcode::Lconst0 | Opcode::Lconst1 => {
                let value = (byte - Opcode::Lconst0 as u8) as i64;
                self.push_then(&split_long(value), 1)
            }
            Opcode::Fconst0 | Opcode::Fconst1 | Opcode::Fconst2 => {
                let value = (byte - Opcode::Fconst0 as u8) as f32;
                self.push_then(&[float_to_word(value)], 1)
            }
            Opcode::Dconst0 | Opcode::Dconst1 => {
                let value = (byte - Opcode::Dconst0 as u8) as f64;
                self.push_then(&split_double(value), 1)
            }
            Opcode::Bipush => {
                let value = ops.u8()? as i8 as i32;
                self.push_then(&[value as Word], 2)
            }
            Opcode::Sipush => {
                let value = ops.i16()? as i32;
                self.push_then(&[value as Word], 3)
            }
            Opcode::Ldc => self.ldc(pc.class, &descriptor, ops.u8()? as u16, false, 2),
            Opcode::LdcW => self.ldc(pc.class, &descriptor, ops.u16()?, false, 3),
            Opcode::Ldc2W => self.ldc(pc.class, &descriptor, ops.u16()?, true, 3),

            // Loads
            Opcode::Iload | Opcode::Fload | Opcode::Aload => self.load(ops.u8()? as usize, 1, 2),
            Opcode::Lload | Opcode::Dload => self.load(ops.u8()? as usize, 2, 2),
            Opcode::Iload0 | Opcode::Iload1 | Opcode::Iload2 | Opcode::Iload3 => {
                self.load((byte - Opcode::Iload0 as u8) as usize, 1, 1)
            }
            Opcode::Fload0 | Opcode::Fload1 | Opcode::Fload2 | Opcode::Fload3 => {
                self.load((byte - Opcode::Fload0 as u8) as usize, 1, 1)
            }
            Opcode::Aload0 | Opcode::Aload1 | Opcode::Aload2 | Opcode::Aload3 => {
                self.load((byte - Opcode::Aload0 as u8) as usize, 1, 1)
            }
            Opcode::Lload0 | Opcode::Lload1 | Opcode::Lload2 | Opcode::Lload3 => {
                self.load((byte - Opcode::Lload0 as u8) as usize, 2, 1)
            }
            Opcode::Dload0 | Opcode::Dload1 | Opcode::Dload2 | Opcode::Dload3 => {
                self.load((byte - Opcode::Dload0 as u8) as usize, 2, 1)
            }

            // Stores
            Opcode::Istore | Opcode::Fstore | Opcode::Astore => {
                self.store(ops.u8()? as usize, 1, 2)
            }
            Opcode::Lstore | Opcode::Dstore => self.store(ops.u8()? as usize, 2, 2),
            Opcode::Istore0 | Opcode::Istore1 | Opcode::Istore2 | Opcode::Istore3 => {
                self.store((byte - Opcode::Istore0 as u8) as usize, 1, 1)
            }
            Opcode::Fstore0 | Opcode::Fstore1 | Opcode::Fstore2 | Opcode::Fstore3 => {
                self.store((byte - Opcode::Fstore0 as u8) as usize, 1, 1)
            }
            Opcode::Astore0 | Opcode::Astore1 | Opcode::Astore2 | Opcode::Astore3 => {
                self.store((byte - Opcode::Astore0 as u8) as usize, 1, 1)
            }
            Opcode::Lstore0 | Opcode::Lstore1 | Opcode::Lstore2 | Opcode::Lstore3 => {
                self.store((byte - Opcode::Lstore0 as u8) as usize, 2, 1)
            }
            Opcode::Dstore0 | Opcode::Dstore1 | Opcode::Dstore2 | Opcode::Dstore3 => {
                self.store((byte - Opcode::Dstore0 as u8) as usize, 2, 1)
            }

            // Arrays
            Opcode::Iaload
            | Opcode::Laload
            | Opcode::Faload
            | Opcode::Daload
            | Opcode::Aaload
            | Opcode::Baload
            | Opcode::Caload
            | Opcode::Saload => self.array_load(opcode),
            Opcode::Iastore
            | Opcode::Lastore
            | Opcode::Fastore
            | Opcode::Dastore
            | Opcode::Aastore
            | Opcode::Bastore
            | Opcode::Castore
            | Opcode::Sastore => self.array_store(opcode),

            // Operand stack
            Opcode::Pop => {
                self.thread.pop()?;
                Ok(Flow::Advance(1))
            }
            Opcode::Pop2 => {
                self.thread.pop_n(2)?;
                Ok(Flow::Advance(1))
            }
            Opcode::Dup => {
                let top = self.thread.peek(0)?;
                self.push_then(&[top], 1)
            }
            Opcode::DupX1 => self.shuffle(2, &[1, 0, 1]),
            Opcode::DupX2 => self.shuffle(3, &[2, 0, 1, 2]),
            Opcode::Dup2 => self.shuffle(2, &[0, 1, 0, 1]),
            Opcode::Dup2X1 => self.shuffle(3, &[1, 2, 0, 1, 2]),
            Opcode::Dup2X2 => self.shuffle(4, &[2, 3, 0, 1, 2, 3]),
            Opcode::Swap => self.shuffle(2, &[1, 0]),

            // Integer arithmetic
            Opcode::Iadd => self.int_binary(i32::wrapping_add),
            Opcode::Isub => self.int_binary(i32::wrapping_sub),
            Opcode::Imul => self.int_binary(i32::wrapping_mul),
            Opcode::Idiv => self.int_divide(i32::wrapping_div),
            Opcode::Irem => self.int_divide(i32::wrapping_rem),
            Opcode::Ineg => {
                let value = self.pop_int()?;
                self.push_then(&[value.wrapping_neg() as Word], 1)
            }
            Opcode::Iand => self.int_binary(|a, b| a & b),
            Opcode::Ior => self.int_binary(|a, b| a | b),
            Opcode::Ixor => self.int_binary(|a, b| a ^ b),
            Opcode::Ishl => self.int_binary(|a, b| a.wrapping_shl(convert::int_shift(b))),
            Opcode::Ishr => self.int_binary(|a, b| a.wrapping_shr(convert::int_shift(b))),
            Opcode::Iushr => {
                self.int_binary(|a, b| ((a as u32) >> convert::int_shift(b)) as i32)
            }

            // Long arithmetic
            Opcode::Ladd => self.long_binary(i64::wrapping_add),
            Opcode::Lsub => self.long_binary(i64::wrapping_sub),
            Opcode::Lmul => self.long_binary(i64::wrapping_mul),
            Opcode::Ldiv => self.long_divide(i64::wrapping_div),
            Opcode::Lrem => self.long_divide(i64::wrapping_rem),
            Opcode::Lneg => {
                let value = self.pop_long()?;
                self.push_then(&split_long(value.wrapping_neg()), 1)
            }
            Opcode::Land => self.long_binary(|a, b| a & b),
            Opcode::Lor => self.long_binary(|a, b| a | b),
            Opcode::Lxor => self.long_binary(|a, b| a ^ b),
            Opcode::Lshl => self.long_shift(|a, n| a.wrapping_shl(n)),
            Opcode::Lshr => self.long_shift(|a, n| a.wrapping_shr(n)),
            Opcode::Lushr => self.long_shift(|a, n| ((a as u64) >> n) as i64),

            // Floating point
            Opcode::Fadd => self.float_binary(|a, b| a + b),
            Opcode::Fsub => self.float_binary(|a, b| a - b),
            Opcode::Fmul => self.float_binary(|a, b| a * b),
            Opcode::Fdiv => self.float_binary(|a, b| a / b),
            Opcode::Frem => self.float_binary(|a, b| a % b),
            Opcode::Fneg => {
                let value = self.pop_float()?;
                self.push_then(&[float_to_word(-value)], 1)
            }
            Opcode::Dadd => self.double_binary(|a, b| a + b),
            Opcode::Dsub => self.double_binary(|a, b| a - b),
            Opcode::Dmul => self.double_binary(|a, b| a * b),
            Opcode::Ddiv => self.double_binary(|a, b| a / b),
            Opcode::Drem => self.double_binary(|a, b| a % b),
            Opcode::Dneg => {
                let value = self.pop_double()?;
                self.push_then(&split_double(-value), 1)
            }

            Opcode::Iinc => {
                let index = ops.u8()? as usize;
                let delta = ops.byte(2)? as i8 as i32;
                self.increment(index, delta)?;
                Ok(Flow::Advance(3))
            }

            // Conversions
            Opcode::I2l => {
                let value = self.pop_int()?;
                self.push_then(&split_long(value as i64), 1)
            }
            Opcode::I2f => {
                let value = self.pop_int()?;
                self.push_then(&[float_to_word(value as f32)], 1)
            }
            Opcode::I2d => {
                let value = self.pop_int()?;
                self.push_then(&split_double(value as f64), 1)
            }
            Opcode::L2i => {
                let value = self.pop_long()?;
                self.push_then(&[value as i32 as Word], 1)
            }
            Opcode::L2f => {
                let value = self.pop_long()?;
                self.push_then(&[float_to_word(value as f32)], 1)
            }
            Opcode::L2d => {
                let value = self.pop_long()?;
                self.push_then(&split_double(value as f64), 1)
            }
            Opcode::F2i => {
                let value = self.pop_float()?;
                self.push_then(&[convert::f2i(value) as Word], 1)
            }
            Opcode::F2l => {
                let value = self.pop_float()?;
                self.push_then(&split_long(convert::f2l(value)), 1)
            }
            Opcode::F2d => {
                let value = self.pop_float()?;
                self.push_then(&split_double(value as f64), 1)
            }
            Opcode::D2i => {
                let value = self.pop_double()?;
                self.push_then(&[convert::d2i(value) as Word], 1)
            }
            Opcode::D2l => {
                let value = self.pop_double()?;
                self.push_then(&split_long(convert::d2l(value)), 1)
            }
            Opcode::D2f => {
                let value = self.pop_double()?;
                self.push_then(&[float_to_word(value as f32)], 1)
            }
            Opcode::I2b => {
                let value = self.pop_int()?;
                self.push_then(&[value as i8 as i32 as Word], 1)
            }
            Opcode::I2c => {
                let value = self.pop_int()?;
                self.push_then(&[value as u16 as Word], 1)
            }
            Opcode::I2s => {
                let value = self.pop_int()?;
                self.push_then(&[value as i16 as i32 as Word], 1)
            }

            // Comparisons
            Opcode::Lcmp => {
                let b = self.pop_long()?;
                let a = self.pop_long()?;
                self.push_then(&[convert::compare_longs(a, b) as Word], 1)
            }
            Opcode::Fcmpl | Opcode::Fcmpg => {
                let b = self.pop_float()?;
                let a = self.pop_float()?;
                let unordered = if opcode == Opcode::Fcmpl { -1 } else { 1 };
                self.push_then(&[convert::compare_floats(a, b, unordered) as Word], 1)
            }
            Opcode::Dcmpl | Opcode::Dcmpg => {
                let b = self.pop_double()?;
                let a = self.pop_double()?;
                let unordered = if opcode == Opcode::Dcmpl { -1 } else { 1 };
                self.push_then(&[convert::compare_floats(a, b, unordered) as Word], 1)
            }

            // Branches
            Opcode::Ifeq | Opcode::Ifne | Opcode::Iflt | Opcode::Ifge | Opcode::Ifgt
            | Opcode::Ifle => {
                let value = self.pop_int()?;
                let taken = match opcode {
                    Opcode::Ifeq => value == 0,
                    Opcode::Ifne => value != 0,
                    Opcode::Iflt => value < 0,
                    Opcode::Ifge => value >= 0,
                    Opcode::Ifgt => value > 0,
                    _ => value <= 0,
                };
                self.branch_if(taken, ops.i16()? as i32, code_len)
            }
            Opcode::IfIcmpeq
            | Opcode::IfIcmpne
            | Opcode::IfIcmplt
            | Opcode::IfIcmpge
            | Opcode::IfIcmpgt
            | Opcode::IfIcmple => {
                let b = self.pop_int()?;
                let a = self.pop_int()?;
                let taken = match opcode {
                    Opcode::IfIcmpeq => a == b,
                    Opcode::IfIcmpne => a != b,
                    Opcode::IfIcmplt => a < b,
                    Opcode::IfIcmpge => a >= b,
                    Opcode::IfIcmpgt => a > b,
                    _ => a <= b,
                };
                self.branch_if(taken, ops.i16()? as i32, code_len)
            }
            Opcode::IfAcmpeq | Opcode::IfAcmpne => {
                let b = self.thread.pop()?;
                let a = self.thread.pop()?;
                let taken = (a == b) == (opcode == Opcode::IfAcmpeq);
                self.branch_if(taken, ops.i16()? as i32, code_len)
            }
            Opcode::Ifnull | Opcode::Ifnonnull => {
                let reference = self.pop_ref()?;
                let taken = reference.is_null() == (opcode == Opcode::Ifnull);
                self.branch_if(taken, ops.i16()? as i32, code_len)
            }
            Opcode::Goto => self.jump(ops.i16()? as i32, code_len),
            Opcode::GotoW => self.jump(ops.i32_at(1)?, code_len),
            Opcode::Jsr => {
                self.thread.push(pc.offset + 3);
                self.jump(ops.i16()? as i32, code_len)
            }
            Opcode::JsrW => {
                self.thread.push(pc.offset + 5);
                self.jump(ops.i32_at(1)?, code_len)
            }
            Opcode::Ret => self.ret(ops.u8()? as usize, code_len),
            Opcode::Tableswitch => self.tableswitch(&ops, code_len),
            Opcode::Lookupswitch => self.lookupswitch(&ops, code_len),
            Opcode::Wide => self.wide(&ops, code_len),

            // Returns
            Opcode::Ireturn | Opcode::Freturn | Opcode::Areturn => self.return_from(1),
            Opcode::Lreturn | Opcode::Dreturn => self.return_from(2),
            Opcode::Return => self.return_from(0),

            // Fields
            Opcode::Getstatic => self.get_static(pc.class, ops.u16()?),
            Opcode::Putstatic => self.put_static(pc.class, ops.u16()?),
            Opcode::Getfield => self.get_field(pc.class, ops.u16()?),
            Opcode::Putfield => self.put_field(pc.class, ops.u16()?),

            // Calls
            Opcode::Invokevirtual | Opcode::Invokespecial | Opcode::Invokestatic => {
                self.invoke(opcode, pc.class, ops.u16()?, 3)
            }
            Opcode::Invokeinterface => {
                if ops.byte(3)? == 0 {
                    return Err(VerificationError::IllegalOperand {
                        instruction: "invokeinterface",
                        detail: "argument count of zero".to_string(),
                    }
                    .into());
                }
                self.invoke(opcode, pc.class, ops.u16()?, 5)
            }
            Opcode::Invokedynamic => Err(VerificationError::IllegalOperand {
                instruction: "invokedynamic",
                detail: "dynamic call sites are not supported".to_string(),
            }
            .into()),

            // Objects
            Opcode::New => self.new_object(pc.class, ops.u16()?),
            Opcode::Newarray => self.new_primitive_array(ops.u8()?),
            Opcode::Anewarray => self.new_reference_array(pc.class, ops.u16()?),
            Opcode::Multianewarray => {
                self.new_multi_array(pc.class, ops.u16()?, ops.byte(3)? as usize)
            }
            Opcode::Arraylength => self.array_length(),
            Opcode::Athrow => self.athrow(),
            Opcode::Checkcast => self.checkcast(pc.class, ops.u16()?),
            Opcode::Instanceof => self.instance_of(pc.class, ops.u16()?),
            Opcode::Monitorenter => self.monitor_enter(),
            Opcode::Monitorexit => self.monitor_exit(),

            Opcode::Breakpoint | Opcode::Impdep1 | Opcode::Impdep2 => {
                Err(VerificationError::IllegalOpcode {
                    opcode: byte,
                    offset: pc.offset,
                }
                .into())
            }
        }
    }

    // Stack helpers

    pub(crate) fn pop_int(&mut self) -> Result<i32, Fault> {
        Ok(self.thread.pop()? as i32)
    }

    pub(crate) fn pop_long(&mut self) -> Result<i64, Fault> {
        let low = self.thread.pop()?;
        let high = self.thread.pop()?;
        Ok(join_long(high, low))
    }

    fn pop_float(&mut self) -> Result<f32, Fault> {
        Ok(word_to_float(self.thread.pop()?))
    }

    fn pop_double(&mut self) -> Result<f64, Fault> {
        let low = self.thread.pop()?;
        let high = self.thread.pop()?;
        Ok(join_double(high, low))
    }

    pub(crate) fn pop_ref(&mut self) -> Result<ObjectRef, Fault> {
        Ok(ObjectRef::from_word(self.thread.pop()?))
    }

    /// Push `words` and advance by `length`
    pub(crate) fn push_then(&mut self, words: &[Word], length: u32) -> Step {
        self.thread.push_all(words);
        Ok(Flow::Advance(length))
    }

    /// Pop `n` words and push them back in the order `pattern` names
    fn shuffle(&mut self, n: usize, pattern: &[usize]) -> Step {
        let words = self.thread.pop_n(n)?;
        for &index in pattern {
            self.thread.push(words[index]);
        }
        Ok(Flow::Advance(1))
    }

    fn load(&mut self, index: usize, words: usize, length: u32) -> Step {
        let value: ArrayVec<Word, 2> = self
            .thread
            .load_local(index, words)?
            .iter()
            .copied()
            .collect();
        self.push_then(&value, length)
    }

    fn store(&mut self, index: usize, words: usize, length: u32) -> Step {
        let value = self.thread.pop_n(words)?;
        self.thread.store_local(index, &value)?;
        Ok(Flow::Advance(length))
    }

    fn increment(&mut self, index: usize, delta: i32) -> Result<(), Fault> {
        let current = self.thread.load_local(index, 1)?[0] as i32;
        self.thread
            .store_local(index, &[current.wrapping_add(delta) as Word])?;
        Ok(())
    }

    // Arithmetic helpers

    fn int_binary(&mut self, op: impl Fn(i32, i32) -> i32) -> Step {
        let b = self.pop_int()?;
        let a = self.pop_int()?;
        self.push_then(&[op(a, b) as Word], 1)
    }

    fn int_divide(&mut self, op: fn(i32, i32) -> i32) -> Step {
        let b = self.pop_int()?;
        let a = self.pop_int()?;
        if b == 0 {
            return Err(Fault::Throw(ExceptionKind::Arithmetic));
        }
        self.push_then(&[op(a, b) as Word], 1)
    }

    fn long_binary(&mut self, op: impl Fn(i64, i64) -> i64) -> Step {
        let b = self.pop_long()?;
        let a = self.pop_long()?;
        self.push_then(&split_long(op(a, b)), 1)
    }

    fn long_divide(&mut self, op: fn(i64, i64) -> i64) -> Step {
        let b = self.pop_long()?;
        let a = self.pop_long()?;
        if b == 0 {
            return Err(Fault::Throw(ExceptionKind::Arithmetic));
        }
        self.push_then(&split_long(op(a, b)), 1)
    }

    fn long_shift(&mut self, op: impl Fn(i64, u32) -> i64) -> Step {
        let distance = self.pop_int()?;
        let value = self.pop_long()?;
        self.push_then(&split_long(op(value, convert::long_shift(distance))), 1)
    }

    fn float_binary(&mut self, op: impl Fn(f32, f32) -> f32) -> Step {
        let b = self.pop_float()?;
        let a = self.pop_float()?;
        self.push_then(&[float_to_word(op(a, b))], 1)
    }

    fn double_binary(&mut self, op: impl Fn(f64, f64) -> f64) -> Step {
        let b = self.pop_double()?;
        let a = self.pop_double()?;
        self.push_then(&split_double(op(a, b)), 1)
    }

    // Control transfer

    /// Move the program counter by `delta` relative to the current instruction
    fn jump(&mut self, delta: i32, code_len: usize) -> Step {
        let frame = self
            .thread
            .frame_mut()
            .ok_or(VerificationError::StackUnderflow)?;
        let target = frame.pc.offset as i64 + delta as i64;
        if target < 0 || target as usize >= code_len {
            return Err(VerificationError::CodeOverrun(target.max(0) as u32).into());
        }
        frame.pc.offset = target as u32;
        Ok(Flow::Transferred)
    }

    fn branch_if(&mut self, taken: bool, delta: i32, code_len: usize) -> Step {
        if taken {
            self.jump(delta, code_len)
        } else {
            Ok(Flow::Advance(3))
        }
    }

    fn ret(&mut self, index: usize, code_len: usize) -> Step {
        let target = self.thread.load_local(index, 1)?[0];
        if target as usize >= code_len {
            return Err(VerificationError::CodeOverrun(target).into());
        }
        let frame = self
            .thread
            .frame_mut()
            .ok_or(VerificationError::StackUnderflow)?;
        frame.pc.offset = target;
        Ok(Flow::Transferred)
    }

    fn tableswitch(&mut self, ops: &Operands<'_>, code_len: usize) -> Step {
        let base = ops.switch_base();
        let default = ops.i32_at(base)?;
        let low = ops.i32_at(base + 4)?;
        let high = ops.i32_at(base + 8)?;
        if low > high {
            return Err(VerificationError::IllegalOperand {
                instruction: "tableswitch",
                detail: format!("low {} above high {}", low, high),
            }
            .into());
        }
        let index = self.pop_int()?;
        let delta = if index < low || index > high {
            default
        } else {
            ops.i32_at(base + 12 + (index as i64 - low as i64) as usize * 4)?
        };
        self.jump(delta, code_len)
    }

    fn lookupswitch(&mut self, ops: &Operands<'_>, code_len: usize) -> Step {
        let base = ops.switch_base();
        let default = ops.i32_at(base)?;
        let pairs = ops.i32_at(base + 4)?;
        if pairs < 0 {
            return Err(VerificationError::IllegalOperand {
                instruction: "lookupswitch",
                detail: format!("negative pair count {}", pairs),
            }
            .into());
        }
        let key = self.pop_int()?;
        let mut delta = default;
        for pair in 0..pairs as usize {
            let at = base + 8 + pair * 8;
            if ops.i32_at(at)? == key {
                delta = ops.i32_at(at + 4)?;
                break;
            }
        }
        self.jump(delta, code_len)
    }

    /// `wide` prefix: 16-bit local index, and a 16-bit increment for `iinc`
    fn wide(&mut self, ops: &Operands<'_>, code_len: usize) -> Step {
        let inner = ops.byte(1)?;
        let opcode = Opcode::try_from(inner).map_err(|opcode| VerificationError::IllegalOpcode {
            opcode,
            offset: ops.at as u32 + 1,
        })?;
        let index = ops.u16_at(2)? as usize;
        match opcode {
            Opcode::Iload | Opcode::Fload | Opcode::Aload => self.load(index, 1, 4),
            Opcode::Lload | Opcode::Dload => self.load(index, 2, 4),
            Opcode::Istore | Opcode::Fstore | Opcode::Astore => self.store(index, 1, 4),
            Opcode::Lstore | Opcode::Dstore => self.store(index, 2, 4),
            Opcode::Ret => self.ret(index, code_len),
            Opcode::Iinc => {
                let delta = ops.u16_at(4)? as i16 as i32;
                self.increment(index, delta)?;
                Ok(Flow::Advance(6))
            }
            other => Err(VerificationError::IllegalOperand {
                instruction: "wide",
                detail: format!("cannot widen {}", other.mnemonic()),
            }
            .into()),
        }
    }
}
