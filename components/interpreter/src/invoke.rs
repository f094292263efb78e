//! Method invocation, frames and class initialization.
//!
//! A call leaves the caller's program counter on the invoke instruction and
//! records the instruction length in [`CallFrame::call_length`]; the return
//! path adds it. Exceptions raised by the call are therefore matched against
//! the invoke instruction's own offset.

use std::sync::Arc;

use bytecode_system::Opcode;
use core_types::{ExceptionKind, ObjectRef, VerificationError, VmError, VmResult, Word};
use linker::{
    class_has_member, classify_method, implements_interface, is_a, member_is_accessible_to,
    MemberKind,
};
use memory_manager::{ClassId, ClassStatus, MethodBody, ResolvedMethod};
use tracing::{debug, trace};

use crate::call_frame::{CallFrame, ProgramCounter};
use crate::context::ThreadState;
use crate::dispatch::{Dispatcher, Fault, Flow, RunOutcome, Step};
use crate::native::NativeEnv;

/// Result of a run-to-completion call: returned words or escaped exception
pub(crate) type NestedResult = Result<Vec<Word>, ObjectRef>;

impl Dispatcher<'_> {
    /// `invokevirtual`, `invokespecial`, `invokestatic`, `invokeinterface`
    pub(crate) fn invoke(
        &mut self,
        opcode: Opcode,
        caller: ClassId,
        index: u16,
        length: u32,
    ) -> Step {
        let resolved = self.rt.resolve_method(caller, index)?;
        let is_static_call = opcode == Opcode::Invokestatic;
        if resolved.is_static != is_static_call {
            return Err(Fault::Throw(ExceptionKind::IncompatibleClassChange));
        }
        if resolved.access.is_protected()
            && resolved.owner != caller
            && !member_is_accessible_to(&self.rt.classes, resolved.owner, resolved.access, caller)
        {
            return Err(Fault::Throw(ExceptionKind::IllegalAccess));
        }

        let total = resolved.arg_words + usize::from(!is_static_call);
        let receiver = if is_static_call {
            ObjectRef::NULL
        } else {
            let receiver = ObjectRef::from_word(self.thread.peek(resolved.arg_words)?);
            if receiver.is_null() {
                return Err(Fault::Throw(ExceptionKind::NullPointer));
            }
            receiver
        };

        let target = match opcode {
            Opcode::Invokestatic => {
                self.initialize(resolved.owner)?;
                resolved
            }
            Opcode::Invokespecial => self.select_special(caller, resolved)?,
            Opcode::Invokeinterface => {
                let receiver_class = self.class_of(receiver)?;
                let owner_is_interface = self
                    .rt
                    .classes
                    .get(resolved.owner)
                    .is_some_and(|entry| entry.is_interface());
                if owner_is_interface
                    && !implements_interface(&self.rt.classes, receiver_class, resolved.owner)
                {
                    return Err(Fault::Throw(ExceptionKind::IncompatibleClassChange));
                }
                self.select_virtual(caller, index, receiver_class, resolved)?
            }
            _ => {
                let receiver_class = self.class_of(receiver)?;
                self.select_virtual(caller, index, receiver_class, resolved)?
            }
        };
        self.call(target, receiver, total, length)
    }

    pub(crate) fn class_of(&self, object: ObjectRef) -> Result<ClassId, Fault> {
        Ok(self
            .rt
            .objects
            .class_of(object)
            .ok_or(VmError::InvalidReference)?)
    }

    fn method_name(&self, method: &ResolvedMethod) -> VmResult<(String, String)> {
        let info = self
            .rt
            .classes
            .descriptor(method.owner)
            .and_then(|descriptor| descriptor.method(method.method_index))
            .ok_or(VmError::InvalidClass(method.owner.index()))?;
        Ok((info.name.clone(), info.descriptor.clone()))
    }

    /// Override of `resolved` selected by the receiver's run-time class
    ///
    /// Private methods bind statically. Other targets go through the call
    /// site's inline cache.
    fn select_virtual(
        &mut self,
        caller: ClassId,
        index: u16,
        receiver_class: ClassId,
        resolved: ResolvedMethod,
    ) -> Result<ResolvedMethod, Fault> {
        if resolved.access.is_private() {
            return Ok(resolved);
        }
        let site = (caller, index);
        if let Some(hit) = self
            .rt
            .inline_caches
            .get(&site)
            .and_then(|cache| cache.lookup(receiver_class))
        {
            return Ok(hit);
        }
        let target = self.lookup_override(receiver_class, &resolved)?;
        self.rt
            .inline_caches
            .entry(site)
            .or_default()
            .update(receiver_class, target);
        Ok(target)
    }

    /// Most specific declaration of `resolved`'s name and descriptor seen
    /// from `start`
    pub(crate) fn lookup_override(
        &self,
        start: ClassId,
        resolved: &ResolvedMethod,
    ) -> Result<ResolvedMethod, Fault> {
        let (name, descriptor) = self.method_name(resolved)?;
        let Some(member) = class_has_member(
            &self.rt.classes,
            start,
            &name,
            &descriptor,
            MemberKind::Method,
            None,
        ) else {
            return Err(Fault::Throw(ExceptionKind::AbstractMethod));
        };
        if member.owner == resolved.owner && member.index == resolved.method_index {
            return Ok(*resolved);
        }
        Ok(classify_method(
            &self.rt.classes,
            &self.rt.natives,
            member.owner,
            member.index,
            self.rt.config.link_hidden_natives,
        )?)
    }

    /// `invokespecial` target
    ///
    /// A non-constructor method of a superclass of the calling class is
    /// looked up again starting at the caller's direct superclass when the
    /// caller carries the super flag.
    fn select_special(
        &mut self,
        caller: ClassId,
        resolved: ResolvedMethod,
    ) -> Result<ResolvedMethod, Fault> {
        let (name, _) = self.method_name(&resolved)?;
        let caller_is_super = self
            .rt
            .classes
            .get(caller)
            .is_some_and(|entry| entry.descriptor.access.is_super());
        if name == "<init>"
            || resolved.owner == caller
            || !caller_is_super
            || !is_a(&self.rt.classes, caller, resolved.owner)
        {
            return Ok(resolved);
        }
        match self.rt.classes.super_class(caller) {
            Some(parent) => self.lookup_override(parent, &resolved),
            None => Ok(resolved),
        }
    }

    /// Object whose monitor a synchronized call acquires
    fn call_monitor(
        &mut self,
        target: &ResolvedMethod,
        receiver: ObjectRef,
    ) -> Result<ObjectRef, Fault> {
        if !target.is_synchronized() {
            return Ok(ObjectRef::NULL);
        }
        if target.is_static {
            Ok(self.rt.class_object(target.owner)?)
        } else {
            Ok(receiver)
        }
    }

    /// Acquire `object`'s monitor; `false` on contention, with the thread
    /// marked blocked
    pub(crate) fn acquire(&mut self, object: ObjectRef) -> Result<bool, Fault> {
        let id = self.thread.id;
        let entered = self.rt.objects.object_mut(object)?.monitor.enter(id);
        if !entered {
            trace!(thread = id.0, object = ?object, "monitor contended");
            self.thread.state = ThreadState::Blocked(object);
        }
        Ok(entered)
    }

    fn release(&mut self, object: ObjectRef) {
        let id = self.thread.id;
        if let Some(link) = self.rt.objects.get_mut(object) {
            link.monitor.exit(id);
        }
    }

    /// Transfer control to `target` with `total` argument words on the stack
    fn call(
        &mut self,
        target: ResolvedMethod,
        receiver: ObjectRef,
        total: usize,
        length: u32,
    ) -> Step {
        match target.body {
            MethodBody::Abstract => Err(Fault::Throw(ExceptionKind::AbstractMethod)),
            MethodBody::Native(None) => Err(Fault::Throw(ExceptionKind::UnsatisfiedLink)),
            MethodBody::Native(Some(ordinal)) => {
                let monitor = self.call_monitor(&target, receiver)?;
                if !monitor.is_null() && !self.acquire(monitor)? {
                    return Ok(Flow::Blocked);
                }
                let args = self.thread.pop_n(total)?;
                let rt = &mut *self.rt;
                let mut env = NativeEnv {
                    classes: &mut rt.classes,
                    objects: &mut rt.objects,
                    thread: self.thread.id,
                };
                let outcome = rt.natives.invoke(ordinal, &mut env, &args);
                if !monitor.is_null() {
                    self.release(monitor);
                }
                match outcome {
                    None => Err(Fault::Throw(ExceptionKind::UnsatisfiedLink)),
                    Some(Err(kind)) => Err(Fault::Throw(kind)),
                    Some(Ok(words)) => {
                        if words.len() != target.return_type.word_count() {
                            return Err(VerificationError::IllegalOperand {
                                instruction: "native return",
                                detail: format!(
                                    "{} words for a {:?} result",
                                    words.len(),
                                    target.return_type
                                ),
                            }
                            .into());
                        }
                        self.push_then(&words, length)
                    }
                }
            }
            MethodBody::Code(code_attr) => {
                let monitor = self.call_monitor(&target, receiver)?;
                if !monitor.is_null() && !self.acquire(monitor)? {
                    return Ok(Flow::Blocked);
                }
                if let Some(caller) = self.thread.frame_mut() {
                    caller.call_length = length;
                }
                if let Err(fault) = self.push_frame(&target, code_attr, total, monitor) {
                    if !monitor.is_null() {
                        self.release(monitor);
                    }
                    return Err(fault);
                }
                Ok(Flow::Transferred)
            }
        }
    }

    /// Push a frame for `target` whose `total` argument words are on top of
    /// the stack and become its first locals
    pub(crate) fn push_frame(
        &mut self,
        target: &ResolvedMethod,
        code_attr: u16,
        total: usize,
        monitor: ObjectRef,
    ) -> Result<(), Fault> {
        let descriptor = Arc::clone(
            self.rt
                .classes
                .descriptor(target.owner)
                .ok_or(VmError::InvalidClass(target.owner.index()))?,
        );
        let code = descriptor
            .method(target.method_index)
            .and_then(|method| method.code_at(code_attr))
            .ok_or(VmError::InvalidClass(target.owner.index()))?;
        let max_locals = code.max_locals as usize;
        let max_stack = code.max_stack as usize;
        if max_locals < total {
            return Err(VerificationError::IllegalOperand {
                instruction: "invoke",
                detail: format!("{} argument words exceed {} locals", total, max_locals),
            }
            .into());
        }
        if self.thread.operand_depth() < total {
            return Err(VerificationError::StackUnderflow.into());
        }
        let locals_base = self.thread.stack.len() - total;
        if self.thread.depth() >= self.rt.config.max_frames
            || locals_base + max_locals + max_stack > self.rt.config.max_stack_words
        {
            return Err(Fault::Throw(ExceptionKind::StackOverflow));
        }

        self.thread.stack.resize(locals_base + max_locals, 0);
        let pc = ProgramCounter {
            class: target.owner,
            method: target.method_index,
            code_attr,
            exceptions_attr: target.exceptions_attr,
            offset: 0,
        };
        let mut frame = CallFrame::new(pc, descriptor, locals_base, max_locals, max_stack);
        frame.monitor = monitor;
        self.thread.frames.push(frame);
        trace!(depth = self.thread.depth(), class = target.owner.index(), "frame pushed");
        Ok(())
    }

    /// Pop the current frame, releasing its monitor and storage
    pub(crate) fn pop_frame(&mut self) -> Option<CallFrame> {
        let frame = self.thread.frames.pop()?;
        if frame.holds_monitor() {
            self.release(frame.monitor);
        }
        self.thread.stack.truncate(frame.locals_base);
        Some(frame)
    }

    /// Return `words` result words to the caller
    pub(crate) fn return_from(&mut self, words: usize) -> Step {
        let value = self.thread.pop_n(words)?;
        self.pop_frame().ok_or(VerificationError::StackUnderflow)?;
        if self.thread.depth() <= self.thread.boundary {
            self.thread.result = Some(value);
            return Ok(Flow::Finished);
        }
        self.thread.push_all(&value);
        if let Some(caller) = self.thread.frame_mut() {
            caller.pc.offset += caller.call_length;
            caller.call_length = 0;
        }
        Ok(Flow::Transferred)
    }

    /// Run `target` to completion above the current frames
    ///
    /// `args` are the argument words, receiver first. Monitor contention
    /// inside the nested run cannot be waited out and is fatal.
    pub(crate) fn run_nested(
        &mut self,
        target: &ResolvedMethod,
        args: &[Word],
    ) -> VmResult<NestedResult> {
        let MethodBody::Code(code_attr) = target.body else {
            return Err(VerificationError::IllegalOperand {
                instruction: "call",
                detail: "nested calls need a bytecode method".to_string(),
            }
            .into());
        };
        let saved_boundary = self.thread.boundary;
        let base_depth = self.thread.depth();
        let base_len = self.thread.stack.len();
        self.thread.boundary = base_depth;
        self.thread.push_all(args);

        let outcome = match self.push_frame(target, code_attr, args.len(), ObjectRef::NULL) {
            Ok(()) => self.run(None),
            Err(Fault::Fatal(err)) => Err(err),
            Err(Fault::Throw(kind)) => self.materialize(kind).map(RunOutcome::Threw),
            Err(Fault::ThrowObject(object)) => Ok(RunOutcome::Threw(object)),
        };

        while self.thread.depth() > base_depth {
            self.pop_frame();
        }
        self.thread.stack.truncate(base_len);
        self.thread.boundary = saved_boundary;

        match outcome? {
            RunOutcome::Returned(words) => Ok(Ok(words)),
            RunOutcome::Threw(exception) => Ok(Err(exception)),
            RunOutcome::Blocked | RunOutcome::Yielded => {
                self.thread.state = ThreadState::Running;
                Err(VmError::BlockedInNestedCall)
            }
        }
    }

    /// Run static initializers of `class` and its superclasses, once
    ///
    /// The class counts as initialized from the moment its initialization
    /// starts, so recursive requests return immediately.
    pub(crate) fn initialize(&mut self, class: ClassId) -> Result<(), Fault> {
        let entry = self.rt.classes.entry_mut(class)?;
        if entry.status.is_initialized() {
            return Ok(());
        }
        entry.status.insert(ClassStatus::INITIALIZED);
        let descriptor = Arc::clone(&entry.descriptor);

        if let Some(parent) = descriptor.super_name.as_deref() {
            let parent = self.rt.require_class(parent)?;
            self.initialize(parent)?;
        }
        let Some(index) = descriptor.find_method("<clinit>", "()V") else {
            return Ok(());
        };
        debug!(class = %descriptor.name, "running static initializer");
        let target = classify_method(
            &self.rt.classes,
            &self.rt.natives,
            class,
            index,
            self.rt.config.link_hidden_natives,
        )?;
        match self.run_nested(&target, &[])? {
            Ok(_) => Ok(()),
            Err(exception) => Err(Fault::ThrowObject(exception)),
        }
    }
}
