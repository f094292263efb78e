//! Exception materialization and handler search

use std::sync::Arc;

use core_types::{ExceptionKind, ObjectRef, VmError, VmResult};
use linker::is_a;
use memory_manager::{ClassId, ObjectError};
use tracing::{error, trace};

use crate::context::PendingException;
use crate::dispatch::Dispatcher;

impl Dispatcher<'_> {
    /// Create the exception object for a VM-raised condition
    ///
    /// The object is allocated without running a constructor. Out-of-memory
    /// reuses the object preallocated at bootstrap. A failure while an
    /// earlier condition is still being materialized is a double fault and
    /// halts the VM.
    pub(crate) fn materialize(&mut self, kind: ExceptionKind) -> VmResult<ObjectRef> {
        if kind == ExceptionKind::OutOfMemory && !self.rt.oom_error.is_null() {
            return Ok(self.rt.oom_error);
        }
        if let Some(pending) = &self.thread.pending {
            let err = VmError::DoubleFault {
                raising: kind.class_name().to_string(),
                cause: format!(
                    "raised while materializing {} from {}",
                    pending.kind.class_name(),
                    pending.origin
                ),
            };
            return Err(self.halt(err));
        }

        let origin = self
            .thread
            .frame()
            .and_then(|frame| self.rt.classes.name(frame.pc.class))
            .unwrap_or("<none>")
            .to_string();
        self.thread.pending = Some(PendingException { kind, origin });
        let created = self.instantiate_exception(kind);
        self.thread.pending = None;

        match created {
            Ok(object) => Ok(object),
            Err(ObjectError::Alloc(_)) if !self.rt.oom_error.is_null() => Ok(self.rt.oom_error),
            Err(err) => Err(self.halt(VmError::DoubleFault {
                raising: kind.class_name().to_string(),
                cause: err.to_string(),
            })),
        }
    }

    fn instantiate_exception(&mut self, kind: ExceptionKind) -> Result<ObjectRef, ObjectError> {
        let class = self.rt.exception_class(kind)?;
        self.rt.objects.instantiate(&self.rt.classes, class)
    }

    fn halt(&mut self, err: VmError) -> VmError {
        error!(thread = self.thread.id.0, error = %err, "halting virtual machine");
        self.rt.halted = true;
        err
    }

    /// Transfer control to the innermost handler for `exception`
    ///
    /// Frames without a matching handler are popped, releasing their
    /// monitors. Returns the exception when no frame above the thread's
    /// boundary handles it.
    pub(crate) fn unwind(&mut self, exception: ObjectRef) -> VmResult<Option<ObjectRef>> {
        let thrown = self
            .rt
            .objects
            .class_of(exception)
            .ok_or(VmError::InvalidReference)?;
        while self.thread.depth() > self.thread.boundary {
            if let Some(handler) = self.find_handler(thrown)? {
                let frame = self
                    .thread
                    .frames
                    .last_mut()
                    .ok_or(VmError::InvalidReference)?;
                frame.pc.offset = handler;
                frame.call_length = 0;
                let operand_base = frame.operand_base;
                self.thread.stack.truncate(operand_base);
                self.thread.push(exception.to_word());
                trace!(handler, "exception caught");
                return Ok(None);
            }
            self.pop_frame();
        }
        Ok(Some(exception))
    }

    /// Handler offset in the current frame for an exception of class
    /// `thrown` raised at the frame's current instruction
    fn find_handler(&mut self, thrown: ClassId) -> VmResult<Option<u32>> {
        let Some(frame) = self.thread.frame() else {
            return Ok(None);
        };
        let pc = frame.pc;
        let descriptor = Arc::clone(&frame.descriptor);
        let Some(code) = descriptor
            .method(pc.method)
            .and_then(|method| method.code_at(pc.code_attr))
        else {
            return Ok(None);
        };
        for entry in &code.exception_table {
            if !entry.covers(pc.offset) {
                continue;
            }
            if entry.catches_any() {
                return Ok(Some(entry.handler_pc as u32));
            }
            let catch = self.rt.resolve_class(pc.class, entry.catch_type)?;
            if is_a(&self.rt.classes, thrown, catch) {
                return Ok(Some(entry.handler_pc as u32));
            }
        }
        Ok(None)
    }
}
