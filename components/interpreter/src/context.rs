//! Per-thread execution context

use core_types::{ExceptionKind, ObjectRef, ThreadId, VerificationError, Word};

use crate::call_frame::CallFrame;

/// Scheduling state of a thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Runnable
    Running,
    /// Waiting for the monitor of this object
    Blocked(ObjectRef),
    /// Call stack emptied, normally or by an uncaught condition
    Finished,
}

/// Exception being materialized; doubles as the double-fault guard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingException {
    /// Condition being raised
    pub kind: ExceptionKind,
    /// Class whose code raised it
    pub origin: String,
}

/// Execution state of one VM-level thread
///
/// All frames share one word vector: each frame's locals are followed by its
/// operand stack, and the stack pointer is the vector's length.
#[derive(Debug, Clone)]
pub struct ThreadContext {
    /// Monitor-owner identity
    pub id: ThreadId,
    /// Locals and operand stacks of every frame
    pub stack: Vec<Word>,
    /// Active frames, innermost last
    pub frames: Vec<CallFrame>,
    /// Frame count at which the current run completes
    pub boundary: usize,
    /// Scheduling state
    pub state: ThreadState,
    /// Exception currently being raised
    pub pending: Option<PendingException>,
    /// Value returned by the outermost frame
    pub result: Option<Vec<Word>>,
    /// Exception that escaped the outermost frame
    pub uncaught: Option<ObjectRef>,
}

impl ThreadContext {
    /// Create an idle thread
    pub fn new(id: ThreadId) -> Self {
        Self {
            id,
            stack: Vec::with_capacity(256),
            frames: Vec::with_capacity(16),
            boundary: 0,
            state: ThreadState::Running,
            pending: None,
            result: None,
            uncaught: None,
        }
    }

    /// Whether the thread can execute
    pub fn is_running(&self) -> bool {
        self.state == ThreadState::Running
    }

    /// Whether the thread has completed
    pub fn is_finished(&self) -> bool {
        self.state == ThreadState::Finished
    }

    /// Current frame
    pub fn frame(&self) -> Option<&CallFrame> {
        self.frames.last()
    }

    /// Current frame, mutably
    pub fn frame_mut(&mut self) -> Option<&mut CallFrame> {
        self.frames.last_mut()
    }

    /// Number of active frames
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Push one word
    pub fn push(&mut self, word: Word) {
        self.stack.push(word);
    }

    /// Push a group of words
    pub fn push_all(&mut self, words: &[Word]) {
        self.stack.extend_from_slice(words);
    }

    fn operand_base(&self) -> usize {
        self.frames.last().map_or(0, |f| f.operand_base)
    }

    /// Pop one word from the current operand stack
    pub fn pop(&mut self) -> Result<Word, VerificationError> {
        if self.stack.len() <= self.operand_base() {
            return Err(VerificationError::StackUnderflow);
        }
        self.stack.pop().ok_or(VerificationError::StackUnderflow)
    }

    /// Pop `n` words, returned in push order
    pub fn pop_n(&mut self, n: usize) -> Result<Vec<Word>, VerificationError> {
        let len = self.stack.len();
        if len < self.operand_base() + n {
            return Err(VerificationError::StackUnderflow);
        }
        Ok(self.stack.split_off(len - n))
    }

    /// Word `depth` slots below the top, without popping
    pub fn peek(&self, depth: usize) -> Result<Word, VerificationError> {
        let len = self.stack.len();
        if len < self.operand_base() + depth + 1 {
            return Err(VerificationError::StackUnderflow);
        }
        Ok(self.stack[len - depth - 1])
    }

    /// Words on the current operand stack
    pub fn operand_depth(&self) -> usize {
        self.stack.len().saturating_sub(self.operand_base())
    }

    /// Read `n` local words starting at `index`
    pub fn load_local(&self, index: usize, n: usize) -> Result<&[Word], VerificationError> {
        let frame = self.frames.last().ok_or(VerificationError::StackUnderflow)?;
        if index + n > frame.max_locals() {
            return Err(VerificationError::BadLocal(index));
        }
        let start = frame.locals_base + index;
        Ok(&self.stack[start..start + n])
    }

    /// Overwrite local words starting at `index`
    pub fn store_local(&mut self, index: usize, words: &[Word]) -> Result<(), VerificationError> {
        let frame = self.frames.last().ok_or(VerificationError::StackUnderflow)?;
        if index + words.len() > frame.max_locals() {
            return Err(VerificationError::BadLocal(index));
        }
        let start = frame.locals_base + index;
        self.stack[start..start + words.len()].copy_from_slice(words);
        Ok(())
    }

    /// Drop every frame and all stack storage
    pub fn clear(&mut self) {
        self.frames.clear();
        self.stack.clear();
        self.boundary = 0;
    }
}
