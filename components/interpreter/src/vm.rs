//! Virtual machine entry points
//!
//! [`VM`] owns the shared runtime and every thread. The embedding scheduler
//! drives threads with [`VM::run_slice`]; each call is a top-level recovery
//! point that turns fatal conditions into a [`SliceOutcome`].

use bytecode_system::ClassDescriptor;
use core_types::{
    ExceptionKind, ObjectRef, ResolutionError, ThreadId, VerificationError, VmConfig, VmError,
    VmResult, Word,
};
use linker::{class_has_member, classify_method, Linker, MemberKind};
use memory_manager::{
    ArrayComponent, ClassId, ClassTable, MethodBody, ObjectError, ObjectTable, RefCounts,
    RefNode, ReferenceTracker, ResolvedMethod,
};
use tracing::{debug, error, info, warn};

use crate::context::{ThreadContext, ThreadState};
use crate::core_classes::core_classes;
use crate::dispatch::{Dispatcher, Fault, RunOutcome};
use crate::loader::{ClassLoader, MapLoader};
use crate::native::NativeRegistry;
use crate::runtime::Runtime;

/// Result of running one thread for a slice
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SliceOutcome {
    /// Quota used up or waiting on a monitor; schedule again
    StillRunning,
    /// The thread's outermost frame returned
    Finished,
    /// The thread was terminated
    Fatal(VmError),
}

/// Virtual machine for executing class-file bytecode
///
/// The VM manages:
/// - The class table, object table and reference counts
/// - The class loader and native registry
/// - VM-level threads, each with its own frames and operand stacks
///
/// # Example
///
/// ```
/// use bytecode_system::{AccessFlags, ClassBuilder, CodeBuilder, Opcode};
/// use core_types::VmConfig;
/// use interpreter::{SliceOutcome, VM};
///
/// let mut vm = VM::with_core_classes(VmConfig::default()).unwrap();
///
/// let mut main = ClassBuilder::new("Main");
/// let mut code = CodeBuilder::new(2, 0);
/// code.iconst(40).iconst(2).op(Opcode::Iadd).op(Opcode::Ireturn);
/// main.method(AccessFlags::PUBLIC | AccessFlags::STATIC, "answer", "()I", code.build());
/// let main = vm.define_class(main.build()).unwrap();
///
/// let thread = vm.spawn(main, "answer", "()I", &[]).unwrap();
/// assert_eq!(vm.run_slice(thread), SliceOutcome::Finished);
/// assert_eq!(vm.thread_result(thread), Some(&[42][..]));
/// ```
#[derive(Debug)]
pub struct VM {
    runtime: Runtime,
    threads: Vec<ThreadContext>,
}

impl VM {
    /// Create an empty VM with an empty in-memory loader
    ///
    /// No classes are defined; call [`bootstrap`](Self::bootstrap) or use
    /// [`with_core_classes`](Self::with_core_classes) before running code
    /// that needs the core library.
    pub fn new(config: VmConfig) -> Self {
        Self::with_loader(config, MapLoader::new())
    }

    /// Create an empty VM that loads missing classes from `loader`
    pub fn with_loader(config: VmConfig, loader: impl ClassLoader + 'static) -> Self {
        Self {
            runtime: Runtime::new(config, Box::new(loader)),
            threads: Vec::new(),
        }
    }

    /// Create a VM with the core classes and natives in place
    pub fn with_core_classes(config: VmConfig) -> VmResult<Self> {
        let mut vm = Self::new(config);
        vm.bootstrap()?;
        Ok(vm)
    }

    /// Define the core classes, register their natives and preallocate the
    /// out-of-memory error
    ///
    /// Core classes that are already defined are kept.
    pub fn bootstrap(&mut self) -> VmResult<()> {
        self.runtime.natives.register_core_natives();
        for descriptor in core_classes() {
            if self.runtime.classes.find(&descriptor.name).is_none() {
                self.runtime.define_class(descriptor)?;
            }
        }
        if self.runtime.oom_error.is_null() {
            let class = self.runtime.exception_class(ExceptionKind::OutOfMemory)?;
            self.runtime.oom_error = self
                .runtime
                .objects
                .instantiate(&self.runtime.classes, class)
                .map_err(|err| match err {
                    ObjectError::Vm(err) => err,
                    ObjectError::Alloc(alloc) => VmError::DoubleFault {
                        raising: "java/lang/OutOfMemoryError".to_string(),
                        cause: alloc.to_string(),
                    },
                })?;
        }
        debug!(classes = self.runtime.classes.len(), "bootstrap complete");
        Ok(())
    }

    /// Replace the class loader
    pub fn set_loader(&mut self, loader: impl ClassLoader + 'static) {
        self.runtime.loader = Box::new(loader);
    }

    /// Runtime configuration
    pub fn config(&self) -> &VmConfig {
        &self.runtime.config
    }

    /// The class table
    pub fn classes(&self) -> &ClassTable {
        &self.runtime.classes
    }

    /// The object table
    pub fn objects(&self) -> &ObjectTable {
        &self.runtime.objects
    }

    /// Reference counts between classes and objects
    pub fn refs(&self) -> &RefCounts {
        &self.runtime.refs
    }

    /// The native registry, for registering implementations
    pub fn natives_mut(&mut self) -> &mut NativeRegistry {
        &mut self.runtime.natives
    }

    /// Whether a double fault stopped the VM
    pub fn is_halted(&self) -> bool {
        self.runtime.halted
    }

    /// Add a class to the class table
    pub fn define_class(&mut self, descriptor: ClassDescriptor) -> VmResult<ClassId> {
        let name = descriptor.name.clone();
        let id = self.runtime.define_class(descriptor)?;
        debug!(class = %name, id = id.index(), "class defined");
        Ok(id)
    }

    /// Find a class by name, asking the loader when it is missing
    pub fn load_class(&mut self, name: &str) -> VmResult<ClassId> {
        self.runtime.require_class(name)
    }

    /// Link every constant-pool reference of `class`
    ///
    /// Returns `false` while some referenced class is not loaded yet.
    pub fn resolve(&mut self, class: ClassId) -> VmResult<bool> {
        let linked = self.runtime.link(class)?;
        debug!(class = class.index(), linked, "resolve");
        Ok(linked)
    }

    /// The interned string object for `text`
    pub fn new_string(&mut self, text: &str) -> VmResult<ObjectRef> {
        self.runtime
            .objects
            .intern_string(&self.runtime.classes, text)
            .map_err(|err| match err {
                ObjectError::Vm(err) => err,
                ObjectError::Alloc(alloc) => VmError::UnhandledException {
                    class_name: format!("java/lang/OutOfMemoryError ({})", alloc),
                },
            })
    }

    /// Method `name`/`descriptor` as seen from `class`
    fn find_method(
        &self,
        class: ClassId,
        name: &str,
        descriptor: &str,
    ) -> VmResult<ResolvedMethod> {
        let classes = &self.runtime.classes;
        let member = class_has_member(classes, class, name, descriptor, MemberKind::Method, None)
            .ok_or_else(|| ResolutionError::NoSuchMethod {
                class: classes.name(class).unwrap_or("?").to_string(),
                name: name.to_string(),
                descriptor: descriptor.to_string(),
            })?;
        classify_method(
            classes,
            &self.runtime.natives,
            member.owner,
            member.index,
            self.runtime.config.link_hidden_natives,
        )
    }

    fn thread_mut(&mut self, thread: ThreadId) -> VmResult<&mut ThreadContext> {
        self.threads
            .get_mut(thread.0 as usize)
            .ok_or(VmError::InvalidThread(thread.0))
    }

    /// Thread context
    pub fn thread(&self, thread: ThreadId) -> Option<&ThreadContext> {
        self.threads.get(thread.0 as usize)
    }

    /// Words returned by a finished thread's entry method
    pub fn thread_result(&self, thread: ThreadId) -> Option<&[Word]> {
        self.thread(thread)?.result.as_deref()
    }

    /// Every thread id, finished or not
    pub fn threads(&self) -> impl Iterator<Item = ThreadId> + '_ {
        (0..self.threads.len()).map(|index| ThreadId(index as u32))
    }

    /// Create a thread that will run static method `name`/`descriptor` of
    /// `class` with `args`
    ///
    /// The class is initialized first, on the new thread.
    pub fn spawn(
        &mut self,
        class: ClassId,
        name: &str,
        descriptor: &str,
        args: &[Word],
    ) -> VmResult<ThreadId> {
        let method = self.find_method(class, name, descriptor)?;
        if !method.is_static {
            return Err(VerificationError::IllegalOperand {
                instruction: "spawn",
                detail: format!("entry method {}{} is not static", name, descriptor),
            }
            .into());
        }
        let MethodBody::Code(code_attr) = method.body else {
            return Err(VerificationError::IllegalOperand {
                instruction: "spawn",
                detail: format!("entry method {}{} has no bytecode", name, descriptor),
            }
            .into());
        };

        let id = ThreadId(self.threads.len() as u32);
        let mut context = ThreadContext::new(id);
        {
            let mut dispatcher = Dispatcher::new(&mut self.runtime, &mut context);
            dispatcher
                .initialize(method.owner)
                .map_err(|fault| fault_to_error(dispatcher.rt, fault))?;
            dispatcher.thread.push_all(args);
            dispatcher
                .push_frame(&method, code_attr, args.len(), ObjectRef::NULL)
                .map_err(|fault| fault_to_error(dispatcher.rt, fault))?;
        }
        self.threads.push(context);
        debug!(thread = id.0, entry = %format!("{}{}", name, descriptor), "thread spawned");
        Ok(id)
    }

    /// Run `thread` for one slice of at most `time_slice` instructions
    ///
    /// Uncaught exceptions and fatal errors terminate the thread; a double
    /// fault also halts the VM.
    pub fn run_slice(&mut self, thread: ThreadId) -> SliceOutcome {
        if self.runtime.halted {
            return SliceOutcome::Fatal(VmError::Halted);
        }
        let Some(context) = self.threads.get_mut(thread.0 as usize) else {
            return SliceOutcome::Fatal(VmError::InvalidThread(thread.0));
        };
        match context.state {
            ThreadState::Finished => return SliceOutcome::Finished,
            ThreadState::Blocked(object) => {
                let contended = self
                    .runtime
                    .objects
                    .get(object)
                    .is_some_and(|link| link.monitor.held_by_other(context.id));
                if contended {
                    return SliceOutcome::StillRunning;
                }
                context.state = ThreadState::Running;
            }
            ThreadState::Running => {}
        }

        let quota = self.runtime.config.time_slice;
        let mut dispatcher = Dispatcher::new(&mut self.runtime, context);
        let outcome = dispatcher.run(quota);
        match outcome {
            Ok(RunOutcome::Returned(words)) => {
                dispatcher.thread.result = Some(words);
                dispatcher.thread.state = ThreadState::Finished;
                info!(thread = thread.0, "thread finished");
                SliceOutcome::Finished
            }
            Ok(RunOutcome::Yielded) | Ok(RunOutcome::Blocked) => SliceOutcome::StillRunning,
            Ok(RunOutcome::Threw(exception)) => {
                let class_name = exception_name(dispatcher.rt, exception);
                warn!(thread = thread.0, exception = %class_name, "uncaught exception");
                dispatcher.thread.uncaught = Some(exception);
                terminate(&mut dispatcher);
                SliceOutcome::Fatal(VmError::UnhandledException { class_name })
            }
            Err(err) => {
                error!(thread = thread.0, error = %err, "thread terminated");
                if err.is_process_fatal() {
                    dispatcher.rt.halted = true;
                }
                terminate(&mut dispatcher);
                SliceOutcome::Fatal(err)
            }
        }
    }

    /// Run every live thread round-robin, one slice at a time, until all
    /// are finished or every remaining thread waits on a monitor
    ///
    /// Returns the threads that ended fatally.
    pub fn run_all(&mut self) -> Vec<(ThreadId, VmError)> {
        let mut failures = Vec::new();
        loop {
            let live: Vec<ThreadId> = self
                .threads()
                .filter(|&id| self.thread(id).is_some_and(|t| !t.is_finished()))
                .collect();
            if live.is_empty() || self.runtime.halted {
                return failures;
            }
            self.poll_blocked();
            let mut progressed = false;
            for id in live {
                let was_running = self.thread(id).is_some_and(|t| t.is_running());
                match self.run_slice(id) {
                    SliceOutcome::Fatal(err) => {
                        failures.push((id, err));
                        progressed = true;
                    }
                    SliceOutcome::Finished => progressed = true,
                    SliceOutcome::StillRunning => {
                        progressed |= was_running
                            && self.thread(id).is_some_and(|t| t.is_running());
                    }
                }
            }
            if !progressed && self.poll_blocked() == 0 {
                warn!(threads = self.threads.len(), "every live thread is blocked");
                return failures;
            }
        }
    }

    /// Re-arm blocked threads whose monitor is free; returns how many
    pub fn poll_blocked(&mut self) -> usize {
        let objects = &self.runtime.objects;
        let mut rearmed = 0;
        for context in self.threads.iter_mut() {
            if let ThreadState::Blocked(object) = context.state {
                let free = objects
                    .get(object)
                    .map_or(true, |link| !link.monitor.held_by_other(context.id));
                if free {
                    context.state = ThreadState::Running;
                    rearmed += 1;
                }
            }
        }
        rearmed
    }

    /// Run `name`/`descriptor` of `class` to completion on `thread`, above
    /// whatever that thread is executing
    ///
    /// `args` holds the argument words, receiver first for instance methods;
    /// instance methods dispatch on the receiver's run-time class.
    pub fn call_method(
        &mut self,
        thread: ThreadId,
        class: ClassId,
        name: &str,
        descriptor: &str,
        args: &[Word],
    ) -> VmResult<Vec<Word>> {
        if self.runtime.halted {
            return Err(VmError::Halted);
        }
        let method = self.find_method(class, name, descriptor)?;
        let context = self
            .threads
            .get_mut(thread.0 as usize)
            .ok_or(VmError::InvalidThread(thread.0))?;
        let mut dispatcher = Dispatcher::new(&mut self.runtime, context);

        let target = if method.is_static {
            dispatcher
                .initialize(method.owner)
                .map_err(|fault| fault_to_error(dispatcher.rt, fault))?;
            method
        } else {
            let receiver = ObjectRef::from_word(args.first().copied().unwrap_or(0));
            if receiver.is_null() {
                return Err(VmError::UnhandledException {
                    class_name: ExceptionKind::NullPointer.class_name().to_string(),
                });
            }
            let dispatched = match dispatcher.class_of(receiver) {
                Ok(start) => dispatcher.lookup_override(start, &method),
                Err(fault) => Err(fault),
            };
            dispatched.map_err(|fault| fault_to_error(dispatcher.rt, fault))?
        };

        match dispatcher.run_nested(&target, args)? {
            Ok(words) => Ok(words),
            Err(exception) => Err(VmError::UnhandledException {
                class_name: exception_name(dispatcher.rt, exception),
            }),
        }
    }

    /// Remove `class` from the class table
    ///
    /// Refused with [`VmError::ClassInUse`] while another class references
    /// it, extends or implements it, objects of it are alive or a thread is
    /// executing its code.
    pub fn unload_class(&mut self, class: ClassId) -> VmResult<()> {
        let classes = &self.runtime.classes;
        let name = classes.entry(class)?.name().to_string();
        if self.runtime.refs.incoming(RefNode::Class(class)) > 0 {
            return Err(VmError::ClassInUse(name));
        }
        let has_subtypes = classes.ids().filter(|&id| id != class).any(|id| {
            classes.descriptor(id).is_some_and(|descriptor| {
                descriptor.super_name.as_deref() == Some(name.as_str())
                    || descriptor.interfaces.iter().any(|iface| *iface == name)
            })
        });
        if has_subtypes || self.runtime.objects.instances_of(class) > 0 {
            return Err(VmError::ClassInUse(name));
        }
        let has_arrays = classes.ids().any(|id| {
            classes
                .array_info(id)
                .is_some_and(|info| info.component == ArrayComponent::Class(class))
        });
        if has_arrays {
            return Err(VmError::ClassInUse(name));
        }
        let running = self
            .threads
            .iter()
            .flat_map(|context| context.frames.iter())
            .any(|frame| frame.pc.class == class);
        if running {
            return Err(VmError::ClassInUse(name));
        }

        let runtime = &mut self.runtime;
        Linker::new(&mut runtime.classes, &mut runtime.refs, &runtime.natives).unresolve(class)?;
        let entry = runtime.classes.remove(class)?;
        if !entry.class_object.is_null() {
            runtime
                .refs
                .unmark_reference(RefNode::Class(class), RefNode::Object(entry.class_object));
            runtime.objects.release(entry.class_object);
        }
        runtime.forget_call_sites(class);
        info!(class = %name, "class unloaded");
        Ok(())
    }
}

/// Class name of an exception object
fn exception_name(rt: &Runtime, exception: ObjectRef) -> String {
    rt.objects
        .class_of(exception)
        .and_then(|class| rt.classes.name(class))
        .unwrap_or("?")
        .to_string()
}

/// Error reported for a fault that escaped an embedding call
fn fault_to_error(rt: &Runtime, fault: Fault) -> VmError {
    match fault {
        Fault::Fatal(err) => err,
        Fault::Throw(kind) => VmError::UnhandledException {
            class_name: kind.class_name().to_string(),
        },
        Fault::ThrowObject(exception) => VmError::UnhandledException {
            class_name: exception_name(rt, exception),
        },
    }
}

/// Pop every frame, releasing monitors, and mark the thread finished
fn terminate(dispatcher: &mut Dispatcher<'_>) {
    while dispatcher.pop_frame().is_some() {}
    dispatcher.thread.clear();
    dispatcher.thread.state = ThreadState::Finished;
}
