//! Integration test suite for the class-file virtual machine
//!
//! This crate provides integration tests that verify components work
//! together correctly across component boundaries: class loading, linking,
//! object allocation and the interpreter.

/// Re-export components for test convenience
pub mod components {
    pub use bytecode_system;
    pub use core_types;
    pub use interpreter;
    pub use linker;
    pub use memory_manager;
}

/// Class builders shared by the integration tests
pub mod programs {
    use bytecode_system::{AccessFlags, ClassBuilder, ClassDescriptor, CodeBuilder, Opcode};
    use core_types::{VmConfig, Word};
    use interpreter::core_classes::core_classes;
    use interpreter::{MapLoader, VM};

    /// `public static`
    pub const PUBLIC_STATIC: AccessFlags = AccessFlags(0x0009);

    /// Add a no-argument constructor chaining to `super_name`
    pub fn constructor(class: &mut ClassBuilder, super_name: &str) {
        let init = class.method_ref(super_name, "<init>", "()V");
        let mut code = CodeBuilder::new(1, 1);
        code.op(Opcode::Aload0)
            .op(Opcode::Invokespecial)
            .u16(init)
            .op(Opcode::Return);
        class.method(AccessFlags::PUBLIC, "<init>", "()V", code.build());
    }

    /// VM whose loader serves the core classes plus `extra`
    pub fn vm_with_loader(config: VmConfig, extra: Vec<ClassDescriptor>) -> VM {
        let loader: MapLoader = core_classes().into_iter().chain(extra).collect();
        let mut vm = VM::with_loader(config, loader);
        vm.bootstrap().expect("bootstrap");
        vm
    }

    /// `Counter` with a synchronized static `add(I)V` and a static total
    pub fn counter() -> ClassDescriptor {
        let mut class = ClassBuilder::new("Counter");
        class.field(PUBLIC_STATIC, "total", "I");
        let total = class.field_ref("Counter", "total", "I");
        let mut code = CodeBuilder::new(2, 1);
        code.op(Opcode::Getstatic)
            .u16(total)
            .op(Opcode::Iload0)
            .op(Opcode::Iadd)
            .op(Opcode::Putstatic)
            .u16(total)
            .op(Opcode::Return);
        class.method(
            PUBLIC_STATIC | AccessFlags::SYNCHRONIZED,
            "add",
            "(I)V",
            code.build(),
        );
        let mut code = CodeBuilder::new(1, 0);
        code.op(Opcode::Getstatic).u16(total).op(Opcode::Ireturn);
        class.method(PUBLIC_STATIC, "total", "()I", code.build());
        class.build()
    }

    /// `Worker.work(I)V` calling `Counter.add(1)` the given number of times
    pub fn worker() -> ClassDescriptor {
        let mut class = ClassBuilder::new("Worker");
        let add = class.method_ref("Counter", "add", "(I)V");
        let mut code = CodeBuilder::new(1, 1);
        let top = code.offset();
        code.op(Opcode::Iload0);
        let done = code.forward(Opcode::Ifle);
        code.op(Opcode::Iconst1)
            .op(Opcode::Invokestatic)
            .u16(add)
            .op(Opcode::Iinc)
            .u8(0)
            .u8(0xff)
            .branch(Opcode::Goto, top);
        code.bind(done);
        code.op(Opcode::Return);
        class.method(PUBLIC_STATIC, "work", "(I)V", code.build());
        class.build()
    }

    /// First result word of a finished thread, as a signed int
    pub fn int_result(vm: &VM, thread: core_types::ThreadId) -> Option<i32> {
        vm.thread_result(thread)
            .and_then(|words: &[Word]| words.first())
            .map(|&word| word as i32)
    }
}
