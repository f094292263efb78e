//! Bytecode opcodes for the class-file instruction set
//!
//! Defines every instruction byte together with its mnemonic and the fixed
//! operand length, plus a small decoder for walking a code array.

macro_rules! opcodes {
    ($($name:ident = $byte:literal => $mnemonic:literal, $operands:expr;)*) => {
        /// Instruction opcodes, discriminant equal to the encoded byte
        #[allow(missing_docs)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Opcode {
            $($name = $byte,)*
        }

        impl Opcode {
            /// Assembler mnemonic
            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(Opcode::$name => $mnemonic,)*
                }
            }

            /// Number of operand bytes following the opcode, or `None` for
            /// the variable-length `tableswitch`, `lookupswitch` and `wide`
            pub fn operand_bytes(self) -> Option<usize> {
                let n: i32 = match self {
                    $(Opcode::$name => $operands,)*
                };
                if n < 0 {
                    None
                } else {
                    Some(n as usize)
                }
            }
        }

        impl TryFrom<u8> for Opcode {
            type Error = u8;

            fn try_from(byte: u8) -> Result<Self, u8> {
                match byte {
                    $($byte => Ok(Opcode::$name),)*
                    other => Err(other),
                }
            }
        }
    };
}

opcodes! {
    Nop = 0x00 => "nop", 0;
    AconstNull = 0x01 => "aconst_null", 0;
    IconstM1 = 0x02 => "iconst_m1", 0;
    Iconst0 = 0x03 => "iconst_0", 0;
    Iconst1 = 0x04 => "iconst_1", 0;
    Iconst2 = 0x05 => "iconst_2", 0;
    Iconst3 = 0x06 => "iconst_3", 0;
    Iconst4 = 0x07 => "iconst_4", 0;
    Iconst5 = 0x08 => "iconst_5", 0;
    Lconst0 = 0x09 => "lconst_0", 0;
    Lconst1 = 0x0a => "lconst_1", 0;
    Fconst0 = 0x0b => "fconst_0", 0;
    Fconst1 = 0x0c => "fconst_1", 0;
    Fconst2 = 0x0d => "fconst_2", 0;
    Dconst0 = 0x0e => "dconst_0", 0;
    Dconst1 = 0x0f => "dconst_1", 0;
    Bipush = 0x10 => "bipush", 1;
    Sipush = 0x11 => "sipush", 2;
    Ldc = 0x12 => "ldc", 1;
    LdcW = 0x13 => "ldc_w", 2;
    Ldc2W = 0x14 => "ldc2_w", 2;
    Iload = 0x15 => "iload", 1;
    Lload = 0x16 => "lload", 1;
    Fload = 0x17 => "fload", 1;
    Dload = 0x18 => "dload", 1;
    Aload = 0x19 => "aload", 1;
    Iload0 = 0x1a => "iload_0", 0;
    Iload1 = 0x1b => "iload_1", 0;
    Iload2 = 0x1c => "iload_2", 0;
    Iload3 = 0x1d => "iload_3", 0;
    Lload0 = 0x1e => "lload_0", 0;
    Lload1 = 0x1f => "lload_1", 0;
    Lload2 = 0x20 => "lload_2", 0;
    Lload3 = 0x21 => "lload_3", 0;
    Fload0 = 0x22 => "fload_0", 0;
    Fload1 = 0x23 => "fload_1", 0;
    Fload2 = 0x24 => "fload_2", 0;
    Fload3 = 0x25 => "fload_3", 0;
    Dload0 = 0x26 => "dload_0", 0;
    Dload1 = 0x27 => "dload_1", 0;
    Dload2 = 0x28 => "dload_2", 0;
    Dload3 = 0x29 => "dload_3", 0;
    Aload0 = 0x2a => "aload_0", 0;
    Aload1 = 0x2b => "aload_1", 0;
    Aload2 = 0x2c => "aload_2", 0;
    Aload3 = 0x2d => "aload_3", 0;
    Iaload = 0x2e => "iaload", 0;
    Laload = 0x2f => "laload", 0;
    Faload = 0x30 => "faload", 0;
    Daload = 0x31 => "daload", 0;
    Aaload = 0x32 => "aaload", 0;
    Baload = 0x33 => "baload", 0;
    Caload = 0x34 => "caload", 0;
    Saload = 0x35 => "saload", 0;
    Istore = 0x36 => "istore", 1;
    Lstore = 0x37 => "lstore", 1;
    Fstore = 0x38 => "fstore", 1;
    Dstore = 0x39 => "dstore", 1;
    Astore = 0x3a => "astore", 1;
    Istore0 = 0x3b => "istore_0", 0;
    Istore1 = 0x3c => "istore_1", 0;
    Istore2 = 0x3d => "istore_2", 0;
    Istore3 = 0x3e => "istore_3", 0;
    Lstore0 = 0x3f => "lstore_0", 0;
    Lstore1 = 0x40 => "lstore_1", 0;
    Lstore2 = 0x41 => "lstore_2", 0;
    Lstore3 = 0x42 => "lstore_3", 0;
    Fstore0 = 0x43 => "fstore_0", 0;
    Fstore1 = 0x44 => "fstore_1", 0;
    Fstore2 = 0x45 => "fstore_2", 0;
    Fstore3 = 0x46 => "fstore_3", 0;
    Dstore0 = 0x47 => "dstore_0", 0;
    Dstore1 = 0x48 => "dstore_1", 0;
    Dstore2 = 0x49 => "dstore_2", 0;
    Dstore3 = 0x4a => "dstore_3", 0;
    Astore0 = 0x4b => "astore_0", 0;
    Astore1 = 0x4c => "astore_1", 0;
    Astore2 = 0x4d => "astore_2", 0;
    Astore3 = 0x4e => "astore_3", 0;
    Iastore = 0x4f => "iastore", 0;
    Lastore = 0x50 => "lastore", 0;
    Fastore = 0x51 => "fastore", 0;
    Dastore = 0x52 => "dastore", 0;
    Aastore = 0x53 => "aastore", 0;
    Bastore = 0x54 => "bastore", 0;
    Castore = 0x55 => "castore", 0;
    Sastore = 0x56 => "sastore", 0;
    Pop = 0x57 => "pop", 0;
    Pop2 = 0x58 => "pop2", 0;
    Dup = 0x59 => "dup", 0;
    DupX1 = 0x5a => "dup_x1", 0;
    DupX2 = 0x5b => "dup_x2", 0;
    Dup2 = 0x5c => "dup2", 0;
    Dup2X1 = 0x5d => "dup2_x1", 0;
    Dup2X2 = 0x5e => "dup2_x2", 0;
    Swap = 0x5f => "swap", 0;
    Iadd = 0x60 => "iadd", 0;
    Ladd = 0x61 => "ladd", 0;
    Fadd = 0x62 => "fadd", 0;
    Dadd = 0x63 => "dadd", 0;
    Isub = 0x64 => "isub", 0;
    Lsub = 0x65 => "lsub", 0;
    Fsub = 0x66 => "fsub", 0;
    Dsub = 0x67 => "dsub", 0;
    Imul = 0x68 => "imul", 0;
    Lmul = 0x69 => "lmul", 0;
    Fmul = 0x6a => "fmul", 0;
    Dmul = 0x6b => "dmul", 0;
    Idiv = 0x6c => "idiv", 0;
    Ldiv = 0x6d => "ldiv", 0;
    Fdiv = 0x6e => "fdiv", 0;
    Ddiv = 0x6f => "ddiv", 0;
    Irem = 0x70 => "irem", 0;
    Lrem = 0x71 => "lrem", 0;
    Frem = 0x72 => "frem", 0;
    Drem = 0x73 => "drem", 0;
    Ineg = 0x74 => "ineg", 0;
    Lneg = 0x75 => "lneg", 0;
    Fneg = 0x76 => "fneg", 0;
    Dneg = 0x77 => "dneg", 0;
    Ishl = 0x78 => "ishl", 0;
    Lshl = 0x79 => "lshl", 0;
    Ishr = 0x7a => "ishr", 0;
    Lshr = 0x7b => "lshr", 0;
    Iushr = 0x7c => "iushr", 0;
    Lushr = 0x7d => "lushr", 0;
    Iand = 0x7e => "iand", 0;
    Land = 0x7f => "land", 0;
    Ior = 0x80 => "ior", 0;
    Lor = 0x81 => "lor", 0;
    Ixor = 0x82 => "ixor", 0;
    Lxor = 0x83 => "lxor", 0;
    Iinc = 0x84 => "iinc", 2;
    I2l = 0x85 => "i2l", 0;
    I2f = 0x86 => "i2f", 0;
    I2d = 0x87 => "i2d", 0;
    L2i = 0x88 => "l2i", 0;
    L2f = 0x89 => "l2f", 0;
    L2d = 0x8a => "l2d", 0;
    F2i = 0x8b => "f2i", 0;
    F2l = 0x8c => "f2l", 0;
    F2d = 0x8d => "f2d", 0;
    D2i = 0x8e => "d2i", 0;
    D2l = 0x8f => "d2l", 0;
    D2f = 0x90 => "d2f", 0;
    I2b = 0x91 => "i2b", 0;
    I2c = 0x92 => "i2c", 0;
    I2s = 0x93 => "i2s", 0;
    Lcmp = 0x94 => "lcmp", 0;
    Fcmpl = 0x95 => "fcmpl", 0;
    Fcmpg = 0x96 => "fcmpg", 0;
    Dcmpl = 0x97 => "dcmpl", 0;
    Dcmpg = 0x98 => "dcmpg", 0;
    Ifeq = 0x99 => "ifeq", 2;
    Ifne = 0x9a => "ifne", 2;
    Iflt = 0x9b => "iflt", 2;
    Ifge = 0x9c => "ifge", 2;
    Ifgt = 0x9d => "ifgt", 2;
    Ifle = 0x9e => "ifle", 2;
    IfIcmpeq = 0x9f => "if_icmpeq", 2;
    IfIcmpne = 0xa0 => "if_icmpne", 2;
    IfIcmplt = 0xa1 => "if_icmplt", 2;
    IfIcmpge = 0xa2 => "if_icmpge", 2;
    IfIcmpgt = 0xa3 => "if_icmpgt", 2;
    IfIcmple = 0xa4 => "if_icmple", 2;
    IfAcmpeq = 0xa5 => "if_acmpeq", 2;
    IfAcmpne = 0xa6 => "if_acmpne", 2;
    Goto = 0xa7 => "goto", 2;
    Jsr = 0xa8 => "jsr", 2;
    Ret = 0xa9 => "ret", 1;
    Tableswitch = 0xaa => "tableswitch", -1;
    Lookupswitch = 0xab => "lookupswitch", -1;
    Ireturn = 0xac => "ireturn", 0;
    Lreturn = 0xad => "lreturn", 0;
    Freturn = 0xae => "freturn", 0;
    Dreturn = 0xaf => "dreturn", 0;
    Areturn = 0xb0 => "areturn", 0;
    Return = 0xb1 => "return", 0;
    Getstatic = 0xb2 => "getstatic", 2;
    Putstatic = 0xb3 => "putstatic", 2;
    Getfield = 0xb4 => "getfield", 2;
    Putfield = 0xb5 => "putfield", 2;
    Invokevirtual = 0xb6 => "invokevirtual", 2;
    Invokespecial = 0xb7 => "invokespecial", 2;
    Invokestatic = 0xb8 => "invokestatic", 2;
    Invokeinterface = 0xb9 => "invokeinterface", 4;
    Invokedynamic = 0xba => "invokedynamic", 4;
    New = 0xbb => "new", 2;
    Newarray = 0xbc => "newarray", 1;
    Anewarray = 0xbd => "anewarray", 2;
    Arraylength = 0xbe => "arraylength", 0;
    Athrow = 0xbf => "athrow", 0;
    Checkcast = 0xc0 => "checkcast", 2;
    Instanceof = 0xc1 => "instanceof", 2;
    Monitorenter = 0xc2 => "monitorenter", 0;
    Monitorexit = 0xc3 => "monitorexit", 0;
    Wide = 0xc4 => "wide", -1;
    Multianewarray = 0xc5 => "multianewarray", 3;
    Ifnull = 0xc6 => "ifnull", 2;
    Ifnonnull = 0xc7 => "ifnonnull", 2;
    GotoW = 0xc8 => "goto_w", 4;
    JsrW = 0xc9 => "jsr_w", 4;
    Breakpoint = 0xca => "breakpoint", 0;
    Impdep1 = 0xfe => "impdep1", 0;
    Impdep2 = 0xff => "impdep2", 0;
}

impl Opcode {
    /// Check if this opcode returns from the current method
    pub fn is_return(self) -> bool {
        matches!(
            self,
            Opcode::Ireturn
                | Opcode::Lreturn
                | Opcode::Freturn
                | Opcode::Dreturn
                | Opcode::Areturn
                | Opcode::Return
        )
    }

    /// Check if this opcode is one of the four method invocation forms
    pub fn is_invoke(self) -> bool {
        matches!(
            self,
            Opcode::Invokevirtual
                | Opcode::Invokespecial
                | Opcode::Invokestatic
                | Opcode::Invokeinterface
        )
    }

    /// Check if this opcode always leaves the current basic block
    pub fn is_unconditional_terminator(self) -> bool {
        self.is_return()
            || matches!(
                self,
                Opcode::Goto
                    | Opcode::GotoW
                    | Opcode::Athrow
                    | Opcode::Ret
                    | Opcode::Tableswitch
                    | Opcode::Lookupswitch
            )
    }
}

/// Total encoded length of the instruction starting at `offset`.
///
/// Switch padding is computed relative to the start of `code`, which must be
/// the method's full code array. Returns `None` for an undefined opcode or a
/// truncated instruction.
pub fn instruction_length(code: &[u8], offset: usize) -> Option<usize> {
    let opcode = Opcode::try_from(*code.get(offset)?).ok()?;
    let length = match opcode {
        Opcode::Tableswitch => {
            let base = (offset + 4) & !3;
            let low = read_i32(code, base + 4)?;
            let high = read_i32(code, base + 8)?;
            if high < low {
                return None;
            }
            let entries = (high as i64 - low as i64 + 1) as usize;
            base + 12 + entries * 4 - offset
        }
        Opcode::Lookupswitch => {
            let base = (offset + 4) & !3;
            let pairs = read_i32(code, base + 4)?;
            if pairs < 0 {
                return None;
            }
            base + 8 + pairs as usize * 8 - offset
        }
        Opcode::Wide => match Opcode::try_from(*code.get(offset + 1)?).ok()? {
            Opcode::Iinc => 6,
            _ => 4,
        },
        other => 1 + other.operand_bytes()?,
    };
    if offset + length > code.len() {
        None
    } else {
        Some(length)
    }
}

/// Decode a code array into `(offset, opcode)` pairs.
///
/// Stops at the first undecodable instruction.
pub fn disassemble(code: &[u8]) -> Vec<(usize, Opcode)> {
    let mut out = Vec::new();
    let mut offset = 0;
    while offset < code.len() {
        let Some(length) = instruction_length(code, offset) else {
            break;
        };
        if let Ok(opcode) = Opcode::try_from(code[offset]) {
            out.push((offset, opcode));
        }
        offset += length;
    }
    out
}

fn read_i32(code: &[u8], at: usize) -> Option<i32> {
    let bytes = code.get(at..at + 4)?;
    Some(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}
