//! Object, array, field and constant instructions

use std::ops::Range;

use arrayvec::ArrayVec;
use bytecode_system::{ClassDescriptor, ConstantEntry, Opcode};
use core_types::{
    float_to_word, split_double, split_long, BaseType, ExceptionKind, ObjectRef,
    VerificationError, VmError, Word,
};
use linker::{is_a, is_assignable, member_is_accessible_to};
use memory_manager::{ArrayComponent, ArrayData, ClassId, FieldStorage, ResolvedField};

use crate::core_classes::THROWABLE_CLASS;
use crate::dispatch::{Dispatcher, Fault, Flow, Step};

/// Element kinds an array instruction accepts, words per element, mnemonic
fn array_access(opcode: Opcode) -> (&'static [BaseType], usize, &'static str) {
    match opcode {
        Opcode::Iaload | Opcode::Iastore => (&[BaseType::Int], 1, opcode.mnemonic()),
        Opcode::Laload | Opcode::Lastore => (&[BaseType::Long], 2, opcode.mnemonic()),
        Opcode::Faload | Opcode::Fastore => (&[BaseType::Float], 1, opcode.mnemonic()),
        Opcode::Daload | Opcode::Dastore => (&[BaseType::Double], 2, opcode.mnemonic()),
        Opcode::Aaload | Opcode::Aastore => (
            &[BaseType::Reference, BaseType::Array],
            1,
            opcode.mnemonic(),
        ),
        Opcode::Baload | Opcode::Bastore => {
            (&[BaseType::Byte, BaseType::Boolean], 1, opcode.mnemonic())
        }
        Opcode::Caload | Opcode::Castore => (&[BaseType::Char], 1, opcode.mnemonic()),
        _ => (&[BaseType::Short], 1, opcode.mnemonic()),
    }
}

/// Narrow an `int` to the storage form of a sub-word element
fn narrow(element: BaseType, value: Word) -> Word {
    match element {
        BaseType::Byte => value as i8 as i32 as Word,
        BaseType::Boolean => value & 1,
        BaseType::Char => value as u16 as Word,
        BaseType::Short => value as i16 as i32 as Word,
        _ => value,
    }
}

impl Dispatcher<'_> {
    /// `ldc`, `ldc_w`, `ldc2_w`
    pub(crate) fn ldc(
        &mut self,
        class: ClassId,
        descriptor: &ClassDescriptor,
        index: u16,
        wide: bool,
        length: u32,
    ) -> Step {
        let pool = &descriptor.constant_pool;
        let entry = pool.get(index).ok_or(VerificationError::BadConstantTag {
            index,
            expected: "loadable constant",
        })?;
        match (entry, wide) {
            (ConstantEntry::Integer(value), false) => self.push_then(&[*value as Word], length),
            (ConstantEntry::Float(value), false) => {
                self.push_then(&[float_to_word(*value)], length)
            }
            (ConstantEntry::Long(value), true) => self.push_then(&split_long(*value), length),
            (ConstantEntry::Double(value), true) => self.push_then(&split_double(*value), length),
            (ConstantEntry::String { .. }, false) => {
                let text = pool.string(index).ok_or(VerificationError::BadConstantTag {
                    index,
                    expected: "String",
                })?;
                let object = self.rt.objects.intern_string(&self.rt.classes, text)?;
                self.push_then(&[object.to_word()], length)
            }
            (ConstantEntry::Class { .. }, false) => {
                let target = self.rt.resolve_class(class, index)?;
                let object = self.rt.class_object(target)?;
                self.push_then(&[object.to_word()], length)
            }
            _ => Err(VerificationError::BadConstantTag {
                index,
                expected: if wide { "Long or Double" } else { "single-word constant" },
            }
            .into()),
        }
    }

    fn check_member_access(&self, field: &ResolvedField, caller: ClassId) -> Result<(), Fault> {
        if field.access.is_protected()
            && field.owner != caller
            && !member_is_accessible_to(&self.rt.classes, field.owner, field.access, caller)
        {
            return Err(Fault::Throw(ExceptionKind::IllegalAccess));
        }
        Ok(())
    }

    fn resolve_field_as(
        &mut self,
        caller: ClassId,
        index: u16,
        storage: FieldStorage,
    ) -> Result<ResolvedField, Fault> {
        let field = self.rt.resolve_field(caller, index)?;
        if field.storage != storage {
            return Err(Fault::Throw(ExceptionKind::IncompatibleClassChange));
        }
        self.check_member_access(&field, caller)?;
        Ok(field)
    }

    fn field_range(
        field: &ResolvedField,
        available: usize,
        mnemonic: &'static str,
    ) -> Result<Range<usize>, Fault> {
        let end = field.offset + field.base_type.word_count();
        if end > available {
            return Err(VerificationError::IllegalOperand {
                instruction: mnemonic,
                detail: format!("field offset {} outside storage", field.offset),
            }
            .into());
        }
        Ok(field.offset..end)
    }

    pub(crate) fn get_static(&mut self, caller: ClassId, index: u16) -> Step {
        let field = self.resolve_field_as(caller, index, FieldStorage::Static)?;
        self.initialize(field.owner)?;
        let entry = self.rt.classes.entry(field.owner)?;
        let range = Self::field_range(&field, entry.statics.len(), "getstatic")?;
        let value: ArrayVec<Word, 2> = entry.statics[range].iter().copied().collect();
        self.push_then(&value, 3)
    }

    pub(crate) fn put_static(&mut self, caller: ClassId, index: u16) -> Step {
        let field = self.resolve_field_as(caller, index, FieldStorage::Static)?;
        self.initialize(field.owner)?;
        let value = self.thread.pop_n(field.base_type.word_count())?;
        let entry = self.rt.classes.entry_mut(field.owner)?;
        let range = Self::field_range(&field, entry.statics.len(), "putstatic")?;
        entry.statics[range].copy_from_slice(&value);
        Ok(Flow::Advance(3))
    }

    /// Link of `object`'s chain that stores `field`
    fn field_holder(&self, object: ObjectRef, field: &ResolvedField) -> Result<ObjectRef, Fault> {
        if object.is_null() {
            return Err(Fault::Throw(ExceptionKind::NullPointer));
        }
        self.rt
            .objects
            .find_in_chain(object, field.owner)
            .ok_or_else(|| Fault::Throw(ExceptionKind::IncompatibleClassChange))
    }

    pub(crate) fn get_field(&mut self, caller: ClassId, index: u16) -> Step {
        let field = self.resolve_field_as(caller, index, FieldStorage::Instance)?;
        let object = self.pop_ref()?;
        let holder = self.field_holder(object, &field)?;
        let link = self.rt.objects.object(holder)?;
        let range = Self::field_range(&field, link.fields.len(), "getfield")?;
        let value: ArrayVec<Word, 2> = link.fields[range].iter().copied().collect();
        self.push_then(&value, 3)
    }

    pub(crate) fn put_field(&mut self, caller: ClassId, index: u16) -> Step {
        let field = self.resolve_field_as(caller, index, FieldStorage::Instance)?;
        let value = self.thread.pop_n(field.base_type.word_count())?;
        let object = self.pop_ref()?;
        let holder = self.field_holder(object, &field)?;
        let link = self.rt.objects.object_mut(holder)?;
        let range = Self::field_range(&field, link.fields.len(), "putfield")?;
        link.fields[range].copy_from_slice(&value);
        Ok(Flow::Advance(3))
    }

    /// Array payload of `array`, checked against the accepted element kinds
    fn array_data(
        &self,
        array: ObjectRef,
        accepted: &[BaseType],
        mnemonic: &'static str,
    ) -> Result<&ArrayData, Fault> {
        if array.is_null() {
            return Err(Fault::Throw(ExceptionKind::NullPointer));
        }
        let data = self
            .rt
            .objects
            .object(array)?
            .array
            .as_ref()
            .ok_or(VerificationError::NotAnArray(mnemonic))?;
        if !accepted.contains(&data.element_type) {
            return Err(VerificationError::NotAnArray(mnemonic).into());
        }
        Ok(data)
    }

    pub(crate) fn array_load(&mut self, opcode: Opcode) -> Step {
        let (accepted, _, mnemonic) = array_access(opcode);
        let index = self.pop_int()?;
        let array = self.pop_ref()?;
        let data = self.array_data(array, accepted, mnemonic)?;
        let element = usize::try_from(index)
            .ok()
            .and_then(|index| data.get(index))
            .ok_or(Fault::Throw(ExceptionKind::ArrayIndexOutOfBounds))?;
        let value: ArrayVec<Word, 2> = element.iter().copied().collect();
        self.push_then(&value, 1)
    }

    pub(crate) fn array_store(&mut self, opcode: Opcode) -> Step {
        let (accepted, words, mnemonic) = array_access(opcode);
        let mut value = self.thread.pop_n(words)?;
        let index = self.pop_int()?;
        let array = self.pop_ref()?;
        let data = self.array_data(array, accepted, mnemonic)?;
        let element_type = data.element_type;
        let index = usize::try_from(index)
            .ok()
            .filter(|&index| index < data.length)
            .ok_or(Fault::Throw(ExceptionKind::ArrayIndexOutOfBounds))?;

        if opcode == Opcode::Aastore {
            let stored = ObjectRef::from_word(value[0]);
            if !stored.is_null() {
                let array_class = self.class_of(array)?;
                let stored_class = self.class_of(stored)?;
                let component = self
                    .rt
                    .classes
                    .array_info(array_class)
                    .map(|info| info.component);
                let fits = match component {
                    Some(ArrayComponent::Class(component)) => {
                        is_assignable(&self.rt.classes, stored_class, component)
                    }
                    _ => false,
                };
                if !fits {
                    return Err(Fault::Throw(ExceptionKind::ArrayStore));
                }
            }
        } else if words == 1 {
            value[0] = narrow(element_type, value[0]);
        }

        let data = self
            .rt
            .objects
            .object_mut(array)?
            .array
            .as_mut()
            .ok_or(VerificationError::NotAnArray(mnemonic))?;
        data.set(index, &value);
        Ok(Flow::Advance(1))
    }

    pub(crate) fn array_length(&mut self) -> Step {
        let array = self.pop_ref()?;
        if array.is_null() {
            return Err(Fault::Throw(ExceptionKind::NullPointer));
        }
        let length = self
            .rt
            .objects
            .object(array)?
            .array
            .as_ref()
            .ok_or(VerificationError::NotAnArray("arraylength"))?
            .length;
        self.push_then(&[length as Word], 1)
    }

    pub(crate) fn new_object(&mut self, caller: ClassId, index: u16) -> Step {
        let class = self.rt.resolve_class(caller, index)?;
        let entry = self.rt.classes.entry(class)?;
        if entry.status.is_array()
            || entry.status.is_primitive()
            || entry.is_interface()
            || entry.descriptor.access.is_abstract()
        {
            return Err(Fault::Throw(ExceptionKind::Instantiation));
        }
        self.initialize(class)?;
        let object = self.rt.objects.instantiate(&self.rt.classes, class)?;
        self.push_then(&[object.to_word()], 3)
    }

    fn allocate_array(&mut self, class: ClassId, count: i32) -> Result<ObjectRef, Fault> {
        let length =
            usize::try_from(count).map_err(|_| Fault::Throw(ExceptionKind::NegativeArraySize))?;
        let info = self
            .rt
            .classes
            .array_info(class)
            .ok_or(VerificationError::NotAnArray("newarray"))?;
        Ok(self.rt.objects.new_array(class, info, length)?)
    }

    pub(crate) fn new_primitive_array(&mut self, code: u8) -> Step {
        let element = BaseType::from_array_type_code(code).ok_or_else(|| {
            VerificationError::IllegalOperand {
                instruction: "newarray",
                detail: format!("array type code {}", code),
            }
        })?;
        let count = self.pop_int()?;
        let class = self.rt.classes.array_class(ArrayComponent::Primitive(element))?;
        let array = self.allocate_array(class, count)?;
        self.push_then(&[array.to_word()], 2)
    }

    pub(crate) fn new_reference_array(&mut self, caller: ClassId, index: u16) -> Step {
        let component = self.rt.resolve_class(caller, index)?;
        let count = self.pop_int()?;
        let class = self.rt.classes.array_class(ArrayComponent::Class(component))?;
        let array = self.allocate_array(class, count)?;
        self.push_then(&[array.to_word()], 3)
    }

    /// `multianewarray`
    ///
    /// Every count is checked before anything is allocated; an allocation
    /// failure part way releases what was already built.
    pub(crate) fn new_multi_array(
        &mut self,
        caller: ClassId,
        index: u16,
        dimensions: usize,
    ) -> Step {
        if dimensions == 0 {
            return Err(VerificationError::IllegalOperand {
                instruction: "multianewarray",
                detail: "zero dimensions".to_string(),
            }
            .into());
        }
        let counts: Vec<i32> = self
            .thread
            .pop_n(dimensions)?
            .into_iter()
            .map(|word| word as i32)
            .collect();
        let class = self.rt.resolve_class(caller, index)?;
        let available = self
            .rt
            .classes
            .array_info(class)
            .ok_or(VerificationError::NotAnArray("multianewarray"))?
            .dimensions;
        if dimensions > available {
            return Err(VerificationError::IllegalOperand {
                instruction: "multianewarray",
                detail: format!("{} dimensions requested of {}", dimensions, available),
            }
            .into());
        }
        if counts.iter().any(|&count| count < 0) {
            return Err(Fault::Throw(ExceptionKind::NegativeArraySize));
        }

        let mut built = Vec::new();
        match self.build_dimension(class, &counts, &mut built) {
            Ok(array) => self.push_then(&[array.to_word()], 4),
            Err(fault) => {
                for array in built {
                    self.rt.objects.release(array);
                }
                Err(fault)
            }
        }
    }

    fn build_dimension(
        &mut self,
        class: ClassId,
        counts: &[i32],
        built: &mut Vec<ObjectRef>,
    ) -> Result<ObjectRef, Fault> {
        let array = self.allocate_array(class, counts[0])?;
        built.push(array);
        if counts.len() == 1 {
            return Ok(array);
        }
        let Some(ArrayComponent::Class(inner)) =
            self.rt.classes.array_info(class).map(|info| info.component)
        else {
            return Err(VerificationError::NotAnArray("multianewarray").into());
        };
        for element in 0..counts[0] as usize {
            let child = self.build_dimension(inner, &counts[1..], built)?;
            if let Some(data) = self.rt.objects.object_mut(array)?.array.as_mut() {
                data.set(element, &[child.to_word()]);
            }
        }
        Ok(array)
    }

    /// Whether `object` (non-null) is an instance of the class at `index`
    fn instance_test(
        &mut self,
        caller: ClassId,
        index: u16,
        object: ObjectRef,
    ) -> Result<bool, Fault> {
        let target = self.rt.resolve_class(caller, index)?;
        let class = self.class_of(object)?;
        Ok(is_assignable(&self.rt.classes, class, target))
    }

    pub(crate) fn checkcast(&mut self, caller: ClassId, index: u16) -> Step {
        let object = ObjectRef::from_word(self.thread.peek(0)?);
        if object.is_null() || self.instance_test(caller, index, object)? {
            Ok(Flow::Advance(3))
        } else {
            Err(Fault::Throw(ExceptionKind::ClassCast))
        }
    }

    pub(crate) fn instance_of(&mut self, caller: ClassId, index: u16) -> Step {
        let object = self.pop_ref()?;
        let result = !object.is_null() && self.instance_test(caller, index, object)?;
        self.push_then(&[result as Word], 3)
    }

    pub(crate) fn athrow(&mut self) -> Step {
        let object = self.pop_ref()?;
        if object.is_null() {
            return Err(Fault::Throw(ExceptionKind::NullPointer));
        }
        if self
            .rt
            .objects
            .object(object)?
            .monitor
            .held_by_other(self.thread.id)
        {
            return Err(Fault::Throw(ExceptionKind::IllegalMonitorState));
        }
        let class = self.class_of(object)?;
        let throwable = self.rt.require_class(THROWABLE_CLASS)?;
        if !is_a(&self.rt.classes, class, throwable) {
            let name = self.rt.classes.name(class).unwrap_or("?").to_string();
            return Err(VmError::from(VerificationError::NotThrowable(name)).into());
        }
        Err(Fault::ThrowObject(object))
    }

    /// `monitorenter`; on contention the reference stays on the stack and
    /// the instruction is retried
    pub(crate) fn monitor_enter(&mut self) -> Step {
        let object = ObjectRef::from_word(self.thread.peek(0)?);
        if object.is_null() {
            self.thread.pop()?;
            return Err(Fault::Throw(ExceptionKind::NullPointer));
        }
        if !self.acquire(object)? {
            return Ok(Flow::Blocked);
        }
        self.thread.pop()?;
        Ok(Flow::Advance(1))
    }

    pub(crate) fn monitor_exit(&mut self) -> Step {
        let object = self.pop_ref()?;
        if object.is_null() {
            return Err(Fault::Throw(ExceptionKind::NullPointer));
        }
        let id = self.thread.id;
        if !self.rt.objects.object_mut(object)?.monitor.exit(id) {
            return Err(Fault::Throw(ExceptionKind::IllegalMonitorState));
        }
        Ok(Flow::Advance(1))
    }
}
