//! Size and alignment computation.
//!
//! `sizeof`/`alignof` are folded to integers during HIR lowering, and MIR
//! lowering reuses the same engine for struct field offsets and tagged-union
//! layouts. Rules:
//!
//! - primitives are their width (bool/char 1, float 4, double 8);
//! - pointers, references, function pointers and `string`/`cstring` are 8;
//! - fixed arrays are `N * size(elem)` with the element's alignment; slices
//!   are a pointer-plus-length pair (16, align 8);
//! - structs pack fields in order, padding each to its alignment, with a
//!   trailing pad to the max field alignment;
//! - enums with payloads are `tag(4) + pad + max payload`, aligned to the
//!   max of 4 and any payload alignment; plain enums are a bare `int32`;
//! - unknown or unresolved types fall back to pointer size.

use rustc_hash::{FxHashMap, FxHashSet};

use cm_parser::ast::{ArraySize, Type, TypeKind};

/// Pointer size on every supported target.
pub const POINTER_SIZE: u64 = 8;

/// Type layout tables for one program.
#[derive(Debug, Default)]
pub struct LayoutEngine {
    structs: FxHashMap<String, Vec<Type>>,
    enums: FxHashMap<String, Vec<Vec<Type>>>,
    typedefs: FxHashMap<String, Type>,
}

impl LayoutEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_struct(&mut self, name: impl Into<String>, field_types: Vec<Type>) {
        self.structs.insert(name.into(), field_types);
    }

    pub fn add_enum(&mut self, name: impl Into<String>, variant_payloads: Vec<Vec<Type>>) {
        self.enums.insert(name.into(), variant_payloads);
    }

    pub fn add_typedef(&mut self, name: impl Into<String>, target: Type) {
        self.typedefs.insert(name.into(), target);
    }

    /// Size in bytes.
    pub fn size_of(&self, ty: &Type) -> u64 {
        self.size_align(ty, &mut FxHashSet::default()).0
    }

    /// Alignment in bytes.
    pub fn align_of(&self, ty: &Type) -> u64 {
        self.size_align(ty, &mut FxHashSet::default()).1
    }

    /// Field offsets plus total size for a struct's field types.
    pub fn struct_layout(&self, field_types: &[Type]) -> (Vec<u64>, u64, u64) {
        self.struct_layout_inner(field_types, &mut FxHashSet::default())
    }

    fn struct_layout_inner(
        &self,
        field_types: &[Type],
        visiting: &mut FxHashSet<String>,
    ) -> (Vec<u64>, u64, u64) {
        let mut offsets = Vec::with_capacity(field_types.len());
        let mut offset = 0u64;
        let mut max_align = 1u64;

        for ty in field_types {
            let (size, align) = self.size_align(ty, visiting);
            offset = round_up(offset, align);
            offsets.push(offset);
            offset += size;
            max_align = max_align.max(align);
        }

        let total = round_up(offset.max(1), max_align);
        (offsets, total, max_align)
    }

    /// Tagged-union layout for an enum's variant payloads:
    /// `(payload_offset, total_size, align)`.
    pub fn tagged_union_layout(&self, variant_payloads: &[Vec<Type>]) -> (u64, u64, u64) {
        let mut visiting = FxHashSet::default();
        let mut max_payload_size = 0u64;
        let mut max_payload_align = 1u64;
        for payload in variant_payloads {
            let (_, size, align) = self.struct_layout_inner(payload, &mut visiting);
            if !payload.is_empty() {
                max_payload_size = max_payload_size.max(size);
                max_payload_align = max_payload_align.max(align);
            }
        }

        let align = 4u64.max(max_payload_align);
        let payload_offset = round_up(4, max_payload_align.max(1));
        let total = round_up(payload_offset + max_payload_size, align);
        (payload_offset, total, align)
    }

    fn size_align(&self, ty: &Type, visiting: &mut FxHashSet<String>) -> (u64, u64) {
        match &ty.kind {
            TypeKind::Bool | TypeKind::Char => (1, 1),
            TypeKind::Int { width, .. } => {
                let n = width.size();
                (n, n)
            }
            TypeKind::Float32 => (4, 4),
            TypeKind::Float64 => (8, 8),
            TypeKind::String | TypeKind::CString => (POINTER_SIZE, POINTER_SIZE),
            TypeKind::Void | TypeKind::Null | TypeKind::Inferred | TypeKind::Error => (0, 1),
            TypeKind::Pointer(_) | TypeKind::Reference(_) | TypeKind::FunctionPointer { .. } => {
                (POINTER_SIZE, POINTER_SIZE)
            }
            TypeKind::Array { elem, size } => match size {
                Some(ArraySize::Literal(n)) => {
                    let (elem_size, elem_align) = self.size_align(elem, visiting);
                    (elem_size * n, elem_align.max(1))
                }
                // Generic-sized arrays are unresolved until substitution.
                Some(ArraySize::Generic(_)) => (POINTER_SIZE, POINTER_SIZE),
                // Slices are a (ptr, len) pair.
                None => (2 * POINTER_SIZE, POINTER_SIZE),
            },
            TypeKind::Union(variants) => {
                let payloads: Vec<Vec<Type>> =
                    variants.iter().map(|v| v.fields.clone()).collect();
                let (_, total, align) = self.tagged_union_layout(&payloads);
                (total, align)
            }
            TypeKind::LiteralUnion(_) => (POINTER_SIZE, POINTER_SIZE),
            TypeKind::Alias(name) => match self.typedefs.get(name) {
                Some(target) => self.size_align(&target.clone(), visiting),
                None => (POINTER_SIZE, POINTER_SIZE),
            },
            TypeKind::Named { name, .. } => {
                if visiting.contains(name) {
                    // Recursive type through a pointer-free cycle; the
                    // fallback keeps layout finite.
                    return (POINTER_SIZE, POINTER_SIZE);
                }
                if let Some(fields) = self.structs.get(name) {
                    visiting.insert(name.clone());
                    let fields = fields.clone();
                    let (_, total, align) = self.struct_layout_inner(&fields, visiting);
                    visiting.remove(name);
                    return (total, align);
                }
                if let Some(variants) = self.enums.get(name) {
                    if variants.iter().all(|v| v.is_empty()) {
                        return (4, 4);
                    }
                    visiting.insert(name.clone());
                    let variants = variants.clone();
                    let (_, total, align) = self.tagged_union_layout(&variants);
                    visiting.remove(name);
                    return (total, align);
                }
                if let Some(target) = self.typedefs.get(name) {
                    return self.size_align(&target.clone(), visiting);
                }
                // Unknown (generic parameter, unresolved name): pointer size.
                (POINTER_SIZE, POINTER_SIZE)
            }
        }
    }
}

fn round_up(value: u64, align: u64) -> u64 {
    if align <= 1 {
        return value;
    }
    value.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::*;
    use cm_parser::ast::IntWidth;

    fn int() -> Type {
        Type::int()
    }

    fn long() -> Type {
        Type::new(
            TypeKind::Int {
                width: IntWidth::W64,
                signed: true,
            },
            cm_common::Span::dummy(),
        )
    }

    fn tiny() -> Type {
        Type::new(
            TypeKind::Int {
                width: IntWidth::W8,
                signed: true,
            },
            cm_common::Span::dummy(),
        )
    }

    #[test]
    fn primitive_sizes() {
        let engine = LayoutEngine::new();
        assert_eq!(engine.size_of(&Type::bool()), 1);
        assert_eq!(engine.size_of(&int()), 4);
        assert_eq!(engine.size_of(&long()), 8);
        assert_eq!(
            engine.size_of(&Type::new(TypeKind::Pointer(Box::new(int())), cm_common::Span::dummy())),
            8
        );
    }

    #[test]
    fn struct_packing_with_padding() {
        // { tiny; long; int } -> offsets 0, 8, 16; total 24 (align 8).
        let engine = LayoutEngine::new();
        let (offsets, total, align) = engine.struct_layout(&[tiny(), long(), int()]);
        assert_eq!(offsets, vec![0, 8, 16]);
        assert_eq!(total, 24);
        assert_eq!(align, 8);
    }

    #[test]
    fn named_struct_lookup() {
        let mut engine = LayoutEngine::new();
        engine.add_struct("Point", vec![int(), int()]);
        assert_eq!(engine.size_of(&Type::named("Point")), 8);
        assert_eq!(engine.align_of(&Type::named("Point")), 4);
    }

    #[test]
    fn plain_enum_is_int32() {
        let mut engine = LayoutEngine::new();
        engine.add_enum("Color", vec![vec![], vec![], vec![]]);
        assert_eq!(engine.size_of(&Type::named("Color")), 4);
        assert_eq!(engine.align_of(&Type::named("Color")), 4);
    }

    #[test]
    fn tagged_union_layout_rules() {
        // E { A(long), B } -> tag 4, pad to 8, payload 8 -> 16 total, align 8.
        let mut engine = LayoutEngine::new();
        engine.add_enum("E", vec![vec![long()], vec![]]);
        assert_eq!(engine.size_of(&Type::named("E")), 16);
        assert_eq!(engine.align_of(&Type::named("E")), 8);

        // Int payload: tag 4 + payload 4 -> 8 total, align 4.
        engine.add_enum("F", vec![vec![int()], vec![]]);
        assert_eq!(engine.size_of(&Type::named("F")), 8);
        assert_eq!(engine.align_of(&Type::named("F")), 4);
    }

    #[test]
    fn fixed_array_and_slice() {
        let engine = LayoutEngine::new();
        let arr = Type::new(
            TypeKind::Array {
                elem: Box::new(int()),
                size: Some(ArraySize::Literal(5)),
            },
            cm_common::Span::dummy(),
        );
        assert_eq!(engine.size_of(&arr), 20);
        assert_eq!(engine.align_of(&arr), 4);

        let slice = Type::new(
            TypeKind::Array {
                elem: Box::new(int()),
                size: None,
            },
            cm_common::Span::dummy(),
        );
        assert_eq!(engine.size_of(&slice), 16);
    }

    #[test]
    fn unknown_type_falls_back_to_pointer_size() {
        let engine = LayoutEngine::new();
        assert_eq!(engine.size_of(&Type::named("T")), 8);
    }

    #[test]
    fn recursive_struct_does_not_loop() {
        let mut engine = LayoutEngine::new();
        engine.add_struct("Node", vec![Type::named("Node"), int()]);
        // The cycle falls back to pointer size for the inner reference.
        assert_eq!(engine.size_of(&Type::named("Node")), 16);
    }

    #[test]
    fn typedef_resolution() {
        let mut engine = LayoutEngine::new();
        engine.add_typedef("Id", long());
        assert_eq!(engine.size_of(&Type::named("Id")), 8);
    }
}
