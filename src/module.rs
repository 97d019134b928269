//! WebAssembly module reader.
//!
//! Pulls out the three things the report needs from the bytecode: the
//! function name table, the number of imported functions (imports occupy
//! the low global function indices) and the declared locals of each code
//! body.

use std::fmt;

use wasmparser::{ExternalKind, KnownCustom, Name, Parser, Payload, RefType, TypeRef, ValType};

use crate::symbols::FunctionNames;

/// Errors raised while reading a module
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    /// The bytes are not a well-formed module
    #[error("{0}")]
    Parse(#[from] wasmparser::BinaryReaderError),
}

/// A run of locals of one type, as declared in a code body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDecl {
    pub count: u32,
    /// Wasm type name, e.g. `i32`
    pub ty: String,
}

impl fmt::Display for LocalDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x{}", self.ty, self.count)
    }
}

/// One entry of the code section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBody {
    /// Size of the body in the module, in bytes
    pub body_size: usize,
    pub locals: Vec<LocalDecl>,
}

/// What the report needs to know about the bytecode module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleInfo {
    pub function_names: FunctionNames,
    /// Number of imported functions
    pub import_count: u32,
    /// Code bodies in code section order
    pub bodies: Vec<CodeBody>,
}

impl ModuleInfo {
    /// Parse a binary module.
    ///
    /// Names come from the `name` custom section; exported functions fill
    /// the indices it does not cover.
    pub fn parse(bytes: &[u8]) -> Result<Self, ModuleError> {
        let mut info = ModuleInfo::default();
        let mut export_names = Vec::new();

        for payload in Parser::new(0).parse_all(bytes) {
            match payload? {
                Payload::ImportSection(reader) => {
                    for import in reader {
                        if let TypeRef::Func(_) = import?.ty {
                            info.import_count += 1;
                        }
                    }
                }
                Payload::ExportSection(reader) => {
                    for export in reader {
                        let export = export?;
                        if matches!(export.kind, ExternalKind::Func) {
                            export_names.push((export.index, export.name.to_string()));
                        }
                    }
                }
                Payload::CodeSectionEntry(body) => {
                    let mut locals = Vec::new();
                    for local in body.get_locals_reader()? {
                        let (count, ty) = local?;
                        locals.push(LocalDecl {
                            count,
                            ty: type_name(ty),
                        });
                    }
                    info.bodies.push(CodeBody {
                        body_size: body.range().len(),
                        locals,
                    });
                }
                Payload::CustomSection(reader) => {
                    if let KnownCustom::Name(names) = reader.as_known() {
                        for subsection in names {
                            if let Name::Function(map) = subsection? {
                                for naming in map {
                                    let naming = naming?;
                                    info.function_names
                                        .insert(naming.index, naming.name.to_string());
                                }
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        for (index, name) in export_names {
            info.function_names.entry(index).or_insert(name);
        }

        log::debug!(
            "module: {} imported functions, {} code bodies, {} names",
            info.import_count,
            info.bodies.len(),
            info.function_names.len()
        );
        Ok(info)
    }

    /// Code body index for a global function index, if it names a local function.
    pub fn body_index(&self, function_index: u32) -> Option<usize> {
        function_index
            .checked_sub(self.import_count)
            .map(|i| i as usize)
    }

    /// Code body for a global function index.
    ///
    /// `None` for imported functions and indices past the code section.
    pub fn body_for(&self, function_index: u32) -> Option<&CodeBody> {
        self.bodies.get(self.body_index(function_index)?)
    }
}

fn type_name(ty: ValType) -> String {
    match ty {
        ValType::I32 => "i32".to_string(),
        ValType::I64 => "i64".to_string(),
        ValType::F32 => "f32".to_string(),
        ValType::F64 => "f64".to_string(),
        ValType::V128 => "v128".to_string(),
        ValType::Ref(r) if r == RefType::FUNCREF => "funcref".to_string(),
        ValType::Ref(r) if r == RefType::EXTERNREF => "externref".to_string(),
        ValType::Ref(r) => format!("{:?}", r),
    }
}
