//! Asset storage: keyed lookup returning a validity flag plus byte content.
//!
//! Shader sources (`.vert`/`.frag`/`.comp`) are compiled from GLSL to
//! SPIR-V with shaderc when loaded, so consumers always receive ready
//! byte code. Everything else is returned as raw bytes.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use log::error;

/// Result of an asset lookup. Invalid handles carry no content.
pub struct AssetHandle {
    content: Option<Vec<u8>>,
}

impl AssetHandle {
    fn valid(content: Vec<u8>) -> Self {
        Self {
            content: Some(content),
        }
    }

    fn invalid() -> Self {
        Self { content: None }
    }

    pub fn is_valid(&self) -> bool {
        self.content.is_some()
    }

    pub fn content(&self) -> &[u8] {
        self.content.as_deref().unwrap_or(&[])
    }
}

/// File-backed storage with an in-memory overlay. In-memory entries take
/// priority and are returned byte-for-byte, without compilation.
pub struct AssetStorage {
    root: PathBuf,
    memory: HashMap<String, Vec<u8>>,
}

impl AssetStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            memory: HashMap::new(),
        }
    }

    /// Registers an in-memory asset under `identifier`.
    pub fn insert(&mut self, identifier: impl Into<String>, content: Vec<u8>) {
        self.memory.insert(identifier.into(), content);
    }

    /// Looks an asset up by identifier. Failures (missing file, shader
    /// compile error) yield an invalid handle; they never panic.
    pub fn get(&self, identifier: &str) -> AssetHandle {
        if let Some(content) = self.memory.get(identifier) {
            return AssetHandle::valid(content.clone());
        }

        let path = self.root.join(identifier);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Failed to read asset {}: {}", path.display(), e);
                return AssetHandle::invalid();
            }
        };

        match shader_kind(&path) {
            Some(kind) => {
                let source = match String::from_utf8(bytes) {
                    Ok(source) => source,
                    Err(e) => {
                        error!("Shader source {} is not UTF-8: {}", path.display(), e);
                        return AssetHandle::invalid();
                    }
                };
                match compile_shader(&source, identifier, kind) {
                    Ok(spirv) => AssetHandle::valid(spirv),
                    Err(e) => {
                        error!("Failed to compile shader {}: {}", identifier, e);
                        AssetHandle::invalid()
                    }
                }
            }
            None => AssetHandle::valid(bytes),
        }
    }
}

fn shader_kind(path: &Path) -> Option<shaderc::ShaderKind> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("vert") => Some(shaderc::ShaderKind::Vertex),
        Some("frag") => Some(shaderc::ShaderKind::Fragment),
        Some("comp") => Some(shaderc::ShaderKind::Compute),
        _ => None,
    }
}

/// Compiles GLSL to SPIR-V byte code.
fn compile_shader(source: &str, name: &str, kind: shaderc::ShaderKind) -> Result<Vec<u8>> {
    let mut compiler =
        shaderc::Compiler::new().ok_or_else(|| anyhow!("Failed to create shader compiler"))?;
    let binary = compiler.compile_into_spirv(source, kind, name, "main", None)?;
    Ok(binary.as_binary_u8().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_assets_round_trip() {
        let mut storage = AssetStorage::new("does-not-exist");
        storage.insert("blob.bin", vec![1, 2, 3, 4]);

        let handle = storage.get("blob.bin");
        assert!(handle.is_valid());
        assert_eq!(handle.content(), &[1, 2, 3, 4]);
    }

    #[test]
    fn missing_assets_are_invalid() {
        let storage = AssetStorage::new("does-not-exist");
        let handle = storage.get("nothing-here.spv");
        assert!(!handle.is_valid());
        assert!(handle.content().is_empty());
    }

    #[test]
    fn glsl_compiles_to_word_aligned_spirv() {
        let source = "#version 450\nvoid main() { gl_Position = vec4(0.0); }\n";
        let spirv = compile_shader(source, "test.vert", shaderc::ShaderKind::Vertex)
            .expect("trivial shader should compile");
        assert!(!spirv.is_empty());
        assert_eq!(spirv.len() % 4, 0);
    }

    #[test]
    fn broken_glsl_reports_error() {
        let source = "#version 450\nvoid main() { this is not glsl }\n";
        assert!(compile_shader(source, "broken.vert", shaderc::ShaderKind::Vertex).is_err());
    }
}
