//! Program Library
//!
//! WGSL programs are embedded in the binary with `rust-embed` and looked up
//! by name (`prefilter_ggx` loads `prefilter_ggx.wgsl`). In debug builds a
//! file on disk under `src/renderer/shaders` takes precedence, so shaders can
//! be edited without a rebuild.

use std::borrow::Cow;

use rust_embed::RustEmbed;

use crate::errors::{PrefilterError, Result};
use crate::renderer::ProgramPass;

#[cfg(debug_assertions)]
const SHADER_DIR: &str = "src/renderer/shaders";

#[derive(RustEmbed)]
#[folder = "src/renderer/shaders"]
struct ShaderAssets;

/// Vertex entry point shared by every program.
pub const VERTEX_ENTRY_POINT: &str = "vs_main";

/// Name of the mip blit program.
pub const BLIT_PROGRAM: &str = "blit";

/// A program source with a verified fragment entry point.
#[derive(Debug, Clone)]
pub struct ResolvedProgram {
    pub name: String,
    pub entry_point: &'static str,
    pub source: Cow<'static, str>,
}

/// Lookup of embedded WGSL programs.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProgramLibrary;

impl ProgramLibrary {
    fn file_name(name: &str) -> Cow<'_, str> {
        if std::path::Path::new(name)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("wgsl"))
        {
            Cow::Borrowed(name)
        } else {
            Cow::Owned(format!("{name}.wgsl"))
        }
    }

    /// Raw WGSL of a program, if it exists.
    #[must_use]
    pub fn source(name: &str) -> Option<Cow<'static, str>> {
        let file_name = Self::file_name(name);

        #[cfg(debug_assertions)]
        {
            let path = std::path::Path::new(SHADER_DIR).join(file_name.as_ref());
            if let Ok(source) = std::fs::read_to_string(&path) {
                return Some(Cow::Owned(source));
            }
        }

        let file = ShaderAssets::get(file_name.as_ref())?;
        match file.data {
            Cow::Borrowed(bytes) => std::str::from_utf8(bytes).ok().map(Cow::Borrowed),
            Cow::Owned(bytes) => String::from_utf8(bytes).ok().map(Cow::Owned),
        }
    }

    /// Resolves a program and checks that it defines the entry point of `pass`.
    pub fn resolve(name: &str, pass: ProgramPass) -> Result<ResolvedProgram> {
        let entry_point = pass.entry_point();
        let not_found = || PrefilterError::ShaderResolution {
            program: name.to_string(),
            entry_point: entry_point.to_string(),
        };

        let source = Self::source(name).ok_or_else(not_found)?;
        if !defines_entry_point(&source, entry_point) {
            return Err(not_found());
        }

        log::debug!("Resolved program {name} (pass {}, {entry_point})", pass.index());
        Ok(ResolvedProgram {
            name: name.to_string(),
            entry_point,
            source,
        })
    }
}

fn defines_entry_point(source: &str, entry_point: &str) -> bool {
    source.lines().any(|line| {
        line.trim_start()
            .strip_prefix("fn ")
            .and_then(|rest| rest.trim_start().strip_prefix(entry_point))
            .is_some_and(|rest| rest.trim_start().starts_with('('))
    })
}
