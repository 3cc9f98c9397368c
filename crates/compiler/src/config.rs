//! Host-configurable compile-and-run options (SPEC_FULL.md §1.3), grounded
//! on the teacher's `CompilerConfig` builder (`config.rs`): search paths
//! beyond the stdlib default resolution (spec.md §6), the initial
//! permission grant for the root module, and which structured dumps /
//! execution toggles (`ModuleFlags`) apply to one invocation. This is a
//! library entry point and not only a CLI, so these settings can't live
//! purely as in-source pragmas the way the teacher's dump flags do.

use std::path::PathBuf;

use via_core::{ModuleFlags, Permission};

/// Builder-style configuration for one [`crate::engine::Engine`] (mirrors
/// `CompilerConfig::new().with_builtin(...)` exactly).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Extra roots searched before the §6 stdlib default cascade.
    pub search_paths: Vec<PathBuf>,
    /// Granted to the root module; imported modules inherit it verbatim
    /// (spec.md §4.5).
    pub root_permissions: Permission,
    pub flags: ModuleFlags,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            search_paths: Vec::new(),
            root_permissions: Permission::all(),
            flags: ModuleFlags::empty(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        EngineConfig::default()
    }

    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    pub fn with_search_paths(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.search_paths.extend(paths);
        self
    }

    pub fn with_permissions(mut self, permissions: Permission) -> Self {
        self.root_permissions = permissions;
        self
    }

    pub fn with_flags(mut self, flags: ModuleFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn dump_ast(&self) -> bool {
        self.flags.contains(ModuleFlags::DUMP_AST)
    }

    pub fn dump_ir(&self) -> bool {
        self.flags.contains(ModuleFlags::DUMP_IR)
    }

    pub fn dump_exe(&self) -> bool {
        self.flags.contains(ModuleFlags::DUMP_EXE)
    }

    pub fn dump_deftable(&self) -> bool {
        self.flags.contains(ModuleFlags::DUMP_DEFTABLE)
    }

    pub fn no_execution(&self) -> bool {
        self.flags.contains(ModuleFlags::NO_EXECUTION)
    }

    pub fn debug(&self) -> bool {
        self.flags.contains(ModuleFlags::DEBUG)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_grants_full_root_permissions() {
        let config = EngineConfig::default();
        assert_eq!(config.root_permissions, Permission::all());
        assert!(config.search_paths.is_empty());
    }

    #[test]
    fn builder_accumulates_search_paths() {
        let config = EngineConfig::new().with_search_path("/a").with_search_path("/b");
        assert_eq!(config.search_paths, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
    }

    #[test]
    fn flags_builder_is_queryable() {
        let config = EngineConfig::new().with_flags(ModuleFlags::DUMP_IR | ModuleFlags::DEBUG);
        assert!(config.dump_ir());
        assert!(config.debug());
        assert!(!config.dump_ast());
    }
}
