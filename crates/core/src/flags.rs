//! Per-module permission and dump/debug flags (spec.md §4.5, §6).

use crate::macros::bitflags_like;

bitflags_like! {
    /// Declarative per-module permission bits (spec.md §4.5). Inherited
    /// from importer to importee; `import()` itself requires `IMPORT`.
    pub struct Permission: u8 {
        const FREAD = 0b0_0001;
        const FWRITE = 0b0_0010;
        const NETWORK = 0b0_0100;
        const FFICALL = 0b0_1000;
        const IMPORT = 0b1_0000;
    }
}

impl Permission {
    pub fn all() -> Self {
        Permission::all_of(&[
            Permission::FREAD,
            Permission::FWRITE,
            Permission::NETWORK,
            Permission::FFICALL,
            Permission::IMPORT,
        ])
    }
}

bitflags_like! {
    /// Host-controlled toggles for a single compile-and-run invocation
    /// (spec.md §6): which structured dumps to produce, whether to run the
    /// emitted program at all, and whether to attach the debugger hooks.
    pub struct ModuleFlags: u16 {
        const DUMP_TTREE = 0b000_0001;
        const DUMP_AST = 0b000_0010;
        const DUMP_IR = 0b000_0100;
        const DUMP_EXE = 0b000_1000;
        const DUMP_DEFTABLE = 0b001_0000;
        const NO_EXECUTION = 0b010_0000;
        const DEBUG = 0b100_0000;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_union_and_contains() {
        let p = Permission::FREAD | Permission::IMPORT;
        assert!(p.contains(Permission::FREAD));
        assert!(p.contains(Permission::IMPORT));
        assert!(!p.contains(Permission::NETWORK));
    }

    #[test]
    fn permission_all_contains_every_bit() {
        let all = Permission::all();
        assert!(all.contains(Permission::FREAD));
        assert!(all.contains(Permission::FWRITE));
        assert!(all.contains(Permission::NETWORK));
        assert!(all.contains(Permission::FFICALL));
        assert!(all.contains(Permission::IMPORT));
    }

    #[test]
    fn module_flags_are_independent_bits() {
        let f = ModuleFlags::DUMP_AST | ModuleFlags::DEBUG;
        assert!(f.contains(ModuleFlags::DUMP_AST));
        assert!(f.contains(ModuleFlags::DEBUG));
        assert!(!f.contains(ModuleFlags::DUMP_IR));
    }
}
