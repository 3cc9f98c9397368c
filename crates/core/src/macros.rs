//! Minimal `bitflags`-shaped helper, written out by hand so this crate does
//! not take on the `bitflags` dependency for a handful of small bit sets
//! (`Qualifiers`, `Permission`, `ModuleFlags`); the teacher pack has no
//! `bitflags` usage to ground a dependency pull on.
macro_rules! bitflags_like {
    (
        $(#[$meta:meta])*
        pub struct $name:ident: $ty:ty {
            $(const $variant:ident = $value:expr;)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name($ty);

        impl $name {
            $(pub const $variant: $name = $name($value);)*

            pub fn empty() -> Self {
                $name(0)
            }

            pub fn all_of(flags: &[$name]) -> Self {
                flags.iter().fold($name(0), |acc, f| acc.union(*f))
            }

            pub fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            pub fn union(self, other: Self) -> Self {
                $name(self.0 | other.0)
            }
        }

        impl std::ops::BitOr for $name {
            type Output = Self;
            fn bitor(self, rhs: Self) -> Self {
                self.union(rhs)
            }
        }
    };
}

pub(crate) use bitflags_like;
