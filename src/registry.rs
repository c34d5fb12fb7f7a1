//! Closed name tables for everything a run configuration selects by string.
//!
//! Each registry enum parses through a single `(name, variant)` table, both
//! from the CLI (`FromStr`) and from the JSON config (`serde(try_from)`), so
//! an unknown name is a `Error::Config` at load time and never later.

/// Declares `FromStr`, `Display`, `TryFrom<String>` and `Into<String>` for a
/// fieldless enum from a `name => Variant` table.
macro_rules! name_registry {
    ($ty:ident, $what:literal, { $($name:literal => $variant:ident),+ $(,)? }) => {
        impl $ty {
            pub const NAMES: &'static [&'static str] = &[$($name),+];

            pub fn name(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name,)+
                }
            }
        }

        impl std::str::FromStr for $ty {
            type Err = crate::error::Error;

            fn from_str(s: &str) -> crate::error::Result<Self> {
                match s {
                    $($name => Ok($ty::$variant),)+
                    other => Err(crate::error::Error::Config(format!(
                        "no {} named {:?} (expected one of {:?})",
                        $what,
                        other,
                        $ty::NAMES
                    ))),
                }
            }
        }

        impl TryFrom<String> for $ty {
            type Error = crate::error::Error;

            fn try_from(s: String) -> crate::error::Result<Self> {
                s.parse()
            }
        }

        impl From<$ty> for String {
            fn from(v: $ty) -> String {
                v.name().to_string()
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

pub(crate) use name_registry;
