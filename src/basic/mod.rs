//! Shared building blocks of the toolchain: the session-interned
//! identifier table, the insertion-ordered containers used by grammar
//! modules and AST maps, the runtime type registry, and source
//! locations.
mod ident_table;
mod named_map;
mod source_location;
mod type_registry;

pub use self::ident_table::*;
pub use self::named_map::*;
pub use self::source_location::*;
pub use self::type_registry::*;
