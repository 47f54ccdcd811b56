mod compiler;
mod database;

pub use compiler::{
    builtin_def_database, compile_def_database, load_def_database, ContentCompileError,
    ContentErrorCode, SourceLocation, BUILTIN_DEFS_PATH,
};
pub use database::{BuildingArchetype, DefDatabase, ResourceArchetype, UnitArchetype};
