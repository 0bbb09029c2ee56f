pub mod multimap;
pub mod patch_table;

pub use multimap::MultiMap;
pub use patch_table::PatchTable;
