pub mod cells;
pub mod grants;
pub mod properties;
pub mod sheets;
