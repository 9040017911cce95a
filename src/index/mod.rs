pub mod entry;
pub mod index;
pub mod cursor;
pub mod system;
