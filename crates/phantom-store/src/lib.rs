pub mod file;
pub mod memory;
pub mod types;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use types::{load_json, save_json, Store};
