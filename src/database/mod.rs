pub mod directory;
pub mod manager;
pub mod memory;
pub mod repository;
pub mod store;

pub use directory::{BusinessDirectory, StoreBusinessDirectory};
pub use manager::PgDocumentStore;
pub use memory::MemoryStore;
pub use repository::VersionedEntityStore;
pub use store::{within_deadline, Collection, Document, DocumentStore, StorageError, ID_FIELD};
