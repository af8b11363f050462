// Basic entity mappings on database tables
// (should be mostly 1:1 copies of our schema and helpers).
pub mod file_history;
pub use self::file_history::FileHistory;
pub mod file_id_lookup;
pub use self::file_id_lookup::FileIdLookup;
pub mod handled_event;
pub use self::handled_event::HandledEvent;
pub mod managed_file;
pub use self::managed_file::ManagedFile;
pub mod patch_operation;
pub use self::patch_operation::PatchOperation;
pub mod user;
pub use self::user::User;
