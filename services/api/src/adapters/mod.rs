pub mod blob;
pub mod db;

pub use blob::LocalBlobAdapter;
pub use db::DbAdapter;
