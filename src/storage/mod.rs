pub mod catalogue;
pub mod schema;
pub mod sqlite;
pub mod traits;
pub mod value;

pub use catalogue::{Catalogue, RunEntry};
pub use sqlite::{SqliteConnection, SqliteGateway};
pub use traits::{StorageGateway, StoreConnection};
pub use value::{row, Row, Value};
