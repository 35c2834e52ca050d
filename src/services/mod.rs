pub mod evolution;
pub mod green_api;
pub mod pg_store;
pub mod provider;
pub mod relay;
pub mod rest_store;
pub mod store;

pub use evolution::*;
pub use green_api::*;
pub use pg_store::*;
pub use provider::*;
pub use relay::*;
pub use rest_store::*;
pub use store::*;
