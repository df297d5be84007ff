pub mod allocation_db;
pub mod db;
pub mod proxy_db;
pub mod work_db;

pub use db::Store;
