pub mod changes;
pub mod db;
pub mod error;
pub mod model;
pub mod ops;
pub mod output;
pub mod paths;
pub mod progress;
pub mod sync;
pub mod timer;
pub mod validate;
pub mod watch;
