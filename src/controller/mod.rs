//! Controller-side allocation pipeline (spec component C9).

pub mod driver;
pub mod grpc;
pub mod reconcile;

pub use driver::{Driver, KubeDriver};
pub use grpc::ControllerService;
