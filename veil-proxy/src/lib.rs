pub mod pipeline;
pub mod request;
pub mod upstream;

pub use pipeline::{Pipeline, ProxyResponse};
pub use request::ObservedRequest;
pub use upstream::{UpstreamApi, UpstreamClient, UpstreamResponse};
