pub mod config;
pub mod error;
pub mod param;
pub mod swagger;
pub mod synonyms;
pub mod user;

pub use config::VeilConfig;
pub use error::ProxyError;
pub use param::{ParamField, Parameter};
pub use swagger::SwaggerDoc;
pub use synonyms::SynonymTable;
pub use user::{UpstreamUser, UserRecord};
