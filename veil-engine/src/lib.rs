pub mod cache;
pub mod mixer;
pub mod permutations;
pub mod processor;
pub mod request;

pub use cache::MixerCache;
pub use mixer::{Mixer, MixerMeta, MixerOptions};
pub use processor::{
    CredentialInjector, PersonalFilter, RequestProcessor, ResultProcessor, ResultWrapper,
};
pub use request::UpstreamRequest;
