//! Etymology lookups backed by a text model, with illustrations and stock
//! photos that always resolve to something displayable.

pub mod config;
pub mod error;
pub mod fallback;
pub mod model;
pub mod normalize;
pub mod prompt;
pub mod screen;

#[cfg(feature = "web")]
pub mod service;
#[cfg(feature = "web")]
mod session;
#[cfg(feature = "web")]
pub mod upstream;
#[cfg(feature = "web")]
pub mod web;

pub use config::{CredentialStatus, RetryPolicy, ServiceConfig};
pub use error::ServiceError;
pub use model::{
    Attribution, EtymologyAnalysis, EtymologyResult, FallbackReason, GeneratedImage, ImageResult,
    Morphology, Origin, RelatedWord,
};
pub use normalize::normalize;
pub use screen::{NavigationError, Screen, ScreenRouter, Transition};

#[cfg(feature = "web")]
pub use service::EtymologyService;
