//! Domain and path services
//!
//! Both services are traits so strategies can be handed alternative
//! implementations; the defaults render templates through the shared
//! [`template`] cache.

pub mod domain;
pub mod path;
pub mod template;
pub mod validation;

pub use domain::{DefaultDomainService, DomainError, DomainService};
pub use path::{DefaultPathService, PathError, PathService};
pub use template::TemplateError;
