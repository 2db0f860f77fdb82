mod client;
mod routes;

pub use client::{Classifier, ClassifyError, DEFAULT_CATEGORY};
pub use routes::router;

#[cfg(test)]
pub use client::testing;
