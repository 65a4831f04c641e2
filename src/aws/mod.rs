//! Signed AWS transport: credentials, SigV4 HTTP client and retry policy

pub mod client;
pub mod credentials;
pub mod http;
pub mod retry;

pub use client::{AwsClients, SessionSettings};
pub use credentials::{AssumeRoleConfig, Credentials};
pub use http::{AwsHttpClient, RequestError};
pub use retry::RetryPolicy;
