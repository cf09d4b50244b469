//! Developer-portal certificate lifecycle client
//!
//! - [`csr`] generates an RSA keypair and a signed certificate request
//! - [`certificates`] creates, lists and deletes certificates on the portal
//! - [`export`] bundles an issued certificate and its key into PKCS#12
//!
//! The portal is reached through an [`RpcChannel`]; [`HttpChannel`] is the
//! `reqwest` implementation used in production.

#[macro_use]
pub mod output;

pub mod certificates;
pub mod channel;
pub mod config;
pub mod csr;
pub mod error;
pub mod export;

// Re-export common types
pub use certificates::{CertificateClient, CertificateRecord, build_search_query};
pub use channel::{HttpChannel, RequestHeaders, RpcChannel, RpcRequest, RpcResponse};
pub use config::{CertificateType, ClientConfig};
pub use csr::{SigningRequest, Subject, generate_signing_request};
pub use error::{PortalError, Result};
pub use export::{export_pkcs12, export_pkcs12_named, normalize_certificate_pem};
