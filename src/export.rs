//! PKCS#12 export of an issued certificate and its private key
//!
//! The portal sometimes returns a bare base64 certificate body. Such content
//! is re-wrapped into 64-column PEM before decoding.
//!
//! Private keys are decoded by trying candidate schemes in a fixed order and
//! keeping the first success:
//! - `EC PRIVATE KEY` blocks: SEC1 EC only
//! - any other block: PKCS#1 RSA, then PKCS#8

use crate::error::{PortalError, Result};
use openssl::ec::EcKey;
use openssl::error::ErrorStack;
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::x509::X509;
use std::borrow::Cow;

const PEM_PREFIX: &str = "-----BEGIN";
const CERTIFICATE_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const CERTIFICATE_END: &str = "-----END CERTIFICATE-----";
const PEM_LINE_WIDTH: usize = 64;
const EC_PRIVATE_KEY_TAG: &str = "EC PRIVATE KEY";

type KeyDecoder = fn(&[u8]) -> std::result::Result<PKey<Private>, ErrorStack>;

const EC_DECODERS: &[(&str, KeyDecoder)] = &[("SEC1 EC", decode_ec)];
const RSA_OR_GENERIC_DECODERS: &[(&str, KeyDecoder)] =
    &[("PKCS#1", decode_pkcs1), ("PKCS#8", decode_pkcs8)];

fn decode_ec(der: &[u8]) -> std::result::Result<PKey<Private>, ErrorStack> {
    EcKey::private_key_from_der(der).and_then(PKey::from_ec_key)
}

fn decode_pkcs1(der: &[u8]) -> std::result::Result<PKey<Private>, ErrorStack> {
    Rsa::private_key_from_der(der).and_then(PKey::from_rsa)
}

fn decode_pkcs8(der: &[u8]) -> std::result::Result<PKey<Private>, ErrorStack> {
    PKey::private_key_from_pkcs8(der)
}

fn decoders_for(tag: &str) -> &'static [(&'static str, KeyDecoder)] {
    if tag == EC_PRIVATE_KEY_TAG {
        EC_DECODERS
    } else {
        RSA_OR_GENERIC_DECODERS
    }
}

/// Return `content` as PEM, wrapping bare base64 between certificate markers.
#[must_use]
pub fn normalize_certificate_pem(content: &str) -> Cow<'_, str> {
    if content.trim_start().starts_with(PEM_PREFIX) {
        return Cow::Borrowed(content);
    }

    let body: Vec<char> = content.chars().filter(|c| !c.is_whitespace()).collect();
    let mut pem = String::with_capacity(body.len() + body.len() / PEM_LINE_WIDTH + 64);
    pem.push_str(CERTIFICATE_BEGIN);
    pem.push('\n');
    for line in body.chunks(PEM_LINE_WIDTH) {
        pem.extend(line);
        pem.push('\n');
    }
    pem.push_str(CERTIFICATE_END);
    pem.push('\n');
    Cow::Owned(pem)
}

/// Decode certificate content (PEM or bare base64) into an X.509 certificate.
pub fn decode_certificate(content: &str) -> Result<X509> {
    let normalized = normalize_certificate_pem(content);
    let block = ::pem::parse(normalized.as_bytes())
        .map_err(|e| PortalError::Decode(format!("error decoding certificate: {e}")))?;
    X509::from_der(block.contents())
        .map_err(|e| PortalError::Decode(format!("certificate is not valid X.509 DER: {e}")))
}

/// Decode a PEM private key into a native key object.
pub fn parse_private_key(private_key_pem: &str) -> Result<PKey<Private>> {
    let block = ::pem::parse(private_key_pem.as_bytes())
        .map_err(|e| PortalError::Decode(format!("error decoding private key: {e}")))?;

    let mut failures = Vec::new();
    for (scheme, decode) in decoders_for(block.tag()) {
        match decode(block.contents()) {
            Ok(key) => {
                tracing::debug!(scheme, tag = block.tag(), "private key decoded");
                return Ok(key);
            }
            Err(e) => failures.push(format!("{scheme}: {e}")),
        }
    }
    Err(PortalError::KeyParse(failures.join("; ")))
}

/// Bundle a certificate and its private key into a password-protected PKCS#12
/// archive. The friendly name is taken from the certificate's common name.
pub fn export_pkcs12(
    cert_content: &str,
    private_key_pem: &str,
    password: &str,
) -> Result<Vec<u8>> {
    export_pkcs12_named(cert_content, private_key_pem, password, None)
}

/// Like [`export_pkcs12`], with an explicit friendly name.
pub fn export_pkcs12_named(
    cert_content: &str,
    private_key_pem: &str,
    password: &str,
    friendly_name: Option<&str>,
) -> Result<Vec<u8>> {
    let cert = decode_certificate(cert_content)?;
    let key = parse_private_key(private_key_pem)?;

    let cert_key = cert
        .public_key()
        .map_err(|e| PortalError::Packaging(format!("certificate public key unreadable: {e}")))?;
    if !cert_key.public_eq(&key) {
        return Err(PortalError::Packaging(
            "private key does not match the certificate".to_string(),
        ));
    }

    let name = friendly_name.map(str::to_string).or_else(|| common_name(&cert));

    let mut builder = Pkcs12::builder();
    builder.pkey(&key).cert(&cert);
    if let Some(name) = &name {
        builder.name(name);
    }
    let archive = builder
        .build2(password)
        .map_err(|e| PortalError::Packaging(e.to_string()))?;
    archive
        .to_der()
        .map_err(|e| PortalError::Packaging(e.to_string()))
}

fn common_name(cert: &X509) -> Option<String> {
    cert.subject_name()
        .entries_by_nid(Nid::COMMONNAME)
        .next()
        .and_then(|entry| entry.data().as_utf8().ok())
        .map(|cn| cn.to_string())
}
