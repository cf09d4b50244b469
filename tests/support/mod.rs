//! Shared helpers: an in-memory portal channel and a throwaway issuing CA.

#![allow(dead_code)]

use devportal_certs::{PortalError, Result, RpcChannel, RpcRequest, RpcResponse};
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::PKey;
use openssl::rsa::Rsa;
use openssl::x509::{X509, X509Builder, X509NameBuilder, X509Req};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Records every request and answers with queued responses in order.
#[derive(Default)]
pub struct MockChannel {
    responses: Mutex<VecDeque<RpcResponse>>,
    requests: Mutex<Vec<RpcRequest>>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, status: u16, body: impl Into<Vec<u8>>) -> Self {
        self.responses.lock().unwrap().push_back(RpcResponse {
            status,
            body: body.into(),
        });
        self
    }

    pub fn respond_json(self, status: u16, body: serde_json::Value) -> Self {
        self.respond(status, serde_json::to_vec(&body).unwrap())
    }

    pub fn requests(&self) -> Vec<RpcRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> RpcRequest {
        self.requests
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no request was sent")
    }
}

impl RpcChannel for MockChannel {
    async fn send(&self, request: RpcRequest) -> Result<RpcResponse> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| PortalError::Transport("connection refused".to_string()))
    }
}

pub fn body_json(request: &RpcRequest) -> serde_json::Value {
    serde_json::from_slice(&request.body).unwrap()
}

pub fn header<'a>(request: &'a RpcRequest, name: &str) -> Option<&'a str> {
    request.headers.get(name).and_then(|v| v.to_str().ok())
}

/// Sign a CSR with a freshly generated CA key, as the portal would.
pub fn issue_certificate(csr_pem: &str) -> X509 {
    let request = X509Req::from_pem(csr_pem.as_bytes()).unwrap();
    let ca_key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();

    let mut issuer = X509NameBuilder::new().unwrap();
    issuer
        .append_entry_by_nid(Nid::COMMONNAME, "Test Portal CA")
        .unwrap();
    let issuer = issuer.build();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(0x5eed).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(request.subject_name()).unwrap();
    builder.set_issuer_name(&issuer).unwrap();
    builder.set_pubkey(&request.public_key().unwrap()).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(365).unwrap())
        .unwrap();
    builder.sign(&ca_key, MessageDigest::sha256()).unwrap();
    builder.build()
}
