//! Reading identity and validity details out of issued certificates.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use x509_parser::pem::parse_x509_pem;

const PEM_BEGIN: &[u8] = b"-----BEGIN CERTIFICATE-----";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertInfo {
    pub subject: String,
    pub issuer: String,
    pub serial: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub sha256_fingerprint: String,
}

/// Validity of a certificate relative to a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExpiryStatus {
    Valid,
    ExpiringSoon,
    Expired,
}

impl ExpiryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpiryStatus::Valid => "valid",
            ExpiryStatus::ExpiringSoon => "expiring soon",
            ExpiryStatus::Expired => "expired",
        }
    }
}

impl CertInfo {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.not_after <= now
    }

    /// Not yet expired, but will be within `window`.
    pub fn expires_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        !self.is_expired(now) && self.not_after - now <= window
    }

    pub fn status(&self, now: DateTime<Utc>, soon: Duration) -> ExpiryStatus {
        if self.is_expired(now) {
            ExpiryStatus::Expired
        } else if self.expires_within(now, soon) {
            ExpiryStatus::ExpiringSoon
        } else {
            ExpiryStatus::Valid
        }
    }
}

pub fn read(path: &Path) -> Result<CertInfo> {
    let data = fs::read(path).with_context(|| format!("read certificate {}", path.display()))?;
    parse_pem(&data).with_context(|| format!("parse certificate {}", path.display()))
}

/// Parse the first PEM certificate in `data`. Leading text (as written by easy-rsa) is skipped.
pub fn parse_pem(data: &[u8]) -> Result<CertInfo> {
    let start = data
        .windows(PEM_BEGIN.len())
        .position(|w| w == PEM_BEGIN)
        .ok_or_else(|| anyhow!("no PEM certificate block found"))?;
    let (_, pem) =
        parse_x509_pem(&data[start..]).map_err(|e| anyhow!("decode PEM: {:?}", e))?;
    let x509 = pem
        .parse_x509()
        .map_err(|e| anyhow!("decode X.509: {:?}", e))?;

    let validity = x509.validity();
    let not_before = to_utc(validity.not_before.timestamp())?;
    let not_after = to_utc(validity.not_after.timestamp())?;

    Ok(CertInfo {
        subject: x509.subject().to_string(),
        issuer: x509.issuer().to_string(),
        serial: x509.raw_serial_as_string().to_uppercase(),
        not_before,
        not_after,
        sha256_fingerprint: fingerprint(&pem.contents),
    })
}

fn to_utc(ts: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0).ok_or_else(|| anyhow!("timestamp {} out of range", ts))
}

fn fingerprint(der: &[u8]) -> String {
    Sha256::digest(der)
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Self-signed PEM certificate valid from 2020-01-01 until `not_after`, plus its key.
#[cfg(test)]
pub(crate) fn test_cert(cn: &str, not_after: (i32, u8, u8)) -> (String, String) {
    let mut params = rcgen::CertificateParams::new(vec![cn.to_string()]).unwrap();
    params
        .distinguished_name
        .push(rcgen::DnType::CommonName, cn);
    params.not_before = rcgen::date_time_ymd(2020, 1, 1);
    params.not_after = rcgen::date_time_ymd(not_after.0, not_after.1, not_after.2);
    let key = rcgen::KeyPair::generate().unwrap();
    let cert = params.self_signed(&key).unwrap();
    (cert.pem(), key.serialize_pem())
}
