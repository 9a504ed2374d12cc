//! Minimal blocking client for S3-compatible object storage.
//!
//! Speaks just enough of the S3 REST API for rdc's needs: get/put/delete of
//! single objects and ListObjectsV2, with AWS Signature Version 4 signing.
//! Requests are path-style (`endpoint/bucket/key`) so the client works
//! against R2, MinIO and other compatible servers without DNS games.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::context::S3Settings;
use crate::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded SHA-256 of an empty body, used for GET and DELETE requests.
const EMPTY_PAYLOAD_HASH: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

pub struct S3Client {
    settings: S3Settings,
}

impl S3Client {
    pub fn new(settings: S3Settings) -> Self {
        Self { settings }
    }

    /// Bucket-relative key with the configured prefix applied.
    fn full_key(&self, key: &str) -> String {
        match self.settings.prefix.as_deref() {
            Some(prefix) if !prefix.is_empty() => {
                format!("{}/{}", prefix.trim_end_matches('/'), key)
            }
            _ => key.to_string(),
        }
    }

    /// Fetch an object's body. `Ok(None)` when the key does not exist.
    pub fn get_object(&self, key: &str) -> Result<Option<String>> {
        let key = self.full_key(key);
        match self.send("GET", &key, &[], None) {
            Ok(body) => Ok(Some(body)),
            Err(Error::Http(msg)) if msg.starts_with("404") => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Fetch and parse a JSON object. Parse failures are corruption, never
    /// silently an empty value.
    pub fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_object(key)? {
            None => Ok(None),
            Some(body) => serde_json::from_str(&body)
                .map(Some)
                .map_err(|e| Error::Corrupt(key.to_string(), e.to_string())),
        }
    }

    /// Write an object.
    pub fn put_object(&self, key: &str, body: &str) -> Result<()> {
        let key = self.full_key(key);
        self.send("PUT", &key, &[], Some(body))?;
        Ok(())
    }

    /// Serialize and write a JSON object.
    pub fn put_json<T: serde::Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.put_object(key, &serde_json::to_string_pretty(value)?)
    }

    /// Delete an object. S3 reports success even for absent keys, so
    /// callers that need not-found reporting check existence first.
    pub fn delete_object(&self, key: &str) -> Result<()> {
        let key = self.full_key(key);
        self.send("DELETE", &key, &[], None)?;
        Ok(())
    }

    /// List keys under a prefix (client prefix applied on top), with the
    /// configured prefix stripped back off the results.
    pub fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let full_prefix = self.full_key(prefix);
        let strip = match self.settings.prefix.as_deref() {
            Some(p) if !p.is_empty() => format!("{}/", p.trim_end_matches('/')),
            _ => String::new(),
        };

        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let mut query: Vec<(String, String)> = vec![
                ("list-type".to_string(), "2".to_string()),
                ("prefix".to_string(), full_prefix.clone()),
            ];
            if let Some(token) = &continuation {
                query.push(("continuation-token".to_string(), token.clone()));
            }
            let body = self.send("GET", "", &query, None)?;

            for key in extract_tags(&body, "Key") {
                keys.push(key.strip_prefix(&strip).unwrap_or(&key).to_string());
            }

            if extract_tags(&body, "IsTruncated").first().map(String::as_str) == Some("true") {
                continuation = extract_tags(&body, "NextContinuationToken").into_iter().next();
                if continuation.is_none() {
                    break;
                }
            } else {
                break;
            }
        }
        Ok(keys)
    }

    /// Cheap reachability/auth probe.
    pub fn verify(&self) -> Result<bool> {
        let query = vec![
            ("list-type".to_string(), "2".to_string()),
            ("max-keys".to_string(), "1".to_string()),
        ];
        match self.send("GET", "", &query, None) {
            Ok(_) => Ok(true),
            Err(Error::Http(msg)) if msg.starts_with("403") || msg.starts_with("401") => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Sign and send one request, returning the response body.
    fn send(
        &self,
        method: &str,
        key: &str,
        query: &[(String, String)],
        body: Option<&str>,
    ) -> Result<String> {
        let endpoint = self.settings.endpoint.trim_end_matches('/');
        let host = endpoint
            .strip_prefix("https://")
            .or_else(|| endpoint.strip_prefix("http://"))
            .unwrap_or(endpoint)
            .to_string();

        let canonical_uri = format!(
            "/{}/{}",
            uri_encode(&self.settings.bucket, false),
            uri_encode(key, false)
        );
        // Trailing slash from an empty key is fine for bucket-level requests.
        let canonical_uri = canonical_uri.trim_end_matches('/').to_string();
        let canonical_uri = if canonical_uri.is_empty() {
            "/".to_string()
        } else {
            canonical_uri
        };

        let mut sorted_query: Vec<(String, String)> = query.to_vec();
        sorted_query.sort();
        let canonical_query = sorted_query
            .iter()
            .map(|(k, v)| format!("{}={}", uri_encode(k, true), uri_encode(v, true)))
            .collect::<Vec<_>>()
            .join("&");

        let now = chrono::Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();

        let payload_hash = match body {
            Some(body) => hex::encode(Sha256::digest(body.as_bytes())),
            None => EMPTY_PAYLOAD_HASH.to_string(),
        };

        let canonical_headers = format!(
            "host:{}\nx-amz-content-sha256:{}\nx-amz-date:{}\n",
            host, payload_hash, amz_date
        );
        let signed_headers = "host;x-amz-content-sha256;x-amz-date";

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method, canonical_uri, canonical_query, canonical_headers, signed_headers, payload_hash
        );

        let scope = format!("{}/{}/s3/aws4_request", date, self.settings.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signature = hex::encode(self.signing_key(&date).chain(string_to_sign.as_bytes()));

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.settings.access_key_id, scope, signed_headers, signature
        );

        let mut url = format!("{}{}", endpoint, canonical_uri);
        if !canonical_query.is_empty() {
            url.push('?');
            url.push_str(&canonical_query);
        }

        let request = ureq::request(method, &url)
            .set("Authorization", &authorization)
            .set("x-amz-date", &amz_date)
            .set("x-amz-content-sha256", &payload_hash);

        let response = match body {
            Some(body) => request
                .set("Content-Type", "application/json")
                .send_string(body),
            None => request.call(),
        };

        match response {
            Ok(resp) => resp
                .into_string()
                .map_err(|e| Error::Http(e.to_string())),
            Err(ureq::Error::Status(code, resp)) => {
                let detail = resp.into_string().unwrap_or_default();
                Err(Error::Http(format!("{} from S3: {}", code, truncate(&detail))))
            }
            Err(e) => Err(Error::Http(e.to_string())),
        }
    }

    /// SigV4 signing key derivation chain.
    fn signing_key(&self, date: &str) -> SigningKey {
        let secret = format!("AWS4{}", self.settings.secret_access_key);
        let k_date = hmac_sha256(secret.as_bytes(), date.as_bytes());
        let k_region = hmac_sha256(&k_date, self.settings.region.as_bytes());
        let k_service = hmac_sha256(&k_region, b"s3");
        let k_signing = hmac_sha256(&k_service, b"aws4_request");
        SigningKey(k_signing)
    }
}

struct SigningKey(Vec<u8>);

impl SigningKey {
    fn chain(&self, message: &[u8]) -> Vec<u8> {
        hmac_sha256(&self.0, message)
    }
}

fn hmac_sha256(key: &[u8], message: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

fn truncate(s: &str) -> String {
    const MAX: usize = 200;
    if s.len() <= MAX {
        return s.to_string();
    }
    let mut end = MAX;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

/// Percent-encode per the SigV4 rules: unreserved characters pass through,
/// `/` passes through only in URI paths.
fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char);
            }
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// Pull the text content of every `<tag>…</tag>` element out of a response
/// body. The S3 list responses are flat enough that a full XML parser would
/// be the only thing in the tree needing one.
fn extract_tags(xml: &str, tag: &str) -> Vec<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let mut values = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find(&open) {
        let after = &rest[start + open.len()..];
        let Some(end) = after.find(&close) else { break };
        values.push(xml_unescape(&after[..end]));
        rest = &after[end + close.len()..];
    }
    values
}

fn xml_unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
