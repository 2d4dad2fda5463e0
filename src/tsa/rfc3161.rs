//! DER construction and parsing for RFC 3161 timestamp structures.
//!
//! Covers the subset of TSP/CMS this system exchanges: `TimeStampReq`,
//! `TimeStampResp`, and the `ContentInfo -> SignedData -> TSTInfo` token
//! with one signer. Signed attributes carry contentType and messageDigest;
//! the signature is SHA256-with-RSA over the DER `SET OF` attributes.

use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use x509_parser::prelude::*;
use yasna::models::ObjectIdentifier;
use yasna::{DERWriter, Tag};

use crate::error::{SealError, SealResult};

const OID_SIGNED_DATA: &[u64] = &[1, 2, 840, 113549, 1, 7, 2];
const OID_CT_TST_INFO: &[u64] = &[1, 2, 840, 113549, 1, 9, 16, 1, 4];
const OID_CONTENT_TYPE: &[u64] = &[1, 2, 840, 113549, 1, 9, 3];
const OID_MESSAGE_DIGEST: &[u64] = &[1, 2, 840, 113549, 1, 9, 4];
const OID_SHA256: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 2, 1];
const OID_SHA256_WITH_RSA: &[u64] = &[1, 2, 840, 113549, 1, 1, 11];

const TAG_GENERALIZED_TIME: u8 = 0x18;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_SET: u8 = 0x31;
const TAG_CONTEXT_0: u8 = 0xa0;

/// Semantic fields of a parsed `TSTInfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TstInfo {
    /// TSA policy OID in dotted form, e.g. `1.2.3.4.5.6`.
    pub policy: String,
    /// SHA-256 digest the authority attested to.
    pub message_imprint_digest: Vec<u8>,
    /// Serial number magnitude, big-endian.
    pub serial: Vec<u8>,
    /// Generation time as RFC 3339, e.g. `2026-01-01T00:00:00Z`.
    pub gen_time: String,
}

/// A timestamp token decomposed far enough to verify it offline.
#[derive(Debug, Clone)]
pub struct ParsedToken {
    pub tst_info: TstInfo,
    pub tst_info_der: Vec<u8>,
    /// Signer certificate, when embedded.
    pub certificate_der: Option<Vec<u8>>,
    /// Signed attributes as the raw `[0] IMPLICIT` element from the token.
    pub signed_attrs_der: Option<Vec<u8>>,
    pub signature: Vec<u8>,
}

/// Key material the token builder signs with.
pub struct TokenSigner<'a> {
    pub private_key: &'a RsaPrivateKey,
    pub cert_der: &'a [u8],
    pub issuer_der: &'a [u8],
    pub cert_serial: &'a [u8],
}

fn write_message_imprint(writer: DERWriter<'_>, digest: &[u8]) {
    writer.write_sequence(|writer| {
        writer.next().write_sequence(|writer| {
            writer
                .next()
                .write_oid(&ObjectIdentifier::from_slice(OID_SHA256));
        });
        writer.next().write_bytes(digest);
    })
}

/// Build a `TimeStampReq` (version 1, certReq true) for a SHA-256 digest.
pub fn build_request(digest: &[u8], nonce: Option<&[u8]>) -> Vec<u8> {
    yasna::construct_der(|writer| {
        writer.write_sequence(|writer| {
            writer.next().write_i64(1);
            write_message_imprint(writer.next(), digest);
            if let Some(nonce) = nonce {
                writer.next().write_bigint_bytes(nonce, true);
            }
            writer.next().write_bool(true);
        })
    })
}

/// Parse a `TimeStampResp`, requiring granted status and a present token.
/// Returns the raw token DER.
pub fn parse_response(der: &[u8]) -> SealResult<Vec<u8>> {
    let (status, token) = yasna::parse_der(der, |reader| {
        reader.read_sequence(|reader| {
            let status = reader.next().read_sequence(|reader| {
                let status = reader.next().read_i64()?;
                // statusString and failInfo are informational only
                let _ = reader.read_optional(|r| r.read_der())?;
                let _ = reader.read_optional(|r| r.read_der())?;
                Ok(status)
            })?;
            let token = reader.read_optional(|r| r.read_der())?;
            Ok((status, token))
        })
    })
    .map_err(|e| SealError::timestamp_failed(format!("malformed timestamp response: {e}")))?;

    if status != 0 {
        return Err(SealError::timestamp_failed(format!(
            "timestamp authority did not grant the request (status {status})"
        )));
    }
    token.ok_or_else(|| SealError::timestamp_failed("granted response carries no token"))
}

/// Build a `TSTInfo`. `gen_time` is the GeneralizedTime content, e.g.
/// `20260101000000Z`.
pub fn build_tst_info(policy: &[u64], digest: &[u8], serial: &[u8], gen_time: &str) -> Vec<u8> {
    yasna::construct_der(|writer| {
        writer.write_sequence(|writer| {
            writer.next().write_i64(1);
            writer
                .next()
                .write_oid(&ObjectIdentifier::from_slice(policy));
            write_message_imprint(writer.next(), digest);
            writer.next().write_bigint_bytes(serial, true);
            writer
                .next()
                .write_der(&der_tlv(TAG_GENERALIZED_TIME, gen_time.as_bytes()));
        })
    })
}

/// Wrap a `TSTInfo` into a signed `ContentInfo` token with one signer and
/// an embedded certificate.
pub fn build_token(tst_info_der: &[u8], signer: &TokenSigner<'_>) -> SealResult<Vec<u8>> {
    let tst_digest = Sha256::digest(tst_info_der);

    let attr_content_type = yasna::construct_der(|writer| {
        writer.write_sequence(|writer| {
            writer
                .next()
                .write_oid(&ObjectIdentifier::from_slice(OID_CONTENT_TYPE));
            writer.next().write_set(|writer| {
                writer
                    .next()
                    .write_oid(&ObjectIdentifier::from_slice(OID_CT_TST_INFO));
            });
        })
    });
    let attr_message_digest = yasna::construct_der(|writer| {
        writer.write_sequence(|writer| {
            writer
                .next()
                .write_oid(&ObjectIdentifier::from_slice(OID_MESSAGE_DIGEST));
            writer.next().write_set(|writer| {
                writer.next().write_bytes(&tst_digest);
            });
        })
    });

    // DER SET OF: elements ordered by their encoding.
    let mut attrs = [attr_content_type, attr_message_digest];
    attrs.sort();
    let mut attr_content = Vec::new();
    for attr in &attrs {
        attr_content.extend_from_slice(attr);
    }
    // The signature covers the attributes under their SET OF tag; inside
    // the SignerInfo they appear retagged as [0] IMPLICIT.
    let set_of_attrs = der_tlv(TAG_SET, &attr_content);
    let mut implicit_attrs = set_of_attrs.clone();
    implicit_attrs[0] = TAG_CONTEXT_0;

    let attrs_hash = Sha256::digest(&set_of_attrs);
    let signature = signer
        .private_key
        .sign(Pkcs1v15Sign::new::<Sha256>(), &attrs_hash)
        .map_err(|e| SealError::crypto(format!("token signing failed: {e}")))?;

    Ok(yasna::construct_der(|writer| {
        writer.write_sequence(|writer| {
            writer
                .next()
                .write_oid(&ObjectIdentifier::from_slice(OID_SIGNED_DATA));
            writer.next().write_tagged(Tag::context(0), |writer| {
                writer.write_sequence(|writer| {
                    writer.next().write_i64(3);
                    writer.next().write_set(|writer| {
                        writer.next().write_sequence(|writer| {
                            writer
                                .next()
                                .write_oid(&ObjectIdentifier::from_slice(OID_SHA256));
                        });
                    });
                    writer.next().write_sequence(|writer| {
                        writer
                            .next()
                            .write_oid(&ObjectIdentifier::from_slice(OID_CT_TST_INFO));
                        writer.next().write_tagged(Tag::context(0), |writer| {
                            writer.write_bytes(tst_info_der);
                        });
                    });
                    writer
                        .next()
                        .write_der(&der_tlv(TAG_CONTEXT_0, signer.cert_der));
                    writer.next().write_set(|writer| {
                        writer.next().write_sequence(|writer| {
                            writer.next().write_i64(1);
                            writer.next().write_sequence(|writer| {
                                writer.next().write_der(signer.issuer_der);
                                writer.next().write_bigint_bytes(signer.cert_serial, true);
                            });
                            writer.next().write_sequence(|writer| {
                                writer
                                    .next()
                                    .write_oid(&ObjectIdentifier::from_slice(OID_SHA256));
                            });
                            writer.next().write_der(&implicit_attrs);
                            writer.next().write_sequence(|writer| {
                                writer.next().write_oid(&ObjectIdentifier::from_slice(
                                    OID_SHA256_WITH_RSA,
                                ));
                                writer.next().write_null();
                            });
                            writer.next().write_bytes(&signature);
                        });
                    });
                });
            });
        })
    }))
}

/// Parse a timestamp token down to its TSTInfo and signer material.
pub fn parse_token(der: &[u8]) -> SealResult<ParsedToken> {
    let (content_type, econtent_type, tst_info_der, rest) = yasna::parse_der(der, |reader| {
        reader.read_sequence(|reader| {
            let content_type = reader.next().read_oid()?;
            reader.next().read_tagged(Tag::context(0), |reader| {
                reader.read_sequence(|reader| {
                    let _version = reader.next().read_i64()?;
                    let _digest_algorithms = reader.next().read_der()?;
                    let (econtent_type, tst_info_der) = reader.next().read_sequence(|reader| {
                        let oid = reader.next().read_oid()?;
                        let content = reader
                            .next()
                            .read_tagged(Tag::context(0), |r| r.read_bytes())?;
                        Ok((oid, content))
                    })?;
                    let mut rest = Vec::new();
                    while let Some(el) = reader.read_optional(|r| r.read_der())? {
                        rest.push(el);
                    }
                    Ok((content_type, econtent_type, tst_info_der, rest))
                })
            })
        })
    })
    .map_err(|e| SealError::timestamp_failed(format!("malformed timestamp token: {e}")))?;

    if content_type != ObjectIdentifier::from_slice(OID_SIGNED_DATA) {
        return Err(SealError::timestamp_failed(format!(
            "token content type is {content_type}, expected signedData"
        )));
    }
    if econtent_type != ObjectIdentifier::from_slice(OID_CT_TST_INFO) {
        return Err(SealError::timestamp_failed(format!(
            "token payload type is {econtent_type}, expected TSTInfo"
        )));
    }

    let mut certificate_der = None;
    let mut signer_info_der = None;
    for el in &rest {
        match el.first() {
            Some(&TAG_CONTEXT_0) if certificate_der.is_none() => {
                let (_, content) = der_split(el)?;
                certificate_der = der_elements(content)?.first().map(|c| c.to_vec());
            }
            Some(&TAG_SET) => {
                let (_, content) = der_split(el)?;
                signer_info_der = der_elements(content)?.first().map(|c| c.to_vec());
            }
            _ => {}
        }
    }
    let signer_info_der = signer_info_der
        .ok_or_else(|| SealError::timestamp_failed("token carries no SignerInfo"))?;
    let (signed_attrs_der, signature) = parse_signer_info(&signer_info_der)?;

    Ok(ParsedToken {
        tst_info: parse_tst_info(&tst_info_der)?,
        tst_info_der,
        certificate_der,
        signed_attrs_der,
        signature,
    })
}

fn parse_signer_info(der: &[u8]) -> SealResult<(Option<Vec<u8>>, Vec<u8>)> {
    yasna::parse_der(der, |reader| {
        reader.read_sequence(|reader| {
            let _version = reader.next().read_i64()?;
            let _sid = reader.next().read_der()?;
            let _digest_algorithm = reader.next().read_der()?;
            let mut signed_attrs = None;
            let mut signature = Vec::new();
            while let Some(el) = reader.read_optional(|r| r.read_der())? {
                match el.first() {
                    Some(&TAG_CONTEXT_0) if signed_attrs.is_none() => signed_attrs = Some(el),
                    Some(&TAG_OCTET_STRING) => {
                        signature = yasna::parse_der(&el, |r| r.read_bytes())?;
                    }
                    _ => {}
                }
            }
            Ok((signed_attrs, signature))
        })
    })
    .map_err(|e| SealError::timestamp_failed(format!("malformed SignerInfo: {e}")))
}

/// Parse a bare `TSTInfo`.
pub fn parse_tst_info(der: &[u8]) -> SealResult<TstInfo> {
    let (policy, digest, serial, gen_time_raw) = yasna::parse_der(der, |reader| {
        reader.read_sequence(|reader| {
            let _version = reader.next().read_i64()?;
            let policy = reader.next().read_oid()?;
            let digest = reader.next().read_sequence(|reader| {
                let _algorithm = reader.next().read_der()?;
                reader.next().read_bytes()
            })?;
            let (serial, _positive) = reader.next().read_bigint_bytes()?;
            let gen_time_raw = reader.next().read_der()?;
            while reader.read_optional(|r| r.read_der())?.is_some() {}
            Ok((policy, digest, serial, gen_time_raw))
        })
    })
    .map_err(|e| SealError::timestamp_failed(format!("malformed TSTInfo: {e}")))?;

    let (tag, content) = der_split(&gen_time_raw)?;
    if tag != TAG_GENERALIZED_TIME {
        return Err(SealError::timestamp_failed(format!(
            "genTime has tag {tag:#04x}, expected GeneralizedTime"
        )));
    }
    let text = std::str::from_utf8(content)
        .map_err(|_| SealError::timestamp_failed("genTime is not ASCII"))?;

    Ok(TstInfo {
        policy: policy.to_string(),
        message_imprint_digest: digest,
        serial,
        gen_time: generalized_time_to_rfc3339(text)?,
    })
}

fn generalized_time_to_rfc3339(text: &str) -> SealResult<String> {
    let naive = chrono::NaiveDateTime::parse_from_str(text, "%Y%m%d%H%M%SZ")
        .map_err(|e| SealError::timestamp_failed(format!("unparsable genTime '{text}': {e}")))?;
    Ok(naive
        .and_utc()
        .to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
}

/// Check the token's internal signature: the messageDigest attribute must
/// match the embedded TSTInfo, and the RSA signature over the attribute
/// set must verify against the embedded certificate's public key.
pub fn verify_token_signature(token: &ParsedToken) -> bool {
    let Some(cert_der) = token.certificate_der.as_deref() else {
        return false;
    };
    let Some(attrs_raw) = token.signed_attrs_der.as_deref() else {
        return false;
    };
    let Ok((_, cert)) = X509Certificate::from_der(cert_der) else {
        return false;
    };
    let Ok(public_key) =
        RsaPublicKey::from_pkcs1_der(cert.public_key().subject_public_key.data.as_ref())
    else {
        return false;
    };

    let Some(attested) = message_digest_attribute(attrs_raw) else {
        return false;
    };
    if attested != Sha256::digest(&token.tst_info_der).as_slice() {
        return false;
    }

    let mut set_of = attrs_raw.to_vec();
    set_of[0] = TAG_SET;
    let hashed = Sha256::digest(&set_of);
    public_key
        .verify(Pkcs1v15Sign::new::<Sha256>(), &hashed, &token.signature)
        .is_ok()
}

fn message_digest_attribute(attrs_raw: &[u8]) -> Option<Vec<u8>> {
    let (_, content) = der_split(attrs_raw).ok()?;
    for attr in der_elements(content).ok()? {
        let (oid, values) = yasna::parse_der(attr, |reader| {
            reader.read_sequence(|reader| {
                let oid = reader.next().read_oid()?;
                let values = reader.next().read_der()?;
                Ok((oid, values))
            })
        })
        .ok()?;
        if oid == ObjectIdentifier::from_slice(OID_MESSAGE_DIGEST) {
            let (_, set_content) = der_split(&values).ok()?;
            let first = der_elements(set_content).ok()?.into_iter().next()?;
            return yasna::parse_der(first, |r| r.read_bytes()).ok();
        }
    }
    None
}

// Raw TLV helpers for the few places where an element must be retagged or
// carried verbatim between structures.

fn der_tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    let len = content.len();
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = len.to_be_bytes();
        let first = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len() - 1);
        let len_bytes = &bytes[first..];
        out.push(0x80 | len_bytes.len() as u8);
        out.extend_from_slice(len_bytes);
    }
    out.extend_from_slice(content);
    out
}

fn der_take(buf: &[u8]) -> SealResult<(u8, &[u8], &[u8])> {
    let truncated = || SealError::timestamp_failed("truncated DER element");
    if buf.len() < 2 {
        return Err(truncated());
    }
    let tag = buf[0];
    let (len, header) = if buf[1] < 0x80 {
        (buf[1] as usize, 2)
    } else {
        let n = (buf[1] & 0x7f) as usize;
        if n == 0 || n > 4 || buf.len() < 2 + n {
            return Err(truncated());
        }
        let mut len = 0usize;
        for &b in &buf[2..2 + n] {
            len = (len << 8) | b as usize;
        }
        (len, 2 + n)
    };
    if buf.len() < header + len {
        return Err(truncated());
    }
    Ok((tag, &buf[header..header + len], &buf[header + len..]))
}

fn der_split(buf: &[u8]) -> SealResult<(u8, &[u8])> {
    let (tag, content, rest) = der_take(buf)?;
    if !rest.is_empty() {
        return Err(SealError::timestamp_failed(
            "trailing bytes after DER element",
        ));
    }
    Ok((tag, content))
}

fn der_elements(mut content: &[u8]) -> SealResult<Vec<&[u8]>> {
    let mut out = Vec::new();
    while !content.is_empty() {
        let (_, _, rest) = der_take(content)?;
        let consumed = content.len() - rest.len();
        out.push(&content[..consumed]);
        content = rest;
    }
    Ok(out)
}
