//! Red team tests against the manifest, signature and claim layers.
//!
//! Each test plays an attacker who controls some input (a manifest, a
//! signature file, a claim request) and checks that artseal rejects it with
//! the right error class instead of passing, panicking or reporting success.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use std::fs;
use tempfile::TempDir;

use artseal::claim::envelope::seal_compact;
use artseal::claim::{ClaimRequest, ClaimVerifier, CompactJwsVerifier, EnvelopeVerifier};
use artseal::manifest::{manifest_digest, FileRecord};
use artseal::signing::{self, KeyPair};
use artseal::{
    ContentHasher, Manifest, ManifestBuilder, ManifestVerifier, SealConfig, SealError,
    Sha256Hasher,
};

fn site() -> (TempDir, Manifest) {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("js")).unwrap();
    fs::write(dir.path().join("index.html"), "<html></html>").unwrap();
    fs::write(dir.path().join("js/app.js"), "run()").unwrap();
    let manifest = ManifestBuilder::new(&SealConfig::default())
        .build(dir.path())
        .unwrap();
    (dir, manifest)
}

fn reseal(manifest: &mut Manifest) {
    manifest.manifest_digest = manifest_digest(&Sha256Hasher, &manifest.files).unwrap();
}

// -------------------------------------------------------------------------
// (a) Manifest forgery
// -------------------------------------------------------------------------

#[test]
fn hand_edited_entry_hash_is_caught_by_manifest_digest() {
    let (dir, mut manifest) = site();
    fs::write(dir.path().join("index.html"), "<script>evil()</script>").unwrap();
    manifest.files[0].digest = Sha256Hasher.digest(b"<script>evil()</script>");

    let err = ManifestVerifier::new(&SealConfig::default())
        .verify(&manifest, dir.path())
        .unwrap_err();
    assert!(matches!(err, SealError::ManifestDigestMismatch { .. }));
}

#[test]
fn dropped_entry_is_caught_by_manifest_digest() {
    let (dir, mut manifest) = site();
    manifest.files.pop();
    let err = ManifestVerifier::new(&SealConfig::default())
        .verify(&manifest, dir.path())
        .unwrap_err();
    assert!(matches!(err, SealError::ManifestDigestMismatch { .. }));
}

#[test]
fn resealed_forgery_still_fails_per_file_check() {
    // An attacker who recomputes the aggregate digest still cannot make a
    // tampered file pass: the entry hash no longer matches the bytes on disk.
    let (dir, mut manifest) = site();
    manifest.files[0].digest = Sha256Hasher.digest(b"something else");
    reseal(&mut manifest);

    let report = ManifestVerifier::new(&SealConfig::default())
        .verify(&manifest, dir.path())
        .unwrap();
    assert!(!report.is_success());
    assert_eq!(report.mismatched, ["index.html"]);
}

#[test]
fn traversal_entry_is_refused_before_any_read() {
    let outer = TempDir::new().unwrap();
    fs::write(outer.path().join("secret"), "top secret").unwrap();
    let root = outer.path().join("site");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("index.html"), "hi").unwrap();

    let mut manifest = ManifestBuilder::new(&SealConfig::default())
        .build(&root)
        .unwrap();
    manifest.files.push(FileRecord {
        path: "../secret".into(),
        digest: Sha256Hasher.digest(b"top secret"),
        size: 10,
        modified: time::OffsetDateTime::UNIX_EPOCH,
    });
    reseal(&mut manifest);

    let err = ManifestVerifier::new(&SealConfig::default())
        .verify(&manifest, &root)
        .unwrap_err();
    assert!(matches!(err, SealError::UnsafePath(_)), "{err}");
}

#[test]
fn absolute_entry_is_refused() {
    let (dir, mut manifest) = site();
    manifest.files[0].path = "/etc/passwd".into();
    reseal(&mut manifest);
    let err = ManifestVerifier::new(&SealConfig::default())
        .verify(&manifest, dir.path())
        .unwrap_err();
    assert!(matches!(err, SealError::UnsafePath(_)));
}

#[test]
fn duplicate_entries_are_malformed() {
    let (dir, mut manifest) = site();
    let dup = manifest.files[0].clone();
    manifest.files.push(dup);
    reseal(&mut manifest);
    let err = ManifestVerifier::new(&SealConfig::default())
        .verify(&manifest, dir.path())
        .unwrap_err();
    assert!(matches!(err, SealError::MalformedManifest(_)));
}

#[test]
fn manifest_from_another_subject_is_rejected() {
    let (dir, mut manifest) = site();
    manifest.subject_id_sha256 = Sha256Hasher.digest(b"someone else");
    let err = ManifestVerifier::new(&SealConfig::default())
        .verify(&manifest, dir.path())
        .unwrap_err();
    match err {
        SealError::IdentityMismatch { field, .. } => assert_eq!(field, "subjectIdSha256"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn garbage_digest_in_manifest_is_malformed() {
    let (_dir, manifest) = site();
    let mut json: serde_json::Value =
        serde_json::from_slice(&manifest.to_json_pretty().unwrap()).unwrap();
    json["files"][0]["sha256"] = serde_json::Value::String("not-hex".into());
    let err = Manifest::from_json_slice(json.to_string().as_bytes()).unwrap_err();
    assert_eq!(err.exit_code(), artseal::error::EXIT_MALFORMED);
}

// -------------------------------------------------------------------------
// (b) Detached signatures
// -------------------------------------------------------------------------

#[test]
fn every_single_bit_flip_in_signature_is_rejected() {
    let kp = KeyPair::from_seed(&[4u8; 32]).unwrap();
    let msg = b"{\"seal\":\"Solomon-001\"}";
    let sig = *kp.sign(msg).as_bytes();
    for byte in 0..sig.len() {
        for bit in 0..8 {
            let mut forged = sig;
            forged[byte] ^= 1 << bit;
            assert!(
                !signing::verify(kp.public_key(), msg, &forged).unwrap(),
                "flip at byte {byte} bit {bit} verified"
            );
        }
    }
}

#[test]
fn signature_does_not_transfer_between_keys() {
    let a = KeyPair::from_seed(&[1u8; 32]).unwrap();
    let b = KeyPair::from_seed(&[2u8; 32]).unwrap();
    let sig = a.sign(b"msg");
    assert!(!signing::verify(b.public_key(), b"msg", sig.as_bytes()).unwrap());
}

#[test]
fn truncated_signature_is_a_length_error_not_false() {
    let kp = KeyPair::from_seed(&[1u8; 32]).unwrap();
    let sig = kp.sign(b"msg");
    let err = signing::verify(kp.public_key(), b"msg", &sig.as_bytes()[..63]).unwrap_err();
    assert!(matches!(err, SealError::InvalidSignatureLength(63)));
}

// -------------------------------------------------------------------------
// (c) Claim envelopes
// -------------------------------------------------------------------------

fn artifact() -> String {
    Sha256Hasher.digest(b"release.tar").to_hex()
}

fn request(jws: Option<String>) -> ClaimRequest {
    let subject = SealConfig::default().subject_id_sha256.to_hex();
    let mut body = serde_json::json!({
        "header": {
            "license": "ECCL-1.0",
            "subject_id_sha256": subject,
            "artifact_sha256": artifact(),
            "approval_token": "sig:CFBK::ok"
        },
        "token": {
            "subject_id_sha256": subject,
            "artifact_sha256": artifact()
        }
    });
    if let Some(jws) = jws {
        body["jws"] = serde_json::Value::String(jws);
    }
    ClaimRequest::from_json_slice(body.to_string().as_bytes()).unwrap()
}

fn keypair() -> KeyPair {
    KeyPair::from_seed(&[9u8; 32]).unwrap()
}

fn verifier() -> ClaimVerifier {
    ClaimVerifier::new(&SealConfig::default())
        .unwrap()
        .with_envelope_verifier(CompactJwsVerifier::new(*keypair().public_key()))
}

fn payload_for(artifact: &str) -> Vec<u8> {
    serde_json::json!({ "artifact_sha256": artifact })
        .to_string()
        .into_bytes()
}

#[test]
fn alg_none_envelope_is_rejected() {
    let h = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
    let p = URL_SAFE_NO_PAD.encode(payload_for(&artifact()));
    let jws = format!("{h}.{p}.");
    let err = verifier().verify(&request(Some(jws))).unwrap_err();
    assert!(matches!(err, SealError::InvalidSignature(_)));
}

#[test]
fn alg_confusion_hs256_is_rejected() {
    let kp = keypair();
    let h = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256"}"#);
    let p = URL_SAFE_NO_PAD.encode(payload_for(&artifact()));
    let input = format!("{h}.{p}");
    let sig = URL_SAFE_NO_PAD.encode(kp.sign(input.as_bytes()).as_bytes());
    let err = verifier()
        .verify(&request(Some(format!("{input}.{sig}"))))
        .unwrap_err();
    assert!(matches!(err, SealError::InvalidSignature(_)));
}

#[test]
fn payload_swap_breaks_signature() {
    let kp = keypair();
    let genuine = seal_compact(&kp, &payload_for(&artifact()));
    let parts: Vec<&str> = genuine.split('.').collect();
    let swapped_payload =
        URL_SAFE_NO_PAD.encode(payload_for(&Sha256Hasher.digest(b"other").to_hex()));
    let forged = format!("{}.{}.{}", parts[0], swapped_payload, parts[2]);
    let err = verifier().verify(&request(Some(forged))).unwrap_err();
    assert!(matches!(err, SealError::InvalidSignature(_)));
}

#[test]
fn envelope_signed_for_other_artifact_is_a_claim_mismatch() {
    let kp = keypair();
    let other = Sha256Hasher.digest(b"other").to_hex();
    let jws = seal_compact(&kp, &payload_for(&other));
    let err = verifier().verify(&request(Some(jws))).unwrap_err();
    assert!(matches!(err, SealError::SignedClaimMismatch { .. }));
}

#[test]
fn envelope_from_untrusted_key_is_rejected() {
    let attacker = KeyPair::from_seed(&[66u8; 32]).unwrap();
    let jws = seal_compact(&attacker, &payload_for(&artifact()));
    let err = verifier().verify(&request(Some(jws))).unwrap_err();
    assert!(matches!(err, SealError::InvalidSignature(_)));
}

#[test]
fn valid_envelope_cannot_rescue_failed_structure() {
    let kp = keypair();
    let jws = seal_compact(&kp, &payload_for(&artifact()));
    let mut req = request(Some(jws));
    req.header.license = "MIT".into();
    let err = verifier().verify(&req).unwrap_err();
    assert!(matches!(err, SealError::StructuralMismatch(_)));
}

#[test]
fn extra_segments_are_rejected() {
    let kp = keypair();
    let jws = format!("{}.extra", seal_compact(&kp, &payload_for(&artifact())));
    let v = CompactJwsVerifier::new(*kp.public_key());
    assert!(matches!(v.open(&jws), Err(SealError::InvalidSignature(_))));
}

#[test]
fn approval_token_pattern_is_anchored() {
    let mut req = request(None);
    req.header.approval_token = "xsig:CFBK::ok".into();
    let err = verifier().verify(&req).unwrap_err();
    assert!(matches!(err, SealError::StructuralMismatch(_)));
}
